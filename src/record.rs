use serde::Deserialize;

use crate::error::ParseError;

/// One access-log line, as written by the upstream service.
///
/// Decoding is strict: every numeric field must be present and integral,
/// otherwise the whole line is rejected. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub component_name: String,
    pub interface_name: String,
    pub cost_time: i64,
    pub return_code: i64,
    pub timestamp: i64,
    #[serde(default)]
    pub event: String,
    /// Bytes sent back to the client, when the producer logs it
    #[serde(default)]
    pub response_size: Option<u64>,
}

impl LogRecord {
    /// Value observed by the upstream-latency histogram
    pub fn upstream_time(&self) -> f64 {
        self.timestamp as f64
    }

    /// Value observed by the response-latency histogram
    pub fn response_time(&self) -> f64 {
        self.timestamp.saturating_add(self.cost_time) as f64
    }
}

/// Decode a single log line.
pub fn parse_line(line: &str) -> Result<LogRecord, ParseError> {
    serde_json::from_str(line).map_err(|source| ParseError {
        line: line.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{"componentName":"auth","interfaceName":"login","costTime":50,"returnCode":200,"timestamp":100,"event":"req-1"}"#;

    #[test]
    fn test_parse_valid_line() {
        let record = parse_line(VALID).unwrap();
        assert_eq!(record.component_name, "auth");
        assert_eq!(record.interface_name, "login");
        assert_eq!(record.cost_time, 50);
        assert_eq!(record.return_code, 200);
        assert_eq!(record.timestamp, 100);
        assert_eq!(record.event, "req-1");
        assert_eq!(record.response_size, None);
    }

    #[test]
    fn test_latency_values() {
        let record = parse_line(VALID).unwrap();
        assert_eq!(record.upstream_time(), 100.0);
        assert_eq!(record.response_time(), 150.0);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let line = r#"{"componentName":"a","interfaceName":"b","costTime":1,"returnCode":0,"timestamp":2,"event":"","traceId":"x"}"#;
        assert!(parse_line(line).is_ok());
    }

    #[test]
    fn test_optional_response_size() {
        let line = r#"{"componentName":"a","interfaceName":"b","costTime":1,"returnCode":0,"timestamp":2,"responseSize":512}"#;
        let record = parse_line(line).unwrap();
        assert_eq!(record.response_size, Some(512));
        assert_eq!(record.event, "");
    }

    #[test]
    fn test_missing_numeric_field_is_rejected() {
        let line = r#"{"componentName":"a","interfaceName":"b","returnCode":0,"timestamp":2,"event":""}"#;
        let err = parse_line(line).unwrap_err();
        assert!(err.to_string().contains("costTime"));
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let line = r#"{"componentName":"a","interfaceName":"b","costTime":"fast","returnCode":0,"timestamp":2,"event":""}"#;
        assert!(parse_line(line).is_err());

        let line = r#"{"componentName":"a","interfaceName":"b","costTime":1.5,"returnCode":0,"timestamp":2,"event":""}"#;
        assert!(parse_line(line).is_err());
    }

    #[test]
    fn test_malformed_text_is_rejected() {
        for line in ["{not json", "plain text", "", r#"{"componentName":"a""#, "[1,2,3]"] {
            let err = parse_line(line).unwrap_err();
            assert_eq!(err.line, line);
        }
    }

    #[test]
    fn test_error_message_contains_line() {
        let err = parse_line("{not json").unwrap_err();
        assert!(err.to_string().contains("'{not json'"));
    }
}
