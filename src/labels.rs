use std::collections::BTreeMap;

use crate::record::LogRecord;
use crate::relabel::RelabelRules;

pub const COMPONENT_NAME: &str = "componentName";
pub const INTERFACE_NAME: &str = "interfaceName";
pub const RETURN_CODE: &str = "returnCode";

/// Labels derived from every record, in schema order
pub const DYNAMIC_LABELS: [&str; 3] = [COMPONENT_NAME, INTERFACE_NAME, RETURN_CODE];

/// Ordered label names shared by all metric families of one app:
/// external names first, then [`DYNAMIC_LABELS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSchema {
    names: Vec<String>,
}

impl LabelSchema {
    pub fn new<I, S>(external_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = external_names.into_iter().map(Into::into).collect();
        names.extend(DYNAMIC_LABELS.iter().map(|s| s.to_string()));
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Label values for one record, guaranteed to line up with the schema
/// of the assembler that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelValues(Vec<String>);

impl LabelValues {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Builds label vectors from records.
#[derive(Debug, Clone)]
pub struct LabelAssembler {
    schema: LabelSchema,
    external_values: Vec<String>,
    rules: RelabelRules,
}

impl LabelAssembler {
    /// External labels are laid out in key order, which fixes the schema
    /// independently of how the configuration source ordered them.
    pub fn new(external_labels: &BTreeMap<String, String>, rules: RelabelRules) -> Self {
        Self {
            schema: LabelSchema::new(external_labels.keys().cloned()),
            external_values: external_labels.values().cloned().collect(),
            rules,
        }
    }

    pub fn schema(&self) -> &LabelSchema {
        &self.schema
    }

    pub fn assemble(&self, record: &LogRecord) -> LabelValues {
        let mut values = Vec::with_capacity(self.schema.len());
        values.extend(self.external_values.iter().cloned());
        values.push(self.rules.resolve(COMPONENT_NAME, &record.component_name));
        values.push(self.rules.resolve(INTERFACE_NAME, &record.interface_name));
        values.push(
            self.rules
                .resolve(RETURN_CODE, &record.return_code.to_string()),
        );
        LabelValues(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relabel::{Pattern, RelabelRule, Replacement};
    use std::collections::HashMap;

    fn record(component: &str, interface: &str, code: i64) -> LogRecord {
        LogRecord {
            component_name: component.to_string(),
            interface_name: interface.to_string(),
            cost_time: 5,
            return_code: code,
            timestamp: 10,
            event: String::new(),
            response_size: None,
        }
    }

    fn external() -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert("region".to_string(), "zone1".to_string());
        labels.insert("env".to_string(), "prod".to_string());
        labels
    }

    #[test]
    fn test_schema_order() {
        let assembler = LabelAssembler::new(&external(), RelabelRules::default());
        assert_eq!(
            assembler.schema().names(),
            &["env", "region", "componentName", "interfaceName", "returnCode"]
        );
    }

    #[test]
    fn test_assemble_matches_schema() {
        let assembler = LabelAssembler::new(&external(), RelabelRules::default());
        let values = assembler.assemble(&record("auth", "login", 200));
        assert_eq!(values.len(), assembler.schema().len());
        assert_eq!(
            values.as_slice(),
            &["prod", "zone1", "auth", "login", "200"]
        );
    }

    #[test]
    fn test_assemble_without_external_labels() {
        let assembler = LabelAssembler::new(&BTreeMap::new(), RelabelRules::default());
        let values = assembler.assemble(&record("auth", "login", -1));
        assert_eq!(values.as_slice(), &["auth", "login", "-1"]);
    }

    #[test]
    fn test_dynamic_values_are_relabeled() {
        let mut rules = HashMap::new();
        rules.insert(
            COMPONENT_NAME.to_string(),
            RelabelRule {
                trim: Some(":".to_string()),
                replace: vec![],
            },
        );
        rules.insert(
            RETURN_CODE.to_string(),
            RelabelRule {
                trim: None,
                replace: vec![Replacement {
                    target: Pattern::new(r"^5\d\d$").unwrap(),
                    value: "5xx".to_string(),
                }],
            },
        );
        let assembler = LabelAssembler::new(&BTreeMap::new(), RelabelRules::new(rules));

        let values = assembler.assemble(&record("svc-a:v2", "query", 503));
        assert_eq!(values.as_slice(), &["svc-a", "query", "5xx"]);
    }
}
