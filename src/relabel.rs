//! Label value rewriting.
//!
//! A raw dynamic value is optionally trimmed at a delimiter, then matched
//! against an ordered list of regular expressions. The first pattern that
//! matches replaces the value; otherwise the trimmed value is kept.
//!
//! Patterns are compiled while the configuration is deserialized, so a bad
//! pattern fails config loading and never surfaces per record.

use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// A regular expression compiled at configuration load time
#[derive(Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self)
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.0.is_match(value)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Pattern::new(&raw)
            .map_err(|e| de::Error::custom(format!("invalid relabel pattern '{}': {}", raw, e)))
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Replace the whole value with `value` when `target` matches
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Replacement {
    pub target: Pattern,
    pub value: String,
}

/// Rewrite rule for one label
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RelabelRule {
    /// Keep only the part before the first occurrence of this delimiter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim: Option<String>,

    #[serde(default)]
    pub replace: Vec<Replacement>,
}

impl RelabelRule {
    pub fn apply(&self, raw: &str) -> String {
        let value = match self.trim.as_deref() {
            Some(delimiter) if !delimiter.is_empty() => {
                raw.split(delimiter).next().unwrap_or(raw)
            }
            _ => raw,
        };

        self.replace
            .iter()
            .find(|r| r.target.is_match(value))
            .map(|r| r.value.clone())
            .unwrap_or_else(|| value.to_string())
    }
}

/// Rewrite rules keyed by label name.
///
/// Built once at startup and shared read-only by every pipeline.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RelabelRules(HashMap<String, RelabelRule>);

impl RelabelRules {
    pub fn new(rules: HashMap<String, RelabelRule>) -> Self {
        Self(rules)
    }

    /// Rule configured for `label`. Label names compare case-insensitively
    /// since configuration sources may fold key case.
    pub fn rule(&self, label: &str) -> Option<&RelabelRule> {
        self.0
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(label))
            .map(|(_, rule)| rule)
    }

    /// Resolve the final value of `label`. Labels without a rule pass through.
    pub fn resolve(&self, label: &str, raw: &str) -> String {
        match self.rule(label) {
            Some(rule) => rule.apply(raw),
            None => raw.to_string(),
        }
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}
