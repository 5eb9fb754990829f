//! Latest-exemplar tracking for histogram series.
//!
//! The Prometheus text format rendered by the recorder has no exemplar
//! syntax, so the most recent exemplar of each series is kept here and
//! published separately.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::labels::{LabelSchema, LabelValues};

/// OpenMetrics limit for the combined length of exemplar label names and values
pub const MAX_EXEMPLAR_LABEL_CHARS: usize = 128;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exemplar {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
}

impl Exemplar {
    /// Build an exemplar, truncating or dropping labels (in the given order)
    /// once the 128 character budget is spent.
    pub fn new<I, K, V>(labels: I, value: f64) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut remaining = MAX_EXEMPLAR_LABEL_CHARS;
        let mut kept = BTreeMap::new();

        for (name, label_value) in labels {
            let name = name.into();
            let name_len = name.chars().count();
            if name_len >= remaining {
                continue;
            }
            let budget = remaining - name_len;
            let label_value: String = label_value.as_ref().chars().take(budget).collect();
            remaining -= name_len + label_value.chars().count();
            kept.insert(name, label_value);
        }

        Self {
            labels: kept,
            value,
            recorded_at: Utc::now(),
        }
    }
}

/// One histogram series and its latest exemplar
#[derive(Debug, Clone, Serialize)]
pub struct ExemplarEntry {
    pub metric: String,
    pub series: BTreeMap<String, String>,
    pub exemplar: Exemplar,
}

#[derive(Debug, Default)]
pub struct ExemplarStore {
    latest: DashMap<(String, LabelValues), ExemplarEntry>,
}

impl ExemplarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the exemplar of the series `metric{schema=values}`
    pub fn observe(
        &self,
        metric: &str,
        schema: &LabelSchema,
        values: &LabelValues,
        exemplar: Exemplar,
    ) {
        self.latest
            .entry((metric.to_string(), values.clone()))
            .and_modify(|entry| entry.exemplar = exemplar.clone())
            .or_insert_with(|| ExemplarEntry {
                metric: metric.to_string(),
                series: schema
                    .names()
                    .iter()
                    .cloned()
                    .zip(values.as_slice().iter().cloned())
                    .collect(),
                exemplar,
            });
    }

    pub fn get(&self, metric: &str, values: &LabelValues) -> Option<Exemplar> {
        self.latest
            .get(&(metric.to_string(), values.clone()))
            .map(|entry| entry.exemplar.clone())
    }

    /// All series with an exemplar, ordered by metric name
    pub fn snapshot(&self) -> Vec<ExemplarEntry> {
        let mut entries: Vec<ExemplarEntry> =
            self.latest.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.metric.cmp(&b.metric).then_with(|| a.series.cmp(&b.series)));
        entries
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelAssembler;
    use crate::record::LogRecord;
    use crate::relabel::RelabelRules;

    fn values_for(assembler: &LabelAssembler, component: &str) -> LabelValues {
        assembler.assemble(&LogRecord {
            component_name: component.to_string(),
            interface_name: "login".to_string(),
            cost_time: 1,
            return_code: 200,
            timestamp: 1,
            event: String::new(),
            response_size: None,
        })
    }

    #[test]
    fn test_exemplar_labels_within_budget() {
        let exemplar = Exemplar::new([("observation", "request_time"), ("event", "req-1")], 1.5);
        assert_eq!(exemplar.labels.len(), 2);
        assert_eq!(exemplar.labels["event"], "req-1");
        assert_eq!(exemplar.value, 1.5);
    }

    #[test]
    fn test_exemplar_value_truncated_to_budget() {
        let long = "x".repeat(500);
        let exemplar = Exemplar::new([("observation", "request_time"), ("event", long.as_str())], 1.0);
        let total: usize = exemplar
            .labels
            .iter()
            .map(|(k, v)| k.chars().count() + v.chars().count())
            .sum();
        assert_eq!(total, MAX_EXEMPLAR_LABEL_CHARS);
        assert_eq!(exemplar.labels["observation"], "request_time");
    }

    #[test]
    fn test_exemplar_drops_label_that_cannot_fit() {
        let long_name = "n".repeat(200);
        let exemplar = Exemplar::new([(long_name.as_str(), "v"), ("event", "e")], 1.0);
        assert_eq!(exemplar.labels.len(), 1);
        assert!(exemplar.labels.contains_key("event"));
    }

    #[test]
    fn test_store_keeps_latest_per_series() {
        let assembler = LabelAssembler::new(&BTreeMap::new(), RelabelRules::default());
        let store = ExemplarStore::new();
        let auth = values_for(&assembler, "auth");
        let billing = values_for(&assembler, "billing");

        store.observe("app_latency", assembler.schema(), &auth, Exemplar::new([("event", "a")], 1.0));
        store.observe("app_latency", assembler.schema(), &auth, Exemplar::new([("event", "b")], 2.0));
        store.observe("app_latency", assembler.schema(), &billing, Exemplar::new([("event", "c")], 3.0));

        assert_eq!(store.len(), 2);
        let latest = store.get("app_latency", &auth).unwrap();
        assert_eq!(latest.value, 2.0);
        assert_eq!(latest.labels["event"], "b");

        let snapshot = store.snapshot();
        assert_eq!(snapshot[0].series["componentName"], "auth");
        assert_eq!(snapshot[1].series["componentName"], "billing");
    }
}
