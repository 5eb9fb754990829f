use dashmap::DashSet;
use metrics::{Key, KeyName, Label, Level, Metadata, Recorder, SharedString};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::AppConfig;
use crate::error::MetricsError;
use crate::exemplar::{Exemplar, ExemplarStore};
use crate::labels::{LabelSchema, LabelValues};
use crate::record::LogRecord;

const REQUEST_COUNT: &str = "http_response_count_total";
const RESPONSE_BYTES: &str = "http_response_size_bytes";
const UPSTREAM_TIME: &str = "http_upstream_time_seconds";
const RESPONSE_TIME: &str = "http_response_time_seconds";
const PARSE_ERRORS: &str = "log_parse_errors_total";

/// Fully qualified names of the metric families exported for one app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyNames {
    pub request_count: String,
    pub response_bytes: String,
    pub upstream_time: String,
    pub response_time: String,
    pub parse_errors: String,
}

impl FamilyNames {
    pub fn new(namespace: &str) -> Self {
        let qualify = |name: &str| format!("{}_{}", namespace, name);
        Self {
            request_count: qualify(REQUEST_COUNT),
            response_bytes: qualify(RESPONSE_BYTES),
            upstream_time: qualify(UPSTREAM_TIME),
            response_time: qualify(RESPONSE_TIME),
            parse_errors: qualify(PARSE_ERRORS),
        }
    }

    fn all(&self) -> [&str; 5] {
        [
            &self.request_count,
            &self.response_bytes,
            &self.upstream_time,
            &self.response_time,
            &self.parse_errors,
        ]
    }
}

/// Build the Prometheus recorder with the histogram buckets of every app.
///
/// The recorder is not installed globally; collectors write through their
/// own [`MetricSink`] and the HTTP layer renders through the handle.
pub fn build_recorder(apps: &[AppConfig]) -> Result<PrometheusRecorder, MetricsError> {
    let mut builder = PrometheusBuilder::new();

    for app in apps {
        let names = FamilyNames::new(&app.name);
        for histogram in [&names.upstream_time, &names.response_time] {
            builder = builder
                .set_buckets_for_metric(Matcher::Full(histogram.clone()), &app.histogram_buckets)
                .map_err(|source| MetricsError::InvalidBuckets {
                    name: histogram.clone(),
                    source,
                })?;
        }
    }

    Ok(builder.build_recorder())
}

/// Interval between recorder upkeep runs, the exporter crate's default
pub const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Periodically drain buffered histogram samples into their summaries.
///
/// A recorder that is not installed globally gets no upkeep task of its
/// own; without this, samples accumulate until the next scrape.
pub fn spawn_upkeep(handle: PrometheusHandle, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            handle.run_upkeep();
        }
    })
}

fn metadata() -> Metadata<'static> {
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()))
}

/// Owns the recorder and tracks which families have been registered.
pub struct MetricsRegistry {
    recorder: Arc<PrometheusRecorder>,
    registered: DashSet<String>,
}

impl MetricsRegistry {
    pub fn new(recorder: PrometheusRecorder) -> Self {
        Self {
            recorder: Arc::new(recorder),
            registered: DashSet::new(),
        }
    }

    pub fn handle(&self) -> PrometheusHandle {
        self.recorder.handle()
    }

    /// Register the families of one app. Registering a family name twice
    /// is a configuration error.
    pub fn register(&self, names: &FamilyNames) -> Result<(), MetricsError> {
        if let Some(name) = names.all().into_iter().find(|n| self.registered.contains(*n)) {
            return Err(MetricsError::AlreadyRegistered(name.to_string()));
        }

        describe_counter(&self.recorder, &names.request_count, "Amount of processed HTTP requests");
        describe_counter(&self.recorder, &names.response_bytes, "Total amount of transferred bytes");
        describe_histogram(
            &self.recorder,
            &names.upstream_time,
            "Time needed by upstream servers to handle requests",
        );
        describe_histogram(
            &self.recorder,
            &names.response_time,
            "Time needed to handle requests",
        );
        describe_counter(
            &self.recorder,
            &names.parse_errors,
            "Log lines that could not be decoded",
        );

        for name in names.all() {
            self.registered.insert(name.to_string());
        }
        info!(families = ?names.all(), "Registered metric families");
        Ok(())
    }

    pub(crate) fn recorder(&self) -> Arc<PrometheusRecorder> {
        self.recorder.clone()
    }
}

fn describe_counter(recorder: &PrometheusRecorder, name: &str, help: &'static str) {
    recorder.describe_counter(KeyName::from(name.to_string()), None, SharedString::from(help));
}

fn describe_histogram(recorder: &PrometheusRecorder, name: &str, help: &'static str) {
    recorder.describe_histogram(KeyName::from(name.to_string()), None, SharedString::from(help));
}

/// Folds parsed records into the metric families of one app.
///
/// Counter and histogram handles handed out by the recorder are atomic, so
/// a sink can be shared by any number of pipelines without locking.
#[derive(Clone)]
pub struct MetricSink {
    recorder: Arc<PrometheusRecorder>,
    names: FamilyNames,
    schema: LabelSchema,
    exemplars: Arc<ExemplarStore>,
}

impl MetricSink {
    pub fn new(
        registry: &MetricsRegistry,
        names: FamilyNames,
        schema: LabelSchema,
        exemplars: Arc<ExemplarStore>,
    ) -> Self {
        Self {
            recorder: registry.recorder(),
            names,
            schema,
            exemplars,
        }
    }

    pub fn names(&self) -> &FamilyNames {
        &self.names
    }

    pub fn record(&self, record: &LogRecord, values: &LabelValues) {
        let meta = metadata();

        self.recorder
            .register_counter(&self.key(&self.names.request_count, values), &meta)
            .increment(1);
        self.recorder
            .register_counter(&self.key(&self.names.response_bytes, values), &meta)
            .increment(record.response_size.unwrap_or(0));

        self.observe(
            &self.names.upstream_time,
            values,
            record.upstream_time(),
            "upstream_response_time",
            &record.event,
        );
        self.observe(
            &self.names.response_time,
            values,
            record.response_time(),
            "request_time",
            &record.event,
        );
    }

    pub fn record_parse_error(&self, file: &str) {
        let key = Key::from_parts(
            self.names.parse_errors.clone(),
            vec![Label::new("file", file.to_string())],
        );
        self.recorder.register_counter(&key, &metadata()).increment(1);
    }

    fn observe(&self, name: &str, values: &LabelValues, value: f64, observation: &str, event: &str) {
        self.recorder
            .register_histogram(&self.key(name, values), &metadata())
            .record(value);

        let mut labels = vec![("observation", observation)];
        if !event.is_empty() {
            labels.push(("event", event));
        }
        self.exemplars
            .observe(name, &self.schema, values, Exemplar::new(labels, value));
    }

    fn key(&self, name: &str, values: &LabelValues) -> Key {
        assert_eq!(
            values.len(),
            self.schema.len(),
            "label values do not match the schema of {}",
            name
        );
        let labels: Vec<Label> = self
            .schema
            .names()
            .iter()
            .zip(values.as_slice())
            .map(|(k, v)| Label::new(k.clone(), v.clone()))
            .collect();
        Key::from_parts(name.to_string(), labels)
    }
}
