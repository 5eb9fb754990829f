use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::{MetricsError, ParseError, WatchError};
use crate::exemplar::ExemplarStore;
use crate::labels::LabelAssembler;
use crate::metrics::{FamilyNames, MetricSink, MetricsRegistry};
use crate::record::parse_line;
use crate::watcher::{FileWatcher, DEFAULT_POLL_INTERVAL};

/// Parse → label → record, shared by every source file of one app
struct Pipeline {
    assembler: LabelAssembler,
    sink: MetricSink,
}

/// What happened to one line read from a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineOutcome {
    Recorded,
    Blank,
    Malformed,
}

impl Pipeline {
    fn process_line(&self, line: &str) -> Result<(), ParseError> {
        let record = parse_line(line)?;
        let values = self.assembler.assemble(&record);
        self.sink.record(&record, &values);
        Ok(())
    }

    /// Whitespace-only lines are skipped without touching the parse-error
    /// counter; every other undecodable line is reported against `file`.
    fn handle_line(&self, file: &str, line: &str) -> LineOutcome {
        if line.trim().is_empty() {
            debug!(file = %file, "Skipping blank log line");
            return LineOutcome::Blank;
        }
        match self.process_line(line) {
            Ok(()) => LineOutcome::Recorded,
            Err(e) => {
                warn!(file = %file, error = %e, "Skipping malformed log line");
                self.sink.record_parse_error(file);
                LineOutcome::Malformed
            }
        }
    }
}

/// One app's collector with its metric families built but not registered.
///
/// [`Collector::run`] consumes the collector, so it can only be started once.
pub struct Collector {
    name: String,
    source_files: Vec<PathBuf>,
    poll_interval: Duration,
    pipeline: Arc<Pipeline>,
}

impl Collector {
    pub fn new(app: &AppConfig, registry: &MetricsRegistry, exemplars: Arc<ExemplarStore>) -> Self {
        let assembler = LabelAssembler::new(&app.external_labels, app.relabel.clone());
        let sink = MetricSink::new(
            registry,
            FamilyNames::new(&app.name),
            assembler.schema().clone(),
            exemplars,
        );

        Self {
            name: app.name.clone(),
            source_files: app.source_files.clone(),
            poll_interval: app.poll_interval().unwrap_or(DEFAULT_POLL_INTERVAL),
            pipeline: Arc::new(Pipeline { assembler, sink }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn families(&self) -> &FamilyNames {
        self.pipeline.sink.names()
    }

    /// Fold a single line into the metrics. Malformed lines leave every
    /// family untouched.
    pub fn process_line(&self, line: &str) -> Result<(), ParseError> {
        self.pipeline.process_line(line)
    }

    /// Register the families and start one pipeline per source file.
    ///
    /// A source that cannot be opened is reported and skipped; the others
    /// keep running.
    pub async fn run(self, registry: &MetricsRegistry) -> Result<RunningCollector, MetricsError> {
        registry.register(self.families())?;

        let mut tasks = Vec::new();
        let mut failed = Vec::new();

        for path in &self.source_files {
            match FileWatcher::open(path).await {
                Ok(watcher) => {
                    let watcher = watcher.with_poll_interval(self.poll_interval);
                    let handle = tokio::spawn(consume(self.pipeline.clone(), watcher));
                    info!(app = %self.name, path = %path.display(), "Following source file");
                    tasks.push((path.clone(), handle));
                }
                Err(e) => {
                    error!(app = %self.name, error = %e, "Cannot follow source file, skipping it");
                    failed.push(e);
                }
            }
        }

        Ok(RunningCollector {
            name: self.name,
            tasks,
            failed,
        })
    }
}

async fn consume(pipeline: Arc<Pipeline>, watcher: FileWatcher) {
    let file = watcher.path().display().to_string();
    let lines = watcher.into_lines();
    futures::pin_mut!(lines);

    while let Some(line) = lines.next().await {
        pipeline.handle_line(&file, &line);
    }
}

/// A collector whose pipelines are running in the background
#[derive(Debug)]
pub struct RunningCollector {
    name: String,
    tasks: Vec<(PathBuf, JoinHandle<()>)>,
    failed: Vec<WatchError>,
}

impl RunningCollector {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn active_pipelines(&self) -> usize {
        self.tasks.iter().filter(|(_, task)| !task.is_finished()).count()
    }

    pub fn followed_sources(&self) -> impl Iterator<Item = &Path> {
        self.tasks.iter().map(|(path, _)| path.as_path())
    }

    pub fn failed_sources(&self) -> &[WatchError] {
        &self.failed
    }

    /// Stop every pipeline. Lines not yet read are dropped.
    pub fn abort(&self) {
        for (_, task) in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::build_recorder;
    use crate::relabel::RelabelRules;
    use std::collections::BTreeMap;

    fn test_app(name: &str, source_files: Vec<PathBuf>) -> AppConfig {
        AppConfig {
            name: name.to_string(),
            source_files,
            external_labels: BTreeMap::new(),
            relabel: RelabelRules::default(),
            histogram_buckets: vec![1.0, 10.0],
            poll_interval_ms: Some(10),
        }
    }

    #[test]
    fn test_process_line_rejects_malformed_input() {
        let app = test_app("malformed", vec![]);
        let registry = MetricsRegistry::new(build_recorder(std::slice::from_ref(&app)).unwrap());
        let collector = Collector::new(&app, &registry, Arc::new(ExemplarStore::new()));

        assert!(collector.process_line("{not json").is_err());
        assert!(collector
            .process_line(r#"{"componentName":"a","interfaceName":"b","costTime":"x","returnCode":1,"timestamp":1}"#)
            .is_err());
        assert!(!registry.handle().render().contains("malformed_http_response_count_total{"));
    }

    #[test]
    fn test_handle_line_outcomes() {
        let app = test_app("outcomes", vec![]);
        let registry = MetricsRegistry::new(build_recorder(std::slice::from_ref(&app)).unwrap());
        let collector = Collector::new(&app, &registry, Arc::new(ExemplarStore::new()));
        let pipeline = &collector.pipeline;

        let ok = r#"{"componentName":"auth","interfaceName":"login","costTime":1,"returnCode":200,"timestamp":1}"#;
        assert_eq!(pipeline.handle_line("a.log", ok), LineOutcome::Recorded);
        assert_eq!(pipeline.handle_line("a.log", ""), LineOutcome::Blank);
        assert_eq!(pipeline.handle_line("a.log", " \t "), LineOutcome::Blank);
        assert_eq!(pipeline.handle_line("a.log", "{not json"), LineOutcome::Malformed);

        let rendered = registry.handle().render();
        assert!(rendered.contains("outcomes_log_parse_errors_total{file=\"a.log\"} 1"));
    }

    #[tokio::test]
    async fn test_missing_source_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.log");
        std::fs::write(&present, b"").unwrap();
        let missing = dir.path().join("missing.log");

        let app = test_app("isolated", vec![missing, present.clone()]);
        let registry = MetricsRegistry::new(build_recorder(std::slice::from_ref(&app)).unwrap());
        let collector = Collector::new(&app, &registry, Arc::new(ExemplarStore::new()));

        let running = collector.run(&registry).await.unwrap();
        assert_eq!(running.name(), "isolated");
        assert_eq!(running.active_pipelines(), 1);
        assert_eq!(running.failed_sources().len(), 1);
        assert_eq!(running.followed_sources().collect::<Vec<_>>(), vec![present.as_path()]);
        assert!(format!("{:?}", running).contains("isolated"));
        running.abort();
    }

    #[tokio::test]
    async fn test_same_namespace_cannot_run_twice() {
        let app = test_app("twice", vec![]);
        let registry = MetricsRegistry::new(build_recorder(std::slice::from_ref(&app)).unwrap());
        let exemplars = Arc::new(ExemplarStore::new());

        Collector::new(&app, &registry, exemplars.clone())
            .run(&registry)
            .await
            .unwrap();
        let second = Collector::new(&app, &registry, exemplars).run(&registry).await;
        assert!(matches!(second, Err(MetricsError::AlreadyRegistered(_))));
    }
}
