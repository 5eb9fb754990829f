use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A log line that could not be decoded into a record
#[derive(Debug, Error)]
#[error("error while parsing line '{line}': {source}")]
pub struct ParseError {
    pub line: String,
    #[source]
    pub source: serde_json::Error,
}

/// Failure to attach a watcher to a source file
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to open {}: {}", .path.display(), .source)]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to seek to end of {}: {}", .path.display(), .source)]
    Seek {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Metric family construction and registration errors
#[derive(Debug, Error)]
pub enum MetricsError {
    /// The same family name was registered twice
    #[error("metric family '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("invalid histogram buckets for '{name}': {source}")]
    InvalidBuckets {
        name: String,
        #[source]
        source: metrics_exporter_prometheus::BuildError,
    },
}

/// Top-level startup failures of the exporter
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("no source file could be followed, nothing to export")]
    NoActivePipelines,

    #[error(transparent)]
    Metrics(#[from] MetricsError),
}
