use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::labels::DYNAMIC_LABELS;
use crate::relabel::RelabelRules;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub apps: Vec<AppConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9999,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            endpoint: "/metrics".to_string(),
        }
    }
}

/// One followed application: a metric namespace and the log files feeding it
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Metric namespace, prefixed to every family name
    pub name: String,
    pub source_files: Vec<PathBuf>,
    #[serde(default)]
    pub external_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub relabel: RelabelRules,
    #[serde(default = "default_histogram_buckets")]
    pub histogram_buckets: Vec<f64>,
    /// Override of the watcher polling interval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
}

impl AppConfig {
    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }
}

fn default_histogram_buckets() -> Vec<f64> {
    vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
}

/// Routes served next to the metrics endpoint
const RESERVED_PATHS: [&str; 2] = ["/health", "/exemplars"];

pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).format(config::FileFormat::Toml))
        .add_source(config::Environment::with_prefix("LOG_EXPORTER").separator("__"))
        .build()
        .with_context(|| format!("failed to read configuration from {}", path.display()))?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if !matches!(cfg.server.log_format.as_str(), "text" | "json") {
        anyhow::bail!(
            "Invalid log format '{}', expected 'text' or 'json'",
            cfg.server.log_format
        );
    }

    if !cfg.metrics.endpoint.starts_with('/') {
        anyhow::bail!("Metrics endpoint '{}' must start with '/'", cfg.metrics.endpoint);
    }
    if RESERVED_PATHS.contains(&cfg.metrics.endpoint.as_str()) {
        anyhow::bail!("Metrics endpoint '{}' is reserved", cfg.metrics.endpoint);
    }

    if cfg.apps.is_empty() {
        anyhow::bail!("At least one app must be configured");
    }

    let mut names = HashSet::new();
    for app in &cfg.apps {
        if !names.insert(app.name.as_str()) {
            anyhow::bail!("App name '{}' is configured more than once", app.name);
        }
        validate_app(app)?;
    }

    Ok(())
}

fn validate_app(app: &AppConfig) -> anyhow::Result<()> {
    if !is_valid_metric_name(&app.name) {
        anyhow::bail!("App name '{}' is not a valid metric namespace", app.name);
    }

    if app.source_files.is_empty() {
        anyhow::bail!("App '{}' has no source files", app.name);
    }

    if app.histogram_buckets.is_empty() {
        anyhow::bail!("App '{}' has no histogram buckets", app.name);
    }
    if app.histogram_buckets.iter().any(|b| !b.is_finite()) {
        anyhow::bail!("App '{}' has a non-finite histogram bucket", app.name);
    }
    if app.histogram_buckets.windows(2).any(|w| w[0] >= w[1]) {
        anyhow::bail!("App '{}' histogram buckets must be strictly increasing", app.name);
    }

    for label in app.external_labels.keys() {
        if !is_valid_label_name(label) || label.starts_with("__") {
            anyhow::bail!("App '{}' has invalid external label name '{}'", app.name, label);
        }
        if DYNAMIC_LABELS.iter().any(|d| d.eq_ignore_ascii_case(label)) {
            anyhow::bail!(
                "App '{}' external label '{}' collides with a dynamic label",
                app.name,
                label
            );
        }
    }

    let mut relabeled = HashSet::new();
    for label in app.relabel.labels() {
        if !relabeled.insert(label.to_ascii_lowercase()) {
            anyhow::bail!(
                "App '{}' has more than one relabel rule for label '{}'",
                app.name,
                label
            );
        }
        if !DYNAMIC_LABELS.iter().any(|d| d.eq_ignore_ascii_case(label)) {
            anyhow::bail!(
                "App '{}' has a relabel rule for unknown label '{}' (expected one of {:?})",
                app.name,
                label,
                DYNAMIC_LABELS
            );
        }
    }

    if app.poll_interval_ms == Some(0) {
        anyhow::bail!("App '{}' poll_interval_ms must be greater than zero", app.name);
    }

    Ok(())
}

fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
