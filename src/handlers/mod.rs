pub mod exemplars;
pub mod health;
pub mod metrics_handler;

use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;

use crate::exemplar::ExemplarStore;

/// Startup outcome of one app, reported by the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct AppStatus {
    pub name: String,
    pub following: Vec<String>,
    pub failed: Vec<String>,
}

/// Shared state of the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<PrometheusHandle>,
    pub exemplars: Arc<ExemplarStore>,
    pub apps: Arc<Vec<AppStatus>>,
}
