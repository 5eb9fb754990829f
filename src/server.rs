use anyhow::Result;
use axum::{routing::get, Router};
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    collector::{Collector, RunningCollector},
    config::Config,
    error::ExporterError,
    exemplar::ExemplarStore,
    handlers::{self, AppState, AppStatus},
    metrics::{build_recorder, spawn_upkeep, MetricsRegistry, UPKEEP_INTERVAL},
    signals::setup_signal_handlers,
};

/// Start the exporter
///
/// This function:
/// 1. Builds the Prometheus recorder with every app's histogram buckets
/// 2. Starts one collector per configured app and the recorder upkeep task
/// 3. Sets up signal handlers for graceful shutdown
/// 4. Serves the scrape endpoint until a shutdown signal arrives
pub async fn start_server(config: Config) -> Result<()> {
    info!("Initializing Prometheus recorder...");
    let registry = MetricsRegistry::new(build_recorder(&config.apps)?);
    let exemplars = Arc::new(ExemplarStore::new());

    let running = start_collectors(&config, &registry, exemplars.clone()).await?;
    let apps: Vec<AppStatus> = running.iter().map(app_status).collect();
    let upkeep = spawn_upkeep(registry.handle(), UPKEEP_INTERVAL);

    // Setup signal handlers (SIGTERM, SIGINT for shutdown)
    let (shutdown_tx, signal_handle) = setup_signal_handlers();
    let mut shutdown_rx = shutdown_tx.subscribe();

    let state = AppState {
        metrics: Arc::new(registry.handle()),
        exemplars,
        apps: Arc::new(apps),
    };
    let app = create_router(&config.metrics.endpoint, state);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));
    info!("Serving metrics on http://{}{}", addr, config.metrics.endpoint);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Shutdown signal received, stopping exporter...");
        })
        .await?;

    signal_handle.await?;
    upkeep.abort();
    for collector in &running {
        collector.abort();
    }
    info!("Exporter stopped");

    Ok(())
}

/// Construct and run a collector for every app.
///
/// Sources that cannot be opened are skipped, but at least one pipeline
/// must come up for the exporter to be useful.
pub async fn start_collectors(
    config: &Config,
    registry: &MetricsRegistry,
    exemplars: Arc<ExemplarStore>,
) -> Result<Vec<RunningCollector>, ExporterError> {
    let mut running = Vec::with_capacity(config.apps.len());
    for app in &config.apps {
        let collector = Collector::new(app, registry, exemplars.clone());
        running.push(collector.run(registry).await?);
    }

    let active: usize = running.iter().map(RunningCollector::active_pipelines).sum();
    if active == 0 {
        return Err(ExporterError::NoActivePipelines);
    }

    info!(apps = running.len(), pipelines = active, "Collectors running");
    Ok(running)
}

fn app_status(collector: &RunningCollector) -> AppStatus {
    AppStatus {
        name: collector.name().to_string(),
        following: collector
            .followed_sources()
            .map(|p| p.display().to_string())
            .collect(),
        failed: collector
            .failed_sources()
            .iter()
            .map(|e| e.to_string())
            .collect(),
    }
}

/// Create the Axum router with all routes and middleware
fn create_router(metrics_endpoint: &str, state: AppState) -> Router {
    Router::new()
        .route(metrics_endpoint, get(handlers::metrics_handler::metrics))
        .route("/health", get(handlers::health::health_check))
        .route("/exemplars", get(handlers::exemplars::list_exemplars))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
