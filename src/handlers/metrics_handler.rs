use axum::{extract::State, http::StatusCode, response::IntoResponse};

use super::AppState;

/// Handle the Prometheus scrape endpoint
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = state.metrics.render();
    (StatusCode::OK, metrics)
}
