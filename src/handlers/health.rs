use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use super::AppState;

/// Liveness plus the sources each app is following
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let degraded = state.apps.iter().any(|app| !app.failed.is_empty());

    Json(json!({
        "status": if degraded { "degraded" } else { "ok" },
        "version": env!("CARGO_PKG_VERSION"),
        "apps": state.apps.as_slice(),
    }))
}
