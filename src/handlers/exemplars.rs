use axum::{extract::State, response::IntoResponse, Json};

use super::AppState;

/// Latest exemplar of every histogram series
pub async fn list_exemplars(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.exemplars.snapshot())
}
