use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::AppState;

/// Webhooks parked for operator attention, newest first.
pub async fn list_review_entries(State(state): State<AppState>) -> impl IntoResponse {
    let entries = state.review.list().await;
    Json(json!({
        "count": entries.len(),
        "entries": entries,
    }))
}
