use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

/// `GET /health`: liveness check.
///
/// Always `200 OK`; `campaign_loaded` tells whether metric routes will answer.
///
/// Response shape:
/// ```json
/// { "status": "ok", "version": "0.1.0", "campaign_loaded": true }
/// ```
#[tracing::instrument(skip(state))]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "campaign_loaded": state.is_loaded().await,
        })),
    )
}
