use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use adlytics_core::{ingest::ingest_bundle, BounceCriteria};

use crate::{
    error::AppError,
    state::{AppState, CampaignSession},
};

pub(crate) fn not_loaded() -> AppError {
    AppError::NotFound("No campaign loaded".to_string())
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    /// Raw CSV text of the impression, click and server logs, in any order.
    pub blocks: Vec<String>,
}

/// `POST /api/campaign`: ingest a three-block bundle and make it the loaded
/// campaign.
///
/// A bundle with a block count other than three is rejected with 400 and the
/// previously loaded campaign stays in place.
#[tracing::instrument(skip(state, req))]
pub async fn upload_campaign(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UploadRequest>,
) -> Result<impl IntoResponse, AppError> {
    let campaign = ingest_bundle(req.blocks.as_slice())?;
    let summary = state.load_campaign(campaign).await;
    Ok((StatusCode::CREATED, Json(json!({ "data": summary }))))
}

/// `GET /api/campaign/metrics`: whole-campaign snapshot, date range and
/// bounce thresholds.
pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let guard = state.session().await;
    let session = guard.as_ref().ok_or_else(not_loaded)?;
    Ok(Json(json!({ "data": session.metrics.summary() })))
}

#[derive(Debug, Deserialize)]
pub struct BounceRequest {
    pub pages: i64,
    pub seconds: i64,
}

/// `PUT /api/campaign/bounce`: change the bounce thresholds.
///
/// Negative values → 400 with no state change.
#[tracing::instrument(skip(state))]
pub async fn set_bounce(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BounceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let criteria = BounceCriteria::new(req.pages, req.seconds)?;

    let mut guard = state.session().await;
    let session: &mut CampaignSession = guard.as_mut().ok_or_else(not_loaded)?;
    session.set_bounce_criteria(criteria);
    Ok(Json(json!({ "data": session.metrics.summary() })))
}

/// `POST /api/campaign/cache/clear`: drop memoized filtered results.
pub async fn clear_cache(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let mut guard = state.session().await;
    let session = guard.as_mut().ok_or_else(not_loaded)?;
    let cleared = session.engine.cached_results();
    session.engine.clear_caches();
    tracing::debug!(cleared, "metrics cache cleared");
    Ok(Json(json!({ "data": { "cleared": cleared } })))
}
