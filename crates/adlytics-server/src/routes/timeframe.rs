use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::json;

use adlytics_core::record::{AgeBracket, Context, Gender, Income};
use adlytics_core::timestamp::TIMESTAMP_FORMAT;
use adlytics_core::{AudienceFilter, CampaignMetrics, Granularity, TimeWindow};

use crate::{error::AppError, routes::campaign::not_loaded, state::AppState};

/// Upper bound on buckets in one time series. Every bucket is a full pass
/// over the campaign and a cache entry, computed under the session lock.
const MAX_SERIES_BUCKETS: i64 = 2_000;

#[derive(Debug, Deserialize)]
pub struct TimeframeQuery {
    /// `YYYY-MM-DD HH:MM:SS`; defaults to the campaign start.
    pub start: Option<String>,
    /// `YYYY-MM-DD HH:MM:SS`; defaults to the campaign end.
    pub end: Option<String>,
    /// `Hourly` | `Daily` | `Weekly`; chosen from the window length when absent.
    pub granularity: Option<String>,
    pub gender: Option<String>,
    pub age: Option<String>,
    pub income: Option<String>,
    pub context: Option<String>,
}

struct ResolvedQuery {
    start: NaiveDateTime,
    end: NaiveDateTime,
    granularity: Granularity,
    filter: AudienceFilter,
}

fn parse_bound(
    raw: Option<&str>,
    fallback: Option<NaiveDateTime>,
    name: &str,
) -> Result<NaiveDateTime, AppError> {
    match raw {
        Some(s) => NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).map_err(|_| {
            AppError::BadRequest(format!("invalid {name}, expected YYYY-MM-DD HH:MM:SS"))
        }),
        None => fallback.ok_or_else(|| {
            AppError::BadRequest(format!("{name} is required for a campaign with no dates"))
        }),
    }
}

fn parse_choice<T>(
    raw: Option<&str>,
    parse: fn(&str) -> Option<T>,
    name: &str,
) -> Result<Option<T>, AppError> {
    match raw {
        None | Some("") => Ok(None),
        Some(s) => parse(s)
            .map(Some)
            .ok_or_else(|| AppError::BadRequest(format!("unknown {name}: {s}"))),
    }
}

fn resolve(query: &TimeframeQuery, metrics: &CampaignMetrics) -> Result<ResolvedQuery, AppError> {
    let start = parse_bound(
        query.start.as_deref(),
        metrics.campaign_start_date().and_then(|t| t.to_naive()),
        "start",
    )?;
    let end = parse_bound(
        query.end.as_deref(),
        metrics.campaign_end_date().and_then(|t| t.to_naive()),
        "end",
    )?;
    if end < start {
        return Err(AppError::BadRequest(
            "end must be on or after start".to_string(),
        ));
    }

    let granularity = match query.granularity.as_deref() {
        None | Some("") => Granularity::auto(start, end),
        Some(raw) => Granularity::parse(raw).ok_or_else(|| {
            AppError::BadRequest("granularity must be one of: Hourly, Daily, Weekly".to_string())
        })?,
    };

    let filter = AudienceFilter {
        gender: parse_choice(query.gender.as_deref(), Gender::parse, "gender")?,
        age: parse_choice(query.age.as_deref(), AgeBracket::parse, "age")?,
        income: parse_choice(query.income.as_deref(), Income::parse, "income")?,
        context: parse_choice(query.context.as_deref(), Context::parse, "context")?,
    };

    Ok(ResolvedQuery {
        start,
        end,
        granularity,
        filter,
    })
}

fn validate_bucket_count(q: &ResolvedQuery) -> Result<(), AppError> {
    let buckets = TimeWindow::new(q.start, q.end).bucket_count(q.granularity);
    if buckets > MAX_SERIES_BUCKETS {
        return Err(AppError::BadRequest(format!(
            "time series too large: {buckets} {} buckets (max {MAX_SERIES_BUCKETS})",
            q.granularity.as_str()
        )));
    }
    Ok(())
}

/// `GET /api/campaign/timeframe`: metrics for one window with optional
/// audience filters.
#[tracing::instrument(skip(state))]
pub async fn get_timeframe(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TimeframeQuery>,
) -> Result<impl IntoResponse, AppError> {
    let mut guard = state.session().await;
    let session = guard.as_mut().ok_or_else(not_loaded)?;
    let q = resolve(&query, &session.metrics)?;

    let engine = &mut session.engine;
    engine.set_gender_filter(q.filter.gender);
    engine.set_age_filter(q.filter.age);
    engine.set_income_filter(q.filter.income);
    engine.set_context_filter(q.filter.context);
    let metrics = engine.compute_for_time_frame(q.start, q.end, q.granularity);

    Ok(Json(json!({
        "data": {
            "start": q.start.format(TIMESTAMP_FORMAT).to_string(),
            "end": q.end.format(TIMESTAMP_FORMAT).to_string(),
            "granularity": q.granularity,
            "filters": engine.filter(),
            "metrics": metrics,
        }
    })))
}

/// `GET /api/campaign/timeseries`: one metrics entry per granularity bucket.
#[tracing::instrument(skip(state))]
pub async fn get_timeseries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TimeframeQuery>,
) -> Result<impl IntoResponse, AppError> {
    let mut guard = state.session().await;
    let session = guard.as_mut().ok_or_else(not_loaded)?;
    let q = resolve(&query, &session.metrics)?;
    validate_bucket_count(&q)?;

    let engine = &mut session.engine;
    engine.set_filter(q.filter);
    let buckets = engine.compute_for_time_frame_with_granularity(q.start, q.end, q.granularity);

    let series: Vec<_> = buckets
        .into_iter()
        .map(|(bucket, metrics)| json!({ "bucket": bucket, "metrics": metrics }))
        .collect();

    Ok(Json(json!({
        "data": {
            "start": q.start.format(TIMESTAMP_FORMAT).to_string(),
            "end": q.end.format(TIMESTAMP_FORMAT).to_string(),
            "granularity": q.granularity,
            "filters": engine.filter(),
            "series": series,
        }
    })))
}
