use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use adlytics_core::{
    BounceCriteria, Campaign, CampaignMetrics, CampaignSummary, FilteredMetricsEngine,
};

use crate::config::Config;

/// The loaded campaign with its whole-campaign snapshot and query engine.
///
/// Both share one immutable record set. Neither is safe for concurrent
/// mutation, so the pair lives behind a single lock in [`AppState`].
#[derive(Debug)]
pub struct CampaignSession {
    pub metrics: CampaignMetrics,
    pub engine: FilteredMetricsEngine,
}

impl CampaignSession {
    pub fn new(campaign: Campaign, criteria: BounceCriteria) -> Self {
        let campaign = Arc::new(campaign);
        Self {
            metrics: CampaignMetrics::with_criteria(Arc::clone(&campaign), criteria),
            engine: FilteredMetricsEngine::with_criteria(campaign, criteria),
        }
    }

    /// Apply new bounce thresholds to both the snapshot and the engine.
    pub fn set_bounce_criteria(&mut self, criteria: BounceCriteria) {
        self.metrics.apply_bounce_criteria(criteria);
        self.engine.apply_bounce_criteria(criteria);
    }
}

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
pub struct AppState {
    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,

    /// Currently loaded campaign, if any.
    ///
    /// Filter setters and cache reads in the engine are read-modify-write, so
    /// every request holds the lock for the whole query.
    session: Mutex<Option<CampaignSession>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            session: Mutex::new(None),
        }
    }

    /// Replace the loaded campaign. Thresholds start from the configured
    /// defaults.
    pub async fn load_campaign(&self, campaign: Campaign) -> CampaignSummary {
        let session = CampaignSession::new(campaign, self.config.bounce);
        let summary = session.metrics.summary();
        info!(
            impressions = summary.metrics.impressions,
            clicks = summary.metrics.clicks,
            "Campaign loaded"
        );
        *self.session.lock().await = Some(session);
        summary
    }

    pub async fn session(&self) -> MutexGuard<'_, Option<CampaignSession>> {
        self.session.lock().await
    }

    pub async fn is_loaded(&self) -> bool {
        self.session.lock().await.is_some()
    }
}
