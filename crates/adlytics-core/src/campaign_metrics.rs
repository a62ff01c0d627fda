//! Whole-campaign metric snapshot.

use std::sync::Arc;

use serde::Serialize;

use crate::campaign::Campaign;
use crate::error::CoreError;
use crate::metrics::{count_bounces, BounceCriteria, ComputedMetrics, Tally};
use crate::timestamp::Timestamp;

/// Metrics over every record of a campaign.
///
/// Computed once on construction. Changing the bounce criteria recomputes
/// the bounce count and bounce rate in place and leaves everything else
/// untouched. Not safe for concurrent mutation; wrap in a lock to share.
#[derive(Debug, Clone)]
pub struct CampaignMetrics {
    campaign: Arc<Campaign>,
    criteria: BounceCriteria,
    snapshot: ComputedMetrics,
    start: Option<Timestamp>,
    end: Option<Timestamp>,
}

/// Serializable view handed to presentation and persistence layers.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignSummary {
    #[serde(flatten)]
    pub metrics: ComputedMetrics,
    pub start_date: Option<Timestamp>,
    pub end_date: Option<Timestamp>,
    pub bounce_pages: u32,
    pub bounce_seconds: u32,
}

impl CampaignMetrics {
    /// Compute with the default thresholds (1 page, 4 seconds).
    pub fn compute(campaign: Arc<Campaign>) -> Self {
        Self::with_criteria(campaign, BounceCriteria::default())
    }

    pub fn with_criteria(campaign: Arc<Campaign>, criteria: BounceCriteria) -> Self {
        let mut tally = Tally::default();
        for rec in campaign.impressions() {
            tally.impression(rec);
        }
        for rec in campaign.clicks() {
            tally.click(rec);
        }
        for rec in campaign.visits() {
            tally.visit(rec, &criteria);
        }
        let snapshot = tally.finish();

        let range = campaign.date_range();
        let start = range.map(|(lo, _)| Timestamp::from_naive(lo));
        let end = range.map(|(_, hi)| Timestamp::from_naive(hi));

        tracing::debug!(
            impressions = snapshot.impressions,
            clicks = snapshot.clicks,
            visits = campaign.visits().len(),
            "campaign metrics computed"
        );

        Self {
            campaign,
            criteria,
            snapshot,
            start,
            end,
        }
    }

    /// Replace the bounce thresholds. Fails without side effects when either
    /// value is negative.
    pub fn set_bounce_criteria(&mut self, pages: i64, seconds: i64) -> Result<(), CoreError> {
        let criteria = BounceCriteria::new(pages, seconds)?;
        self.apply_bounce_criteria(criteria);
        Ok(())
    }

    pub fn apply_bounce_criteria(&mut self, criteria: BounceCriteria) {
        self.criteria = criteria;
        let bounces = count_bounces(self.campaign.visits(), &criteria);
        self.snapshot = self.snapshot.clone().with_bounces(bounces);
    }

    pub fn campaign(&self) -> &Arc<Campaign> {
        &self.campaign
    }

    pub fn snapshot(&self) -> &ComputedMetrics {
        &self.snapshot
    }

    pub fn bounce_criteria(&self) -> BounceCriteria {
        self.criteria
    }

    pub fn impressions(&self) -> u64 {
        self.snapshot.impressions
    }

    pub fn clicks(&self) -> u64 {
        self.snapshot.clicks
    }

    pub fn uniques(&self) -> u64 {
        self.snapshot.uniques
    }

    pub fn bounces(&self) -> u64 {
        self.snapshot.bounces
    }

    pub fn conversions(&self) -> u64 {
        self.snapshot.conversions
    }

    pub fn total_cost(&self) -> f64 {
        self.snapshot.total_cost
    }

    pub fn ctr(&self) -> f64 {
        self.snapshot.ctr
    }

    pub fn cpc(&self) -> f64 {
        self.snapshot.cpc
    }

    pub fn cpa(&self) -> f64 {
        self.snapshot.cpa
    }

    pub fn cpm(&self) -> f64 {
        self.snapshot.cpm
    }

    pub fn bounce_rate(&self) -> f64 {
        self.snapshot.bounce_rate
    }

    pub fn campaign_start_date(&self) -> Option<Timestamp> {
        self.start
    }

    pub fn campaign_end_date(&self) -> Option<Timestamp> {
        self.end
    }

    pub fn summary(&self) -> CampaignSummary {
        CampaignSummary {
            metrics: self.snapshot.clone(),
            start_date: self.start,
            end_date: self.end,
            bounce_pages: self.criteria.pages(),
            bounce_seconds: self.criteria.seconds(),
        }
    }
}
