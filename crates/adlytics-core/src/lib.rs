//! Campaign log validation, aggregation and filtered metrics.

pub mod campaign;
pub mod campaign_metrics;
pub mod config;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod record;
pub mod timestamp;

pub use campaign::Campaign;
pub use campaign_metrics::{CampaignMetrics, CampaignSummary};
pub use engine::{AudienceFilter, FilteredMetricsEngine, Granularity, TimeWindow};
pub use error::CoreError;
pub use metrics::{BounceCriteria, ComputedMetrics};
pub use timestamp::Timestamp;
