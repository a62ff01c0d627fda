use chrono::NaiveDateTime;

use crate::record::{ClickRecord, ImpressionRecord, ServerVisitRecord};
use crate::timestamp::Timestamp;

/// The three record sets of one loaded campaign. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Campaign {
    impressions: Vec<ImpressionRecord>,
    clicks: Vec<ClickRecord>,
    visits: Vec<ServerVisitRecord>,
}

impl Campaign {
    /// Missing record sets are treated as empty.
    pub fn new(
        impressions: Option<Vec<ImpressionRecord>>,
        clicks: Option<Vec<ClickRecord>>,
        visits: Option<Vec<ServerVisitRecord>>,
    ) -> Self {
        Self {
            impressions: impressions.unwrap_or_default(),
            clicks: clicks.unwrap_or_default(),
            visits: visits.unwrap_or_default(),
        }
    }

    pub fn impressions(&self) -> &[ImpressionRecord] {
        &self.impressions
    }

    pub fn clicks(&self) -> &[ClickRecord] {
        &self.clicks
    }

    pub fn visits(&self) -> &[ServerVisitRecord] {
        &self.visits
    }

    pub fn is_empty(&self) -> bool {
        self.impressions.is_empty() && self.clicks.is_empty() && self.visits.is_empty()
    }

    /// Every usable timestamp across impressions, clicks, visit entries and
    /// visit exits.
    fn timestamps(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        let impressions = self.impressions.iter().map(|r| &r.timestamp);
        let clicks = self.clicks.iter().map(|r| &r.timestamp);
        let visits = self.visits.iter().flat_map(|r| [&r.entry, &r.exit]);
        impressions
            .chain(clicks)
            .chain(visits)
            .filter_map(Timestamp::to_naive)
    }

    /// Earliest and latest valid timestamp of any record kind.
    pub fn date_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        self.timestamps().fold(None, |range, ts| match range {
            None => Some((ts, ts)),
            Some((lo, hi)) => Some((lo.min(ts), hi.max(ts))),
        })
    }
}
