//! Metric snapshot types and the shared aggregation rules.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::CoreError;
use crate::record::{ClickRecord, ImpressionRecord, ServerVisitRecord};

/// CPM is reported per thousand impressions everywhere.
pub const CPM_SCALE: f64 = 1000.0;

pub const DEFAULT_BOUNCE_PAGES: u32 = 1;
pub const DEFAULT_BOUNCE_SECONDS: u32 = 4;

/// Thresholds deciding whether a visit is a bounce. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BounceCriteria {
    pages: u32,
    seconds: u32,
}

impl Default for BounceCriteria {
    fn default() -> Self {
        Self {
            pages: DEFAULT_BOUNCE_PAGES,
            seconds: DEFAULT_BOUNCE_SECONDS,
        }
    }
}

impl BounceCriteria {
    /// Zero is allowed; negative values are rejected. Values beyond
    /// `u32::MAX` saturate.
    pub fn new(pages: i64, seconds: i64) -> Result<Self, CoreError> {
        Ok(Self {
            pages: threshold(pages, "pages")?,
            seconds: threshold(seconds, "seconds")?,
        })
    }

    pub fn pages(&self) -> u32 {
        self.pages
    }

    pub fn seconds(&self) -> u32 {
        self.seconds
    }

    /// A visit bounces when it viewed at most `pages` pages or lasted at most
    /// `seconds` seconds. A rule whose input is missing (invalid page count,
    /// absent or invalid exit) simply does not fire.
    pub fn is_bounce(&self, visit: &ServerVisitRecord) -> bool {
        let few_pages = visit.pages_viewed.is_some_and(|p| p <= self.pages);
        let short_stay = visit
            .duration_seconds()
            .is_some_and(|d| d <= i64::from(self.seconds));
        few_pages || short_stay
    }
}

fn threshold(value: i64, name: &str) -> Result<u32, CoreError> {
    if value < 0 {
        return Err(CoreError::InvalidArgument(format!(
            "bounce {name} threshold must not be negative: {value}"
        )));
    }
    Ok(u32::try_from(value).unwrap_or(u32::MAX))
}

/// `numerator / denominator`, or 0 when the denominator is 0.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// One computed set of campaign metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComputedMetrics {
    pub impressions: u64,
    pub clicks: u64,
    /// Distinct visitor ids among clicks.
    pub uniques: u64,
    pub bounces: u64,
    pub conversions: u64,
    pub total_cost: f64,
    pub ctr: f64,
    pub cpc: f64,
    pub cpa: f64,
    pub cpm: f64,
    pub bounce_rate: f64,
}

impl ComputedMetrics {
    pub(crate) fn derive_ratios(mut self) -> Self {
        let impressions = self.impressions as f64;
        let clicks = self.clicks as f64;
        self.ctr = ratio(clicks, impressions);
        self.cpc = ratio(self.total_cost, clicks);
        self.cpa = ratio(self.total_cost, self.conversions as f64);
        self.cpm = ratio(self.total_cost, impressions) * CPM_SCALE;
        self.bounce_rate = ratio(self.bounces as f64, clicks);
        self
    }

    /// Replace the bounce count, recomputing only the bounce rate.
    pub(crate) fn with_bounces(mut self, bounces: u64) -> Self {
        self.bounces = bounces;
        self.bounce_rate = ratio(bounces as f64, self.clicks as f64);
        self
    }
}

/// Running totals fed record by record, finished into a [`ComputedMetrics`].
#[derive(Debug, Default)]
pub(crate) struct Tally<'a> {
    impressions: u64,
    clicks: u64,
    click_visitors: HashSet<&'a str>,
    bounces: u64,
    conversions: u64,
    cost: f64,
}

impl<'a> Tally<'a> {
    pub(crate) fn impression(&mut self, rec: &'a ImpressionRecord) {
        self.impressions += 1;
        self.cost += rec.cost.unwrap_or(0.0);
    }

    pub(crate) fn click(&mut self, rec: &'a ClickRecord) {
        self.clicks += 1;
        self.click_visitors.insert(rec.visitor_id.as_str());
        self.cost += rec.cost.unwrap_or(0.0);
    }

    pub(crate) fn visit(&mut self, rec: &ServerVisitRecord, criteria: &BounceCriteria) {
        if criteria.is_bounce(rec) {
            self.bounces += 1;
        }
        if rec.is_conversion() {
            self.conversions += 1;
        }
    }

    pub(crate) fn finish(self) -> ComputedMetrics {
        ComputedMetrics {
            impressions: self.impressions,
            clicks: self.clicks,
            uniques: self.click_visitors.len() as u64,
            bounces: self.bounces,
            conversions: self.conversions,
            total_cost: self.cost,
            ..ComputedMetrics::default()
        }
        .derive_ratios()
    }
}

/// Count bounces over a set of visits.
pub(crate) fn count_bounces(visits: &[ServerVisitRecord], criteria: &BounceCriteria) -> u64 {
    visits.iter().filter(|v| criteria.is_bounce(v)).count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visit(entry: &str, exit: &str, pages: &str) -> ServerVisitRecord {
        ServerVisitRecord::from_fields(entry, "1", exit, pages, "No")
    }

    #[test]
    fn negative_thresholds_rejected() {
        assert!(matches!(
            BounceCriteria::new(-1, 4),
            Err(CoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            BounceCriteria::new(1, -4),
            Err(CoreError::InvalidArgument(_))
        ));
        let zero = BounceCriteria::new(0, 0).expect("zero is valid");
        assert_eq!((zero.pages(), zero.seconds()), (0, 0));
    }

    #[test]
    fn huge_thresholds_saturate() {
        let wide = BounceCriteria::new(i64::MAX, i64::from(u32::MAX) + 1).expect("non-negative");
        assert_eq!((wide.pages(), wide.seconds()), (u32::MAX, u32::MAX));
        let v = visit("2025-03-16 05:28:00", "2025-03-16 09:00:00", "500");
        assert!(wide.is_bounce(&v));
    }

    #[test]
    fn duration_at_threshold_is_bounce() {
        let criteria = BounceCriteria::default();
        let v = visit("2025-03-16 05:28:00", "2025-03-16 05:28:04", "2");
        assert!(criteria.is_bounce(&v));
        let v = visit("2025-03-16 05:28:00", "2025-03-16 05:28:05", "2");
        assert!(!criteria.is_bounce(&v));
    }

    #[test]
    fn pages_at_threshold_is_bounce() {
        let criteria = BounceCriteria::new(3, 4).expect("criteria");
        let long_exit = "2025-03-16 06:00:00";
        assert!(criteria.is_bounce(&visit("2025-03-16 05:28:00", long_exit, "3")));
        assert!(!criteria.is_bounce(&visit("2025-03-16 05:28:00", long_exit, "4")));
    }

    #[test]
    fn missing_inputs_disable_their_rule() {
        let criteria = BounceCriteria::default();
        // No exit: pages rule still decides.
        assert!(criteria.is_bounce(&visit("2025-03-16 05:28:00", "n/a", "1")));
        assert!(!criteria.is_bounce(&visit("2025-03-16 05:28:00", "n/a", "5")));
        // Invalid page count: duration rule still decides.
        assert!(criteria.is_bounce(&visit("2025-03-16 05:28:00", "2025-03-16 05:28:01", "0")));
        assert!(!criteria.is_bounce(&visit("2025-03-16 05:28:00", "2025-03-16 05:38:00", "0")));
    }

    #[test]
    fn ratios_guard_zero_denominators() {
        let m = ComputedMetrics::default().derive_ratios();
        assert_eq!(m.ctr, 0.0);
        assert_eq!(m.cpc, 0.0);
        assert_eq!(m.cpa, 0.0);
        assert_eq!(m.cpm, 0.0);
        assert_eq!(m.bounce_rate, 0.0);
    }

    #[test]
    fn ratio_laws() {
        let m = ComputedMetrics {
            impressions: 200,
            clicks: 10,
            bounces: 4,
            conversions: 2,
            total_cost: 50.0,
            ..ComputedMetrics::default()
        }
        .derive_ratios();
        assert_eq!(m.ctr, 10.0 / 200.0);
        assert_eq!(m.cpc, 5.0);
        assert_eq!(m.cpa, 25.0);
        assert_eq!(m.cpm, 50.0 / 200.0 * 1000.0);
        assert_eq!(m.bounce_rate, 0.4);
    }
}
