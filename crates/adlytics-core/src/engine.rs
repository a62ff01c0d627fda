//! Time-window, audience and granularity filtered metrics with memoization.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::campaign::Campaign;
use crate::error::CoreError;
use crate::metrics::{BounceCriteria, ComputedMetrics, Tally};
use crate::record::{AgeBracket, Context, Gender, ImpressionRecord, Income};
use crate::timestamp::Timestamp;

/// Reporting bucket width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    Hourly,
    Daily,
    Weekly,
}

impl Granularity {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "Hourly" | "hourly" | "hour" => Some(Self::Hourly),
            "Daily" | "daily" | "day" => Some(Self::Daily),
            "Weekly" | "weekly" | "week" => Some(Self::Weekly),
            _ => None,
        }
    }

    /// Auto-granularity: ≤2 days → hourly, 3 to 60 → daily, >60 → weekly.
    pub fn auto(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        let days = (end.date() - start.date()).num_days() + 1;
        if days <= 2 {
            Self::Hourly
        } else if days <= 60 {
            Self::Daily
        } else {
            Self::Weekly
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "Hourly",
            Self::Daily => "Daily",
            Self::Weekly => "Weekly",
        }
    }
}

/// Audience and placement filters on impressions. `None` means unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct AudienceFilter {
    pub gender: Option<Gender>,
    pub age: Option<AgeBracket>,
    pub income: Option<Income>,
    pub context: Option<Context>,
}

impl AudienceFilter {
    pub fn is_empty(&self) -> bool {
        self.gender.is_none()
            && self.age.is_none()
            && self.income.is_none()
            && self.context.is_none()
    }

    /// An unset filter accepts anything; a set one requires an equal, valid
    /// field on the impression.
    pub fn matches(&self, rec: &ImpressionRecord) -> bool {
        fn accepts<T: PartialEq>(wanted: Option<T>, actual: Option<T>) -> bool {
            wanted.is_none() || wanted == actual
        }
        accepts(self.gender, rec.gender)
            && accepts(self.age, rec.age)
            && accepts(self.income, rec.income)
            && accepts(self.context, rec.context)
    }
}

/// Inclusive `[start, end]` time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// Timestamps that are invalid or absent are never inside a window.
    pub fn contains(&self, ts: &Timestamp) -> bool {
        ts.to_naive()
            .is_some_and(|t| self.start <= t && t <= self.end)
    }

    /// Number of buckets [`TimeWindow::buckets`] would produce, without
    /// building them.
    pub fn bucket_count(&self, granularity: Granularity) -> i64 {
        if self.end < self.start {
            return 0;
        }
        match granularity {
            Granularity::Hourly => {
                let floor = |t: NaiveDateTime| t.date().and_hms_opt(t.hour(), 0, 0).unwrap_or(t);
                (floor(self.end) - floor(self.start)).num_hours() + 1
            }
            Granularity::Daily => (self.end.date() - self.start.date()).num_days() + 1,
            Granularity::Weekly => (self.end - self.start).num_weeks() + 1,
        }
    }

    /// Split the window into consecutive, non-overlapping buckets.
    ///
    /// Hourly and daily buckets are aligned to the wall clock and calendar;
    /// weekly buckets are seven-day spans counted from `start`. The first and
    /// last buckets are clipped to the window. An inverted window has no
    /// buckets.
    pub fn buckets(&self, granularity: Granularity) -> Vec<(String, TimeWindow)> {
        let mut buckets = Vec::new();
        let mut cursor = self.start;
        while cursor <= self.end {
            let next = match granularity {
                Granularity::Hourly => cursor
                    .with_minute(0)
                    .and_then(|t| t.with_second(0))
                    .and_then(|t| t.with_nanosecond(0))
                    .and_then(|t| t.checked_add_signed(Duration::hours(1))),
                Granularity::Daily => cursor
                    .date()
                    .succ_opt()
                    .and_then(|d| d.and_hms_opt(0, 0, 0)),
                Granularity::Weekly => cursor.checked_add_signed(Duration::days(7)),
            };
            let label = match granularity {
                Granularity::Hourly => cursor.format("%Y-%m-%d %H:00").to_string(),
                Granularity::Daily | Granularity::Weekly => cursor.format("%Y-%m-%d").to_string(),
            };
            let bucket_end = next
                .and_then(|n| n.checked_sub_signed(Duration::seconds(1)))
                .map_or(self.end, |e| e.min(self.end));
            buckets.push((label, TimeWindow::new(cursor, bucket_end)));
            match next {
                Some(n) => cursor = n,
                None => break,
            }
        }
        buckets
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    window: TimeWindow,
    granularity: Granularity,
    filter: AudienceFilter,
    criteria: BounceCriteria,
}

/// Metrics over a time window, restricted by optional audience filters.
///
/// Impressions are filtered on their own audience fields. Clicks and visits
/// carry no audience fields, so while any filter is set they are admitted
/// only when their visitor id belongs to an impression matching the
/// filters anywhere in the campaign.
///
/// Results are memoized per (window, granularity, filters, bounce criteria);
/// changing a filter never serves a stale entry. The engine owns its cache
/// and is meant for one query session at a time.
#[derive(Debug)]
pub struct FilteredMetricsEngine {
    campaign: Arc<Campaign>,
    criteria: BounceCriteria,
    filter: AudienceFilter,
    cache: HashMap<CacheKey, ComputedMetrics>,
    audiences: HashMap<AudienceFilter, Arc<HashSet<String>>>,
}

impl FilteredMetricsEngine {
    pub fn new(campaign: Arc<Campaign>) -> Self {
        Self::with_criteria(campaign, BounceCriteria::default())
    }

    pub fn with_criteria(campaign: Arc<Campaign>, criteria: BounceCriteria) -> Self {
        Self {
            campaign,
            criteria,
            filter: AudienceFilter::default(),
            cache: HashMap::new(),
            audiences: HashMap::new(),
        }
    }

    pub fn set_gender_filter(&mut self, gender: Option<Gender>) {
        self.filter.gender = gender;
    }

    pub fn set_age_filter(&mut self, age: Option<AgeBracket>) {
        self.filter.age = age;
    }

    pub fn set_income_filter(&mut self, income: Option<Income>) {
        self.filter.income = income;
    }

    pub fn set_context_filter(&mut self, context: Option<Context>) {
        self.filter.context = context;
    }

    pub fn set_filter(&mut self, filter: AudienceFilter) {
        self.filter = filter;
    }

    pub fn filter(&self) -> AudienceFilter {
        self.filter
    }

    pub fn gender_filter(&self) -> Option<Gender> {
        self.filter.gender
    }

    pub fn age_filter(&self) -> Option<AgeBracket> {
        self.filter.age
    }

    pub fn income_filter(&self) -> Option<Income> {
        self.filter.income
    }

    pub fn context_filter(&self) -> Option<Context> {
        self.filter.context
    }

    pub fn bounce_criteria(&self) -> BounceCriteria {
        self.criteria
    }

    pub fn set_bounce_criteria(&mut self, pages: i64, seconds: i64) -> Result<(), CoreError> {
        self.criteria = BounceCriteria::new(pages, seconds)?;
        Ok(())
    }

    pub fn apply_bounce_criteria(&mut self, criteria: BounceCriteria) {
        self.criteria = criteria;
    }

    /// Drop all memoized results. Filters and thresholds are kept.
    pub fn clear_caches(&mut self) {
        self.cache.clear();
        self.audiences.clear();
    }

    pub fn cached_results(&self) -> usize {
        self.cache.len()
    }

    /// Metrics for records inside `[start, end]`. An inverted or empty window
    /// yields all-zero metrics.
    pub fn compute_for_time_frame(
        &mut self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        granularity: Granularity,
    ) -> ComputedMetrics {
        let key = CacheKey {
            window: TimeWindow::new(start, end),
            granularity,
            filter: self.filter,
            criteria: self.criteria,
        };
        if let Some(hit) = self.cache.get(&key) {
            tracing::trace!(%start, %end, "metrics cache hit");
            return hit.clone();
        }
        tracing::trace!(%start, %end, "metrics cache miss");

        let audience = self.audience_ids();
        let metrics = self.compute_window(&key.window, audience.as_deref());
        self.cache.insert(key, metrics.clone());
        metrics
    }

    /// One entry per `granularity` bucket covering `[start, end]`, keyed by
    /// bucket label. Labels sort chronologically. Additive metrics summed over
    /// the buckets equal the single-window result.
    pub fn compute_for_time_frame_with_granularity(
        &mut self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        granularity: Granularity,
    ) -> BTreeMap<String, ComputedMetrics> {
        TimeWindow::new(start, end)
            .buckets(granularity)
            .into_iter()
            .map(|(label, bucket)| {
                let metrics = self.compute_for_time_frame(bucket.start, bucket.end, granularity);
                (label, metrics)
            })
            .collect()
    }

    /// Visitor ids of impressions matching the current filter, or `None`
    /// when no filter is set.
    fn audience_ids(&mut self) -> Option<Arc<HashSet<String>>> {
        if self.filter.is_empty() {
            return None;
        }
        let filter = self.filter;
        let campaign = &self.campaign;
        let ids = self.audiences.entry(filter).or_insert_with(|| {
            Arc::new(
                campaign
                    .impressions()
                    .iter()
                    .filter(|rec| filter.matches(rec))
                    .map(|rec| rec.visitor_id.clone())
                    .collect(),
            )
        });
        Some(Arc::clone(ids))
    }

    fn compute_window(
        &self,
        window: &TimeWindow,
        audience: Option<&HashSet<String>>,
    ) -> ComputedMetrics {
        let admitted = |id: &str| audience.map_or(true, |ids| ids.contains(id));
        let mut tally = Tally::default();

        for rec in self.campaign.impressions() {
            if window.contains(&rec.timestamp) && self.filter.matches(rec) {
                tally.impression(rec);
            }
        }
        for rec in self.campaign.clicks() {
            if window.contains(&rec.timestamp) && admitted(rec.visitor_id.as_str()) {
                tally.click(rec);
            }
        }
        for rec in self.campaign.visits() {
            if window.contains(&rec.entry) && admitted(rec.visitor_id.as_str()) {
                tally.visit(rec, &self.criteria);
            }
        }
        tally.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ClickRecord, ServerVisitRecord};

    fn at(raw: &str) -> NaiveDateTime {
        Timestamp::parse(raw).to_naive().expect("valid test timestamp")
    }

    fn impression(date: &str, id: &str, gender: &str, context: &str) -> ImpressionRecord {
        ImpressionRecord::from_fields(date, id, gender, "25-34", "Medium", context, "0.5")
    }

    fn sample_campaign() -> Arc<Campaign> {
        Arc::new(Campaign::new(
            Some(vec![
                impression("2025-03-15 09:10:00", "1", "Male", "News"),
                impression("2025-03-15 09:50:00", "2", "Female", "Blog"),
                impression("2025-03-15 23:59:59", "3", "Female", "News"),
                impression("2025-03-16 00:00:00", "4", "Male", "Travel"),
                impression("2025-03-18 14:30:00", "5", "Female", "Shopping"),
                impression("2025-03-24 08:00:00", "6", "Male", "News"),
                impression("not a date", "7", "Male", "News"),
            ]),
            Some(vec![
                ClickRecord::from_fields("2025-03-15 09:11:00", "1", "1.0"),
                ClickRecord::from_fields("2025-03-15 10:00:00", "2", "2.0"),
                ClickRecord::from_fields("2025-03-16 00:00:30", "4", "1.5"),
                ClickRecord::from_fields("2025-03-18 14:31:00", "5", "0.25"),
            ]),
            Some(vec![
                ServerVisitRecord::from_fields(
                    "2025-03-15 09:11:01",
                    "1",
                    "2025-03-15 09:11:03",
                    "1",
                    "No",
                ),
                ServerVisitRecord::from_fields(
                    "2025-03-15 10:00:01",
                    "2",
                    "2025-03-15 10:20:00",
                    "6",
                    "Yes",
                ),
                ServerVisitRecord::from_fields("2025-03-16 00:00:31", "4", "n/a", "4", "Yes"),
                ServerVisitRecord::from_fields(
                    "2025-03-18 14:31:05",
                    "5",
                    "2025-03-18 14:45:00",
                    "3",
                    "maybe",
                ),
            ]),
        ))
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let mut engine = FilteredMetricsEngine::new(sample_campaign());
        let m = engine.compute_for_time_frame(
            at("2025-03-15 09:10:00"),
            at("2025-03-15 23:59:59"),
            Granularity::Daily,
        );
        assert_eq!(m.impressions, 3);
        assert_eq!(m.clicks, 2);
        assert_eq!(m.uniques, 2);
        assert_eq!(m.bounces, 1);
        assert_eq!(m.conversions, 1);
        assert!(approx(m.total_cost, 1.5 + 3.0));
    }

    #[test]
    fn window_outside_data_is_all_zero() {
        let mut engine = FilteredMetricsEngine::new(sample_campaign());
        let m = engine.compute_for_time_frame(
            at("2030-01-01 00:00:00"),
            at("2030-02-01 00:00:00"),
            Granularity::Weekly,
        );
        assert_eq!(m, ComputedMetrics::default());

        let inverted = engine.compute_for_time_frame(
            at("2025-03-20 00:00:00"),
            at("2025-03-10 00:00:00"),
            Granularity::Daily,
        );
        assert_eq!(inverted, ComputedMetrics::default());
    }

    #[test]
    fn repeated_query_hits_cache() {
        let mut engine = FilteredMetricsEngine::new(sample_campaign());
        let (start, end) = (at("2025-03-15 00:00:00"), at("2025-03-31 00:00:00"));
        let first = engine.compute_for_time_frame(start, end, Granularity::Daily);
        let second = engine.compute_for_time_frame(start, end, Granularity::Daily);
        assert_eq!(first, second);
        assert_eq!(first.total_cost.to_bits(), second.total_cost.to_bits());
        assert_eq!(engine.cached_results(), 1);

        engine.clear_caches();
        assert_eq!(engine.cached_results(), 0);
        assert_eq!(engine.compute_for_time_frame(start, end, Granularity::Daily), first);
    }

    #[test]
    fn filter_change_is_part_of_cache_key() {
        let mut engine = FilteredMetricsEngine::new(sample_campaign());
        let (start, end) = (at("2025-03-15 00:00:00"), at("2025-03-31 00:00:00"));
        let all = engine.compute_for_time_frame(start, end, Granularity::Daily);
        assert_eq!(all.impressions, 6);

        engine.set_gender_filter(Some(Gender::Female));
        let female = engine.compute_for_time_frame(start, end, Granularity::Daily);
        assert_eq!(female.impressions, 3);
        assert_eq!(engine.cached_results(), 2);

        engine.set_gender_filter(None);
        assert_eq!(engine.compute_for_time_frame(start, end, Granularity::Daily), all);
        // The filter survives a cache clear.
        engine.set_context_filter(Some(Context::News));
        engine.clear_caches();
        assert_eq!(engine.context_filter(), Some(Context::News));
    }

    #[test]
    fn clicks_and_visits_gated_by_matching_impression_ids() {
        let mut engine = FilteredMetricsEngine::new(sample_campaign());
        engine.set_gender_filter(Some(Gender::Female));
        let m = engine.compute_for_time_frame(
            at("2025-03-15 00:00:00"),
            at("2025-03-31 00:00:00"),
            Granularity::Daily,
        );
        // Female impressions: ids 2, 3, 5. Clicks from 2 and 5.
        assert_eq!(m.impressions, 3);
        assert_eq!(m.clicks, 2);
        assert_eq!(m.uniques, 2);
        assert_eq!(m.conversions, 1);
        assert_eq!(m.bounces, 0);
        assert!(approx(m.total_cost, 1.5 + 2.25));

        engine.set_gender_filter(Some(Gender::Male));
        engine.set_context_filter(Some(Context::Travel));
        let m = engine.compute_for_time_frame(
            at("2025-03-15 00:00:00"),
            at("2025-03-31 00:00:00"),
            Granularity::Daily,
        );
        assert_eq!(m.impressions, 1);
        assert_eq!(m.clicks, 1);
        assert_eq!(m.conversions, 1);
        // Four pages, no exit: not a bounce.
        assert_eq!(m.bounces, 0);
    }

    #[test]
    fn bucket_totals_match_window_total() {
        let (start, end) = (at("2025-03-15 09:30:00"), at("2025-03-24 08:00:00"));
        for granularity in [Granularity::Hourly, Granularity::Daily, Granularity::Weekly] {
            for gender in [None, Some(Gender::Female)] {
                let mut engine = FilteredMetricsEngine::new(sample_campaign());
                engine.set_gender_filter(gender);
                let whole = engine.compute_for_time_frame(start, end, granularity);
                let buckets =
                    engine.compute_for_time_frame_with_granularity(start, end, granularity);
                let impressions: u64 = buckets.values().map(|m| m.impressions).sum();
                let clicks: u64 = buckets.values().map(|m| m.clicks).sum();
                let bounces: u64 = buckets.values().map(|m| m.bounces).sum();
                let conversions: u64 = buckets.values().map(|m| m.conversions).sum();
                let cost: f64 = buckets.values().map(|m| m.total_cost).sum();
                assert_eq!(impressions, whole.impressions, "{granularity:?}");
                assert_eq!(clicks, whole.clicks, "{granularity:?}");
                assert_eq!(bounces, whole.bounces, "{granularity:?}");
                assert_eq!(conversions, whole.conversions, "{granularity:?}");
                assert!(approx(cost, whole.total_cost), "{granularity:?}");
            }
        }
    }

    #[test]
    fn hourly_buckets_are_clock_aligned() {
        let window = TimeWindow::new(at("2025-03-15 09:30:00"), at("2025-03-15 11:15:00"));
        let buckets = window.buckets(Granularity::Hourly);
        let labels: Vec<&str> = buckets.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, ["2025-03-15 09:00", "2025-03-15 10:00", "2025-03-15 11:00"]);
        assert_eq!(buckets[0].1.start, at("2025-03-15 09:30:00"));
        assert_eq!(buckets[0].1.end, at("2025-03-15 09:59:59"));
        assert_eq!(buckets[1].1.start, at("2025-03-15 10:00:00"));
        assert_eq!(buckets[2].1.end, at("2025-03-15 11:15:00"));
    }

    #[test]
    fn daily_and_weekly_buckets() {
        let window = TimeWindow::new(at("2025-03-15 12:00:00"), at("2025-03-30 06:00:00"));

        let daily = window.buckets(Granularity::Daily);
        assert_eq!(daily.len(), 16);
        assert_eq!(daily[0].1.end, at("2025-03-15 23:59:59"));
        assert_eq!(daily[1].0, "2025-03-16");
        assert_eq!(daily[1].1.start, at("2025-03-16 00:00:00"));

        let weekly = window.buckets(Granularity::Weekly);
        assert_eq!(weekly.len(), 3);
        assert_eq!(weekly[0].0, "2025-03-15");
        assert_eq!(weekly[0].1.end, at("2025-03-22 11:59:59"));
        assert_eq!(weekly[1].1.start, at("2025-03-22 12:00:00"));
        assert_eq!(weekly[2].1.end, at("2025-03-30 06:00:00"));
    }

    #[test]
    fn bucket_count_matches_buckets() {
        let windows = [
            TimeWindow::new(at("2025-03-15 09:30:00"), at("2025-03-15 11:15:00")),
            TimeWindow::new(at("2025-03-15 12:00:00"), at("2025-03-30 06:00:00")),
            TimeWindow::new(at("2025-03-15 00:00:00"), at("2025-03-29 00:00:00")),
            TimeWindow::new(at("2025-03-15 10:00:00"), at("2025-03-15 10:00:00")),
            TimeWindow::new(at("2025-03-16 00:00:00"), at("2025-03-15 00:00:00")),
        ];
        for window in windows {
            for granularity in [Granularity::Hourly, Granularity::Daily, Granularity::Weekly] {
                assert_eq!(
                    window.bucket_count(granularity),
                    window.buckets(granularity).len() as i64,
                    "{window:?} {granularity:?}"
                );
            }
        }
    }

    #[test]
    fn inverted_window_has_no_buckets() {
        let mut engine = FilteredMetricsEngine::new(sample_campaign());
        let buckets = engine.compute_for_time_frame_with_granularity(
            at("2025-03-20 00:00:00"),
            at("2025-03-19 00:00:00"),
            Granularity::Hourly,
        );
        assert!(buckets.is_empty());
    }

    #[test]
    fn bounce_criteria_change_is_not_served_from_cache() {
        let mut engine = FilteredMetricsEngine::new(sample_campaign());
        let (start, end) = (at("2025-03-15 00:00:00"), at("2025-03-31 00:00:00"));
        assert_eq!(engine.compute_for_time_frame(start, end, Granularity::Daily).bounces, 1);
        engine.set_bounce_criteria(10, 0).expect("criteria");
        assert_eq!(engine.compute_for_time_frame(start, end, Granularity::Daily).bounces, 4);
        assert!(engine.set_bounce_criteria(0, -1).is_err());
        assert_eq!(engine.bounce_criteria().pages(), 10);
    }

    #[test]
    fn granularity_tokens() {
        assert_eq!(Granularity::parse("Hourly"), Some(Granularity::Hourly));
        assert_eq!(Granularity::parse("daily"), Some(Granularity::Daily));
        assert_eq!(Granularity::parse("week"), Some(Granularity::Weekly));
        assert_eq!(Granularity::parse("Monthly"), None);
    }

    #[test]
    fn auto_granularity_by_span() {
        let start = at("2025-03-01 00:00:00");
        assert_eq!(Granularity::auto(start, at("2025-03-02 23:00:00")), Granularity::Hourly);
        assert_eq!(Granularity::auto(start, at("2025-03-31 00:00:00")), Granularity::Daily);
        assert_eq!(Granularity::auto(start, at("2025-06-30 00:00:00")), Granularity::Weekly);
    }
}
