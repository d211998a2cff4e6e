use crate::calendar::{Bucket, BucketKind, ReportCalendar};
use crate::fill::{DailyPanel, DailyPoint};
use crate::grid::DateRange;
use crate::schema::TierConfig;
use crate::windows::WindowSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A windowed sum that remembers whether it covered every day.
///
/// A day that is still missing (not fed, not zero-filled, not corrected)
/// poisons the sum: the aggregate is reported as incomplete, never silently
/// treated as zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PeriodSum {
    Complete(f64),
    Incomplete { known: f64, missing_days: u32 },
}

impl PeriodSum {
    pub const ZERO: PeriodSum = PeriodSum::Complete(0.0);

    /// The usable value; `None` while any contributing day is missing.
    pub fn value(&self) -> Option<f64> {
        match self {
            PeriodSum::Complete(v) => Some(*v),
            PeriodSum::Incomplete { .. } => None,
        }
    }

    /// The sum of the days that are known, regardless of completeness.
    pub fn known(&self) -> f64 {
        match self {
            PeriodSum::Complete(v) => *v,
            PeriodSum::Incomplete { known, .. } => *known,
        }
    }

    pub fn missing_days(&self) -> u32 {
        match self {
            PeriodSum::Complete(_) => 0,
            PeriodSum::Incomplete { missing_days, .. } => *missing_days,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, PeriodSum::Complete(_))
    }

    fn absorb_day(&mut self, point: &DailyPoint) {
        match point.value {
            Some(v) => {
                *self = match *self {
                    PeriodSum::Complete(known) => PeriodSum::Complete(known + v),
                    PeriodSum::Incomplete {
                        known,
                        missing_days,
                    } => PeriodSum::Incomplete {
                        known: known + v,
                        missing_days,
                    },
                }
            }
            None => {
                *self = PeriodSum::Incomplete {
                    known: self.known(),
                    missing_days: self.missing_days() + 1,
                }
            }
        }
    }
}

impl std::ops::Add for PeriodSum {
    type Output = PeriodSum;

    /// Incompleteness is absorbing: a roll-up over any incomplete
    /// constituent is itself incomplete.
    fn add(self, rhs: PeriodSum) -> PeriodSum {
        let known = self.known() + rhs.known();
        let missing = self.missing_days() + rhs.missing_days();
        if missing == 0 {
            PeriodSum::Complete(known)
        } else {
            PeriodSum::Incomplete {
                known,
                missing_days: missing,
            }
        }
    }
}

impl std::ops::AddAssign for PeriodSum {
    fn add_assign(&mut self, rhs: PeriodSum) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for PeriodSum {
    fn sum<I: Iterator<Item = PeriodSum>>(iter: I) -> PeriodSum {
        iter.fold(PeriodSum::ZERO, |acc, x| acc + x)
    }
}

/// The three aggregate shapes over one window. Keys are BTreeMaps so
/// iteration (and therefore floating-point summation order) is fixed:
/// entity-name ascending.
#[derive(Debug, Clone, Default)]
pub struct AggregateTables {
    pub by_bucket: BTreeMap<Bucket, PeriodSum>,
    /// (tier, bucket) -> sum
    pub by_tier: BTreeMap<(String, Bucket), PeriodSum>,
    /// (tier, entity, bucket) -> sum
    pub by_entity: BTreeMap<(String, String, Bucket), PeriodSum>,
    /// Entities observed without a tier mapping; left out of every shape and
    /// surfaced as a warning, not silently dropped.
    pub missing_tier: BTreeSet<String>,
}

/// Aggregate shapes for every window a comparison needs. The wide columns
/// come from `window`; the ratio inputs come from the day-count-aligned
/// spans, which for months are shorter than their bucket (October 1-27
/// compares against September 1-27, not all of September).
#[derive(Debug, Clone, Default)]
pub struct AggregateSet {
    /// Over the full K-bucket span: trend and wide columns.
    pub window: AggregateTables,
    /// Over the current bucket's day span: ratio numerators.
    pub current: AggregateTables,
    /// Over the aligned prior span: MoM denominators.
    pub prior: AggregateTables,
    /// Over the same-period-last-year span: YoY denominators.
    pub last_year: AggregateTables,
}

impl AggregateSet {
    /// Entities without a tier mapping, across every window.
    pub fn missing_tier(&self) -> BTreeSet<String> {
        let mut all = self.window.missing_tier.clone();
        all.extend(self.current.missing_tier.iter().cloned());
        all.extend(self.prior.missing_tier.iter().cloned());
        all.extend(self.last_year.missing_tier.iter().cloned());
        all
    }
}

pub struct PeriodAggregator<'a> {
    calendar: &'a ReportCalendar,
    tiers: &'a TierConfig,
}

impl<'a> PeriodAggregator<'a> {
    pub fn new(calendar: &'a ReportCalendar, tiers: &'a TierConfig) -> Self {
        Self { calendar, tiers }
    }

    /// Sums the panel's measure by bucket, by (tier, bucket) and by
    /// (tier, entity, bucket) over `window`.
    ///
    /// An entity with no tier mapping is excluded from all three shapes so
    /// the grand totals stay the exact sum of the tier totals; it is
    /// recorded in `missing_tier` instead.
    pub fn aggregate(
        &self,
        panel: &DailyPanel,
        window: DateRange,
        kind: BucketKind,
    ) -> AggregateTables {
        let mut tables = AggregateTables::default();

        for (entity, series) in panel {
            let Some(tier) = self.tiers.tier_of(entity) else {
                if series.range(window.start()..=window.end()).next().is_some() {
                    tables.missing_tier.insert(entity.clone());
                }
                continue;
            };

            for (date, point) in series.range(window.start()..=window.end()) {
                let bucket = self.calendar.bucket_of(*date, kind);
                tables
                    .by_bucket
                    .entry(bucket)
                    .or_insert(PeriodSum::ZERO)
                    .absorb_day(point);
                tables
                    .by_tier
                    .entry((tier.to_string(), bucket))
                    .or_insert(PeriodSum::ZERO)
                    .absorb_day(point);
                tables
                    .by_entity
                    .entry((tier.to_string(), entity.clone(), bucket))
                    .or_insert(PeriodSum::ZERO)
                    .absorb_day(point);
            }
        }

        tables
    }

    /// Runs [`aggregate`](Self::aggregate) over each window of the set.
    pub fn aggregate_windows(&self, panel: &DailyPanel, windows: &WindowSet) -> AggregateSet {
        AggregateSet {
            window: self.aggregate(panel, windows.current, windows.kind),
            current: self.aggregate(panel, windows.current_range, windows.kind),
            prior: self.aggregate(panel, windows.prior_range, windows.kind),
            last_year: self.aggregate(panel, windows.last_year_range, windows.kind),
        }
    }

    /// Plain windowed total across entities, skipping `exclude`. Used by
    /// the annual comparison, where near-degenerate entities distort the
    /// ratio. Entities without a tier mapping are skipped as everywhere.
    pub fn window_total(
        &self,
        panel: &DailyPanel,
        window: DateRange,
        exclude: &BTreeSet<String>,
    ) -> PeriodSum {
        let mut total = PeriodSum::ZERO;
        for (entity, series) in panel {
            if exclude.contains(entity) || self.tiers.tier_of(entity).is_none() {
                continue;
            }
            for (_, point) in series.range(window.start()..=window.end()) {
                total.absorb_day(point);
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{NoHolidays, ReportCalendar};
    use crate::fill::{DailyPoint, FillOrigin};
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn cal() -> ReportCalendar {
        ReportCalendar::new(&NoHolidays, [2024])
    }

    fn tiers() -> TierConfig {
        TierConfig {
            tier_order: vec!["tier-1".to_string(), "tier-2".to_string()],
            assignments: [
                ("a".to_string(), "tier-1".to_string()),
                ("b".to_string(), "tier-1".to_string()),
                ("c".to_string(), "tier-2".to_string()),
            ]
            .into(),
            overall_tier: "all-tiers".to_string(),
        }
    }

    fn series(values: &[(NaiveDate, Option<f64>)]) -> crate::fill::DailySeries {
        values
            .iter()
            .map(|(date, value)| {
                (
                    *date,
                    DailyPoint {
                        value: *value,
                        origin: if value.is_some() {
                            FillOrigin::Feed
                        } else {
                            FillOrigin::Missing
                        },
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_period_sum_incomplete_is_absorbing() {
        let complete = PeriodSum::Complete(10.0);
        let incomplete = PeriodSum::Incomplete {
            known: 5.0,
            missing_days: 2,
        };
        let merged = complete + incomplete;
        assert_eq!(merged.value(), None);
        assert_eq!(merged.known(), 15.0);
        assert_eq!(merged.missing_days(), 2);

        let both = PeriodSum::Complete(1.0) + PeriodSum::Complete(2.0);
        assert_eq!(both.value(), Some(3.0));
    }

    #[test]
    fn test_aggregate_shapes_and_missing_propagation() {
        let tiers = tiers();
        let cal = cal();
        let aggregator = PeriodAggregator::new(&cal, &tiers);

        // One report week, Sun 2023-12-31 .. Sat 2024-01-06.
        let window = DateRange::new(d(2023, 12, 31), d(2024, 1, 6)).unwrap();
        let mut panel = DailyPanel::new();
        panel.insert(
            "a".to_string(),
            series(&window.iter().map(|dt| (dt, Some(10.0))).collect::<Vec<_>>()),
        );
        // b is missing two days.
        panel.insert(
            "b".to_string(),
            series(
                &window
                    .iter()
                    .enumerate()
                    .map(|(i, dt)| (dt, if i < 2 { None } else { Some(1.0) }))
                    .collect::<Vec<_>>(),
            ),
        );
        panel.insert(
            "c".to_string(),
            series(&window.iter().map(|dt| (dt, Some(2.0))).collect::<Vec<_>>()),
        );

        let tables = aggregator.aggregate(&panel, window, BucketKind::Week);
        let bucket = cal.bucket_of(d(2024, 1, 6), BucketKind::Week);

        let a_sum = tables.by_entity[&("tier-1".to_string(), "a".to_string(), bucket)];
        assert_eq!(a_sum.value(), Some(70.0));

        let b_sum = tables.by_entity[&("tier-1".to_string(), "b".to_string(), bucket)];
        assert_eq!(b_sum.value(), None);
        assert_eq!(b_sum.known(), 5.0);

        // The tier roll-up is poisoned by b, not silently 75.
        let tier1 = tables.by_tier[&("tier-1".to_string(), bucket)];
        assert_eq!(tier1.value(), None);
        assert_eq!(tier1.known(), 75.0);

        let tier2 = tables.by_tier[&("tier-2".to_string(), bucket)];
        assert_eq!(tier2.value(), Some(14.0));

        let grand = tables.by_bucket[&bucket];
        assert_eq!(grand.known(), 89.0);
        assert_eq!(grand.missing_days(), 2);
    }

    #[test]
    fn test_entity_without_tier_is_surfaced_not_summed() {
        let tiers = tiers();
        let cal = cal();
        let aggregator = PeriodAggregator::new(&cal, &tiers);

        let window = DateRange::new(d(2023, 12, 31), d(2024, 1, 6)).unwrap();
        let mut panel = DailyPanel::new();
        panel.insert(
            "a".to_string(),
            series(&window.iter().map(|dt| (dt, Some(10.0))).collect::<Vec<_>>()),
        );
        panel.insert(
            "untiered".to_string(),
            series(&window.iter().map(|dt| (dt, Some(99.0))).collect::<Vec<_>>()),
        );

        let tables = aggregator.aggregate(&panel, window, BucketKind::Week);
        let bucket = cal.bucket_of(d(2024, 1, 6), BucketKind::Week);

        assert!(tables.missing_tier.contains("untiered"));
        assert_eq!(tables.by_bucket[&bucket].value(), Some(70.0));
    }

    #[test]
    fn test_window_total_with_exclusions() {
        let tiers = tiers();
        let cal = cal();
        let aggregator = PeriodAggregator::new(&cal, &tiers);

        let window = DateRange::new(d(2024, 1, 1), d(2024, 1, 2)).unwrap();
        let mut panel = DailyPanel::new();
        panel.insert(
            "a".to_string(),
            series(&[(d(2024, 1, 1), Some(1.0)), (d(2024, 1, 2), Some(2.0))]),
        );
        panel.insert(
            "c".to_string(),
            series(&[(d(2024, 1, 1), Some(4.0)), (d(2024, 1, 2), Some(8.0))]),
        );

        let all = aggregator.window_total(&panel, window, &BTreeSet::new());
        assert_eq!(all.value(), Some(15.0));

        let excluded = BTreeSet::from(["c".to_string()]);
        let partial = aggregator.window_total(&panel, window, &excluded);
        assert_eq!(partial.value(), Some(3.0));
    }
}
