use crate::calendar::ReportCalendar;
use crate::error::Result;
use crate::grid::{date_grid, DateRange};
use crate::schema::{CorrectionSource, Observation};
use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Where a daily cell's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillOrigin {
    /// Value arrived in the raw feed.
    Feed,
    /// Null on a holiday/weekend for an enrolled entity, defaulted to zero.
    ZeroFilled,
    /// Filled from a named correction source after the first pass.
    Backfilled,
    /// Still unobserved; sums over this day are incomplete.
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyPoint {
    pub value: Option<f64>,
    pub origin: FillOrigin,
}

pub type DailySeries = BTreeMap<NaiveDate, DailyPoint>;

/// One filled series per entity, entity-sorted for deterministic iteration.
pub type DailyPanel = BTreeMap<String, DailySeries>;

#[derive(Debug, Clone)]
pub struct FillResult {
    pub panel: DailyPanel,
    pub duplicates_dropped: u32,
}

/// Left-joins raw observations onto the complete (entity, date) grid and
/// applies the zero-fill policy. Stateless across calls; re-running on a
/// corrected feed yields identical results for identical inputs.
pub struct GapFiller<'a> {
    calendar: &'a ReportCalendar,
    zero_fill: &'a BTreeSet<String>,
}

impl<'a> GapFiller<'a> {
    pub fn new(calendar: &'a ReportCalendar, zero_fill: &'a BTreeSet<String>) -> Self {
        Self {
            calendar,
            zero_fill,
        }
    }

    /// Fills one grid range. At most one observation per (entity, date) is
    /// honored; the first wins and later duplicates are dropped.
    pub fn fill(
        &self,
        entities: &[String],
        range: DateRange,
        feed: &[Observation],
    ) -> Result<FillResult> {
        let mut observed: BTreeMap<(&str, NaiveDate), f64> = BTreeMap::new();
        let mut duplicates_dropped = 0u32;
        for obs in feed {
            let Some(value) = obs.measure else {
                // Null feed rows carry no information the grid doesn't.
                continue;
            };
            if !range.contains(obs.date) {
                continue;
            }
            // First observation wins, matching the upstream feed contract.
            match observed.entry((obs.entity.as_str(), obs.date)) {
                std::collections::btree_map::Entry::Vacant(slot) => {
                    slot.insert(value);
                }
                std::collections::btree_map::Entry::Occupied(_) => {
                    duplicates_dropped += 1;
                    debug!(
                        "dropping duplicate observation for {} on {}",
                        obs.entity, obs.date
                    );
                }
            }
        }
        if duplicates_dropped > 0 {
            warn!("{} duplicate observations dropped", duplicates_dropped);
        }

        let mut panel: DailyPanel = BTreeMap::new();
        for (entity, date) in date_grid(entities, range)? {
            let point = match observed.get(&(entity.as_str(), date)) {
                Some(&value) => DailyPoint {
                    value: Some(value),
                    origin: FillOrigin::Feed,
                },
                None if self.zero_fill.contains(&entity)
                    && self.calendar.is_non_trading_day(date) =>
                {
                    DailyPoint {
                        value: Some(0.0),
                        origin: FillOrigin::ZeroFilled,
                    }
                }
                None => DailyPoint {
                    value: None,
                    origin: FillOrigin::Missing,
                },
            };
            panel.entry(entity).or_default().insert(date, point);
        }

        Ok(FillResult {
            panel,
            duplicates_dropped,
        })
    }

    /// Fills every required range and merges the results into one panel.
    pub fn fill_ranges(
        &self,
        entities: &[String],
        ranges: &[DateRange],
        feed: &[Observation],
    ) -> Result<FillResult> {
        let mut panel: DailyPanel = BTreeMap::new();
        let mut duplicates_dropped = 0;
        for range in ranges {
            let part = self.fill(entities, *range, feed)?;
            duplicates_dropped += part.duplicates_dropped;
            for (entity, series) in part.panel {
                panel.entry(entity).or_default().extend(series);
            }
        }
        Ok(FillResult {
            panel,
            duplicates_dropped,
        })
    }

    /// Second pass: fills cells that are still missing from a named
    /// out-of-band source. Cells with any other origin are never touched.
    /// Returns the number of cells filled.
    pub fn backfill(panel: &mut DailyPanel, source: &CorrectionSource) -> usize {
        let mut filled = 0;
        for correction in &source.values {
            if let Some(point) = panel
                .get_mut(&correction.entity)
                .and_then(|series| series.get_mut(&correction.date))
            {
                if point.origin == FillOrigin::Missing {
                    *point = DailyPoint {
                        value: Some(correction.measure),
                        origin: FillOrigin::Backfilled,
                    };
                    filled += 1;
                }
            }
        }
        if filled > 0 {
            debug!("backfilled {} cells from source '{}'", filled, source.name);
        }
        filled
    }

    /// Per-entity count of still-missing days within `range`. Entities with
    /// no gaps are omitted.
    pub fn gap_report(panel: &DailyPanel, range: DateRange) -> BTreeMap<String, u32> {
        let mut report = BTreeMap::new();
        for (entity, series) in panel {
            let gaps = series
                .range(range.start()..=range.end())
                .filter(|(_, p)| p.origin == FillOrigin::Missing)
                .count() as u32;
            if gaps > 0 {
                report.insert(entity.clone(), gaps);
            }
        }
        report
    }
}
