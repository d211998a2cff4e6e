use crate::fill::DailyPanel;
use crate::grid::DateRange;
use crate::windows::WindowSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Entities disqualified from ratio denominators, one set per comparison
/// type. An excluded entity keeps its absolute values in every table; only
/// its ratio cells (and its contribution to roll-up ratios) go away. The
/// sets themselves are part of the report for transparency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionSets {
    /// Near-degenerate in the current or the prior bucket window.
    pub mom: BTreeSet<String>,
    /// Near-degenerate in the current or the same-period-last-year window.
    pub yoy: BTreeSet<String>,
    /// Near-degenerate in the year-to-date or the prior-year window.
    pub annual: BTreeSet<String>,
}

/// Entities whose measure was zero on more than `zero_ratio` of the days in
/// `window`. A ratio against such an entity is not meaningful.
///
/// Only recorded zeros count; missing days are a different defect and are
/// handled by incomplete-sum propagation.
pub fn near_degenerate(
    panel: &DailyPanel,
    window: DateRange,
    zero_ratio: f64,
) -> BTreeSet<String> {
    let threshold = window.days() as f64 * zero_ratio;
    let mut flagged = BTreeSet::new();
    for (entity, series) in panel {
        let zero_days = series
            .range(window.start()..=window.end())
            .filter(|(_, p)| p.value == Some(0.0))
            .count();
        if zero_days as f64 > threshold {
            flagged.insert(entity.clone());
        }
    }
    flagged
}

pub fn build_exclusions(panel: &DailyPanel, windows: &WindowSet, zero_ratio: f64) -> ExclusionSets {
    let current = near_degenerate(panel, windows.current_range, zero_ratio);
    let prior = near_degenerate(panel, windows.prior_range, zero_ratio);
    let last_year = near_degenerate(panel, windows.last_year_range, zero_ratio);
    let year_to_date = near_degenerate(panel, windows.year_to_date, zero_ratio);
    let prior_year = near_degenerate(panel, windows.prior_year_to_date, zero_ratio);

    ExclusionSets {
        mom: current.union(&prior).cloned().collect(),
        yoy: current.union(&last_year).cloned().collect(),
        annual: year_to_date.union(&prior_year).cloned().collect(),
    }
}
