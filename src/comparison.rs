use crate::aggregate::{AggregateSet, AggregateTables, PeriodSum};
use crate::calendar::{Bucket, BucketKind};
use crate::error::{DealReportError, Result};
use crate::exclusion::ExclusionSets;
use crate::schema::TierConfig;
use crate::windows::WindowSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Why a ratio cell is intentionally empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioGap {
    /// The prior/last-year value is zero; the ratio would be infinite.
    ZeroDenominator,
    /// The prior/last-year aggregate is incomplete.
    MissingDenominator,
    /// The current aggregate is incomplete.
    MissingNumerator,
    /// The entity is in the applicable exclusion set.
    Excluded,
}

/// A ratio column cell: either a computed ratio or an explicit null with its
/// reason. Division never leaks `inf`/`NaN` into output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RatioCell {
    Value(f64),
    Null(RatioGap),
}

impl RatioCell {
    pub fn value(&self) -> Option<f64> {
        match self {
            RatioCell::Value(v) => Some(*v),
            RatioCell::Null(_) => None,
        }
    }

    /// (current - baseline) / baseline, guarded against zero and missing
    /// baselines.
    pub fn compute(current: PeriodSum, baseline: PeriodSum) -> RatioCell {
        let Some(base) = baseline.value() else {
            return RatioCell::Null(RatioGap::MissingDenominator);
        };
        if base == 0.0 {
            return RatioCell::Null(RatioGap::ZeroDenominator);
        }
        let Some(cur) = current.value() else {
            return RatioCell::Null(RatioGap::MissingNumerator);
        };
        RatioCell::Value((cur - base) / base)
    }
}

/// Row identity: a real entity or the synthetic roll-up. `Overall` sorts
/// after every entity within a tier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RowEntity {
    Entity(String),
    Overall,
}

impl RowEntity {
    pub fn label(&self) -> &str {
        match self {
            RowEntity::Entity(name) => name,
            RowEntity::Overall => "overall",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub tier: String,
    pub entity: RowEntity,
    /// Absolute value per displayed bucket, chronological by bucket ordinal.
    pub buckets: BTreeMap<Bucket, PeriodSum>,
    /// Same-period-last-year value backing the YoY ratio.
    pub last_year: PeriodSum,
    pub mom: RatioCell,
    pub yoy: RatioCell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonTable {
    pub kind: BucketKind,
    /// Displayed bucket columns, chronological.
    pub buckets: Vec<Bucket>,
    pub current_bucket: Bucket,
    pub prior_bucket: Bucket,
    pub last_year_bucket: Bucket,
    pub rows: Vec<ComparisonRow>,
}

impl ComparisonTable {
    pub fn entity_rows(&self) -> impl Iterator<Item = &ComparisonRow> {
        self.rows
            .iter()
            .filter(|r| matches!(r.entity, RowEntity::Entity(_)))
    }

    pub fn overall_row(&self, tier: &str) -> Option<&ComparisonRow> {
        self.rows
            .iter()
            .find(|r| r.tier == tier && r.entity == RowEntity::Overall)
    }
}

/// Year-to-date total against the day-aligned prior-year span, with the
/// annual exclusion set already applied to both sides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnualComparison {
    pub current: PeriodSum,
    pub prior: PeriodSum,
    pub yoy: RatioCell,
    pub excluded: BTreeSet<String>,
}

impl AnnualComparison {
    pub fn new(current: PeriodSum, prior: PeriodSum, excluded: BTreeSet<String>) -> Self {
        Self {
            yoy: RatioCell::compute(current, prior),
            current,
            prior,
            excluded,
        }
    }
}

/// Pure transform of aggregate tables into the wide entity x bucket shape.
/// No state survives between invocations.
pub struct ComparisonBuilder<'a> {
    tiers: &'a TierConfig,
    exclusions: &'a ExclusionSets,
}

impl<'a> ComparisonBuilder<'a> {
    pub fn new(tiers: &'a TierConfig, exclusions: &'a ExclusionSets) -> Self {
        Self { tiers, exclusions }
    }

    /// Builds the comparison table over the trailing `display_buckets`
    /// columns of the window.
    ///
    /// Column cells are full-bucket sums; the MoM/YoY inputs are the
    /// day-count-aligned spans from the [`AggregateSet`]. Entity rows keep
    /// their absolute values even when excluded; only the ratio cells are
    /// nulled. Overall rows are column-wise sums of their constituents,
    /// with MoM/YoY recomputed from exclusion-filtered sums rather than
    /// averaged from per-entity ratios.
    pub fn build(
        &self,
        windows: &WindowSet,
        tables: &AggregateSet,
        display_buckets: usize,
    ) -> ComparisonTable {
        let shown = display_buckets.min(windows.buckets.len());
        let columns: Vec<Bucket> = windows.buckets[windows.buckets.len() - shown..].to_vec();

        let mut rows: Vec<ComparisonRow> = Vec::new();

        // 1. Per-entity rows.
        let members: BTreeSet<(String, String)> = tables
            .window
            .by_entity
            .keys()
            .map(|(tier, entity, _)| (tier.clone(), entity.clone()))
            .collect();

        for (tier, entity) in &members {
            let lookup = |shape: &AggregateTables, bucket: Bucket| {
                shape
                    .by_entity
                    .get(&(tier.clone(), entity.clone(), bucket))
                    .copied()
                    .unwrap_or(PeriodSum::ZERO)
            };
            let current_value = lookup(&tables.current, windows.current_bucket);
            let ly_value = lookup(&tables.last_year, windows.last_year_bucket);

            let mom = if self.exclusions.mom.contains(entity) {
                RatioCell::Null(RatioGap::Excluded)
            } else {
                RatioCell::compute(current_value, lookup(&tables.prior, windows.prior_bucket))
            };
            let yoy = if self.exclusions.yoy.contains(entity) {
                RatioCell::Null(RatioGap::Excluded)
            } else {
                RatioCell::compute(current_value, ly_value)
            };

            rows.push(ComparisonRow {
                tier: tier.clone(),
                entity: RowEntity::Entity(entity.clone()),
                buckets: columns
                    .iter()
                    .map(|b| (*b, lookup(&tables.window, *b)))
                    .collect(),
                last_year: ly_value,
                mom,
                yoy,
            });
        }

        // 2. Per-tier overall rows.
        let tiers_present: BTreeSet<String> =
            members.iter().map(|(tier, _)| tier.clone()).collect();
        for tier in &tiers_present {
            rows.push(self.overall_row(tier.clone(), &columns, windows, tables, Some(tier.as_str())));
        }

        // 3. Grand roll-up across tiers, under the synthetic tier label.
        rows.push(self.overall_row(
            self.tiers.overall_tier.clone(),
            &columns,
            windows,
            tables,
            None,
        ));

        // Fixed tier ordering, roll-ups last within each tier.
        rows.sort_by_key(|row| {
            (
                self.tiers.ordinal(&row.tier).unwrap_or(usize::MAX),
                row.entity.clone(),
            )
        });

        ComparisonTable {
            kind: windows.kind,
            buckets: columns,
            current_bucket: windows.current_bucket,
            prior_bucket: windows.prior_bucket,
            last_year_bucket: windows.last_year_bucket,
            rows,
        }
    }

    fn overall_row(
        &self,
        tier_label: String,
        columns: &[Bucket],
        windows: &WindowSet,
        tables: &AggregateSet,
        tier: Option<&str>,
    ) -> ComparisonRow {
        let absolute = |shape: &AggregateTables, bucket: Bucket| match tier {
            Some(t) => shape
                .by_tier
                .get(&(t.to_string(), bucket))
                .copied()
                .unwrap_or(PeriodSum::ZERO),
            None => shape.by_bucket.get(&bucket).copied().unwrap_or(PeriodSum::ZERO),
        };

        let mom = RatioCell::compute(
            filtered_sum(
                &tables.current,
                tier,
                windows.current_bucket,
                &self.exclusions.mom,
            ),
            filtered_sum(
                &tables.prior,
                tier,
                windows.prior_bucket,
                &self.exclusions.mom,
            ),
        );
        let yoy = RatioCell::compute(
            filtered_sum(
                &tables.current,
                tier,
                windows.current_bucket,
                &self.exclusions.yoy,
            ),
            filtered_sum(
                &tables.last_year,
                tier,
                windows.last_year_bucket,
                &self.exclusions.yoy,
            ),
        );

        ComparisonRow {
            tier: tier_label,
            entity: RowEntity::Overall,
            buckets: columns
                .iter()
                .map(|b| (*b, absolute(&tables.window, *b)))
                .collect(),
            last_year: absolute(&tables.last_year, windows.last_year_bucket),
            mom,
            yoy,
        }
    }
}

/// Sum of per-entity values for one bucket, skipping excluded entities.
/// `tier == None` spans all tiers. Summation order is fixed by the BTreeMap
/// key order (tier, then entity name).
fn filtered_sum(
    tables: &AggregateTables,
    tier: Option<&str>,
    bucket: Bucket,
    exclude: &BTreeSet<String>,
) -> PeriodSum {
    tables
        .by_entity
        .iter()
        .filter(|((t, entity, b), _)| {
            *b == bucket
                && tier.map_or(true, |wanted| t.as_str() == wanted)
                && !exclude.contains(entity)
        })
        .map(|(_, sum)| *sum)
        .sum()
}

/// Re-checks the roll-up invariant on a finished table: every overall row
/// must equal the column-wise sum of its constituents within `tolerance`.
pub fn verify_rollup(table: &ComparisonTable, tiers: &TierConfig, tolerance: f64) -> Result<()> {
    let mut tier_columns: BTreeMap<&str, BTreeMap<Bucket, PeriodSum>> = BTreeMap::new();
    for row in table.entity_rows() {
        let columns = tier_columns.entry(row.tier.as_str()).or_default();
        for (bucket, value) in &row.buckets {
            let slot = columns.entry(*bucket).or_insert(PeriodSum::ZERO);
            *slot = *slot + *value;
        }
    }

    let check = |label: &str, bucket: Bucket, overall: PeriodSum, sum: PeriodSum| -> Result<()> {
        let matches = overall.is_complete() == sum.is_complete()
            && (overall.known() - sum.known()).abs() <= tolerance;
        if matches {
            Ok(())
        } else {
            Err(DealReportError::RollupMismatch {
                row: label.to_string(),
                bucket: bucket.label(),
                overall: overall.known(),
                sum: sum.known(),
            })
        }
    };

    let mut grand: BTreeMap<Bucket, PeriodSum> = BTreeMap::new();
    for (&tier, columns) in &tier_columns {
        let Some(overall) = table.overall_row(tier) else {
            continue;
        };
        for (bucket, expected) in columns {
            let value = overall
                .buckets
                .get(bucket)
                .copied()
                .unwrap_or(PeriodSum::ZERO);
            check(tier, *bucket, value, *expected)?;
            let slot = grand.entry(*bucket).or_insert(PeriodSum::ZERO);
            *slot = *slot + *expected;
        }
    }

    if let Some(overall) = table.overall_row(&tiers.overall_tier) {
        for (bucket, expected) in &grand {
            let value = overall
                .buckets
                .get(bucket)
                .copied()
                .unwrap_or(PeriodSum::ZERO);
            check(&tiers.overall_tier, *bucket, value, *expected)?;
        }
    }

    Ok(())
}
