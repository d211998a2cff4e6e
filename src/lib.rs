//! # Deal Report Builder
//!
//! A library for turning daily city transaction feeds into weekly and
//! monthly comparison statistics with explicit missing-data handling.
//!
//! ## Core Concepts
//!
//! - **Observation**: one (entity, date, measure) reading; a null measure
//!   means "not yet ingested", which is different from a recorded zero
//! - **Report Week**: ISO week with Sunday rolled into the following week,
//!   so weeks run Sunday through Saturday
//! - **Bucket**: a week or month period with a chronological ordinal
//! - **Incomplete Sum**: an aggregate touching an unfilled gap is reported
//!   as missing, never silently treated as zero
//! - **Exclusion**: entities whose window is mostly zero-days are dropped
//!   from ratio denominators while keeping their absolute values
//!
//! ## Example
//!
//! ```rust,ignore
//! use deal_report_builder::*;
//! use chrono::NaiveDate;
//!
//! let config = ReportConfig::from_json_file("report.json")?;
//! let holidays = FixedHolidays::new(holiday_dates);
//! let request = ReportRequest {
//!     config: &config,
//!     feed: &observations,
//!     corrections: &[],
//!     holidays: &holidays,
//!     kind: BucketKind::Week,
//!     reference: NaiveDate::from_ymd_opt(2024, 10, 27).unwrap(),
//! };
//!
//! let report = ReportProcessor::process(&request)?;
//! println!("{}", table_to_csv(&report.comparison));
//! ```

pub mod aggregate;
pub mod calendar;
pub mod comparison;
pub mod error;
pub mod exclusion;
pub mod fill;
pub mod grid;
pub mod render;
pub mod schema;
pub mod utils;
pub mod windows;

pub use aggregate::{AggregateSet, AggregateTables, PeriodAggregator, PeriodSum};
pub use calendar::{
    Bucket, BucketKind, FixedHolidays, HolidayProvider, NoHolidays, ReportCalendar,
};
pub use comparison::{
    verify_rollup, AnnualComparison, ComparisonBuilder, ComparisonRow, ComparisonTable, RatioCell,
    RatioGap, RowEntity,
};
pub use error::{DealReportError, Result};
pub use exclusion::{build_exclusions, near_degenerate, ExclusionSets};
pub use fill::{DailyPanel, DailyPoint, DailySeries, FillOrigin, FillResult, GapFiller};
pub use grid::{date_grid, DateRange};
pub use render::{annual_to_csv, table_to_csv, table_to_markdown};
pub use schema::{Correction, CorrectionSource, Observation, ReportConfig, TierConfig};
pub use windows::WindowSet;

use chrono::{Datelike, NaiveDate};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything one report run needs. Observations and configuration are
/// read-only; running the same request twice produces identical output.
pub struct ReportRequest<'a> {
    pub config: &'a ReportConfig,
    pub feed: &'a [Observation],
    /// Out-of-band correction sources, applied in order after zero-fill.
    pub corrections: &'a [CorrectionSource],
    pub holidays: &'a dyn HolidayProvider,
    pub kind: BucketKind,
    /// The day the report runs; the covered period ends the day before.
    pub reference: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendPoint {
    pub bucket: Bucket,
    pub total: PeriodSum,
}

/// Non-fatal issues aggregated over the run, surfaced once at the end
/// instead of scattered through the pipeline.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunDiagnostics {
    /// Entities observed without a tier mapping, excluded from aggregates.
    pub missing_tier_entities: Vec<String>,
    /// Entity -> still-missing day count in the current window.
    pub unresolved_gaps: BTreeMap<String, u32>,
    /// Entity -> still-missing day count in the same-period-last-year window.
    pub last_year_unresolved_gaps: BTreeMap<String, u32>,
    pub duplicates_dropped: u32,
}

/// The finished report: structured values only. Rendering, styling and
/// persistence belong to the external sink.
#[derive(Debug, Clone, Serialize)]
pub struct ReportOutput {
    pub kind: BucketKind,
    pub reference: NaiveDate,
    /// Totals per bucket over the full aggregation window.
    pub trend: Vec<TrendPoint>,
    pub comparison: ComparisonTable,
    pub annual: AnnualComparison,
    pub exclusions: ExclusionSets,
    pub diagnostics: RunDiagnostics,
}

pub struct ReportProcessor;

impl ReportProcessor {
    pub fn process(request: &ReportRequest<'_>) -> Result<ReportOutput> {
        let config = request.config;
        config.validate()?;

        info!(
            "building {:?} report of '{}' for reference date {}",
            request.kind, config.measure_name, request.reference
        );

        let year = request.reference.year();
        let calendar = ReportCalendar::new(request.holidays, [year - 1, year]);

        let buckets = match request.kind {
            BucketKind::Week => config.weekly_buckets,
            BucketKind::Month => config.monthly_buckets,
        };
        let windows = match request.kind {
            BucketKind::Week => WindowSet::weekly(request.reference, buckets, &calendar)?,
            BucketKind::Month => WindowSet::monthly(request.reference, buckets, &calendar)?,
        };

        let filler = GapFiller::new(&calendar, &config.zero_fill_entities);
        let mut fill = filler.fill_ranges(
            &config.entities,
            &windows.required_ranges(),
            request.feed,
        )?;
        for source in request.corrections {
            GapFiller::backfill(&mut fill.panel, source);
        }
        debug!(
            "filled panel covers {} entities over {} ranges",
            fill.panel.len(),
            windows.required_ranges().len()
        );

        let aggregator = PeriodAggregator::new(&calendar, &config.tiers);
        let tables = aggregator.aggregate_windows(&fill.panel, &windows);

        let exclusions = build_exclusions(&fill.panel, &windows, config.exclusion_zero_ratio);

        let annual = AnnualComparison::new(
            aggregator.window_total(&fill.panel, windows.year_to_date, &exclusions.annual),
            aggregator.window_total(&fill.panel, windows.prior_year_to_date, &exclusions.annual),
            exclusions.annual.clone(),
        );

        let builder = ComparisonBuilder::new(&config.tiers, &exclusions);
        let comparison = builder.build(&windows, &tables, config.comparison_buckets);

        let trend = windows
            .buckets
            .iter()
            .map(|bucket| TrendPoint {
                bucket: *bucket,
                total: tables
                    .window
                    .by_bucket
                    .get(bucket)
                    .copied()
                    .unwrap_or(PeriodSum::ZERO),
            })
            .collect();

        let missing_tier: Vec<String> = tables.missing_tier().into_iter().collect();
        if !missing_tier.is_empty() {
            warn!("entities without tier mapping: {:?}", missing_tier);
        }

        let unresolved_gaps = GapFiller::gap_report(&fill.panel, windows.current);
        if !unresolved_gaps.is_empty() {
            warn!("entities with unresolved gaps: {:?}", unresolved_gaps);
        }

        Ok(ReportOutput {
            kind: request.kind,
            reference: request.reference,
            trend,
            comparison,
            annual,
            exclusions,
            diagnostics: RunDiagnostics {
                missing_tier_entities: missing_tier,
                unresolved_gaps,
                last_year_unresolved_gaps: GapFiller::gap_report(
                    &fill.panel,
                    windows.last_year_range,
                ),
                duplicates_dropped: fill.duplicates_dropped,
            },
        })
    }

    /// Like [`process`](Self::process), then re-checks the roll-up
    /// invariant on the finished table.
    pub fn process_with_verification(
        request: &ReportRequest<'_>,
        tolerance: f64,
    ) -> Result<ReportOutput> {
        let output = Self::process(request)?;
        verify_rollup(&output.comparison, &request.config.tiers, tolerance)?;
        Ok(output)
    }
}

pub fn build_deal_report(request: &ReportRequest<'_>) -> Result<ReportOutput> {
    ReportProcessor::process(request)
}

pub fn build_deal_report_with_verification(
    request: &ReportRequest<'_>,
    tolerance: f64,
) -> Result<ReportOutput> {
    ReportProcessor::process_with_verification(request, tolerance)
}
