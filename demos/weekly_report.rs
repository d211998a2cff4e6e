use chrono::{Datelike, NaiveDate, Weekday};
use deal_report_builder::*;
use std::collections::{BTreeMap, BTreeSet};

fn main() -> Result<()> {
    let config = ReportConfig {
        measure_name: "deal_area".to_string(),
        entities: vec![
            "shanghai".to_string(),
            "hangzhou".to_string(),
            "quzhou".to_string(),
        ],
        tiers: TierConfig {
            tier_order: vec![
                "tier-1".to_string(),
                "tier-2".to_string(),
                "tier-3/4".to_string(),
            ],
            assignments: BTreeMap::from([
                ("shanghai".to_string(), "tier-1".to_string()),
                ("hangzhou".to_string(), "tier-2".to_string()),
                ("quzhou".to_string(), "tier-3/4".to_string()),
            ]),
            overall_tier: "all-tiers".to_string(),
        },
        zero_fill_entities: BTreeSet::from(["quzhou".to_string()]),
        exclusion_zero_ratio: 1.0 / 3.0,
        weekly_buckets: 8,
        monthly_buckets: 6,
        comparison_buckets: 4,
    };

    // Synthetic feed: a slow weekly ramp this year, a flat baseline last
    // year. quzhou publishes nothing on weekends and relies on zero-fill.
    let reference = NaiveDate::from_ymd_opt(2024, 10, 27).unwrap();
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    let mut feed = Vec::new();
    let mut date = start;
    while date < reference {
        for entity in &config.entities {
            if entity == "quzhou" && matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                continue;
            }
            let base = match entity.as_str() {
                "shanghai" => 120.0,
                "hangzhou" => 60.0,
                _ => 8.0,
            };
            let value = if date.year() == 2024 {
                base * (1.0 + date.ordinal() as f64 / 1000.0)
            } else {
                base
            };
            feed.push(Observation::new(entity.clone(), date, Some(value)));
        }
        date = date.succ_opt().unwrap();
    }

    let request = ReportRequest {
        config: &config,
        feed: &feed,
        corrections: &[],
        holidays: &NoHolidays,
        kind: BucketKind::Week,
        reference,
    };
    let report = ReportProcessor::process_with_verification(&request, 1e-6)?;

    println!("trend:");
    for point in &report.trend {
        match point.total.value() {
            Some(total) => println!("  {:>8}  {:>10.2}", point.bucket.label(), total),
            None => println!("  {:>8}  (incomplete)", point.bucket.label()),
        }
    }
    println!();
    println!("{}", table_to_markdown(&report.comparison));
    println!("{}", annual_to_csv(&report.annual));

    if !report.diagnostics.unresolved_gaps.is_empty() {
        println!("unresolved gaps: {:?}", report.diagnostics.unresolved_gaps);
    }

    Ok(())
}
