use crate::aggregate::PeriodSum;
use crate::comparison::{AnnualComparison, ComparisonTable, RatioCell};

fn absolute_cell(sum: &PeriodSum) -> String {
    match sum.value() {
        Some(v) => format!("{:.2}", v),
        // Incomplete sums render empty, never as a partial number.
        None => String::new(),
    }
}

fn ratio_cell(cell: &RatioCell) -> String {
    match cell.value() {
        Some(v) => format!("{:.1}%", v * 100.0),
        None => String::new(),
    }
}

/// Renders the comparison table as CSV: one header row, then one line per
/// row. Values only; styling belongs to the external sink.
pub fn table_to_csv(table: &ComparisonTable) -> String {
    let mut output = String::new();

    output.push_str("tier,entity");
    for bucket in &table.buckets {
        output.push_str(&format!(",{}", bucket.label()));
    }
    output.push_str(&format!(
        ",last year {},MoM,YoY\n",
        table.last_year_bucket.label()
    ));

    for row in &table.rows {
        output.push_str(&format!("{},{}", row.tier, row.entity.label()));
        for bucket in &table.buckets {
            let cell = row
                .buckets
                .get(bucket)
                .map(absolute_cell)
                .unwrap_or_default();
            output.push_str(&format!(",{}", cell));
        }
        output.push_str(&format!(
            ",{},{},{}\n",
            absolute_cell(&row.last_year),
            ratio_cell(&row.mom),
            ratio_cell(&row.yoy)
        ));
    }

    output
}

pub fn table_to_markdown(table: &ComparisonTable) -> String {
    let mut output = String::new();

    output.push_str("| tier | entity |");
    for bucket in &table.buckets {
        output.push_str(&format!(" {} |", bucket.label()));
    }
    output.push_str(&format!(
        " last year {} | MoM | YoY |\n",
        table.last_year_bucket.label()
    ));

    output.push_str("| --- | --- |");
    for _ in 0..(table.buckets.len() + 3) {
        output.push_str(" --- |");
    }
    output.push('\n');

    for row in &table.rows {
        output.push_str(&format!("| {} | {} |", row.tier, row.entity.label()));
        for bucket in &table.buckets {
            let cell = row
                .buckets
                .get(bucket)
                .map(absolute_cell)
                .unwrap_or_default();
            output.push_str(&format!(" {} |", cell));
        }
        output.push_str(&format!(
            " {} | {} | {} |\n",
            absolute_cell(&row.last_year),
            ratio_cell(&row.mom),
            ratio_cell(&row.yoy)
        ));
    }

    output
}

pub fn annual_to_csv(annual: &AnnualComparison) -> String {
    let mut output = String::new();
    output.push_str("year to date,prior year,YoY,excluded\n");
    output.push_str(&format!(
        "{},{},{},{}\n",
        absolute_cell(&annual.current),
        absolute_cell(&annual.prior),
        ratio_cell(&annual.yoy),
        annual
            .excluded
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(";")
    ));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{Bucket, BucketKind};
    use crate::comparison::{ComparisonRow, RatioGap, RowEntity};
    use std::collections::BTreeMap;

    fn table() -> ComparisonTable {
        let week42 = Bucket::Week {
            year: 2024,
            week: 42,
        };
        let week43 = Bucket::Week {
            year: 2024,
            week: 43,
        };
        let ly = Bucket::Week {
            year: 2023,
            week: 43,
        };
        ComparisonTable {
            kind: BucketKind::Week,
            buckets: vec![week42, week43],
            current_bucket: week43,
            prior_bucket: week42,
            last_year_bucket: ly,
            rows: vec![ComparisonRow {
                tier: "tier-1".to_string(),
                entity: RowEntity::Entity("a".to_string()),
                buckets: BTreeMap::from([
                    (week42, PeriodSum::Complete(70.0)),
                    (
                        week43,
                        PeriodSum::Incomplete {
                            known: 50.0,
                            missing_days: 2,
                        },
                    ),
                ]),
                last_year: PeriodSum::Complete(35.0),
                mom: RatioCell::Null(RatioGap::MissingNumerator),
                yoy: RatioCell::Value(0.5),
            }],
        }
    }

    #[test]
    fn test_csv_renders_missing_as_empty() {
        let csv = table_to_csv(&table());
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "tier,entity,week 42,week 43,last year week 43,MoM,YoY"
        );
        // The incomplete week 43 sum and the null MoM are empty cells.
        assert_eq!(lines.next().unwrap(), "tier-1,a,70.00,,35.00,,50.0%");
    }

    #[test]
    fn test_markdown_has_header_separator() {
        let md = table_to_markdown(&table());
        let lines: Vec<&str> = md.lines().collect();
        assert!(lines[0].starts_with("| tier | entity |"));
        assert!(lines[1].starts_with("| --- |"));
        assert!(lines[2].contains("| 70.00 |"));
    }
}
