use crate::error::{DealReportError, Result};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A closed date range [start, end]. Construction rejects inverted ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(DealReportError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn days(&self) -> u32 {
        crate::utils::days_inclusive(self.start, self.end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn iter(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    /// Merges a set of ranges into the minimal list of disjoint covering
    /// ranges. Adjacent ranges (end + 1 day == next start) coalesce.
    pub fn cover(ranges: &[DateRange]) -> Vec<DateRange> {
        let mut sorted: Vec<DateRange> = ranges.to_vec();
        sorted.sort_by_key(|r| (r.start, r.end));

        let mut merged: Vec<DateRange> = Vec::new();
        for range in sorted {
            match merged.last_mut() {
                Some(last) if range.start <= last.end + Days::new(1) => {
                    if range.end > last.end {
                        last.end = range.end;
                    }
                }
                _ => merged.push(range),
            }
        }
        merged
    }
}

/// Complete (entity, date) cross product over a closed range: exactly
/// |entities| x days rows, entity major, date minor, no duplicates.
///
/// Pure function; duplicate entity names collapse to one.
pub fn date_grid(entities: &[String], range: DateRange) -> Result<Vec<(String, NaiveDate)>> {
    if entities.is_empty() {
        return Err(DealReportError::EmptyEntitySet);
    }

    let unique: BTreeSet<&String> = entities.iter().collect();
    let mut rows = Vec::with_capacity(unique.len() * range.days() as usize);
    for entity in unique {
        for date in range.iter() {
            rows.push((entity.clone(), date));
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = DateRange::new(d(2024, 2, 1), d(2024, 1, 1)).unwrap_err();
        assert!(matches!(
            err,
            crate::error::DealReportError::InvalidRange { .. }
        ));
    }

    #[test]
    fn test_grid_row_count_and_uniqueness() {
        let entities = vec!["hangzhou".to_string(), "quzhou".to_string()];
        let range = DateRange::new(d(2024, 1, 1), d(2024, 1, 7)).unwrap();
        let rows = date_grid(&entities, range).unwrap();

        assert_eq!(rows.len(), 2 * 7);

        let unique: BTreeSet<_> = rows.iter().collect();
        assert_eq!(unique.len(), rows.len());
    }

    #[test]
    fn test_grid_is_entity_major_date_minor() {
        let entities = vec!["b".to_string(), "a".to_string()];
        let range = DateRange::new(d(2024, 1, 1), d(2024, 1, 2)).unwrap();
        let rows = date_grid(&entities, range).unwrap();

        let expected = vec![
            ("a".to_string(), d(2024, 1, 1)),
            ("a".to_string(), d(2024, 1, 2)),
            ("b".to_string(), d(2024, 1, 1)),
            ("b".to_string(), d(2024, 1, 2)),
        ];
        assert_eq!(rows, expected);
    }

    #[test]
    fn test_grid_empty_entities_rejected() {
        let range = DateRange::new(d(2024, 1, 1), d(2024, 1, 2)).unwrap();
        assert!(date_grid(&[], range).is_err());
    }

    #[test]
    fn test_cover_merges_overlapping_and_adjacent() {
        let a = DateRange::new(d(2024, 1, 1), d(2024, 1, 10)).unwrap();
        let b = DateRange::new(d(2024, 1, 11), d(2024, 1, 20)).unwrap();
        let c = DateRange::new(d(2024, 3, 1), d(2024, 3, 5)).unwrap();
        let d2 = DateRange::new(d(2024, 1, 5), d(2024, 1, 12)).unwrap();

        let cover = DateRange::cover(&[c, a, b, d2]);
        assert_eq!(
            cover,
            vec![
                DateRange::new(d(2024, 1, 1), d(2024, 1, 20)).unwrap(),
                DateRange::new(d(2024, 3, 1), d(2024, 3, 5)).unwrap(),
            ]
        );
    }
}
