use crate::calendar::{Bucket, BucketKind, ReportCalendar};
use crate::error::{DealReportError, Result};
use crate::grid::DateRange;
use crate::utils::{days_in_month, first_day_of_month, months_back, same_day_last_year};
use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// All date windows derived for one report run. A pure function of the
/// reference date; nothing here touches observation data.
///
/// The reference date is the day the report runs, one day after the period it
/// covers (a weekly run on Sunday covers through the preceding Saturday).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSet {
    pub kind: BucketKind,
    /// The aggregated buckets, chronological.
    pub buckets: Vec<Bucket>,
    /// Day span of all `buckets` together.
    pub current: DateRange,
    pub current_bucket: Bucket,
    pub current_range: DateRange,
    pub prior_bucket: Bucket,
    pub prior_range: DateRange,
    pub last_year_bucket: Bucket,
    /// The same-period-last-year span, day-count aligned with
    /// `current_range` (same weekdays for weeks, same elapsed day count for
    /// months).
    pub last_year_range: DateRange,
    pub year_to_date: DateRange,
    pub prior_year_to_date: DateRange,
}

impl WindowSet {
    /// Weekly windows: `buckets` report weeks ending the day before
    /// `reference`.
    pub fn weekly(reference: NaiveDate, buckets: usize, cal: &ReportCalendar) -> Result<Self> {
        if buckets < 2 {
            return Err(DealReportError::InvalidBucketCount(buckets));
        }

        let period_end = reference - Days::new(1);
        let current = DateRange::new(
            period_end - Days::new(7 * buckets as u64 - 1),
            period_end,
        )?;

        let bucket_list: Vec<Bucket> = (0..buckets)
            .rev()
            .map(|i| cal.bucket_of(period_end - Days::new(7 * i as u64), BucketKind::Week))
            .collect();

        let current_range = DateRange::new(period_end - Days::new(6), period_end)?;
        let prior_range = DateRange::new(period_end - Days::new(13), period_end - Days::new(7))?;

        let last_year_reference = ReportCalendar::same_week_last_year(reference);
        let last_year_end = last_year_reference - Days::new(1);
        let last_year_range = DateRange::new(last_year_end - Days::new(6), last_year_end)?;

        Ok(Self {
            kind: BucketKind::Week,
            current_bucket: cal.bucket_of(period_end, BucketKind::Week),
            prior_bucket: cal.bucket_of(period_end - Days::new(7), BucketKind::Week),
            last_year_bucket: cal.bucket_of(last_year_end, BucketKind::Week),
            year_to_date: year_to_date(period_end)?,
            prior_year_to_date: year_to_date(last_year_end)?,
            buckets: bucket_list,
            current,
            current_range,
            prior_range,
            last_year_range,
        })
    }

    /// Monthly windows: `buckets` calendar months ending with the
    /// month-to-date of the day before `reference`. The prior-month and
    /// same-month-last-year spans are truncated to the same elapsed day
    /// count, clamped to the shorter month.
    pub fn monthly(reference: NaiveDate, buckets: usize, cal: &ReportCalendar) -> Result<Self> {
        if buckets < 2 {
            return Err(DealReportError::InvalidBucketCount(buckets));
        }

        let anchor = reference - Days::new(1);
        let elapsed = anchor.day();

        let current_range = DateRange::new(first_day_of_month(anchor), anchor)?;

        let (prior_year, prior_month) = months_back(anchor.year(), anchor.month(), 1);
        let prior_day = elapsed.min(days_in_month(prior_year, prior_month));
        let prior_range = DateRange::new(
            NaiveDate::from_ymd_opt(prior_year, prior_month, 1).unwrap(),
            NaiveDate::from_ymd_opt(prior_year, prior_month, prior_day).unwrap(),
        )?;

        let last_year_end = same_day_last_year(anchor);
        let last_year_range = DateRange::new(first_day_of_month(last_year_end), last_year_end)?;

        let bucket_list: Vec<Bucket> = (0..buckets)
            .rev()
            .map(|i| {
                let (year, month) = months_back(anchor.year(), anchor.month(), i as u32);
                Bucket::Month { year, month }
            })
            .collect();

        let (start_year, start_month) = months_back(anchor.year(), anchor.month(), buckets as u32 - 1);
        let current = DateRange::new(
            NaiveDate::from_ymd_opt(start_year, start_month, 1).unwrap(),
            anchor,
        )?;

        Ok(Self {
            kind: BucketKind::Month,
            current_bucket: cal.bucket_of(anchor, BucketKind::Month),
            prior_bucket: Bucket::Month {
                year: prior_year,
                month: prior_month,
            },
            last_year_bucket: cal.bucket_of(last_year_end, BucketKind::Month),
            year_to_date: year_to_date(anchor)?,
            prior_year_to_date: year_to_date(last_year_end)?,
            buckets: bucket_list,
            current,
            current_range,
            prior_range,
            last_year_range,
        })
    }

    /// Minimal set of disjoint date ranges the feed must cover for this
    /// window set. The grid is built over exactly these.
    pub fn required_ranges(&self) -> Vec<DateRange> {
        DateRange::cover(&[
            self.current,
            self.prior_range,
            self.year_to_date,
            self.last_year_range,
            self.prior_year_to_date,
        ])
    }
}

fn year_to_date(end: NaiveDate) -> Result<DateRange> {
    DateRange::new(NaiveDate::from_ymd_opt(end.year(), 1, 1).unwrap(), end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::NoHolidays;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn cal() -> ReportCalendar {
        ReportCalendar::new(&NoHolidays, [2023, 2024])
    }

    #[test]
    fn test_weekly_windows() {
        // 2024-10-27 is a Sunday; the covered period ends Saturday 10-26.
        let windows = WindowSet::weekly(d(2024, 10, 27), 8, &cal()).unwrap();

        assert_eq!(windows.current, DateRange::new(d(2024, 9, 1), d(2024, 10, 26)).unwrap());
        assert_eq!(windows.current.days(), 56);
        assert_eq!(windows.buckets.len(), 8);
        assert_eq!(
            windows.current_bucket,
            Bucket::Week {
                year: 2024,
                week: 43
            }
        );
        assert_eq!(
            windows.prior_bucket,
            Bucket::Week {
                year: 2024,
                week: 42
            }
        );
        assert_eq!(windows.buckets[7], windows.current_bucket);
        assert_eq!(windows.buckets[6], windows.prior_bucket);

        // Aligned week one year back: same weekdays, Sunday through Saturday.
        assert_eq!(
            windows.last_year_range,
            DateRange::new(d(2023, 10, 22), d(2023, 10, 28)).unwrap()
        );
        assert_eq!(
            windows.last_year_bucket,
            Bucket::Week {
                year: 2023,
                week: 43
            }
        );
    }

    #[test]
    fn test_weekly_buckets_strictly_increasing() {
        let windows = WindowSet::weekly(d(2024, 10, 27), 8, &cal()).unwrap();
        for pair in windows.buckets.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_monthly_windows_day_count_alignment() {
        // Anchor 2024-10-27: month-to-date vs the same 27-day spans.
        let windows = WindowSet::monthly(d(2024, 10, 28), 6, &cal()).unwrap();

        assert_eq!(
            windows.current_range,
            DateRange::new(d(2024, 10, 1), d(2024, 10, 27)).unwrap()
        );
        assert_eq!(
            windows.prior_range,
            DateRange::new(d(2024, 9, 1), d(2024, 9, 27)).unwrap()
        );
        assert_eq!(
            windows.last_year_range,
            DateRange::new(d(2023, 10, 1), d(2023, 10, 27)).unwrap()
        );
        assert_eq!(
            windows.current,
            DateRange::new(d(2024, 5, 1), d(2024, 10, 27)).unwrap()
        );
        assert_eq!(windows.buckets.len(), 6);
        assert_eq!(
            windows.buckets[0],
            Bucket::Month {
                year: 2024,
                month: 5
            }
        );
    }

    #[test]
    fn test_monthly_prior_clamps_to_shorter_month() {
        // Anchor 2024-03-31: the prior window is all of February (leap year).
        let windows = WindowSet::monthly(d(2024, 4, 1), 6, &cal()).unwrap();
        assert_eq!(
            windows.prior_range,
            DateRange::new(d(2024, 2, 1), d(2024, 2, 29)).unwrap()
        );
        assert_eq!(
            windows.last_year_range,
            DateRange::new(d(2023, 3, 1), d(2023, 3, 31)).unwrap()
        );
    }

    #[test]
    fn test_january_prior_month_is_covered_by_required_ranges() {
        // Anchor 2024-01-15: the prior month is December 2023, outside both
        // the year-to-date and last-year spans.
        let windows = WindowSet::monthly(d(2024, 1, 16), 6, &cal()).unwrap();
        let ranges = windows.required_ranges();
        let covered = |date: NaiveDate| ranges.iter().any(|r| r.contains(date));

        assert!(covered(d(2023, 12, 15)));
        assert!(covered(d(2024, 1, 15)));
        assert!(covered(d(2023, 1, 10)));
        for range in &ranges {
            assert!(range.start() <= range.end());
        }
    }

    #[test]
    fn test_rejects_too_few_buckets() {
        assert!(WindowSet::weekly(d(2024, 10, 27), 1, &cal()).is_err());
        assert!(WindowSet::monthly(d(2024, 10, 28), 0, &cal()).is_err());
    }
}
