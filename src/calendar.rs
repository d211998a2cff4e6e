use crate::error::DealReportError;
use chrono::{Datelike, Days, NaiveDate, Weekday};
use schemars::JsonSchema;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BucketKind {
    Week,
    Month,
}

/// A named reporting period. Ordering is chronological (year major), never
/// lexical, so "week 9" sorts before "week 10".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bucket {
    Week { year: i32, week: u32 },
    Month { year: i32, month: u32 },
}

impl Bucket {
    pub fn kind(&self) -> BucketKind {
        match self {
            Bucket::Week { .. } => BucketKind::Week,
            Bucket::Month { .. } => BucketKind::Month,
        }
    }

    /// Human-facing label, e.g. "week 42" or "2024-05". Not safe to sort
    /// by: "week 9" is lexically greater than "week 10". Sort on the bucket
    /// itself.
    pub fn label(&self) -> String {
        match self {
            Bucket::Week { week, .. } => format!("week {}", week),
            Bucket::Month { year, month } => format!("{}-{:02}", year, month),
        }
    }

    /// Compact sortable key used for serialization, e.g. "2024-W42".
    pub fn key(&self) -> String {
        match self {
            Bucket::Week { year, week } => format!("{}-W{:02}", year, week),
            Bucket::Month { year, month } => format!("{}-M{:02}", year, month),
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Bucket {
    type Err = DealReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || DealReportError::DateError(format!("invalid bucket key: {}", s));
        let (year_part, rest) = s.split_once('-').ok_or_else(bad)?;
        let year: i32 = year_part.parse().map_err(|_| bad())?;

        if let Some(num) = rest.strip_prefix('W') {
            let week: u32 = num.parse().map_err(|_| bad())?;
            Ok(Bucket::Week { year, week })
        } else if let Some(num) = rest.strip_prefix('M') {
            let month: u32 = num.parse().map_err(|_| bad())?;
            Ok(Bucket::Month { year, month })
        } else {
            Err(bad())
        }
    }
}

impl Serialize for Bucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

impl<'de> Deserialize<'de> for Bucket {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Source of holiday dates, keyed by year. The engine never computes holidays
/// itself; they are supplied by the caller (e.g. loaded from a published
/// public-holiday table).
pub trait HolidayProvider {
    fn holidays(&self, year: i32) -> Vec<NaiveDate>;
}

/// A provider backed by an explicit list of dates.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FixedHolidays {
    pub dates: BTreeSet<NaiveDate>,
}

impl FixedHolidays {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            dates: dates.into_iter().collect(),
        }
    }
}

impl HolidayProvider for FixedHolidays {
    fn holidays(&self, year: i32) -> Vec<NaiveDate> {
        self.dates
            .iter()
            .filter(|d| d.year() == year)
            .copied()
            .collect()
    }
}

/// Provider with no holidays at all. Weekends still apply.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHolidays;

impl HolidayProvider for NoHolidays {
    fn holidays(&self, _year: i32) -> Vec<NaiveDate> {
        Vec::new()
    }
}

/// Report calendar for one run: bucket assignment plus holiday/weekend
/// predicates over a precomputed holiday set.
///
/// The report week runs Sunday through Saturday: a date falling on the
/// roll-forward weekday (Sunday by default) is advanced one day before its
/// ISO week is taken, so it lands in the *following* ISO week.
pub struct ReportCalendar {
    holidays: BTreeSet<NaiveDate>,
    roll_forward_day: Weekday,
}

impl ReportCalendar {
    /// Precomputes holidays for the given years; the calendar is immutable
    /// for the duration of the run.
    pub fn new(provider: &dyn HolidayProvider, years: impl IntoIterator<Item = i32>) -> Self {
        let mut holidays = BTreeSet::new();
        for year in years {
            holidays.extend(provider.holidays(year));
        }
        Self {
            holidays,
            roll_forward_day: Weekday::Sun,
        }
    }

    pub fn with_roll_forward_day(mut self, day: Weekday) -> Self {
        self.roll_forward_day = day;
        self
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    pub fn is_weekend(&self, date: NaiveDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// A day on which zero recorded activity is semantically plausible.
    pub fn is_non_trading_day(&self, date: NaiveDate) -> bool {
        self.is_weekend(date) || self.is_holiday(date)
    }

    pub fn bucket_of(&self, date: NaiveDate, kind: BucketKind) -> Bucket {
        match kind {
            BucketKind::Week => self.report_week(date),
            BucketKind::Month => Bucket::Month {
                year: date.year(),
                month: date.month(),
            },
        }
    }

    /// The report week of `date`. A date on the roll-forward weekday belongs
    /// to the following ISO week, never its own.
    pub fn report_week(&self, date: NaiveDate) -> Bucket {
        let effective = if date.weekday() == self.roll_forward_day {
            date + Days::new(1)
        } else {
            date
        };
        let iso = effective.iso_week();
        Bucket::Week {
            year: iso.year(),
            week: iso.week(),
        }
    }

    /// The date one year earlier with the same weekday as `date`, shifted
    /// 0 to 6 days forward from the naive year-subtracted date. The raw
    /// year-minus-one date systematically lands on a different weekday.
    pub fn same_week_last_year(date: NaiveDate) -> NaiveDate {
        let shifted = date.with_year(date.year() - 1).unwrap_or_else(|| {
            // Feb 29 has no prior-year counterpart
            NaiveDate::from_ymd_opt(date.year() - 1, 2, 28).unwrap()
        });
        let delta = (date.weekday().num_days_from_monday() + 7
            - shifted.weekday().num_days_from_monday())
            % 7;
        shifted + Days::new(delta as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cal() -> ReportCalendar {
        let holidays = FixedHolidays::new([
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
        ]);
        ReportCalendar::new(&holidays, [2023, 2024])
    }

    #[test]
    fn test_sunday_rolls_into_following_week() {
        let cal = cal();
        // 2024-10-20 is a Sunday; its ISO week is 42 but the report week is 43.
        let sunday = NaiveDate::from_ymd_opt(2024, 10, 20).unwrap();
        assert_eq!(sunday.iso_week().week(), 42);
        assert_eq!(
            cal.report_week(sunday),
            Bucket::Week {
                year: 2024,
                week: 43
            }
        );

        // The Saturday before stays in its own week.
        let saturday = NaiveDate::from_ymd_opt(2024, 10, 19).unwrap();
        assert_eq!(
            cal.report_week(saturday),
            Bucket::Week {
                year: 2024,
                week: 42
            }
        );
    }

    #[test]
    fn test_buckets_non_decreasing_over_chronological_dates() {
        let cal = cal();
        let mut prev: Option<Bucket> = None;
        let mut date = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        while date <= end {
            let bucket = cal.bucket_of(date, BucketKind::Month);
            if let Some(p) = prev {
                assert!(bucket >= p, "{:?} regressed after {:?}", bucket, p);
            }
            prev = Some(bucket);
            date += Days::new(1);
        }
    }

    #[test]
    fn test_bucket_ordinal_not_lexical() {
        let week9 = Bucket::Week {
            year: 2024,
            week: 9,
        };
        let week10 = Bucket::Week {
            year: 2024,
            week: 10,
        };
        assert!(week9 < week10);
        // Lexical labels would say otherwise.
        assert!(week9.label() > week10.label());
    }

    #[test]
    fn test_same_week_last_year_preserves_weekday() {
        let mut date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        while date <= end {
            let aligned = ReportCalendar::same_week_last_year(date);
            assert_eq!(aligned.weekday(), date.weekday(), "misaligned for {}", date);
            // Roughly one year back: the naive shift minus at most 6 days.
            let gap = (date - aligned).num_days();
            assert!((359..=366).contains(&gap), "gap {} for {}", gap, date);
            date += Days::new(1);
        }
    }

    #[test]
    fn test_holiday_and_weekend_predicates() {
        let cal = cal();
        assert!(cal.is_holiday(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        assert!(!cal.is_holiday(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()));
        // 2024-10-19 is a Saturday.
        assert!(cal.is_weekend(NaiveDate::from_ymd_opt(2024, 10, 19).unwrap()));
        assert!(cal.is_non_trading_day(NaiveDate::from_ymd_opt(2024, 10, 1).unwrap()));
        assert!(!cal.is_non_trading_day(NaiveDate::from_ymd_opt(2024, 10, 2).unwrap()));
    }

    #[test]
    fn test_bucket_key_round_trip() {
        let bucket = Bucket::Week {
            year: 2024,
            week: 7,
        };
        let key = bucket.key();
        assert_eq!(key, "2024-W07");
        assert_eq!(key.parse::<Bucket>().unwrap(), bucket);

        let month = Bucket::Month {
            year: 2023,
            month: 11,
        };
        assert_eq!(month.key().parse::<Bucket>().unwrap(), month);
    }
}
