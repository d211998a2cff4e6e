use chrono::{Datelike, Days, NaiveDate};

pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap()
        .checked_sub_days(Days::new(1))
        .unwrap()
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    last_day_of_month(year, month).day()
}

pub fn first_day_of_month(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap()
}

pub fn prev_month_end(date: NaiveDate) -> NaiveDate {
    let year = if date.month() == 1 {
        date.year() - 1
    } else {
        date.year()
    };

    let month = if date.month() == 1 {
        12
    } else {
        date.month() - 1
    };

    last_day_of_month(year, month)
}

/// Walks `months` calendar months back from (year, month).
pub fn months_back(year: i32, month: u32, months: u32) -> (i32, u32) {
    let total = year * 12 + month as i32 - 1 - months as i32;
    (total.div_euclid(12), (total.rem_euclid(12) + 1) as u32)
}

/// The same calendar day one year earlier, with the day-of-month clamped to
/// the shorter month (Feb 29 maps to Feb 28).
pub fn same_day_last_year(date: NaiveDate) -> NaiveDate {
    let year = date.year() - 1;
    let day = date.day().min(days_in_month(year, date.month()));
    NaiveDate::from_ymd_opt(year, date.month(), day).unwrap()
}

/// Inclusive day count of the closed range [start, end]. Callers guarantee
/// start <= end.
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> u32 {
    (end - start).num_days() as u32 + 1
}
