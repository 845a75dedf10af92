use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// One canonical demand observation: a single (SKU, month) quantity together
/// with the family and process segment codes it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub sku: String,
    pub period: NaiveDate,
    pub quantity: f64,
    pub family: String,
    pub process: String,
}

/// A point of a single monthly series (one grouping key, one month).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub period: NaiveDate,
    pub quantity: f64,
}

/// Truncates a date to the first day of its month.
pub fn month_floor(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).expect("first of month is always valid")
}

/// Adds a (possibly negative) number of months, staying on the first of the
/// month.
pub fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    let zero_based = date.year() * 12 + date.month() as i32 - 1 + months;
    let year = zero_based.div_euclid(12);
    let month = zero_based.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1).expect("first of month is always valid")
}

/// Whole months from `from` to `to` (both truncated to month).
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    let from = month_floor(from);
    let to = month_floor(to);
    (to.year() as i64 - from.year() as i64) * 12 + (to.month() as i64 - from.month() as i64)
}

/// The `horizon` months that follow `last`, month-start frequency.
pub fn future_months(last: NaiveDate, horizon: usize) -> Vec<NaiveDate> {
    (1..=horizon as i32)
        .map(|offset| add_months(month_floor(last), offset))
        .collect()
}

/// Calendar quarter of a month (1..=4).
pub fn quarter_of(month: u32) -> u32 {
    (month - 1) / 3 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn month_floor_truncates() {
        assert_eq!(month_floor(d(2024, 3, 17)), d(2024, 3, 1));
        assert_eq!(month_floor(d(2024, 3, 1)), d(2024, 3, 1));
    }

    #[test]
    fn add_months_crosses_year_boundaries() {
        assert_eq!(add_months(d(2024, 11, 1), 3), d(2025, 2, 1));
        assert_eq!(add_months(d(2024, 1, 1), -2), d(2023, 11, 1));
        assert_eq!(add_months(d(2024, 6, 15), 0), d(2024, 6, 1));
    }

    #[test]
    fn months_between_is_signed() {
        assert_eq!(months_between(d(2024, 1, 1), d(2024, 12, 1)), 11);
        assert_eq!(months_between(d(2024, 12, 1), d(2024, 1, 1)), -11);
    }

    #[test]
    fn future_months_start_after_last() {
        let future = future_months(d(2024, 11, 1), 3);
        assert_eq!(future, vec![d(2024, 12, 1), d(2025, 1, 1), d(2025, 2, 1)]);
    }

    #[test]
    fn quarters() {
        assert_eq!(quarter_of(1), 1);
        assert_eq!(quarter_of(3), 1);
        assert_eq!(quarter_of(4), 2);
        assert_eq!(quarter_of(12), 4);
    }
}
