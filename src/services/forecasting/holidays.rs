use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// One holiday with its bridge window: `lower_window..=upper_window` days
/// around the date are treated as affected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: String,
    pub lower_window: i64,
    pub upper_window: i64,
}

/// Fixed-date Brazilian national holidays as (month, day, name).
const FIXED_HOLIDAYS: [(u32, u32, &str); 8] = [
    (1, 1, "Confraternização Universal"),
    (4, 21, "Tiradentes"),
    (5, 1, "Dia do Trabalhador"),
    (9, 7, "Independência do Brasil"),
    (10, 12, "Nossa Senhora Aparecida"),
    (11, 2, "Finados"),
    (11, 15, "Proclamação da República"),
    (12, 25, "Natal"),
];

/// Easter Sunday by the anonymous Gregorian computus.
pub fn easter_sunday(year: i32) -> NaiveDate {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32).expect("computus yields a valid date")
}

fn window_for(name: &str) -> (i64, i64) {
    // Year-end holidays and Good Friday stretch into long weekends; Corpus
    // Christi commonly bridges the day before.
    match name {
        "Sexta-feira Santa" => (0, 2),
        "Natal" | "Confraternização Universal" => (0, 3),
        "Corpus Christi" => (-1, 1),
        _ => (0, 0),
    }
}

/// The Brazilian holiday calendar for one year: fixed national dates plus the
/// Easter-derived movable ones (Carnival Monday/Tuesday, Ash Wednesday, Good
/// Friday, Corpus Christi), each with its bridge window.
pub fn holidays_for_year(year: i32) -> Vec<Holiday> {
    let easter = easter_sunday(year);
    let mut days: Vec<(NaiveDate, String)> = FIXED_HOLIDAYS
        .iter()
        .map(|(month, day, name)| {
            (
                NaiveDate::from_ymd_opt(year, *month, *day).expect("fixed holiday date"),
                name.to_string(),
            )
        })
        .collect();
    days.push((easter - Duration::days(48), "Carnaval (Segunda-feira)".into()));
    days.push((easter - Duration::days(47), "Carnaval (Terça-feira)".into()));
    days.push((easter - Duration::days(46), "Quarta-feira de Cinzas".into()));
    days.push((easter - Duration::days(2), "Sexta-feira Santa".into()));
    days.push((easter + Duration::days(60), "Corpus Christi".into()));
    days.sort_by_key(|(date, _)| *date);

    days.into_iter()
        .map(|(date, name)| {
            let (lower_window, upper_window) = window_for(&name);
            Holiday {
                date,
                name,
                lower_window,
                upper_window,
            }
        })
        .collect()
}

pub fn holidays_in_range(start_year: i32, end_year: i32) -> Vec<Holiday> {
    (start_year..=end_year).flat_map(holidays_for_year).collect()
}

/// Number of holiday-affected days (window included) falling in each month of
/// the given year range. Used as the monthly holiday regressor.
pub fn monthly_coverage(start_year: i32, end_year: i32) -> HashMap<(i32, u32), f64> {
    let mut coverage: HashMap<(i32, u32), f64> = HashMap::new();
    for holiday in holidays_in_range(start_year - 1, end_year + 1) {
        for offset in holiday.lower_window..=holiday.upper_window {
            let day = holiday.date + Duration::days(offset);
            if day.year() >= start_year && day.year() <= end_year {
                *coverage.entry((day.year(), day.month())).or_insert(0.0) += 1.0;
            }
        }
    }
    coverage
}

/// Whether the month of `date` contains a fixed national holiday. Used as a
/// binary calendar feature for monthly series.
pub fn month_has_national_holiday(date: NaiveDate) -> bool {
    FIXED_HOLIDAYS
        .iter()
        .any(|(month, _, _)| *month == date.month())
}
