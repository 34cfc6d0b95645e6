//! French public holiday calendar for business-day features

use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::BTreeSet;

/// Fixed and movable French public holidays.
///
/// Pure function of the calendar year; the movable feasts (Easter Monday,
/// Ascension Day) are derived from the Gregorian computus.
pub struct FrenchHolidayCalendar;

impl FrenchHolidayCalendar {
    /// All holidays falling inside `[start, end]`, both bounds inclusive.
    ///
    /// An inverted range yields an empty set.
    pub fn holidays(&self, start: NaiveDate, end: NaiveDate) -> BTreeSet<NaiveDate> {
        let mut days = BTreeSet::new();
        if start > end {
            return days;
        }

        for year in start.year()..=end.year() {
            for day in Self::holidays_for_year(year) {
                if day >= start && day <= end {
                    days.insert(day);
                }
            }
        }
        days
    }

    /// The ten French public holidays of a single year.
    pub fn holidays_for_year(year: i32) -> Vec<NaiveDate> {
        let easter = easter_sunday(year);
        vec![
            date(year, 1, 1),                         // New Year's Day
            easter + chrono::Days::new(1),            // Easter Monday
            date(year, 5, 1),                         // Labour Day
            date(year, 5, 8),                         // Victory in Europe Day
            easter + chrono::Days::new(39),           // Ascension Day
            date(year, 7, 14),                        // Bastille Day
            date(year, 8, 15),                        // Assumption Day
            date(year, 11, 1),                        // All Saints Day
            date(year, 11, 11),                       // Armistice Day
            date(year, 12, 25),                       // Christmas Day
        ]
    }
}

/// A weekday that is not a public holiday.
pub fn is_business_day(day: NaiveDate, holidays: &BTreeSet<NaiveDate>) -> bool {
    !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) && !holidays.contains(&day)
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    // All holiday month/day pairs are valid in every Gregorian year.
    NaiveDate::from_ymd_opt(year, month, day).expect("fixed holiday date")
}

/// Easter Sunday via the anonymous Gregorian computus.
fn easter_sunday(year: i32) -> NaiveDate {
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
    date(year, month as u32, day as u32)
}
