//! Date arithmetic for movable feasts.

use chrono::{Datelike, Duration, NaiveDate};

use crate::error::{DataError, DateError, ForecastResult};

fn ymd(year: i32, month: u32, day: u32) -> ForecastResult<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        DateError::InvalidDate {
            value: format!("{year:04}-{month:02}-{day:02}"),
            reason: "not a calendar day".to_string(),
        }
        .into()
    })
}

// ================================================================================================
// Easter
// ================================================================================================

/// Western Easter Sunday (anonymous Gregorian computus).
pub(crate) fn easter(year: i32) -> ForecastResult<NaiveDate> {
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
    ymd(year, month as u32, day as u32)
}

// ================================================================================================
// Tabular Islamic calendar
// ================================================================================================

const ISLAMIC_EPOCH: f64 = 1_948_439.5;
/// Julian day of 0001-01-01 at midnight minus one day.
const GREGORIAN_JD_OFFSET: f64 = 1_721_424.5;

fn gregorian_to_jd(date: NaiveDate) -> f64 {
    f64::from(date.num_days_from_ce()) + GREGORIAN_JD_OFFSET
}

fn jd_to_gregorian(jd: f64) -> ForecastResult<NaiveDate> {
    let days = (jd - GREGORIAN_JD_OFFSET).floor() as i32;
    NaiveDate::from_num_days_from_ce_opt(days).ok_or_else(|| {
        DateError::InvalidDate {
            value: jd.to_string(),
            reason: "julian day out of range".to_string(),
        }
        .into()
    })
}

fn islamic_to_jd(year: i32, month: u32, day: u32) -> f64 {
    let year = f64::from(year);
    f64::from(day)
        + (29.5 * (f64::from(month) - 1.0)).ceil()
        + (year - 1.0) * 354.0
        + ((3.0 + 11.0 * year) / 30.0).trunc()
        + ISLAMIC_EPOCH
        - 1.0
}

fn jd_to_islamic_year(jd: f64) -> i32 {
    let jd = jd.floor() + 0.5;
    ((30.0 * (jd - ISLAMIC_EPOCH) + 10646.0) / 10631.0).trunc() as i32
}

/// First day of Ramadan in the Islamic year running on January 1st of `year`.
pub(crate) fn ramadan_start(year: i32) -> ForecastResult<NaiveDate> {
    let islamic_year = jd_to_islamic_year(gregorian_to_jd(ymd(year, 1, 1)?));
    jd_to_gregorian(islamic_to_jd(islamic_year, 9, 1))
}

/// Eid al-Fitr, thirty days after the start of Ramadan.
pub(crate) fn eid(year: i32) -> ForecastResult<NaiveDate> {
    Ok(ramadan_start(year)? + Duration::days(30))
}

// ================================================================================================
// Chinese lunar new year
// ================================================================================================

const FIRST_LUNAR_YEAR: i32 = 1990;

/// (month, day) of the first day of the first lunar month, from 1990 onwards.
const LUNAR_NEW_YEAR: [(u32, u32); 61] = [
    (1, 27), (2, 15), (2, 4), (1, 23), (2, 10), (1, 31), (2, 19), (2, 7), (1, 28), (2, 16), // 1990
    (2, 5), (1, 24), (2, 12), (2, 1), (1, 22), (2, 9), (1, 29), (2, 18), (2, 7), (1, 26), // 2000
    (2, 14), (2, 3), (1, 23), (2, 10), (1, 31), (2, 19), (2, 8), (1, 28), (2, 16), (2, 5), // 2010
    (1, 25), (2, 12), (2, 1), (1, 22), (2, 10), (1, 29), (2, 17), (2, 6), (1, 26), (2, 13), // 2020
    (2, 3), (1, 23), (2, 11), (1, 31), (2, 19), (2, 8), (1, 28), (2, 15), (2, 4), (1, 24), // 2030
    (2, 12), (2, 1), (1, 22), (2, 10), (1, 30), (2, 17), (2, 6), (1, 26), (2, 14), (2, 2), // 2040
    (1, 23), // 2050
];

/// Last year of [`LUNAR_NEW_YEAR`].
pub(crate) const LAST_LUNAR_YEAR: i32 = FIRST_LUNAR_YEAR + LUNAR_NEW_YEAR.len() as i32 - 1;

pub(crate) fn chinese_new_year(year: i32) -> ForecastResult<NaiveDate> {
    let entry = usize::try_from(year - FIRST_LUNAR_YEAR)
        .ok()
        .and_then(|idx| LUNAR_NEW_YEAR.get(idx));
    match entry {
        Some((month, day)) => ymd(year, *month, *day),
        None => Err(DataError::UnsupportedYear {
            event: "chinese_new_year".to_string(),
            year,
            supported: format!("{FIRST_LUNAR_YEAR}..={LAST_LUNAR_YEAR}"),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid date")
    }

    #[test]
    fn easter_sundays() {
        assert_eq!(easter(2019).expect("easter"), date("2019-04-21"));
        assert_eq!(easter(2020).expect("easter"), date("2020-04-12"));
        assert_eq!(easter(2017).expect("easter"), date("2017-04-16"));
    }

    #[test]
    fn ramadan_follows_tabular_calendar() {
        let expected = [
            (2016, "2016-06-07"),
            (2017, "2017-05-27"),
            (2018, "2018-05-16"),
            (2019, "2019-05-06"),
            (2020, "2020-04-24"),
            (2030, "2030-01-06"),
            (2031, "2030-12-26"),
        ];
        for (year, ramadan) in expected {
            assert_eq!(ramadan_start(year).expect("ramadan"), date(ramadan), "year {year}");
        }
        assert_eq!(eid(2019).expect("eid"), date("2019-06-05"));
    }

    #[test]
    fn chinese_new_year_table_bounds() {
        assert_eq!(chinese_new_year(1990).expect("cny"), date("1990-01-27"));
        assert_eq!(chinese_new_year(2020).expect("cny"), date("2020-01-25"));
        assert_eq!(chinese_new_year(2040).expect("cny"), date("2040-02-12"));
        assert_eq!(chinese_new_year(2041).expect("cny"), date("2041-02-01"));
        assert_eq!(chinese_new_year(2050).expect("cny"), date("2050-01-23"));
        let error = chinese_new_year(2051).expect_err("beyond the table");
        assert!(matches!(
            &error,
            crate::error::ForecastError::Data(DataError::UnsupportedYear { year: 2051, .. })
        ));
        assert!(error.to_string().contains("1990..=2050"), "{error}");
        assert!(chinese_new_year(1989).is_err());
    }
}
