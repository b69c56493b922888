use chrono::{DateTime, Datelike, NaiveDate};
use polars::prelude::{AnyValue, Column, NamedFrom, Series, TimeUnit};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    calendar::{CalendarCol, CalendarTable, Calculator},
    config::check_format,
    error::{DateError, ForecastError, ForecastResult},
    polars_ext::{DataFrameExt, from_epoch_days, parse_date},
    table::Table,
};

/// Earliest year accepted as a real observation date.
const MIN_PLAUSIBLE_YEAR: i32 = 2000;

/// Plain calendar scalar extracted from a date.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum DateAttribute {
    Year,
    Month,
    Day,
    /// ISO 8601 week number.
    #[strum(serialize = "isoweek", to_string = "week")]
    Week,
    /// 0 is Monday, 6 is Sunday.
    Weekday,
}

impl DateAttribute {
    pub fn column(&self) -> CalendarCol {
        match self {
            Self::Year => CalendarCol::Year,
            Self::Month => CalendarCol::Month,
            Self::Day => CalendarCol::Day,
            Self::Week => CalendarCol::Week,
            Self::Weekday => CalendarCol::Weekday,
        }
    }

    pub fn extract(&self, date: NaiveDate) -> i64 {
        match self {
            Self::Year => i64::from(date.year()),
            Self::Month => i64::from(date.month()),
            Self::Day => i64::from(date.day()),
            Self::Week => i64::from(date.iso_week().week()),
            Self::Weekday => i64::from(date.weekday().num_days_from_monday()),
        }
    }
}

// ================================================================================================
// Scalar conversion
// ================================================================================================

pub trait DateValue {
    /// Interprets a cell as a calendar date; strings are parsed with `format`.
    fn to_date(self, format: &str) -> ForecastResult<NaiveDate>;
}

impl DateValue for &AnyValue<'_> {
    fn to_date(self, format: &str) -> ForecastResult<NaiveDate> {
        let date = match self {
            AnyValue::String(s) => parse_date(s, format)?,
            AnyValue::StringOwned(s) => parse_date(s.as_str(), format)?,
            AnyValue::Date(days) => from_epoch_days(*days).ok_or_else(|| invalid(self, "out of range"))?,
            AnyValue::Datetime(value, unit, _) => {
                let timestamp = match unit {
                    TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(*value)),
                    TimeUnit::Microseconds => DateTime::from_timestamp_micros(*value),
                    TimeUnit::Milliseconds => DateTime::from_timestamp_millis(*value),
                };
                timestamp
                    .map(|ts| ts.date_naive())
                    .ok_or_else(|| invalid(self, "out of range"))?
            }
            AnyValue::Null => return Err(invalid(self, "value is null")),
            _ => return Err(invalid(self, "expected a string or a date")),
        };

        if date.year() < MIN_PLAUSIBLE_YEAR {
            return Err(DateError::InvalidDate {
                value: date.to_string(),
                reason: format!("year is before {MIN_PLAUSIBLE_YEAR}"),
            }
            .into());
        }
        Ok(date)
    }
}

fn invalid(value: &AnyValue<'_>, reason: &str) -> ForecastError {
    DateError::InvalidDate {
        value: format!("{value:?}"),
        reason: reason.to_string(),
    }
    .into()
}

/// Extracts a named attribute from a single date cell.
///
/// # Errors
/// - [`DateError::Format`] if `format` is not a strftime pattern.
/// - [`DateError::UnknownAttribute`] for names other than year, month, day, week, isoweek, weekday.
/// - [`DateError::InvalidDate`] for nulls, non-date values, unparseable strings and years before 2000.
pub fn date_attribute(value: &AnyValue<'_>, attribute: &str, format: &str) -> ForecastResult<i64> {
    check_format(format)?;
    let attribute = attribute
        .parse::<DateAttribute>()
        .map_err(|_| DateError::UnknownAttribute(attribute.to_string()))?;
    Ok(attribute.extract(value.to_date(format)?))
}

// ================================================================================================
// Calculator
// ================================================================================================

/// Adds one integer column per requested attribute, derived from `date_str`.
#[derive(Debug, Clone)]
pub struct DateAttributes {
    attributes: Vec<DateAttribute>,
}

impl Default for DateAttributes {
    fn default() -> Self {
        Self {
            attributes: vec![
                DateAttribute::Year,
                DateAttribute::Month,
                DateAttribute::Day,
                DateAttribute::Week,
                DateAttribute::Weekday,
            ],
        }
    }
}

impl DateAttributes {
    pub fn new(attributes: Vec<DateAttribute>) -> Self {
        Self { attributes }
    }
}

impl Calculator for DateAttributes {
    fn name(&self) -> &'static str {
        "date_attributes"
    }

    #[tracing::instrument(skip_all, fields(rows = table.height()))]
    fn apply(&self, table: CalendarTable) -> ForecastResult<CalendarTable> {
        let format = table.date_format().to_string();
        let dates = table
            .as_df()
            .str_ca(CalendarCol::DateStr.as_str(), "calendar table")?
            .into_iter()
            .map(|s| match s {
                Some(s) => (&AnyValue::String(s)).to_date(&format),
                None => (&AnyValue::Null).to_date(&format),
            })
            .collect::<ForecastResult<Vec<_>>>()?;

        let columns = self
            .attributes
            .iter()
            .map(|attribute| {
                let values = dates.iter().map(|d| attribute.extract(*d)).collect::<Vec<_>>();
                Column::from(Series::new(attribute.column().name(), values))
            })
            .collect();

        table.with_columns(columns)
    }
}
