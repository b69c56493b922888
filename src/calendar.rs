//! Calendar-index table and the calculators that enrich it.
//!
//! Every calculator takes the table by value and hands it back with its feature
//! group attached, so a failing calculator never leaves a half-enriched table behind.

pub mod date_attributes;
pub mod date_range;
pub mod events;
mod feasts;
pub mod holidays;
mod interval;
pub mod menu;
pub mod non_working_days;
pub mod school_year;
pub mod strikes;
pub mod working_days;

use chrono::NaiveDate;
use polars::prelude::{Column, DataFrame, NamedFrom, PlSmallStr, Series};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

pub use interval::{IntervalSet, LabeledInterval};

use crate::{
    config::check_format,
    error::{DataError, DateError, ForecastResult},
    polars_ext::{DataFrameExt, date_series, polars_to_forecast_error},
    table::{Table, TableName},
};

const TABLE: &str = "calendar table";

/// Fixed columns of the calendar table.
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
    PartialOrd,
    Ord,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum CalendarCol {
    // === Index ===
    /// Calendar day, one row per day.
    DateIndex,
    /// The same day rendered with the run's date format; join key of every stage.
    DateStr,

    // === Date attributes ===
    Year,
    Month,
    Day,
    /// ISO week number.
    Week,
    /// 0 is Monday.
    Weekday,

    // === Interval joins ===
    /// Label of the school year, `ete` outside of any.
    SchoolYear,
    /// Label of the holiday block, `ecole` outside of any.
    HolidayName,
    HolidaysIn,
    HolidaysAgo,
    /// Label of the public holiday, `jour_ouvre` on regular days.
    NonWorkingName,
    NonWorkingIn,
    NonWorkingAgo,

    // === Indicators ===
    Strike,
    HasMenu,
    Working,
    Wednesday,
}

impl From<CalendarCol> for PlSmallStr {
    fn from(value: CalendarCol) -> Self {
        value.as_str().into()
    }
}

impl CalendarCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Runs one enrichment step over the calendar table.
pub trait Calculator {
    fn name(&self) -> &'static str;

    fn apply(&self, table: CalendarTable) -> ForecastResult<CalendarTable>;
}

/// One row per calendar day, indexed by `date_index` and keyed by `date_str`.
#[derive(Debug, Clone)]
pub struct CalendarTable {
    df: DataFrame,
    date_format: String,
}

impl Table for CalendarTable {
    fn as_df(&self) -> &DataFrame {
        &self.df
    }
}

impl TableName for CalendarTable {
    fn base_name(&self) -> String {
        "calendar".to_string()
    }
}

impl CalendarTable {
    /// Builds the index columns for `dates`, in the given order.
    pub fn from_dates(dates: &[NaiveDate], date_format: &str) -> ForecastResult<Self> {
        check_format(date_format)?;
        let index = date_series(CalendarCol::DateIndex.as_str(), dates)?;
        let strings = dates
            .iter()
            .map(|d| d.format(date_format).to_string())
            .collect::<Vec<_>>();
        let date_str = Series::new(CalendarCol::DateStr.name(), strings);

        let df = DataFrame::new(vec![index.into(), date_str.into()])
            .map_err(|e| polars_to_forecast_error("building the calendar index", e))?;

        Ok(Self {
            df,
            date_format: date_format.to_string(),
        })
    }

    pub fn date_format(&self) -> &str {
        &self.date_format
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn into_df(self) -> DataFrame {
        self.df
    }

    /// Calendar days of the table, row by row.
    pub fn dates(&self) -> ForecastResult<Vec<NaiveDate>> {
        self.df
            .date_values(CalendarCol::DateIndex.as_str(), TABLE)?
            .into_iter()
            .enumerate()
            .map(|(row, date)| {
                date.ok_or_else(|| {
                    DateError::InvalidDate {
                        value: "null".to_string(),
                        reason: format!("missing date_index at row {row}"),
                    }
                    .into()
                })
            })
            .collect()
    }

    /// Attaches feature columns, replacing columns of the same name.
    pub(crate) fn with_columns(mut self, columns: Vec<Column>) -> ForecastResult<Self> {
        for column in columns {
            if column.len() != self.df.height() {
                return Err(DataError::DataFrame(format!(
                    "column '{}' has {} rows, calendar has {}",
                    column.name(),
                    column.len(),
                    self.df.height()
                ))
                .into());
            }
            self.df
                .with_column(column)
                .map_err(|e| polars_to_forecast_error("attaching calendar features", e))?;
        }
        Ok(self)
    }

    pub(crate) fn replace_df(self, df: DataFrame) -> Self {
        Self {
            df,
            date_format: self.date_format,
        }
    }

    /// Runs calculators in order.
    pub fn apply_all(self, calculators: &[&dyn Calculator]) -> ForecastResult<Self> {
        calculators.iter().try_fold(self, |table, calculator| {
            tracing::debug!(calculator = calculator.name(), "Applying calculator");
            calculator.apply(table)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_dates_renders_date_strings_with_format() {
        let dates = [
            NaiveDate::from_ymd_opt(2019, 5, 12).expect("valid date"),
            NaiveDate::from_ymd_opt(2019, 5, 13).expect("valid date"),
        ];
        let table = CalendarTable::from_dates(&dates, "%d/%m/%Y").expect("calendar");

        let strings = table
            .as_df()
            .str_ca(CalendarCol::DateStr.as_str(), TABLE)
            .expect("date_str")
            .into_no_null_iter()
            .collect::<Vec<_>>();
        assert_eq!(strings, vec!["12/05/2019", "13/05/2019"]);
        assert_eq!(table.dates().expect("dates"), dates.to_vec());
    }

    #[test]
    fn with_columns_rejects_mismatched_height() {
        let dates = [NaiveDate::from_ymd_opt(2019, 5, 12).expect("valid date")];
        let table = CalendarTable::from_dates(&dates, "%Y-%m-%d").expect("calendar");
        let column = Series::new("strike".into(), vec![0_i64, 1]).into();

        assert!(table.with_columns(vec![column]).is_err());
    }

    #[test]
    fn column_names_are_snake_case() {
        assert_eq!(CalendarCol::NonWorkingIn.as_str(), "non_working_in");
        assert_eq!(CalendarCol::DateStr.to_string(), "date_str");
    }
}
