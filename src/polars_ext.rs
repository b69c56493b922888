use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use polars::prelude::{
    Column, DataFrame, DataType, Expr, Float64Chunked, IntoSeries, JoinArgs, JoinType, LazyFrame,
    NamedFrom, Null, PlSmallStr, PolarsError, Selector, Series, SortMultipleOptions,
    StringChunked, lit, when,
};

use crate::error::{DataError, DateError, ForecastError, ForecastResult};

pub(crate) fn polars_to_forecast_error(stage: &str, e: PolarsError) -> ForecastError {
    ForecastError::Data(DataError::DataFrame(format!("Error while {stage}: {e}")))
}

fn unix_epoch() -> NaiveDate {
    DateTime::<Utc>::UNIX_EPOCH.date_naive()
}

/// Days between the unix epoch and `date`, the physical representation of polars `Date`.
pub(crate) fn epoch_days(date: NaiveDate) -> i32 {
    (date - unix_epoch()).num_days() as i32
}

pub(crate) fn from_epoch_days(days: i32) -> Option<NaiveDate> {
    unix_epoch().checked_add_signed(chrono::Duration::days(i64::from(days)))
}

/// Builds a polars `Date` series from calendar dates.
pub(crate) fn date_series(name: &str, dates: &[NaiveDate]) -> ForecastResult<Series> {
    let days = dates.iter().copied().map(epoch_days).collect::<Vec<_>>();
    Series::new(name.into(), days)
        .cast(&DataType::Date)
        .map_err(|e| polars_to_forecast_error("building a date column", e))
}

pub trait ExprExt {
    /// Divides two expressions as floats, yielding null when the denominator is zero.
    fn safe_div(self, other: Expr) -> Expr;
}

impl ExprExt for Expr {
    fn safe_div(self, other: Expr) -> Expr {
        when(other.clone().eq(lit(0.0)))
            .then(lit(Null {}).cast(DataType::Float64))
            .otherwise(self.cast(DataType::Float64) / other.cast(DataType::Float64))
    }
}

pub(crate) trait DataFrameExt {
    fn require_column(&self, name: &str, table: &str) -> ForecastResult<&Column>;
    fn str_ca(&self, name: &str, table: &str) -> ForecastResult<&StringChunked>;
    fn string_values(&self, name: &str, table: &str) -> ForecastResult<Vec<Option<String>>>;
    fn f64_values(&self, name: &str, table: &str) -> ForecastResult<Float64Chunked>;
    fn date_values(&self, name: &str, table: &str) -> ForecastResult<Vec<Option<NaiveDate>>>;
    fn column_names_owned(&self) -> Vec<String>;
}

impl DataFrameExt for DataFrame {
    fn require_column(&self, name: &str, table: &str) -> ForecastResult<&Column> {
        self.column(name).map_err(|_| {
            DataError::MissingColumn {
                column: name.to_string(),
                table: table.to_string(),
            }
            .into()
        })
    }

    fn str_ca(&self, name: &str, table: &str) -> ForecastResult<&StringChunked> {
        self.require_column(name, table)?.str().map_err(|_| {
            DataError::DataFrame(format!("Column '{name}' of {table} is not String")).into()
        })
    }

    fn string_values(&self, name: &str, table: &str) -> ForecastResult<Vec<Option<String>>> {
        let casted = self
            .require_column(name, table)?
            .cast(&DataType::String)
            .map_err(|e| polars_to_forecast_error(&format!("casting '{name}' to String"), e))?;
        let ca = casted
            .str()
            .map_err(|e| polars_to_forecast_error(&format!("reading '{name}' as String"), e))?;
        Ok(ca.into_iter().map(|v| v.map(str::to_string)).collect())
    }

    fn f64_values(&self, name: &str, table: &str) -> ForecastResult<Float64Chunked> {
        let casted = self
            .require_column(name, table)?
            .cast(&DataType::Float64)
            .map_err(|e| polars_to_forecast_error(&format!("casting '{name}' to Float64"), e))?;
        casted
            .f64()
            .cloned()
            .map_err(|e| polars_to_forecast_error(&format!("reading '{name}' as Float64"), e))
    }

    fn date_values(&self, name: &str, table: &str) -> ForecastResult<Vec<Option<NaiveDate>>> {
        let column = self.require_column(name, table)?;
        if !matches!(column.dtype(), DataType::Date) {
            return Err(
                DataError::DataFrame(format!("Column '{name}' of {table} is not Date")).into(),
            );
        }
        let physical = column
            .cast(&DataType::Int32)
            .map_err(|e| polars_to_forecast_error(&format!("reading dates of '{name}'"), e))?;
        let ca = physical
            .i32()
            .map_err(|e| polars_to_forecast_error(&format!("reading dates of '{name}'"), e))?;
        Ok(ca
            .into_iter()
            .map(|days| days.and_then(from_epoch_days))
            .collect())
    }

    fn column_names_owned(&self) -> Vec<String> {
        self.get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }
}

const ROW_ORDER: &str = "__row_order";

pub(crate) trait LazyFrameExt {
    fn collect_with(self, stage: &str) -> ForecastResult<DataFrame>;

    /// Left join on equal key names that keeps the row order of `self`.
    fn left_join_in_order(self, other: LazyFrame, keys: Vec<Expr>) -> LazyFrame;
}

impl LazyFrameExt for LazyFrame {
    fn collect_with(self, stage: &str) -> ForecastResult<DataFrame> {
        self.collect().map_err(|e| polars_to_forecast_error(stage, e))
    }

    fn left_join_in_order(self, other: LazyFrame, keys: Vec<Expr>) -> LazyFrame {
        self.with_row_index(ROW_ORDER, None)
            .join(other, keys.clone(), keys, JoinArgs::new(JoinType::Left))
            .sort([ROW_ORDER], SortMultipleOptions::default())
            .drop(Selector::ByName {
                names: Arc::from([PlSmallStr::from(ROW_ORDER)]),
                strict: false,
            })
    }
}

/// Parses `value` with a strftime `format`.
pub(crate) fn parse_date(value: &str, format: &str) -> ForecastResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), format).map_err(|e| {
        DateError::InvalidDate {
            value: value.to_string(),
            reason: format!("does not match format '{format}': {e}"),
        }
        .into()
    })
}

/// Materializes an `Option<f64>` iterator as a named column.
pub(crate) fn f64_column(name: &str, values: Vec<Option<f64>>) -> Column {
    Series::new(name.into(), values).into_series().into()
}
