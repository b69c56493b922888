use polars::prelude::{Column, NamedFrom, Series};

use crate::{
    calendar::{
        CalendarCol, CalendarTable, Calculator,
        interval::{IntervalSet, intervals_from_frame},
    },
    error::ForecastResult,
    source::{DataSource, Dataset},
};

/// Label of days between two school years.
pub const SUMMER: &str = "ete";

/// School-year label of each day, `ete` when the day belongs to none.
#[derive(Debug, Clone)]
pub struct SchoolYears {
    years: IntervalSet,
}

impl SchoolYears {
    pub fn new(years: IntervalSet) -> Self {
        Self { years }
    }

    pub fn from_source(source: &dyn DataSource, date_format: &str) -> ForecastResult<Self> {
        let df = source.load(Dataset::SchoolYears)?;
        let intervals = intervals_from_frame(&df, "school years", date_format, None)?;
        Ok(Self::new(IntervalSet::new(intervals)?))
    }
}

impl Calculator for SchoolYears {
    fn name(&self) -> &'static str {
        "school_year"
    }

    #[tracing::instrument(skip_all, fields(rows = table.height()))]
    fn apply(&self, table: CalendarTable) -> ForecastResult<CalendarTable> {
        let labels = table
            .dates()?
            .into_iter()
            .map(|d| self.years.label_for(d).unwrap_or(SUMMER).to_string())
            .collect::<Vec<_>>();

        table.with_columns(vec![Column::from(Series::new(
            CalendarCol::SchoolYear.name(),
            labels,
        ))])
    }
}
