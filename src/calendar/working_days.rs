use polars::prelude::{DataType, IntoLazy, col, lit, when};

use crate::{
    calendar::{
        CalendarCol, CalendarTable, Calculator, holidays::SCHOOL_DAY,
        non_working_days::WORKING_DAY,
    },
    error::ForecastResult,
    polars_ext::{DataFrameExt, LazyFrameExt},
    table::Table,
};

const WEDNESDAY: i64 = 2;

/// Canteen activity flags derived from weekday, holidays and public holidays.
///
/// `working` is 1 on weekdays outside holiday blocks and public holidays, Wednesdays
/// excluded unless `include_wednesday`. `wednesday` is 1 on Wednesdays.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkingDays {
    include_wednesday: bool,
}

impl WorkingDays {
    pub fn new(include_wednesday: bool) -> Self {
        Self { include_wednesday }
    }
}

impl Calculator for WorkingDays {
    fn name(&self) -> &'static str {
        "working_days"
    }

    #[tracing::instrument(skip_all, fields(include_wednesday = self.include_wednesday))]
    fn apply(&self, table: CalendarTable) -> ForecastResult<CalendarTable> {
        for required in [
            CalendarCol::Weekday,
            CalendarCol::HolidayName,
            CalendarCol::NonWorkingName,
        ] {
            table.as_df().require_column(required.as_str(), "calendar table")?;
        }

        let weekday = col(CalendarCol::Weekday);
        let mut working = weekday
            .clone()
            .lt(lit(5_i64))
            .and(col(CalendarCol::HolidayName).eq(lit(SCHOOL_DAY)))
            .and(col(CalendarCol::NonWorkingName).eq(lit(WORKING_DAY)));
        if !self.include_wednesday {
            working = working.and(weekday.clone().neq(lit(WEDNESDAY)));
        }

        let df = table
            .as_df()
            .clone()
            .lazy()
            .with_columns([
                when(working)
                    .then(lit(1_i64))
                    .otherwise(lit(0_i64))
                    .cast(DataType::Int64)
                    .alias(CalendarCol::Working.as_str()),
                when(weekday.eq(lit(WEDNESDAY)))
                    .then(lit(1_i64))
                    .otherwise(lit(0_i64))
                    .cast(DataType::Int64)
                    .alias(CalendarCol::Wednesday.as_str()),
            ])
            .collect_with("computing working-day flags")?;

        Ok(table.replace_df(df))
    }
}
