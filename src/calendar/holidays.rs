use polars::prelude::{Column, NamedFrom, Series};
use tracing::debug;

use crate::{
    calendar::{
        CalendarCol, CalendarTable, Calculator,
        interval::{IntervalSet, interval_features, intervals_from_frame},
    },
    error::ForecastResult,
    source::{DataSource, Dataset},
};

/// Label of days outside any holiday block.
pub const SCHOOL_DAY: &str = "ecole";

/// Holiday label and countdowns to the neighbouring holiday blocks.
///
/// Adds `holiday_name`, `holidays_in` and `holidays_ago`. Consecutive holiday days
/// form one block whatever the number of reference rows behind them.
#[derive(Debug, Clone)]
pub struct Holidays {
    holidays: IntervalSet,
}

impl Holidays {
    pub fn new(holidays: IntervalSet) -> Self {
        Self { holidays }
    }

    /// Reads the holiday reference, keeping one zone when `zone` is given.
    pub fn from_source(
        source: &dyn DataSource,
        date_format: &str,
        zone: Option<&str>,
    ) -> ForecastResult<Self> {
        let df = source.load(Dataset::Holidays)?;
        let intervals = intervals_from_frame(&df, "holidays", date_format, zone)?;
        let holidays = IntervalSet::new(intervals)?;
        debug!(blocks = holidays.len(), ?zone, "Loaded holidays");
        Ok(Self::new(holidays))
    }
}

impl Calculator for Holidays {
    fn name(&self) -> &'static str {
        "holidays"
    }

    #[tracing::instrument(skip_all, fields(rows = table.height()))]
    fn apply(&self, table: CalendarTable) -> ForecastResult<CalendarTable> {
        let dates = table.dates()?;
        let features = interval_features(&dates, |d| self.holidays.label_for(d), SCHOOL_DAY);

        table.with_columns(vec![
            Column::from(Series::new(CalendarCol::HolidaysIn.name(), features.days_in)),
            Column::from(Series::new(CalendarCol::HolidaysAgo.name(), features.days_ago)),
            Column::from(Series::new(CalendarCol::HolidayName.name(), features.labels)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use polars::prelude::df;

    use super::*;
    use crate::{
        calendar::date_range::DateRangeGenerator, polars_ext::DataFrameExt, source::MemorySource,
        table::Table,
    };

    fn holiday_source() -> MemorySource {
        let holidays = df![
            "label" => [
                "Vacances d'Ete", "Vacances d'Ete", "Vacances de la Toussaint",
                "Vacances d'Hiver", "Vacances de Printemps", "Vacances d'Ete",
                "Vacances d'Ete",
            ],
            "start" => [
                "2017-07-08", "2017-07-08", "2017-10-21", "2018-02-10", "2019-04-06",
                "2019-07-07", "2017-07-08",
            ],
            "end" => [
                "2017-09-03", "2017-09-03", "2017-11-05", "2018-02-25", "2019-04-21",
                "2019-09-01", "2017-09-03",
            ],
            "zone" => ["A", "A", "A", "A", "A", "A", "B"],
        ]
        .expect("holidays frame");
        MemorySource::default().with_dataset(Dataset::Holidays, holidays)
    }

    fn sparse_table() -> CalendarTable {
        let dates = [
            "2017-09-01", "2017-09-04", "2017-09-05", "2018-02-25", "2019-05-07", "2019-05-08",
            "2019-09-07",
        ]
        .iter()
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid date"))
        .collect::<Vec<_>>();
        CalendarTable::from_dates(&dates, "%Y-%m-%d").expect("calendar")
    }

    fn column_i64(table: &CalendarTable, col: CalendarCol) -> Vec<i64> {
        table
            .as_df()
            .column(col.as_str())
            .expect("column")
            .i64()
            .expect("i64")
            .into_no_null_iter()
            .collect()
    }

    #[test]
    fn sparse_table_measures_distance_on_full_calendar() {
        let calculator =
            Holidays::from_source(&holiday_source(), "%Y-%m-%d", Some("A")).expect("holidays");
        let table = calculator.apply(sparse_table()).expect("apply");

        let labels = table
            .as_df()
            .string_values(CalendarCol::HolidayName.as_str(), "calendar")
            .expect("labels")
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        assert_eq!(
            labels,
            vec![
                "Vacances d'Ete", "ecole", "ecole", "Vacances d'Hiver", "ecole", "ecole", "ecole"
            ]
        );
        assert_eq!(
            column_i64(&table, CalendarCol::HolidaysIn),
            vec![0, 47, 46, 0, 61, 60, 0]
        );
        assert_eq!(
            column_i64(&table, CalendarCol::HolidaysAgo),
            vec![0, 1, 2, 0, 16, 17, 6]
        );
    }

    #[test]
    fn contiguous_calendar_is_zero_inside_block_and_positive_outside() {
        let calculator =
            Holidays::from_source(&holiday_source(), "%Y-%m-%d", Some("A")).expect("holidays");
        let table = DateRangeGenerator::default()
            .generate("2017-09-01", "2017-09-05")
            .expect("calendar");
        let table = calculator.apply(table).expect("apply");

        let days_in = column_i64(&table, CalendarCol::HolidaysIn);
        let days_ago = column_i64(&table, CalendarCol::HolidaysAgo);
        // 2017-09-01 .. 2017-09-03 are holidays
        assert_eq!(&days_in[..3], &[0, 0, 0]);
        assert_eq!(&days_ago[..3], &[0, 0, 0]);
        assert_eq!((days_in[3], days_ago[3]), (47, 1));
        assert_eq!((days_in[4], days_ago[4]), (46, 2));
    }

    #[test]
    fn identical_rows_across_zones_collapse() {
        let result = Holidays::from_source(&holiday_source(), "%Y-%m-%d", None);
        assert!(result.is_ok());
    }
}
