use std::collections::BTreeMap;

use chrono::NaiveDate;
use itertools::izip;
use polars::prelude::{Column, NamedFrom, Series};

use crate::{
    calendar::{CalendarCol, CalendarTable, Calculator, interval::interval_features},
    error::{DataError, ForecastResult},
    polars_ext::{DataFrameExt, parse_date},
    source::{DataSource, Dataset},
};

/// Label of regular working days.
pub const WORKING_DAY: &str = "jour_ouvre";

/// Public-holiday label and countdowns to the neighbouring non-working days.
///
/// Adds `non_working_name`, `non_working_in` and `non_working_ago`. Reference rows are
/// single days, so the lookup is an equality join on the date.
#[derive(Debug, Clone, Default)]
pub struct NonWorkingDays {
    days: BTreeMap<NaiveDate, String>,
}

impl NonWorkingDays {
    /// Builds the lookup from `(date, label)` rows; repeated rows collapse, conflicting labels fail.
    pub fn new(rows: impl IntoIterator<Item = (NaiveDate, String)>) -> ForecastResult<Self> {
        let mut days: BTreeMap<NaiveDate, String> = BTreeMap::new();
        for (date, label) in rows {
            match days.get(&date) {
                Some(existing) if *existing != label => {
                    return Err(DataError::ConflictingLabels {
                        date: date.to_string(),
                        first: existing.clone(),
                        second: label,
                    }
                    .into());
                }
                Some(_) => {}
                None => {
                    days.insert(date, label);
                }
            }
        }
        Ok(Self { days })
    }

    pub fn from_source(source: &dyn DataSource, date_format: &str) -> ForecastResult<Self> {
        let df = source.load(Dataset::NonWorkingDays)?;
        let dates = df.string_values("date", "non working days")?;
        let labels = df.string_values("label", "non working days")?;

        let rows = izip!(dates, labels)
            .map(|(date, label)| match (date, label) {
                (Some(date), Some(label)) => Ok((parse_date(&date, date_format)?, label)),
                _ => Err(DataError::DataFrame("non working days has an incomplete row".into()).into()),
            })
            .collect::<ForecastResult<Vec<_>>>()?;
        Self::new(rows)
    }

    pub fn label_for(&self, date: NaiveDate) -> Option<&str> {
        self.days.get(&date).map(String::as_str)
    }
}

impl Calculator for NonWorkingDays {
    fn name(&self) -> &'static str {
        "non_working_days"
    }

    #[tracing::instrument(skip_all, fields(rows = table.height()))]
    fn apply(&self, table: CalendarTable) -> ForecastResult<CalendarTable> {
        let dates = table.dates()?;
        let features = interval_features(&dates, |d| self.label_for(d), WORKING_DAY);

        table.with_columns(vec![
            Column::from(Series::new(CalendarCol::NonWorkingIn.name(), features.days_in)),
            Column::from(Series::new(CalendarCol::NonWorkingAgo.name(), features.days_ago)),
            Column::from(Series::new(CalendarCol::NonWorkingName.name(), features.labels)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use polars::prelude::df;

    use super::*;
    use crate::{error::ForecastError, source::MemorySource, table::Table};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn countdowns_to_single_public_holidays() {
        let reference = df![
            "date" => ["2017-11-01", "2019-05-01", "2019-05-08", "2019-05-08"],
            "label" => ["Toussaint", "Fete du travail", "Victoire des allies", "Victoire des allies"],
        ]
        .expect("non working frame");
        let source = MemorySource::default().with_dataset(Dataset::NonWorkingDays, reference);
        let calculator = NonWorkingDays::from_source(&source, "%Y-%m-%d").expect("lookup");

        let dates = [ymd(2017, 9, 4), ymd(2019, 5, 7), ymd(2019, 5, 8), ymd(2019, 5, 10)];
        let table = CalendarTable::from_dates(&dates, "%Y-%m-%d").expect("calendar");
        let table = calculator.apply(table).expect("apply");
        let df = table.as_df();

        let labels = df
            .string_values(CalendarCol::NonWorkingName.as_str(), "calendar")
            .expect("labels")
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        assert_eq!(
            labels,
            vec!["jour_ouvre", "jour_ouvre", "Victoire des allies", "jour_ouvre"]
        );

        let days_in = df
            .column(CalendarCol::NonWorkingIn.as_str())
            .expect("in")
            .i64()
            .expect("i64")
            .into_no_null_iter()
            .collect::<Vec<_>>();
        let days_ago = df
            .column(CalendarCol::NonWorkingAgo.as_str())
            .expect("ago")
            .i64()
            .expect("i64")
            .into_no_null_iter()
            .collect::<Vec<_>>();
        // 2017-09-04 is 58 days before Toussaint and no earlier day is known
        assert_eq!(days_in, vec![58, 1, 0, 0]);
        assert_eq!(days_ago, vec![0, 6, 0, 2]);
    }

    #[test]
    fn conflicting_labels_fail() {
        let result = NonWorkingDays::new(vec![
            (ymd(2019, 5, 8), "Victoire des allies".to_string()),
            (ymd(2019, 5, 8), "Armistice".to_string()),
        ]);
        assert!(matches!(
            result,
            Err(ForecastError::Data(DataError::ConflictingLabels { .. }))
        ));
    }
}
