use std::collections::BTreeMap;

use chrono::NaiveDate;
use itertools::izip;
use polars::prelude::{Column, NamedFrom, Series};

use crate::{
    calendar::{CalendarCol, CalendarTable, Calculator},
    error::{DataError, ForecastResult},
    polars_ext::{DataFrameExt, parse_date},
    source::{DataSource, Dataset},
};

/// Strike indicator of each day, 0 for days absent from the reference.
#[derive(Debug, Clone, Default)]
pub struct Strikes {
    flags: BTreeMap<NaiveDate, i64>,
}

impl Strikes {
    pub fn new(rows: impl IntoIterator<Item = (NaiveDate, i64)>) -> ForecastResult<Self> {
        let mut flags = BTreeMap::new();
        for (date, flag) in rows {
            if let Some(existing) = flags.insert(date, flag)
                && existing != flag
            {
                return Err(DataError::ConflictingLabels {
                    date: date.to_string(),
                    first: existing.to_string(),
                    second: flag.to_string(),
                }
                .into());
            }
        }
        Ok(Self { flags })
    }

    pub fn from_source(source: &dyn DataSource, date_format: &str) -> ForecastResult<Self> {
        let df = source.load(Dataset::Strikes)?;
        let dates = df.string_values("date", "strikes")?;
        let flags = df.f64_values("flag", "strikes")?;

        let rows = izip!(dates, &flags)
            .map(|(date, flag)| match (date, flag) {
                (Some(date), Some(flag)) => Ok((parse_date(&date, date_format)?, flag.round() as i64)),
                _ => Err(DataError::DataFrame("strikes has an incomplete row".into()).into()),
            })
            .collect::<ForecastResult<Vec<_>>>()?;
        Self::new(rows)
    }
}

impl Calculator for Strikes {
    fn name(&self) -> &'static str {
        "strikes"
    }

    #[tracing::instrument(skip_all, fields(rows = table.height()))]
    fn apply(&self, table: CalendarTable) -> ForecastResult<CalendarTable> {
        let flags = table
            .dates()?
            .iter()
            .map(|d| self.flags.get(d).copied().unwrap_or(0))
            .collect::<Vec<_>>();

        table.with_columns(vec![Column::from(Series::new(CalendarCol::Strike.name(), flags))])
    }
}
