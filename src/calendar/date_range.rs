use chrono::{Duration, NaiveDate};
use tracing::debug;

use crate::{
    calendar::CalendarTable,
    config::check_format,
    error::{DateError, ForecastResult},
    polars_ext::parse_date,
};

/// Produces the calendar-index table of a run.
#[derive(Debug, Clone)]
pub struct DateRangeGenerator {
    date_format: String,
    lookahead_weeks: u32,
}

impl Default for DateRangeGenerator {
    fn default() -> Self {
        Self {
            date_format: "%Y-%m-%d".to_string(),
            lookahead_weeks: 10,
        }
    }
}

impl DateRangeGenerator {
    pub fn new(date_format: impl Into<String>, lookahead_weeks: u32) -> Self {
        Self {
            date_format: date_format.into(),
            lookahead_weeks,
        }
    }

    /// Last day covered for a requested `end`.
    pub fn buffered_end(&self, end: NaiveDate) -> NaiveDate {
        end + Duration::weeks(i64::from(self.lookahead_weeks))
    }

    /// One row per day from `start` to `end` plus the lookahead buffer, both inclusive.
    ///
    /// # Errors
    /// - [`DateError::Format`] if the configured format is not a strftime pattern.
    /// - [`DateError::InvalidDate`] if `start` or `end` does not parse.
    /// - [`DateError::InconsistentDates`] if `start` is after `end`.
    #[tracing::instrument(skip(self), fields(format = %self.date_format))]
    pub fn generate(&self, start: &str, end: &str) -> ForecastResult<CalendarTable> {
        check_format(&self.date_format)?;
        let first = parse_date(start, &self.date_format)?;
        let last = parse_date(end, &self.date_format)?;
        if first > last {
            return Err(DateError::InconsistentDates(format!(
                "start {start} is after end {end}"
            ))
            .into());
        }

        let buffered = self.buffered_end(last);
        let dates = first
            .iter_days()
            .take_while(|d| *d <= buffered)
            .collect::<Vec<_>>();
        debug!(rows = dates.len(), %buffered, "Generated calendar index");

        CalendarTable::from_dates(&dates, &self.date_format)
    }
}
