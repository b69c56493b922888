use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use polars::prelude::{Column, NamedFrom, Series};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use tracing::debug;

use crate::{
    calendar::{CalendarTable, Calculator, feasts},
    error::{DataError, ForecastResult},
};

/// Years generated on each side of the table's span.
const YEAR_PADDING: i32 = 2;

/// Recurring events whose proximity shifts attendance.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Event {
    /// January 6th.
    Epiphany,
    /// February 2nd.
    Candlemas,
    /// 47 days before Easter Sunday.
    MardiGras,
    /// October 31st.
    Halloween,
    /// First day of the first lunar month.
    ChineseNewYear,
    /// 30 days after the start of Ramadan.
    Eid,
    /// First day of the 9th month of the Islamic year running on January 1st.
    Ramadan,
}

/// Output columns of one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventColumns {
    /// Days until the next occurrence, 0 on the day itself.
    pub days_in: &'static str,
    /// Days since the previous occurrence, 0 on the day itself.
    pub days_ago: &'static str,
}

impl Event {
    pub fn columns(&self) -> EventColumns {
        let (days_in, days_ago) = match self {
            Self::Epiphany => ("epiphany_in", "epiphany_ago"),
            Self::Candlemas => ("candlemas_in", "candlemas_ago"),
            Self::MardiGras => ("mardi_gras_in", "mardi_gras_ago"),
            Self::Halloween => ("halloween_in", "halloween_ago"),
            Self::ChineseNewYear => ("chinese_new_year_in", "chinese_new_year_ago"),
            Self::Eid => ("eid_in", "eid_ago"),
            Self::Ramadan => ("ramadan_in", "ramadan_ago"),
        };
        EventColumns { days_in, days_ago }
    }

    /// Concrete date of the event in `year`.
    pub fn occurrence(&self, year: i32) -> ForecastResult<NaiveDate> {
        let fixed = |month: u32, day: u32| -> ForecastResult<NaiveDate> {
            NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
                DataError::UnsupportedYear {
                    event: self.to_string(),
                    year,
                    supported: format!("{}..={}", NaiveDate::MIN.year(), NaiveDate::MAX.year()),
                }
                .into()
            })
        };
        match self {
            Self::Epiphany => fixed(1, 6),
            Self::Candlemas => fixed(2, 2),
            Self::MardiGras => Ok(feasts::easter(year)? - Duration::days(47)),
            Self::Halloween => fixed(10, 31),
            Self::ChineseNewYear => feasts::chinese_new_year(year),
            Self::Eid => feasts::eid(year),
            Self::Ramadan => feasts::ramadan_start(year),
        }
    }
}

/// Occurrence dates per event, sorted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventOccurrences {
    by_event: BTreeMap<Event, Vec<NaiveDate>>,
}

impl EventOccurrences {
    pub fn dates(&self, event: Event) -> &[NaiveDate] {
        self.by_event.get(&event).map_or(&[], Vec::as_slice)
    }
}

/// One occurrence per event and per year.
pub fn compute_event_dates(years: impl IntoIterator<Item = i32>) -> ForecastResult<EventOccurrences> {
    let years = years.into_iter().collect::<Vec<_>>();
    let mut by_event = BTreeMap::new();
    for event in Event::iter() {
        let mut dates = years
            .iter()
            .map(|year| event.occurrence(*year))
            .collect::<ForecastResult<Vec<_>>>()?;
        dates.sort();
        by_event.insert(event, dates);
    }
    Ok(EventOccurrences { by_event })
}

/// Smallest non-negative number of days from `date` to an occurrence.
pub fn days_until(date: NaiveDate, occurrences: &[NaiveDate]) -> Option<i64> {
    occurrences
        .iter()
        .map(|o| (*o - date).num_days())
        .filter(|d| *d >= 0)
        .min()
}

/// Smallest non-negative number of days from an occurrence to `date`.
pub fn days_since(date: NaiveDate, occurrences: &[NaiveDate]) -> Option<i64> {
    occurrences
        .iter()
        .map(|o| (date - *o).num_days())
        .filter(|d| *d >= 0)
        .min()
}

/// Adds `<event>_in` and `<event>_ago` for every [`Event`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EventsCountdown;

impl Calculator for EventsCountdown {
    fn name(&self) -> &'static str {
        "events_countdown"
    }

    #[tracing::instrument(skip_all, fields(rows = table.height()))]
    fn apply(&self, table: CalendarTable) -> ForecastResult<CalendarTable> {
        let dates = table.dates()?;
        let (Some(first), Some(last)) = (dates.iter().min(), dates.iter().max()) else {
            return Ok(table);
        };
        let years = (first.year() - YEAR_PADDING)..=(last.year() + YEAR_PADDING);
        debug!(?years, "Computing event occurrences");
        let occurrences = compute_event_dates(years)?;

        let mut columns = Vec::new();
        for event in Event::iter() {
            let names = event.columns();
            let known = occurrences.dates(event);
            let countdown = |direction: &str, f: fn(NaiveDate, &[NaiveDate]) -> Option<i64>| {
                dates
                    .iter()
                    .map(|d| {
                        f(*d, known).ok_or_else(|| {
                            DataError::NoOccurrence {
                                event: event.to_string(),
                                date: d.to_string(),
                                direction: direction.to_string(),
                            }
                            .into()
                        })
                    })
                    .collect::<ForecastResult<Vec<_>>>()
            };
            columns.push(Column::from(Series::new(
                names.days_in.into(),
                countdown("next", days_until)?,
            )));
            columns.push(Column::from(Series::new(
                names.days_ago.into(),
                countdown("previous", days_since)?,
            )));
        }

        table.with_columns(columns)
    }
}
