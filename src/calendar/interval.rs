use chrono::NaiveDate;
use itertools::{Itertools, izip};
use polars::prelude::DataFrame;

use crate::{
    error::{DataError, DateError, ForecastResult},
    polars_ext::{DataFrameExt, parse_date},
};

/// A labeled, inclusive range of days.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabeledInterval {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub label: String,
}

impl LabeledInterval {
    pub fn new(label: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            label: label.into(),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    fn describe(&self) -> String {
        format!("'{}' [{}, {}]", self.label, self.start, self.end)
    }
}

/// De-duplicated, pairwise disjoint intervals sorted by start date.
#[derive(Debug, Clone, Default)]
pub struct IntervalSet {
    intervals: Vec<LabeledInterval>,
}

impl IntervalSet {
    /// Builds the set from raw reference rows.
    ///
    /// Exact duplicates collapse into one interval. Intervals that still share a day
    /// afterwards are rejected with [`DataError::OverlappingIntervals`].
    pub fn new(raw: impl IntoIterator<Item = LabeledInterval>) -> ForecastResult<Self> {
        let intervals = raw.into_iter().sorted().dedup().collect::<Vec<_>>();

        if let Some(bad) = intervals.iter().find(|i| i.start > i.end) {
            return Err(DateError::InconsistentDates(format!(
                "interval {} ends before it starts",
                bad.describe()
            ))
            .into());
        }

        if let Some((first, second)) = intervals
            .iter()
            .tuple_windows()
            .find(|(a, b)| b.start <= a.end)
        {
            return Err(DataError::OverlappingIntervals {
                first: first.describe(),
                second: second.describe(),
            }
            .into());
        }

        Ok(Self { intervals })
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Label of the interval containing `date`, if any.
    pub fn label_for(&self, date: NaiveDate) -> Option<&str> {
        let idx = self.intervals.partition_point(|i| i.start <= date);
        idx.checked_sub(1)
            .map(|i| &self.intervals[i])
            .filter(|i| i.contains(date))
            .map(|i| i.label.as_str())
    }
}

/// Reads `{label, start, end}` rows, keeping only rows whose `zone` matches when a zone is given.
pub(crate) fn intervals_from_frame(
    df: &DataFrame,
    table: &str,
    date_format: &str,
    zone: Option<&str>,
) -> ForecastResult<Vec<LabeledInterval>> {
    let labels = df.string_values("label", table)?;
    let starts = df.string_values("start", table)?;
    let ends = df.string_values("end", table)?;
    let zones = match zone {
        Some(_) => df.string_values("zone", table)?,
        None => vec![None; df.height()],
    };

    izip!(labels, starts, ends, zones)
        .filter(|(_, _, _, row_zone)| zone.is_none() || row_zone.as_deref() == zone)
        .map(|(label, start, end, _)| {
            let (Some(label), Some(start), Some(end)) = (label, start, end) else {
                return Err(DataError::DataFrame(format!("{table} has an incomplete row")).into());
            };
            Ok(LabeledInterval::new(
                label,
                parse_date(&start, date_format)?,
                parse_date(&end, date_format)?,
            ))
        })
        .collect()
}

/// Every day between the first and last date of a table, gaps included.
///
/// Countdowns are measured on this grid so that sparse tables see the same
/// distances as a contiguous calendar.
#[derive(Debug, Clone)]
pub(crate) struct DayGrid {
    days: Vec<NaiveDate>,
}

impl DayGrid {
    pub fn spanning(dates: &[NaiveDate]) -> Self {
        let days = match (dates.iter().min(), dates.iter().max()) {
            (Some(first), Some(last)) => first.iter_days().take_while(|d| d <= last).collect(),
            _ => Vec::new(),
        };
        Self { days }
    }

    pub fn days(&self) -> &[NaiveDate] {
        &self.days
    }

    /// Position of `date` on the grid; `date` must lie within the spanned range.
    pub fn offset(&self, date: NaiveDate) -> usize {
        self.days
            .first()
            .map_or(0, |first| (date - *first).num_days() as usize)
    }
}

/// Days until the next run and since the previous run of `true` values.
///
/// A run is a maximal block of consecutive `true` entries; only its first day anchors
/// `in` and only its last day anchors `ago`. Both are 0 inside a run and when no run
/// exists in that direction.
pub(crate) fn run_countdowns(mask: &[bool]) -> (Vec<i64>, Vec<i64>) {
    let n = mask.len();
    let mut days_in = vec![0_i64; n];
    let mut days_ago = vec![0_i64; n];

    let mut last_run_end: Option<usize> = None;
    for x in 0..n {
        if mask[x] {
            if x + 1 == n || !mask[x + 1] {
                last_run_end = Some(x);
            }
            continue;
        }
        if let Some(end) = last_run_end {
            days_ago[x] = (x - end) as i64;
        }
    }

    let mut next_run_start: Option<usize> = None;
    for x in (0..n).rev() {
        if mask[x] {
            if x == 0 || !mask[x - 1] {
                next_run_start = Some(x);
            }
            continue;
        }
        if let Some(start) = next_run_start {
            days_in[x] = (start - x) as i64;
        }
    }

    (days_in, days_ago)
}

/// Per-row label and countdown columns of an interval join.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct IntervalFeatures {
    pub labels: Vec<String>,
    pub days_in: Vec<i64>,
    pub days_ago: Vec<i64>,
}

/// Joins `dates` against a label lookup and measures the distance to neighbouring runs.
pub(crate) fn interval_features<'a>(
    dates: &[NaiveDate],
    lookup: impl Fn(NaiveDate) -> Option<&'a str>,
    default_label: &str,
) -> IntervalFeatures {
    let grid = DayGrid::spanning(dates);
    let mask = grid
        .days()
        .iter()
        .map(|d| lookup(*d).is_some())
        .collect::<Vec<_>>();
    let (grid_in, grid_ago) = run_countdowns(&mask);

    let mut features = IntervalFeatures::default();
    for date in dates {
        let offset = grid.offset(*date);
        features
            .labels
            .push(lookup(*date).unwrap_or(default_label).to_string());
        features.days_in.push(grid_in[offset]);
        features.days_ago.push(grid_ago[offset]);
    }
    features
}
