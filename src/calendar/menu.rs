use std::collections::HashMap;

use chrono::NaiveDate;
use itertools::izip;
use polars::prelude::{Column, DataFrame, IntoLazy, NamedFrom, Series, col, lit};
use regex::Regex;

use crate::{
    calendar::{CalendarCol, CalendarTable, Calculator},
    error::{DataError, ForecastResult},
    polars_ext::{DataFrameExt, LazyFrameExt, parse_date, polars_to_forecast_error},
    source::{DataSource, Dataset, SpecialDishes},
    table::Table,
};

const STOP_WORDS: [&str; 12] = [
    "le", "la", "l", "aux", "au", "d", "des", "du", "à", "un", "une", "avec",
];

/// One dish served on one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuRecord {
    pub date: NaiveDate,
    pub dish: String,
}

impl MenuRecord {
    pub fn new(date: NaiveDate, dish: impl Into<String>) -> Self {
        Self {
            date,
            dish: dish.into(),
        }
    }
}

/// Reads raw menu records, parsing their dates with `menu_date_format`.
pub fn load_menus(source: &dyn DataSource, menu_date_format: &str) -> ForecastResult<Vec<MenuRecord>> {
    let df = source.load(Dataset::Menus)?;
    let dates = df.string_values("date", "menus")?;
    let dishes = df.string_values("dish", "menus")?;

    izip!(dates, dishes)
        .map(|(date, dish)| {
            let date = date.ok_or_else(|| DataError::DataFrame("menu row without date".into()))?;
            Ok(MenuRecord::new(
                parse_date(&date, menu_date_format)?,
                dish.unwrap_or_default(),
            ))
        })
        .collect()
}

/// Per-day special-dish indicators and a `has_menu` flag.
///
/// A category is 1 on a day when any dish of that day contains any of its keywords,
/// compared case-insensitively. Days without a menu record get 0 everywhere.
#[derive(Debug, Clone)]
pub struct SpecialMeals {
    dishes: SpecialDishes,
    menus: Vec<MenuRecord>,
}

impl SpecialMeals {
    pub fn new(dishes: SpecialDishes, menus: Vec<MenuRecord>) -> Self {
        Self { dishes, menus }
    }

    pub fn from_source(source: &dyn DataSource, menu_date_format: &str) -> ForecastResult<Self> {
        Ok(Self::new(
            source.special_dishes()?,
            load_menus(source, menu_date_format)?,
        ))
    }

    fn matches(dish: &str, keywords: &[String]) -> bool {
        let dish = dish.to_lowercase();
        keywords.iter().any(|k| dish.contains(&k.to_lowercase()))
    }

    /// One row per menu record, keyed by the calendar's date string.
    fn record_features(&self, date_format: &str) -> ForecastResult<DataFrame> {
        let mut columns = vec![
            Column::from(Series::new(
                CalendarCol::DateStr.name(),
                self.menus
                    .iter()
                    .map(|m| m.date.format(date_format).to_string())
                    .collect::<Vec<_>>(),
            )),
            Column::from(Series::new(
                CalendarCol::HasMenu.name(),
                self.menus
                    .iter()
                    .map(|m| i64::from(!m.dish.trim().is_empty()))
                    .collect::<Vec<_>>(),
            )),
        ];
        for (category, keywords) in self.dishes.iter() {
            let flags = self
                .menus
                .iter()
                .map(|m| i64::from(Self::matches(&m.dish, keywords)))
                .collect::<Vec<_>>();
            columns.push(Column::from(Series::new(category.into(), flags)));
        }
        DataFrame::new(columns).map_err(|e| polars_to_forecast_error("building menu features", e))
    }
}

impl Calculator for SpecialMeals {
    fn name(&self) -> &'static str {
        "special_meals"
    }

    #[tracing::instrument(skip_all, fields(rows = table.height(), menus = self.menus.len()))]
    fn apply(&self, table: CalendarTable) -> ForecastResult<CalendarTable> {
        let existing = table.as_df().column_names_owned();
        let clashes = self
            .dishes
            .categories()
            .chain([CalendarCol::HasMenu.as_str()])
            .filter(|c| existing.iter().any(|e| e == c))
            .map(str::to_string)
            .collect::<Vec<_>>();
        if !clashes.is_empty() {
            return Err(DataError::OverlappingColumns(clashes).into());
        }

        let indicators = self
            .dishes
            .categories()
            .chain([CalendarCol::HasMenu.as_str()])
            .collect::<Vec<_>>();

        let per_day = self
            .record_features(table.date_format())?
            .lazy()
            .group_by_stable([col(CalendarCol::DateStr)])
            .agg(indicators.iter().map(|c| col(*c).max()).collect::<Vec<_>>());

        let df = table
            .as_df()
            .clone()
            .lazy()
            .left_join_in_order(per_day, vec![col(CalendarCol::DateStr)])
            .with_columns(
                indicators
                    .iter()
                    .map(|c| col(*c).fill_null(lit(0_i64)).alias(*c))
                    .collect::<Vec<_>>(),
            )
            .collect_with("joining menu features")?;

        Ok(table.replace_df(df))
    }
}

/// Word frequencies over every dish, least frequent first.
///
/// Dishes are lower-cased, stripped of brackets and dots, then split on `+`, whitespace,
/// `/` and `'`. French stop words are dropped.
pub fn meals_composition(menus: &[MenuRecord]) -> ForecastResult<Vec<(String, usize)>> {
    let special = Regex::new(r"[\(\[\)\]\{\}\.]+")
        .map_err(|e| DataError::DataFrame(format!("invalid menu pattern: {e}")))?;
    let separators = Regex::new(r"\+|\s|/|'")
        .map_err(|e| DataError::DataFrame(format!("invalid menu pattern: {e}")))?;

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<(String, usize)> = Vec::new();
    for menu in menus {
        let cleaned = special.replace_all(&menu.dish.to_lowercase(), "").into_owned();
        for word in separators.split(&cleaned).filter(|w| !w.is_empty()) {
            match index.get(word) {
                Some(i) => counts[*i].1 += 1,
                None => {
                    index.insert(word.to_string(), counts.len());
                    counts.push((word.to_string(), 1));
                }
            }
        }
    }

    counts.retain(|(word, _)| !STOP_WORDS.contains(&word.as_str()));
    counts.sort_by_key(|(_, count)| *count);
    Ok(counts)
}
