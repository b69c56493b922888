//! The (canteen, day) modeling table and the stages that build and slice it.

pub mod entities;
pub mod join;
pub mod split;
pub mod statistics;

use std::{collections::BTreeMap, path::Path};

use itertools::izip;
use polars::prelude::{
    DataFrame, DataType, LazyCsvReader, LazyFileListReader, PlPath, PlSmallStr, col,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    calendar::CalendarCol,
    error::{ForecastResult, IoError},
    polars_ext::{DataFrameExt, LazyFrameExt},
    table::{Table, TableName},
};

const TABLE: &str = "modeling table";

/// Columns the modeling stages add on top of the calendar columns.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    PartialOrd,
    Ord,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ModelingCol {
    // === Entity ===
    CanteenName,
    CanteenType,
    Sector,

    // === Observations ===
    /// Attendance announced ahead of the day.
    Forecast,
    /// Meals actually served.
    Actual,
    /// Pupils enrolled for the school year.
    Headcount,

    // === Seasonal baseline ===
    ForecastRatio,
    ActualRatio,

    // === Outliers ===
    OutlierMean,
    OutlierStd,
    LowerBound,
    UpperBound,
    UpperOutlier,
    LowerOutlier,

    // === Categorical codes ===
    SiteId,
    SiteTypeCat,
    SectorCat,

    // === Predictions ===
    Output,
    PredLowerBound,
    PredUpperBound,
}

impl From<ModelingCol> for PlSmallStr {
    fn from(value: ModelingCol) -> Self {
        value.as_str().into()
    }
}

impl ModelingCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Entity key of every modeling row.
pub(crate) const ENTITY_KEY: [ModelingCol; 2] = [ModelingCol::CanteenName, ModelingCol::CanteenType];

// ================================================================================================
// Modeling Table
// ================================================================================================

/// One row per (day, canteen), addressed on disk by its `(start, end)` date range.
#[derive(Debug, Clone)]
pub struct ModelingTable {
    df: DataFrame,
    start: String,
    end: String,
}

impl Table for ModelingTable {
    fn as_df(&self) -> &DataFrame {
        &self.df
    }
}

impl TableName for ModelingTable {
    fn base_name(&self) -> String {
        format!("prepared_data_{}_{}", self.start, self.end)
    }
}

impl ModelingTable {
    pub fn new(df: DataFrame, start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            df,
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn end(&self) -> &str {
        &self.end
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn into_df(self) -> DataFrame {
        self.df
    }

    /// Reads back the table persisted for `(start, end)` under `dir`.
    pub fn read_csv(dir: impl AsRef<Path>, start: &str, end: &str) -> ForecastResult<Self> {
        let path = dir
            .as_ref()
            .join(format!("prepared_data_{start}_{end}.csv"));
        if !path.exists() {
            return Err(IoError::ReadFailed(format!(
                "no modeling table for {start}..{end} at {}",
                path.display()
            ))
            .into());
        }
        let uri = path.to_str().ok_or_else(|| {
            IoError::ReadFailed(format!("non UTF-8 path {}", path.display()))
        })?;

        let df = LazyCsvReader::new(PlPath::new(uri))
            .with_has_header(true)
            .with_infer_schema_length(Some(10_000))
            .with_try_parse_dates(true)
            .finish()
            .map_err(|e| IoError::ReadFailed(format!("{}: {e}", path.display())))?;

        // Keys are compared lexically, keep them textual whatever the inference decided.
        let df = df
            .with_columns([
                col(CalendarCol::DateStr).cast(DataType::String),
                col(CalendarCol::SchoolYear).cast(DataType::String),
                col(ModelingCol::CanteenName).cast(DataType::String),
                col(ModelingCol::CanteenType).cast(DataType::String),
            ])
            .collect_with("reading the modeling table")?;

        Ok(Self::new(df, start, end))
    }

    /// Row count of every (canteen_name, canteen_type) pair.
    pub fn canteen_row_counts(&self) -> ForecastResult<BTreeMap<(String, String), usize>> {
        let names = self
            .df
            .string_values(ModelingCol::CanteenName.as_str(), TABLE)?;
        let types = self
            .df
            .string_values(ModelingCol::CanteenType.as_str(), TABLE)?;

        let mut counts = BTreeMap::new();
        for (name, kind) in izip!(names, types) {
            *counts
                .entry((name.unwrap_or_default(), kind.unwrap_or_default()))
                .or_insert(0) += 1;
        }
        Ok(counts)
    }
}
