//! Read interface over the external reference and raw data.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};

use polars::prelude::{
    DataFrame, IntoLazy, LazyCsvReader, LazyFileListReader, LazyFrame, PlPath, col,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    error::{DataError, ForecastResult, IoError},
    polars_ext::{DataFrameExt, LazyFrameExt, polars_to_forecast_error},
};

const SPECIAL_DISHES_FILE: &str = "calculators/special_dishes.json";
const MENU_PREFIX: &str = "menus_";

// ================================================================================================
// Datasets
// ================================================================================================

/// Tabular inputs of a run and their on-disk layout.
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
pub enum Dataset {
    Holidays,
    NonWorkingDays,
    SchoolYears,
    Strikes,
    Menus,
    Canteens,
    Attendance,
    Enrollment,
    SchoolCanteenMapping,
    SiteCanteenMapping,
}

impl Dataset {
    /// Path relative to the data directory; menus are spread over `menus_*.csv` files.
    pub fn relative_path(&self) -> &'static str {
        match self {
            Self::Holidays => "calculators/holidays.csv",
            Self::NonWorkingDays => "calculators/non_working_days.csv",
            Self::SchoolYears => "calculators/school_years.csv",
            Self::Strikes => "calculators/strikes.csv",
            Self::Menus => "raw/menus_*.csv",
            Self::Canteens => "raw/canteens.csv",
            Self::Attendance => "raw/attendance.csv",
            Self::Enrollment => "raw/enrollment.csv",
            Self::SchoolCanteenMapping => "mappings/school_canteen.csv",
            Self::SiteCanteenMapping => "mappings/site_canteen.csv",
        }
    }

    /// Columns every source must provide for this dataset.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::Holidays => &["label", "start", "end", "zone"],
            Self::NonWorkingDays => &["date", "label"],
            Self::SchoolYears => &["label", "start", "end"],
            Self::Strikes => &["date", "flag"],
            Self::Menus => &["date", "dish"],
            Self::Canteens => &["name", "type", "sector"],
            Self::Attendance => &["date", "site_name", "site_type", "forecast", "actual"],
            Self::Enrollment => &["school", "school_year", "headcount"],
            Self::SchoolCanteenMapping => &["school", "canteen_name", "canteen_type"],
            Self::SiteCanteenMapping => &["site_name", "site_type", "canteen_name", "canteen_type"],
        }
    }
}

/// Special-dish category mapped to the keywords that reveal it in a dish name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecialDishes(BTreeMap<String, Vec<String>>);

impl SpecialDishes {
    pub fn new(categories: BTreeMap<String, Vec<String>>) -> Self {
        Self(categories)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ================================================================================================
// Source trait
// ================================================================================================

/// Read-only access to the inputs of a run.
pub trait DataSource {
    /// Lazily scans a dataset.
    fn scan(&self, dataset: Dataset) -> ForecastResult<LazyFrame>;

    fn special_dishes(&self) -> ForecastResult<SpecialDishes>;

    /// Collects a dataset and keeps its declared columns, in declared order.
    fn load(&self, dataset: Dataset) -> ForecastResult<DataFrame> {
        let df = self
            .scan(dataset)?
            .collect_with(&format!("reading dataset {dataset}"))?;

        let table = dataset.to_string();
        for column in dataset.columns() {
            df.require_column(column, &table)?;
        }
        df.select(dataset.columns().iter().copied())
            .map_err(|e| polars_to_forecast_error(&format!("selecting columns of {dataset}"), e))
    }
}

// ================================================================================================
// Data directory
// ================================================================================================

/// CSV/JSON files under one root directory.
///
/// Every CSV column is read as a string; loaders cast what they need.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative paths of the inputs that are absent, checked before any computation.
    pub fn missing_inputs(&self) -> Vec<String> {
        let mut missing = Dataset::iter()
            .filter(|dataset| !self.exists(*dataset))
            .map(|dataset| dataset.relative_path().to_string())
            .collect::<Vec<_>>();
        if !self.root.join(SPECIAL_DISHES_FILE).is_file() {
            missing.push(SPECIAL_DISHES_FILE.to_string());
        }
        missing
    }

    fn exists(&self, dataset: Dataset) -> bool {
        match dataset {
            Dataset::Menus => !self.menu_files().is_empty(),
            other => self.root.join(other.relative_path()).is_file(),
        }
    }

    fn menu_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(self.root.join("raw")) else {
            return Vec::new();
        };
        let mut files = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(MENU_PREFIX) && name.ends_with(".csv"))
            })
            .collect::<Vec<_>>();
        files.sort();
        files
    }

    fn scan_csv(path: &Path) -> ForecastResult<LazyFrame> {
        let uri = path.to_str().ok_or_else(|| {
            IoError::FileSystem(format!(
                "Path contains invalid UTF-8 characters: {}",
                path.display()
            ))
        })?;
        LazyCsvReader::new(PlPath::new(uri))
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .finish()
            .map_err(|e| {
                IoError::ReadFailed(format!("Failed to scan '{}': {e}", path.display())).into()
            })
    }
}

impl DataSource for DataDir {
    #[tracing::instrument(skip(self), fields(root = %self.root.display()))]
    fn scan(&self, dataset: Dataset) -> ForecastResult<LazyFrame> {
        if !self.exists(dataset) {
            return Err(DataError::MissingDataset(format!(
                "{} under {}",
                dataset.relative_path(),
                self.root.display()
            ))
            .into());
        }

        match dataset {
            Dataset::Menus => {
                let frames = self
                    .menu_files()
                    .iter()
                    .map(|path| {
                        Ok(Self::scan_csv(path)?
                            .select(dataset.columns().iter().map(|c| col(*c)).collect::<Vec<_>>()))
                    })
                    .collect::<ForecastResult<Vec<_>>>()?;
                polars::prelude::concat(frames, Default::default())
                    .map_err(|e| polars_to_forecast_error("concatenating menu files", e))
            }
            other => Self::scan_csv(&self.root.join(other.relative_path())),
        }
    }

    fn special_dishes(&self) -> ForecastResult<SpecialDishes> {
        let path = self.root.join(SPECIAL_DISHES_FILE);
        let raw = fs::read_to_string(&path).map_err(|e| {
            IoError::ReadFailed(format!("Failed to read '{}': {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&raw).map_err(IoError::Json)?)
    }
}

// ================================================================================================
// In-memory source
// ================================================================================================

/// Frames held in memory, for tests and callers that already hold their data.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    frames: HashMap<Dataset, DataFrame>,
    special_dishes: SpecialDishes,
}

impl MemorySource {
    pub fn with_dataset(mut self, dataset: Dataset, df: DataFrame) -> Self {
        self.frames.insert(dataset, df);
        self
    }

    pub fn with_special_dishes(self, special_dishes: SpecialDishes) -> Self {
        Self {
            special_dishes,
            ..self
        }
    }
}

impl DataSource for MemorySource {
    fn scan(&self, dataset: Dataset) -> ForecastResult<LazyFrame> {
        self.frames
            .get(&dataset)
            .map(|df| df.clone().lazy())
            .ok_or_else(|| DataError::MissingDataset(dataset.to_string()).into())
    }

    fn special_dishes(&self) -> ForecastResult<SpecialDishes> {
        Ok(self.special_dishes.clone())
    }
}
