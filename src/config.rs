use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    error::{DateError, ForecastResult, ModelError},
    modeling::ModelingCol,
};

// ================================================================================================
// Target
// ================================================================================================

/// Attendance column a model learns to predict.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Attendance announced by the school ahead of the day.
    Forecast,

    /// Meals actually served.
    #[default]
    Actual,
}

impl Target {
    /// Parses a column name, failing with [`ModelError::UnknownTarget`].
    pub fn parse(name: &str) -> ForecastResult<Self> {
        name.parse()
            .map_err(|_| ModelError::UnknownTarget(name.to_string()).into())
    }

    pub fn column(&self) -> ModelingCol {
        match self {
            Self::Forecast => ModelingCol::Forecast,
            Self::Actual => ModelingCol::Actual,
        }
    }

    /// Seasonal baseline ratio for this target.
    pub fn ratio_column(&self) -> ModelingCol {
        match self {
            Self::Forecast => ModelingCol::ForecastRatio,
            Self::Actual => ModelingCol::ActualRatio,
        }
    }
}

// ================================================================================================
// Filter Policy
// ================================================================================================

/// Row filters applied to the training window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPolicy {
    /// Drop rows of days without canteen activity.
    pub remove_no_school: bool,

    /// Drop outliers, strike days and rows without attendance signal.
    pub remove_outliers: bool,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            remove_no_school: true,
            remove_outliers: true,
        }
    }
}

// ================================================================================================
// Pipeline Configuration
// ================================================================================================

/// Parameters of one preprocessing run.
///
/// # Example
/// ```
/// # use canteen_forecast::prelude::*;
/// let config = PipelineConfig::default()
///     .with_include_wednesday(true)
///     .with_canteens(vec!["Jules Verne".to_string()]);
/// assert_eq!(config.lookahead_weeks, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// strftime pattern of every date string in the calendar and reference data.
    pub date_format: String,

    /// strftime pattern of the raw menu records.
    pub menu_date_format: String,

    /// Weeks appended after the requested end date so countdowns can see upcoming events.
    pub lookahead_weeks: u32,

    /// Treat Wednesdays as regular working days.
    pub include_wednesday: bool,

    /// Allow-list of canteen names.
    ///
    /// - `None`: every canteen of the reference table is modeled.
    /// - `Some(names)`: only the listed canteens are kept.
    pub canteens: Option<Vec<String>>,

    /// Holiday zone to keep from the holiday reference, every zone when `None`.
    pub holiday_zone: Option<String>,

    /// Column checked for outliers.
    pub outlier_column: Target,

    /// Width of the outlier band, in standard deviations.
    pub outlier_sigma: f64,

    /// School years whose enrollment is not trusted for ratio baselines.
    pub excluded_school_years: Vec<String>,

    /// Weeks between the last training date and the first predicted date.
    pub weeks_latency: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            date_format: "%Y-%m-%d".to_string(),
            menu_date_format: "%d/%m/%Y".to_string(),
            lookahead_weeks: 10,
            include_wednesday: false,
            canteens: None,
            holiday_zone: None,
            outlier_column: Target::Actual,
            outlier_sigma: 3.0,
            excluded_school_years: vec!["2018-2019".to_string(), "2019-2020".to_string()],
            weeks_latency: 1,
        }
    }
}

impl PipelineConfig {
    pub fn with_date_format(self, date_format: impl Into<String>) -> Self {
        Self {
            date_format: date_format.into(),
            ..self
        }
    }

    pub fn with_menu_date_format(self, menu_date_format: impl Into<String>) -> Self {
        Self {
            menu_date_format: menu_date_format.into(),
            ..self
        }
    }

    pub fn with_lookahead_weeks(self, lookahead_weeks: u32) -> Self {
        Self {
            lookahead_weeks,
            ..self
        }
    }

    pub fn with_include_wednesday(self, include_wednesday: bool) -> Self {
        Self {
            include_wednesday,
            ..self
        }
    }

    pub fn with_canteens(self, canteens: Vec<String>) -> Self {
        Self {
            canteens: Some(canteens),
            ..self
        }
    }

    pub fn with_holiday_zone(self, zone: impl Into<String>) -> Self {
        Self {
            holiday_zone: Some(zone.into()),
            ..self
        }
    }

    pub fn with_outliers(self, column: Target, sigma: f64) -> Self {
        Self {
            outlier_column: column,
            outlier_sigma: sigma,
            ..self
        }
    }

    pub fn with_excluded_school_years(self, years: Vec<String>) -> Self {
        Self {
            excluded_school_years: years,
            ..self
        }
    }

    pub fn with_weeks_latency(self, weeks_latency: u32) -> Self {
        Self {
            weeks_latency,
            ..self
        }
    }

    /// Checks the configured strftime patterns before any data is read.
    pub fn validate(&self) -> ForecastResult<()> {
        check_format(&self.date_format)?;
        check_format(&self.menu_date_format)?;
        Ok(())
    }
}

/// Fails with [`DateError::Format`] when `format` is not a usable strftime pattern.
pub fn check_format(format: &str) -> ForecastResult<()> {
    use chrono::format::{Item, StrftimeItems};

    let invalid = format.is_empty() || StrftimeItems::new(format).any(|i| matches!(i, Item::Error));
    if invalid {
        return Err(DateError::Format(format.to_string()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_iso_dates_and_ten_weeks_lookahead() {
        let config = PipelineConfig::default();
        assert_eq!(config.date_format, "%Y-%m-%d");
        assert_eq!(config.lookahead_weeks, 10);
        assert!(!config.include_wednesday);
        assert_eq!(config.outlier_column, Target::Actual);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_deserializes_with_partial_fields() {
        let json = r#"{ "include_wednesday": true, "outlier_column": "forecast" }"#;
        let config: PipelineConfig = serde_json::from_str(json).expect("valid config");
        assert!(config.include_wednesday);
        assert_eq!(config.outlier_column, Target::Forecast);
        assert_eq!(config.weeks_latency, 1);
    }

    #[test]
    fn check_format_rejects_broken_patterns() {
        assert!(check_format("%Y-%m-%d").is_ok());
        assert!(matches!(
            check_format("%Y-%"),
            Err(crate::error::ForecastError::Date(DateError::Format(_)))
        ));
        assert!(check_format("").is_err());
    }

    #[test]
    fn target_parses_from_snake_case() {
        assert_eq!("forecast".parse::<Target>().ok(), Some(Target::Forecast));
        assert!(matches!(
            Target::parse("reel"),
            Err(crate::error::ForecastError::Model(ModelError::UnknownTarget(name))) if name == "reel"
        ));
    }
}
