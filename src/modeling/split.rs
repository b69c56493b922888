use std::collections::HashMap;

use chrono::Duration;
use itertools::Itertools;
use polars::prelude::{
    Column, DataFrame, Expr, IntoLazy, LazyFrame, NamedFrom, Series, col, lit,
};
use tracing::info;

use crate::{
    calendar::CalendarCol,
    config::FilterPolicy,
    error::{DateError, ForecastResult, SplitError},
    modeling::{ModelingCol, ModelingTable},
    polars_ext::{DataFrameExt, LazyFrameExt, parse_date, polars_to_forecast_error},
    table::Table,
};

const TABLE: &str = "modeling table";

// ================================================================================================
// Windows
// ================================================================================================

/// Derives the last training day from the prediction window.
///
/// Training ends `weeks_latency` weeks before `begin_prediction`. Returns
/// `(begin_training, end_training)` rendered with `date_format`.
pub fn compute_min_max_date(
    begin_training: &str,
    begin_prediction: &str,
    end_prediction: &str,
    date_format: &str,
    weeks_latency: u32,
) -> ForecastResult<(String, String)> {
    let begin_training_date = parse_date(begin_training, date_format)?;
    let begin_prediction_date = parse_date(begin_prediction, date_format)?;
    let end_prediction_date = parse_date(end_prediction, date_format)?;

    if begin_prediction_date > end_prediction_date {
        return Err(DateError::InconsistentDates(format!(
            "begin_prediction ({begin_prediction}) must be prior to end_prediction ({end_prediction})"
        ))
        .into());
    }
    if begin_training_date >= begin_prediction_date {
        return Err(DateError::InconsistentDates(format!(
            "begin_training ({begin_training}) must be prior to begin_prediction ({begin_prediction})"
        ))
        .into());
    }

    let end_training = begin_prediction_date - Duration::weeks(i64::from(weeks_latency));
    if end_training <= begin_training_date {
        return Err(DateError::InconsistentDates(format!(
            "end_training ({}) must be after begin_training ({begin_training}) and keep {weeks_latency} weeks before begin_prediction ({begin_prediction})",
            end_training.format(date_format)
        ))
        .into());
    }

    Ok((
        begin_training.to_string(),
        end_training.format(date_format).to_string(),
    ))
}

/// Inclusive training and prediction bounds, compared against `date_str`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitWindows {
    pub min_date: String,
    pub max_date: String,
    pub begin_date: String,
    pub end_date: String,
}

impl SplitWindows {
    pub fn new(
        min_date: impl Into<String>,
        max_date: impl Into<String>,
        begin_date: impl Into<String>,
        end_date: impl Into<String>,
    ) -> Self {
        Self {
            min_date: min_date.into(),
            max_date: max_date.into(),
            begin_date: begin_date.into(),
            end_date: end_date.into(),
        }
    }

    /// Windows whose training part ends `weeks_latency` weeks before the prediction.
    pub fn with_latency(
        begin_training: &str,
        begin_prediction: &str,
        end_prediction: &str,
        date_format: &str,
        weeks_latency: u32,
    ) -> ForecastResult<Self> {
        let (min_date, max_date) = compute_min_max_date(
            begin_training,
            begin_prediction,
            end_prediction,
            date_format,
            weeks_latency,
        )?;
        Ok(Self::new(min_date, max_date, begin_prediction, end_prediction))
    }

    fn training(&self) -> Expr {
        between(&self.min_date, &self.max_date)
    }

    fn prediction(&self) -> Expr {
        between(&self.begin_date, &self.end_date)
    }
}

fn between(low: &str, high: &str) -> Expr {
    col(CalendarCol::DateStr)
        .gt_eq(lit(low))
        .and(col(CalendarCol::DateStr).lt_eq(lit(high)))
}

// ================================================================================================
// Encoding and filtering
// ================================================================================================

/// Dense integer codes in order of first appearance; nulls stay null.
fn first_appearance_codes(values: &[Option<String>]) -> Vec<Option<i64>> {
    let codes = values
        .iter()
        .flatten()
        .unique()
        .enumerate()
        .map(|(code, value)| (value.as_str(), code as i64))
        .collect::<HashMap<_, _>>();
    values
        .iter()
        .map(|v| v.as_deref().and_then(|v| codes.get(v).copied()))
        .collect()
}

/// Adds `site_id`, `site_type_cat` and `sector_cat`.
pub fn encode_categoricals(df: &DataFrame) -> ForecastResult<DataFrame> {
    let mut encoded = df.clone();
    for (source, target) in [
        (ModelingCol::CanteenName, ModelingCol::SiteId),
        (ModelingCol::CanteenType, ModelingCol::SiteTypeCat),
        (ModelingCol::Sector, ModelingCol::SectorCat),
    ] {
        let values = df.string_values(source.as_str(), TABLE)?;
        let codes = Series::new(target.name(), first_appearance_codes(&values));
        encoded
            .with_column(Column::from(codes))
            .map_err(|e| polars_to_forecast_error("encoding categorical columns", e))?;
    }
    Ok(encoded)
}

/// Applies the training filters of `policy`.
///
/// Outlier filtering keeps every row after `begin_date`, those have no ground truth yet.
/// Missing flags and counts never cause a row to be dropped.
pub fn filter_rows(lf: LazyFrame, policy: FilterPolicy, begin_date: &str) -> LazyFrame {
    let mut lf = lf;
    if policy.remove_no_school {
        lf = lf.filter(col(CalendarCol::Working).neq(lit(0_i64)).fill_null(lit(true)));
    }
    if policy.remove_outliers {
        let clean = [
            col(ModelingCol::Forecast).neq(lit(0.0)),
            col(ModelingCol::Actual).neq(lit(0.0)),
            col(CalendarCol::Strike).neq(lit(1_i64)),
            col(ModelingCol::UpperOutlier).neq(lit(true)),
            col(ModelingCol::LowerOutlier).neq(lit(true)),
        ]
        .into_iter()
        .fold(lit(true), |acc, keep| acc.and(keep.fill_null(lit(true))));
        lf = lf.filter(col(CalendarCol::DateStr).gt(lit(begin_date)).or(clean));
    }
    lf
}

// ================================================================================================
// Splitter
// ================================================================================================

/// Training rows after filtering, and the untouched prediction rows.
#[derive(Debug, Clone)]
pub struct TrainPredictSplit {
    pub train: DataFrame,
    pub predict: DataFrame,
}

#[derive(Debug, Clone)]
pub struct TrainPredictSplitter {
    windows: SplitWindows,
    policy: FilterPolicy,
}

impl TrainPredictSplitter {
    pub fn new(windows: SplitWindows, policy: FilterPolicy) -> Self {
        Self { windows, policy }
    }

    pub fn windows(&self) -> &SplitWindows {
        &self.windows
    }

    #[tracing::instrument(skip_all, fields(rows = table.height()))]
    pub fn split(&self, table: &ModelingTable) -> ForecastResult<TrainPredictSplit> {
        let df = table.as_df();
        for required in [
            CalendarCol::DateStr.as_str(),
            CalendarCol::Working.as_str(),
            CalendarCol::Strike.as_str(),
            ModelingCol::Forecast.as_str(),
            ModelingCol::Actual.as_str(),
            ModelingCol::UpperOutlier.as_str(),
            ModelingCol::LowerOutlier.as_str(),
        ] {
            df.require_column(required, TABLE)?;
        }

        let encoded = encode_categoricals(df)?.lazy();

        let predict = encoded
            .clone()
            .filter(self.windows.prediction())
            .collect_with("isolating prediction rows")?;
        let train = filter_rows(
            encoded.filter(self.windows.training()),
            self.policy,
            &self.windows.begin_date,
        )
        .collect_with("isolating training rows")?;

        info!(
            train = train.height(),
            predict = predict.height(),
            "Split modeling table"
        );
        if train.height() == 0 {
            return Err(SplitError::EmptyTrainingSet {
                min_date: self.windows.min_date.clone(),
                max_date: self.windows.max_date.clone(),
            }
            .into());
        }
        if predict.height() == 0 {
            return Err(SplitError::MissingPredictionData {
                begin_date: self.windows.begin_date.clone(),
                end_date: self.windows.end_date.clone(),
            }
            .into());
        }

        Ok(TrainPredictSplit { train, predict })
    }
}
