//! Boundary with the regression models and the forecast built on top of it.

pub mod baseline;
pub mod quantile;

use std::{
    fs,
    path::{Path, PathBuf},
};

use polars::prelude::{DataFrame, DataType, IntoLazy, SortMultipleOptions, col, lit, when};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    calendar::{CalendarCol, events::Event},
    config::Target,
    error::{ForecastResult, IoError, ModelError, SplitError},
    modeling::{
        ENTITY_KEY, ModelingCol, ModelingTable,
        split::{TrainPredictSplit, TrainPredictSplitter},
    },
    polars_ext::{DataFrameExt, LazyFrameExt, f64_column, polars_to_forecast_error},
    source::SpecialDishes,
    table::{Table, TableName, ToCsv},
};

const TABLE: &str = "modeling table";

/// Share of the training rows held out, most recent last, to watch over-fitting.
const HOLDOUT_SHARE: f64 = 0.1;

// ================================================================================================
// Features
// ================================================================================================

/// Features of the gradient-boosted models, before the special-dish categories.
pub fn base_features() -> Vec<String> {
    let mut features = [
        ModelingCol::SiteId.as_str(),
        ModelingCol::SectorCat.as_str(),
        CalendarCol::Week.as_str(),
        CalendarCol::Wednesday.as_str(),
        CalendarCol::HolidaysIn.as_str(),
        CalendarCol::NonWorkingIn.as_str(),
        ModelingCol::Headcount.as_str(),
        ModelingCol::ForecastRatio.as_str(),
    ]
    .map(str::to_string)
    .to_vec();
    features.push(Event::Ramadan.columns().days_ago.to_string());
    features
}

/// Base features followed by one indicator per special-dish category.
pub fn model_features(dishes: &SpecialDishes) -> Vec<String> {
    let mut features = base_features();
    features.extend(dishes.categories().map(str::to_string));
    features
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Feature columns as `Float64` and the matching target values.
#[derive(Debug, Clone)]
pub struct TrainingData {
    pub features: DataFrame,
    pub target: Vec<f64>,
}

impl TrainingData {
    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }

    /// Splits off the last `share` of the rows.
    fn holdout(self, share: f64) -> (Self, Option<Self>) {
        let held = (self.len() as f64 * share).floor() as usize;
        if held == 0 || held == self.len() {
            return (self, None);
        }
        let kept = self.len() - held;
        let fit = Self {
            features: self.features.slice(0, kept),
            target: self.target[..kept].to_vec(),
        };
        let eval = Self {
            features: self.features.slice(kept as i64, held),
            target: self.target[kept..].to_vec(),
        };
        (fit, Some(eval))
    }
}

// ================================================================================================
// Model collaborator
// ================================================================================================

/// A fitted model.
pub trait TrainedModel {
    /// One prediction per row of `features`, `None` where the model has no answer.
    fn predict(&self, features: &DataFrame) -> ForecastResult<Vec<Option<f64>>>;

    /// Features ranked by decreasing importance.
    fn feature_importances(&self) -> Vec<FeatureImportance> {
        Vec::new()
    }

    /// Lower and upper bounds, for models that predict an interval.
    fn predict_bounds(&self, _features: &DataFrame) -> ForecastResult<Option<PredictionBounds>> {
        Ok(None)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionBounds {
    pub lower: Vec<Option<f64>>,
    pub upper: Vec<Option<f64>>,
}

/// Learns a target from a tabular feature matrix.
pub trait Regressor {
    type Model: TrainedModel;

    /// Columns of the modeling table the model reads, in matrix order.
    fn features(&self) -> Vec<String>;

    /// `eval_set` holds held-out rows the implementation may use for early stopping.
    fn fit(&self, train: &TrainingData, eval_set: &[TrainingData]) -> ForecastResult<Self::Model>;
}

// ================================================================================================
// Forecast
// ================================================================================================

/// Prediction rows with an `output` column and the ranked feature importances.
#[derive(Debug, Clone)]
pub struct Forecast {
    df: DataFrame,
    target: Target,
    begin_date: String,
    end_date: String,
    importances: Vec<FeatureImportance>,
}

impl Table for Forecast {
    fn as_df(&self) -> &DataFrame {
        &self.df
    }
}

impl TableName for Forecast {
    fn base_name(&self) -> String {
        format!(
            "results_detailed_{}_{}_{}",
            self.target, self.begin_date, self.end_date
        )
    }
}

impl Forecast {
    pub fn target(&self) -> Target {
        self.target
    }

    pub fn importances(&self) -> &[FeatureImportance] {
        &self.importances
    }

    pub fn into_df(self) -> DataFrame {
        self.df
    }

    /// Columns summed by the aggregated exports: the prediction, the announced
    /// attendance and the target.
    fn summed_columns(&self) -> Vec<ModelingCol> {
        let mut columns = vec![ModelingCol::Output, ModelingCol::Forecast];
        if self.target != Target::Forecast {
            columns.push(self.target.column());
        }
        columns
    }

    /// Sums of the prediction rows per day, or per day and canteen.
    pub fn summary(&self, level: SummaryLevel) -> ForecastResult<ForecastSummary> {
        let mut keys = vec![CalendarCol::DateStr.as_str()];
        if level == SummaryLevel::ByCanteen {
            keys.extend(ENTITY_KEY.map(|c| c.as_str()));
        }

        let df = self
            .df
            .clone()
            .lazy()
            .group_by_stable(keys.iter().map(|k| col(*k)).collect::<Vec<_>>())
            .agg(
                self.summed_columns()
                    .into_iter()
                    .map(|c| col(c).sum())
                    .collect::<Vec<_>>(),
            )
            .sort(keys, SortMultipleOptions::default().with_maintain_order(true))
            .collect_with("summarizing the forecast")?;

        Ok(ForecastSummary {
            df,
            level,
            target: self.target,
            begin_date: self.begin_date.clone(),
            end_date: self.end_date.clone(),
        })
    }

    /// `<target>_<begin>_<end>.txt`, one `feature: importance` line per feature, most important first.
    pub fn write_importances(&self, dir: impl AsRef<Path>) -> ForecastResult<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| {
            IoError::FileSystem(format!("Failed to create directory {}: {e}", dir.display()))
        })?;
        let path = dir.join(format!(
            "{}_{}_{}.txt",
            self.target, self.begin_date, self.end_date
        ));
        let content = self
            .importances
            .iter()
            .map(|fi| format!("{}: {}\n", fi.feature, fi.importance))
            .collect::<String>();
        fs::write(&path, content).map_err(|e| {
            IoError::WriteFailed(format!("Failed to write {}: {e}", path.display()))
        })?;
        Ok(path)
    }

    /// Writes the detailed rows, both summaries and the feature importances under `dir`.
    pub fn export(&self, dir: impl AsRef<Path>) -> ForecastResult<ForecastFiles> {
        let dir = dir.as_ref();
        let files = ForecastFiles {
            detailed: self.to_csv(dir)?,
            global: self.summary(SummaryLevel::Global)?.to_csv(dir)?,
            by_canteen: self.summary(SummaryLevel::ByCanteen)?.to_csv(dir)?,
            importances: self.write_importances(dir.join(IMPORTANCES_DIR))?,
        };
        info!(
            detailed = %files.detailed.display(),
            importances = %files.importances.display(),
            "Forecast exported"
        );
        Ok(files)
    }
}

const IMPORTANCES_DIR: &str = "feature_importances";

/// Paths written by [`Forecast::export`].
#[derive(Debug, Clone)]
pub struct ForecastFiles {
    pub detailed: PathBuf,
    pub global: PathBuf,
    pub by_canteen: PathBuf,
    pub importances: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryLevel {
    /// One row per day, every canteen summed.
    Global,
    /// One row per day and canteen.
    ByCanteen,
}

/// Forecast rows summed at one [`SummaryLevel`].
#[derive(Debug, Clone)]
pub struct ForecastSummary {
    df: DataFrame,
    level: SummaryLevel,
    target: Target,
    begin_date: String,
    end_date: String,
}

impl Table for ForecastSummary {
    fn as_df(&self) -> &DataFrame {
        &self.df
    }
}

impl TableName for ForecastSummary {
    fn base_name(&self) -> String {
        let level = match self.level {
            SummaryLevel::Global => "global",
            SummaryLevel::ByCanteen => "by_cafeteria",
        };
        format!(
            "results_{level}_{}_{}_{}",
            self.target, self.begin_date, self.end_date
        )
    }
}

impl ForecastSummary {
    pub fn level(&self) -> SummaryLevel {
        self.level
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn into_df(self) -> DataFrame {
        self.df
    }
}

fn feature_frame(df: &DataFrame, features: &[String]) -> ForecastResult<DataFrame> {
    for feature in features {
        df.require_column(feature, TABLE)?;
    }
    df.clone()
        .lazy()
        .select(
            features
                .iter()
                .map(|f| col(f.as_str()).cast(DataType::Float64))
                .collect::<Vec<_>>(),
        )
        .collect_with("building the feature matrix")
}

/// Training rows without any missing feature or target.
fn training_data(train: &DataFrame, features: &[String], target: Target) -> ForecastResult<TrainingData> {
    let target_name = target.column().as_str();
    let mut columns = features.to_vec();
    columns.push(target_name.to_string());

    let reduced = feature_frame(train, &columns)?;
    let before = reduced.height();
    let reduced = reduced
        .lazy()
        .drop_nulls(None)
        .collect_with("dropping incomplete training rows")?;
    let dropped = before - reduced.height();
    let percent = if before == 0 {
        0.0
    } else {
        (100.0 * dropped as f64 / before as f64).round()
    };
    info!(percent, dropped, "Dropping training rows with missing values");

    let values = reduced
        .f64_values(target_name, TABLE)?
        .into_no_null_iter()
        .collect();
    let features = reduced
        .drop(target_name)
        .map_err(|e| polars_to_forecast_error("separating the target", e))?;
    Ok(TrainingData {
        features,
        target: values,
    })
}

/// Fits `regressor` on the training window and predicts the prediction window.
///
/// `output` is 0 on days without canteen activity; missing target, forecast and output
/// values are reported as 0.
#[tracing::instrument(skip_all, fields(target = %target))]
pub fn forecast<R: Regressor>(
    table: &ModelingTable,
    splitter: &TrainPredictSplitter,
    regressor: &R,
    target: Target,
) -> ForecastResult<Forecast> {
    let TrainPredictSplit { train, predict } = splitter.split(table)?;
    let windows = splitter.windows();

    let features = regressor.features();
    let training = training_data(&train, &features, target)?;
    if training.is_empty() {
        return Err(SplitError::EmptyTrainingSet {
            min_date: windows.min_date.clone(),
            max_date: windows.max_date.clone(),
        }
        .into());
    }

    let (fit_set, holdout) = training.holdout(HOLDOUT_SHARE);
    info!(
        fit_rows = fit_set.len(),
        holdout_rows = holdout.as_ref().map_or(0, TrainingData::len),
        "Fitting model"
    );
    let model = regressor.fit(&fit_set, holdout.as_slice())?;

    let matrix = feature_frame(&predict, &features)?;
    let output = model.predict(&matrix)?;
    if output.len() != predict.height() {
        return Err(ModelError::Predict(format!(
            "{} predictions for {} rows",
            output.len(),
            predict.height()
        ))
        .into());
    }

    let mut predictions = predict;
    let mut columns = vec![f64_column(ModelingCol::Output.as_str(), output)];
    if let Some(bounds) = model.predict_bounds(&matrix)? {
        columns.push(f64_column(ModelingCol::PredLowerBound.as_str(), bounds.lower));
        columns.push(f64_column(ModelingCol::PredUpperBound.as_str(), bounds.upper));
    }
    for column in columns {
        predictions
            .with_column(column)
            .map_err(|e| polars_to_forecast_error("attaching predictions", e))?;
    }

    let mut zero_filled = vec![ModelingCol::Forecast, ModelingCol::Output];
    if target != Target::Forecast {
        zero_filled.push(target.column());
    }
    let df = predictions
        .lazy()
        .with_column(
            when(col(CalendarCol::Working).eq(lit(0_i64)))
                .then(lit(0.0))
                .otherwise(col(ModelingCol::Output))
                .alias(ModelingCol::Output.as_str()),
        )
        .with_columns(
            zero_filled
                .iter()
                .map(|c| col(*c).fill_null(lit(0.0)).alias(c.as_str()))
                .collect::<Vec<_>>(),
        )
        .collect_with("finalizing predictions")?;

    let importances = model.feature_importances();
    for (rank, importance) in importances.iter().enumerate() {
        info!(rank, feature = %importance.feature, importance = importance.importance, "Feature importance");
    }

    Ok(Forecast {
        df,
        target,
        begin_date: windows.begin_date.clone(),
        end_date: windows.end_date.clone(),
        importances,
    })
}

/// One column of a feature matrix.
pub(crate) fn feature_values(features: &DataFrame, name: &str) -> ForecastResult<Vec<Option<f64>>> {
    let values = features.f64_values(name, "feature matrix")?;
    Ok((&values).into_iter().collect())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use polars::prelude::{NamedFrom, Series, df};

    use super::*;
    use crate::{
        config::FilterPolicy,
        model::{baseline::StatisticalBaseline, quantile::{GroupQuantile, QuantileInterval}},
        modeling::split::SplitWindows,
    };

    #[test]
    fn features_end_with_dish_categories() {
        let dishes = SpecialDishes::new(BTreeMap::from([
            ("porc".to_string(), vec!["jambon".to_string()]),
        ]));
        let features = model_features(&dishes);
        assert_eq!(features.len(), 10);
        assert_eq!(features[0], "site_id");
        assert_eq!(features[8], "ramadan_ago");
        assert_eq!(features[9], "porc");
    }

    #[test]
    fn holdout_keeps_the_most_recent_rows() {
        let data = TrainingData {
            features: df!["x" => (0..20).map(f64::from).collect::<Vec<_>>()].expect("frame"),
            target: (0..20).map(f64::from).collect(),
        };
        let (fit, eval) = data.holdout(0.1);
        assert_eq!(fit.len(), 18);
        let eval = eval.expect("holdout");
        assert_eq!(eval.target, vec![18.0, 19.0]);
    }

    fn table() -> ModelingTable {
        let df = df![
            "date_str" => ["2017-05-01", "2017-05-02", "2017-05-03", "2017-05-08", "2017-05-09", "2017-05-10"],
            "canteen_name" => ["A"; 6],
            "canteen_type" => ["M"; 6],
            "sector" => ["nord"; 6],
            "working" => [1_i64, 1, 1, 1, 0, 1],
            "strike" => [0_i64; 6],
            "forecast" => [Some(40.0), Some(44.0), Some(42.0), None, None, None],
            "actual" => [Some(38.0), Some(41.0), Some(40.0), None, None, None],
            "headcount" => [100.0; 6],
            "forecast_ratio" => [0.42; 6],
            "actual_ratio" => [0.4; 6],
            "upper_outlier" => [false; 6],
            "lower_outlier" => [false; 6],
        ]
        .expect("frame");
        ModelingTable::new(df, "2017-05-01", "2017-05-10")
    }

    fn splitter() -> TrainPredictSplitter {
        TrainPredictSplitter::new(
            SplitWindows::new("2017-05-01", "2017-05-03", "2017-05-08", "2017-05-10"),
            FilterPolicy::default(),
        )
    }

    fn outputs(forecast: &Forecast) -> Vec<f64> {
        forecast
            .as_df()
            .column("output")
            .expect("output")
            .f64()
            .expect("f64")
            .into_no_null_iter()
            .map(|v| (v * 1e6).round() / 1e6)
            .collect()
    }

    #[test]
    fn baseline_forecast_zeroes_inactive_days() {
        let forecast = forecast(
            &table(),
            &splitter(),
            &StatisticalBaseline::new(Target::Actual),
            Target::Actual,
        )
        .expect("forecast");

        assert_eq!(outputs(&forecast), vec![40.0, 0.0, 40.0]);
        assert_eq!(forecast.base_name(), "results_detailed_actual_2017-05-08_2017-05-10");
        let actual = forecast
            .as_df()
            .column("actual")
            .expect("actual")
            .f64()
            .expect("f64")
            .into_iter()
            .collect::<Vec<_>>();
        assert_eq!(actual, vec![Some(0.0), Some(0.0), Some(0.0)]);
    }

    #[test]
    fn training_rows_without_target_leave_nothing_to_fit() {
        let mut df = table().into_df();
        df.with_column(Series::new("actual".into(), [None::<f64>; 6]))
            .expect("actual column");
        let table = ModelingTable::new(df, "2017-05-01", "2017-05-10");

        let result = forecast(
            &table,
            &splitter(),
            &StatisticalBaseline::new(Target::Actual),
            Target::Actual,
        );
        assert!(matches!(
            result,
            Err(crate::error::ForecastError::Split(SplitError::EmptyTrainingSet { .. }))
        ));
    }

    #[test]
    fn interval_forecast_reports_bounds() {
        let regressor = QuantileInterval::new(GroupQuantile::default(), 0.8).expect("confidence");
        let forecast = forecast(&table(), &splitter(), &regressor, Target::Actual).expect("forecast");

        assert!(forecast.as_df().column("pred_lower_bound").is_ok());
        assert!(forecast.as_df().column("pred_upper_bound").is_ok());
        // upper quantile of 38, 41, 40 rounded up, every active day
        assert_eq!(outputs(&forecast), vec![41.0, 0.0, 41.0]);
        assert_eq!(forecast.importances()[0].feature, "site_id");
    }
}
