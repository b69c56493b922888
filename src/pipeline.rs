//! End-to-end preprocessing run and the train/predict entry point built on its output.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::{
    calendar::{
        CalendarTable, Calculator, date_attributes::DateAttributes, date_range::DateRangeGenerator,
        events::EventsCountdown, holidays::Holidays, menu::SpecialMeals,
        non_working_days::NonWorkingDays, school_year::SchoolYears, strikes::Strikes,
        working_days::WorkingDays,
    },
    config::{FilterPolicy, PipelineConfig, Target},
    error::ForecastResult,
    model::{Forecast, Regressor, forecast},
    modeling::{
        ModelingTable,
        entities::Entities,
        join::assemble,
        split::{SplitWindows, TrainPredictSplitter},
    },
    source::DataSource,
    table::ToCsv,
};

const DEFAULT_STAGING_DIR: &str = "output/staging";

/// Preprocessing and forecasting over one data source.
///
/// Every run builds fresh tables; nothing computed is kept between runs.
#[derive(Debug, Clone)]
pub struct Pipeline<S> {
    source: S,
    config: PipelineConfig,
    staging_dir: PathBuf,
}

impl<S: DataSource> Pipeline<S> {
    pub fn new(source: S, config: PipelineConfig) -> Self {
        Self {
            source,
            config,
            staging_dir: PathBuf::from(DEFAULT_STAGING_DIR),
        }
    }

    pub fn with_staging_dir(self, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            ..self
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Calendar table of `[start, end]` plus the lookahead buffer, every feature attached.
    pub fn build_calendar(&self, start: &str, end: &str) -> ForecastResult<CalendarTable> {
        let config = &self.config;
        config.validate()?;
        let table = DateRangeGenerator::new(&config.date_format, config.lookahead_weeks)
            .generate(start, end)?;

        let source: &dyn DataSource = &self.source;
        let school_years = SchoolYears::from_source(source, &config.date_format)?;
        let strikes = Strikes::from_source(source, &config.date_format)?;
        let attributes = DateAttributes::default();
        let holidays =
            Holidays::from_source(source, &config.date_format, config.holiday_zone.as_deref())?;
        let non_working = NonWorkingDays::from_source(source, &config.date_format)?;
        let meals = SpecialMeals::from_source(source, &config.menu_date_format)?;
        let working = WorkingDays::new(config.include_wednesday);

        let calculators: [&dyn Calculator; 8] = [
            &school_years,
            &strikes,
            &attributes,
            &holidays,
            &non_working,
            &EventsCountdown,
            &meals,
            &working,
        ];
        table.apply_all(&calculators)
    }

    /// Builds the modeling table of `[start, end]` without persisting it.
    pub fn preprocess(&self, start: &str, end: &str) -> ForecastResult<ModelingTable> {
        let span = tracing::info_span!("pipeline_run", start, end);
        let _enter = span.enter();

        let calendar = self.build_calendar(start, end)?;
        let entities = Entities::load(&self.source, self.config.canteens.as_deref())?;
        let table = assemble(&calendar, &entities, &self.config, start, end)?;
        info!(
            days = calendar.height(),
            rows = table.height(),
            "Modeling table assembled"
        );
        Ok(table)
    }

    /// Builds the modeling table and writes it under the staging directory.
    pub fn prepare(&self, start: &str, end: &str) -> ForecastResult<(ModelingTable, PathBuf)> {
        let table = self.preprocess(start, end)?;
        let path = table.to_csv(&self.staging_dir)?;
        info!(path = %path.display(), "Modeling table persisted");
        Ok((table, path))
    }

    /// Reads the modeling table persisted for `[start, end]`.
    pub fn load_prepared(&self, start: &str, end: &str) -> ForecastResult<ModelingTable> {
        ModelingTable::read_csv(&self.staging_dir, start, end)
    }

    /// Fits on the persisted table of `[begin_training, end_prediction]` and predicts
    /// `[begin_prediction, end_prediction]`.
    pub fn train_and_predict<R: Regressor>(
        &self,
        begin_training: &str,
        begin_prediction: &str,
        end_prediction: &str,
        regressor: &R,
        target: Target,
        policy: FilterPolicy,
    ) -> ForecastResult<Forecast> {
        let windows = SplitWindows::with_latency(
            begin_training,
            begin_prediction,
            end_prediction,
            &self.config.date_format,
            self.config.weeks_latency,
        )?;
        let table = self.load_prepared(begin_training, end_prediction)?;
        forecast(
            &table,
            &TrainPredictSplitter::new(windows, policy),
            regressor,
            target,
        )
    }
}
