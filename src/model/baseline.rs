use polars::prelude::DataFrame;

use crate::{
    config::Target,
    error::ForecastResult,
    model::{Regressor, TrainedModel, TrainingData, feature_values},
    modeling::ModelingCol,
};

/// Seasonal baseline: the (canteen, week) attendance ratio times the headcount.
///
/// Nothing is learnt; the ratio was averaged during preprocessing.
#[derive(Debug, Clone, Copy)]
pub struct StatisticalBaseline {
    target: Target,
}

impl StatisticalBaseline {
    pub fn new(target: Target) -> Self {
        Self { target }
    }
}

impl Regressor for StatisticalBaseline {
    type Model = BaselineModel;

    fn features(&self) -> Vec<String> {
        vec![
            self.target.ratio_column().as_str().to_string(),
            ModelingCol::Headcount.as_str().to_string(),
        ]
    }

    fn fit(&self, _train: &TrainingData, _eval_set: &[TrainingData]) -> ForecastResult<Self::Model> {
        Ok(BaselineModel {
            ratio: self.target.ratio_column(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BaselineModel {
    ratio: ModelingCol,
}

impl TrainedModel for BaselineModel {
    fn predict(&self, features: &DataFrame) -> ForecastResult<Vec<Option<f64>>> {
        let ratios = feature_values(features, self.ratio.as_str())?;
        let headcounts = feature_values(features, ModelingCol::Headcount.as_str())?;
        Ok(ratios
            .into_iter()
            .zip(headcounts)
            .map(|(ratio, headcount)| Some(ratio? * headcount?))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use polars::prelude::df;

    use super::*;

    #[test]
    fn output_is_ratio_times_headcount() {
        let features = df![
            "forecast_ratio" => [Some(0.5), Some(0.25), None],
            "headcount" => [Some(100.0), None, Some(80.0)],
        ]
        .expect("features");
        let model = StatisticalBaseline::new(Target::Forecast)
            .fit(
                &TrainingData {
                    features: features.clone(),
                    target: Vec::new(),
                },
                &[],
            )
            .expect("fit");

        assert_eq!(
            model.predict(&features).expect("predict"),
            vec![Some(50.0), None, None]
        );
    }
}
