use std::collections::BTreeMap;

use polars::prelude::DataFrame;

use crate::{
    error::{ForecastResult, ModelError},
    model::{
        FeatureImportance, PredictionBounds, Regressor, TrainedModel, TrainingData, feature_values,
    },
    modeling::ModelingCol,
};

// ================================================================================================
// Interval contract
// ================================================================================================

/// A regressor trained against one quantile of the target.
pub trait QuantileRegressor {
    type Model: TrainedModel;

    fn features(&self) -> Vec<String>;

    /// Fits the `alpha` quantile, `alpha` in `[0, 1]`.
    fn fit_quantile(
        &self,
        alpha: f64,
        train: &TrainingData,
        eval_set: &[TrainingData],
    ) -> ForecastResult<Self::Model>;
}

/// Two quantile models framing a `confidence` interval.
///
/// The output is the larger of both bounds once rounded up.
#[derive(Debug, Clone)]
pub struct QuantileInterval<Q> {
    inner: Q,
    confidence: f64,
}

impl<Q: QuantileRegressor> QuantileInterval<Q> {
    pub fn new(inner: Q, confidence: f64) -> ForecastResult<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(
                ModelError::Fit(format!("confidence must lie in [0, 1], got {confidence}")).into(),
            );
        }
        Ok(Self { inner, confidence })
    }

    /// `(lower, upper)` quantiles of the interval.
    pub fn quantiles(&self) -> (f64, f64) {
        let step = (1.0 - self.confidence) / 2.0;
        (step, 1.0 - step)
    }
}

impl<Q: QuantileRegressor> Regressor for QuantileInterval<Q> {
    type Model = IntervalModel<Q::Model>;

    fn features(&self) -> Vec<String> {
        self.inner.features()
    }

    fn fit(&self, train: &TrainingData, eval_set: &[TrainingData]) -> ForecastResult<Self::Model> {
        let (lower, upper) = self.quantiles();
        Ok(IntervalModel {
            upper: self.inner.fit_quantile(upper, train, eval_set)?,
            lower: self.inner.fit_quantile(lower, train, &[])?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct IntervalModel<M> {
    lower: M,
    upper: M,
}

fn ceil_all(values: Vec<Option<f64>>) -> Vec<Option<f64>> {
    values.into_iter().map(|v| v.map(f64::ceil)).collect()
}

impl<M: TrainedModel> TrainedModel for IntervalModel<M> {
    fn predict(&self, features: &DataFrame) -> ForecastResult<Vec<Option<f64>>> {
        let PredictionBounds { lower, upper } = self.bounds(features)?;
        Ok(lower
            .into_iter()
            .zip(upper)
            .map(|pair| match pair {
                (Some(l), Some(u)) => Some(l.max(u)),
                (l, u) => l.or(u),
            })
            .collect())
    }

    fn feature_importances(&self) -> Vec<FeatureImportance> {
        self.upper.feature_importances()
    }

    fn predict_bounds(&self, features: &DataFrame) -> ForecastResult<Option<PredictionBounds>> {
        self.bounds(features).map(Some)
    }
}

impl<M: TrainedModel> IntervalModel<M> {
    fn bounds(&self, features: &DataFrame) -> ForecastResult<PredictionBounds> {
        Ok(PredictionBounds {
            lower: ceil_all(self.lower.predict(features)?),
            upper: ceil_all(self.upper.predict(features)?),
        })
    }
}

// ================================================================================================
// Empirical quantiles
// ================================================================================================

/// Empirical quantile of the target per value of one grouping feature.
///
/// Groups unseen during training fall back to the quantile over every row.
#[derive(Debug, Clone)]
pub struct GroupQuantile {
    group: String,
}

impl Default for GroupQuantile {
    fn default() -> Self {
        Self::new(ModelingCol::SiteId.as_str())
    }
}

impl GroupQuantile {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
        }
    }
}

/// Linear interpolation between the closest ranks.
fn quantile(values: &mut [f64], alpha: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let position = alpha * (values.len() - 1) as f64;
    let below = position.floor() as usize;
    let above = position.ceil() as usize;
    let weight = position - below as f64;
    Some(values[below] + (values[above] - values[below]) * weight)
}

/// Group keys are compared on their integer code.
fn group_key(value: f64) -> i64 {
    value.round() as i64
}

impl QuantileRegressor for GroupQuantile {
    type Model = GroupQuantileModel;

    fn features(&self) -> Vec<String> {
        vec![self.group.clone()]
    }

    fn fit_quantile(
        &self,
        alpha: f64,
        train: &TrainingData,
        _eval_set: &[TrainingData],
    ) -> ForecastResult<Self::Model> {
        let groups = feature_values(&train.features, &self.group)?;
        if groups.len() != train.target.len() {
            return Err(ModelError::Fit(format!(
                "{} feature rows for {} targets",
                groups.len(),
                train.target.len()
            ))
            .into());
        }

        let mut by_group: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
        for (group, target) in groups.iter().zip(&train.target) {
            if let Some(group) = group {
                by_group.entry(group_key(*group)).or_default().push(*target);
            }
        }

        let mut all = train.target.clone();
        let fallback = quantile(&mut all, alpha)
            .ok_or_else(|| ModelError::Fit("no training rows".to_string()))?;
        let per_group = by_group
            .into_iter()
            .filter_map(|(group, mut values)| Some((group, quantile(&mut values, alpha)?)))
            .collect();

        Ok(GroupQuantileModel {
            group: self.group.clone(),
            per_group,
            fallback,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GroupQuantileModel {
    group: String,
    per_group: BTreeMap<i64, f64>,
    fallback: f64,
}

impl TrainedModel for GroupQuantileModel {
    fn predict(&self, features: &DataFrame) -> ForecastResult<Vec<Option<f64>>> {
        Ok(feature_values(features, &self.group)?
            .into_iter()
            .map(|group| {
                let known = group.and_then(|g| self.per_group.get(&group_key(g)).copied());
                Some(known.unwrap_or(self.fallback))
            })
            .collect())
    }

    fn feature_importances(&self) -> Vec<FeatureImportance> {
        vec![FeatureImportance {
            feature: self.group.clone(),
            importance: 1.0,
        }]
    }
}
