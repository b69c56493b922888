use polars::prelude::{Expr, LazyFrame, col, lit};

use crate::{
    calendar::CalendarCol,
    modeling::{ENTITY_KEY, ModelingCol},
    polars_ext::{ExprExt, LazyFrameExt},
};

fn entity_key_with(extra: &[CalendarCol]) -> Vec<Expr> {
    let mut keys = ENTITY_KEY.map(col).to_vec();
    keys.extend(extra.iter().map(|c| col(*c)));
    keys
}

/// Attaches the seasonal baseline `forecast_ratio` and `actual_ratio`.
///
/// Per-row ratios to the headcount are averaged per canteen, ISO week and school year,
/// then across school years. Rows of `excluded_years` do not contribute but still
/// receive the baseline of their (canteen, week).
pub fn add_statistical_features(lf: LazyFrame, excluded_years: &[String]) -> LazyFrame {
    let contributing = excluded_years.iter().fold(lit(true), |acc, year| {
        acc.and(col(CalendarCol::SchoolYear).neq(lit(year.as_str())))
    });
    let ratios = [
        (ModelingCol::Forecast, ModelingCol::ForecastRatio),
        (ModelingCol::Actual, ModelingCol::ActualRatio),
    ];

    let baseline = lf
        .clone()
        .filter(contributing.fill_null(lit(true)))
        .with_columns(ratios.map(|(count, ratio)| {
            col(count)
                .safe_div(col(ModelingCol::Headcount))
                .alias(ratio.as_str())
        }))
        .group_by_stable(entity_key_with(&[CalendarCol::Week, CalendarCol::SchoolYear]))
        .agg(ratios.map(|(_, ratio)| col(ratio).mean()))
        .group_by_stable(entity_key_with(&[CalendarCol::Week]))
        .agg(ratios.map(|(_, ratio)| col(ratio).mean()));

    lf.left_join_in_order(baseline, entity_key_with(&[CalendarCol::Week]))
}

/// Flags rows whose `column` lies beyond `n_sigma` standard deviations.
///
/// Mean and sample standard deviation are taken per canteen and school year over the
/// non-zero values. Rows without bounds are never flagged.
pub fn tag_outliers(lf: LazyFrame, column: ModelingCol, n_sigma: f64) -> LazyFrame {
    let stats = lf
        .clone()
        .filter(col(column).neq(lit(0.0)))
        .group_by_stable(entity_key_with(&[CalendarCol::SchoolYear]))
        .agg([
            col(column).mean().alias(ModelingCol::OutlierMean.as_str()),
            col(column).std(1).alias(ModelingCol::OutlierStd.as_str()),
        ])
        .with_columns([
            (col(ModelingCol::OutlierMean) - lit(n_sigma) * col(ModelingCol::OutlierStd))
                .alias(ModelingCol::LowerBound.as_str()),
            (col(ModelingCol::OutlierMean) + lit(n_sigma) * col(ModelingCol::OutlierStd))
                .alias(ModelingCol::UpperBound.as_str()),
        ]);

    lf.left_join_in_order(stats, entity_key_with(&[CalendarCol::SchoolYear]))
        .with_columns([
            col(column)
                .gt(col(ModelingCol::UpperBound))
                .fill_null(lit(false))
                .alias(ModelingCol::UpperOutlier.as_str()),
            col(column)
                .lt(col(ModelingCol::LowerBound))
                .fill_null(lit(false))
                .alias(ModelingCol::LowerOutlier.as_str()),
        ])
}
