use polars::prelude::{
    DataFrame, IntoLazy, JoinArgs, JoinType, LazyFrame, SortMultipleOptions, col, lit, when,
};
use tracing::info;

use crate::{
    calendar::{CalendarCol, CalendarTable},
    config::PipelineConfig,
    error::{DataError, ForecastResult, SystemError},
    modeling::{
        ENTITY_KEY, ModelingCol, ModelingTable,
        entities::Entities,
        statistics::{add_statistical_features, tag_outliers},
    },
    polars_ext::{DataFrameExt, LazyFrameExt},
    table::Table,
};

/// Every row of `left` paired with every row of `right`, left-major.
///
/// Fails with `OverlappingColumns` when both tables carry a column of the same name.
pub fn cross_product(left: &DataFrame, right: &DataFrame) -> ForecastResult<DataFrame> {
    let left_names = left.column_names_owned();
    let mut overlap = right
        .column_names_owned()
        .into_iter()
        .filter(|c| left_names.contains(c))
        .collect::<Vec<_>>();
    if !overlap.is_empty() {
        overlap.sort();
        return Err(DataError::OverlappingColumns(overlap).into());
    }

    left.clone()
        .lazy()
        .cross_join(right.clone().lazy(), None)
        .collect_with("cross joining tables")
}

/// Missing attendance becomes 0 on days without canteen activity.
pub fn fill_inactive_days(lf: LazyFrame) -> LazyFrame {
    let inactive = col(CalendarCol::Working)
        .eq(lit(0_i64))
        .or(col(CalendarCol::Wednesday).eq(lit(1_i64)));

    lf.with_columns([ModelingCol::Forecast, ModelingCol::Actual].map(|c| {
        when(inactive.clone().and(col(c).is_null()))
            .then(lit(0.0))
            .otherwise(col(c))
            .alias(c.as_str())
    }))
}

/// Builds the modeling table out of the enriched calendar and the entities.
///
/// Rows come out ordered by day, then canteen.
#[tracing::instrument(skip_all, fields(days = calendar.height(), canteens = entities.canteens.height()))]
pub fn assemble(
    calendar: &CalendarTable,
    entities: &Entities,
    config: &PipelineConfig,
    start: &str,
    end: &str,
) -> ForecastResult<ModelingTable> {
    let calendar_df = calendar.as_df();
    for required in [
        CalendarCol::DateIndex,
        CalendarCol::DateStr,
        CalendarCol::SchoolYear,
        CalendarCol::Week,
        CalendarCol::Working,
        CalendarCol::Wednesday,
        CalendarCol::Strike,
    ] {
        calendar_df.require_column(required.as_str(), "calendar table")?;
    }

    let crossed = cross_product(calendar_df, &entities.canteens)?;
    let expected = crossed.height();

    let mut attendance_key = vec![col(CalendarCol::DateStr)];
    attendance_key.extend(ENTITY_KEY.map(col));
    let mut enrollment_key = vec![col(CalendarCol::SchoolYear)];
    enrollment_key.extend(ENTITY_KEY.map(col));

    let joined = crossed
        .lazy()
        .join(
            entities.attendance.clone().lazy(),
            attendance_key.clone(),
            attendance_key,
            JoinArgs::new(JoinType::Left),
        )
        .join(
            entities.enrollment.clone().lazy(),
            enrollment_key.clone(),
            enrollment_key,
            JoinArgs::new(JoinType::Left),
        );

    let with_stats = add_statistical_features(joined, &config.excluded_school_years);
    let tagged = tag_outliers(with_stats, config.outlier_column.column(), config.outlier_sigma);

    let df = fill_inactive_days(tagged)
        .sort(
            [
                CalendarCol::DateIndex.as_str(),
                ModelingCol::CanteenName.as_str(),
                ModelingCol::CanteenType.as_str(),
            ],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .collect_with("assembling the modeling table")?;

    if df.height() != expected {
        return Err(SystemError::InvariantViolation(format!(
            "joins changed the row count from {expected} to {}",
            df.height()
        ))
        .into());
    }

    let table = ModelingTable::new(df, start, end);
    for ((name, kind), rows) in table.canteen_row_counts()? {
        info!(canteen = %name, canteen_type = %kind, rows, "Modeling rows per canteen");
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use polars::prelude::df;

    use super::*;
    use crate::error::ForecastError;

    #[test]
    fn cross_product_rejects_shared_columns() {
        let a = df!["col_1" => ["1", "2", "3"], "col_2" => ["a", "a", "b"]].expect("a");
        let b = df!["col_3" => ["10", "20"], "col_2" => ["a", "a"]].expect("b");

        let result = cross_product(&b, &a);
        assert!(matches!(
            result,
            Err(ForecastError::Data(DataError::OverlappingColumns(cols))) if cols == vec!["col_2".to_string()]
        ));
    }

    #[test]
    fn cross_product_pairs_every_row() {
        let a = df!["col_1" => ["1", "2", "3"], "col_2" => ["a", "a", "b"]].expect("a");
        let b = df!["col_3" => ["10", "20"], "col_4" => ["c", "c"]].expect("b");

        let crossed = cross_product(&b, &a).expect("cross");
        assert_eq!(crossed.height(), 6);
        assert_eq!(crossed.width(), 4);

        let col_3 = crossed
            .column("col_3")
            .expect("col_3")
            .str()
            .expect("str")
            .into_no_null_iter()
            .collect::<Vec<_>>();
        assert_eq!(col_3, vec!["10", "10", "10", "20", "20", "20"]);
        let col_1 = crossed
            .column("col_1")
            .expect("col_1")
            .str()
            .expect("str")
            .into_no_null_iter()
            .collect::<Vec<_>>();
        assert_eq!(col_1, vec!["1", "2", "3", "1", "2", "3"]);
    }

    #[test]
    fn inactive_days_get_zero_attendance() {
        let df = df![
            "working" => [0_i64, 1, 1, 0],
            "wednesday" => [0_i64, 0, 1, 0],
            "forecast" => [None, None, None, Some(4.0)],
            "actual" => [None, Some(3.0), None, None],
        ]
        .expect("frame");

        let filled = fill_inactive_days(df.lazy())
            .collect()
            .expect("collect");

        let forecast = filled
            .column("forecast")
            .expect("forecast")
            .f64()
            .expect("f64")
            .into_iter()
            .collect::<Vec<_>>();
        assert_eq!(forecast, vec![Some(0.0), None, Some(0.0), Some(4.0)]);
        let actual = filled
            .column("actual")
            .expect("actual")
            .f64()
            .expect("f64")
            .into_iter()
            .collect::<Vec<_>>();
        assert_eq!(actual, vec![Some(0.0), Some(3.0), Some(0.0), Some(0.0)]);
    }

    #[test]
    fn filtering_one_canteen_gives_back_the_calendar() {
        let dates = ["2019-05-06", "2019-05-07", "2019-05-08"]
            .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid date"));
        let calendar = CalendarTable::from_dates(&dates, "%Y-%m-%d").expect("calendar");
        let canteens = df![
            "canteen_name" => ["Jules Verne", "Victor Hugo"],
            "canteen_type" => ["G", "M"],
            "sector" => ["nord", "sud"],
        ]
        .expect("canteens");

        let crossed = cross_product(calendar.as_df(), &canteens).expect("cross");
        assert_eq!(crossed.height(), 6);

        let back = crossed
            .lazy()
            .filter(col("canteen_name").eq(lit("Victor Hugo")))
            .select([col("date_index"), col("date_str")])
            .collect()
            .expect("filter");
        assert!(back.equals(calendar.as_df()));
    }
}
