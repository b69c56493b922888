//! Canteen entities and the observations keyed on them.

use polars::prelude::{
    DataFrame, DataType, Expr, IntoLazy, JoinArgs, JoinType, LazyFrame, SortMultipleOptions,
    UniqueKeepStrategy, col, lit,
};
use tracing::debug;

use crate::{
    calendar::CalendarCol,
    error::ForecastResult,
    modeling::{ENTITY_KEY, ModelingCol},
    polars_ext::LazyFrameExt,
    source::{DataSource, Dataset},
};

/// Entity tables the join engine attaches to the calendar.
#[derive(Debug, Clone)]
pub struct Entities {
    /// `canteen_name, canteen_type, sector`, one row per canteen.
    pub canteens: DataFrame,
    /// `canteen_name, canteen_type, date_str, forecast, actual`, one row per canteen and day.
    pub attendance: DataFrame,
    /// `school_year, canteen_name, canteen_type, headcount`, one row per canteen and school year.
    pub enrollment: DataFrame,
}

impl Entities {
    /// Loads the canteens and resolves attendance and enrollment to canteen identity.
    #[tracing::instrument(skip_all)]
    pub fn load(source: &dyn DataSource, allow_list: Option<&[String]>) -> ForecastResult<Self> {
        let canteens = canteen_table(source.load(Dataset::Canteens)?, allow_list)?;
        let attendance = aggregate_attendance(
            source.load(Dataset::Attendance)?,
            source.load(Dataset::SiteCanteenMapping)?,
        )?;
        let enrollment = aggregate_enrollment(
            source.load(Dataset::Enrollment)?,
            source.load(Dataset::SchoolCanteenMapping)?,
        )?;

        debug!(
            canteens = canteens.height(),
            attendance = attendance.height(),
            enrollment = enrollment.height(),
            "Loaded entities"
        );
        Ok(Self {
            canteens,
            attendance,
            enrollment,
        })
    }
}

fn text(name: &str) -> Expr {
    col(name).cast(DataType::String)
}

fn mapped(lf: LazyFrame) -> LazyFrame {
    lf.filter(
        col(ModelingCol::CanteenName)
            .is_not_null()
            .and(col(ModelingCol::CanteenType).is_not_null()),
    )
}

/// Renames the raw canteen reference and keeps the allowed names.
pub fn canteen_table(raw: DataFrame, allow_list: Option<&[String]>) -> ForecastResult<DataFrame> {
    let mut lf = raw.lazy().select([
        text("name").alias(ModelingCol::CanteenName.as_str()),
        text("type").alias(ModelingCol::CanteenType.as_str()),
        text("sector").alias(ModelingCol::Sector.as_str()),
    ]);
    if let Some(names) = allow_list {
        let allowed = names.iter().fold(lit(false), |acc, name| {
            acc.or(col(ModelingCol::CanteenName).eq(lit(name.as_str())))
        });
        lf = lf.filter(allowed);
    }

    lf.unique_stable(None, UniqueKeepStrategy::First)
        .collect_with("building the canteen table")
}

/// Sums raw attendance per canteen and day.
///
/// Sites are resolved through the site mapping; rows of unmapped sites are dropped.
pub fn aggregate_attendance(raw: DataFrame, site_mapping: DataFrame) -> ForecastResult<DataFrame> {
    let mapping = site_mapping
        .lazy()
        .select([
            text("site_name"),
            text("site_type"),
            text("canteen_name").alias(ModelingCol::CanteenName.as_str()),
            text("canteen_type").alias(ModelingCol::CanteenType.as_str()),
        ])
        .unique_stable(None, UniqueKeepStrategy::First);

    let observations = raw.lazy().select([
        text("date").alias(CalendarCol::DateStr.as_str()),
        text("site_name"),
        text("site_type"),
        col("forecast")
            .cast(DataType::Float64)
            .alias(ModelingCol::Forecast.as_str()),
        col("actual")
            .cast(DataType::Float64)
            .alias(ModelingCol::Actual.as_str()),
    ]);

    let mut keys = ENTITY_KEY.map(col).to_vec();
    keys.push(col(CalendarCol::DateStr));

    mapped(observations.join(
        mapping,
        [col("site_name"), col("site_type")],
        [col("site_name"), col("site_type")],
        JoinArgs::new(JoinType::Left),
    ))
    .group_by_stable(keys)
    .agg([
        col(ModelingCol::Forecast).sum(),
        col(ModelingCol::Actual).sum(),
    ])
    .sort(
        [
            ModelingCol::CanteenName.as_str(),
            ModelingCol::CanteenType.as_str(),
            CalendarCol::DateStr.as_str(),
        ],
        SortMultipleOptions::default(),
    )
    .collect_with("aggregating attendance")
}

/// Sums enrollment per school year and canteen.
///
/// Schools are resolved through the school mapping; unmapped schools are dropped.
pub fn aggregate_enrollment(raw: DataFrame, school_mapping: DataFrame) -> ForecastResult<DataFrame> {
    let mapping = school_mapping
        .lazy()
        .select([
            text("school"),
            text("canteen_name").alias(ModelingCol::CanteenName.as_str()),
            text("canteen_type").alias(ModelingCol::CanteenType.as_str()),
        ])
        .unique_stable(None, UniqueKeepStrategy::First);

    let records = raw.lazy().select([
        text("school"),
        text("school_year").alias(CalendarCol::SchoolYear.as_str()),
        col("headcount")
            .cast(DataType::Float64)
            .alias(ModelingCol::Headcount.as_str()),
    ]);

    let mut keys = vec![col(CalendarCol::SchoolYear)];
    keys.extend(ENTITY_KEY.map(col));

    mapped(records.join(
        mapping,
        [col("school")],
        [col("school")],
        JoinArgs::new(JoinType::Left),
    ))
    .group_by_stable(keys)
    .agg([col(ModelingCol::Headcount).sum()])
    .sort(
        [
            CalendarCol::SchoolYear.as_str(),
            ModelingCol::CanteenName.as_str(),
            ModelingCol::CanteenType.as_str(),
        ],
        SortMultipleOptions::default(),
    )
    .collect_with("aggregating enrollment")
}
