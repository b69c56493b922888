use canteen_forecast::prelude::*;
use chrono::NaiveDate;
use polars::prelude::*;

mod common;

use common::{f64_at, f64_column, i64_at, rows_on, setup_pipeline, str_at};

/**
 * Fixture data (tests/fixtures/data):
 *  - two canteens, "Jules Verne" (G, fed by two sites and two schools) and "Victor Hugo" (M)
 *  - summer holidays end 2017-09-03, Toussaint holidays run 2017-10-21..2017-11-05
 *  - school year 2017-2018 starts 2017-09-04, strike on 2017-09-12
 *  - attendance reported on 2017-09-04, 09-05 and 09-07; site "LYCEE" maps to no canteen
 */

#[test]
fn calendar_covers_range_plus_lookahead_once() {
    let (_staging, pipeline) = setup_pipeline();
    let calendar = pipeline
        .build_calendar("2017-09-01", "2017-09-05")
        .expect("calendar");

    // 2017-09-01 ..= 2017-09-05 + 10 weeks
    let last = NaiveDate::from_ymd_opt(2017, 11, 14).expect("date");
    let first = NaiveDate::from_ymd_opt(2017, 9, 1).expect("date");
    let expected = (last - first).num_days() as usize + 1;
    assert_eq!(calendar.height(), expected);

    let dates = calendar.dates().expect("dates");
    assert_eq!(dates.first(), Some(&first));
    assert_eq!(dates.last(), Some(&last));
    assert!(dates.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn summer_holiday_ends_and_school_starts() {
    let (_staging, pipeline) = setup_pipeline();
    let calendar = pipeline
        .build_calendar("2017-09-01", "2017-09-05")
        .expect("calendar");
    let df = calendar.as_df();

    let summer = rows_on(df, "2017-09-01", None);
    assert_eq!(str_at(&summer, "holiday_name", 0), "Vacances d'Ete");
    assert_eq!(i64_at(&summer, "holidays_in", 0), 0);
    assert_eq!(i64_at(&summer, "holidays_ago", 0), 0);
    assert_eq!(str_at(&summer, "school_year", 0), "ete");
    assert_eq!(i64_at(&summer, "working", 0), 0);

    let rentree = rows_on(df, "2017-09-04", None);
    assert_eq!(str_at(&rentree, "holiday_name", 0), "ecole");
    assert_eq!(i64_at(&rentree, "holidays_in", 0), 47);
    assert_eq!(i64_at(&rentree, "holidays_ago", 0), 1);
    assert_eq!(str_at(&rentree, "school_year", 0), "2017-2018");
    assert_eq!(i64_at(&rentree, "working", 0), 1);
    assert_eq!(i64_at(&rentree, "porc", 0), 1);
    assert_eq!(i64_at(&rentree, "has_menu", 0), 1);

    let toussaint = rows_on(df, "2017-11-01", None);
    assert_eq!(str_at(&toussaint, "non_working_name", 0), "Toussaint");
    assert_eq!(i64_at(&toussaint, "working", 0), 0);

    let strike = rows_on(df, "2017-09-12", None);
    assert_eq!(i64_at(&strike, "strike", 0), 1);
    assert_eq!(i64_at(&strike, "working", 0), 1);

    let wednesday = rows_on(df, "2017-09-06", None);
    assert_eq!(i64_at(&wednesday, "wednesday", 0), 1);
    assert_eq!(i64_at(&wednesday, "working", 0), 0);
}

#[test]
fn modeling_table_pairs_every_day_with_every_canteen() {
    let (_staging, pipeline) = setup_pipeline();
    let calendar = pipeline
        .build_calendar("2017-09-01", "2017-09-05")
        .expect("calendar");
    let table = pipeline
        .preprocess("2017-09-01", "2017-09-05")
        .expect("modeling table");

    assert_eq!(table.height(), calendar.height() * 2);
    let counts = table.canteen_row_counts().expect("row counts");
    assert_eq!(counts.len(), 2);
    assert!(counts.values().all(|&n| n == calendar.height()));
}

#[test]
fn one_canteen_slice_reproduces_the_calendar() {
    let (_staging, pipeline) = setup_pipeline();
    let calendar = pipeline
        .build_calendar("2017-09-01", "2017-09-05")
        .expect("calendar");
    let table = pipeline
        .preprocess("2017-09-01", "2017-09-05")
        .expect("modeling table");

    let keys = ["date_index", "date_str", "holidays_in", "working"];
    let slice = table
        .as_df()
        .clone()
        .lazy()
        .filter(col("canteen_name").eq(lit("Victor Hugo")))
        .select(keys.iter().map(|k| col(*k)).collect::<Vec<_>>())
        .collect()
        .expect("canteen slice");
    let expected = calendar
        .as_df()
        .select(keys)
        .expect("calendar columns");
    assert!(slice.equals(&expected));
}

#[test]
fn attendance_and_enrollment_are_summed_per_canteen() {
    let (_staging, pipeline) = setup_pipeline();
    let table = pipeline
        .preprocess("2017-09-01", "2017-09-05")
        .expect("modeling table");
    let df = table.as_df();

    let verne = rows_on(df, "2017-09-04", Some("Jules Verne"));
    assert_eq!(verne.height(), 1);
    assert_eq!(f64_at(&verne, "forecast", 0), Some(100.0));
    assert_eq!(f64_at(&verne, "actual", 0), Some(93.0));
    assert_eq!(f64_at(&verne, "headcount", 0), Some(300.0));
    assert_eq!(str_at(&verne, "sector", 0), "nord");

    let hugo = rows_on(df, "2017-09-05", Some("Victor Hugo"));
    assert_eq!(f64_at(&hugo, "actual", 0), Some(0.0));
    assert_eq!(f64_at(&hugo, "headcount", 0), Some(80.0));

    // Wednesdays and weekends are zero-filled, unreported working days stay missing
    let wednesday = rows_on(df, "2017-09-06", None);
    assert_eq!(f64_column(&wednesday, "forecast"), vec![Some(0.0); 2]);
    assert_eq!(f64_column(&wednesday, "actual"), vec![Some(0.0); 2]);
    let thursday = rows_on(df, "2017-09-07", Some("Jules Verne"));
    assert_eq!(f64_at(&thursday, "actual", 0), None);

    // no enrollment outside of a school year
    let summer = rows_on(df, "2017-09-01", Some("Victor Hugo"));
    assert_eq!(f64_at(&summer, "headcount", 0), None);
}

#[test]
fn prepare_is_idempotent() {
    let (_staging_first, first) = setup_pipeline();
    let (_staging_second, second) = setup_pipeline();

    let (_, path_a) = first.prepare("2017-09-01", "2017-09-05").expect("first run");
    let (_, path_b) = second.prepare("2017-09-01", "2017-09-05").expect("second run");

    assert_eq!(
        path_a.file_name().and_then(|n| n.to_str()),
        Some("prepared_data_2017-09-01_2017-09-05.csv")
    );
    let bytes_a = std::fs::read(&path_a).expect("first file");
    let bytes_b = std::fs::read(&path_b).expect("second file");
    assert!(!bytes_a.is_empty());
    assert_eq!(bytes_a, bytes_b);
}

#[test]
fn interval_forecast_from_persisted_table() {
    let (_staging, pipeline) = setup_pipeline();
    pipeline
        .prepare("2017-09-01", "2017-09-22")
        .expect("prepared table");

    let regressor = QuantileInterval::new(GroupQuantile::default(), 0.8).expect("interval");
    let forecast = pipeline
        .train_and_predict(
            "2017-09-01",
            "2017-09-18",
            "2017-09-22",
            &regressor,
            Target::Actual,
            FilterPolicy::default(),
        )
        .expect("forecast");

    assert_eq!(
        forecast.base_name(),
        "results_detailed_actual_2017-09-18_2017-09-22"
    );
    let df = forecast.as_df();
    assert_eq!(df.height(), 10);

    // Jules Verne trained on 93 and 98, Victor Hugo on 29 and 30 (the 0 is filtered out)
    assert_eq!(
        f64_column(df, "output"),
        vec![
            Some(98.0),
            Some(30.0),
            Some(98.0),
            Some(30.0),
            Some(0.0),
            Some(0.0),
            Some(98.0),
            Some(30.0),
            Some(98.0),
            Some(30.0),
        ]
    );
    assert_eq!(f64_at(df, "pred_lower_bound", 0), Some(94.0));
    assert_eq!(f64_at(df, "pred_upper_bound", 0), Some(98.0));
    assert_eq!(f64_column(df, "actual"), vec![Some(0.0); 10]);
    assert_eq!(forecast.importances().len(), 1);
}

#[test]
fn export_writes_summaries_and_importances() {
    let (staging, pipeline) = setup_pipeline();
    pipeline
        .prepare("2017-09-01", "2017-09-22")
        .expect("prepared table");
    let regressor = QuantileInterval::new(GroupQuantile::default(), 0.8).expect("interval");
    let forecast = pipeline
        .train_and_predict(
            "2017-09-01",
            "2017-09-18",
            "2017-09-22",
            &regressor,
            Target::Actual,
            FilterPolicy::default(),
        )
        .expect("forecast");

    let files = forecast.export(staging.path()).expect("export");
    for path in [&files.detailed, &files.global, &files.by_canteen, &files.importances] {
        assert!(path.starts_with(staging.path()));
        assert!(path.exists(), "{} was not written", path.display());
    }
    assert_eq!(
        files.global.file_name().and_then(|n| n.to_str()),
        Some("results_global_actual_2017-09-18_2017-09-22.csv")
    );
    assert_eq!(
        files.by_canteen.file_name().and_then(|n| n.to_str()),
        Some("results_by_cafeteria_actual_2017-09-18_2017-09-22.csv")
    );

    let global = forecast.summary(SummaryLevel::Global).expect("global");
    assert_eq!(global.height(), 5);
    assert_eq!(
        f64_column(global.as_df(), "output"),
        vec![Some(128.0), Some(128.0), Some(0.0), Some(128.0), Some(128.0)]
    );

    let by_canteen = forecast.summary(SummaryLevel::ByCanteen).expect("by canteen");
    assert_eq!(by_canteen.height(), 10);
    assert_eq!(
        f64_column(by_canteen.as_df(), "output"),
        f64_column(forecast.as_df(), "output")
    );

    let importances = std::fs::read_to_string(&files.importances).expect("importances");
    assert_eq!(importances, "site_id: 1\n");
}

#[test]
fn staging_directory_is_removed_with_its_guard() {
    let (staging, pipeline) = setup_pipeline();
    let (_, path) = pipeline
        .prepare("2017-09-01", "2017-09-05")
        .expect("prepared table");
    assert!(path.starts_with(staging.path()));
    assert!(path.exists());

    let root = staging.path().to_path_buf();
    drop(staging);
    assert!(!root.exists());
    assert!(!path.exists());
}

#[test]
fn train_and_predict_requires_a_prepared_table() {
    let (_staging, pipeline) = setup_pipeline();
    let result = pipeline.train_and_predict(
        "2017-09-01",
        "2017-09-18",
        "2017-09-22",
        &StatisticalBaseline::new(Target::Actual),
        Target::Actual,
        FilterPolicy::default(),
    );
    assert!(matches!(
        result,
        Err(ForecastError::Io(IoError::ReadFailed(_)))
    ));
}

#[test]
fn inconsistent_windows_are_rejected_before_reading() {
    let (_staging, pipeline) = setup_pipeline();
    let result = pipeline.train_and_predict(
        "2017-09-15",
        "2017-09-18",
        "2017-09-22",
        &StatisticalBaseline::new(Target::Actual),
        Target::Actual,
        FilterPolicy::default(),
    );
    assert!(matches!(
        result,
        Err(ForecastError::Date(DateError::InconsistentDates(_)))
    ));
}
