#![allow(dead_code)]

use std::path::PathBuf;

use canteen_forecast::prelude::*;
use polars::prelude::*;
use tempfile::TempDir;

pub fn setup_data_dir() -> DataDir {
    DataDir::new(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/data"))
}

/// Pipeline over the fixture data staging into a fresh directory.
///
/// The directory lives as long as the returned guard.
pub fn setup_pipeline() -> (TempDir, Pipeline<DataDir>) {
    let staging = TempDir::new().expect("staging dir");
    let pipeline = Pipeline::new(setup_data_dir(), PipelineConfig::default())
        .with_staging_dir(staging.path());
    (staging, pipeline)
}

/// Rows of `df` for one day, optionally restricted to one canteen.
pub fn rows_on(df: &DataFrame, date: &str, canteen: Option<&str>) -> DataFrame {
    let mut predicate = col("date_str").eq(lit(date));
    if let Some(name) = canteen {
        predicate = predicate.and(col("canteen_name").eq(lit(name)));
    }
    df.clone()
        .lazy()
        .filter(predicate)
        .collect()
        .expect("filtered rows")
}

pub fn str_at(df: &DataFrame, column: &str, idx: usize) -> String {
    df.column(column)
        .expect("column")
        .str()
        .expect("str column")
        .get(idx)
        .expect("non-null value")
        .to_string()
}

pub fn i64_at(df: &DataFrame, column: &str, idx: usize) -> i64 {
    df.column(column)
        .expect("column")
        .cast(&DataType::Int64)
        .expect("cast")
        .i64()
        .expect("i64 column")
        .get(idx)
        .expect("non-null value")
}

pub fn f64_at(df: &DataFrame, column: &str, idx: usize) -> Option<f64> {
    df.column(column)
        .expect("column")
        .cast(&DataType::Float64)
        .expect("cast")
        .f64()
        .expect("f64 column")
        .get(idx)
}

pub fn f64_column(df: &DataFrame, column: &str) -> Vec<Option<f64>> {
    df.column(column)
        .expect("column")
        .cast(&DataType::Float64)
        .expect("cast")
        .f64()
        .expect("f64 column")
        .into_iter()
        .collect()
}
