//! Feature engineering and train/predict splitting for daily school-canteen attendance.
//!
//! A run turns reference data (school calendars, public holidays, strikes, menus) and raw
//! observations (attendance, enrollment) into one modeling table with a row per canteen
//! and per day. The [`pipeline::Pipeline`] drives the stages:
//!
//! 1. [`calendar`] builds the day index and attaches the temporal features.
//! 2. [`modeling`] crosses it with the canteens, joins the observations, derives seasonal
//!    baselines and outlier flags, and later slices it into training and prediction rows.
//! 3. [`model`] hands the feature matrix to a [`model::Regressor`].

pub mod calendar;
pub mod config;
pub mod error;
pub mod model;
pub mod modeling;
pub mod pipeline;
mod polars_ext;
pub mod prelude;
pub mod source;
pub mod table;

pub use polars_ext::ExprExt;
