use std::{env, fs, path::PathBuf, time::Instant};

use anyhow::{Context, Result, bail};
use canteen_forecast::prelude::*;
use time::macros::format_description;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Usage: `preprocess <data_dir> <begin_training> <begin_prediction> <end_prediction>`
fn main() -> Result<()> {
    let _guard = init_tracing()?;

    let args = env::args().skip(1).collect::<Vec<_>>();
    let [data_dir, begin_training, begin_prediction, end_prediction] = args.as_slice() else {
        bail!("usage: preprocess <data_dir> <begin_training> <begin_prediction> <end_prediction>");
    };

    let source = DataDir::new(data_dir);
    let missing = source.missing_inputs();
    if !missing.is_empty() {
        bail!("missing input files: {}", missing.join(", "));
    }

    let pipeline = Pipeline::new(source, PipelineConfig::default())
        .with_staging_dir(PathBuf::from("output/staging"));

    let prepare_start = Instant::now();
    let (table, path) = pipeline.prepare(begin_training, end_prediction)?;
    let prepare_time = prepare_start.elapsed();

    let forecast_start = Instant::now();
    let forecast = pipeline.train_and_predict(
        begin_training,
        begin_prediction,
        end_prediction,
        &StatisticalBaseline::new(Target::Actual),
        Target::Actual,
        FilterPolicy::default(),
    )?;
    let forecast_time = forecast_start.elapsed();
    let files = forecast.export("output")?;

    println!("\n--- Preprocessing ---");
    println!("Modeling rows:           {}", table.height());
    println!("Modeling table:          {}", path.display());
    println!("Predictions:             {}", files.detailed.display());
    println!("Daily totals:            {}", files.global.display());
    println!("Canteen totals:          {}", files.by_canteen.display());
    println!("Feature importances:     {}", files.importances.display());
    println!("1. Preprocessing time:   {prepare_time:?}");
    println!("2. Forecast time:        {forecast_time:?}");

    drop(_guard);

    Ok(())
}

// ================================================================================================
// Tracing Configuration
// ================================================================================================

fn init_tracing() -> Result<Option<WorkerGuard>> {
    let app_name = "canteen_forecast";

    let in_container =
        env::var("CONTAINER").is_ok() || std::path::Path::new("/.dockerenv").exists();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if in_container {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_span_events(tracing_subscriber::fmt::format::FmtSpan::NONE)
            .with_current_span(true)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .init();

        info!("Logging to stdout (container mode)");
        Ok(None)
    } else {
        let log_dir = dirs::state_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".local/state")))
            .context("Failed to find a state directory")?
            .join(app_name)
            .join("logs");
        fs::create_dir_all(&log_dir)?;

        let timestamp = time::OffsetDateTime::now_utc()
            .format(&format_description!(
                "[year][month][day]-[hour][minute][second]"
            ))
            .context("Failed to format timestamp")?;
        let file_name = format!("{app_name}-{timestamp}.log");
        let file_path = log_dir.join(&file_name);

        let file_appender = tracing_appender::rolling::never(&log_dir, &file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(non_blocking)
            .with_span_events(tracing_subscriber::fmt::format::FmtSpan::NONE)
            .with_current_span(true)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .init();

        info!(log_file = %file_path.display(), "Logging to file (local mode)");
        Ok(Some(guard))
    }
}
