use thiserror::Error;

pub type ForecastResult<T> = Result<T, ForecastError>;

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error(transparent)]
    Date(#[from] DateError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Split(#[from] SplitError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    System(#[from] SystemError),
}

/// Errors raised while parsing, formatting or validating dates.
#[derive(Debug, Error)]
pub enum DateError {
    #[error("Invalid date '{value}': {reason}")]
    InvalidDate { value: String, reason: String },

    #[error("Invalid date format: '{0}'")]
    Format(String),

    #[error("Unrecognized date attribute: '{0}'")]
    UnknownAttribute(String),

    #[error("Dates are inconsistent: {0}")]
    InconsistentDates(String),
}

/// Errors related to reference data, table shapes and join preconditions.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Data frame error: {0}")]
    DataFrame(String),

    #[error("Missing column '{column}' in {table}")]
    MissingColumn { column: String, table: String },

    #[error("Columns of tables to cross join overlap: {0:?}")]
    OverlappingColumns(Vec<String>),

    #[error("Reference intervals overlap: {first} and {second}")]
    OverlappingIntervals { first: String, second: String },

    #[error("Conflicting reference values for {date}: '{first}' and '{second}'")]
    ConflictingLabels {
        date: String,
        first: String,
        second: String,
    },

    #[error("No {direction} occurrence of '{event}' found for {date}")]
    NoOccurrence {
        event: String,
        date: String,
        direction: String,
    },

    #[error("No '{event}' date is known for year {year}, known years are {supported}")]
    UnsupportedYear {
        event: String,
        year: i32,
        supported: String,
    },

    #[error("Missing dataset: {0}")]
    MissingDataset(String),
}

/// Errors raised when the train/predict windows cannot be built.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error(
        "Training set is empty between {min_date} and {max_date}, please check your training dates regarding your data files"
    )]
    EmptyTrainingSet { min_date: String, max_date: String },

    #[error(
        "Prediction set is empty between {begin_date} and {end_date}, please check your prediction dates regarding your data files"
    )]
    MissingPredictionData {
        begin_date: String,
        end_date: String,
    },
}

/// Errors related to file I/O and serialization.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("IO operation failed")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed")]
    Json(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Failed to write data: {0}")]
    WriteFailed(String),

    #[error("Failed to read data: {0}")]
    ReadFailed(String),
}

/// Errors reported by the model collaborator.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model fit failed: {0}")]
    Fit(String),

    #[error("Model prediction failed: {0}")]
    Predict(String),

    #[error("Unknown column to predict: '{0}' (expected 'forecast' or 'actual')")]
    UnknownTarget(String),
}

/// Errors related to internal invariants.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}
