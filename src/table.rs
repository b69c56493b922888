use std::{fs, path::Path};

use polars::prelude::{CsvWriter, DataFrame, SerWriter};

use crate::error::{ForecastResult, IoError};

// ================================================================================================
// Traits
// ================================================================================================

/// Common interface of the tables produced by the pipeline.
pub trait Table {
    /// Access the underlying DataFrame.
    fn as_df(&self) -> &DataFrame;
}

pub trait TableName {
    fn base_name(&self) -> String;

    fn filename(&self) -> String {
        format!("{}.csv", self.base_name())
    }
}

pub trait ToCsv {
    /// Writes the table to `dir`, creating the directory when missing and
    /// overwriting an existing file of the same name.
    ///
    /// Returns the path of the written file.
    fn to_csv(&self, dir: impl AsRef<Path>) -> ForecastResult<std::path::PathBuf>;
}

// ================================================================================================
// Blanket Implementations
// ================================================================================================

impl<T> ToCsv for T
where
    T: Table + TableName,
{
    fn to_csv(&self, dir: impl AsRef<Path>) -> ForecastResult<std::path::PathBuf> {
        let dir = dir.as_ref();
        let file_path = dir.join(self.filename());

        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| {
                IoError::FileSystem(format!(
                    "Failed to create directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        let mut file = fs::File::create(&file_path).map_err(|e| {
            IoError::WriteFailed(format!("Failed to create {}: {e}", file_path.display()))
        })?;

        let mut df = self.as_df().clone();
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)
            .map_err(|e| {
                IoError::WriteFailed(format!(
                    "Failed to write CSV to '{}': {e}",
                    file_path.display()
                ))
            })?;

        Ok(file_path)
    }
}
