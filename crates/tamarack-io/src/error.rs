//! I/O error types for tamarack-io.

use std::path::PathBuf;

use tamarack_trees::EtError;

/// Errors from reading and validating training CSV files.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Returned when the input file does not exist or is unreadable.
    #[error("cannot open file: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the CSV parser encounters a malformed record.
    #[error("CSV parse error in {path} at byte offset {offset}")]
    CsvParse {
        /// Path to the CSV file.
        path: PathBuf,
        /// Byte offset where the error occurred.
        offset: u64,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when the CSV file contains a header but zero data rows.
    #[error("empty dataset (no data rows) in {path}")]
    EmptyDataset {
        /// Path to the CSV file.
        path: PathBuf,
    },

    /// Returned when a data row has a different number of columns than the header.
    #[error(
        "wrong number of columns in {path}: row {row_index} has {got}, expected {expected}"
    )]
    InconsistentRowLength {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Expected number of columns (from the header).
        expected: usize,
        /// Actual number of columns in this row.
        got: usize,
    },

    /// Returned when a feature cell does not parse as a float.
    #[error(
        "cannot parse feature in {path}: row {row_index}, column {col_index}, raw value \"{raw}\""
    )]
    FeatureParse {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Zero-based column index in the file.
        col_index: usize,
        /// The raw cell that failed to parse.
        raw: String,
    },

    /// Returned when a feature cell parses but is NaN or infinite.
    #[error(
        "non-finite feature in {path}: row {row_index}, column {col_index}, raw value \"{raw}\""
    )]
    NonFiniteValue {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Zero-based column index in the file.
        col_index: usize,
        /// The raw cell value.
        raw: String,
    },

    /// Returned when a label cell does not parse as an integer.
    #[error(
        "cannot parse label in {path}: row {row_index}, column {col_index}, raw value \"{raw}\""
    )]
    LabelParse {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Zero-based column index in the file.
        col_index: usize,
        /// The raw cell that failed to parse.
        raw: String,
    },

    /// Returned when the named label column is absent from the header.
    #[error("label column \"{name}\" not found in {path}")]
    LabelColumnNotFound {
        /// Path to the CSV file.
        path: PathBuf,
        /// The requested label column name.
        name: String,
    },

    /// Returned when the label column is also listed for exclusion.
    #[error("label column \"{name}\" cannot be excluded")]
    LabelColumnExcluded {
        /// The label column name.
        name: String,
    },

    /// Returned when one or more excluded column names are absent from the header.
    #[error("excluded columns not found in {path}: {missing:?}")]
    ExcludedColumnsMissing {
        /// Path to the CSV file.
        path: PathBuf,
        /// The names that were not found.
        missing: Vec<String>,
    },

    /// Returned when no feature columns remain after label and exclusions.
    #[error("no feature columns remain in {path}")]
    NoFeatureColumns {
        /// Path to the CSV file.
        path: PathBuf,
    },

    /// Returned when the parsed rows fail example-set validation.
    #[error("invalid example set read from {path}")]
    InvalidExamples {
        /// Path to the CSV file.
        path: PathBuf,
        /// The underlying validation error.
        source: EtError,
    },
}
