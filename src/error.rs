use std::path::PathBuf;
use thiserror::Error;

/// Main error type for trajload
#[derive(Error, Debug)]
pub enum TrajloadError {
    /// One or more of the mandatory `lat`, `lon`, `time` columns is absent
    #[error("Missing header attributes: {0}")]
    MissingHeaderAttribute(String),

    /// A data row could not be decoded; aborts the rest of the file
    #[error("Row decode error at line {line}, column '{column}': {reason}")]
    RowDecode {
        line: u64,
        column: String,
        reason: String,
    },

    /// Input path is neither a file nor a directory
    #[error("File {} has not been found", .0.display())]
    PathNotFound(PathBuf),

    /// Configuration / parameter validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Delimited-text reader errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A schema migration could not be applied, or the database records a different one
    #[error("Migration {name} failed: {reason}")]
    Migration { name: String, reason: String },

    /// Annotation (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using TrajloadError
pub type Result<T> = std::result::Result<T, TrajloadError>;
