use thiserror::Error;

/// Structural failures that abort a run. Malformed cell values never end up
/// here; they are cleaned to missing values instead.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema mismatch: column '{column}' not found in input")]
    SchemaMismatch { column: String },

    #[error("Invalid group key '{column}': {reason}")]
    InvalidGroupKey { column: String, reason: String },

    #[error("Invalid measure '{column}': {reason}")]
    InvalidMeasure { column: String, reason: String },

    #[error("Column collision: more than one header trims to '{name}'")]
    ColumnCollision { name: String },
}

pub type Result<T> = std::result::Result<T, EtlError>;
