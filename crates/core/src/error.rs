//! Error types for rengis

use thiserror::Error;

/// Main error type for rengis operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    /// Neighborhood window size that is even or smaller than 3
    #[error("Invalid window size {size}: must be odd and >= 3")]
    InvalidWindowSize { size: i64 },

    /// A named grid is absent from the workspace, or holds no valid cells
    #[error("Missing input '{name}': {reason}")]
    MissingInput { name: String, reason: String },

    /// Two grids combined in one operation differ in extent, resolution or CRS
    #[error("Grid mismatch between '{left}' and '{right}': {reason}")]
    GridMismatch {
        left: String,
        right: String,
        reason: String,
    },

    /// A reclassification stage names a grid that does not exist
    #[error("Rule stage {stage} references missing grid '{grid}'")]
    RuleReferencesMissingGrid { stage: usize, grid: String },

    #[error("Invalid rule at line {line}: {reason}")]
    InvalidRule { line: usize, reason: String },

    #[error("Output '{0}' already exists and overwrite is disabled")]
    OutputExists(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for [`Error::MissingInput`]
    pub fn missing(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MissingInput {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for rengis operations
pub type Result<T> = std::result::Result<T, Error>;
