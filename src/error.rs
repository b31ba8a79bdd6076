//! Error types for gtplanner.

use std::path::PathBuf;

/// Errors raised while constructing a [`Repository`](crate::repository::Repository).
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The image was produced for a different format version.
    #[error("data version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    /// The buffer is not a whole number of words or is shorter than the header.
    #[error("image truncated: {len} bytes")]
    Truncated { len: usize },

    /// A top-level table pointer points outside the image.
    #[error("table {table} points outside the image (offset {offset})")]
    BadTable { table: &'static str, offset: u32 },
}

/// Errors raised while building, solving or applying a project.
///
/// These never reach the user through [`Calculator::update`](crate::calculator::Calculator::update),
/// which logs them and keeps the previous results.
#[derive(Debug, thiserror::Error)]
pub enum CalculatorError {
    /// The LP solver failed to produce a result at all.
    #[error("solver failed: {0}")]
    Solver(String),

    /// A recipe produced a NaN or infinite coefficient.
    #[error("recipe '{recipe_id}' produced a non-finite coefficient")]
    NonFinite { recipe_id: String },
}

/// Errors raised while reading or writing project and image files.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
