//! PT-018: Error type for the compiler, the stores and the CLI.

use crate::store::RemoteError;
use thiserror::Error;

/// Every failure the compiler can report.
///
/// Code generation never fails (it degrades to placeholders), so there is no
/// variant for it; `Input` covers hierarchy files that cannot be read as a tree.
#[derive(Error, Debug)]
pub enum Error {
    /// Hierarchy file could not be parsed or failed validation
    #[error("input error: {0}")]
    Input(String),

    /// Required parent context is missing for a step
    #[error("context error: {0}")]
    Context(String),

    /// A store call failed
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Post-commit readback could not find the committed project
    #[error("verification error: {0}")]
    Verification(String),

    /// YAML/JSON encode or decode failure
    #[error("serialize error: {0}")]
    Serialize(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Background commit task panicked or was cancelled
    #[error("worker error: {0}")]
    Worker(String),
}

/// Convenience Result type using prodtree Error
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_yaml_ng::Error> for Error {
    fn from(e: serde_yaml_ng::Error) -> Self {
        Self::Serialize(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialize(e.to_string())
    }
}
