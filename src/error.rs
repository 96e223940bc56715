//! Centralized error types for threadbook.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the threadbook library.
#[derive(Error, Debug)]
pub enum BookError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified input file does not exist.
    #[error("Input not found: {0}")]
    FileNotFound(PathBuf),

    /// A curation state file exists but cannot be parsed (e.g. truncated by a crash mid-write).
    #[error("Corrupt state file '{path}': {reason}")]
    CorruptState { path: PathBuf, reason: String },

    /// A normalized content document cannot be parsed.
    #[error("Invalid content document '{path}': {reason}")]
    InvalidDocument { path: PathBuf, reason: String },

    /// The notes export is not well-formed XML.
    #[error("Notes export error in '{path}': {reason}")]
    NotesXml { path: PathBuf, reason: String },

    /// A serialization error while writing JSON.
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// A redaction pattern from the configuration does not compile.
    #[error("Invalid redaction pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The published `images/` directory would be the image store or nested with it.
    #[error("Output images '{output}' overlap the image store '{store}'")]
    OutputOverlapsStore { output: PathBuf, store: PathBuf },
}

/// Convenience alias for `Result<T, BookError>`.
pub type Result<T> = std::result::Result<T, BookError>;

impl BookError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Map a read error to `FileNotFound` when the path is missing, `Io` otherwise.
    pub fn from_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound(path)
        } else {
            Self::Io { path, source }
        }
    }
}
