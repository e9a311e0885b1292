//! Error types for tutorial-pack

use std::path::PathBuf;
use thiserror::Error;

/// Result type for pack operations
pub type PackResult<T> = Result<T, PackError>;

/// Errors that can occur while packing or reading a tutorial container
#[derive(Error, Debug)]
pub enum PackError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Base executable missing or unreadable
    #[error("Base image unreadable: {path}: {source}")]
    BaseImageUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Output location cannot be written
    #[error("Output path not writable: {path}: {source}")]
    OutputUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Two payload items share an id
    #[error("Duplicate item id: {0}")]
    DuplicateId(String),

    /// A path-based payload source does not exist
    #[error("Payload source not found: {0}")]
    SourceNotFound(PathBuf),

    /// A step that runs on the base image before payload append failed
    #[error("External step failed: {0}")]
    ExternalStep(String),

    /// Footer magic matched but the manifest is damaged or inconsistent
    #[error("Corrupt embedded manifest: {0}")]
    CorruptManifest(String),

    /// Requested item id is not in the manifest
    #[error("Unknown item: {0}")]
    UnknownItem(String),

    /// A block ended before its recorded size
    #[error("Short read for {what}: expected {expected} bytes, got {actual}")]
    ShortRead {
        what: String,
        expected: u64,
        actual: u64,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Icon processing error
    #[error("Icon error: {0}")]
    Icon(String),

    /// Resource editing error (rcedit)
    #[error("Resource edit error: {0}")]
    ResourceEdit(String),
}

impl PackError {
    /// True when the error means a container was found but its payload is damaged
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            PackError::CorruptManifest(_) | PackError::ShortRead { .. }
        )
    }

    pub(crate) fn short_read(what: impl Into<String>, expected: u64, actual: u64) -> Self {
        PackError::ShortRead {
            what: what.into(),
            expected,
            actual,
        }
    }
}
