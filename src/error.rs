use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Run-level failures. Anything shaped like a finding in the scanned files is a
/// [`crate::diagnostic::DiagnosticRecord`], never one of these.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot scan {path}: {reason}")]
    Discovery { path: PathBuf, reason: String },

    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Report serialization error: {0}")]
    Report(#[from] serde_json::Error),
}

impl From<ConfigError> for ScanError {
    fn from(err: ConfigError) -> Self {
        ScanError::Configuration(err.to_string())
    }
}

impl ScanError {
    /// Process exit code for a run that could not complete.
    pub fn exit_code(&self) -> u8 {
        2
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ScanError>;
