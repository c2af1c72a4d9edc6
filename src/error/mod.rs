//! Error handling module for Killmark

use thiserror::Error;

use crate::domain::errors::DomainError;

/// Main error type for Killmark operations
#[derive(Error, Debug)]
pub enum KillmarkError {
    /// Configuration file could not be read or parsed
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Error raised by the detection/synthesis core
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for Killmark operations
pub type KillmarkResult<T> = std::result::Result<T, KillmarkError>;
