//! Error types for Turnstile.

use thiserror::Error;

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// A caller passed a zero limit, a zero duration or an empty client id.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The backing record store could not be reached.
    ///
    /// Only shared or persistent stores report this. The caller decides
    /// whether it admits or rejects, see [`crate::ratelimit::FailMode`].
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed request trace input
    #[error("Trace error on line {line}: {message}")]
    Trace { line: usize, message: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for TurnstileError {
    fn from(err: config::ConfigError) -> Self {
        TurnstileError::Config(err.to_string())
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
