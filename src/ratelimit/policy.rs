//! Limit policy and argument validation.

use std::time::Duration;

use crate::error::{Result, TurnstileError};

/// A validated limit: at most `limit` requests per `duration`.
///
/// A policy is immutable once built; a limiter keeps the same policy for its
/// whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitPolicy {
    limit: u64,
    duration: Duration,
}

impl LimitPolicy {
    /// Create a policy, rejecting a zero limit or a zero duration.
    pub fn new(limit: u64, duration: Duration) -> Result<Self> {
        validate_limit(limit, duration)?;
        Ok(Self { limit, duration })
    }

    /// Convenience constructor for whole-second windows.
    pub fn per_secs(limit: u64, secs: u64) -> Result<Self> {
        Self::new(limit, Duration::from_secs(secs))
    }

    /// Maximum admitted requests per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Window length.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

pub(crate) fn validate_limit(limit: u64, duration: Duration) -> Result<()> {
    if limit == 0 {
        return Err(TurnstileError::InvalidArgument(
            "limit must be greater than zero".to_string(),
        ));
    }
    if duration.is_zero() {
        return Err(TurnstileError::InvalidArgument(
            "duration must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_client_id(client_id: &str) -> Result<()> {
    if client_id.is_empty() {
        return Err(TurnstileError::InvalidArgument(
            "client id must not be empty".to_string(),
        ));
    }
    Ok(())
}
