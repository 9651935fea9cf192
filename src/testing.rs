//! Shared helpers for unit tests.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{ClientRecord, Decision, LimiterStore};

pub const MINUTE: Duration = Duration::from_secs(60);

/// The UTC instant `secs` seconds after the epoch.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

/// A store whose backend is always down.
pub struct UnreachableStore;

fn unreachable<T>() -> Result<T> {
    Err(TurnstileError::StoreUnavailable("connection refused".to_string()))
}

impl LimiterStore for UnreachableStore {
    fn check(&self, _: &str, _: u64, _: Duration, _: DateTime<Utc>) -> Result<Decision> {
        unreachable()
    }

    fn record(&self, _: &str) -> Result<Option<ClientRecord>> {
        unreachable()
    }

    fn len(&self) -> Result<usize> {
        unreachable()
    }

    fn remove(&self, _: &str) -> Result<Option<ClientRecord>> {
        unreachable()
    }

    fn clear(&self) -> Result<()> {
        unreachable()
    }

    fn evict_idle(&self, _: DateTime<Utc>, _: Duration, _: Duration) -> Result<usize> {
        unreachable()
    }
}
