//! Per-client window record and the fixed-window admission rule.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Rate limit state for a single client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientRecord {
    /// When the current counting window began
    pub window_start: DateTime<Utc>,
    /// Requests admitted since `window_start`
    pub count: u64,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Whether the request may proceed
    pub admitted: bool,
    /// The limit that was applied
    pub limit: u64,
    /// Requests still admissible in the current window
    pub remaining: u64,
    /// Time until the current window rolls over
    #[serde(serialize_with = "serialize_secs")]
    pub retry_after: Duration,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl ClientRecord {
    /// Start a fresh window at `now` holding one admitted request.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            count: 1,
        }
    }

    /// Time elapsed since the window started.
    ///
    /// A clock reading earlier than `window_start` counts as no time at all,
    /// which keeps `window_start` from ever moving backwards.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.window_start).to_std().unwrap_or(Duration::ZERO)
    }

    /// Whether a request at `now` belongs to a new window.
    pub fn window_expired(&self, now: DateTime<Utc>, duration: Duration) -> bool {
        self.elapsed(now) >= duration
    }

    /// Time left until the window ending at `window_start + duration`.
    pub fn duration_until_reset(&self, now: DateTime<Utc>, duration: Duration) -> Duration {
        duration.saturating_sub(self.elapsed(now))
    }

    /// Apply one request at `now` to this record.
    ///
    /// An expired window is restarted with the request counted as its first.
    /// Inside a live window the request is admitted only while `count < limit`,
    /// and a rejection leaves the record untouched.
    pub fn apply(&mut self, limit: u64, duration: Duration, now: DateTime<Utc>) -> Decision {
        let admitted = if self.window_expired(now, duration) {
            *self = ClientRecord::new(now);
            true
        } else if self.count < limit {
            self.count += 1;
            true
        } else {
            false
        };

        self.decision(admitted, limit, duration, now)
    }

    /// Build the decision describing this record after a request at `now`.
    pub(crate) fn decision(
        &self,
        admitted: bool,
        limit: u64,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Decision {
        Decision {
            admitted,
            limit,
            remaining: limit.saturating_sub(self.count),
            retry_after: self.duration_until_reset(now, duration),
        }
    }
}
