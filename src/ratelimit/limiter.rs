//! Rate limiter bound to one policy, one store and one clock.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use super::policy::LimitPolicy;
use super::record::Decision;
use super::store::{InMemoryStore, LimiterStore};
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, TurnstileError};

/// What to do with a request when the store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailMode {
    /// Admit the request
    Open,
    /// Reject the request
    #[default]
    Closed,
}

/// A rate limiter with a fixed policy.
///
/// The limiter owns its store through an `Arc` so housekeeping tasks and
/// other limiters can share it.
pub struct RateLimiter<S = InMemoryStore, C = SystemClock> {
    policy: LimitPolicy,
    store: Arc<S>,
    clock: C,
}

impl RateLimiter {
    /// Create a limiter backed by an in-memory store and the system clock.
    pub fn in_memory(policy: LimitPolicy) -> Self {
        Self::new(policy, Arc::new(InMemoryStore::new()), SystemClock)
    }
}

impl<S: LimiterStore, C: Clock> RateLimiter<S, C> {
    /// Create a limiter from its parts.
    pub fn new(policy: LimitPolicy, store: Arc<S>, clock: C) -> Self {
        Self {
            policy,
            store,
            clock,
        }
    }

    /// The policy this limiter enforces.
    pub fn policy(&self) -> LimitPolicy {
        self.policy
    }

    /// The underlying record store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The clock used by [`check`](Self::check) and [`admit`](Self::admit).
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Check a request for `client_id` at an explicit point in time.
    pub fn check_at(&self, client_id: &str, now: DateTime<Utc>) -> Result<Decision> {
        let decision = self.store.check(
            client_id,
            self.policy.limit(),
            self.policy.duration(),
            now,
        )?;

        trace!(
            client_id = %client_id,
            admitted = decision.admitted,
            remaining = decision.remaining,
            "Rate limit decision"
        );
        Ok(decision)
    }

    /// Admission decision for `client_id` at an explicit point in time.
    pub fn admit_at(&self, client_id: &str, now: DateTime<Utc>) -> Result<bool> {
        self.check_at(client_id, now).map(|d| d.admitted)
    }

    /// Check a request for `client_id` now, as read from the limiter's clock.
    pub fn check(&self, client_id: &str) -> Result<Decision> {
        self.check_at(client_id, self.clock.now())
    }

    /// Admission decision for `client_id` now.
    pub fn admit(&self, client_id: &str) -> Result<bool> {
        self.check(client_id).map(|d| d.admitted)
    }

    /// Check a request at `now`, resolving an unavailable store with `on_unavailable`.
    ///
    /// The fallback decision reports no remaining capacity and no retry hint,
    /// since the record could not be read. Invalid arguments are still
    /// returned as errors.
    pub fn check_or_at(
        &self,
        client_id: &str,
        now: DateTime<Utc>,
        on_unavailable: FailMode,
    ) -> Result<Decision> {
        match self.check_at(client_id, now) {
            Err(TurnstileError::StoreUnavailable(reason)) => {
                let admitted = on_unavailable == FailMode::Open;
                warn!(
                    client_id = %client_id,
                    reason = %reason,
                    mode = ?on_unavailable,
                    admitted,
                    "Record store unavailable, applying fail mode"
                );
                Ok(Decision {
                    admitted,
                    limit: self.policy.limit(),
                    remaining: 0,
                    retry_after: Duration::ZERO,
                })
            }
            other => other,
        }
    }

    /// Admission decision at `now` that resolves an unavailable store with `on_unavailable`.
    pub fn admit_or_at(
        &self,
        client_id: &str,
        now: DateTime<Utc>,
        on_unavailable: FailMode,
    ) -> Result<bool> {
        self.check_or_at(client_id, now, on_unavailable).map(|d| d.admitted)
    }

    /// Admission decision now that resolves an unavailable store with `on_unavailable`.
    pub fn admit_or(&self, client_id: &str, on_unavailable: FailMode) -> Result<bool> {
        self.admit_or_at(client_id, self.clock.now(), on_unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::{at, UnreachableStore};

    fn manual_limiter(limit: u64, secs: u64) -> RateLimiter<InMemoryStore, ManualClock> {
        RateLimiter::new(
            LimitPolicy::per_secs(limit, secs).unwrap(),
            Arc::new(InMemoryStore::new()),
            ManualClock::new(at(0)),
        )
    }

    #[test]
    fn test_limiter_follows_clock() {
        let limiter = manual_limiter(2, 60);

        assert!(limiter.admit("A").unwrap());
        limiter.clock().advance(Duration::from_secs(10));
        assert!(limiter.admit("A").unwrap());
        limiter.clock().advance(Duration::from_secs(10));
        assert!(!limiter.admit("A").unwrap());
        limiter.clock().set(at(60));

        let decision = limiter.check("A").unwrap();
        assert!(decision.admitted);
        assert_eq!(decision.remaining, 1);
        assert_eq!(decision.limit, 2);
    }

    #[test]
    fn test_explicit_time_ignores_clock() {
        let limiter = manual_limiter(1, 60);

        assert!(limiter.admit_at("A", at(1000)).unwrap());
        assert!(!limiter.admit_at("A", at(1059)).unwrap());
        assert!(limiter.admit_at("A", at(1060)).unwrap());
        assert_eq!(limiter.clock().now(), at(0));
    }

    #[test]
    fn test_rejected_decision_reports_retry_after() {
        let limiter = manual_limiter(1, 60);

        limiter.admit_at("A", at(0)).unwrap();
        let decision = limiter.check_at("A", at(45)).unwrap();
        assert!(!decision.admitted);
        assert_eq!(decision.retry_after, Duration::from_secs(15));
    }

    #[test]
    fn test_shared_store_between_limiters() {
        let store = Arc::new(InMemoryStore::new());
        let policy = LimitPolicy::per_secs(2, 60).unwrap();
        let first = RateLimiter::new(policy, Arc::clone(&store), ManualClock::new(at(0)));
        let second = RateLimiter::new(policy, Arc::clone(&store), ManualClock::new(at(0)));

        assert!(first.admit("A").unwrap());
        assert!(second.admit("A").unwrap());
        assert!(!first.admit("A").unwrap());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_empty_client_id_is_an_error() {
        let limiter = manual_limiter(1, 60);

        let err = limiter.admit_or("", FailMode::Open).unwrap_err();
        assert!(matches!(err, TurnstileError::InvalidArgument(_)));
    }

    #[test]
    fn test_unavailable_store_surfaces_error() {
        let limiter = RateLimiter::new(
            LimitPolicy::per_secs(1, 60).unwrap(),
            Arc::new(UnreachableStore),
            ManualClock::new(at(0)),
        );

        let err = limiter.admit("A").unwrap_err();
        assert!(matches!(err, TurnstileError::StoreUnavailable(_)));
    }

    #[test]
    fn test_fail_modes() {
        let limiter = RateLimiter::new(
            LimitPolicy::per_secs(1, 60).unwrap(),
            Arc::new(UnreachableStore),
            ManualClock::new(at(0)),
        );

        assert!(limiter.admit_or("A", FailMode::Open).unwrap());
        assert!(!limiter.admit_or("A", FailMode::Closed).unwrap());
    }

    #[test]
    fn test_in_memory_constructor() {
        let limiter = RateLimiter::in_memory(LimitPolicy::per_secs(3, 1).unwrap());
        assert!(limiter.admit("A").unwrap());
        assert_eq!(limiter.policy().limit(), 3);
    }

    #[test]
    fn test_fail_mode_parses_lowercase() {
        let mode: FailMode = serde_yaml::from_str("open").unwrap();
        assert_eq!(mode, FailMode::Open);
        assert_eq!(FailMode::default(), FailMode::Closed);
    }

    #[test]
    fn test_fail_modes_at_explicit_time() {
        let limiter = RateLimiter::new(
            LimitPolicy::per_secs(3, 60).unwrap(),
            Arc::new(UnreachableStore),
            ManualClock::new(at(0)),
        );

        let decision = limiter.check_or_at("A", at(500), FailMode::Open).unwrap();
        assert!(decision.admitted);
        assert_eq!(decision.limit, 3);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.retry_after, Duration::ZERO);

        assert!(!limiter.admit_or_at("A", at(500), FailMode::Closed).unwrap());
    }

    #[test]
    fn test_fail_mode_does_not_override_healthy_store() {
        let limiter = manual_limiter(1, 60);

        assert!(limiter.admit_or_at("A", at(0), FailMode::Closed).unwrap());
        assert!(!limiter.admit_or_at("A", at(1), FailMode::Open).unwrap());
    }
}
