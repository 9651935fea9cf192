//! Client record storage.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::policy::{validate_client_id, validate_limit};
use super::record::{ClientRecord, Decision};
use crate::error::Result;

/// Storage for per-client window records.
///
/// Implementations must run the read-decide-write sequence for one client id
/// atomically, and must not serialize work for different client ids behind a
/// single lock. The in-process [`InMemoryStore`] never fails on storage; a
/// shared or persistent implementation reports
/// [`TurnstileError::StoreUnavailable`](crate::error::TurnstileError::StoreUnavailable)
/// and leaves the fail-open/fail-closed choice to the caller.
pub trait LimiterStore: Send + Sync {
    /// Apply one request for `client_id` at `now` and describe the outcome.
    fn check(
        &self,
        client_id: &str,
        limit: u64,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<Decision>;

    /// Apply one request and return only whether it was admitted.
    fn admit(
        &self,
        client_id: &str,
        limit: u64,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.check(client_id, limit, duration, now)
            .map(|decision| decision.admitted)
    }

    /// Snapshot of the record for `client_id`, if one exists.
    fn record(&self, client_id: &str) -> Result<Option<ClientRecord>>;

    /// Number of tracked clients.
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Forget one client.
    fn remove(&self, client_id: &str) -> Result<Option<ClientRecord>>;

    /// Forget every client.
    fn clear(&self) -> Result<()>;

    /// Drop records that are idle and whose window has closed.
    ///
    /// A record is evicted once its window started at least
    /// `max(idle_for, window)` before `now`, so an open window is never
    /// forgotten. Returns the number of records removed.
    fn evict_idle(
        &self,
        now: DateTime<Utc>,
        idle_for: Duration,
        window: Duration,
    ) -> Result<usize>;
}

/// In-process record store.
///
/// Each client gets its own mutex; the sharded map is only locked long enough
/// to look up or insert that mutex.
#[derive(Default)]
pub struct InMemoryStore {
    records: DashMap<String, Arc<Mutex<ClientRecord>>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, client_id: &str) -> Option<Arc<Mutex<ClientRecord>>> {
        self.records
            .get(client_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Apply a request through `handle` if it is still the record stored for
    /// `client_id`.
    ///
    /// Returns `None` when the record was removed after `handle` was looked up.
    fn apply_live(
        &self,
        client_id: &str,
        handle: &Arc<Mutex<ClientRecord>>,
        limit: u64,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Option<Decision> {
        let mut record = handle.lock();
        // Eviction skips locked records, so a live handle stays live until unlocked
        let live = self
            .records
            .get(client_id)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), handle));
        if !live {
            return None;
        }

        let previous_start = record.window_start;
        let decision = record.apply(limit, duration, now);

        if record.window_start != previous_start {
            debug!(
                client_id = %client_id,
                window_start = %record.window_start,
                "Started new window"
            );
        } else if !decision.admitted {
            debug!(
                client_id = %client_id,
                count = record.count,
                limit,
                "Rate limit exceeded"
            );
        }

        Some(decision)
    }
}

impl LimiterStore for InMemoryStore {
    fn check(
        &self,
        client_id: &str,
        limit: u64,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<Decision> {
        validate_client_id(client_id)?;
        validate_limit(limit, duration)?;

        trace!(client_id = %client_id, limit, ?duration, %now, "Checking rate limit");

        loop {
            let handle = match self.handle(client_id) {
                Some(handle) => handle,
                None => match self.records.entry(client_id.to_owned()) {
                    Entry::Occupied(entry) => Arc::clone(entry.get()),
                    Entry::Vacant(entry) => {
                        let record = ClientRecord::new(now);
                        entry.insert(Arc::new(Mutex::new(record)));
                        debug!(client_id = %client_id, limit, "Creating new client record");
                        return Ok(record.decision(true, limit, duration, now));
                    }
                },
            };

            if let Some(decision) = self.apply_live(client_id, &handle, limit, duration, now) {
                return Ok(decision);
            }
            trace!(client_id = %client_id, "Client record evicted during check, retrying");
        }
    }

    fn record(&self, client_id: &str) -> Result<Option<ClientRecord>> {
        Ok(self.handle(client_id).map(|handle| *handle.lock()))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.records.len())
    }

    fn remove(&self, client_id: &str) -> Result<Option<ClientRecord>> {
        Ok(self
            .records
            .remove(client_id)
            .map(|(_, handle)| *handle.lock()))
    }

    fn clear(&self) -> Result<()> {
        self.records.clear();
        Ok(())
    }

    fn evict_idle(
        &self,
        now: DateTime<Utc>,
        idle_for: Duration,
        window: Duration,
    ) -> Result<usize> {
        let threshold = idle_for.max(window);
        let before = self.records.len();
        // A record locked by an in-flight check is in use, so it stays.
        self.records.retain(|_, handle| match handle.try_lock() {
            Some(record) => record.elapsed(now) < threshold,
            None => true,
        });
        let evicted = before.saturating_sub(self.records.len());

        if evicted > 0 {
            debug!(evicted, remaining = self.records.len(), "Evicted idle client records");
        }
        Ok(evicted)
    }
}
