//! Background eviction of idle client records.
//!
//! Admission never evicts anything. Callers that need bounded memory run an
//! evictor next to their limiter.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::ratelimit::LimiterStore;

/// Spawn a task that evicts records idle for at least `idle_for`, every `interval`.
///
/// `window` is the limiter's window length; records whose window is still
/// open are kept even when `idle_for` is shorter. The task stops once
/// `shutdown` receives `true` or its sender is dropped.
pub fn spawn_evictor<S, C>(
    store: Arc<S>,
    clock: C,
    interval: Duration,
    idle_for: Duration,
    window: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    S: LimiterStore + 'static,
    C: Clock + 'static,
{
    tokio::spawn(async move {
        info!(?interval, ?idle_for, ?window, "Starting idle record evictor");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match store.evict_idle(clock.now(), idle_for, window) {
                        Ok(evicted) => debug!(evicted, "Eviction pass complete"),
                        Err(e) => warn!(error = %e, "Eviction pass failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Idle record evictor stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ratelimit::InMemoryStore;
    use crate::testing::{at, MINUTE};

    #[tokio::test(start_paused = true)]
    async fn test_evictor_removes_idle_records() {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(at(0)));
        let (tx, rx) = watch::channel(false);

        store.admit("A", 1, MINUTE, clock.now()).unwrap();
        let handle = spawn_evictor(
            Arc::clone(&store),
            Arc::clone(&clock),
            Duration::from_secs(30),
            Duration::from_secs(120),
            MINUTE,
            rx,
        );

        // Not idle long enough yet
        clock.advance(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(store.len().unwrap(), 1);

        clock.advance(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.len().unwrap(), 0);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_evictor_stops_when_sender_dropped() {
        let store = Arc::new(InMemoryStore::new());
        let clock = ManualClock::new(at(0));
        let (tx, rx) = watch::channel(false);

        let handle = spawn_evictor(store, clock, MINUTE, MINUTE, MINUTE, rx);
        drop(tx);

        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_evictor_waits_for_window_to_close() {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(at(0)));
        let (tx, rx) = watch::channel(false);

        store.admit("A", 1, MINUTE, clock.now()).unwrap();
        let handle = spawn_evictor(
            Arc::clone(&store),
            Arc::clone(&clock),
            Duration::from_secs(10),
            Duration::from_secs(10),
            MINUTE,
            rx,
        );

        // Idle past `idle_for`, window still open
        clock.advance(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(store.len().unwrap(), 1);
        assert!(!store.admit("A", 1, MINUTE, clock.now()).unwrap());

        clock.advance(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.len().unwrap(), 0);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
