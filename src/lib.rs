//! Turnstile - per-client fixed-window request admission
//!
//! This crate decides, for an already identified client and a caller supplied
//! point in time, whether a request fits inside the client's quota for the
//! current window. Storage and time are injected so the limiter can be shared,
//! swapped and driven with synthetic clocks.

pub mod clock;
pub mod config;
pub mod error;
pub mod housekeeping;
pub mod ratelimit;
pub mod trace;

#[cfg(test)]
pub(crate) mod testing;
