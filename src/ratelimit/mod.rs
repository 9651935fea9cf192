//! Fixed-window admission logic and client state.

mod limiter;
mod policy;
mod record;
mod store;

pub use limiter::{FailMode, RateLimiter};
pub use policy::LimitPolicy;
pub use record::{ClientRecord, Decision};
pub use store::{InMemoryStore, LimiterStore};
