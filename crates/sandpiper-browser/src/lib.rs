//! Browser session management for Sandpiper.
//!
//! The [`BrowserPool`] owns every headless browser process: it vends
//! exclusive page sessions under a concurrency cap, evicts idle browsers,
//! and guarantees release on every path. The [`Navigator`] loads URLs under
//! a wait policy with bounded retries.

mod errors;
mod navigator;
mod pool;

pub use errors::{BrowserError, BrowserResult};
pub use navigator::Navigator;
pub use pool::{
    BrowserPool, PageGuard, PoolEvent, PoolStats, SessionHandle, SessionId, SessionRef,
};
