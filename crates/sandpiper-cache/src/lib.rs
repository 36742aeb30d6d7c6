//! Content-addressed response cache for the extraction pipeline.
//!
//! Results are addressed by a 32-hex fingerprint of the canonical request
//! string, stored in the relational store with a per-kind TTL, and swept by
//! timers the cache owns: an hourly expired-entry sweep and a half-hourly
//! observability tick.

mod cache;
mod fingerprint;

pub use cache::{CacheHit, CacheMetrics, ResponseCache};
pub use fingerprint::fingerprint;
