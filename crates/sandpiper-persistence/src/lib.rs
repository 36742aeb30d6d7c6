//! Relational store for Sandpiper.
//!
//! SQLite via sqlx, WAL journal mode for concurrent reads, one idempotent
//! schema constant executed at open. Two repositories share the pool: the
//! cached-response store behind the extraction cache, and the workflow
//! store behind the workflow engine. The `cached_components` and
//! `component_files` tables are part of the persisted-state contract for
//! the hosting collaborators and are created here, but the core never
//! reads them.

mod errors;
mod responses;
mod store;
mod workflows;

pub use errors::{PersistenceError, PersistenceResult};
pub use responses::{CachedResponse, CachedResponseStore, ResponseCounts};
pub use store::Store;
pub use workflows::WorkflowStore;
