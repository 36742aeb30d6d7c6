//! Live recorder sessions.
//!
//! A recorder session drives a pooled browser page with an injected capture
//! script, converts the captured DOM events into [`Action`]s, and fans
//! per-frame DOM snapshots and actions out to subscribers over broadcast
//! channels. Frames drop oldest under back-pressure; actions ride a deep
//! buffer so none are lost.
//!
//! [`Action`]: sandpiper_types::Action

mod events;
mod manager;
mod session;

pub use events::event_to_action;
pub use manager::{RecorderError, RecorderManager, RecorderResult, SessionTopics};
pub use session::{RecorderSession, SessionSnapshotInfo};
