//! Action execution against pooled browser sessions.
//!
//! [`ActionExecutor::execute_sequence`] runs an ordered action list on one
//! session, waiting for each target element (visible, non-zero box, opacity
//! above zero) before dispatching. A failed action is recorded with its
//! error and execution continues; cancellation yields the partial result
//! list. Parameter substitution rewrites `${name}` placeholders before a
//! sequence runs.

mod executor;
mod params;
mod scripts;

pub use executor::ActionExecutor;
pub use params::{substitute_actions, substitute_text};
