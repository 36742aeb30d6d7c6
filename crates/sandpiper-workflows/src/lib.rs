//! Workflow execution for Sandpiper.
//!
//! The [`WorkflowRunner`] loads a persisted workflow, substitutes
//! parameters into its action list, drives it through the browser pool and
//! action executor, and folds the outcome into the workflow's statistics in
//! one atomic update. Load and acquisition failures count as failed
//! executions.

mod runner;

pub use runner::{WorkflowError, WorkflowResult, WorkflowRunner};
