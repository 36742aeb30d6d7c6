//! Shared domain types for the Sandpiper browser-automation service.
//!
//! This crate holds the value types exchanged between the browser pool,
//! extraction pipeline, workflow engine, and recorder: extraction requests
//! and results, page actions and their results, persisted workflow records,
//! and recorder session/snapshot types.
//!
//! Everything here is plain data with serde derives; behavior lives in the
//! component crates.

pub mod action;
pub mod extraction;
pub mod recorder;
pub mod workflow;

pub use action::{Action, ActionKind, ActionResult};
pub use extraction::{
    CssFormat, CssOptions, ExtractionKind, ExtractionOptions, ExtractionRequest, HtmlOptions,
    JsonOptions, StrategyOutput, WaitPolicy,
};
pub use recorder::{
    CapturedEvent, DomSnapshot, RecorderState, ScrollPosition, StylesheetRef, Viewport,
};
pub use workflow::{
    ExecutionReport, Workflow, WorkflowDraft, WorkflowStats, WorkflowValidationError,
    MAX_WORKFLOW_ACTIONS,
};
