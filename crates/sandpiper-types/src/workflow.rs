//! Persisted workflow records, validation, and execution reporting.

use crate::action::{Action, ActionResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const MAX_WORKFLOW_ACTIONS: usize = 50;
pub const MAX_WORKFLOW_NAME_LEN: usize = 255;
pub const MAX_WORKFLOW_DESCRIPTION_LEN: usize = 5000;

/// A persisted, parameterized action sequence with identity and statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// URL the runner acquires a session at before executing.
    pub url: String,
    /// Ordered action list; the workflow owns it by value.
    pub actions: Vec<Action>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed_at: Option<DateTime<Utc>>,
    /// Rolling mean of run duration, milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_duration_ms: Option<f64>,
}

impl Workflow {
    /// Build a fresh workflow from a validated draft.
    pub fn from_draft(draft: WorkflowDraft) -> Result<Self, WorkflowValidationError> {
        draft.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name: draft.name,
            description: draft.description,
            url: draft.url,
            actions: draft.actions,
            tags: draft.tags,
            created_by: draft.created_by,
            created_at: now,
            updated_at: now,
            total_executions: 0,
            successful_executions: 0,
            failed_executions: 0,
            last_executed_at: None,
            average_duration_ms: None,
        })
    }

    /// succeeded / total, 0.0 when never executed.
    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            0.0
        } else {
            self.successful_executions as f64 / self.total_executions as f64
        }
    }

    /// Fold one finished run into the statistics counters. The caller wraps
    /// this in a single read-modify-write transaction.
    pub fn record_execution(&mut self, succeeded: bool, duration_ms: u64) {
        self.total_executions += 1;
        if succeeded {
            self.successful_executions += 1;
        } else {
            self.failed_executions += 1;
        }
        self.last_executed_at = Some(Utc::now());
        self.average_duration_ms = Some(match self.average_duration_ms {
            None => duration_ms as f64,
            Some(avg) => (avg + duration_ms as f64) / 2.0,
        });
    }
}

/// Client input for creating or replacing a workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    pub actions: Vec<Action>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_by: String,
}

impl WorkflowDraft {
    pub fn validate(&self) -> Result<(), WorkflowValidationError> {
        if self.name.trim().is_empty() {
            return Err(WorkflowValidationError::EmptyName);
        }
        if self.name.len() > MAX_WORKFLOW_NAME_LEN {
            return Err(WorkflowValidationError::NameTooLong {
                len: self.name.len(),
            });
        }
        if self.description.len() > MAX_WORKFLOW_DESCRIPTION_LEN {
            return Err(WorkflowValidationError::DescriptionTooLong {
                len: self.description.len(),
            });
        }
        if self.url.trim().is_empty() {
            return Err(WorkflowValidationError::EmptyUrl);
        }
        if self.actions.is_empty() {
            return Err(WorkflowValidationError::NoActions);
        }
        if self.actions.len() > MAX_WORKFLOW_ACTIONS {
            return Err(WorkflowValidationError::TooManyActions {
                len: self.actions.len(),
            });
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowValidationError {
    #[error("workflow name must not be empty")]
    EmptyName,
    #[error("workflow name exceeds {MAX_WORKFLOW_NAME_LEN} characters ({len})")]
    NameTooLong { len: usize },
    #[error("workflow description exceeds {MAX_WORKFLOW_DESCRIPTION_LEN} characters ({len})")]
    DescriptionTooLong { len: usize },
    #[error("workflow URL must not be empty")]
    EmptyUrl,
    #[error("workflow must contain at least one action")]
    NoActions,
    #[error("workflow exceeds {MAX_WORKFLOW_ACTIONS} actions ({len})")]
    TooManyActions { len: usize },
}

/// Aggregate statistics across all workflows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowStats {
    pub total_workflows: u64,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub average_duration_ms: Option<f64>,
}

/// Report returned from one workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub workflow_id: Uuid,
    pub workflow_name: String,
    /// True when every action in the sequence succeeded.
    pub success: bool,
    pub results: Vec<ActionResult>,
    pub total_elapsed_ms: u64,
    #[serde(default)]
    pub final_url: String,
    pub timestamp: DateTime<Utc>,
}
