//! Load -> substitute -> acquire -> execute -> record.

use chrono::Utc;
use sandpiper_actions::ActionExecutor;
use sandpiper_browser::{BrowserError, BrowserPool};
use sandpiper_persistence::{PersistenceError, WorkflowStore};
use sandpiper_types::{ExecutionReport, WaitPolicy};
use std::collections::HashMap;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

/// Executes persisted workflows against the browser pool.
#[derive(Clone)]
pub struct WorkflowRunner {
    store: WorkflowStore,
    pool: BrowserPool,
    executor: ActionExecutor,
}

impl WorkflowRunner {
    pub fn new(store: WorkflowStore, pool: BrowserPool, executor: ActionExecutor) -> Self {
        Self {
            store,
            pool,
            executor,
        }
    }

    /// Run a workflow with the given parameter map.
    ///
    /// The workflow's counters always move: a run that cannot load its
    /// actions or acquire a session is recorded as a failed execution
    /// before the error is returned.
    pub async fn execute(
        &self,
        id: Uuid,
        params: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> WorkflowResult<ExecutionReport> {
        let workflow = match self.store.get(id).await {
            Ok(workflow) => workflow,
            Err(e @ PersistenceError::NotFound { .. }) => return Err(e.into()),
            Err(e) => {
                // The row exists but would not deserialize; that is a failed
                // execution of a real workflow.
                warn!(workflow_id = %id, error = %e, "Workflow load failed");
                self.record(id, false, 0).await;
                return Err(e.into());
            }
        };

        let started = Instant::now();
        let session = match self.pool.acquire(&workflow.url, WaitPolicy::Load).await {
            Ok(session) => session,
            Err(e) => {
                warn!(workflow_id = %id, error = %e, "Session acquisition failed for workflow");
                self.record(id, false, started.elapsed().as_millis() as u64)
                    .await;
                return Err(e.into());
            }
        };

        let results = self
            .executor
            .execute_with_params(&session, &workflow.actions, params, cancel)
            .await;

        let success =
            results.len() == workflow.actions.len() && results.iter().all(|r| r.success);
        let final_url = results
            .last()
            .map(|r| r.final_url.clone())
            .unwrap_or_else(|| workflow.url.clone());
        let total_elapsed_ms = started.elapsed().as_millis() as u64;

        if let Err(e) = session.release().await {
            warn!(workflow_id = %id, error = %e, "Session release failed after workflow run");
        }

        self.record(id, success, total_elapsed_ms).await;

        info!(
            workflow_id = %id,
            name = %workflow.name,
            success,
            actions = results.len(),
            elapsed_ms = total_elapsed_ms,
            "Workflow executed"
        );

        Ok(ExecutionReport {
            workflow_id: id,
            workflow_name: workflow.name,
            success,
            results,
            total_elapsed_ms,
            final_url,
            timestamp: Utc::now(),
        })
    }

    /// Statistics update failures must not eat the execution outcome.
    async fn record(&self, id: Uuid, succeeded: bool, duration_ms: u64) {
        if let Err(e) = self.store.record_execution(id, succeeded, duration_ms).await {
            warn!(workflow_id = %id, error = %e, "Failed to record workflow execution");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandpiper_config::{ActionConfig, NavigationConfig, PoolConfig};
    use sandpiper_persistence::Store;
    use sandpiper_types::{Action, ActionKind, WorkflowDraft};

    fn runner_parts(store: &Store) -> WorkflowRunner {
        let pool = BrowserPool::new(PoolConfig::default(), NavigationConfig::default());
        WorkflowRunner::new(
            store.workflows(),
            pool,
            ActionExecutor::new(ActionConfig::default()),
        )
    }

    #[tokio::test]
    async fn executing_a_missing_workflow_is_not_found() {
        let store = Store::open_in_memory().await.unwrap();
        let runner = runner_parts(&store);
        let err = runner
            .execute(Uuid::new_v4(), &HashMap::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Persistence(PersistenceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn corrupt_action_json_counts_as_a_failed_execution() {
        let store = Store::open_in_memory().await.unwrap();
        let id = Uuid::new_v4();
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            r#"
            INSERT INTO workflows
                (id, name, description, url, actions_json, tags_json, created_by,
                 created_at, updated_at, total_executions, successful_executions,
                 failed_executions)
            VALUES (?, 'broken', '', 'https://ex.com/', 'not-json', '[]', '', ?, ?, 0, 0, 0)
            "#,
        )
        .bind(id.to_string())
        .bind(now)
        .bind(now)
        .execute(store.pool())
        .await
        .unwrap();

        let runner = runner_parts(&store);
        let err = runner
            .execute(id, &HashMap::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Persistence(_)));

        // Counters moved even though the run never reached the browser.
        let row: (i64, i64) = sqlx::query_as(
            "SELECT total_executions, failed_executions FROM workflows WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(row, (1, 1));
    }

    #[tokio::test]
    #[ignore = "requires Chrome - run with: cargo test -- --ignored"]
    async fn successful_run_updates_counters_and_reports_results() {
        let store = Store::open_in_memory().await.unwrap();
        let workflows = store.workflows();
        let workflow = workflows
            .create(WorkflowDraft {
                name: "click once".to_string(),
                url: "data:text/html,<button id='go'>go</button>".to_string(),
                actions: vec![Action::on(ActionKind::Click, "#go")],
                ..Default::default()
            })
            .await
            .unwrap();

        let runner = runner_parts(&store);
        let report = runner
            .execute(workflow.id, &HashMap::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.results.len(), 1);

        let after = workflows.get(workflow.id).await.unwrap();
        assert_eq!(after.total_executions, 1);
        assert_eq!(after.successful_executions, 1);
        assert!(after.average_duration_ms.is_some());
    }

    #[tokio::test]
    #[ignore = "requires Chrome - run with: cargo test -- --ignored"]
    async fn missing_parameter_leaves_placeholder_and_still_counts() {
        let store = Store::open_in_memory().await.unwrap();
        let workflows = store.workflows();
        let workflow = workflows
            .create(WorkflowDraft {
                name: "fill".to_string(),
                url: "data:text/html,<input id='user'>".to_string(),
                actions: vec![Action::on(
                    ActionKind::Fill {
                        value: "${name}".to_string(),
                    },
                    "#user",
                )],
                ..Default::default()
            })
            .await
            .unwrap();

        let runner = runner_parts(&store);

        let mut params = HashMap::new();
        params.insert("name".to_string(), "alice".to_string());
        let with_param = runner
            .execute(workflow.id, &params, &CancellationToken::new())
            .await
            .unwrap();
        match &with_param.results[0].action.kind {
            ActionKind::Fill { value } => assert_eq!(value, "alice"),
            other => panic!("unexpected action kind: {:?}", other),
        }

        let without_param = runner
            .execute(workflow.id, &HashMap::new(), &CancellationToken::new())
            .await
            .unwrap();
        match &without_param.results[0].action.kind {
            ActionKind::Fill { value } => assert_eq!(value, "${name}"),
            other => panic!("unexpected action kind: {:?}", other),
        }

        let after = workflows.get(workflow.id).await.unwrap();
        assert_eq!(after.total_executions, 2);
    }
}
