//! Repository for the `workflows` table.
//!
//! Actions and tags are stored as JSON text columns; statistics counters
//! are updated in a single read-modify-write statement so concurrent runs
//! never lose an increment.

use crate::errors::{PersistenceError, PersistenceResult};
use crate::responses::millis_to_datetime;
use chrono::Utc;
use sandpiper_types::{Action, Workflow, WorkflowDraft, WorkflowStats};
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct WorkflowStore {
    pool: SqlitePool,
}

impl WorkflowStore {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Validate and persist a new workflow.
    pub async fn create(&self, draft: WorkflowDraft) -> PersistenceResult<Workflow> {
        let workflow = Workflow::from_draft(draft)?;
        let actions_json = serde_json::to_string(&workflow.actions)?;
        let tags_json = serde_json::to_string(&workflow.tags)?;

        sqlx::query(
            r#"
            INSERT INTO workflows
                (id, name, description, url, actions_json, tags_json, created_by,
                 created_at, updated_at, total_executions, successful_executions,
                 failed_executions, last_executed_at, average_duration_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, 0, NULL, NULL)
            "#,
        )
        .bind(workflow.id.to_string())
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(&workflow.url)
        .bind(&actions_json)
        .bind(&tags_json)
        .bind(&workflow.created_by)
        .bind(workflow.created_at.timestamp_millis())
        .bind(workflow.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        debug!(workflow_id = %workflow.id, name = %workflow.name, "Created workflow");
        Ok(workflow)
    }

    pub async fn get(&self, id: Uuid) -> PersistenceResult<Workflow> {
        let row = sqlx::query("SELECT * FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| PersistenceError::not_found("workflow", id.to_string()))?;
        row_to_workflow(&row)
    }

    /// Replace the definition fields of a workflow, keeping identity and
    /// statistics.
    pub async fn update(&self, id: Uuid, draft: WorkflowDraft) -> PersistenceResult<Workflow> {
        draft.validate()?;
        let actions_json = serde_json::to_string(&draft.actions)?;
        let tags_json = serde_json::to_string(&draft.tags)?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE workflows
            SET name = ?, description = ?, url = ?, actions_json = ?,
                tags_json = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(&draft.url)
        .bind(&actions_json)
        .bind(&tags_json)
        .bind(now.timestamp_millis())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::not_found("workflow", id.to_string()));
        }
        self.get(id).await
    }

    pub async fn delete(&self, id: Uuid) -> PersistenceResult<()> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(PersistenceError::not_found("workflow", id.to_string()));
        }
        Ok(())
    }

    pub async fn list(&self) -> PersistenceResult<Vec<Workflow>> {
        let rows = sqlx::query("SELECT * FROM workflows ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_workflow).collect()
    }

    /// Case-insensitive name substring search.
    pub async fn search_by_name(&self, fragment: &str) -> PersistenceResult<Vec<Workflow>> {
        let pattern = format!("%{}%", fragment);
        let rows = sqlx::query(
            "SELECT * FROM workflows WHERE name LIKE ? COLLATE NOCASE ORDER BY created_at DESC",
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_workflow).collect()
    }

    /// Tag substring search. The LIKE against the JSON column is a
    /// prefilter; exact matching happens against the parsed tag list.
    pub async fn search_by_tag(&self, fragment: &str) -> PersistenceResult<Vec<Workflow>> {
        let pattern = format!("%{}%", fragment);
        let rows = sqlx::query(
            "SELECT * FROM workflows WHERE tags_json LIKE ? COLLATE NOCASE ORDER BY created_at DESC",
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        let fragment_lower = fragment.to_lowercase();
        let mut matches = Vec::new();
        for row in &rows {
            let workflow = row_to_workflow(row)?;
            if workflow
                .tags
                .iter()
                .any(|t| t.to_lowercase().contains(&fragment_lower))
            {
                matches.push(workflow);
            }
        }
        Ok(matches)
    }

    pub async fn by_creator(&self, creator: &str) -> PersistenceResult<Vec<Workflow>> {
        let rows =
            sqlx::query("SELECT * FROM workflows WHERE created_by = ? ORDER BY created_at DESC")
                .bind(creator)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(row_to_workflow).collect()
    }

    pub async fn top_by_executions(&self, limit: u32) -> PersistenceResult<Vec<Workflow>> {
        let rows = sqlx::query(
            "SELECT * FROM workflows ORDER BY total_executions DESC, created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_workflow).collect()
    }

    /// Best success rate among workflows that have executed at least once.
    pub async fn top_by_success_rate(&self, limit: u32) -> PersistenceResult<Vec<Workflow>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM workflows
            WHERE total_executions > 0
            ORDER BY CAST(successful_executions AS REAL) / total_executions DESC,
                     total_executions DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_workflow).collect()
    }

    pub async fn recently_executed(&self, limit: u32) -> PersistenceResult<Vec<Workflow>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM workflows
            WHERE last_executed_at IS NOT NULL
            ORDER BY last_executed_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_workflow).collect()
    }

    pub async fn recently_created(&self, limit: u32) -> PersistenceResult<Vec<Workflow>> {
        let rows = sqlx::query("SELECT * FROM workflows ORDER BY created_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_workflow).collect()
    }

    pub async fn never_executed(&self) -> PersistenceResult<Vec<Workflow>> {
        let rows = sqlx::query(
            "SELECT * FROM workflows WHERE total_executions = 0 ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_workflow).collect()
    }

    /// Aggregate statistics across all workflows.
    pub async fn stats(&self) -> PersistenceResult<WorkflowStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS workflows,
                   COALESCE(SUM(total_executions), 0) AS total,
                   COALESCE(SUM(successful_executions), 0) AS succeeded,
                   COALESCE(SUM(failed_executions), 0) AS failed,
                   AVG(average_duration_ms) AS avg_duration
            FROM workflows
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(WorkflowStats {
            total_workflows: row.get::<i64, _>("workflows") as u64,
            total_executions: row.get::<i64, _>("total") as u64,
            successful_executions: row.get::<i64, _>("succeeded") as u64,
            failed_executions: row.get::<i64, _>("failed") as u64,
            average_duration_ms: row.get::<Option<f64>, _>("avg_duration"),
        })
    }

    /// Fold one finished run into a workflow's counters.
    ///
    /// One UPDATE computes the new counters and the rolling mean, so the
    /// read-modify-write is atomic under concurrent executions.
    pub async fn record_execution(
        &self,
        id: Uuid,
        succeeded: bool,
        duration_ms: u64,
    ) -> PersistenceResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE workflows
            SET total_executions = total_executions + 1,
                successful_executions = successful_executions + ?,
                failed_executions = failed_executions + ?,
                last_executed_at = ?,
                average_duration_ms = CASE
                    WHEN average_duration_ms IS NULL THEN ?
                    ELSE (average_duration_ms + ?) / 2.0
                END
            WHERE id = ?
            "#,
        )
        .bind(i64::from(succeeded))
        .bind(i64::from(!succeeded))
        .bind(now.timestamp_millis())
        .bind(duration_ms as f64)
        .bind(duration_ms as f64)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::not_found("workflow", id.to_string()));
        }
        Ok(())
    }
}

fn row_to_workflow(row: &sqlx::sqlite::SqliteRow) -> PersistenceResult<Workflow> {
    let id: String = row.get("id");
    let actions: Vec<Action> = serde_json::from_str(row.get::<String, _>("actions_json").as_str())?;
    let tags: Vec<String> = serde_json::from_str(row.get::<String, _>("tags_json").as_str())?;

    Ok(Workflow {
        id: Uuid::parse_str(&id)
            .map_err(|_| PersistenceError::storage(format!("malformed workflow id: {}", id)))?,
        name: row.get("name"),
        description: row.get("description"),
        url: row.get("url"),
        actions,
        tags,
        created_by: row.get("created_by"),
        created_at: millis_to_datetime(row.get::<i64, _>("created_at")),
        updated_at: millis_to_datetime(row.get::<i64, _>("updated_at")),
        total_executions: row.get::<i64, _>("total_executions") as u64,
        successful_executions: row.get::<i64, _>("successful_executions") as u64,
        failed_executions: row.get::<i64, _>("failed_executions") as u64,
        last_executed_at: row
            .get::<Option<i64>, _>("last_executed_at")
            .map(millis_to_datetime),
        average_duration_ms: row.get::<Option<f64>, _>("average_duration_ms"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use sandpiper_types::{Action, ActionKind};

    fn draft(name: &str, tags: &[&str], creator: &str) -> WorkflowDraft {
        WorkflowDraft {
            name: name.to_string(),
            description: "test workflow".to_string(),
            url: "https://ex.com/".to_string(),
            actions: vec![
                Action::on(ActionKind::Fill { value: "${name}".into() }, "#user"),
                Action::on(ActionKind::Click, "#go"),
            ],
            tags: tags.iter().map(|t| t.to_string()).collect(),
            created_by: creator.to_string(),
        }
    }

    #[tokio::test]
    async fn create_then_get_preserves_action_list() {
        let store = Store::open_in_memory().await.unwrap();
        let workflows = store.workflows();

        let created = workflows.create(draft("login", &["auth"], "alice")).await.unwrap();
        let fetched = workflows.get(created.id).await.unwrap();

        assert_eq!(fetched.actions, created.actions);
        assert_eq!(fetched.name, "login");
        assert_eq!(fetched.tags, vec!["auth".to_string()]);
        assert_eq!(fetched.total_executions, 0);
        assert_eq!(fetched.average_duration_ms, None);
    }

    #[tokio::test]
    async fn update_replaces_definition_and_keeps_stats() {
        let store = Store::open_in_memory().await.unwrap();
        let workflows = store.workflows();

        let created = workflows.create(draft("login", &[], "alice")).await.unwrap();
        workflows.record_execution(created.id, true, 100).await.unwrap();

        let updated = workflows
            .update(created.id, draft("login-v2", &["auth"], "alice"))
            .await
            .unwrap();
        assert_eq!(updated.name, "login-v2");
        assert_eq!(updated.total_executions, 1);
        assert_eq!(updated.successful_executions, 1);
    }

    #[tokio::test]
    async fn record_execution_updates_counters_and_rolling_mean() {
        let store = Store::open_in_memory().await.unwrap();
        let workflows = store.workflows();
        let wf = workflows.create(draft("login", &[], "alice")).await.unwrap();

        workflows.record_execution(wf.id, true, 100).await.unwrap();
        workflows.record_execution(wf.id, false, 300).await.unwrap();

        let after = workflows.get(wf.id).await.unwrap();
        assert_eq!(after.total_executions, 2);
        assert_eq!(after.successful_executions, 1);
        assert_eq!(after.failed_executions, 1);
        assert_eq!(
            after.successful_executions + after.failed_executions,
            after.total_executions
        );
        assert_eq!(after.average_duration_ms, Some(200.0));
        assert!(after.last_executed_at.is_some());
    }

    #[tokio::test]
    async fn search_queries_cover_name_tag_and_creator() {
        let store = Store::open_in_memory().await.unwrap();
        let workflows = store.workflows();

        workflows.create(draft("checkout flow", &["shop", "cart"], "alice")).await.unwrap();
        workflows.create(draft("login flow", &["auth"], "bob")).await.unwrap();

        let by_name = workflows.search_by_name("CHECKOUT").await.unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].name, "checkout flow");

        let by_tag = workflows.search_by_tag("car").await.unwrap();
        assert_eq!(by_tag.len(), 1);
        assert_eq!(by_tag[0].tags, vec!["shop".to_string(), "cart".to_string()]);

        let by_creator = workflows.by_creator("bob").await.unwrap();
        assert_eq!(by_creator.len(), 1);
        assert_eq!(by_creator[0].name, "login flow");
    }

    #[tokio::test]
    async fn ranking_queries_respect_execution_history() {
        let store = Store::open_in_memory().await.unwrap();
        let workflows = store.workflows();

        let busy = workflows.create(draft("busy", &[], "a")).await.unwrap();
        let flaky = workflows.create(draft("flaky", &[], "a")).await.unwrap();
        let _idle = workflows.create(draft("idle", &[], "a")).await.unwrap();

        for _ in 0..3 {
            workflows.record_execution(busy.id, true, 50).await.unwrap();
        }
        // Millisecond timestamps tie-break recently_executed; keep flaky last.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        workflows.record_execution(flaky.id, false, 50).await.unwrap();

        let top = workflows.top_by_executions(2).await.unwrap();
        assert_eq!(top[0].id, busy.id);

        let by_rate = workflows.top_by_success_rate(10).await.unwrap();
        // Only executed workflows qualify; busy (100%) outranks flaky (0%).
        assert_eq!(by_rate.len(), 2);
        assert_eq!(by_rate[0].id, busy.id);

        let never = workflows.never_executed().await.unwrap();
        assert_eq!(never.len(), 1);
        assert_eq!(never[0].name, "idle");

        let recent = workflows.recently_executed(1).await.unwrap();
        assert_eq!(recent[0].id, flaky.id);
    }

    #[tokio::test]
    async fn stats_aggregates_across_workflows() {
        let store = Store::open_in_memory().await.unwrap();
        let workflows = store.workflows();

        let a = workflows.create(draft("a", &[], "x")).await.unwrap();
        let b = workflows.create(draft("b", &[], "x")).await.unwrap();
        workflows.record_execution(a.id, true, 100).await.unwrap();
        workflows.record_execution(b.id, false, 200).await.unwrap();

        let stats = workflows.stats().await.unwrap();
        assert_eq!(stats.total_workflows, 2);
        assert_eq!(stats.total_executions, 2);
        assert_eq!(stats.successful_executions, 1);
        assert_eq!(stats.failed_executions, 1);
        assert_eq!(stats.average_duration_ms, Some(150.0));
    }

    #[tokio::test]
    async fn missing_workflow_is_a_not_found_error() {
        let store = Store::open_in_memory().await.unwrap();
        let workflows = store.workflows();
        let err = workflows.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound { .. }));
    }
}
