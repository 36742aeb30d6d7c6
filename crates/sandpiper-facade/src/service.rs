//! Service wiring and the public entry points.

use crate::coordinator::{ExtractionCoordinator, ExtractionResponse};
use crate::errors::{ServiceError, ServiceResult};
use sandpiper_actions::ActionExecutor;
use sandpiper_browser::{BrowserPool, PoolStats};
use sandpiper_cache::{CacheMetrics, ResponseCache};
use sandpiper_config::SandpiperConfig;
use sandpiper_extraction::StrategyRegistry;
use sandpiper_persistence::{Store, WorkflowStore};
use sandpiper_recorder::{RecorderManager, SessionTopics};
use sandpiper_types::{
    Action, ActionResult, DomSnapshot, ExecutionReport, ExtractionKind, ExtractionOptions,
    ExtractionRequest, RecorderState, WaitPolicy, Workflow, WorkflowDraft, WorkflowStats,
};
use sandpiper_workflows::WorkflowRunner;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// The assembled service. Everything the HTTP layer talks to hangs off
/// this one explicitly-constructed value.
pub struct Sandpiper {
    config: SandpiperConfig,
    store: Store,
    pool: BrowserPool,
    cache: ResponseCache,
    executor: ActionExecutor,
    workflows: WorkflowStore,
    runner: WorkflowRunner,
    recorder: RecorderManager,
    coordinator: ExtractionCoordinator,
}

impl Sandpiper {
    /// Open the store named by the configuration and start the service.
    pub async fn start(config: SandpiperConfig) -> ServiceResult<Self> {
        config
            .validate()
            .map_err(|e| ServiceError::validation(e.to_string()))?;
        let store = Store::open(&config.storage).await?;
        Self::start_with_store(config, store)
    }

    /// Start against an already-open store (tests use the in-memory one).
    pub fn start_with_store(config: SandpiperConfig, store: Store) -> ServiceResult<Self> {
        let pool = BrowserPool::new(config.pool.clone(), config.navigation.clone());
        let cache = ResponseCache::new(store.responses(), config.cache.clone());
        cache.start_timers();

        let registry = Arc::new(StrategyRegistry::with_defaults());
        let executor = ActionExecutor::new(config.actions.clone());
        let workflows = store.workflows();
        let runner = WorkflowRunner::new(workflows.clone(), pool.clone(), executor.clone());
        let recorder = RecorderManager::new(pool.clone(), config.recorder.clone());
        let coordinator = ExtractionCoordinator::new(pool.clone(), cache.clone(), registry);

        info!("Sandpiper service started");
        Ok(Self {
            config,
            store,
            pool,
            cache,
            executor,
            workflows,
            runner,
            recorder,
            coordinator,
        })
    }

    // ----- extraction -----

    /// Typed extraction entry point.
    pub async fn extract(&self, request: ExtractionRequest) -> ServiceResult<ExtractionResponse> {
        self.coordinator.extract(request).await
    }

    /// Wire-shaped extraction entry point: kind and options arrive as loose
    /// values and are validated here.
    pub async fn extract_raw(
        &self,
        url: &str,
        kind: &str,
        selector: &str,
        wait: Option<&str>,
        options: Option<serde_json::Value>,
    ) -> ServiceResult<ExtractionResponse> {
        let kind = ExtractionKind::parse(kind)
            .ok_or_else(|| ServiceError::validation(format!("unknown extraction kind: {}", kind)))?;
        let wait = match wait {
            None => WaitPolicy::default(),
            Some(raw) => serde_json::from_value(serde_json::Value::String(raw.to_string()))
                .map_err(|_| ServiceError::validation(format!("unknown wait policy: {}", raw)))?,
        };
        let options = ExtractionOptions::from_value(kind, options)
            .map_err(|e| ServiceError::validation(format!("bad options: {}", e)))?;

        self.extract(ExtractionRequest {
            url: url.to_string(),
            kind,
            selector: selector.to_string(),
            wait,
            options,
        })
        .await
    }

    // ----- ad-hoc actions -----

    /// Run an ordered action sequence against `url`; one result per action,
    /// same order.
    pub async fn execute_actions(
        &self,
        url: &str,
        actions: &[Action],
        cancel: &CancellationToken,
    ) -> ServiceResult<Vec<ActionResult>> {
        if url.trim().is_empty() {
            return Err(ServiceError::validation("url must not be empty"));
        }
        if actions.is_empty() {
            return Err(ServiceError::validation("action list must not be empty"));
        }

        let session = self.pool.acquire(url, WaitPolicy::Load).await?;
        let results = self.executor.execute_sequence(&session, actions, cancel).await;
        if let Err(e) = session.release().await {
            warn!(url = %url, error = %e, "Session release failed after action sequence");
        }

        if cancel.is_cancelled() && results.len() < actions.len() {
            // Partial results are surfaced; the caller sees how far it got.
            info!(
                completed = results.len(),
                total = actions.len(),
                "Action sequence cancelled"
            );
        }
        Ok(results)
    }

    // ----- workflows -----

    pub async fn create_workflow(&self, draft: WorkflowDraft) -> ServiceResult<Workflow> {
        draft.validate()?;
        Ok(self.workflows.create(draft).await?)
    }

    pub async fn get_workflow(&self, id: Uuid) -> ServiceResult<Workflow> {
        Ok(self.workflows.get(id).await?)
    }

    pub async fn update_workflow(&self, id: Uuid, draft: WorkflowDraft) -> ServiceResult<Workflow> {
        draft.validate()?;
        Ok(self.workflows.update(id, draft).await?)
    }

    pub async fn delete_workflow(&self, id: Uuid) -> ServiceResult<()> {
        Ok(self.workflows.delete(id).await?)
    }

    pub async fn list_workflows(&self) -> ServiceResult<Vec<Workflow>> {
        Ok(self.workflows.list().await?)
    }

    pub async fn search_workflows_by_name(&self, fragment: &str) -> ServiceResult<Vec<Workflow>> {
        Ok(self.workflows.search_by_name(fragment).await?)
    }

    pub async fn search_workflows_by_tag(&self, fragment: &str) -> ServiceResult<Vec<Workflow>> {
        Ok(self.workflows.search_by_tag(fragment).await?)
    }

    pub async fn workflows_by_creator(&self, creator: &str) -> ServiceResult<Vec<Workflow>> {
        Ok(self.workflows.by_creator(creator).await?)
    }

    pub async fn top_workflows_by_executions(&self, limit: u32) -> ServiceResult<Vec<Workflow>> {
        Ok(self.workflows.top_by_executions(limit).await?)
    }

    pub async fn top_workflows_by_success_rate(&self, limit: u32) -> ServiceResult<Vec<Workflow>> {
        Ok(self.workflows.top_by_success_rate(limit).await?)
    }

    pub async fn recently_executed_workflows(&self, limit: u32) -> ServiceResult<Vec<Workflow>> {
        Ok(self.workflows.recently_executed(limit).await?)
    }

    pub async fn recently_created_workflows(&self, limit: u32) -> ServiceResult<Vec<Workflow>> {
        Ok(self.workflows.recently_created(limit).await?)
    }

    pub async fn never_executed_workflows(&self) -> ServiceResult<Vec<Workflow>> {
        Ok(self.workflows.never_executed().await?)
    }

    pub async fn workflow_stats(&self) -> ServiceResult<WorkflowStats> {
        Ok(self.workflows.stats().await?)
    }

    /// Execute a workflow with an optional parameter map.
    pub async fn execute_workflow(
        &self,
        id: Uuid,
        params: Option<HashMap<String, String>>,
        cancel: &CancellationToken,
    ) -> ServiceResult<ExecutionReport> {
        let params = params.unwrap_or_default();
        Ok(self.runner.execute(id, &params, cancel).await?)
    }

    // ----- recorder -----

    pub async fn create_recorder_session(
        &self,
        url: &str,
        frame_rate: Option<u32>,
    ) -> ServiceResult<SessionTopics> {
        if url.trim().is_empty() {
            return Err(ServiceError::validation("url must not be empty"));
        }
        Ok(self.recorder.create_session(url, frame_rate).await?)
    }

    pub async fn start_recording(&self, id: Uuid) -> ServiceResult<()> {
        Ok(self.recorder.start(id).await?)
    }

    pub async fn stop_recording(&self, id: Uuid) -> ServiceResult<()> {
        Ok(self.recorder.stop(id).await?)
    }

    pub fn recorder_actions(&self, id: Uuid) -> ServiceResult<Vec<Action>> {
        Ok(self.recorder.get_actions(id)?)
    }

    pub fn recorder_state(&self, id: Uuid) -> ServiceResult<RecorderState> {
        Ok(self.recorder.session_state(id)?)
    }

    pub async fn close_recorder_session(&self, id: Uuid) -> ServiceResult<()> {
        Ok(self.recorder.close(id).await?)
    }

    pub fn subscribe_recorder_frames(
        &self,
        id: Uuid,
    ) -> ServiceResult<broadcast::Receiver<DomSnapshot>> {
        Ok(self.recorder.subscribe_frames(id)?)
    }

    pub fn subscribe_recorder_actions(
        &self,
        id: Uuid,
    ) -> ServiceResult<broadcast::Receiver<Action>> {
        Ok(self.recorder.subscribe_actions(id)?)
    }

    // ----- cache & observability -----

    pub async fn invalidate_cache_for_url(&self, url: &str) -> ServiceResult<u64> {
        Ok(self.cache.invalidate_url(url).await?)
    }

    pub async fn flush_cache(&self) -> ServiceResult<u64> {
        Ok(self.cache.flush().await?)
    }

    pub fn cache_metrics(&self) -> CacheMetrics {
        self.cache.metrics()
    }

    pub async fn pool_stats(&self) -> PoolStats {
        self.pool.stats().await
    }

    pub fn config(&self) -> &SandpiperConfig {
        &self.config
    }

    /// Stop everything: recorder sessions first (they hold pool sessions),
    /// then cache timers, the pool, and the store.
    pub async fn shutdown(&self) {
        info!("Shutting down Sandpiper service");
        self.recorder.shutdown().await;
        self.cache.stop();
        self.pool.stop().await;
        self.store.close().await;
        info!("Sandpiper service stopped");
    }
}
