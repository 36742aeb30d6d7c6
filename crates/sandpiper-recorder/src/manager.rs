//! Concurrent recorder session management.

use crate::events::event_to_action;
use crate::session::{RecorderSession, SnapshotPayload};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use dashmap::DashMap;
use sandpiper_browser::{BrowserError, BrowserPool, SessionHandle};
use sandpiper_config::RecorderConfig;
use sandpiper_types::{Action, CapturedEvent, DomSnapshot, RecorderState, WaitPolicy};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// In-page capture script, installed at page init and on every navigation.
const CAPTURE_JS: &str = include_str!("capture.js");
/// In-page snapshot serializer.
const SNAPSHOT_JS: &str = include_str!("snapshot.js");
/// Drains the capture queue; the sink task is its single consumer.
const DRAIN_JS: &str = r#"(() => {
    const queue = window.__sandpiperEvents || [];
    window.__sandpiperEvents = [];
    return queue;
})()"#;

pub type RecorderResult<T> = Result<T, RecorderError>;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("recorder session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("cannot {operation} a session in state {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("capture script failed: {0}")]
    Script(String),
}

/// Subscription addresses handed back at session creation.
#[derive(Debug, Clone)]
pub struct SessionTopics {
    pub session_id: Uuid,
    pub frames: String,
    pub actions: String,
}

struct ManagerInner {
    pool: BrowserPool,
    config: RecorderConfig,
    sessions: DashMap<Uuid, Arc<RecorderSession>>,
    shutdown: CancellationToken,
}

/// Owns all live recorder sessions and their background tasks.
#[derive(Clone)]
pub struct RecorderManager {
    inner: Arc<ManagerInner>,
}

impl RecorderManager {
    pub fn new(pool: BrowserPool, config: RecorderConfig) -> Self {
        let inner = Arc::new(ManagerInner {
            pool,
            config,
            sessions: DashMap::new(),
            shutdown: CancellationToken::new(),
        });

        let manager = Self { inner };
        manager.spawn_idle_task();
        manager
    }

    /// Acquire a browser session at `url`, install the capture script, and
    /// register a new recorder session in `Created` state.
    pub async fn create_session(
        &self,
        url: &str,
        frame_rate: Option<u32>,
    ) -> RecorderResult<SessionTopics> {
        let fps = self.inner.config.clamp_fps(frame_rate);
        let handle = self.inner.pool.acquire(url, WaitPolicy::Load).await?;

        if let Err(e) = self.install_capture(&handle).await {
            // Unwind the acquisition; the pool must not leak the session.
            if let Err(release_err) = handle.release().await {
                warn!(error = %release_err, "Release failed after capture install error");
            }
            return Err(e);
        }

        let id = Uuid::new_v4();
        let session = Arc::new(RecorderSession::new(
            id,
            url.to_string(),
            fps,
            handle,
            self.inner.config.frame_buffer,
            self.inner.config.action_buffer,
        ));
        self.inner.sessions.insert(id, session);

        info!(session_id = %id, url = %url, fps, "Recorder session created");
        Ok(SessionTopics {
            session_id: id,
            frames: format!("recorder/{}/frames", id),
            actions: format!("recorder/{}/actions", id),
        })
    }

    /// Begin recording: enable the event sink and start snapshot streaming.
    pub async fn start(&self, id: Uuid) -> RecorderResult<()> {
        let session = self.get(id)?;
        session
            .transition(RecorderState::Recording)
            .map_err(|state| RecorderError::InvalidState {
                operation: "start",
                state: state.as_str(),
            })?;

        let cancel = CancellationToken::new();
        *session.recording.lock().await = Some(cancel.clone());
        session.touch();

        self.spawn_sink_task(session.clone(), cancel.clone());
        self.spawn_snapshot_task(session.clone(), cancel);

        info!(session_id = %id, "Recording started");
        Ok(())
    }

    /// Stop recording; the captured action list is retained.
    pub async fn stop(&self, id: Uuid) -> RecorderResult<()> {
        let session = self.get(id)?;
        session
            .transition(RecorderState::Stopped)
            .map_err(|state| RecorderError::InvalidState {
                operation: "stop",
                state: state.as_str(),
            })?;

        if let Some(cancel) = session.recording.lock().await.take() {
            cancel.cancel();
        }
        session.touch();

        info!(session_id = %id, actions = session.actions().len(), "Recording stopped");
        Ok(())
    }

    pub fn get_actions(&self, id: Uuid) -> RecorderResult<Vec<Action>> {
        let session = self.get(id)?;
        session.touch();
        Ok(session.actions())
    }

    pub fn subscribe_frames(&self, id: Uuid) -> RecorderResult<broadcast::Receiver<DomSnapshot>> {
        Ok(self.get(id)?.subscribe_frames())
    }

    pub fn subscribe_actions(&self, id: Uuid) -> RecorderResult<broadcast::Receiver<Action>> {
        Ok(self.get(id)?.subscribe_actions())
    }

    pub fn session_state(&self, id: Uuid) -> RecorderResult<RecorderState> {
        Ok(self.get(id)?.state())
    }

    /// Close a session from any state: cancel its tasks, release the
    /// underlying browser session, evict the record.
    pub async fn close(&self, id: Uuid) -> RecorderResult<()> {
        let (_, session) = self
            .inner
            .sessions
            .remove(&id)
            .ok_or(RecorderError::SessionNotFound(id))?;

        let _ = session.transition(RecorderState::Closed);
        if let Some(cancel) = session.recording.lock().await.take() {
            cancel.cancel();
        }
        if let Some(handle) = session.handle.lock().await.take() {
            if let Err(e) = handle.release().await {
                warn!(session_id = %id, error = %e, "Browser session release failed on close");
            }
        }

        info!(session_id = %id, "Recorder session closed");
        Ok(())
    }

    /// Close every session and stop the idle tick.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let ids: Vec<Uuid> = self.inner.sessions.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Err(e) = self.close(id).await {
                warn!(session_id = %id, error = %e, "Error closing session during shutdown");
            }
        }
        info!("Recorder manager shut down");
    }

    fn get(&self, id: Uuid) -> RecorderResult<Arc<RecorderSession>> {
        self.inner
            .sessions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(RecorderError::SessionNotFound(id))
    }

    async fn install_capture(&self, handle: &SessionHandle) -> RecorderResult<()> {
        let page = handle.page().await?;
        // Reinstalls on every navigation within the session.
        page.execute(AddScriptToEvaluateOnNewDocumentParams {
            source: CAPTURE_JS.to_string(),
            include_command_line_api: None,
            world_name: None,
            run_immediately: None,
        })
        .await
        .map_err(|e| RecorderError::Script(e.to_string()))?;
        // The initial document is already past init; install directly too.
        page.evaluate(CAPTURE_JS)
            .await
            .map_err(|e| RecorderError::Script(e.to_string()))?;
        Ok(())
    }

    /// Single consumer of the in-page capture queue: drains events, maps
    /// them to actions, appends and broadcasts.
    fn spawn_sink_task(&self, session: Arc<RecorderSession>, cancel: CancellationToken) {
        let poll = self.inner.config.event_poll_interval;
        tokio::spawn(async move {
            let mut tick = interval(poll);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        let events = drain_events(&session).await;
                        for event in events {
                            if let Some(action) = event_to_action(&event) {
                                debug!(session_id = %session.id(), action = %action.label(), "Captured action");
                                session.record_action(action);
                                session.touch();
                            }
                        }
                    }
                }
            }
            debug!(session_id = %session.id(), "Capture sink stopped");
        });
    }

    /// Streams one DomSnapshot per tick at the session's frame rate.
    fn spawn_snapshot_task(&self, session: Arc<RecorderSession>, cancel: CancellationToken) {
        let frame_interval = Duration::from_millis(1000 / session.frame_rate().max(1) as u64);
        tokio::spawn(async move {
            let mut tick = interval(frame_interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        match capture_snapshot(&session).await {
                            Ok(Some(payload)) => session.publish_snapshot(payload),
                            Ok(None) => break,
                            Err(e) => {
                                warn!(session_id = %session.id(), error = %e, "Snapshot capture failed");
                            }
                        }
                    }
                }
            }
            debug!(session_id = %session.id(), "Snapshot stream stopped");
        });
    }

    fn spawn_idle_task(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut tick = interval(manager.inner.config.idle_check_interval);
            loop {
                tokio::select! {
                    _ = manager.inner.shutdown.cancelled() => break,
                    _ = tick.tick() => {
                        let idle_window = manager.inner.config.idle_timeout;
                        let stale: Vec<Uuid> = manager
                            .inner
                            .sessions
                            .iter()
                            .filter(|entry| entry.value().is_idle(idle_window))
                            .map(|entry| *entry.key())
                            .collect();
                        for id in stale {
                            info!(session_id = %id, "Closing idle recorder session");
                            if let Err(e) = manager.close(id).await {
                                warn!(session_id = %id, error = %e, "Idle close failed");
                            }
                        }
                    }
                }
            }
        });
    }
}

/// Drain the capture queue; a vanished session yields nothing.
async fn drain_events(session: &RecorderSession) -> Vec<CapturedEvent> {
    let guard = session.handle.lock().await;
    let Some(handle) = guard.as_ref() else {
        return Vec::new();
    };
    let page = match handle.page().await {
        Ok(page) => page,
        Err(_) => return Vec::new(),
    };
    match page.evaluate(DRAIN_JS).await {
        Ok(result) => result.into_value().unwrap_or_default(),
        Err(e) => {
            warn!(session_id = %session.id(), error = %e, "Event drain failed");
            Vec::new()
        }
    }
}

/// Capture one snapshot payload; `None` means the session's page is gone.
async fn capture_snapshot(
    session: &RecorderSession,
) -> Result<Option<SnapshotPayload>, String> {
    let guard = session.handle.lock().await;
    let Some(handle) = guard.as_ref() else {
        return Ok(None);
    };
    let page = handle.page().await.map_err(|e| e.to_string())?;
    let payload: SnapshotPayload = page
        .evaluate(SNAPSHOT_JS)
        .await
        .map_err(|e| format!("snapshot script failed: {}", e))?
        .into_value()
        .map_err(|e| format!("snapshot result unreadable: {}", e))?;
    Ok(Some(payload))
}
