//! Per-session state: lifecycle, captured actions, broadcast channels.

use chrono::{DateTime, Utc};
use sandpiper_browser::SessionHandle;
use sandpiper_types::{Action, DomSnapshot, RecorderState, ScrollPosition, StylesheetRef, Viewport};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Raw value returned by the snapshot script.
#[derive(Debug, Deserialize)]
pub(crate) struct SnapshotPayload {
    pub html: String,
    pub url: String,
    pub stylesheets: Vec<StylesheetRef>,
    pub viewport: Viewport,
    pub scroll: ScrollPosition,
}

/// Summary of a session's snapshot stream, for diagnostics.
#[derive(Debug, Clone)]
pub struct SessionSnapshotInfo {
    pub frames_emitted: u64,
    pub frame_rate: u32,
}

/// One live recorder session. The manager holds these behind `Arc`; the
/// sink and snapshot tasks share them.
pub struct RecorderSession {
    id: Uuid,
    url: String,
    frame_rate: u32,
    created_at: DateTime<Utc>,
    state: StdMutex<RecorderState>,
    /// Owning handle on the pooled browser session; taken on close.
    pub(crate) handle: Mutex<Option<SessionHandle>>,
    actions: StdMutex<Vec<Action>>,
    frames_tx: broadcast::Sender<DomSnapshot>,
    actions_tx: broadcast::Sender<Action>,
    sequence: AtomicU64,
    last_activity: StdMutex<Instant>,
    /// Cancels the sink + snapshot tasks of the current recording run.
    pub(crate) recording: Mutex<Option<CancellationToken>>,
}

impl RecorderSession {
    pub(crate) fn new(
        id: Uuid,
        url: String,
        frame_rate: u32,
        handle: SessionHandle,
        frame_buffer: usize,
        action_buffer: usize,
    ) -> Self {
        // Frames drop oldest when a subscriber lags; the action buffer is
        // deep enough that real capture rates never wrap it.
        let (frames_tx, _) = broadcast::channel(frame_buffer.max(1));
        let (actions_tx, _) = broadcast::channel(action_buffer.max(1));
        Self {
            id,
            url,
            frame_rate,
            created_at: Utc::now(),
            state: StdMutex::new(RecorderState::Created),
            handle: Mutex::new(Some(handle)),
            actions: StdMutex::new(Vec::new()),
            frames_tx,
            actions_tx,
            sequence: AtomicU64::new(0),
            last_activity: StdMutex::new(Instant::now()),
            recording: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> RecorderState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply a state transition if the machine allows it.
    pub(crate) fn transition(&self, to: RecorderState) -> Result<(), RecorderState> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if transition_allowed(*state, to) {
            debug!(session_id = %self.id, from = %state.as_str(), to = %to.as_str(), "Recorder state change");
            *state = to;
            Ok(())
        } else {
            Err(*state)
        }
    }

    pub(crate) fn touch(&self) {
        *self.last_activity.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    pub(crate) fn is_idle(&self, window: Duration) -> bool {
        self.last_activity
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
            > window
    }

    /// Append a captured action and fan it out to subscribers.
    pub(crate) fn record_action(&self, action: Action) {
        self.actions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(action.clone());
        let _ = self.actions_tx.send(action);
    }

    pub fn actions(&self) -> Vec<Action> {
        self.actions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Build and publish the next snapshot frame.
    pub(crate) fn publish_snapshot(&self, payload: SnapshotPayload) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let approx_bytes = payload.html.len()
            + payload
                .stylesheets
                .iter()
                .map(|s| s.content.as_deref().map(str::len).unwrap_or(0))
                .sum::<usize>();

        let snapshot = DomSnapshot {
            sequence,
            timestamp: Utc::now(),
            url: payload.url,
            html: payload.html,
            stylesheets: payload.stylesheets,
            viewport: payload.viewport,
            scroll: payload.scroll,
            approx_bytes,
        };
        let _ = self.frames_tx.send(snapshot);
    }

    pub fn snapshot_info(&self) -> SessionSnapshotInfo {
        SessionSnapshotInfo {
            frames_emitted: self.sequence.load(Ordering::Relaxed),
            frame_rate: self.frame_rate,
        }
    }

    pub fn subscribe_frames(&self) -> broadcast::Receiver<DomSnapshot> {
        self.frames_tx.subscribe()
    }

    pub fn subscribe_actions(&self) -> broadcast::Receiver<Action> {
        self.actions_tx.subscribe()
    }
}

/// `Created -> Recording -> Stopped -> Closed`, with `Closed` reachable
/// from everywhere.
pub(crate) fn transition_allowed(from: RecorderState, to: RecorderState) -> bool {
    matches!(
        (from, to),
        (RecorderState::Created, RecorderState::Recording)
            | (RecorderState::Recording, RecorderState::Stopped)
            | (_, RecorderState::Closed)
    )
}
