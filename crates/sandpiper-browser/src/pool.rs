//! Bounded pool of headless browsers vending exclusive page sessions.
//!
//! One mutex guards the pool state (free list, in-use map, counters); a
//! semaphore enforces the session cap and blocks `acquire` callers until a
//! release. Each session's page sits behind its own async mutex, so a
//! session is only ever driven by one task at a time.

use crate::errors::{BrowserError, BrowserResult};
use crate::navigator::Navigator;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use sandpiper_config::{NavigationConfig, PoolConfig};
use sandpiper_types::WaitPolicy;
use std::collections::{HashMap, VecDeque};
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};
use tokio::time::{interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub type SessionId = Uuid;

type PageSlot = Arc<Mutex<Option<Page>>>;

/// One launched browser process, reusable across sessions.
struct PooledBrowser {
    id: String,
    browser: Browser,
    last_used: Instant,
    handler_task: tokio::task::JoinHandle<()>,
    // Profile directory must outlive the browser process.
    _temp_dir: TempDir,
}

impl PooledBrowser {
    async fn launch() -> BrowserResult<Self> {
        let id = Uuid::new_v4().to_string();

        // Chrome holds a SingletonLock per profile; every instance needs its
        // own directory to run concurrently.
        let temp_dir =
            TempDir::new().map_err(|e| BrowserError::unavailable(format!("profile dir: {}", e)))?;

        let config = BrowserConfig::builder()
            .user_data_dir(temp_dir.path())
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-extensions")
            .arg("--disable-background-timer-throttling")
            .arg("--disable-backgrounding-occluded-windows")
            .arg("--disable-renderer-backgrounding")
            .build()
            .map_err(|e| BrowserError::unavailable(format!("browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::unavailable(format!("launch failed: {}", e)))?;

        let browser_id = id.clone();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!(browser_id = %browser_id, error = %e, "Browser event error");
                }
            }
            debug!(browser_id = %browser_id, "Browser event handler ended");
        });

        debug!(browser_id = %id, "Launched browser instance");
        Ok(Self {
            id,
            browser,
            last_used: Instant::now(),
            handler_task,
            _temp_dir: temp_dir,
        })
    }

    fn is_idle(&self, idle_timeout: Duration) -> bool {
        self.last_used.elapsed() > idle_timeout
    }

    async fn cleanup(&mut self) {
        self.handler_task.abort();
        if let Err(e) = self.browser.close().await {
            warn!(browser_id = %self.id, error = %e, "Error closing browser");
        }
        debug!(browser_id = %self.id, "Browser cleaned up");
    }
}

impl Drop for PooledBrowser {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

/// Pool lifecycle events for monitoring.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    SessionCreated { id: SessionId },
    SessionReleased { id: SessionId, reused: bool },
    SessionEvicted { id: SessionId, reason: String },
    BrowserEvicted { browser_id: String, reason: String },
}

/// Point-in-time pool counters.
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub in_use: usize,
    pub idle: usize,
    pub capacity: usize,
    pub utilization: f64,
}

/// A session currently vended to a caller.
struct ActiveSession {
    page: PageSlot,
    url: String,
    browser: Option<PooledBrowser>,
    last_used: Instant,
    _permit: OwnedSemaphorePermit,
}

struct PoolState {
    idle: VecDeque<PooledBrowser>,
    in_use: HashMap<SessionId, ActiveSession>,
    closed: bool,
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
    semaphore: Arc<Semaphore>,
    navigator: Navigator,
    events: mpsc::UnboundedSender<PoolEvent>,
    shutdown: CancellationToken,
}

/// The browser session manager. Cheap to clone; all clones share the pool.
#[derive(Clone)]
pub struct BrowserPool {
    inner: Arc<PoolInner>,
    event_receiver: Arc<Mutex<mpsc::UnboundedReceiver<PoolEvent>>>,
}

impl BrowserPool {
    pub fn new(config: PoolConfig, navigation: NavigationConfig) -> Self {
        let (events, event_receiver) = mpsc::unbounded_channel();
        let inner = Arc::new(PoolInner {
            semaphore: Arc::new(Semaphore::new(config.max_sessions)),
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                in_use: HashMap::new(),
                closed: false,
            }),
            navigator: Navigator::new(navigation),
            events,
            shutdown: CancellationToken::new(),
            config,
        });

        Self::spawn_eviction_task(inner.clone());

        info!(
            max_sessions = inner.config.max_sessions,
            idle_timeout_secs = inner.config.idle_timeout.as_secs(),
            "Browser pool initialized"
        );

        Self {
            inner,
            event_receiver: Arc::new(Mutex::new(event_receiver)),
        }
    }

    /// Acquire a session with its page already navigated to `url` under
    /// `wait`. Blocks (bounded) when the pool is at capacity.
    pub async fn acquire(&self, url: &str, wait: WaitPolicy) -> BrowserResult<SessionHandle> {
        if self.inner.shutdown.is_cancelled() {
            return Err(BrowserError::ShutDown);
        }

        // Idle browsers are reaped on every acquire attempt as well as on
        // the periodic tick.
        self.evict_idle().await;

        let waited = Instant::now();
        let permit = match timeout(
            self.inner.config.acquire_timeout,
            self.inner.semaphore.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(BrowserError::ShutDown),
            Err(_) => {
                return Err(BrowserError::PoolExhausted {
                    waited_ms: waited.elapsed().as_millis() as u64,
                })
            }
        };

        let reusable = {
            let mut state = self.inner.state.lock().await;
            if state.closed {
                return Err(BrowserError::ShutDown);
            }
            state.idle.pop_front()
        };

        let mut browser = match reusable {
            Some(browser) => browser,
            None => PooledBrowser::launch().await?,
        };
        browser.last_used = Instant::now();

        let page = match browser.browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                browser.cleanup().await;
                return Err(BrowserError::unavailable(format!("new page: {}", e)));
            }
        };

        if let Err(e) = self.inner.navigator.navigate(&page, url, wait).await {
            if let Err(close_err) = page.close().await {
                warn!(error = %close_err, "Error closing page after failed navigation");
            }
            browser.cleanup().await;
            return Err(e);
        }

        let id = Uuid::new_v4();
        let slot: PageSlot = Arc::new(Mutex::new(Some(page)));
        {
            let mut state = self.inner.state.lock().await;
            if state.closed {
                // Shutdown raced the acquire; unwind what we allocated.
                drop(state);
                self.close_slot(&slot).await;
                browser.cleanup().await;
                return Err(BrowserError::ShutDown);
            }
            state.in_use.insert(
                id,
                ActiveSession {
                    page: slot.clone(),
                    url: url.to_string(),
                    browser: Some(browser),
                    last_used: Instant::now(),
                    _permit: permit,
                },
            );
        }

        let _ = self.inner.events.send(PoolEvent::SessionCreated { id });
        debug!(session_id = %id, url = %url, "Session acquired");

        Ok(SessionHandle {
            id,
            slot,
            pool: self.clone(),
            released: false,
        })
    }

    /// Look up an in-use session by id. The returned reference serializes
    /// page access through the session's own lock.
    pub async fn get(&self, id: SessionId) -> Option<SessionRef> {
        let state = self.inner.state.lock().await;
        state.in_use.get(&id).map(|session| SessionRef {
            id,
            slot: session.page.clone(),
            pool: self.clone(),
        })
    }

    /// Return a session to the pool. The page is closed; the browser goes
    /// back to the free list when reuse is enabled.
    pub async fn release(&self, id: SessionId) -> BrowserResult<()> {
        let session = {
            let mut state = self.inner.state.lock().await;
            state
                .in_use
                .remove(&id)
                .ok_or_else(|| BrowserError::SessionNotFound(id.to_string()))?
        };

        self.close_slot(&session.page).await;

        let reused = if let Some(mut browser) = session.browser {
            browser.last_used = Instant::now();
            let mut state = self.inner.state.lock().await;
            if self.inner.config.reuse_sessions && !state.closed {
                state.idle.push_back(browser);
                true
            } else {
                drop(state);
                browser.cleanup().await;
                false
            }
        } else {
            false
        };

        let _ = self
            .inner
            .events
            .send(PoolEvent::SessionReleased { id, reused });
        debug!(session_id = %id, reused, "Session released");
        Ok(())
    }

    /// Mark a session as recently used.
    pub async fn touch(&self, id: SessionId) {
        let mut state = self.inner.state.lock().await;
        if let Some(session) = state.in_use.get_mut(&id) {
            session.last_used = Instant::now();
        }
    }

    pub async fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock().await;
        let capacity = self.inner.config.max_sessions;
        PoolStats {
            in_use: state.in_use.len(),
            idle: state.idle.len(),
            capacity,
            utilization: if capacity > 0 {
                state.in_use.len() as f64 / capacity as f64
            } else {
                0.0
            },
        }
    }

    pub fn events(&self) -> Arc<Mutex<mpsc::UnboundedReceiver<PoolEvent>>> {
        self.event_receiver.clone()
    }

    /// Shut the pool down: refuse new acquires, close every session and
    /// browser deterministically.
    pub async fn stop(&self) {
        info!("Shutting down browser pool");
        self.inner.shutdown.cancel();
        self.inner.semaphore.close();

        let (idle, in_use) = {
            let mut state = self.inner.state.lock().await;
            state.closed = true;
            (
                std::mem::take(&mut state.idle),
                std::mem::take(&mut state.in_use),
            )
        };

        for mut browser in idle {
            browser.cleanup().await;
        }
        for (id, session) in in_use {
            self.close_slot(&session.page).await;
            if let Some(mut browser) = session.browser {
                browser.cleanup().await;
            }
            let _ = self.inner.events.send(PoolEvent::SessionEvicted {
                id,
                reason: "pool shutdown".to_string(),
            });
        }

        info!("Browser pool shutdown complete");
    }

    async fn close_slot(&self, slot: &PageSlot) {
        let page = slot.lock().await.take();
        if let Some(page) = page {
            if let Err(e) = page.close().await {
                warn!(error = %e, "Error closing page");
            }
        }
    }

    /// Reap idle free-list browsers and abandoned in-use sessions.
    async fn evict_idle(&self) {
        let idle_timeout = self.inner.config.idle_timeout;

        let (expired_browsers, abandoned) = {
            let mut state = self.inner.state.lock().await;

            let mut expired = Vec::new();
            let mut keep = VecDeque::new();
            while let Some(browser) = state.idle.pop_front() {
                if browser.is_idle(idle_timeout) {
                    expired.push(browser);
                } else {
                    keep.push_back(browser);
                }
            }
            state.idle = keep;

            // In-use sessions whose holders went quiet past the idle window
            // are force-released, unless a task is actively on the page.
            let stale_ids: Vec<SessionId> = state
                .in_use
                .iter()
                .filter(|(_, s)| {
                    s.last_used.elapsed() > idle_timeout && s.page.try_lock().is_ok()
                })
                .map(|(id, _)| *id)
                .collect();

            let mut abandoned = Vec::new();
            for id in stale_ids {
                if let Some(session) = state.in_use.remove(&id) {
                    abandoned.push((id, session));
                }
            }
            (expired, abandoned)
        };

        for mut browser in expired_browsers {
            let browser_id = browser.id.clone();
            browser.cleanup().await;
            let _ = self.inner.events.send(PoolEvent::BrowserEvicted {
                browser_id,
                reason: "idle timeout".to_string(),
            });
        }

        for (id, session) in abandoned {
            warn!(session_id = %id, url = %session.url, "Evicting abandoned session");
            self.close_slot(&session.page).await;
            if let Some(mut browser) = session.browser {
                browser.cleanup().await;
            }
            let _ = self.inner.events.send(PoolEvent::SessionEvicted {
                id,
                reason: "idle timeout".to_string(),
            });
        }
    }

    fn spawn_eviction_task(inner: Arc<PoolInner>) {
        let pool = BrowserPool {
            inner: inner.clone(),
            // The tick task never reads events.
            event_receiver: Arc::new(Mutex::new(mpsc::unbounded_channel::<PoolEvent>().1)),
        };
        tokio::spawn(async move {
            let mut tick = interval(pool.inner.config.eviction_interval);
            loop {
                tokio::select! {
                    _ = tick.tick() => pool.evict_idle().await,
                    _ = pool.inner.shutdown.cancelled() => {
                        debug!("Pool eviction task stopped");
                        break;
                    }
                }
            }
        });
    }
}

/// Exclusive guard over a session's page. Holding the guard is what makes
/// the session single-owner; drop it between operations that may take long.
pub struct PageGuard {
    guard: OwnedMutexGuard<Option<Page>>,
}

impl Deref for PageGuard {
    type Target = Page;

    fn deref(&self) -> &Page {
        // The slot is only emptied by release/shutdown, which require the
        // lock this guard is holding.
        self.guard.as_ref().expect("page present while guard held")
    }
}

async fn lock_page(slot: &PageSlot, id: SessionId) -> BrowserResult<PageGuard> {
    let guard = slot.clone().lock_owned().await;
    if guard.is_none() {
        return Err(BrowserError::SessionNotFound(id.to_string()));
    }
    Ok(PageGuard { guard })
}

/// Owning handle returned by [`BrowserPool::acquire`]. Not cloneable: the
/// pool never vends one session to two callers.
pub struct SessionHandle {
    id: SessionId,
    slot: PageSlot,
    pool: BrowserPool,
    released: bool,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Lock the session's page for a run of operations.
    pub async fn page(&self) -> BrowserResult<PageGuard> {
        self.pool.touch(self.id).await;
        lock_page(&self.slot, self.id).await
    }

    /// Return the session to the pool. Preferred over relying on drop.
    pub async fn release(mut self) -> BrowserResult<()> {
        self.released = true;
        self.pool.release(self.id).await
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if !self.released {
            let pool = self.pool.clone();
            let id = self.id;
            warn!(session_id = %id, "Session handle dropped without release; releasing in background");
            tokio::spawn(async move {
                if let Err(e) = pool.release(id).await {
                    error!(session_id = %id, error = %e, "Background release failed");
                }
            });
        }
    }
}

/// Non-owning reference from [`BrowserPool::get`]. Page access still goes
/// through the session's lock, so concurrent callers serialize.
pub struct SessionRef {
    id: SessionId,
    slot: PageSlot,
    pool: BrowserPool,
}

impl SessionRef {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub async fn page(&self) -> BrowserResult<PageGuard> {
        self.pool.touch(self.id).await;
        lock_page(&self.slot, self.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stats_start_empty() {
        let pool = BrowserPool::new(PoolConfig::default(), NavigationConfig::default());
        let stats = pool.stats().await;
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.capacity, 5);
        assert_eq!(stats.utilization, 0.0);
        pool.stop().await;
    }

    #[tokio::test]
    async fn acquire_after_stop_is_refused() {
        let pool = BrowserPool::new(PoolConfig::default(), NavigationConfig::default());
        pool.stop().await;
        let err = pool.acquire("about:blank", WaitPolicy::Load).await;
        assert!(matches!(err, Err(BrowserError::ShutDown)));
    }

    #[tokio::test]
    async fn get_of_unknown_session_is_none() {
        let pool = BrowserPool::new(PoolConfig::default(), NavigationConfig::default());
        assert!(pool.get(Uuid::new_v4()).await.is_none());
        pool.stop().await;
    }

    #[tokio::test]
    async fn release_of_unknown_session_is_not_found() {
        let pool = BrowserPool::new(PoolConfig::default(), NavigationConfig::default());
        let err = pool.release(Uuid::new_v4()).await;
        assert!(matches!(err, Err(BrowserError::SessionNotFound(_))));
        pool.stop().await;
    }

    #[tokio::test]
    #[ignore = "requires Chrome - run with: cargo test -- --ignored"]
    async fn acquire_and_release_cycle() {
        let pool = BrowserPool::new(PoolConfig::default(), NavigationConfig::default());

        let session = pool.acquire("about:blank", WaitPolicy::Load).await.unwrap();
        let stats = pool.stats().await;
        assert_eq!(stats.in_use, 1);

        // An in-use session is reachable by id, and page access serializes
        // through the session lock.
        let session_id = session.id();
        let session_ref = pool.get(session_id).await.expect("session is in use");
        assert_eq!(session_ref.id(), session_id);
        drop(session_ref.page().await.expect("page lock"));

        session.release().await.unwrap();
        assert!(pool.get(session_id).await.is_none());
        let stats = pool.stats().await;
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.idle, 1);

        pool.stop().await;
    }

    #[tokio::test]
    #[ignore = "requires Chrome - run with: cargo test -- --ignored"]
    async fn pool_cap_blocks_and_single_release_unblocks_one_waiter() {
        let config = PoolConfig {
            max_sessions: 2,
            acquire_timeout: Duration::from_secs(30),
            ..Default::default()
        };
        let pool = BrowserPool::new(config, NavigationConfig::default());

        let first = pool.acquire("about:blank", WaitPolicy::Load).await.unwrap();
        let _second = pool.acquire("about:blank", WaitPolicy::Load).await.unwrap();
        assert_eq!(pool.stats().await.in_use, 2);

        // The third acquire parks until a release.
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire("about:blank", WaitPolicy::Load).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!waiter.is_finished());

        first.release().await.unwrap();
        let third = waiter.await.unwrap().unwrap();
        assert_eq!(pool.stats().await.in_use, 2);

        third.release().await.unwrap();
        pool.stop().await;
    }

    #[tokio::test]
    #[ignore = "requires Chrome - run with: cargo test -- --ignored"]
    async fn idle_browsers_are_evicted_before_next_acquire() {
        let config = PoolConfig {
            idle_timeout: Duration::from_millis(100),
            eviction_interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let pool = BrowserPool::new(config, NavigationConfig::default());

        let session = pool.acquire("about:blank", WaitPolicy::Load).await.unwrap();
        session.release().await.unwrap();
        assert_eq!(pool.stats().await.idle, 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let session = pool.acquire("about:blank", WaitPolicy::Load).await.unwrap();
        // The stale browser was reaped on the acquire path; this session got
        // a fresh one and the free list stayed empty.
        assert_eq!(pool.stats().await.idle, 0);
        session.release().await.unwrap();
        pool.stop().await;
    }
}
