//! URL loading under a wait policy, with bounded retries.

use crate::errors::{BrowserError, BrowserResult};
use chromiumoxide::Page;
use sandpiper_config::NavigationConfig;
use sandpiper_types::WaitPolicy;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

/// Polling period for readiness checks inside a navigation attempt.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Quiet window that counts as "network idle".
const NETWORK_IDLE_WINDOW: Duration = Duration::from_millis(500);

/// Drives page navigation. Stateless apart from its configuration, so it is
/// cheap to clone into the pool and executors.
#[derive(Debug, Clone)]
pub struct Navigator {
    config: NavigationConfig,
}

impl Navigator {
    pub fn new(config: NavigationConfig) -> Self {
        Self { config }
    }

    /// Navigate `page` to `url` and wait until `policy` is satisfied.
    ///
    /// Transient failures are retried with exponential backoff up to the
    /// configured attempt count; the last failure is returned as
    /// [`BrowserError::NavigationFailed`].
    pub async fn navigate(&self, page: &Page, url: &str, policy: WaitPolicy) -> BrowserResult<()> {
        let mut last_error = String::new();

        for attempt in 1..=self.config.max_attempts {
            if attempt > 1 {
                let backoff = self.config.backoff_base * 2u32.pow(attempt - 2);
                debug!(url = %url, attempt, backoff_ms = backoff.as_millis() as u64, "Retrying navigation");
                sleep(backoff).await;
            }

            match self.attempt(page, url, policy).await {
                Ok(()) => {
                    debug!(url = %url, attempt, policy = %policy, "Navigation complete");
                    return Ok(());
                }
                Err(e) => {
                    warn!(url = %url, attempt, error = %e, "Navigation attempt failed");
                    last_error = e;
                }
            }
        }

        Err(BrowserError::NavigationFailed {
            url: url.to_string(),
            attempts: self.config.max_attempts,
            reason: last_error,
        })
    }

    async fn attempt(&self, page: &Page, url: &str, policy: WaitPolicy) -> Result<(), String> {
        timeout(self.config.timeout, page.goto(url))
            .await
            .map_err(|_| format!("navigation timed out after {:?}", self.config.timeout))?
            .map_err(|e| format!("goto failed: {}", e))?;

        timeout(self.config.timeout, self.await_policy(page, policy))
            .await
            .map_err(|_| format!("wait condition {} timed out", policy))?
    }

    async fn await_policy(&self, page: &Page, policy: WaitPolicy) -> Result<(), String> {
        match policy {
            WaitPolicy::DomContentLoaded => self.poll_ready_state(page, false).await,
            WaitPolicy::Load => self.poll_ready_state(page, true).await,
            WaitPolicy::NetworkIdle => {
                self.poll_ready_state(page, true).await?;
                self.await_network_idle(page).await
            }
        }
    }

    /// Poll `document.readyState` until the document is interactive
    /// (`require_complete = false`) or fully loaded.
    async fn poll_ready_state(&self, page: &Page, require_complete: bool) -> Result<(), String> {
        loop {
            let state: String = page
                .evaluate("document.readyState")
                .await
                .map_err(|e| format!("readyState check failed: {}", e))?
                .into_value()
                .map_err(|e| format!("readyState result unreadable: {}", e))?;

            let satisfied = if require_complete {
                state == "complete"
            } else {
                state != "loading"
            };
            if satisfied {
                return Ok(());
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// The resource-timing entry count must hold still for the idle window.
    async fn await_network_idle(&self, page: &Page) -> Result<(), String> {
        let mut last_count: Option<u64> = None;
        let mut stable_since = Instant::now();

        loop {
            let count: u64 = page
                .evaluate("performance.getEntriesByType('resource').length")
                .await
                .map_err(|e| format!("resource count check failed: {}", e))?
                .into_value()
                .map_err(|e| format!("resource count unreadable: {}", e))?;

            if last_count == Some(count) {
                if stable_since.elapsed() >= NETWORK_IDLE_WINDOW {
                    return Ok(());
                }
            } else {
                last_count = Some(count);
                stable_since = Instant::now();
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let config = NavigationConfig::default();
        // Attempt 2 waits base, attempt 3 waits 2x base.
        assert_eq!(config.backoff_base * 2u32.pow(0), config.backoff_base);
        assert_eq!(config.backoff_base * 2u32.pow(1), config.backoff_base * 2);
    }

    #[tokio::test]
    #[ignore = "requires Chrome - run with: cargo test -- --ignored"]
    async fn navigate_succeeds_against_blank_page() {
        use chromiumoxide::{Browser, BrowserConfig};
        use futures::StreamExt;

        let (browser, mut handler) = Browser::launch(
            BrowserConfig::builder()
                .arg("--no-sandbox")
                .build()
                .expect("browser config"),
        )
        .await
        .expect("launch browser");
        tokio::spawn(async move { while handler.next().await.is_some() {} });

        let page = browser.new_page("about:blank").await.expect("new page");
        let navigator = Navigator::new(NavigationConfig::default());
        navigator
            .navigate(&page, "about:blank", WaitPolicy::Load)
            .await
            .expect("navigate");
    }
}
