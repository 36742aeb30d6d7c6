//! Cache policy over the cached-response store.

use crate::fingerprint::fingerprint;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sandpiper_config::CacheConfig;
use sandpiper_persistence::{CachedResponse, CachedResponseStore, PersistenceResult};
use sandpiper_types::{ExtractionRequest, StrategyOutput};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A fresh entry returned from lookup.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub key: String,
    pub data: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub expires_at: DateTime<Utc>,
    pub hit_count: u64,
}

/// Process-local hit/miss counters.
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// TTL-bounded, content-addressed cache of extraction results.
#[derive(Clone)]
pub struct ResponseCache {
    store: CachedResponseStore,
    config: CacheConfig,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    shutdown: CancellationToken,
}

impl ResponseCache {
    pub fn new(store: CachedResponseStore, config: CacheConfig) -> Self {
        Self {
            store,
            config,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Compute the request's fingerprint without touching the store.
    pub fn key_for(&self, request: &ExtractionRequest) -> String {
        fingerprint(request)
    }

    /// Look up a fresh entry. A hit increments the stored hit counter
    /// atomically and the process-local hit counter; a miss only the local
    /// one.
    pub async fn lookup(
        &self,
        request: &ExtractionRequest,
    ) -> PersistenceResult<Option<CacheHit>> {
        let key = fingerprint(request);
        match self.store.get_fresh(&key, Utc::now()).await? {
            Some(row) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                let metadata = serde_json::from_str(&row.metadata_json).unwrap_or_default();
                debug!(key = %key, url = %request.url, "Cache hit");
                Ok(Some(CacheHit {
                    key,
                    data: row.data,
                    metadata,
                    expires_at: row.expires_at,
                    hit_count: row.hit_count,
                }))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, url = %request.url, "Cache miss");
                Ok(None)
            }
        }
    }

    /// Store a strategy output under the request's fingerprint with the
    /// kind's TTL. Returns the key and expiry.
    pub async fn store(
        &self,
        request: &ExtractionRequest,
        output: &StrategyOutput,
    ) -> PersistenceResult<(String, DateTime<Utc>)> {
        let key = fingerprint(request);
        let now = Utc::now();
        let ttl = self.config.ttl_for(request.kind);
        let expires_at = now
            + ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::seconds(3600));

        let options_json = serde_json::to_string(&request.options)?;
        let metadata_json = serde_json::to_string(&output.metadata)?;

        self.store
            .put(&CachedResponse {
                fingerprint: key.clone(),
                url: request.url.clone(),
                kind: request.kind.as_str().to_string(),
                selector: request.selector.clone(),
                wait_policy: request.wait.as_str().to_string(),
                options_json,
                data: output.data.clone(),
                metadata_json,
                hit_count: 0,
                created_at: now,
                expires_at,
            })
            .await?;

        Ok((key, expires_at))
    }

    /// Delete all entries for a URL.
    pub async fn invalidate_url(&self, url: &str) -> PersistenceResult<u64> {
        let removed = self.store.delete_by_url(url).await?;
        info!(url = %url, removed, "Invalidated cache entries by URL");
        Ok(removed)
    }

    /// Delete all expired entries.
    pub async fn invalidate_expired(&self) -> PersistenceResult<u64> {
        self.store.delete_expired(Utc::now()).await
    }

    /// Drop everything.
    pub async fn flush(&self) -> PersistenceResult<u64> {
        let removed = self.store.flush().await?;
        info!(removed, "Flushed response cache");
        Ok(removed)
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Spawn the sweeper and observability timers. Both swallow their own
    /// errors; both stop on [`ResponseCache::stop`].
    pub fn start_timers(&self) {
        let sweeper = self.clone();
        tokio::spawn(async move {
            let mut tick = interval(sweeper.config.sweep_interval);
            tick.tick().await; // immediate first tick is a no-op
            loop {
                tokio::select! {
                    _ = tick.tick() => sweeper.sweep_once().await,
                    _ = sweeper.shutdown.cancelled() => {
                        debug!("Cache sweeper stopped");
                        break;
                    }
                }
            }
        });

        let reporter = self.clone();
        tokio::spawn(async move {
            let mut tick = interval(reporter.config.stats_interval);
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = tick.tick() => reporter.report_once().await,
                    _ = reporter.shutdown.cancelled() => {
                        debug!("Cache stats reporter stopped");
                        break;
                    }
                }
            }
        });
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// One sweep of expired entries.
    pub async fn sweep_once(&self) {
        match self.invalidate_expired().await {
            Ok(removed) if removed > 0 => {
                info!(removed, "Cache sweep removed expired entries")
            }
            Ok(_) => debug!("Cache sweep found nothing expired"),
            Err(e) => warn!(error = %e, "Cache sweep failed"),
        }
    }

    /// One observability report of store counters.
    pub async fn report_once(&self) {
        let horizon_ms = self.config.stats_interval.as_millis() as i64;
        match self.store.counts(Utc::now(), horizon_ms).await {
            Ok(counts) => {
                let metrics = self.metrics();
                info!(
                    total = counts.total,
                    stored_hits = counts.total_hits,
                    expiring_soon = counts.expiring_soon,
                    local_hits = metrics.hits,
                    local_misses = metrics.misses,
                    per_kind = ?counts.per_kind,
                    "Cache statistics"
                );
            }
            Err(e) => warn!(error = %e, "Cache statistics query failed"),
        }
    }
}
