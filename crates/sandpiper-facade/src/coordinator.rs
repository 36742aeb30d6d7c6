//! Extraction coordinator: cache in front, pool underneath.

use crate::errors::{ServiceError, ServiceResult};
use chrono::{DateTime, Utc};
use sandpiper_browser::BrowserPool;
use sandpiper_cache::ResponseCache;
use sandpiper_extraction::StrategyRegistry;
use sandpiper_types::{ExtractionKind, ExtractionRequest, StrategyOutput};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Cache disposition attached to every extraction response.
#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub hit: bool,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// The coordinator's output shape, consumed by the transport layer.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResponse {
    pub data: String,
    pub kind: ExtractionKind,
    pub selector: String,
    pub elapsed_ms: u64,
    pub metadata: HashMap<String, serde_json::Value>,
    pub cache: CacheInfo,
}

/// Validates, consults the cache, and on a miss drives a pooled session
/// through the registered strategy. Sessions are released on every path.
pub struct ExtractionCoordinator {
    pool: BrowserPool,
    cache: ResponseCache,
    registry: Arc<StrategyRegistry>,
}

impl ExtractionCoordinator {
    pub fn new(pool: BrowserPool, cache: ResponseCache, registry: Arc<StrategyRegistry>) -> Self {
        Self {
            pool,
            cache,
            registry,
        }
    }

    pub async fn extract(&self, request: ExtractionRequest) -> ServiceResult<ExtractionResponse> {
        validate(&request)?;
        let started = Instant::now();
        let key = self.cache.key_for(&request);

        // A broken cache must not take extraction down with it.
        match self.cache.lookup(&request).await {
            Ok(Some(hit)) => {
                return Ok(ExtractionResponse {
                    data: hit.data,
                    kind: request.kind,
                    selector: request.selector,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    metadata: hit.metadata,
                    cache: CacheInfo {
                        hit: true,
                        key: hit.key,
                        expires_at: Some(hit.expires_at),
                    },
                });
            }
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "Cache lookup failed; extracting fresh"),
        }

        let output = self.extract_fresh(&request).await?;

        // Store failures are logged; the result is still returned.
        let expires_at = match self.cache.store(&request, &output).await {
            Ok((_, expires_at)) => Some(expires_at),
            Err(e) => {
                warn!(key = %key, error = %e, "Cache store failed; returning uncached result");
                None
            }
        };

        Ok(ExtractionResponse {
            data: output.data,
            kind: request.kind,
            selector: request.selector,
            elapsed_ms: started.elapsed().as_millis() as u64,
            metadata: output.metadata,
            cache: CacheInfo {
                hit: false,
                key,
                expires_at,
            },
        })
    }

    /// Acquire, dispatch, release; no path leaks the session.
    async fn extract_fresh(&self, request: &ExtractionRequest) -> ServiceResult<StrategyOutput> {
        let strategy = self
            .registry
            .get(request.kind)
            .ok_or_else(|| {
                ServiceError::internal(format!("no strategy registered for {}", request.kind))
            })?
            .clone();

        let session = self.pool.acquire(&request.url, request.wait).await?;

        let result = {
            match session.page().await {
                Ok(page) => strategy
                    .extract(&page, &request.selector, &request.options)
                    .await
                    .map_err(ServiceError::from),
                Err(e) => Err(e.into()),
            }
        };

        if let Err(e) = session.release().await {
            warn!(url = %request.url, error = %e, "Session release failed after extraction");
        }

        debug!(
            url = %request.url,
            kind = %request.kind,
            success = result.is_ok(),
            "Extraction completed"
        );
        result
    }
}

fn validate(request: &ExtractionRequest) -> ServiceResult<()> {
    if request.url.trim().is_empty() {
        return Err(ServiceError::validation("url must not be empty"));
    }
    if request.selector.trim().is_empty() {
        return Err(ServiceError::validation("selector must not be empty"));
    }
    if !request.options.matches_kind(request.kind) {
        return Err(ServiceError::validation(format!(
            "options do not match extraction kind {}",
            request.kind
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandpiper_types::{CssOptions, ExtractionOptions};

    #[test]
    fn empty_url_and_selector_are_validation_errors() {
        let mut request = ExtractionRequest::new("", ExtractionKind::Html, "h1");
        assert!(validate(&request).is_err());

        request.url = "https://ex.com/".to_string();
        request.selector = "  ".to_string();
        assert!(validate(&request).is_err());

        request.selector = "h1".to_string();
        assert!(validate(&request).is_ok());
    }

    #[test]
    fn mismatched_options_are_rejected() {
        let request = ExtractionRequest::new("https://ex.com/", ExtractionKind::Html, "h1")
            .with_options(ExtractionOptions::Css(CssOptions::default()));
        let err = validate(&request).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}
