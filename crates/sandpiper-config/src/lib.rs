//! Configuration for the Sandpiper service.
//!
//! Plain config structs with spec-default `Default` impls, builder-style
//! `with_*` methods, validation, and `SANDPIPER_*` environment loading.

mod env;

pub use env::{EnvConfigLoader, EnvError};

use sandpiper_types::ExtractionKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error(transparent)]
    Env(#[from] EnvError),
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Browser pool limits and timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of concurrently open browser sessions.
    pub max_sessions: usize,
    /// How long an `acquire` at capacity waits for a release.
    pub acquire_timeout: Duration,
    /// Sessions idle past this window are evicted.
    pub idle_timeout: Duration,
    /// Period of the eviction tick.
    pub eviction_interval: Duration,
    /// Return released browsers to the free list instead of closing them.
    pub reuse_sessions: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: 5,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            eviction_interval: Duration::from_secs(60),
            reuse_sessions: true,
        }
    }
}

/// Navigation behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationConfig {
    /// Per-attempt navigation timeout.
    pub timeout: Duration,
    /// Bounded retry count for transient navigation failures.
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts.
    pub backoff_base: Duration,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
        }
    }
}

/// Response-cache TTLs and sweeper timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL applied when a kind has no override.
    pub default_ttl: Duration,
    /// Per-kind TTL overrides.
    pub ttl_overrides: HashMap<ExtractionKind, Duration>,
    /// Period of the expired-entry sweeper.
    pub sweep_interval: Duration,
    /// Period of the observability counter tick.
    pub stats_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            ttl_overrides: HashMap::new(),
            sweep_interval: Duration::from_secs(3600),
            stats_interval: Duration::from_secs(1800),
        }
    }
}

impl CacheConfig {
    /// Effective TTL for a kind.
    pub fn ttl_for(&self, kind: ExtractionKind) -> Duration {
        self.ttl_overrides
            .get(&kind)
            .copied()
            .unwrap_or(self.default_ttl)
    }

    pub fn with_ttl(mut self, kind: ExtractionKind, ttl: Duration) -> Self {
        self.ttl_overrides.insert(kind, ttl);
        self
    }
}

/// Action-executor timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    /// Bounded wait for the target element to be visible and hittable.
    pub element_timeout: Duration,
    /// Ceiling for one whole action.
    pub action_timeout: Duration,
    /// Wait applied after Submit/Navigate for the page to move.
    pub navigation_timeout: Duration,
    /// Settle delay after scrolling an element into view, before clicking.
    pub settle_delay: Duration,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            element_timeout: Duration::from_secs(10),
            action_timeout: Duration::from_secs(30),
            navigation_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_millis(150),
        }
    }
}

/// Recorder session limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Default snapshot frame rate.
    pub default_fps: u32,
    /// Inclusive bounds a client-supplied frame rate is clamped against.
    pub min_fps: u32,
    pub max_fps: u32,
    /// Sessions inactive past this window are closed.
    pub idle_timeout: Duration,
    /// Period of the idle-session tick.
    pub idle_check_interval: Duration,
    /// Poll period of the capture-event sink.
    pub event_poll_interval: Duration,
    /// Broadcast capacity for the frame stream (drop-oldest on lag).
    pub frame_buffer: usize,
    /// Broadcast capacity for the action stream (deep enough not to drop).
    pub action_buffer: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            default_fps: 5,
            min_fps: 1,
            max_fps: 30,
            idle_timeout: Duration::from_secs(600),
            idle_check_interval: Duration::from_secs(60),
            event_poll_interval: Duration::from_millis(250),
            frame_buffer: 16,
            action_buffer: 1024,
        }
    }
}

impl RecorderConfig {
    /// Clamp a requested frame rate into the configured bounds, falling back
    /// to the default when absent.
    pub fn clamp_fps(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_fps)
            .clamp(self.min_fps, self.max_fps)
    }
}

/// Storage location for the relational store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path, or `sqlite::memory:` for tests.
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://sandpiper.db".to_string(),
            max_connections: 4,
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandpiperConfig {
    pub pool: PoolConfig,
    pub navigation: NavigationConfig,
    pub cache: CacheConfig,
    pub actions: ActionConfig,
    pub recorder: RecorderConfig,
    pub storage: StorageConfig,
}

impl SandpiperConfig {
    /// Load overrides from `SANDPIPER_*` environment variables on top of the
    /// defaults. Unset variables keep their default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env = EnvConfigLoader::new().with_prefix("SANDPIPER_");
        let mut config = Self::default();

        if let Some(v) = env.get_optional_uint("POOL_MAX_SESSIONS")? {
            config.pool.max_sessions = v as usize;
        }
        if let Some(v) = env.get_optional_duration("POOL_ACQUIRE_TIMEOUT")? {
            config.pool.acquire_timeout = v;
        }
        if let Some(v) = env.get_optional_duration("POOL_IDLE_TIMEOUT")? {
            config.pool.idle_timeout = v;
        }
        if let Some(v) = env.get_optional_bool("POOL_REUSE_SESSIONS")? {
            config.pool.reuse_sessions = v;
        }
        if let Some(v) = env.get_optional_duration("NAV_TIMEOUT")? {
            config.navigation.timeout = v;
        }
        if let Some(v) = env.get_optional_duration("CACHE_DEFAULT_TTL")? {
            config.cache.default_ttl = v;
        }
        if let Some(v) = env.get_optional_duration("CACHE_TTL_HTML")? {
            config.cache.ttl_overrides.insert(ExtractionKind::Html, v);
        }
        if let Some(v) = env.get_optional_duration("CACHE_TTL_CSS")? {
            config.cache.ttl_overrides.insert(ExtractionKind::Css, v);
        }
        if let Some(v) = env.get_optional_duration("CACHE_TTL_JSON")? {
            config.cache.ttl_overrides.insert(ExtractionKind::Json, v);
        }
        if let Some(v) = env.get_optional_uint("RECORDER_DEFAULT_FPS")? {
            config.recorder.default_fps = v as u32;
        }
        if let Some(v) = env.get_optional_duration("RECORDER_IDLE_TIMEOUT")? {
            config.recorder.idle_timeout = v;
        }
        if let Some(v) = env.get_optional("DATABASE_URL") {
            config.storage.database_url = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.max_sessions == 0 {
            return Err(ConfigError::invalid(
                "pool.max_sessions",
                "must be at least 1",
            ));
        }
        if self.navigation.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "navigation.max_attempts",
                "must be at least 1",
            ));
        }
        if self.recorder.min_fps == 0 || self.recorder.max_fps < self.recorder.min_fps {
            return Err(ConfigError::invalid(
                "recorder.min_fps/max_fps",
                "fps bounds must satisfy 1 <= min <= max",
            ));
        }
        if self.recorder.default_fps < self.recorder.min_fps
            || self.recorder.default_fps > self.recorder.max_fps
        {
            return Err(ConfigError::invalid(
                "recorder.default_fps",
                "default fps must fall within the configured bounds",
            ));
        }
        if self.cache.default_ttl.is_zero() {
            return Err(ConfigError::invalid(
                "cache.default_ttl",
                "must be non-zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let config = SandpiperConfig::default();
        assert_eq!(config.cache.default_ttl, Duration::from_secs(3600));
        assert_eq!(config.cache.sweep_interval, Duration::from_secs(3600));
        assert_eq!(config.cache.stats_interval, Duration::from_secs(1800));
        assert_eq!(config.actions.element_timeout, Duration::from_secs(10));
        assert_eq!(config.actions.action_timeout, Duration::from_secs(30));
        assert_eq!(config.recorder.default_fps, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn ttl_override_wins_over_default() {
        let cache = CacheConfig::default().with_ttl(ExtractionKind::Html, Duration::from_secs(60));
        assert_eq!(cache.ttl_for(ExtractionKind::Html), Duration::from_secs(60));
        assert_eq!(
            cache.ttl_for(ExtractionKind::Css),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn fps_is_clamped_into_bounds() {
        let recorder = RecorderConfig::default();
        assert_eq!(recorder.clamp_fps(None), 5);
        assert_eq!(recorder.clamp_fps(Some(0)), 1);
        assert_eq!(recorder.clamp_fps(Some(120)), 30);
        assert_eq!(recorder.clamp_fps(Some(10)), 10);
    }

    #[test]
    fn zero_max_sessions_is_rejected() {
        let mut config = SandpiperConfig::default();
        config.pool.max_sessions = 0;
        assert!(config.validate().is_err());
    }
}
