use thiserror::Error;

pub type BrowserResult<T> = Result<T, BrowserError>;

#[derive(Error, Debug)]
pub enum BrowserError {
    /// The pool could not supply a browser (launch failure or shutdown).
    #[error("browser unavailable: {0}")]
    Unavailable(String),

    /// Navigation kept failing after bounded retries.
    #[error("navigation to {url} failed after {attempts} attempts: {reason}")]
    NavigationFailed {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// No session was released within the acquire timeout.
    #[error("browser pool exhausted: no session released within {waited_ms}ms")]
    PoolExhausted { waited_ms: u64 },

    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The pool refuses work during or after shutdown.
    #[error("browser pool is shut down")]
    ShutDown,

    /// Errors surfaced by the CDP driver.
    #[error("browser protocol error: {0}")]
    Cdp(String),
}

impl BrowserError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn cdp(err: impl std::fmt::Display) -> Self {
        Self::Cdp(err.to_string())
    }
}
