use sandpiper_browser::BrowserError;
use sandpiper_extraction::ExtractError;
use sandpiper_persistence::PersistenceError;
use sandpiper_recorder::RecorderError;
use sandpiper_types::WorkflowValidationError;
use sandpiper_workflows::WorkflowError;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Error surface of the service, one variant per caller-visible kind.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Extraction(#[from] ExtractError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable kind label for transport layers.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation",
            ServiceError::Browser(BrowserError::NavigationFailed { .. }) => "navigation",
            ServiceError::Browser(BrowserError::PoolExhausted { .. }) => "pool_exhausted",
            ServiceError::Browser(_) => "browser",
            ServiceError::Extraction(_) => "extraction",
            ServiceError::Persistence(_) => "persistence",
            ServiceError::Recorder(_) => "recorder",
            ServiceError::Cancelled => "cancelled",
            ServiceError::Internal(_) => "internal",
        }
    }
}

impl From<WorkflowValidationError> for ServiceError {
    fn from(err: WorkflowValidationError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl From<WorkflowError> for ServiceError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Persistence(e) => ServiceError::Persistence(e),
            WorkflowError::Browser(e) => ServiceError::Browser(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_distinguish_navigation_and_pool_failures() {
        let nav = ServiceError::Browser(BrowserError::NavigationFailed {
            url: "https://ex.com/".into(),
            attempts: 3,
            reason: "timeout".into(),
        });
        assert_eq!(nav.kind(), "navigation");

        let pool = ServiceError::Browser(BrowserError::PoolExhausted { waited_ms: 30000 });
        assert_eq!(pool.kind(), "pool_exhausted");

        assert_eq!(ServiceError::validation("empty url").kind(), "validation");
        assert_eq!(ServiceError::Cancelled.kind(), "cancelled");
    }
}
