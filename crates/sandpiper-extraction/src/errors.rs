use thiserror::Error;

pub type ExtractResult<T> = Result<T, ExtractError>;

#[derive(Error, Debug)]
pub enum ExtractError {
    /// In-page script evaluation failed.
    #[error("extraction script failed: {0}")]
    Script(String),

    /// The script returned a value the strategy could not interpret.
    #[error("extraction result unreadable: {0}")]
    Unreadable(String),

    /// Options did not fit the strategy (wrong variant for the kind).
    #[error("invalid options for {kind} extraction: {reason}")]
    InvalidOptions { kind: &'static str, reason: String },
}

impl ExtractError {
    pub fn script(err: impl std::fmt::Display) -> Self {
        Self::Script(err.to_string())
    }

    pub fn unreadable(err: impl std::fmt::Display) -> Self {
        Self::Unreadable(err.to_string())
    }

    pub fn invalid_options(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidOptions {
            kind,
            reason: reason.into(),
        }
    }
}
