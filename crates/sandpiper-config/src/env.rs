//! Environment variable loading with type conversion.

use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvError {
    #[error("invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },
}

/// Prefixed environment reader. Every getter treats an unset variable as
/// `None`; only present-but-unparseable values error.
pub struct EnvConfigLoader {
    prefix: String,
}

impl EnvConfigLoader {
    pub fn new() -> Self {
        Self {
            prefix: String::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn var_name(&self, var: &str) -> String {
        format!("{}{}", self.prefix, var)
    }

    pub fn get_optional(&self, var: &str) -> Option<String> {
        env::var(self.var_name(var)).ok()
    }

    pub fn get_optional_uint(&self, var: &str) -> Result<Option<u64>, EnvError> {
        match self.get_optional(var) {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|e| EnvError::InvalidValue {
                    var: self.var_name(var),
                    reason: format!("cannot parse as unsigned integer: {}", e),
                }),
        }
    }

    pub fn get_optional_bool(&self, var: &str) -> Result<Option<bool>, EnvError> {
        match self.get_optional(var) {
            None => Ok(None),
            Some(raw) => match raw.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(Some(true)),
                "false" | "0" | "no" | "off" => Ok(Some(false)),
                other => Err(EnvError::InvalidValue {
                    var: self.var_name(var),
                    reason: format!("invalid boolean value: {}", other),
                }),
            },
        }
    }

    /// Durations accept `30s`, `5m`, `1h`, or a bare number of seconds.
    pub fn get_optional_duration(&self, var: &str) -> Result<Option<Duration>, EnvError> {
        match self.get_optional(var) {
            None => Ok(None),
            Some(raw) => parse_duration(&raw)
                .map(Some)
                .map_err(|reason| EnvError::InvalidValue {
                    var: self.var_name(var),
                    reason,
                }),
        }
    }
}

impl Default for EnvConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    if !raw.is_ascii() || raw.is_empty() {
        return Err(format!("cannot parse duration: {:?}", raw));
    }
    let (value, unit) = raw.split_at(raw.len() - 1);
    let value: u64 = value
        .parse()
        .map_err(|e| format!("cannot parse duration value: {}", e))?;
    match unit {
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        other => Err(format!("unknown duration unit: {:?}", other)),
    }
}
