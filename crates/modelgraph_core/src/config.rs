//! Store configuration.
//!
//! # Responsibility
//! - Carry the tunables of one `Store` with serde-friendly defaults.
//!
//! # Invariants
//! - A config accepted by `validate()` never makes the store panic.

use crate::schema::InversePolicy;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

const DEFAULT_RETAIN_SETTLED_READS: usize = 256;
const DEFAULT_NOTIFICATION_QUEUE_LIMIT: usize = 1024;

#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "failed to parse store config: {err}"),
            Self::Invalid(message) => write!(f, "invalid store config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Applied through `SchemaBuilder::with_config` when inference finds
    /// no inverse; `Store::with_config` requires it to match the schema.
    pub inverse_policy: InversePolicy,
    /// Settled reads kept for `poll_read`; older tokens become unknown.
    pub retain_settled_reads: usize,
    /// Per-subscriber queue cap; the oldest notification is dropped.
    pub notification_queue_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            inverse_policy: InversePolicy::default(),
            retain_settled_reads: DEFAULT_RETAIN_SETTLED_READS,
            notification_queue_limit: DEFAULT_NOTIFICATION_QUEUE_LIMIT,
        }
    }
}

impl StoreConfig {
    /// Parses and validates a JSON config; missing keys take defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retain_settled_reads == 0 {
            return Err(ConfigError::Invalid(
                "retain_settled_reads must be at least 1".to_string(),
            ));
        }
        if self.notification_queue_limit == 0 {
            return Err(ConfigError::Invalid(
                "notification_queue_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
