//! Trigger configuration.
//!
//! The watermark trigger keeps three pieces of state, each in its own
//! namespace of the caller's transaction. The names are configurable so that
//! several triggers can share one transaction scope.
//!
//! ```json
//! {
//!   "namespaces": {
//!     "watermark": "$watermark$",
//!     "ready_to_fire": "$ready_to_fire$",
//!     "time_sorted_keys": "$time_sorted_keys$"
//!   }
//! }
//! ```
//!
//! Every field is optional and defaults to the value shown.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tidal_storage::Namespace;

/// Errors from loading or validating a [`TriggerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid trigger config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid trigger config: {0}")]
    Invalid(String),
}

/// Namespaces holding the watermark trigger's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TriggerNamespaces {
    pub watermark: Namespace,
    pub ready_to_fire: Namespace,
    pub time_sorted_keys: Namespace,
}

impl Default for TriggerNamespaces {
    fn default() -> Self {
        Self {
            watermark: Namespace::new("$watermark$"),
            ready_to_fire: Namespace::new("$ready_to_fire$"),
            time_sorted_keys: Namespace::new("$time_sorted_keys$"),
        }
    }
}

impl TriggerNamespaces {
    /// Rejects empty namespaces and namespaces where one is a prefix of
    /// another, since their key regions would overlap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let all = [
            ("watermark", &self.watermark),
            ("ready_to_fire", &self.ready_to_fire),
            ("time_sorted_keys", &self.time_sorted_keys),
        ];
        for (name, ns) in &all {
            if ns.as_bytes().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "namespace '{}' must not be empty",
                    name
                )));
            }
        }
        for (i, (a_name, a)) in all.iter().enumerate() {
            for (b_name, b) in all.iter().skip(i + 1) {
                if a.as_bytes().starts_with(b.as_bytes()) || b.as_bytes().starts_with(a.as_bytes())
                {
                    return Err(ConfigError::Invalid(format!(
                        "namespaces '{}' ({}) and '{}' ({}) overlap",
                        a_name, a, b_name, b
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Configuration for a [`WatermarkTrigger`](crate::trigger::WatermarkTrigger).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TriggerConfig {
    pub namespaces: TriggerNamespaces,
}

impl TriggerConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: TriggerConfig = serde_json::from_str(json)?;
        config.namespaces.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }
}
