//! Player configuration, loaded from TOML.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::engine::DEFAULT_MAX_ITEMS_PER_TICK;

/// Tunables of a [`crate::player::ScenarioPlayer`] and its runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Items one entry point may dispatch without awaiting.
    pub max_items_per_tick: usize,
    /// Bound of the executor's inbound event queue.
    pub event_queue_capacity: usize,
    /// Whether `run_all` stops after the first failed scenario.
    pub stop_on_failure: bool,
    /// Deadline applied to rx messages that declare none.
    pub default_rx_timeout_ms: Option<u64>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            max_items_per_tick: DEFAULT_MAX_ITEMS_PER_TICK,
            event_queue_capacity: 256,
            stop_on_failure: true,
            default_rx_timeout_ms: None,
        }
    }
}

impl PlayerConfig {
    /// Load a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("read {}: {e}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn parse(s: &str) -> Result<Self, String> {
        toml::from_str(s).map_err(|e| format!("parse TOML: {e}"))
    }

    /// Default rx deadline as a duration.
    #[must_use]
    pub fn default_rx_timeout(&self) -> Option<Duration> {
        self.default_rx_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(PlayerConfig::parse("").unwrap(), PlayerConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = PlayerConfig::parse(
            r#"
            max_items_per_tick = 50
            default_rx_timeout_ms = 2000
            "#,
        )
        .unwrap();
        assert_eq!(config.max_items_per_tick, 50);
        assert_eq!(config.event_queue_capacity, 256);
        assert!(config.stop_on_failure);
        assert_eq!(config.default_rx_timeout(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_unknown_type_is_error() {
        let err = PlayerConfig::parse("stop_on_failure = 3").unwrap_err();
        assert!(err.starts_with("parse TOML"));
    }
}
