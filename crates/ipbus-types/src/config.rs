//! Configuration types for ipbus clients and the local engine.
//!
//! `BusConfig` represents the `config.toml` that tunes receive polling, join
//! retries and engine limits. Every section and field has a default, so an
//! empty file is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default)]
    pub receiver: ReceiverConfig,

    #[serde(default)]
    pub join: JoinConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// Receive-side tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Bounded wait used for each attempt of an unbounded `recv`.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

impl ReceiverConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Join handshake retry policy when the engine reports it is unavailable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinConfig {
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Attempts before an unavailable engine fails the join.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_retry_interval_ms() -> u64 {
    2_000
}

fn default_max_attempts() -> u32 {
    5
}

impl JoinConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: default_retry_interval_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Limits enforced by the local engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Largest `data` payload accepted by `send`, in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Idle regions older than this are evicted from the arena.
    #[serde(default = "default_region_idle_secs")]
    pub region_idle_secs: u64,
}

fn default_max_message_size() -> usize {
    16 * 1024 * 1024
}

fn default_region_idle_secs() -> u64 {
    5
}

impl EngineConfig {
    pub fn region_idle(&self) -> Duration {
        Duration::from_secs(self.region_idle_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            region_idle_secs: default_region_idle_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = BusConfig::default();
        assert_eq!(config.receiver.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.join.retry_interval(), Duration::from_secs(2));
        assert_eq!(config.join.max_attempts, 5);
        assert_eq!(config.engine.max_message_size, 16 * 1024 * 1024);
        assert_eq!(config.engine.region_idle(), Duration::from_secs(5));
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let config: BusConfig = toml::from_str("").unwrap();
        assert_eq!(config, BusConfig::default());
    }

    #[test]
    fn deserialize_partial_sections() {
        let toml_str = r#"
[receiver]
poll_interval_ms = 250

[engine]
max_message_size = 1024
"#;
        let config: BusConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.receiver.poll_interval_ms, 250);
        assert_eq!(config.engine.max_message_size, 1024);
        assert_eq!(config.engine.region_idle_secs, 5);
        assert_eq!(config.join, JoinConfig::default());
    }

    #[test]
    fn zero_poll_interval_is_clamped() {
        let config = ReceiverConfig { poll_interval_ms: 0 };
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }
}
