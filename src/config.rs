//! # Scheduler Configuration
//!
//! Runtime configuration for a scheduler replica. Values layer defaults
//! under environment variables (`TEMPO_` prefix) via the `config` crate.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// Configuration for one scheduler replica
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Topic carrying configuration-change events. Producers must publish
    /// to it with per-namespace ordering keys.
    #[serde(default = "default_config_updates_topic")]
    pub config_updates_topic: String,

    /// Delay between empty polls of the configuration-change topic.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum number of configuration events drained per poll.
    #[serde(default = "default_poll_batch_size")]
    pub poll_batch_size: usize,

    /// Size of the bounded worker pool consuming trigger-fired events.
    #[serde(default = "default_fire_workers")]
    pub fire_workers: usize,

    /// A fire instant older than this at evaluation time counts as a
    /// misfire and goes through misfire resolution.
    #[serde(default = "default_misfire_threshold_ms")]
    pub misfire_threshold_ms: i64,
}

fn default_config_updates_topic() -> String {
    "configupdates".to_string()
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_poll_batch_size() -> usize {
    64
}

fn default_fire_workers() -> usize {
    4
}

fn default_misfire_threshold_ms() -> i64 {
    60_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            config_updates_topic: default_config_updates_topic(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_batch_size: default_poll_batch_size(),
            fire_workers: default_fire_workers(),
            misfire_threshold_ms: default_misfire_threshold_ms(),
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from the environment, falling back to defaults.
    ///
    /// `TEMPO_FIRE_WORKERS=8` overrides `fire_workers`, and so on.
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("TEMPO"))
            .build()
            .map_err(|e| SchedulerError::Configuration {
                message: e.to_string(),
            })?;

        settings
            .try_deserialize()
            .map_err(|e| SchedulerError::Configuration {
                message: e.to_string(),
            })
    }
}
