//! # Configuration
//!
//! Typed configuration for the support layer, loaded by [`ConfigLoader`]
//! from defaults, TOML files and `CONDUIT__*` environment variables.
//!
//! ## Layout
//!
//! ```toml
//! [exchange]
//! pooled = true
//! pool_capacity = 100
//!
//! [uuid]
//! generator = "default"
//!
//! [polling]
//! initial_delay_ms = 1000
//! delay_ms = 500
//!
//! [reload]
//! enabled = true
//! folder = "routes"
//! pattern = "*.yaml,*.xml"
//!
//! [async_processing]
//! await_timeout_ms = 30000
//!
//! [events]
//! channel_capacity = 1024
//! ```

mod loader;

pub use loader::ConfigLoader;

use crate::constants::defaults;
use crate::error::{SupportError, SupportResult};
use crate::id_generator::UuidGeneratorKind;
use crate::utils::serde::{deserialize_flexible_bool, deserialize_flexible_u64};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportConfig {
    pub exchange: ExchangeConfig,
    pub uuid: UuidConfig,
    pub polling: PollingConfig,
    pub reload: ReloadConfig,
    pub async_processing: AsyncProcessingConfig,
    pub events: EventsConfig,
}

impl SupportConfig {
    /// Check the configuration for values that cannot work together
    pub fn validate(&self) -> SupportResult<()> {
        let mut problems = Vec::new();

        if self.exchange.pooled && self.exchange.pool_capacity == 0 {
            problems.push("exchange.pool_capacity must be greater than 0 when pooling is enabled");
        }
        if self.polling.delay_ms == 0 {
            problems.push("polling.delay_ms must be greater than 0");
        }
        if self.reload.interval_ms == 0 {
            problems.push("reload.interval_ms must be greater than 0");
        }
        if self.reload.enabled && self.reload.folder.trim().is_empty() {
            problems.push("reload.folder must be set when reload is enabled");
        }
        if self.events.channel_capacity == 0 {
            problems.push("events.channel_capacity must be greater than 0");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SupportError::Configuration(problems.join("; ")))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Hand consumers pooled exchange factories
    #[serde(deserialize_with = "deserialize_flexible_bool")]
    pub pooled: bool,
    /// Idle exchanges kept per consumer
    #[serde(deserialize_with = "deserialize_flexible_u64")]
    pub pool_capacity: u64,
    #[serde(deserialize_with = "deserialize_flexible_bool")]
    pub statistics_enabled: bool,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            pooled: false,
            pool_capacity: defaults::POOL_CAPACITY as u64,
            statistics_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UuidConfig {
    pub generator: UuidGeneratorKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    #[serde(deserialize_with = "deserialize_flexible_u64")]
    pub initial_delay_ms: u64,
    #[serde(deserialize_with = "deserialize_flexible_u64")]
    pub delay_ms: u64,
    #[serde(deserialize_with = "deserialize_flexible_bool")]
    pub use_fixed_delay: bool,
    #[serde(deserialize_with = "deserialize_flexible_bool")]
    pub greedy: bool,
    #[serde(deserialize_with = "deserialize_flexible_bool")]
    pub send_empty_message_when_idle: bool,
    #[serde(deserialize_with = "deserialize_flexible_u64")]
    pub backoff_multiplier: u64,
    #[serde(deserialize_with = "deserialize_flexible_u64")]
    pub backoff_idle_threshold: u64,
    #[serde(deserialize_with = "deserialize_flexible_u64")]
    pub backoff_error_threshold: u64,
    /// Stop polling after this many runs, 0 for unlimited
    #[serde(deserialize_with = "deserialize_flexible_u64")]
    pub repeat_count: u64,
    #[serde(deserialize_with = "deserialize_flexible_bool")]
    pub start_scheduler: bool,
    /// Level used to log the start and end of each poll run
    pub run_logging_level: String,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: defaults::POLL_INITIAL_DELAY_MS,
            delay_ms: defaults::POLL_DELAY_MS,
            use_fixed_delay: true,
            greedy: false,
            send_empty_message_when_idle: false,
            backoff_multiplier: 0,
            backoff_idle_threshold: 0,
            backoff_error_threshold: 0,
            repeat_count: 0,
            start_scheduler: true,
            run_logging_level: "trace".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    #[serde(deserialize_with = "deserialize_flexible_bool")]
    pub enabled: bool,
    pub folder: String,
    /// Comma separated file name globs
    pub pattern: String,
    #[serde(deserialize_with = "deserialize_flexible_bool")]
    pub recursive: bool,
    #[serde(deserialize_with = "deserialize_flexible_u64")]
    pub interval_ms: u64,
}

impl ReloadConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            folder: String::new(),
            pattern: defaults::RELOAD_PATTERN.to_string(),
            recursive: false,
            interval_ms: defaults::RELOAD_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsyncProcessingConfig {
    /// Await timeout for blocking on async processors, unset waits forever
    pub await_timeout_ms: Option<u64>,
    #[serde(deserialize_with = "deserialize_flexible_bool")]
    pub interrupt_threads_while_stopping: bool,
    #[serde(deserialize_with = "deserialize_flexible_bool")]
    pub statistics_enabled: bool,
}

impl AsyncProcessingConfig {
    pub fn await_timeout(&self) -> Option<Duration> {
        self.await_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for AsyncProcessingConfig {
    fn default() -> Self {
        Self {
            await_timeout_ms: None,
            interrupt_threads_while_stopping: true,
            statistics_enabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    #[serde(deserialize_with = "deserialize_flexible_u64")]
    pub channel_capacity: u64,
    /// Register a notifier writing every event to the log
    #[serde(deserialize_with = "deserialize_flexible_bool")]
    pub log_events: bool,
    #[serde(deserialize_with = "deserialize_flexible_bool")]
    pub ignore_exchange_events: bool,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: defaults::EVENT_CHANNEL_CAPACITY as u64,
            log_events: false,
            ignore_exchange_events: false,
        }
    }
}
