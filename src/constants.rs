//! # System Constants
//!
//! Well-known header names, event names and default values shared across the
//! support layer.

/// Message header names set by the support layer
pub mod headers {
    pub const REDELIVERED: &str = "ConduitRedelivered";
    pub const REDELIVERY_COUNTER: &str = "ConduitRedeliveryCounter";
    pub const FILE_NAME: &str = "ConduitFileName";
    pub const FILE_PATH: &str = "ConduitFilePath";
    pub const FILE_LENGTH: &str = "ConduitFileLength";
    pub const FILE_LAST_MODIFIED: &str = "ConduitFileLastModified";
    pub const MESSAGE_TIMESTAMP: &str = "ConduitMessageTimestamp";
}

/// Names of the events emitted through the notifier chain
pub mod events {
    // Context lifecycle
    pub const CONTEXT_STARTING: &str = "context.starting";
    pub const CONTEXT_STARTED: &str = "context.started";
    pub const CONTEXT_STOPPING: &str = "context.stopping";
    pub const CONTEXT_STOPPED: &str = "context.stopped";
    pub const CONTEXT_STARTUP_FAILURE: &str = "context.startup_failure";
    pub const CONTEXT_STOP_FAILURE: &str = "context.stop_failure";

    // Services
    pub const SERVICE_STARTUP_FAILURE: &str = "service.startup_failure";
    pub const SERVICE_STOP_FAILURE: &str = "service.stop_failure";

    // Exchanges
    pub const EXCHANGE_CREATED: &str = "exchange.created";
    pub const EXCHANGE_COMPLETED: &str = "exchange.completed";
    pub const EXCHANGE_FAILED: &str = "exchange.failed";
    pub const EXCHANGE_SENDING: &str = "exchange.sending";
    pub const EXCHANGE_SENT: &str = "exchange.sent";
    pub const EXCHANGE_ASYNC_PROCESSING_STARTED: &str = "exchange.async_processing_started";

    // Reload
    pub const CONTEXT_RELOADING: &str = "reload.reloading";
    pub const CONTEXT_RELOADED: &str = "reload.reloaded";
    pub const CONTEXT_RELOAD_FAILURE: &str = "reload.failure";
    pub const RESOURCE_RELOADED: &str = "reload.resource_reloaded";
}

/// Default values used when no configuration overrides them
pub mod defaults {
    pub const POOL_CAPACITY: usize = 100;
    pub const EVENT_CHANNEL_CAPACITY: usize = 1024;
    pub const POLL_INITIAL_DELAY_MS: u64 = 1000;
    pub const POLL_DELAY_MS: u64 = 500;
    pub const RELOAD_INTERVAL_MS: u64 = 1000;
    pub const RELOAD_PATTERN: &str = "*.yaml,*.xml";
    /// Shortest period a scheduler or file watcher ticks at
    pub const MIN_TICK_PERIOD_MS: u64 = 1;
    /// Body chars kept in a log line
    pub const LOG_BODY_MAX_CHARS: i64 = 1000;
    pub const DUMP_BODY_MAX_CHARS: i64 = 128 * 1024;
    pub const ENV_PREFIX: &str = "CONDUIT";
    pub const CONFIG_DIR: &str = "config";
    pub const CONFIG_BASENAME: &str = "conduit";
}
