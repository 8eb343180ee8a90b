//! # Event Notification
//!
//! Lifecycle, exchange and reload events delivered to a chain of
//! [`EventNotifier`]s.
//!
//! ## Overview
//!
//! Events are emitted through the `notify_*` functions in [`helper`]. Each
//! function builds its event lazily and only when at least one notifier is
//! interested, so emitting events with nobody listening costs next to
//! nothing. Notifier failures are logged and never reach the caller.
//!
//! ## Notifiers
//!
//! - [`BroadcastEventNotifier`]: fan-out over a `tokio::sync::broadcast` channel
//! - [`LoggingEventNotifier`]: writes every event to `tracing`

mod broadcast;
pub mod helper;
mod logging_notifier;

pub use broadcast::{BroadcastEventNotifier, PublishedEvent};
pub use helper::*;
pub use logging_notifier::LoggingEventNotifier;

use crate::constants::events;
use crate::error::SupportResult;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Event families notifiers can opt out of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Context,
    Service,
    Exchange,
    Reload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SupportEvent {
    ContextStarting { context: String },
    ContextStarted { context: String },
    ContextStopping { context: String },
    ContextStopped { context: String },
    ContextStartupFailure { context: String, error: String },
    ContextStopFailure { context: String, error: String },
    ServiceStartupFailure { service: String, error: String },
    ServiceStopFailure { service: String, error: String },
    ExchangeCreated {
        exchange_id: String,
        endpoint_uri: Option<String>,
    },
    ExchangeCompleted {
        exchange_id: String,
        elapsed_ms: u64,
    },
    ExchangeFailed {
        exchange_id: String,
        error: String,
    },
    ExchangeSending {
        exchange_id: String,
        endpoint_uri: String,
    },
    ExchangeSent {
        exchange_id: String,
        endpoint_uri: String,
        elapsed_ms: u64,
    },
    ExchangeAsyncProcessingStarted { exchange_id: String },
    ContextReloading { source: String },
    ContextReloaded { source: String },
    ContextReloadFailure { source: String, error: String },
    ResourceReloaded { source: String, resource: String },
}

impl SupportEvent {
    pub fn category(&self) -> EventCategory {
        match self {
            Self::ContextStarting { .. }
            | Self::ContextStarted { .. }
            | Self::ContextStopping { .. }
            | Self::ContextStopped { .. }
            | Self::ContextStartupFailure { .. }
            | Self::ContextStopFailure { .. } => EventCategory::Context,
            Self::ServiceStartupFailure { .. } | Self::ServiceStopFailure { .. } => {
                EventCategory::Service
            }
            Self::ExchangeCreated { .. }
            | Self::ExchangeCompleted { .. }
            | Self::ExchangeFailed { .. }
            | Self::ExchangeSending { .. }
            | Self::ExchangeSent { .. }
            | Self::ExchangeAsyncProcessingStarted { .. } => EventCategory::Exchange,
            Self::ContextReloading { .. }
            | Self::ContextReloaded { .. }
            | Self::ContextReloadFailure { .. }
            | Self::ResourceReloaded { .. } => EventCategory::Reload,
        }
    }

    /// Stable event name, e.g. `exchange.completed`
    pub fn name(&self) -> &'static str {
        match self {
            Self::ContextStarting { .. } => events::CONTEXT_STARTING,
            Self::ContextStarted { .. } => events::CONTEXT_STARTED,
            Self::ContextStopping { .. } => events::CONTEXT_STOPPING,
            Self::ContextStopped { .. } => events::CONTEXT_STOPPED,
            Self::ContextStartupFailure { .. } => events::CONTEXT_STARTUP_FAILURE,
            Self::ContextStopFailure { .. } => events::CONTEXT_STOP_FAILURE,
            Self::ServiceStartupFailure { .. } => events::SERVICE_STARTUP_FAILURE,
            Self::ServiceStopFailure { .. } => events::SERVICE_STOP_FAILURE,
            Self::ExchangeCreated { .. } => events::EXCHANGE_CREATED,
            Self::ExchangeCompleted { .. } => events::EXCHANGE_COMPLETED,
            Self::ExchangeFailed { .. } => events::EXCHANGE_FAILED,
            Self::ExchangeSending { .. } => events::EXCHANGE_SENDING,
            Self::ExchangeSent { .. } => events::EXCHANGE_SENT,
            Self::ExchangeAsyncProcessingStarted { .. } => {
                events::EXCHANGE_ASYNC_PROCESSING_STARTED
            }
            Self::ContextReloading { .. } => events::CONTEXT_RELOADING,
            Self::ContextReloaded { .. } => events::CONTEXT_RELOADED,
            Self::ContextReloadFailure { .. } => events::CONTEXT_RELOAD_FAILURE,
            Self::ResourceReloaded { .. } => events::RESOURCE_RELOADED,
        }
    }
}

/// Receives events
pub trait EventNotifier: Send + Sync {
    fn notify(&self, event: &SupportEvent) -> SupportResult<()>;

    /// Per-event filter, checked after the category flags
    fn is_enabled(&self, _event: &SupportEvent) -> bool {
        true
    }

    fn is_disabled(&self) -> bool {
        false
    }

    fn ignore_context_events(&self) -> bool {
        false
    }

    fn ignore_service_events(&self) -> bool {
        false
    }

    fn ignore_exchange_events(&self) -> bool {
        false
    }

    fn ignore_reload_events(&self) -> bool {
        false
    }

    fn ignores(&self, category: EventCategory) -> bool {
        match category {
            EventCategory::Context => self.ignore_context_events(),
            EventCategory::Service => self.ignore_service_events(),
            EventCategory::Exchange => self.ignore_exchange_events(),
            EventCategory::Reload => self.ignore_reload_events(),
        }
    }
}

/// Ignore flags shared by notifier implementations
#[derive(Debug, Default)]
pub struct EventNotifierSupport {
    disabled: AtomicBool,
    ignore_context_events: AtomicBool,
    ignore_service_events: AtomicBool,
    ignore_exchange_events: AtomicBool,
    ignore_reload_events: AtomicBool,
}

impl EventNotifierSupport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Relaxed)
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::Relaxed);
    }

    fn flag(&self, category: EventCategory) -> &AtomicBool {
        match category {
            EventCategory::Context => &self.ignore_context_events,
            EventCategory::Service => &self.ignore_service_events,
            EventCategory::Exchange => &self.ignore_exchange_events,
            EventCategory::Reload => &self.ignore_reload_events,
        }
    }

    pub fn is_ignored(&self, category: EventCategory) -> bool {
        self.flag(category).load(Ordering::Relaxed)
    }

    pub fn set_ignored(&self, category: EventCategory, ignored: bool) {
        self.flag(category).store(ignored, Ordering::Relaxed);
    }
}

/// Ordered, shareable list of notifiers
#[derive(Default)]
pub struct EventNotifiers {
    notifiers: RwLock<Vec<Arc<dyn EventNotifier>>>,
}

impl std::fmt::Debug for EventNotifiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventNotifiers")
            .field("count", &self.len())
            .finish()
    }
}

impl EventNotifiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, notifier: Arc<dyn EventNotifier>) {
        self.notifiers.write().push(notifier);
    }

    pub fn remove(&self, notifier: &Arc<dyn EventNotifier>) -> bool {
        let mut notifiers = self.notifiers.write();
        let before = notifiers.len();
        notifiers.retain(|n| !Arc::ptr_eq(n, notifier));
        before != notifiers.len()
    }

    pub fn len(&self) -> usize {
        self.notifiers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.read().is_empty()
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn EventNotifier>> {
        self.notifiers.read().clone()
    }
}
