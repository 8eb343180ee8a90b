//! Emit events to a notifier chain.
//!
//! Every function returns whether at least one notifier received the event.

use super::{EventCategory, EventNotifiers, SupportEvent};
use crate::exchange::Exchange;
use std::time::Duration;
use tracing::warn;

fn notify<F>(notifiers: &EventNotifiers, category: EventCategory, factory: F) -> bool
where
    F: FnOnce() -> SupportEvent,
{
    if notifiers.is_empty() {
        return false;
    }

    let mut factory = Some(factory);
    let mut event: Option<SupportEvent> = None;
    let mut notified = false;

    for notifier in notifiers.snapshot() {
        if notifier.is_disabled() || notifier.ignores(category) {
            continue;
        }
        if event.is_none() {
            event = factory.take().map(|create| create());
        }
        let Some(event) = event.as_ref() else {
            return notified;
        };
        if !notifier.is_enabled(event) {
            continue;
        }
        if let Err(error) = notifier.notify(event) {
            warn!(event = event.name(), error = %error, "Error notifying event. This exception will be ignored.");
        }
        notified = true;
    }
    notified
}

fn notify_exchange<F>(notifiers: &EventNotifiers, exchange: &Exchange, factory: F) -> bool
where
    F: FnOnce() -> SupportEvent,
{
    // an exchange created while emitting an event must not emit events itself
    if exchange.extension().is_notify_event() {
        return false;
    }
    notify(notifiers, EventCategory::Exchange, factory)
}

pub fn notify_context_starting(notifiers: &EventNotifiers, context: &str) -> bool {
    notify(notifiers, EventCategory::Context, || SupportEvent::ContextStarting {
        context: context.to_string(),
    })
}

pub fn notify_context_started(notifiers: &EventNotifiers, context: &str) -> bool {
    notify(notifiers, EventCategory::Context, || SupportEvent::ContextStarted {
        context: context.to_string(),
    })
}

pub fn notify_context_stopping(notifiers: &EventNotifiers, context: &str) -> bool {
    notify(notifiers, EventCategory::Context, || SupportEvent::ContextStopping {
        context: context.to_string(),
    })
}

pub fn notify_context_stopped(notifiers: &EventNotifiers, context: &str) -> bool {
    notify(notifiers, EventCategory::Context, || SupportEvent::ContextStopped {
        context: context.to_string(),
    })
}

pub fn notify_context_startup_failure(
    notifiers: &EventNotifiers,
    context: &str,
    error: &dyn std::error::Error,
) -> bool {
    notify(notifiers, EventCategory::Context, || {
        SupportEvent::ContextStartupFailure {
            context: context.to_string(),
            error: error.to_string(),
        }
    })
}

pub fn notify_context_stop_failure(
    notifiers: &EventNotifiers,
    context: &str,
    error: &dyn std::error::Error,
) -> bool {
    notify(notifiers, EventCategory::Context, || SupportEvent::ContextStopFailure {
        context: context.to_string(),
        error: error.to_string(),
    })
}

pub fn notify_service_startup_failure(
    notifiers: &EventNotifiers,
    service: &str,
    error: &dyn std::error::Error,
) -> bool {
    notify(notifiers, EventCategory::Service, || {
        SupportEvent::ServiceStartupFailure {
            service: service.to_string(),
            error: error.to_string(),
        }
    })
}

pub fn notify_service_stop_failure(
    notifiers: &EventNotifiers,
    service: &str,
    error: &dyn std::error::Error,
) -> bool {
    notify(notifiers, EventCategory::Service, || SupportEvent::ServiceStopFailure {
        service: service.to_string(),
        error: error.to_string(),
    })
}

pub fn notify_exchange_created(notifiers: &EventNotifiers, exchange: &Exchange) -> bool {
    notify_exchange(notifiers, exchange, || SupportEvent::ExchangeCreated {
        exchange_id: exchange.exchange_id().to_string(),
        endpoint_uri: exchange.from_endpoint().map(str::to_string),
    })
}

/// Emit `ExchangeFailed` or `ExchangeCompleted` depending on the outcome
pub fn notify_exchange_done(notifiers: &EventNotifiers, exchange: &Exchange) -> bool {
    match exchange.exception() {
        Some(error) => notify_exchange(notifiers, exchange, || SupportEvent::ExchangeFailed {
            exchange_id: exchange.exchange_id().to_string(),
            error: error.to_string(),
        }),
        None => notify_exchange(notifiers, exchange, || SupportEvent::ExchangeCompleted {
            exchange_id: exchange.exchange_id().to_string(),
            elapsed_ms: exchange.elapsed().as_millis() as u64,
        }),
    }
}

pub fn notify_exchange_sending(
    notifiers: &EventNotifiers,
    exchange: &Exchange,
    endpoint_uri: &str,
) -> bool {
    notify_exchange(notifiers, exchange, || SupportEvent::ExchangeSending {
        exchange_id: exchange.exchange_id().to_string(),
        endpoint_uri: endpoint_uri.to_string(),
    })
}

pub fn notify_exchange_sent(
    notifiers: &EventNotifiers,
    exchange: &Exchange,
    endpoint_uri: &str,
    elapsed: Duration,
) -> bool {
    notify_exchange(notifiers, exchange, || SupportEvent::ExchangeSent {
        exchange_id: exchange.exchange_id().to_string(),
        endpoint_uri: endpoint_uri.to_string(),
        elapsed_ms: elapsed.as_millis() as u64,
    })
}

/// Emitted once a caller starts blocking on an async processor. The
/// exchange itself is owned by the processor by then, so callers skip
/// exchanges flagged as created while emitting events.
pub fn notify_exchange_async_processing_started(
    notifiers: &EventNotifiers,
    exchange_id: &str,
) -> bool {
    notify(notifiers, EventCategory::Exchange, || {
        SupportEvent::ExchangeAsyncProcessingStarted {
            exchange_id: exchange_id.to_string(),
        }
    })
}

pub fn notify_context_reloading(notifiers: &EventNotifiers, source: &str) -> bool {
    notify(notifiers, EventCategory::Reload, || SupportEvent::ContextReloading {
        source: source.to_string(),
    })
}

pub fn notify_context_reloaded(notifiers: &EventNotifiers, source: &str) -> bool {
    notify(notifiers, EventCategory::Reload, || SupportEvent::ContextReloaded {
        source: source.to_string(),
    })
}

pub fn notify_context_reload_failure(
    notifiers: &EventNotifiers,
    source: &str,
    error: &dyn std::error::Error,
) -> bool {
    notify(notifiers, EventCategory::Reload, || {
        SupportEvent::ContextReloadFailure {
            source: source.to_string(),
            error: error.to_string(),
        }
    })
}

pub fn notify_resource_reloaded(notifiers: &EventNotifiers, source: &str, resource: &str) -> bool {
    notify(notifiers, EventCategory::Reload, || SupportEvent::ResourceReloaded {
        source: source.to_string(),
        resource: resource.to_string(),
    })
}
