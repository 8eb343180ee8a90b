use super::{EventCategory, EventNotifier, EventNotifierSupport, SupportEvent};
use crate::error::SupportResult;
use tracing::{info, warn};

/// Writes every event to the log
#[derive(Debug, Default)]
pub struct LoggingEventNotifier {
    support: EventNotifierSupport,
}

impl LoggingEventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn support(&self) -> &EventNotifierSupport {
        &self.support
    }
}

impl EventNotifier for LoggingEventNotifier {
    fn notify(&self, event: &SupportEvent) -> SupportResult<()> {
        let payload = serde_json::to_string(event)?;
        match event {
            SupportEvent::ContextStartupFailure { .. }
            | SupportEvent::ContextStopFailure { .. }
            | SupportEvent::ServiceStartupFailure { .. }
            | SupportEvent::ServiceStopFailure { .. }
            | SupportEvent::ExchangeFailed { .. }
            | SupportEvent::ContextReloadFailure { .. } => {
                warn!(event = event.name(), payload = %payload, "Event");
            }
            _ => info!(event = event.name(), payload = %payload, "Event"),
        }
        Ok(())
    }

    fn is_disabled(&self) -> bool {
        self.support.is_disabled()
    }

    fn ignore_context_events(&self) -> bool {
        self.support.is_ignored(EventCategory::Context)
    }

    fn ignore_service_events(&self) -> bool {
        self.support.is_ignored(EventCategory::Service)
    }

    fn ignore_exchange_events(&self) -> bool {
        self.support.is_ignored(EventCategory::Exchange)
    }

    fn ignore_reload_events(&self) -> bool {
        self.support.is_ignored(EventCategory::Reload)
    }
}
