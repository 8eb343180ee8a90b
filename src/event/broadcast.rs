use super::{EventCategory, EventNotifier, EventNotifierSupport, SupportEvent};
use crate::constants::defaults;
use crate::error::SupportResult;
use chrono::{DateTime, Utc};
use futures::Stream;
use tokio::sync::broadcast;
use tracing::warn;

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub event: SupportEvent,
    pub published_at: DateTime<Utc>,
}

/// Publishes events to any number of broadcast subscribers
#[derive(Debug)]
pub struct BroadcastEventNotifier {
    sender: broadcast::Sender<PublishedEvent>,
    support: EventNotifierSupport,
}

impl BroadcastEventNotifier {
    /// Create a new notifier with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            support: EventNotifierSupport::new(),
        }
    }

    pub fn support(&self) -> &EventNotifierSupport {
        &self.support
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Subscribe as a [`Stream`]. Events missed by a lagging subscriber are
    /// skipped; the stream ends when the notifier is dropped.
    pub fn stream(&self) -> impl Stream<Item = PublishedEvent> + Send + 'static {
        futures::stream::unfold(self.sender.subscribe(), |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(published) => return Some((published, receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event subscriber lagged, skipping events");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventNotifier {
    fn default() -> Self {
        Self::new(defaults::EVENT_CHANNEL_CAPACITY)
    }
}

impl EventNotifier for BroadcastEventNotifier {
    fn notify(&self, event: &SupportEvent) -> SupportResult<()> {
        let published = PublishedEvent {
            event: event.clone(),
            published_at: Utc::now(),
        };
        // No subscribers is acceptable: events are published even if no one is listening
        let _ = self.sender.send(published);
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
