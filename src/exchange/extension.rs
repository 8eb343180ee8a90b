use super::Exchange;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Callback run when an exchange is done
pub trait Synchronization: Send + Sync {
    fn on_complete(&self, exchange: &Exchange);

    fn on_failure(&self, exchange: &Exchange);
}

/// Routing flags and bookkeeping carried alongside an exchange
#[derive(Default)]
pub struct ExchangeExtension {
    from_endpoint: Option<String>,
    from_route_id: Option<String>,
    at_route_id: Option<String>,
    notify_event: bool,
    interrupted: bool,
    redelivery_exhausted: bool,
    error_handler_handled: Option<bool>,
    failure_handled: bool,
    transacted: bool,
    stream_cache_disabled: bool,
    safe_copy_properties: HashMap<String, Value>,
    on_completions: Vec<Arc<dyn Synchronization>>,
}

impl fmt::Debug for ExchangeExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeExtension")
            .field("from_endpoint", &self.from_endpoint)
            .field("from_route_id", &self.from_route_id)
            .field("at_route_id", &self.at_route_id)
            .field("notify_event", &self.notify_event)
            .field("interrupted", &self.interrupted)
            .field("redelivery_exhausted", &self.redelivery_exhausted)
            .field("error_handler_handled", &self.error_handler_handled)
            .field("failure_handled", &self.failure_handled)
            .field("transacted", &self.transacted)
            .field("on_completions", &self.on_completions.len())
            .finish()
    }
}

impl ExchangeExtension {
    pub fn from_endpoint(&self) -> Option<&str> {
        self.from_endpoint.as_deref()
    }

    pub fn set_from_endpoint(&mut self, uri: Option<String>) {
        self.from_endpoint = uri;
    }

    pub fn from_route_id(&self) -> Option<&str> {
        self.from_route_id.as_deref()
    }

    pub fn set_from_route_id(&mut self, route_id: Option<String>) {
        self.from_route_id = route_id;
    }

    /// The route currently processing the exchange
    pub fn at_route_id(&self) -> Option<&str> {
        self.at_route_id.as_deref()
    }

    pub fn set_at_route_id(&mut self, route_id: Option<String>) {
        self.at_route_id = route_id;
    }

    pub fn is_notify_event(&self) -> bool {
        self.notify_event
    }

    pub fn set_notify_event(&mut self, notify_event: bool) {
        self.notify_event = notify_event;
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn set_interrupted(&mut self, interrupted: bool) {
        self.interrupted = interrupted;
    }

    pub fn is_redelivery_exhausted(&self) -> bool {
        self.redelivery_exhausted
    }

    pub fn set_redelivery_exhausted(&mut self, exhausted: bool) {
        self.redelivery_exhausted = exhausted;
    }

    /// `None` until an error handler has decided
    pub fn error_handler_handled(&self) -> Option<bool> {
        self.error_handler_handled
    }

    pub fn set_error_handler_handled(&mut self, handled: Option<bool>) {
        self.error_handler_handled = handled;
    }

    pub fn is_failure_handled(&self) -> bool {
        self.failure_handled
    }

    pub fn set_failure_handled(&mut self, handled: bool) {
        self.failure_handled = handled;
    }

    pub fn is_transacted(&self) -> bool {
        self.transacted
    }

    pub fn set_transacted(&mut self, transacted: bool) {
        self.transacted = transacted;
    }

    pub fn is_stream_cache_disabled(&self) -> bool {
        self.stream_cache_disabled
    }

    pub fn set_stream_cache_disabled(&mut self, disabled: bool) {
        self.stream_cache_disabled = disabled;
    }

    pub fn safe_copy_property(&self, key: &str) -> Option<&Value> {
        self.safe_copy_properties.get(key)
    }

    pub fn set_safe_copy_property(&mut self, key: impl Into<String>, value: Option<Value>) {
        let key = key.into();
        match value {
            Some(value) => {
                self.safe_copy_properties.insert(key, value);
            }
            None => {
                self.safe_copy_properties.remove(&key);
            }
        }
    }

    pub fn add_on_completion(&mut self, synchronization: Arc<dyn Synchronization>) {
        self.on_completions.push(synchronization);
    }

    pub fn contains_on_completion(&self, synchronization: &Arc<dyn Synchronization>) -> bool {
        self.on_completions
            .iter()
            .any(|s| Arc::ptr_eq(s, synchronization))
    }

    pub fn on_completion_count(&self) -> usize {
        self.on_completions.len()
    }

    /// Move all on-completions to `target`
    pub fn handover_completions(&mut self, target: &mut ExchangeExtension) {
        target.on_completions.append(&mut self.on_completions);
    }

    pub(crate) fn take_on_completions(&mut self) -> Vec<Arc<dyn Synchronization>> {
        std::mem::take(&mut self.on_completions)
    }

    /// Copy for a new exchange; on-completions stay with the source
    pub(crate) fn copy_for_exchange(&self) -> Self {
        Self {
            from_endpoint: self.from_endpoint.clone(),
            from_route_id: self.from_route_id.clone(),
            at_route_id: self.at_route_id.clone(),
            notify_event: self.notify_event,
            interrupted: self.interrupted,
            redelivery_exhausted: self.redelivery_exhausted,
            error_handler_handled: self.error_handler_handled,
            failure_handled: self.failure_handled,
            transacted: self.transacted,
            stream_cache_disabled: self.stream_cache_disabled,
            safe_copy_properties: self.safe_copy_properties.clone(),
            on_completions: Vec::new(),
        }
    }

    /// Clear all per-use state; the origin endpoint and route are kept
    pub(crate) fn reset(&mut self) {
        let from_endpoint = self.from_endpoint.take();
        let from_route_id = self.from_route_id.take();
        *self = Self {
            from_endpoint,
            from_route_id,
            ..Self::default()
        };
    }
}
