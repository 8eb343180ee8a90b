use super::{Consumer, ExceptionHandler, LoggingExceptionHandler};
use crate::context::SupportContext;
use crate::error::{SupportError, SupportResult};
use crate::event;
use crate::exchange::{Exchange, ExchangeFactory, ExchangePattern};
use crate::logging::log_exchange_operation;
use crate::message::Body;
use crate::processor::{process_future, AsyncProcessor};
use crate::service::{Service, ServiceState};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, trace};

/// Consumer owning the exchange factory of one endpoint
pub struct DefaultConsumer {
    endpoint_uri: String,
    route_id: Option<String>,
    context: Arc<SupportContext>,
    processor: Arc<dyn AsyncProcessor>,
    exchange_factory: Arc<dyn ExchangeFactory>,
    exception_handler: RwLock<Arc<dyn ExceptionHandler>>,
    state: ServiceState,
}

impl std::fmt::Debug for DefaultConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultConsumer")
            .field("endpoint_uri", &self.endpoint_uri)
            .field("route_id", &self.route_id)
            .field("exchange_factory", &self.exchange_factory)
            .field("status", &self.state.status())
            .finish()
    }
}

impl DefaultConsumer {
    /// Create a new consumer; the factory kind follows the context's
    /// exchange configuration
    pub fn new(
        context: Arc<SupportContext>,
        endpoint_uri: impl Into<String>,
        route_id: Option<String>,
        processor: Arc<dyn AsyncProcessor>,
    ) -> Self {
        Self::with_pattern(context, endpoint_uri, route_id, processor, ExchangePattern::InOnly)
    }

    pub fn with_pattern(
        context: Arc<SupportContext>,
        endpoint_uri: impl Into<String>,
        route_id: Option<String>,
        processor: Arc<dyn AsyncProcessor>,
        pattern: ExchangePattern,
    ) -> Self {
        let endpoint_uri = endpoint_uri.into();
        let exchange_factory = context.exchange_factory_manager().new_factory(
            &endpoint_uri,
            route_id.clone(),
            pattern,
        );
        Self {
            endpoint_uri,
            route_id,
            context,
            processor,
            exchange_factory,
            exception_handler: RwLock::new(Arc::new(LoggingExceptionHandler::new())),
            state: ServiceState::new(),
        }
    }

    pub fn route_id(&self) -> Option<&str> {
        self.route_id.as_deref()
    }

    pub fn context(&self) -> &Arc<SupportContext> {
        &self.context
    }

    pub fn exchange_factory(&self) -> &Arc<dyn ExchangeFactory> {
        &self.exchange_factory
    }

    pub fn exception_handler(&self) -> Arc<dyn ExceptionHandler> {
        self.exception_handler.read().clone()
    }

    pub fn set_exception_handler(&self, handler: Arc<dyn ExceptionHandler>) {
        *self.exception_handler.write() = handler;
    }

    /// Create an exchange for this endpoint. Auto-release exchanges are
    /// handed back to the factory once [`process_exchange`](Self::process_exchange) is done.
    pub fn create_exchange(&self, auto_release: bool) -> Exchange {
        let exchange = self.exchange_factory.create(auto_release);
        event::notify_exchange_created(self.context.event_notifiers(), &exchange);
        exchange
    }

    /// Hand an exchange back to the factory; returns whether it was pooled
    pub fn release_exchange(&self, exchange: Exchange) -> bool {
        self.exchange_factory.release(exchange)
    }

    /// Run the exchange through the processor and complete it.
    ///
    /// Returns the processed exchange, or `None` when it was auto-released
    /// back to the pool. A failure stored on the exchange goes to the
    /// exception handler and is not returned as an error.
    pub async fn process_exchange(&self, exchange: Exchange) -> SupportResult<Option<Exchange>> {
        let exchange_id = exchange.exchange_id().to_string();
        trace!(
            exchange_id = %exchange_id,
            endpoint_uri = %self.endpoint_uri,
            "Processing exchange"
        );

        let mut exchange = match process_future(self.processor.as_ref(), exchange).await {
            Ok(exchange) => exchange,
            Err(error) => {
                log_exchange_operation(
                    "process",
                    Some(&exchange_id),
                    Some(&self.endpoint_uri),
                    self.route_id.as_deref(),
                    "error",
                    Some(&error.to_string()),
                );
                self.exception_handler().handle_exception(
                    &format!("Error processing exchange {exchange_id}"),
                    None,
                    &error,
                );
                return Err(error);
            }
        };

        exchange.done_on_completions();
        event::notify_exchange_done(self.context.event_notifiers(), &exchange);

        if let Some(error) = exchange.exception() {
            log_exchange_operation(
                "process",
                Some(&exchange_id),
                Some(&self.endpoint_uri),
                self.route_id.as_deref(),
                "failed",
                Some(&error.to_string()),
            );
            self.exception_handler().handle_exception(
                "Error processing exchange",
                Some(&exchange),
                error,
            );
        }

        if exchange.is_auto_release() {
            self.release_exchange(exchange);
            return Ok(None);
        }
        Ok(Some(exchange))
    }

    fn ensure_run_allowed(&self) -> SupportResult<()> {
        if self.state.status().is_run_allowed() {
            Ok(())
        } else {
            Err(SupportError::InvalidState(format!(
                "Consumer {} is not running ({})",
                self.endpoint_uri,
                self.state.status()
            )))
        }
    }

    /// Create an exchange with the given body and process it
    pub async fn process_body(
        &self,
        body: impl Into<Body>,
    ) -> SupportResult<Option<Exchange>> {
        self.ensure_run_allowed()?;
        let mut exchange = self.create_exchange(false);
        exchange.in_message_mut().set_body(body);
        self.process_exchange(exchange).await
    }
}

#[async_trait]
impl Service for DefaultConsumer {
    fn service_name(&self) -> &str {
        &self.endpoint_uri
    }

    fn service_state(&self) -> &ServiceState {
        &self.state
    }

    async fn do_start(&self) -> SupportResult<()> {
        debug!(endpoint_uri = %self.endpoint_uri, route_id = ?self.route_id, "Starting consumer");
        self.context
            .exchange_factory_manager()
            .add_exchange_factory(self.exchange_factory.clone());
        Ok(())
    }

    async fn do_stop(&self) -> SupportResult<()> {
        debug!(endpoint_uri = %self.endpoint_uri, "Stopping consumer");
        self.context
            .exchange_factory_manager()
            .remove_exchange_factory(self.exchange_factory.as_ref());
        self.exchange_factory.purge();
        Ok(())
    }
}

impl Consumer for DefaultConsumer {
    fn endpoint_uri(&self) -> &str {
        &self.endpoint_uri
    }

    fn processor(&self) -> Arc<dyn AsyncProcessor> {
        self.processor.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SupportConfig;
    use crate::context::SupportContextBuilder;
    use crate::event::SupportEvent;
    use crate::processor::{processor_fn, ProcessorConverter};
    use crate::service::ServiceExt;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recording {
        messages: Mutex<Vec<String>>,
    }

    impl ExceptionHandler for Recording {
        fn handle_exception(&self, message: &str, _exchange: Option<&Exchange>, error: &SupportError) {
            self.messages.lock().push(format!("{message}: {error}"));
        }
    }

    fn pooled_context() -> Arc<SupportContext> {
        let mut config = SupportConfig::default();
        config.exchange.pooled = true;
        config.exchange.pool_capacity = 4;
        config.exchange.statistics_enabled = true;
        SupportContextBuilder::new("test").config(config).build().unwrap()
    }

    fn upper_case() -> Arc<dyn AsyncProcessor> {
        ProcessorConverter::to_async(Arc::new(processor_fn(|exchange: &mut Exchange| {
            let text = exchange.in_message().body_as_text().unwrap_or_default();
            exchange.in_message_mut().set_body(text.to_uppercase());
            Ok(())
        })))
    }

    #[tokio::test]
    async fn test_factory_registered_while_started() {
        let context = pooled_context();
        let consumer = DefaultConsumer::new(context.clone(), "timer:tick", Some("r1".into()), upper_case());

        consumer.start().await.unwrap();
        assert_eq!(context.exchange_factory_manager().consumer_counter(), 1);
        consumer.stop().await.unwrap();
        assert_eq!(context.exchange_factory_manager().consumer_counter(), 0);
    }

    #[tokio::test]
    async fn test_processed_exchange_is_returned() {
        let context = pooled_context();
        let consumer = DefaultConsumer::new(context, "timer:tick", Some("r1".into()), upper_case());
        consumer.start().await.unwrap();

        let exchange = consumer.process_body("hello").await.unwrap().unwrap();
        assert_eq!(exchange.in_message().body_as_text().as_deref(), Some("HELLO"));
        assert_eq!(exchange.from_endpoint(), Some("timer:tick"));
        assert_eq!(exchange.from_route_id(), Some("r1"));
    }

    #[tokio::test]
    async fn test_auto_release_returns_exchange_to_pool() {
        let context = pooled_context();
        let consumer = DefaultConsumer::new(context.clone(), "timer:tick", None, upper_case());
        consumer.start().await.unwrap();

        let exchange = consumer.create_exchange(true);
        assert!(consumer.process_exchange(exchange).await.unwrap().is_none());
        assert_eq!(consumer.exchange_factory().size(), 1);

        let _reused = consumer.create_exchange(true);
        assert_eq!(context.exchange_factory_manager().total_acquired(), 1);
    }

    #[tokio::test]
    async fn test_failures_go_to_exception_handler() {
        let context = SupportContextBuilder::new("test").build().unwrap();
        let failing = ProcessorConverter::to_async(Arc::new(processor_fn(|_: &mut Exchange| {
            Err(SupportError::InvalidState("rejected".into()))
        })));
        let consumer = DefaultConsumer::new(context.clone(), "direct:in", None, failing);
        let handler = Arc::new(Recording::default());
        consumer.set_exception_handler(handler.clone());
        consumer.start().await.unwrap();

        let mut events = context.subscribe_events();
        let exchange = consumer.process_body("x").await.unwrap().unwrap();
        assert!(exchange.is_failed());
        assert_eq!(handler.messages.lock().len(), 1);

        assert!(matches!(
            events.recv().await.unwrap().event,
            SupportEvent::ExchangeCreated { .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap().event,
            SupportEvent::ExchangeFailed { .. }
        ));
    }

    #[tokio::test]
    async fn test_process_body_requires_running_consumer() {
        let context = SupportContextBuilder::new("test").build().unwrap();
        let consumer = DefaultConsumer::new(context, "direct:in", None, upper_case());
        assert!(matches!(
            consumer.process_body("x").await,
            Err(SupportError::InvalidState(_))
        ));
    }
}
