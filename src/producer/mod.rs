//! # Producers
//!
//! Producers send exchanges to an endpoint. Both flavours expose the async
//! [`AsyncProcessor`] contract and refuse work unless they are running.
//!
//! - [`DefaultProducer`]: wraps a synchronous [`Processor`]
//! - [`DefaultAsyncProducer`]: wraps a native [`AsyncProcessor`], with a
//!   blocking [`process_sync`](DefaultAsyncProducer::process_sync) through the
//!   await manager
//!
//! [`send`] runs a producer and emits the sending / sent exchange events.

use crate::error::{SupportError, SupportResult};
use crate::event::{self, EventNotifiers};
use crate::exchange::{Exchange, ExchangePropertyKey};
use crate::processor::{
    process_future, AsyncCallback, AsyncProcessor, AsyncProcessorAwaitManager, Processor,
    ProcessorConverter,
};
use crate::service::{Service, ServiceState};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// Sends exchanges to an endpoint
pub trait Producer: AsyncProcessor + Service {
    fn endpoint_uri(&self) -> &str;

    /// Whether one instance can be shared by all senders
    fn is_singleton(&self) -> bool {
        true
    }
}

fn not_running(endpoint_uri: &str, exchange: &mut Exchange) {
    let error = SupportError::InvalidState(format!(
        "Producer {endpoint_uri} is not started, cannot process exchange"
    ));
    debug!(endpoint_uri = %endpoint_uri, exchange_id = %exchange.exchange_id(), "Rejecting exchange");
    exchange.set_exception(Some(error));
}

/// Producer backed by a synchronous [`Processor`]
pub struct DefaultProducer<P> {
    endpoint_uri: String,
    processor: Arc<P>,
    bridge: Arc<dyn AsyncProcessor>,
    state: ServiceState,
}

impl<P: Processor + 'static> DefaultProducer<P> {
    /// Create a new producer for `endpoint_uri`
    pub fn new(endpoint_uri: impl Into<String>, processor: P) -> Self {
        let processor = Arc::new(processor);
        let bridge = ProcessorConverter::to_async(processor.clone());
        Self {
            endpoint_uri: endpoint_uri.into(),
            processor,
            bridge,
            state: ServiceState::new(),
        }
    }

    pub fn processor(&self) -> &Arc<P> {
        &self.processor
    }
}

impl<P: Processor + 'static> AsyncProcessor for DefaultProducer<P> {
    fn process_async(&self, mut exchange: Exchange, callback: AsyncCallback) -> bool {
        if !self.state.status().is_run_allowed() {
            not_running(&self.endpoint_uri, &mut exchange);
            callback.done(exchange, true);
            return true;
        }
        self.bridge.process_async(exchange, callback)
    }
}

impl<P: Processor + 'static> Processor for DefaultProducer<P> {
    fn process(&self, exchange: &mut Exchange) -> SupportResult<()> {
        if !self.state.status().is_run_allowed() {
            not_running(&self.endpoint_uri, exchange);
            return Ok(());
        }
        self.processor.process(exchange)
    }
}

#[async_trait]
impl<P: Processor + 'static> Service for DefaultProducer<P> {
    fn service_name(&self) -> &str {
        &self.endpoint_uri
    }

    fn service_state(&self) -> &ServiceState {
        &self.state
    }
}

impl<P: Processor + 'static> Producer for DefaultProducer<P> {
    fn endpoint_uri(&self) -> &str {
        &self.endpoint_uri
    }
}

/// Producer backed by a native [`AsyncProcessor`]
pub struct DefaultAsyncProducer<A> {
    endpoint_uri: String,
    processor: A,
    await_manager: Arc<AsyncProcessorAwaitManager>,
    state: ServiceState,
}

impl<A: AsyncProcessor> DefaultAsyncProducer<A> {
    /// Create a new async producer; `await_manager` serves blocking callers
    pub fn new(
        endpoint_uri: impl Into<String>,
        processor: A,
        await_manager: Arc<AsyncProcessorAwaitManager>,
    ) -> Self {
        Self {
            endpoint_uri: endpoint_uri.into(),
            processor,
            await_manager,
            state: ServiceState::new(),
        }
    }

    pub fn processor(&self) -> &A {
        &self.processor
    }

    /// Process the exchange, blocking the calling thread until the async
    /// processor completes. Must not be called from a runtime worker thread.
    pub fn process_sync(&self, exchange: &mut Exchange) -> SupportResult<()> {
        let detached = exchange.detach();
        match self.await_manager.process(self, detached) {
            Ok(done) => {
                *exchange = done;
                Ok(())
            }
            Err(error) => {
                exchange.set_exception(Some(error.clone()));
                Err(error)
            }
        }
    }
}

impl<A: AsyncProcessor> AsyncProcessor for DefaultAsyncProducer<A> {
    fn process_async(&self, mut exchange: Exchange, callback: AsyncCallback) -> bool {
        if !self.state.status().is_run_allowed() {
            not_running(&self.endpoint_uri, &mut exchange);
            callback.done(exchange, true);
            return true;
        }
        self.processor.process_async(exchange, callback)
    }
}

#[async_trait]
impl<A: AsyncProcessor> Service for DefaultAsyncProducer<A> {
    fn service_name(&self) -> &str {
        &self.endpoint_uri
    }

    fn service_state(&self) -> &ServiceState {
        &self.state
    }
}

impl<A: AsyncProcessor> Producer for DefaultAsyncProducer<A> {
    fn endpoint_uri(&self) -> &str {
        &self.endpoint_uri
    }
}

/// Send an exchange through a producer, emitting `ExchangeSending` before
/// and `ExchangeSent` after
pub async fn send<P: Producer>(
    notifiers: &EventNotifiers,
    producer: &P,
    mut exchange: Exchange,
) -> SupportResult<Exchange> {
    let endpoint_uri = producer.endpoint_uri();
    exchange.set_property_by_key(ExchangePropertyKey::ToEndpoint, endpoint_uri);
    event::notify_exchange_sending(notifiers, &exchange, endpoint_uri);

    let started = Instant::now();
    let exchange = process_future(producer, exchange).await?;
    let elapsed = started.elapsed();

    trace!(
        exchange_id = %exchange.exchange_id(),
        endpoint_uri = %endpoint_uri,
        elapsed_ms = elapsed.as_millis() as u64,
        "Exchange sent"
    );
    event::notify_exchange_sent(notifiers, &exchange, endpoint_uri, elapsed);
    Ok(exchange)
}
