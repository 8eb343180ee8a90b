//! # Exchange Factories
//!
//! Consumers create their exchanges through an [`ExchangeFactory`]. The
//! [`PrototypeExchangeFactory`] creates a fresh exchange every time, while the
//! [`PooledExchangeFactory`] recycles released exchanges through a bounded
//! lock-free queue to reduce allocation churn on busy consumers.
//!
//! ## Pool Accounting
//!
//! ```text
//! create()  -> pool hit   -> acquired += 1
//!           -> pool miss  -> created  += 1
//! release() -> pool space -> released += 1
//!           -> pool full  -> discarded += 1
//! ```
//!
//! The [`ExchangeFactoryManager`] keeps track of the factories of all running
//! consumers and aggregates their statistics.

use super::{Exchange, ExchangeContext, ExchangePattern};
use crossbeam::queue::ArrayQueue;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

static NEXT_FACTORY_ID: AtomicU64 = AtomicU64::new(1);

fn next_factory_id() -> u64 {
    NEXT_FACTORY_ID.fetch_add(1, Ordering::Relaxed)
}

/// Counters kept by an exchange factory
#[derive(Debug, Default)]
pub struct ExchangeFactoryStatistics {
    created: AtomicU64,
    acquired: AtomicU64,
    released: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time copy of [`ExchangeFactoryStatistics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeFactoryStatisticsSnapshot {
    pub created: u64,
    pub acquired: u64,
    pub released: u64,
    pub discarded: u64,
}

impl ExchangeFactoryStatistics {
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::Relaxed)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ExchangeFactoryStatisticsSnapshot {
        ExchangeFactoryStatisticsSnapshot {
            created: self.created(),
            acquired: self.acquired(),
            released: self.released(),
            discarded: self.discarded(),
        }
    }

    pub fn reset(&self) {
        self.created.store(0, Ordering::Relaxed);
        self.acquired.store(0, Ordering::Relaxed);
        self.released.store(0, Ordering::Relaxed);
        self.discarded.store(0, Ordering::Relaxed);
    }

    fn increment(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Creates the exchanges of a single consumer
pub trait ExchangeFactory: Send + Sync + fmt::Debug {
    /// Unique id of this factory instance
    fn id(&self) -> u64;

    /// Create an exchange originating from the consumer's endpoint
    fn create(&self, auto_release: bool) -> Exchange;

    /// Create an exchange originating from the given endpoint
    fn create_from(&self, endpoint_uri: &str, auto_release: bool) -> Exchange;

    /// Hand an exchange back; returns whether it was returned to a pool
    fn release(&self, exchange: Exchange) -> bool;

    fn capacity(&self) -> usize;

    /// Number of exchanges currently pooled
    fn size(&self) -> usize;

    fn statistics(&self) -> &ExchangeFactoryStatistics;

    fn reset_statistics(&self) {
        self.statistics().reset();
    }

    fn is_statistics_enabled(&self) -> bool;

    fn set_statistics_enabled(&self, enabled: bool);

    /// Drop all pooled exchanges
    fn purge(&self);

    fn is_pooled(&self) -> bool;

    fn route_id(&self) -> Option<&str>;

    fn consumer_uri(&self) -> &str;
}

/// Creates a new exchange for every request
#[derive(Debug)]
pub struct PrototypeExchangeFactory {
    id: u64,
    context: ExchangeContext,
    consumer_uri: String,
    route_id: Option<String>,
    pattern: ExchangePattern,
    statistics: ExchangeFactoryStatistics,
    statistics_enabled: AtomicBool,
}

impl PrototypeExchangeFactory {
    /// Create a new prototype factory for the given consumer endpoint
    pub fn new(context: ExchangeContext, consumer_uri: impl Into<String>, route_id: Option<String>) -> Self {
        Self {
            id: next_factory_id(),
            context,
            consumer_uri: consumer_uri.into(),
            route_id,
            pattern: ExchangePattern::InOnly,
            statistics: ExchangeFactoryStatistics::default(),
            statistics_enabled: AtomicBool::new(false),
        }
    }

    pub fn with_pattern(mut self, pattern: ExchangePattern) -> Self {
        self.pattern = pattern;
        self
    }

    fn stamp(&self, exchange: &mut Exchange, endpoint_uri: &str) {
        let extension = exchange.extension_mut();
        extension.set_from_endpoint(Some(endpoint_uri.to_string()));
        extension.set_from_route_id(self.route_id.clone());
    }
}

impl ExchangeFactory for PrototypeExchangeFactory {
    fn id(&self) -> u64 {
        self.id
    }

    fn create(&self, auto_release: bool) -> Exchange {
        self.create_from(&self.consumer_uri, auto_release)
    }

    fn create_from(&self, endpoint_uri: &str, _auto_release: bool) -> Exchange {
        let mut exchange = Exchange::with_pattern(self.context.clone(), self.pattern);
        self.stamp(&mut exchange, endpoint_uri);
        if self.is_statistics_enabled() {
            ExchangeFactoryStatistics::increment(&self.statistics.created);
        }
        exchange
    }

    fn release(&self, _exchange: Exchange) -> bool {
        false
    }

    fn capacity(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        0
    }

    fn statistics(&self) -> &ExchangeFactoryStatistics {
        &self.statistics
    }

    fn is_statistics_enabled(&self) -> bool {
        self.statistics_enabled.load(Ordering::Relaxed)
    }

    fn set_statistics_enabled(&self, enabled: bool) {
        self.statistics_enabled.store(enabled, Ordering::Relaxed);
    }

    fn purge(&self) {}

    fn is_pooled(&self) -> bool {
        false
    }

    fn route_id(&self) -> Option<&str> {
        self.route_id.as_deref()
    }

    fn consumer_uri(&self) -> &str {
        &self.consumer_uri
    }
}

/// Recycles released exchanges through a bounded pool
pub struct PooledExchangeFactory {
    inner: PrototypeExchangeFactory,
    pool: ArrayQueue<Exchange>,
}

impl fmt::Debug for PooledExchangeFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledExchangeFactory")
            .field("id", &self.inner.id)
            .field("consumer_uri", &self.inner.consumer_uri)
            .field("capacity", &self.pool.capacity())
            .field("size", &self.pool.len())
            .finish()
    }
}

impl PooledExchangeFactory {
    /// Create a new pooled factory holding at most `capacity` idle exchanges
    pub fn new(
        context: ExchangeContext,
        consumer_uri: impl Into<String>,
        route_id: Option<String>,
        capacity: usize,
    ) -> Self {
        Self {
            inner: PrototypeExchangeFactory::new(context, consumer_uri, route_id),
            pool: ArrayQueue::new(capacity.max(1)),
        }
    }

    pub fn with_pattern(mut self, pattern: ExchangePattern) -> Self {
        self.inner.pattern = pattern;
        self
    }

    fn count(&self, counter: &AtomicU64) {
        if self.inner.is_statistics_enabled() {
            ExchangeFactoryStatistics::increment(counter);
        }
    }
}

impl ExchangeFactory for PooledExchangeFactory {
    fn id(&self) -> u64 {
        self.inner.id
    }

    fn create(&self, auto_release: bool) -> Exchange {
        self.create_from(&self.inner.consumer_uri, auto_release)
    }

    fn create_from(&self, endpoint_uri: &str, auto_release: bool) -> Exchange {
        let mut exchange = match self.pool.pop() {
            Some(exchange) => {
                self.count(&self.inner.statistics.acquired);
                exchange
            }
            None => {
                self.count(&self.inner.statistics.created);
                Exchange::new_pooled(self.inner.context.clone(), self.inner.pattern)
            }
        };
        exchange.set_auto_release(auto_release);
        self.inner.stamp(&mut exchange, endpoint_uri);
        exchange
    }

    fn release(&self, mut exchange: Exchange) -> bool {
        if !exchange.is_pooled() {
            warn!(
                consumer_uri = %self.inner.consumer_uri,
                exchange_id = %exchange.exchange_id(),
                "Rejecting release of an exchange that was not created by a pool"
            );
            return false;
        }

        exchange.reset();
        match self.pool.push(exchange) {
            Ok(()) => {
                self.count(&self.inner.statistics.released);
                true
            }
            Err(_) => {
                self.count(&self.inner.statistics.discarded);
                false
            }
        }
    }

    fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    fn size(&self) -> usize {
        self.pool.len()
    }

    fn statistics(&self) -> &ExchangeFactoryStatistics {
        &self.inner.statistics
    }

    fn is_statistics_enabled(&self) -> bool {
        self.inner.is_statistics_enabled()
    }

    fn set_statistics_enabled(&self, enabled: bool) {
        self.inner.set_statistics_enabled(enabled);
    }

    fn purge(&self) {
        let mut purged = 0usize;
        while self.pool.pop().is_some() {
            purged += 1;
        }
        debug!(consumer_uri = %self.inner.consumer_uri, purged, "Purged exchange pool");
    }

    fn is_pooled(&self) -> bool {
        true
    }

    fn route_id(&self) -> Option<&str> {
        self.inner.route_id()
    }

    fn consumer_uri(&self) -> &str {
        &self.inner.consumer_uri
    }
}

/// Tracks the exchange factories of all consumers
#[derive(Debug)]
pub struct ExchangeFactoryManager {
    context: ExchangeContext,
    pooled: bool,
    capacity: usize,
    statistics_enabled: AtomicBool,
    factories: DashMap<u64, Arc<dyn ExchangeFactory>>,
}

impl ExchangeFactoryManager {
    /// Create a new manager; `pooled` selects the factory kind handed to consumers
    pub fn new(context: ExchangeContext, pooled: bool, capacity: usize) -> Self {
        Self {
            context,
            pooled,
            capacity,
            statistics_enabled: AtomicBool::new(false),
            factories: DashMap::new(),
        }
    }

    pub fn is_pooled(&self) -> bool {
        self.pooled
    }

    /// Create a factory for a consumer using the configured kind
    pub fn new_factory(
        &self,
        consumer_uri: &str,
        route_id: Option<String>,
        pattern: ExchangePattern,
    ) -> Arc<dyn ExchangeFactory> {
        let factory: Arc<dyn ExchangeFactory> = if self.pooled {
            Arc::new(
                PooledExchangeFactory::new(self.context.clone(), consumer_uri, route_id, self.capacity)
                    .with_pattern(pattern),
            )
        } else {
            Arc::new(
                PrototypeExchangeFactory::new(self.context.clone(), consumer_uri, route_id)
                    .with_pattern(pattern),
            )
        };
        factory.set_statistics_enabled(self.is_statistics_enabled());
        factory
    }

    pub fn add_exchange_factory(&self, factory: Arc<dyn ExchangeFactory>) {
        debug!(
            factory_id = factory.id(),
            consumer_uri = %factory.consumer_uri(),
            pooled = factory.is_pooled(),
            "Registering exchange factory"
        );
        factory.set_statistics_enabled(self.is_statistics_enabled());
        self.factories.insert(factory.id(), factory);
    }

    pub fn remove_exchange_factory(&self, factory: &dyn ExchangeFactory) -> bool {
        self.factories.remove(&factory.id()).is_some()
    }

    pub fn exchange_factories(&self) -> Vec<Arc<dyn ExchangeFactory>> {
        self.factories.iter().map(|e| e.value().clone()).collect()
    }

    /// Number of registered consumer factories
    pub fn consumer_counter(&self) -> usize {
        self.factories.len()
    }

    /// Pool capacity per consumer
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of idle exchanges across all pools
    pub fn pooled_exchange_count(&self) -> usize {
        self.factories.iter().map(|f| f.size()).sum()
    }

    fn sum(&self, read: impl Fn(&ExchangeFactoryStatistics) -> u64) -> u64 {
        self.factories.iter().map(|f| read(f.statistics())).sum()
    }

    pub fn total_created(&self) -> u64 {
        self.sum(ExchangeFactoryStatistics::created)
    }

    pub fn total_acquired(&self) -> u64 {
        self.sum(ExchangeFactoryStatistics::acquired)
    }

    pub fn total_released(&self) -> u64 {
        self.sum(ExchangeFactoryStatistics::released)
    }

    pub fn total_discarded(&self) -> u64 {
        self.sum(ExchangeFactoryStatistics::discarded)
    }

    pub fn is_statistics_enabled(&self) -> bool {
        self.statistics_enabled.load(Ordering::Relaxed)
    }

    pub fn set_statistics_enabled(&self, enabled: bool) {
        self.statistics_enabled.store(enabled, Ordering::Relaxed);
        for factory in self.factories.iter() {
            factory.set_statistics_enabled(enabled);
        }
    }

    pub fn reset_statistics(&self) {
        for factory in self.factories.iter() {
            factory.reset_statistics();
        }
    }

    pub fn purge_all(&self) {
        for factory in self.factories.iter() {
            factory.purge();
        }
    }
}
