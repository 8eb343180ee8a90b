//! # Support Context
//!
//! Shared dependencies for consumers, producers and processors: the
//! configuration, UUID generator, bean registry, variable repositories, event
//! notifiers, exchange factory manager and async await manager.
//!
//! ## Usage
//!
//! ```rust
//! use conduit_support::context::SupportContextBuilder;
//! use conduit_support::service::ServiceExt;
//!
//! # tokio_test::block_on(async {
//! let context = SupportContextBuilder::new("orders").build().unwrap();
//! context.start().await.unwrap();
//!
//! let exchange = context.new_exchange();
//! assert!(!exchange.exchange_id().is_empty());
//!
//! context.stop().await.unwrap();
//! # });
//! ```

use crate::config::SupportConfig;
use crate::error::SupportResult;
use crate::event::{
    self, BroadcastEventNotifier, EventCategory, EventNotifier, EventNotifiers,
    LoggingEventNotifier,
};
use crate::exchange::{Exchange, ExchangeContext, ExchangeFactoryManager, ExchangePattern};
use crate::id_generator::{create_uuid_generator, UuidGenerator};
use crate::processor::AsyncProcessorAwaitManager;
use crate::registry::DefaultRegistry;
use crate::service::{service_helper, Service, ServiceExt, ServiceState};
use crate::variable::VariableRepositoryFactory;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// Dependency container shared by everything running inside one context
pub struct SupportContext {
    name: String,
    state: ServiceState,
    config: SupportConfig,
    exchange_context: ExchangeContext,
    registry: Arc<DefaultRegistry>,
    event_notifiers: Arc<EventNotifiers>,
    event_broadcaster: Arc<BroadcastEventNotifier>,
    exchange_factory_manager: Arc<ExchangeFactoryManager>,
    await_manager: Arc<AsyncProcessorAwaitManager>,
    services: RwLock<Vec<Arc<dyn Service>>>,
}

impl std::fmt::Debug for SupportContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupportContext")
            .field("name", &self.name)
            .field("status", &self.state.status())
            .field("uuid_generator", self.exchange_context.uuid_generator())
            .field("event_notifiers", &self.event_notifiers.len())
            .field("services", &self.services.read().len())
            .finish()
    }
}

impl SupportContext {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &SupportConfig {
        &self.config
    }

    pub fn uuid_generator(&self) -> &Arc<dyn UuidGenerator> {
        self.exchange_context.uuid_generator()
    }

    pub fn registry(&self) -> &Arc<DefaultRegistry> {
        &self.registry
    }

    pub fn variable_repositories(&self) -> &Arc<VariableRepositoryFactory> {
        self.exchange_context.variable_repositories()
    }

    pub fn event_notifiers(&self) -> &Arc<EventNotifiers> {
        &self.event_notifiers
    }

    /// Subscribe to every event this context emits
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<event::PublishedEvent> {
        self.event_broadcaster.subscribe()
    }

    pub fn event_stream(&self) -> impl futures::Stream<Item = event::PublishedEvent> + Send + 'static {
        self.event_broadcaster.stream()
    }

    pub fn exchange_factory_manager(&self) -> &Arc<ExchangeFactoryManager> {
        &self.exchange_factory_manager
    }

    pub fn await_manager(&self) -> &Arc<AsyncProcessorAwaitManager> {
        &self.await_manager
    }

    /// Handle exchanges use to reach the UUID generator and variable repositories
    pub fn exchange_context(&self) -> ExchangeContext {
        self.exchange_context.clone()
    }

    pub fn new_exchange(&self) -> Exchange {
        Exchange::new(self.exchange_context())
    }

    pub fn new_exchange_with_pattern(&self, pattern: ExchangePattern) -> Exchange {
        Exchange::with_pattern(self.exchange_context(), pattern)
    }

    /// Add a child service. It is started right away when the context is
    /// already running, otherwise together with the context.
    pub async fn add_service(&self, service: Arc<dyn Service>) -> SupportResult<()> {
        debug!(context = %self.name, service = %service.service_name(), "Adding service");
        self.services.write().push(service.clone());
        if self.is_started() {
            service_helper::start_services(&[service], &self.event_notifiers).await?;
        }
        Ok(())
    }

    /// Remove a child service without stopping it
    pub fn remove_service(&self, service: &Arc<dyn Service>) -> bool {
        let mut services = self.services.write();
        let before = services.len();
        services.retain(|s| !Arc::ptr_eq(s, service));
        before != services.len()
    }

    pub fn services(&self) -> Vec<Arc<dyn Service>> {
        self.services.read().clone()
    }
}

#[async_trait]
impl Service for SupportContext {
    fn service_name(&self) -> &str {
        &self.name
    }

    fn service_state(&self) -> &ServiceState {
        &self.state
    }

    async fn do_start(&self) -> SupportResult<()> {
        info!(context = %self.name, "Starting support context");
        event::notify_context_starting(&self.event_notifiers, &self.name);

        let started = async {
            self.await_manager.start().await?;
            service_helper::start_services(&self.services(), &self.event_notifiers).await
        }
        .await;

        match started {
            Ok(()) => {
                event::notify_context_started(&self.event_notifiers, &self.name);
                info!(context = %self.name, services = self.services.read().len(), "Support context started");
                Ok(())
            }
            Err(error) => {
                event::notify_context_startup_failure(&self.event_notifiers, &self.name, &error);
                Err(error)
            }
        }
    }

    async fn do_stop(&self) -> SupportResult<()> {
        info!(context = %self.name, "Stopping support context");
        event::notify_context_stopping(&self.event_notifiers, &self.name);

        let services_result = service_helper::stop_services(&self.services(), &self.event_notifiers).await;
        let await_result = self.await_manager.stop().await;
        self.exchange_factory_manager.purge_all();

        match services_result.and(await_result) {
            Ok(()) => {
                event::notify_context_stopped(&self.event_notifiers, &self.name);
                info!(context = %self.name, "Support context stopped");
                Ok(())
            }
            Err(error) => {
                event::notify_context_stop_failure(&self.event_notifiers, &self.name, &error);
                Err(error)
            }
        }
    }

    async fn do_suspend(&self) -> SupportResult<()> {
        service_helper::suspend_services(&self.services()).await
    }

    async fn do_resume(&self) -> SupportResult<()> {
        service_helper::resume_services(&self.services()).await
    }

    async fn do_shutdown(&self) -> SupportResult<()> {
        let result = service_helper::stop_and_shutdown_services(&self.services(), &self.event_notifiers)
            .await;
        self.await_manager.shutdown().await?;
        result
    }
}

/// Builder for [`SupportContext`]
pub struct SupportContextBuilder {
    name: String,
    config: SupportConfig,
    uuid_generator: Option<Arc<dyn UuidGenerator>>,
    registry: Option<Arc<DefaultRegistry>>,
    variable_repositories: Option<Arc<VariableRepositoryFactory>>,
    event_notifiers: Vec<Arc<dyn EventNotifier>>,
}

impl SupportContextBuilder {
    /// Create a new builder with default configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: SupportConfig::default(),
            uuid_generator: None,
            registry: None,
            variable_repositories: None,
            event_notifiers: Vec::new(),
        }
    }

    pub fn config(mut self, config: SupportConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this generator instead of the one named in the configuration
    pub fn uuid_generator(mut self, generator: Arc<dyn UuidGenerator>) -> Self {
        self.uuid_generator = Some(generator);
        self
    }

    pub fn registry(mut self, registry: Arc<DefaultRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn variable_repositories(mut self, factory: Arc<VariableRepositoryFactory>) -> Self {
        self.variable_repositories = Some(factory);
        self
    }

    pub fn event_notifier(mut self, notifier: Arc<dyn EventNotifier>) -> Self {
        self.event_notifiers.push(notifier);
        self
    }

    pub fn build(self) -> SupportResult<Arc<SupportContext>> {
        self.config.validate()?;
        let config = self.config;

        let uuid_generator = self
            .uuid_generator
            .unwrap_or_else(|| create_uuid_generator(config.uuid.generator));
        let variable_repositories = self
            .variable_repositories
            .unwrap_or_else(|| Arc::new(VariableRepositoryFactory::new()));
        let exchange_context = ExchangeContext::new(uuid_generator, variable_repositories);

        let ignore_exchange_events = config.events.ignore_exchange_events;
        let event_notifiers = Arc::new(EventNotifiers::new());
        let event_broadcaster = Arc::new(BroadcastEventNotifier::new(
            config.events.channel_capacity as usize,
        ));
        event_broadcaster
            .support()
            .set_ignored(EventCategory::Exchange, ignore_exchange_events);
        event_notifiers.add(event_broadcaster.clone());
        if config.events.log_events {
            let logging = LoggingEventNotifier::new();
            logging
                .support()
                .set_ignored(EventCategory::Exchange, ignore_exchange_events);
            event_notifiers.add(Arc::new(logging));
        }
        for notifier in self.event_notifiers {
            event_notifiers.add(notifier);
        }

        let exchange_factory_manager = Arc::new(ExchangeFactoryManager::new(
            exchange_context.clone(),
            config.exchange.pooled,
            config.exchange.pool_capacity as usize,
        ));
        exchange_factory_manager.set_statistics_enabled(config.exchange.statistics_enabled);

        let await_manager = AsyncProcessorAwaitManager::new()
            .with_timeout(config.async_processing.await_timeout())
            .with_event_notifiers(event_notifiers.clone());
        await_manager
            .set_interrupt_threads_while_stopping(config.async_processing.interrupt_threads_while_stopping);
        await_manager.set_statistics_enabled(config.async_processing.statistics_enabled);

        debug!(
            context = %self.name,
            pooled = config.exchange.pooled,
            uuid_generator = %config.uuid.generator,
            "Support context built"
        );

        Ok(Arc::new(SupportContext {
            name: self.name,
            state: ServiceState::new(),
            config,
            exchange_context,
            registry: self.registry.unwrap_or_else(|| Arc::new(DefaultRegistry::new())),
            event_notifiers,
            event_broadcaster,
            exchange_factory_manager,
            await_manager: Arc::new(await_manager),
            services: RwLock::new(Vec::new()),
        }))
    }
}
