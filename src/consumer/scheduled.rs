//! Scheduled polling on top of [`DefaultConsumer`].
//!
//! Each scheduled run polls the [`PollSource`] once (or repeatedly when
//! greedy), guarded by a [`PollStrategy`]. Consecutive idle or failed runs can
//! make the consumer back off for a number of runs.

use super::{Consumer, DefaultConsumer};
use crate::config::PollingConfig;
use crate::constants::defaults;
use crate::context::SupportContext;
use crate::error::{SupportError, SupportResult};
use crate::exchange::Exchange;
use crate::message::Body;
use crate::processor::AsyncProcessor;
use crate::service::{Service, ServiceExt, ServiceState};
use crate::utils::tick_period;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn, Level};

/// Scheduling and backoff settings of a [`ScheduledPollConsumer`]
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledPollConfig {
    pub initial_delay: Duration,
    pub delay: Duration,
    /// Wait `delay` after each run completes instead of running at a fixed rate
    pub use_fixed_delay: bool,
    /// Poll again immediately while messages keep coming
    pub greedy: bool,
    pub send_empty_message_when_idle: bool,
    /// Runs to skip once a threshold is hit, 0 disables backoff
    pub backoff_multiplier: u64,
    pub backoff_idle_threshold: u64,
    pub backoff_error_threshold: u64,
    /// Stop scheduling after this many runs, 0 for unlimited
    pub repeat_count: u64,
    pub start_scheduler: bool,
    pub run_logging_level: Level,
}

impl Default for ScheduledPollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(defaults::POLL_INITIAL_DELAY_MS),
            delay: Duration::from_millis(defaults::POLL_DELAY_MS),
            use_fixed_delay: true,
            greedy: false,
            send_empty_message_when_idle: false,
            backoff_multiplier: 0,
            backoff_idle_threshold: 0,
            backoff_error_threshold: 0,
            repeat_count: 0,
            start_scheduler: true,
            run_logging_level: Level::TRACE,
        }
    }
}

impl TryFrom<&PollingConfig> for ScheduledPollConfig {
    type Error = SupportError;

    fn try_from(config: &PollingConfig) -> SupportResult<Self> {
        let run_logging_level = Level::from_str(&config.run_logging_level).map_err(|_| {
            SupportError::Configuration(format!(
                "Invalid polling.run_logging_level: {}",
                config.run_logging_level
            ))
        })?;
        Ok(Self {
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            delay: Duration::from_millis(config.delay_ms),
            use_fixed_delay: config.use_fixed_delay,
            greedy: config.greedy,
            send_empty_message_when_idle: config.send_empty_message_when_idle,
            backoff_multiplier: config.backoff_multiplier,
            backoff_idle_threshold: config.backoff_idle_threshold,
            backoff_error_threshold: config.backoff_error_threshold,
            repeat_count: config.repeat_count,
            start_scheduler: config.start_scheduler,
            run_logging_level,
        })
    }
}

/// What a [`PollSource`] can do during a poll
pub struct ScheduledPollContext<'a> {
    consumer: &'a DefaultConsumer,
}

impl<'a> ScheduledPollContext<'a> {
    pub fn endpoint_uri(&self) -> &str {
        self.consumer.endpoint_uri()
    }

    pub fn consumer(&self) -> &'a DefaultConsumer {
        self.consumer
    }

    pub fn create_exchange(&self, auto_release: bool) -> Exchange {
        self.consumer.create_exchange(auto_release)
    }

    pub async fn process_exchange(&self, exchange: Exchange) -> SupportResult<Option<Exchange>> {
        self.consumer.process_exchange(exchange).await
    }
}

/// Produces exchanges when polled
#[async_trait]
pub trait PollSource: Send + Sync {
    /// Poll once, returning the number of messages processed
    async fn poll(&self, context: &ScheduledPollContext<'_>) -> SupportResult<usize>;
}

/// Hooks around every poll attempt
pub trait PollStrategy: Send + Sync {
    /// Return `false` to skip this poll
    fn begin(&self, endpoint_uri: &str) -> bool;

    fn commit(&self, endpoint_uri: &str, polled_messages: usize);

    /// Decide whether a failed poll is retried right away
    fn rollback(
        &self,
        endpoint_uri: &str,
        retry_counter: u64,
        error: &SupportError,
    ) -> SupportResult<bool>;
}

/// Always begins, never retries
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPollStrategy;

impl PollStrategy for DefaultPollStrategy {
    fn begin(&self, _endpoint_uri: &str) -> bool {
        true
    }

    fn commit(&self, _endpoint_uri: &str, _polled_messages: usize) {}

    fn rollback(
        &self,
        endpoint_uri: &str,
        _retry_counter: u64,
        error: &SupportError,
    ) -> SupportResult<bool> {
        warn!(
            endpoint_uri = %endpoint_uri,
            error = %error,
            "Consumer could not poll endpoint. Will try again at next poll"
        );
        Ok(false)
    }
}

#[derive(Debug, Default)]
struct PollCounters {
    idle: u64,
    error: u64,
    success: u64,
    backoff: u64,
    last_error: Option<SupportError>,
}

/// Consumer polling a [`PollSource`] on a tokio schedule
pub struct ScheduledPollConsumer {
    consumer: DefaultConsumer,
    source: Arc<dyn PollSource>,
    config: ScheduledPollConfig,
    poll_strategy: Mutex<Arc<dyn PollStrategy>>,
    counters: Mutex<PollCounters>,
    run_counter: AtomicU64,
    first_poll_done: AtomicBool,
    polling: AtomicBool,
    scheduler: Mutex<Option<JoinHandle<()>>>,
    state: ServiceState,
    this: Weak<ScheduledPollConsumer>,
}

impl std::fmt::Debug for ScheduledPollConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledPollConsumer")
            .field("endpoint_uri", &self.consumer.endpoint_uri())
            .field("config", &self.config)
            .field("counter", &self.counter())
            .field("status", &self.state.status())
            .finish()
    }
}

impl ScheduledPollConsumer {
    /// Create a new scheduled consumer for `endpoint_uri`
    pub fn new(
        context: Arc<SupportContext>,
        endpoint_uri: impl Into<String>,
        route_id: Option<String>,
        processor: Arc<dyn AsyncProcessor>,
        source: Arc<dyn PollSource>,
        config: ScheduledPollConfig,
    ) -> Arc<Self> {
        let consumer = DefaultConsumer::new(context, endpoint_uri, route_id, processor);
        Arc::new_cyclic(|this| Self {
            consumer,
            source,
            config,
            poll_strategy: Mutex::new(Arc::new(DefaultPollStrategy)),
            counters: Mutex::new(PollCounters::default()),
            run_counter: AtomicU64::new(0),
            first_poll_done: AtomicBool::new(false),
            polling: AtomicBool::new(false),
            scheduler: Mutex::new(None),
            state: ServiceState::new(),
            this: this.clone(),
        })
    }

    pub fn consumer(&self) -> &DefaultConsumer {
        &self.consumer
    }

    pub fn config(&self) -> &ScheduledPollConfig {
        &self.config
    }

    pub fn set_poll_strategy(&self, strategy: Arc<dyn PollStrategy>) {
        *self.poll_strategy.lock() = strategy;
    }

    /// Number of scheduled runs so far
    pub fn counter(&self) -> u64 {
        self.run_counter.load(Ordering::Relaxed)
    }

    /// Consecutive runs that found no messages
    pub fn idle_counter(&self) -> u64 {
        self.counters.lock().idle
    }

    /// Consecutive runs that failed
    pub fn error_counter(&self) -> u64 {
        self.counters.lock().error
    }

    /// Consecutive runs that succeeded
    pub fn success_counter(&self) -> u64 {
        self.counters.lock().success
    }

    pub fn last_error(&self) -> Option<SupportError> {
        self.counters.lock().last_error.clone()
    }

    pub fn is_first_poll_done(&self) -> bool {
        self.first_poll_done.load(Ordering::Relaxed)
    }

    /// Whether a poll is in progress
    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::Relaxed)
    }

    pub fn is_scheduler_running(&self) -> bool {
        self.scheduler
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Execute one scheduled run.
    ///
    /// Returns `false` once the repeat count is exhausted and the scheduler
    /// should stop.
    pub async fn run_once(&self) -> bool {
        let endpoint_uri = self.consumer.endpoint_uri();
        log_at(self.config.run_logging_level, endpoint_uri, "Scheduled task started");
        let keep_running = self.do_run().await;
        log_at(self.config.run_logging_level, endpoint_uri, "Scheduled task completed");
        keep_running
    }

    async fn do_run(&self) -> bool {
        let endpoint_uri = self.consumer.endpoint_uri();

        if self.is_suspended() {
            trace!(endpoint_uri = %endpoint_uri, "Cannot start to poll as the consumer is suspended");
            return true;
        }

        if self.should_back_off() {
            return true;
        }

        let count = self.run_counter.fetch_add(1, Ordering::Relaxed) + 1;
        if self.config.repeat_count > 0 && count > self.config.repeat_count {
            debug!(
                endpoint_uri = %endpoint_uri,
                repeat_count = self.config.repeat_count,
                "Cancelling scheduler as repeat count limit reached"
            );
            return false;
        }

        let strategy = self.poll_strategy.lock().clone();
        let poll_context = ScheduledPollContext {
            consumer: &self.consumer,
        };

        let mut retry_counter: Option<u64> = None;
        let mut polled_messages = 0;
        let mut cause: Option<SupportError> = None;
        let mut done = false;

        while !done {
            done = true;

            if self.is_poll_allowed() {
                match retry_counter {
                    None => trace!(endpoint_uri = %endpoint_uri, "Starting to poll"),
                    Some(attempt) => debug!(endpoint_uri = %endpoint_uri, attempt, "Retrying poll"),
                }

                self.polling.store(true, Ordering::Relaxed);
                let outcome = self
                    .poll_with_strategy(strategy.as_ref(), &poll_context, &mut retry_counter)
                    .await;
                self.polling.store(false, Ordering::Relaxed);

                match outcome {
                    Ok(Some(polled)) => {
                        polled_messages = polled;
                        if polled > 0 && self.config.greedy {
                            done = false;
                            retry_counter = None;
                            trace!(endpoint_uri = %endpoint_uri, polled, "Greedy polling after processing messages");
                            let mut counters = self.counters.lock();
                            counters.error = 0;
                            counters.last_error = None;
                            self.first_poll_done.store(true, Ordering::Relaxed);
                        }
                    }
                    Ok(None) => {
                        debug!(endpoint_uri = %endpoint_uri, "Cannot begin polling as the poll strategy returned false");
                    }
                    Err(error) => {
                        let attempt = retry_counter.unwrap_or(0);
                        match strategy.rollback(endpoint_uri, attempt, &error) {
                            Ok(true) => done = false,
                            Ok(false) => cause = Some(error),
                            Err(rollback_error) => cause = Some(rollback_error),
                        }
                    }
                }
            }

            trace!(endpoint_uri = %endpoint_uri, "Finished polling");

            if let Some(error) = &cause {
                if self.is_run_allowed() {
                    self.consumer.exception_handler().handle_exception(
                        &format!("Failed polling endpoint: {endpoint_uri}. Will try again at next poll"),
                        None,
                        error,
                    );
                }
            }
        }

        let mut counters = self.counters.lock();
        match cause {
            Some(error) => {
                counters.idle = 0;
                counters.success = 0;
                counters.error += 1;
                counters.last_error = Some(error);
            }
            None => {
                counters.idle = if polled_messages == 0 { counters.idle + 1 } else { 0 };
                counters.success += 1;
                counters.error = 0;
                counters.last_error = None;
            }
        }
        self.first_poll_done.store(true, Ordering::Relaxed);

        trace!(
            endpoint_uri = %endpoint_uri,
            idle_counter = counters.idle,
            success_counter = counters.success,
            error_counter = counters.error,
            "Scheduled run done"
        );
        true
    }

    /// Returns `Ok(None)` when the strategy declined to begin
    async fn poll_with_strategy(
        &self,
        strategy: &dyn PollStrategy,
        poll_context: &ScheduledPollContext<'_>,
        retry_counter: &mut Option<u64>,
    ) -> SupportResult<Option<usize>> {
        let endpoint_uri = self.consumer.endpoint_uri();
        if !strategy.begin(endpoint_uri) {
            return Ok(None);
        }
        *retry_counter = Some(retry_counter.map_or(0, |attempt| attempt + 1));

        let polled = self.source.poll(poll_context).await?;
        trace!(endpoint_uri = %endpoint_uri, polled, "Polled messages");

        if polled == 0 && self.config.send_empty_message_when_idle {
            self.process_empty_message().await?;
        }
        strategy.commit(endpoint_uri, polled);
        Ok(Some(polled))
    }

    async fn process_empty_message(&self) -> SupportResult<()> {
        let mut exchange = self.consumer.create_exchange(true);
        exchange.in_message_mut().set_body(Body::Empty);
        debug!(
            endpoint_uri = %self.consumer.endpoint_uri(),
            exchange_id = %exchange.exchange_id(),
            "Sending empty message as there were no messages from polling"
        );
        self.consumer.process_exchange(exchange).await?;
        Ok(())
    }

    fn is_poll_allowed(&self) -> bool {
        self.is_run_allowed() && !self.is_suspended()
    }

    /// Check the idle and error thresholds, consuming one backoff run if needed
    fn should_back_off(&self) -> bool {
        let multiplier = self.config.backoff_multiplier;
        if multiplier == 0 {
            return false;
        }
        let idle_threshold = threshold(self.config.backoff_idle_threshold);
        let error_threshold = threshold(self.config.backoff_error_threshold);

        let mut counters = self.counters.lock();
        if counters.idle < idle_threshold && counters.error < error_threshold {
            return false;
        }

        counters.backoff += 1;
        if counters.backoff <= multiplier {
            debug!(
                endpoint_uri = %self.consumer.endpoint_uri(),
                idle_counter = counters.idle,
                error_counter = counters.error,
                backoff = counters.backoff,
                multiplier,
                "Backing off scheduled poll"
            );
            return true;
        }

        *counters = PollCounters {
            last_error: counters.last_error.take(),
            ..PollCounters::default()
        };
        trace!(endpoint_uri = %self.consumer.endpoint_uri(), "Backoff finished, resetting counters");
        false
    }

    fn spawn_scheduler(&self) {
        let weak = self.this.clone();
        let config = self.config.clone();
        let endpoint_uri = self.consumer.endpoint_uri().to_string();
        let delay = tick_period(config.delay);

        let handle = tokio::spawn(async move {
            info!(
                endpoint_uri = %endpoint_uri,
                initial_delay_ms = config.initial_delay.as_millis() as u64,
                delay_ms = delay.as_millis() as u64,
                fixed_delay = config.use_fixed_delay,
                "Starting scheduled polling"
            );
            tokio::time::sleep(config.initial_delay).await;

            if config.use_fixed_delay {
                loop {
                    let Some(consumer) = weak.upgrade() else { break };
                    if !consumer.run_once().await {
                        break;
                    }
                    drop(consumer);
                    tokio::time::sleep(delay).await;
                }
            } else {
                let mut interval = tokio::time::interval(delay);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    let Some(consumer) = weak.upgrade() else { break };
                    if !consumer.run_once().await {
                        break;
                    }
                }
            }
            debug!(endpoint_uri = %endpoint_uri, "Scheduled polling ended");
        });
        *self.scheduler.lock() = Some(handle);
    }

    fn cancel_scheduler(&self) {
        if let Some(handle) = self.scheduler.lock().take() {
            handle.abort();
        }
    }
}

fn threshold(value: u64) -> u64 {
    if value > 0 {
        value
    } else {
        u64::MAX
    }
}

fn log_at(level: Level, endpoint_uri: &str, message: &str) {
    if level == Level::ERROR {
        tracing::error!(endpoint_uri = %endpoint_uri, "{message}");
    } else if level == Level::WARN {
        tracing::warn!(endpoint_uri = %endpoint_uri, "{message}");
    } else if level == Level::INFO {
        tracing::info!(endpoint_uri = %endpoint_uri, "{message}");
    } else if level == Level::DEBUG {
        tracing::debug!(endpoint_uri = %endpoint_uri, "{message}");
    } else {
        tracing::trace!(endpoint_uri = %endpoint_uri, "{message}");
    }
}

#[async_trait]
impl Service for ScheduledPollConsumer {
    fn service_name(&self) -> &str {
        self.consumer.endpoint_uri()
    }

    fn service_state(&self) -> &ServiceState {
        &self.state
    }

    async fn do_start(&self) -> SupportResult<()> {
        self.consumer.start().await?;
        if self.config.start_scheduler {
            self.spawn_scheduler();
        }
        Ok(())
    }

    async fn do_stop(&self) -> SupportResult<()> {
        self.cancel_scheduler();
        // an aborted run never clears the flag itself
        self.polling.store(false, Ordering::Relaxed);
        self.run_counter.store(0, Ordering::Relaxed);
        *self.counters.lock() = PollCounters::default();
        self.first_poll_done.store(false, Ordering::Relaxed);
        self.consumer.stop().await
    }

    async fn do_suspend(&self) -> SupportResult<()> {
        self.consumer.suspend().await
    }

    async fn do_resume(&self) -> SupportResult<()> {
        self.consumer.resume().await
    }

    async fn do_shutdown(&self) -> SupportResult<()> {
        self.consumer.shutdown().await
    }
}

impl Consumer for ScheduledPollConsumer {
    fn endpoint_uri(&self) -> &str {
        self.consumer.endpoint_uri()
    }

    fn processor(&self) -> Arc<dyn AsyncProcessor> {
        self.consumer.processor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SupportContextBuilder;
    use crate::processor::{processor_fn, ProcessorConverter};
    use std::collections::VecDeque;

    /// Hands out scripted poll results
    struct Scripted {
        results: Mutex<VecDeque<SupportResult<usize>>>,
        polls: AtomicU64,
    }

    impl Scripted {
        fn new(results: Vec<SupportResult<usize>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                polls: AtomicU64::new(0),
            })
        }

        fn polls(&self) -> u64 {
            self.polls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl PollSource for Scripted {
        async fn poll(&self, context: &ScheduledPollContext<'_>) -> SupportResult<usize> {
            self.polls.fetch_add(1, Ordering::Relaxed);
            let next = self.results.lock().pop_front().unwrap_or(Ok(0));
            if let Ok(count) = next {
                for _ in 0..count {
                    let exchange = context.create_exchange(false);
                    context.process_exchange(exchange).await?;
                }
            }
            next
        }
    }

    fn manual_config() -> ScheduledPollConfig {
        ScheduledPollConfig {
            start_scheduler: false,
            ..ScheduledPollConfig::default()
        }
    }

    async fn started(source: Arc<Scripted>, config: ScheduledPollConfig) -> Arc<ScheduledPollConsumer> {
        let context = SupportContextBuilder::new("poll").build().unwrap();
        let processor = ProcessorConverter::to_async(Arc::new(processor_fn(|_: &mut Exchange| Ok(()))));
        let consumer =
            ScheduledPollConsumer::new(context, "poll:test", None, processor, source, config);
        consumer.start().await.unwrap();
        consumer
    }

    #[test]
    fn test_config_from_polling_section() {
        let mut polling = PollingConfig::default();
        polling.run_logging_level = "info".into();
        polling.delay_ms = 20;
        let config = ScheduledPollConfig::try_from(&polling).unwrap();
        assert_eq!(config.run_logging_level, Level::INFO);
        assert_eq!(config.delay, Duration::from_millis(20));

        polling.run_logging_level = "loud".into();
        assert!(ScheduledPollConfig::try_from(&polling).is_err());
    }

    #[tokio::test]
    async fn test_counters_track_idle_success_and_errors() {
        let source = Scripted::new(vec![
            Ok(0),
            Ok(2),
            Err(SupportError::InvalidState("down".into())),
        ]);
        let consumer = started(source, manual_config()).await;

        consumer.run_once().await;
        assert_eq!(consumer.idle_counter(), 1);
        assert!(consumer.is_first_poll_done());

        consumer.run_once().await;
        assert_eq!(consumer.idle_counter(), 0);
        assert_eq!(consumer.success_counter(), 2);

        consumer.run_once().await;
        assert_eq!(consumer.error_counter(), 1);
        assert_eq!(consumer.success_counter(), 0);
        assert!(consumer.last_error().is_some());
        assert_eq!(consumer.counter(), 3);
    }

    #[tokio::test]
    async fn test_greedy_polls_until_idle() {
        let source = Scripted::new(vec![Ok(1), Ok(3), Ok(0)]);
        let config = ScheduledPollConfig {
            greedy: true,
            ..manual_config()
        };
        let consumer = started(source.clone(), config).await;

        consumer.run_once().await;
        assert_eq!(source.polls(), 3);
        assert_eq!(consumer.idle_counter(), 1);
    }

    #[tokio::test]
    async fn test_backoff_skips_runs_after_idle_threshold() {
        let source = Scripted::new(vec![]);
        let config = ScheduledPollConfig {
            backoff_multiplier: 2,
            backoff_idle_threshold: 1,
            ..manual_config()
        };
        let consumer = started(source.clone(), config).await;

        consumer.run_once().await; // idle
        consumer.run_once().await; // backoff 1
        consumer.run_once().await; // backoff 2
        assert_eq!(source.polls(), 1);

        consumer.run_once().await; // counters reset, polls again
        assert_eq!(source.polls(), 2);
    }

    #[tokio::test]
    async fn test_repeat_count_stops_scheduler() {
        let source = Scripted::new(vec![]);
        let config = ScheduledPollConfig {
            repeat_count: 2,
            ..manual_config()
        };
        let consumer = started(source.clone(), config).await;

        assert!(consumer.run_once().await);
        assert!(consumer.run_once().await);
        assert!(!consumer.run_once().await);
        assert_eq!(source.polls(), 2);
    }

    #[tokio::test]
    async fn test_suspended_consumer_does_not_poll() {
        let source = Scripted::new(vec![]);
        let consumer = started(source.clone(), manual_config()).await;

        consumer.suspend().await.unwrap();
        consumer.run_once().await;
        assert_eq!(source.polls(), 0);

        consumer.resume().await.unwrap();
        consumer.run_once().await;
        assert_eq!(source.polls(), 1);
    }

    struct RetryOnce {
        retried: AtomicBool,
    }

    impl PollStrategy for RetryOnce {
        fn begin(&self, _endpoint_uri: &str) -> bool {
            true
        }

        fn commit(&self, _endpoint_uri: &str, _polled_messages: usize) {}

        fn rollback(&self, _: &str, _: u64, _: &SupportError) -> SupportResult<bool> {
            Ok(!self.retried.swap(true, Ordering::Relaxed))
        }
    }

    #[tokio::test]
    async fn test_rollback_can_retry_immediately() {
        let source = Scripted::new(vec![Err(SupportError::InvalidState("flaky".into())), Ok(1)]);
        let consumer = started(source.clone(), manual_config()).await;
        consumer.set_poll_strategy(Arc::new(RetryOnce {
            retried: AtomicBool::new(false),
        }));

        consumer.run_once().await;
        assert_eq!(source.polls(), 2);
        assert_eq!(consumer.error_counter(), 0);
    }

    #[tokio::test]
    async fn test_scheduler_runs_in_background() {
        let source = Scripted::new(vec![]);
        let config = ScheduledPollConfig {
            initial_delay: Duration::from_millis(1),
            delay: Duration::from_millis(5),
            repeat_count: 3,
            ..ScheduledPollConfig::default()
        };
        let consumer = started(source.clone(), config).await;
        assert!(consumer.is_scheduler_running() || source.polls() > 0);

        tokio::time::timeout(Duration::from_secs(2), async {
            while consumer.is_scheduler_running() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(source.polls(), 3);

        consumer.stop().await.unwrap();
        assert!(!consumer.is_scheduler_running());
    }

    #[tokio::test]
    async fn test_zero_delay_fixed_rate_keeps_polling() {
        let source = Scripted::new(vec![]);
        let config = ScheduledPollConfig {
            initial_delay: Duration::ZERO,
            delay: Duration::ZERO,
            use_fixed_delay: false,
            repeat_count: 3,
            ..ScheduledPollConfig::default()
        };
        let consumer = started(source.clone(), config).await;

        tokio::time::timeout(Duration::from_secs(2), async {
            while source.polls() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(source.polls(), 3);
        assert!(consumer.is_started());
        consumer.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_delay_fixed_delay_keeps_polling() {
        let source = Scripted::new(vec![]);
        let config = ScheduledPollConfig {
            initial_delay: Duration::ZERO,
            delay: Duration::ZERO,
            repeat_count: 2,
            ..ScheduledPollConfig::default()
        };
        let consumer = started(source.clone(), config).await;

        tokio::time::timeout(Duration::from_secs(2), async {
            while consumer.is_scheduler_running() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(source.polls(), 2);
    }

    /// Never finishes a poll
    struct Stalled;

    #[async_trait]
    impl PollSource for Stalled {
        async fn poll(&self, _context: &ScheduledPollContext<'_>) -> SupportResult<usize> {
            futures::future::pending::<()>().await;
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_stop_during_poll_clears_polling_flag() {
        let context = SupportContextBuilder::new("poll").build().unwrap();
        let processor = ProcessorConverter::to_async(Arc::new(processor_fn(|_: &mut Exchange| Ok(()))));
        let config = ScheduledPollConfig {
            initial_delay: Duration::ZERO,
            delay: Duration::from_millis(5),
            ..ScheduledPollConfig::default()
        };
        let consumer = ScheduledPollConsumer::new(
            context,
            "poll:stalled",
            None,
            processor,
            Arc::new(Stalled),
            config,
        );
        consumer.start().await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while !consumer.is_polling() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();

        consumer.stop().await.unwrap();
        assert!(!consumer.is_polling());
        assert!(!consumer.is_scheduler_running());
    }
}
