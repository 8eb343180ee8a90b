//! # Async Processor Await Manager
//!
//! Runs an [`AsyncProcessor`] from synchronous code by blocking the calling
//! thread until the callback fires.
//!
//! ## Overview
//!
//! Every blocked call is registered as an in-flight wait keyed by exchange id.
//! A wait ends when the callback delivers the exchange, when it is
//! interrupted via [`AsyncProcessorAwaitManager::interrupt`], or when the
//! optional await timeout elapses. Stopping the manager interrupts all waits
//! when `interrupt_threads_while_stopping` is set.
//!
//! Blocking calls must not run on an async runtime worker thread; use
//! `tokio::task::spawn_blocking` or a dedicated thread.

use super::{AsyncCallback, AsyncProcessor};
use crate::error::{SupportError, SupportResult};
use crate::event::{self, EventNotifiers};
use crate::exchange::Exchange;
use crate::service::{Service, ServiceState};
use async_trait::async_trait;
use crossbeam::channel::{self, Receiver, RecvError, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// A thread currently blocked waiting for a callback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwaitThread {
    pub exchange_id: String,
    pub thread_name: String,
    pub waiting_ms: u64,
}

/// Wait statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AwaitStatistics {
    pub threads_blocked: u64,
    pub threads_interrupted: u64,
    pub total_duration_ms: u64,
    pub min_duration_ms: u64,
    pub max_duration_ms: u64,
    pub mean_duration_ms: u64,
}

impl AwaitStatistics {
    fn record(&mut self, duration: Duration, interrupted: bool) {
        let millis = duration.as_millis() as u64;
        self.threads_blocked += 1;
        if interrupted {
            self.threads_interrupted += 1;
        }
        self.total_duration_ms += millis;
        self.min_duration_ms = if self.threads_blocked == 1 {
            millis
        } else {
            self.min_duration_ms.min(millis)
        };
        self.max_duration_ms = self.max_duration_ms.max(millis);
        self.mean_duration_ms = self.total_duration_ms / self.threads_blocked;
    }
}

struct InflightWait {
    exchange_id: String,
    thread_name: String,
    started: Instant,
    interrupt: Sender<()>,
}

enum Outcome {
    Done(Exchange),
    Dropped,
    Interrupted,
    TimedOut(Duration),
}

fn outcome_of(message: Result<Exchange, RecvError>) -> Outcome {
    match message {
        Ok(exchange) => Outcome::Done(exchange),
        Err(_) => Outcome::Dropped,
    }
}

pub struct AsyncProcessorAwaitManager {
    state: ServiceState,
    /// Keyed per blocked call; copies of one exchange share its id
    inflight: DashMap<u64, InflightWait>,
    next_wait: AtomicU64,
    timeout: Mutex<Option<Duration>>,
    interrupt_threads_while_stopping: AtomicBool,
    statistics_enabled: AtomicBool,
    statistics: Mutex<AwaitStatistics>,
    event_notifiers: Option<Arc<EventNotifiers>>,
}

impl std::fmt::Debug for AsyncProcessorAwaitManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncProcessorAwaitManager")
            .field("inflight", &self.inflight.len())
            .field("timeout", &*self.timeout.lock())
            .finish()
    }
}

impl AsyncProcessorAwaitManager {
    /// Create a new await manager without a timeout
    pub fn new() -> Self {
        Self {
            state: ServiceState::new(),
            inflight: DashMap::new(),
            next_wait: AtomicU64::new(1),
            timeout: Mutex::new(None),
            interrupt_threads_while_stopping: AtomicBool::new(true),
            statistics_enabled: AtomicBool::new(false),
            statistics: Mutex::new(AwaitStatistics::default()),
            event_notifiers: None,
        }
    }

    /// Emit `ExchangeAsyncProcessingStarted` to these notifiers whenever a
    /// call has to block
    pub fn with_event_notifiers(mut self, notifiers: Arc<EventNotifiers>) -> Self {
        self.event_notifiers = Some(notifiers);
        self
    }

    pub fn with_timeout(self, timeout: Option<Duration>) -> Self {
        *self.timeout.lock() = timeout;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        *self.timeout.lock()
    }

    pub fn set_timeout(&self, timeout: Option<Duration>) {
        *self.timeout.lock() = timeout;
    }

    pub fn is_interrupt_threads_while_stopping(&self) -> bool {
        self.interrupt_threads_while_stopping.load(Ordering::Relaxed)
    }

    pub fn set_interrupt_threads_while_stopping(&self, interrupt: bool) {
        self.interrupt_threads_while_stopping
            .store(interrupt, Ordering::Relaxed);
    }

    /// Process the exchange, blocking until the callback has been invoked
    pub fn process(
        &self,
        processor: &dyn AsyncProcessor,
        exchange: Exchange,
    ) -> SupportResult<Exchange> {
        let exchange_id = exchange.exchange_id().to_string();
        let (done_tx, done_rx) = channel::bounded::<Exchange>(1);
        let (interrupt_tx, interrupt_rx) = channel::bounded::<()>(1);

        let callback = AsyncCallback::new(move |exchange, _done_sync| {
            // the waiter may already be gone after an interrupt or timeout
            let _ = done_tx.send(exchange);
        });

        let notify_event = exchange.extension().is_notify_event();
        let sync = processor.process_async(exchange, callback);
        if sync {
            trace!(exchange_id = %exchange_id, "Async processor completed synchronously");
        } else if let Some(notifiers) = self.event_notifiers.as_deref().filter(|_| !notify_event) {
            event::notify_exchange_async_processing_started(notifiers, &exchange_id);
        }

        let started = Instant::now();
        let token = self.next_wait.fetch_add(1, Ordering::Relaxed);
        self.inflight.insert(
            token,
            InflightWait {
                exchange_id: exchange_id.clone(),
                thread_name: std::thread::current()
                    .name()
                    .unwrap_or("unnamed")
                    .to_string(),
                started,
                interrupt: interrupt_tx,
            },
        );

        let outcome = self.wait(&done_rx, &interrupt_rx);
        self.inflight.remove(&token);

        let interrupted = matches!(outcome, Outcome::Interrupted | Outcome::TimedOut(_));
        if self.is_statistics_enabled() {
            self.statistics.lock().record(started.elapsed(), interrupted);
        }

        match outcome {
            Outcome::Done(exchange) => Ok(exchange),
            Outcome::Dropped => Err(SupportError::processing(
                exchange_id,
                "async callback dropped without completing",
            )),
            Outcome::Interrupted => {
                warn!(exchange_id = %exchange_id, "Interrupted while waiting for asynchronous callback");
                Err(SupportError::Interrupted { exchange_id })
            }
            Outcome::TimedOut(timeout) => {
                warn!(
                    exchange_id = %exchange_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Timed out waiting for asynchronous callback"
                );
                Err(SupportError::Timeout {
                    exchange_id,
                    timeout,
                })
            }
        }
    }

    fn wait(&self, done_rx: &Receiver<Exchange>, interrupt_rx: &Receiver<()>) -> Outcome {
        match self.timeout() {
            Some(timeout) => channel::select! {
                recv(done_rx) -> message => outcome_of(message),
                recv(interrupt_rx) -> _ => Outcome::Interrupted,
                default(timeout) => Outcome::TimedOut(timeout),
            },
            None => channel::select! {
                recv(done_rx) -> message => outcome_of(message),
                recv(interrupt_rx) -> _ => Outcome::Interrupted,
            },
        }
    }

    /// Number of threads currently blocked
    pub fn size(&self) -> usize {
        self.inflight.len()
    }

    /// Snapshot of the blocked threads
    pub fn browse(&self) -> Vec<AwaitThread> {
        self.inflight
            .iter()
            .map(|entry| AwaitThread {
                exchange_id: entry.exchange_id.clone(),
                thread_name: entry.thread_name.clone(),
                waiting_ms: entry.started.elapsed().as_millis() as u64,
            })
            .collect()
    }

    /// Wake every thread waiting on `exchange_id`; returns whether one was found
    pub fn interrupt(&self, exchange_id: &str) -> bool {
        let mut found = false;
        for wait in self.inflight.iter().filter(|wait| wait.exchange_id == exchange_id) {
            debug!(exchange_id = %exchange_id, thread = %wait.thread_name, "Interrupting blocked thread");
            let _ = wait.interrupt.try_send(());
            found = true;
        }
        found
    }

    pub fn interrupt_all(&self) -> usize {
        self.inflight
            .iter()
            .map(|wait| {
                let _ = wait.interrupt.try_send(());
            })
            .count()
    }

    pub fn is_statistics_enabled(&self) -> bool {
        self.statistics_enabled.load(Ordering::Relaxed)
    }

    pub fn set_statistics_enabled(&self, enabled: bool) {
        self.statistics_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn statistics(&self) -> AwaitStatistics {
        self.statistics.lock().clone()
    }

    pub fn reset_statistics(&self) {
        *self.statistics.lock() = AwaitStatistics::default();
    }
}

impl Default for AsyncProcessorAwaitManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Service for AsyncProcessorAwaitManager {
    fn service_name(&self) -> &str {
        "async-processor-await-manager"
    }

    fn service_state(&self) -> &ServiceState {
        &self.state
    }

    async fn do_stop(&self) -> SupportResult<()> {
        let blocked = self.size();
        if blocked > 0 {
            if self.is_interrupt_threads_while_stopping() {
                let interrupted = self.interrupt_all();
                warn!(blocked, interrupted, "Interrupting threads blocked on async callbacks");
            } else {
                warn!(blocked, "Threads still blocked on async callbacks while stopping");
            }
        }
        Ok(())
    }
}
