//! # Processors and the Async Bridge
//!
//! Two processing styles meet here:
//!
//! - [`Processor`]: synchronous, mutates the exchange in place.
//! - [`AsyncProcessor`]: takes ownership of the exchange and hands it back
//!   through a one-shot [`AsyncCallback`], possibly from another thread.
//!
//! ## Bridging
//!
//! ```text
//! Processor ──ProcessorConverter::to_async──> AsyncProcessor
//! AsyncProcessor ──AsyncProcessorAdapter (await manager, blocks)──> Processor
//! AsyncProcessor ──process_future (tokio oneshot)──> Future<Output = Exchange>
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use conduit_support::exchange::{Exchange, ExchangeContext};
//! use conduit_support::processor::{process_future, processor_fn, ProcessorConverter};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let upper = Arc::new(processor_fn(|exchange: &mut Exchange| {
//!     let text = exchange.in_message().body_as_text().unwrap_or_default();
//!     exchange.in_message_mut().set_body(text.to_uppercase());
//!     Ok(())
//! }));
//! let async_upper = ProcessorConverter::to_async(upper);
//!
//! let mut exchange = Exchange::new(ExchangeContext::default());
//! exchange.in_message_mut().set_body("hello");
//! let exchange = process_future(async_upper.as_ref(), exchange).await.unwrap();
//! assert_eq!(exchange.in_message().body_as_text().as_deref(), Some("HELLO"));
//! # });
//! ```

mod await_manager;
mod converter;
mod future;

pub use await_manager::{AsyncProcessorAwaitManager, AwaitStatistics, AwaitThread};
pub use converter::{AsyncProcessorAdapter, ProcessorConverter};
pub use future::{process_future, AsyncCallbackFuture};

use crate::error::SupportResult;
use crate::exchange::Exchange;
use std::fmt;
use std::sync::Arc;

/// Synchronous processing step
pub trait Processor: Send + Sync {
    fn process(&self, exchange: &mut Exchange) -> SupportResult<()>;

    /// The async processor this one adapts, if it is an adapter
    fn as_async(&self) -> Option<Arc<dyn AsyncProcessor>> {
        None
    }
}

/// Asynchronous processing step.
///
/// The callback must be invoked exactly once with the exchange. Returns `true`
/// when processing completed synchronously, in which case the callback has
/// already run with `done_sync = true`.
pub trait AsyncProcessor: Send + Sync {
    fn process_async(&self, exchange: Exchange, callback: AsyncCallback) -> bool;
}

/// One-shot completion callback, receiving the exchange and the `done_sync` flag
pub struct AsyncCallback {
    inner: Box<dyn FnOnce(Exchange, bool) + Send>,
}

impl fmt::Debug for AsyncCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AsyncCallback")
    }
}

impl AsyncCallback {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(Exchange, bool) + Send + 'static,
    {
        Self {
            inner: Box::new(callback),
        }
    }

    /// Complete processing, handing the exchange back
    pub fn done(self, exchange: Exchange, done_sync: bool) {
        (self.inner)(exchange, done_sync)
    }
}

/// A [`Processor`] backed by a closure
pub struct FnProcessor<F> {
    func: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(&mut Exchange) -> SupportResult<()> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Processor for FnProcessor<F>
where
    F: Fn(&mut Exchange) -> SupportResult<()> + Send + Sync,
{
    fn process(&self, exchange: &mut Exchange) -> SupportResult<()> {
        (self.func)(exchange)
    }
}

/// Wrap a closure as a [`Processor`]
pub fn processor_fn<F>(func: F) -> FnProcessor<F>
where
    F: Fn(&mut Exchange) -> SupportResult<()> + Send + Sync,
{
    FnProcessor::new(func)
}
