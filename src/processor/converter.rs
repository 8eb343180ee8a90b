use super::{AsyncCallback, AsyncProcessor, AsyncProcessorAwaitManager, Processor};
use crate::error::SupportResult;
use crate::exchange::Exchange;
use std::sync::Arc;
use tracing::trace;

/// Converts synchronous processors to asynchronous ones
pub struct ProcessorConverter;

impl ProcessorConverter {
    /// Wrap a sync processor as an async processor that always completes
    /// synchronously. Adapters are unwrapped instead of wrapped again.
    pub fn to_async(processor: Arc<dyn Processor>) -> Arc<dyn AsyncProcessor> {
        if let Some(inner) = processor.as_async() {
            return inner;
        }
        Arc::new(SyncProcessorBridge { processor })
    }
}

struct SyncProcessorBridge {
    processor: Arc<dyn Processor>,
}

impl AsyncProcessor for SyncProcessorBridge {
    fn process_async(&self, mut exchange: Exchange, callback: AsyncCallback) -> bool {
        if let Err(error) = self.processor.process(&mut exchange) {
            trace!(exchange_id = %exchange.exchange_id(), error = %error, "Sync processor failed");
            exchange.set_exception(Some(error));
        }
        callback.done(exchange, true);
        true
    }
}

/// Runs an [`AsyncProcessor`] as a blocking [`Processor`].
///
/// The exchange is detached, processed through the await manager and written
/// back. If the wait is interrupted or times out the exchange left in place is
/// an empty shell with the same id and the failure set.
pub struct AsyncProcessorAdapter {
    processor: Arc<dyn AsyncProcessor>,
    await_manager: Arc<AsyncProcessorAwaitManager>,
}

impl AsyncProcessorAdapter {
    pub fn new(
        processor: Arc<dyn AsyncProcessor>,
        await_manager: Arc<AsyncProcessorAwaitManager>,
    ) -> Self {
        Self {
            processor,
            await_manager,
        }
    }

    pub fn processor(&self) -> &Arc<dyn AsyncProcessor> {
        &self.processor
    }
}

impl Processor for AsyncProcessorAdapter {
    fn process(&self, exchange: &mut Exchange) -> SupportResult<()> {
        let detached = exchange.detach();
        match self.await_manager.process(self.processor.as_ref(), detached) {
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

    fn as_async(&self) -> Option<Arc<dyn AsyncProcessor>> {
        Some(self.processor.clone())
    }
}

impl AsyncProcessor for AsyncProcessorAdapter {
    fn process_async(&self, exchange: Exchange, callback: AsyncCallback) -> bool {
        self.processor.process_async(exchange, callback)
    }
}
