use super::{AsyncCallback, AsyncProcessor};
use crate::error::{SupportError, SupportResult};
use crate::exchange::Exchange;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Future resolving when an [`AsyncCallback`] is completed
#[derive(Debug)]
pub struct AsyncCallbackFuture {
    exchange_id: String,
    receiver: oneshot::Receiver<Exchange>,
}

impl AsyncCallbackFuture {
    /// A callback and the future it completes
    pub fn pair(exchange_id: impl Into<String>) -> (AsyncCallback, AsyncCallbackFuture) {
        let (sender, receiver) = oneshot::channel();
        let callback = AsyncCallback::new(move |exchange, _done_sync| {
            // the receiver may have been dropped by a cancelled caller
            let _ = sender.send(exchange);
        });
        (
            callback,
            AsyncCallbackFuture {
                exchange_id: exchange_id.into(),
                receiver,
            },
        )
    }
}

impl Future for AsyncCallbackFuture {
    type Output = SupportResult<Exchange>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let exchange_id = self.exchange_id.clone();
        Pin::new(&mut self.receiver).poll(cx).map(|result| {
            result.map_err(|_| {
                SupportError::processing(exchange_id, "async callback dropped without completing")
            })
        })
    }
}

/// Start processing and return a future for the processed exchange
pub fn process_future(processor: &dyn AsyncProcessor, exchange: Exchange) -> AsyncCallbackFuture {
    let (callback, future) = AsyncCallbackFuture::pair(exchange.exchange_id());
    processor.process_async(exchange, callback);
    future
}
