//! Sync/async processor bridging: adapters, the await manager and callback
//! futures, including interruption and timeouts.

use conduit_support::exchange::{Exchange, ExchangeContext};
use conduit_support::processor::{
    process_future, processor_fn, AsyncCallback, AsyncProcessor, AsyncProcessorAdapter,
    AsyncProcessorAwaitManager, Processor, ProcessorConverter,
};
use conduit_support::service::ServiceExt;
use conduit_support::SupportError;
use std::sync::Arc;
use std::time::Duration;

/// Completes on a separate thread after `delay`
struct Delayed {
    delay: Duration,
}

impl AsyncProcessor for Delayed {
    fn process_async(&self, mut exchange: Exchange, callback: AsyncCallback) -> bool {
        let delay = self.delay;
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            exchange.in_message_mut().set_header("completed_by", "worker");
            callback.done(exchange, false);
        });
        false
    }
}

/// Never invokes its callback
struct Silent;

impl AsyncProcessor for Silent {
    fn process_async(&self, exchange: Exchange, callback: AsyncCallback) -> bool {
        std::mem::forget(callback);
        drop(exchange);
        false
    }
}

#[test]
fn test_sync_processor_round_trips_through_converter() {
    let sync: Arc<dyn Processor> = Arc::new(processor_fn(|exchange: &mut Exchange| {
        exchange.in_message_mut().set_body("converted");
        Ok(())
    }));
    let as_async = ProcessorConverter::to_async(sync);

    let exchange = tokio_test::block_on(process_future(
        as_async.as_ref(),
        Exchange::new(ExchangeContext::default()),
    ))
    .unwrap();
    assert_eq!(exchange.in_message().body_as_text().as_deref(), Some("converted"));
}

#[test]
fn test_adapter_unwraps_instead_of_double_wrapping() {
    let inner: Arc<dyn AsyncProcessor> = Arc::new(Delayed {
        delay: Duration::from_millis(1),
    });
    let adapter: Arc<dyn Processor> = Arc::new(AsyncProcessorAdapter::new(
        inner.clone(),
        Arc::new(AsyncProcessorAwaitManager::new()),
    ));

    let unwrapped = ProcessorConverter::to_async(adapter);
    assert!(Arc::ptr_eq(&unwrapped, &inner));
}

#[test]
fn test_adapter_blocks_until_callback_keeping_exchange_id() {
    let manager = Arc::new(AsyncProcessorAwaitManager::new());
    manager.set_statistics_enabled(true);
    let adapter = AsyncProcessorAdapter::new(
        Arc::new(Delayed {
            delay: Duration::from_millis(20),
        }),
        manager.clone(),
    );

    let mut exchange = Exchange::new(ExchangeContext::default());
    let id = exchange.exchange_id().to_string();
    adapter.process(&mut exchange).unwrap();

    assert_eq!(exchange.exchange_id(), id);
    assert!(exchange.in_message().header("completed_by").is_some());
    assert_eq!(manager.size(), 0);

    let stats = manager.statistics();
    assert_eq!(stats.threads_blocked, 1);
    assert_eq!(stats.threads_interrupted, 0);
}

#[test]
fn test_await_timeout_leaves_failed_shell() {
    let manager = Arc::new(AsyncProcessorAwaitManager::new().with_timeout(Some(Duration::from_millis(30))));
    let adapter = AsyncProcessorAdapter::new(Arc::new(Silent), manager.clone());

    let mut exchange = Exchange::new(ExchangeContext::default());
    exchange.in_message_mut().set_body("lost");
    let id = exchange.exchange_id().to_string();

    let err = adapter.process(&mut exchange).unwrap_err();
    assert!(matches!(err, SupportError::Timeout { .. }));
    assert_eq!(exchange.exchange_id(), id);
    assert!(matches!(exchange.exception(), Some(SupportError::Timeout { .. })));
    assert_eq!(manager.size(), 0);
}

#[test]
fn test_interrupt_releases_blocked_thread() {
    let manager = Arc::new(AsyncProcessorAwaitManager::new());
    let waiter = {
        let manager = manager.clone();
        std::thread::spawn(move || {
            let adapter = AsyncProcessorAdapter::new(Arc::new(Silent), manager);
            let mut exchange = Exchange::new(ExchangeContext::default());
            adapter.process(&mut exchange)
        })
    };

    // wait for the worker to register itself
    let mut blocked = Vec::new();
    for _ in 0..200 {
        blocked = manager.browse();
        if !blocked.is_empty() {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(blocked.len(), 1);
    assert!(manager.interrupt(&blocked[0].exchange_id));

    let result = waiter.join().unwrap();
    assert!(matches!(result, Err(SupportError::Interrupted { .. })));
    assert_eq!(manager.size(), 0);
}

#[test]
fn test_stopping_manager_interrupts_waiters() {
    let manager = Arc::new(AsyncProcessorAwaitManager::new());
    tokio_test::block_on(manager.start()).unwrap();

    let waiter = {
        let manager = manager.clone();
        std::thread::spawn(move || {
            manager.process(&Silent, Exchange::new(ExchangeContext::default()))
        })
    };
    while manager.size() == 0 {
        std::thread::sleep(Duration::from_millis(5));
    }

    tokio_test::block_on(manager.stop()).unwrap();
    assert!(matches!(
        waiter.join().unwrap(),
        Err(SupportError::Interrupted { .. })
    ));
}

#[tokio::test]
async fn test_callback_future_resolves_from_other_thread() {
    let processor = Delayed {
        delay: Duration::from_millis(10),
    };
    let exchange = process_future(&processor, Exchange::new(ExchangeContext::default()))
        .await
        .unwrap();
    assert!(exchange.in_message().header("completed_by").is_some());
}

#[tokio::test]
async fn test_callback_future_fails_when_callback_dropped() {
    struct Dropping;

    impl AsyncProcessor for Dropping {
        fn process_async(&self, _exchange: Exchange, callback: AsyncCallback) -> bool {
            drop(callback);
            false
        }
    }

    let result = process_future(&Dropping, Exchange::new(ExchangeContext::default())).await;
    assert!(matches!(result, Err(SupportError::Processing { .. })));
}
