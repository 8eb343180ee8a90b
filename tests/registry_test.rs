//! Bean lookup through a context's registry and its fallback chain.

use conduit_support::context::SupportContextBuilder;
use conduit_support::exchange::Exchange;
use conduit_support::processor::{processor_fn, Processor};
use conduit_support::registry::{
    BeanRepository, BeanRepositoryExt, BeanSupplier, DefaultRegistry, Registry, SimpleRegistry,
};
use conduit_support::SupportError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, PartialEq)]
struct DataSource {
    url: String,
}

#[derive(Debug)]
struct Counter(usize);

#[test]
fn test_local_beans_shadow_fallback_repositories() {
    let fallback = Arc::new(SimpleRegistry::new());
    fallback.bind(
        "db",
        Arc::new(DataSource {
            url: "jdbc:fallback".into(),
        }),
    );
    fallback.bind("shared", Arc::new(Counter(7)));

    let registry = Arc::new(DefaultRegistry::new());
    registry.add_bean_repository(fallback);
    registry.bind(
        "db",
        Arc::new(DataSource {
            url: "jdbc:local".into(),
        }),
    );

    let context = SupportContextBuilder::new("beans")
        .registry(registry)
        .build()
        .unwrap();
    let registry = context.registry();

    let db = registry.lookup_by_name_and_type::<DataSource>("db").unwrap();
    assert_eq!(db.url, "jdbc:local");
    assert_eq!(registry.lookup_by_name_and_type::<Counter>("shared").unwrap().0, 7);

    // both repositories contribute to by-type searches
    assert_eq!(registry.find_by_type::<DataSource>().len(), 2);
    assert!(registry.find_single_by_type::<DataSource>().is_none());
    assert!(registry.find_single_by_type::<Counter>().is_some());

    let stats = registry.stats();
    assert_eq!(stats.local_beans, 1);
    assert_eq!(stats.repositories, 1);
}

#[test]
fn test_mandatory_lookup_distinguishes_missing_and_mistyped() {
    let registry = DefaultRegistry::new();
    registry.bind("counter", Arc::new(Counter(1)));

    assert!(registry.mandatory_lookup::<Counter>("counter").is_ok());
    assert!(matches!(
        registry.mandatory_lookup::<DataSource>("counter"),
        Err(SupportError::BeanTypeMismatch { .. })
    ));
    assert!(matches!(
        registry.mandatory_lookup::<Counter>("nothing"),
        Err(SupportError::NoSuchBean { .. })
    ));
}

#[test]
fn test_suppliers_are_deferred_until_lookup() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = DefaultRegistry::new();

    let prototype_calls = calls.clone();
    registry.bind_supplier(
        "prototype",
        BeanSupplier::new(move || Counter(prototype_calls.fetch_add(1, Ordering::SeqCst))),
    );
    let singleton_calls = calls.clone();
    registry.bind_supplier(
        "singleton",
        BeanSupplier::singleton(move || {
            singleton_calls.fetch_add(1, Ordering::SeqCst);
            DataSource {
                url: "jdbc:once".into(),
            }
        }),
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let first = registry.lookup_by_name_and_type::<Counter>("prototype").unwrap();
    let second = registry.lookup_by_name_and_type::<Counter>("prototype").unwrap();
    assert_ne!(first.0, second.0);

    let a = registry.lookup_by_name_and_type::<DataSource>("singleton").unwrap();
    let b = registry.lookup_by_name_and_type::<DataSource>("singleton").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_same_name_different_types_and_unbind() {
    let registry = SimpleRegistry::new();
    registry.bind("orders", Arc::new(Counter(3)));
    registry.bind(
        "orders",
        Arc::new(DataSource {
            url: "jdbc:orders".into(),
        }),
    );
    assert_eq!(registry.size(), 2);
    assert!(registry.lookup_by_name_and_type::<Counter>("orders").is_some());
    assert!(registry.lookup_by_name_and_type::<DataSource>("orders").is_some());

    registry.unbind("orders");
    assert_eq!(registry.size(), 0);
    assert!(registry.lookup_by_name("orders").is_none());
}

#[test]
fn test_processors_can_be_registered_and_invoked() {
    let registry = DefaultRegistry::new();
    let tagger: Arc<dyn Processor> = Arc::new(processor_fn(|exchange: &mut Exchange| {
        exchange.in_message_mut().set_header("tagged", true);
        Ok(())
    }));
    registry.bind("tagger", Arc::new(tagger));

    let tagger = registry.mandatory_lookup::<Arc<dyn Processor>>("tagger").unwrap();
    let context = SupportContextBuilder::new("processors").build().unwrap();
    let mut exchange = context.new_exchange();
    tagger.process(&mut exchange).unwrap();
    assert!(exchange.in_message().header("tagged").is_some());
}
