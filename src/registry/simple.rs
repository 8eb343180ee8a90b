use super::{Bean, BeanRepository, Registry};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Factory for a bean of a known type
pub struct BeanSupplier {
    type_id: TypeId,
    type_name: &'static str,
    factory: Arc<dyn Fn() -> Bean + Send + Sync>,
    singleton: bool,
    cached: OnceLock<Bean>,
}

impl fmt::Debug for BeanSupplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanSupplier")
            .field("type_name", &self.type_name)
            .field("singleton", &self.singleton)
            .finish()
    }
}

impl BeanSupplier {
    /// A supplier creating a new bean on every lookup
    pub fn new<T, F>(factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            factory: Arc::new(move || Arc::new(factory()) as Bean),
            singleton: false,
            cached: OnceLock::new(),
        }
    }

    /// A supplier invoked once, the bean is cached for later lookups
    pub fn singleton<T, F>(factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            singleton: true,
            ..Self::new(factory)
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    pub fn get(&self) -> Bean {
        if self.singleton {
            self.cached.get_or_init(|| (self.factory)()).clone()
        } else {
            (self.factory)()
        }
    }
}

#[derive(Debug, Clone)]
enum BeanEntry {
    Instance(Bean),
    Supplier(Arc<BeanSupplier>),
}

impl BeanEntry {
    fn resolve(&self) -> Bean {
        match self {
            BeanEntry::Instance(bean) => bean.clone(),
            BeanEntry::Supplier(supplier) => supplier.get(),
        }
    }
}

/// Name -> beans in bind order, one per concrete type
#[derive(Debug, Default)]
struct BeanStore {
    beans: RwLock<HashMap<String, Vec<(TypeId, BeanEntry)>>>,
}

impl BeanStore {
    fn insert(&self, name: &str, type_id: TypeId, entry: BeanEntry) {
        let mut beans = self.beans.write();
        let slot = beans.entry(name.to_string()).or_default();
        match slot.iter_mut().find(|(id, _)| *id == type_id) {
            Some(existing) => existing.1 = entry,
            None => slot.push((type_id, entry)),
        }
    }

    fn remove(&self, name: &str) -> bool {
        self.beans.write().remove(name).is_some()
    }

    fn first(&self, name: &str) -> Option<Bean> {
        let entry = self
            .beans
            .read()
            .get(name)
            .and_then(|slot| slot.first().map(|(_, e)| e.clone()))?;
        Some(entry.resolve())
    }

    fn typed(&self, name: &str, type_id: TypeId) -> Option<Bean> {
        let entry = self.beans.read().get(name).and_then(|slot| {
            slot.iter()
                .find(|(id, _)| *id == type_id)
                .map(|(_, e)| e.clone())
        })?;
        Some(entry.resolve())
    }

    fn all_of_type(&self, type_id: TypeId) -> Vec<(String, Bean)> {
        let matches: Vec<(String, BeanEntry)> = self
            .beans
            .read()
            .iter()
            .filter_map(|(name, slot)| {
                slot.iter()
                    .find(|(id, _)| *id == type_id)
                    .map(|(_, e)| (name.clone(), e.clone()))
            })
            .collect();
        matches
            .into_iter()
            .map(|(name, entry)| (name, entry.resolve()))
            .collect()
    }

    fn len(&self) -> usize {
        self.beans.read().values().map(Vec::len).sum()
    }
}

fn bean_type_id(bean: &Bean) -> TypeId {
    (**bean).type_id()
}

/// In-memory registry. Suppliers are invoked once at bind time.
#[derive(Debug, Default)]
pub struct SimpleRegistry {
    store: BeanStore,
}

impl SimpleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bound beans across all names and types
    pub fn size(&self) -> usize {
        self.store.len()
    }
}

impl BeanRepository for SimpleRegistry {
    fn lookup_by_name(&self, name: &str) -> Option<Bean> {
        self.store.first(name)
    }

    fn lookup_by_name_and_type_id(&self, name: &str, type_id: TypeId) -> Option<Bean> {
        self.store.typed(name, type_id)
    }

    fn find_by_type_id(&self, type_id: TypeId) -> Vec<(String, Bean)> {
        self.store.all_of_type(type_id)
    }
}

impl Registry for SimpleRegistry {
    fn bind(&self, name: &str, bean: Bean) {
        debug!(bean_name = %name, "Binding bean");
        self.store
            .insert(name, bean_type_id(&bean), BeanEntry::Instance(bean));
    }

    fn bind_supplier(&self, name: &str, supplier: BeanSupplier) {
        debug!(bean_name = %name, bean_type = supplier.type_name(), "Binding supplied bean");
        let bean = supplier.get();
        self.store
            .insert(name, supplier.type_id(), BeanEntry::Instance(bean));
    }

    fn unbind(&self, name: &str) {
        if self.store.remove(name) {
            debug!(bean_name = %name, "Unbound bean");
        }
    }
}

/// In-memory registry that defers suppliers until lookup
#[derive(Debug, Default)]
pub struct SupplierRegistry {
    store: BeanStore,
}

impl SupplierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> usize {
        self.store.len()
    }
}

impl BeanRepository for SupplierRegistry {
    fn lookup_by_name(&self, name: &str) -> Option<Bean> {
        self.store.first(name)
    }

    fn lookup_by_name_and_type_id(&self, name: &str, type_id: TypeId) -> Option<Bean> {
        self.store.typed(name, type_id)
    }

    fn find_by_type_id(&self, type_id: TypeId) -> Vec<(String, Bean)> {
        self.store.all_of_type(type_id)
    }
}

impl Registry for SupplierRegistry {
    fn bind(&self, name: &str, bean: Bean) {
        debug!(bean_name = %name, "Binding bean");
        self.store
            .insert(name, bean_type_id(&bean), BeanEntry::Instance(bean));
    }

    fn bind_supplier(&self, name: &str, supplier: BeanSupplier) {
        debug!(
            bean_name = %name,
            bean_type = supplier.type_name(),
            singleton = supplier.is_singleton(),
            "Binding bean supplier"
        );
        let type_id = supplier.type_id();
        self.store
            .insert(name, type_id, BeanEntry::Supplier(Arc::new(supplier)));
    }

    fn unbind(&self, name: &str) {
        if self.store.remove(name) {
            debug!(bean_name = %name, "Unbound bean");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BeanRepositoryExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    struct Greeter(String);

    #[test]
    fn test_same_name_different_types() {
        let registry = SimpleRegistry::new();
        registry.bind("foo", Arc::new(Greeter("hi".into())));
        registry.bind("foo", Arc::new(42u32));

        assert_eq!(registry.size(), 2);
        let greeter = registry.lookup_by_name_and_type::<Greeter>("foo").unwrap();
        assert_eq!(greeter.0, "hi");
        assert_eq!(*registry.lookup_by_name_and_type::<u32>("foo").unwrap(), 42);

        let first = registry.lookup_by_name("foo").unwrap();
        assert!(first.downcast::<Greeter>().is_ok());
    }

    #[test]
    fn test_rebind_same_type_replaces() {
        let registry = SimpleRegistry::new();
        registry.bind("n", Arc::new(1u32));
        registry.bind("n", Arc::new(2u32));
        assert_eq!(registry.size(), 1);
        assert_eq!(*registry.lookup_by_name_and_type::<u32>("n").unwrap(), 2);

        registry.unbind("n");
        assert!(registry.lookup_by_name("n").is_none());
    }

    #[test]
    fn test_find_by_type() {
        let registry = SimpleRegistry::new();
        registry.bind("a", Arc::new(Greeter("a".into())));
        registry.bind("b", Arc::new(Greeter("b".into())));
        registry.bind("c", Arc::new(7u32));

        assert_eq!(registry.find_by_type::<Greeter>().len(), 2);
        let named = registry.find_by_type_with_name::<Greeter>();
        assert_eq!(named["b"].0, "b");
        assert!(registry.find_single_by_type::<Greeter>().is_none());
        assert_eq!(*registry.find_single_by_type::<u32>().unwrap(), 7);
    }

    #[test]
    fn test_simple_registry_resolves_supplier_at_bind() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registry = SimpleRegistry::new();
        registry.bind_supplier(
            "g",
            BeanSupplier::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Greeter("supplied".into())
            }),
        );
        registry.lookup_by_name("g");
        registry.lookup_by_name("g");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_supplier_registry_resolves_on_lookup() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registry = SupplierRegistry::new();
        registry.bind_supplier(
            "g",
            BeanSupplier::new(move || Greeter(format!("#{}", counter.fetch_add(1, Ordering::SeqCst)))),
        );

        let a = registry.lookup_by_name_and_type::<Greeter>("g").unwrap();
        let b = registry.lookup_by_name_and_type::<Greeter>("g").unwrap();
        assert_eq!(a.0, "#0");
        assert_eq!(b.0, "#1");
    }

    #[test]
    fn test_singleton_supplier_is_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registry = SupplierRegistry::new();
        registry.bind_supplier(
            "g",
            BeanSupplier::singleton(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Greeter("one".into())
            }),
        );

        let a = registry.lookup_by_name_and_type::<Greeter>("g").unwrap();
        let b = registry.lookup_by_name_and_type::<Greeter>("g").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
