//! # Bean Registries
//!
//! Named object lookup with type-aware fallback chains.
//!
//! ## Overview
//!
//! Beans are type-erased values (`Arc<dyn Any + Send + Sync>`). A name may hold
//! several beans as long as their types differ, so `lookup_by_name_and_type`
//! can pick the right one.
//!
//! ## Available Registries
//!
//! ```text
//! Registry Infrastructure
//! ├── SimpleRegistry     (in-memory, suppliers resolved at bind time)
//! ├── SupplierRegistry   (in-memory, suppliers resolved at lookup time)
//! └── DefaultRegistry    (SupplierRegistry first, then added repositories)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use conduit_support::registry::{BeanRepositoryExt, DefaultRegistry, Registry};
//! use std::sync::Arc;
//!
//! let registry = DefaultRegistry::new();
//! registry.bind("greeting", Arc::new(String::from("hello")));
//!
//! let greeting = registry.mandatory_lookup::<String>("greeting").unwrap();
//! assert_eq!(greeting.as_str(), "hello");
//! assert!(registry.lookup_by_name_and_type::<u32>("greeting").is_none());
//! ```

mod default_registry;
mod simple;

pub use default_registry::{DefaultRegistry, RegistryStats};
pub use simple::{BeanSupplier, SimpleRegistry, SupplierRegistry};

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// A type-erased registry value
pub type Bean = Arc<dyn Any + Send + Sync>;

/// Read access to named beans
pub trait BeanRepository: Send + Sync {
    /// First bean bound under `name`, whatever its type
    fn lookup_by_name(&self, name: &str) -> Option<Bean>;

    /// Bean bound under `name` with the given concrete type
    fn lookup_by_name_and_type_id(&self, name: &str, type_id: TypeId) -> Option<Bean>;

    /// All beans of the given concrete type with their names
    fn find_by_type_id(&self, type_id: TypeId) -> Vec<(String, Bean)>;
}

/// Writable registry
pub trait Registry: BeanRepository {
    /// Bind a bean, replacing an existing bean of the same type under that name
    fn bind(&self, name: &str, bean: Bean);

    fn bind_supplier(&self, name: &str, supplier: BeanSupplier);

    /// Remove every bean bound under `name`
    fn unbind(&self, name: &str);
}

/// Typed lookups over any [`BeanRepository`]
pub trait BeanRepositoryExt: BeanRepository {
    fn lookup_by_name_and_type<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.lookup_by_name_and_type_id(name, TypeId::of::<T>())
            .and_then(|bean| bean.downcast::<T>().ok())
    }

    fn find_by_type<T: Any + Send + Sync>(&self) -> Vec<Arc<T>> {
        self.find_by_type_id(TypeId::of::<T>())
            .into_iter()
            .filter_map(|(_, bean)| bean.downcast::<T>().ok())
            .collect()
    }

    /// Beans of type `T` keyed by name; the first bean found for a name wins
    fn find_by_type_with_name<T: Any + Send + Sync>(&self) -> HashMap<String, Arc<T>> {
        let mut found = HashMap::new();
        for (name, bean) in self.find_by_type_id(TypeId::of::<T>()) {
            if let Ok(bean) = bean.downcast::<T>() {
                found.entry(name).or_insert(bean);
            }
        }
        found
    }

    /// The only bean of type `T`, `None` when there are zero or several
    fn find_single_by_type<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let mut beans = self.find_by_type::<T>();
        if beans.len() == 1 {
            beans.pop()
        } else {
            None
        }
    }
}

impl<R: BeanRepository + ?Sized> BeanRepositoryExt for R {}
