use super::{Bean, BeanRepository, BeanRepositoryExt, BeanSupplier, Registry, SupplierRegistry};
use crate::error::{SupportError, SupportResult};
use crate::logging::log_registry_operation;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::sync::Arc;
use tracing::debug;

/// Registry statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryStats {
    pub local_beans: usize,
    pub repositories: usize,
}

/// Registry with a fallback chain.
///
/// Lookups consult the local [`SupplierRegistry`] first, then every added
/// repository in the order it was added. Binding always goes to the local
/// registry.
#[derive(Default)]
pub struct DefaultRegistry {
    local: SupplierRegistry,
    repositories: RwLock<Vec<Arc<dyn BeanRepository>>>,
}

impl std::fmt::Debug for DefaultRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultRegistry")
            .field("local", &self.local)
            .field("repositories", &self.repositories.read().len())
            .finish()
    }
}

impl DefaultRegistry {
    /// Create a new registry with an empty local store and no fallbacks
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a repository to the fallback chain
    pub fn add_bean_repository(&self, repository: Arc<dyn BeanRepository>) {
        let count = {
            let mut repositories = self.repositories.write();
            repositories.push(repository);
            repositories.len()
        };
        log_registry_operation(
            "add_bean_repository",
            None,
            None,
            "added",
            Some(&format!("{count} repositories in fallback chain")),
        );
    }

    pub fn local(&self) -> &SupplierRegistry {
        &self.local
    }

    fn chain(&self) -> Vec<Arc<dyn BeanRepository>> {
        self.repositories.read().clone()
    }

    /// Look up a bean of type `T`, failing when it is missing or of another type
    pub fn mandatory_lookup<T: Any + Send + Sync>(&self, name: &str) -> SupportResult<Arc<T>> {
        if let Some(bean) = self.lookup_by_name_and_type::<T>(name) {
            return Ok(bean);
        }
        let expected = std::any::type_name::<T>();
        if self.lookup_by_name(name).is_some() {
            log_registry_operation("mandatory_lookup", Some(name), Some(expected), "type_mismatch", None);
            return Err(SupportError::BeanTypeMismatch {
                name: name.to_string(),
                expected: expected.to_string(),
            });
        }
        log_registry_operation("mandatory_lookup", Some(name), Some(expected), "missing", None);
        Err(SupportError::NoSuchBean {
            name: name.to_string(),
        })
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            local_beans: self.local.size(),
            repositories: self.repositories.read().len(),
        }
    }
}

impl BeanRepository for DefaultRegistry {
    fn lookup_by_name(&self, name: &str) -> Option<Bean> {
        self.local
            .lookup_by_name(name)
            .or_else(|| self.chain().iter().find_map(|r| r.lookup_by_name(name)))
    }

    fn lookup_by_name_and_type_id(&self, name: &str, type_id: TypeId) -> Option<Bean> {
        self.local.lookup_by_name_and_type_id(name, type_id).or_else(|| {
            self.chain()
                .iter()
                .find_map(|r| r.lookup_by_name_and_type_id(name, type_id))
        })
    }

    fn find_by_type_id(&self, type_id: TypeId) -> Vec<(String, Bean)> {
        let mut found = self.local.find_by_type_id(type_id);
        for repository in self.chain() {
            found.extend(repository.find_by_type_id(type_id));
        }
        debug!(found = found.len(), "Resolved beans by type across registry chain");
        found
    }
}

impl Registry for DefaultRegistry {
    fn bind(&self, name: &str, bean: Bean) {
        self.local.bind(name, bean);
    }

    fn bind_supplier(&self, name: &str, supplier: BeanSupplier) {
        self.local.bind_supplier(name, supplier);
    }

    fn unbind(&self, name: &str) {
        self.local.unbind(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SimpleRegistry;

    #[test]
    fn test_local_wins_over_fallback() {
        let fallback = Arc::new(SimpleRegistry::new());
        fallback.bind("name", Arc::new(String::from("fallback")));
        fallback.bind("only-fallback", Arc::new(1u64));

        let registry = DefaultRegistry::new();
        registry.add_bean_repository(fallback);
        registry.bind("name", Arc::new(String::from("local")));

        let name = registry.mandatory_lookup::<String>("name").unwrap();
        assert_eq!(name.as_str(), "local");
        assert_eq!(*registry.mandatory_lookup::<u64>("only-fallback").unwrap(), 1);
        assert_eq!(registry.find_by_type::<String>().len(), 2);
        assert_eq!(registry.stats().repositories, 1);
    }

    #[test]
    fn test_mandatory_lookup_errors() {
        let registry = DefaultRegistry::new();
        registry.bind("n", Arc::new(5u32));

        let missing = registry.mandatory_lookup::<u32>("missing").unwrap_err();
        assert_eq!(
            missing,
            SupportError::NoSuchBean {
                name: "missing".into()
            }
        );

        let mismatch = registry.mandatory_lookup::<String>("n").unwrap_err();
        assert!(matches!(mismatch, SupportError::BeanTypeMismatch { .. }));
    }
}
