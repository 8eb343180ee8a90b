//! # Variable Repositories
//!
//! Variables are named values living outside of message headers and
//! exchange properties. They can be stored on the exchange itself, in the
//! process wide `global` repository, per route in the `route` repository,
//! or in any custom repository registered with the factory.
//!
//! ## Name Resolution
//!
//! ```text
//! name             -> exchange local variable
//! global:name      -> GlobalVariableRepository
//! route:name       -> RouteVariableRepository, key "<current route>:name"
//! route:r1:name    -> RouteVariableRepository, key "r1:name"
//! header:name      -> exchange local variable (reserved prefix)
//! exchange:name    -> exchange local variable (reserved prefix)
//! myrepo:name      -> custom repository "myrepo"
//! ```

mod global;
mod route;

pub use global::GlobalVariableRepository;
pub use route::RouteVariableRepository;

use crate::error::SupportResult;
use dashmap::DashMap;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

/// Id of the built-in global repository
pub const GLOBAL_REPOSITORY_ID: &str = "global";
/// Id of the built-in route repository
pub const ROUTE_REPOSITORY_ID: &str = "route";

/// Storage for variables
pub trait VariableRepository: Send + Sync + Debug {
    /// The repository id used as name prefix, e.g. `global`
    fn id(&self) -> &str;

    fn get(&self, name: &str) -> Option<Value>;

    fn set(&self, name: &str, value: Value) -> SupportResult<()>;

    /// Remove a variable. Implementations accept `*` to clear everything and a
    /// trailing `*` to remove by prefix, returning `None` in those cases.
    fn remove(&self, name: &str) -> Option<Value>;

    fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    fn names(&self) -> Vec<String>;

    fn size(&self) -> usize {
        self.names().len()
    }

    fn clear(&self);
}

/// Where a variable name points to once its prefix has been interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableTarget {
    /// Repository id, `None` for exchange local variables
    pub repository: Option<String>,
    /// Name within the target
    pub name: String,
}

/// Interpret a possibly prefixed variable name.
///
/// `header` and `exchange` prefixes are reserved and keep the full name as an
/// exchange local variable. Route scoped names without an explicit route id
/// are qualified with `current_route_id` when one is known.
pub fn parse_variable_name(name: &str, current_route_id: Option<&str>) -> VariableTarget {
    let Some((id, rest)) = name.split_once(':') else {
        return VariableTarget {
            repository: None,
            name: name.to_string(),
        };
    };

    if id == "header" || id == "exchange" {
        return VariableTarget {
            repository: None,
            name: name.to_string(),
        };
    }

    let mut resolved = rest.to_string();
    if id == ROUTE_REPOSITORY_ID && !rest.contains(':') {
        if let Some(route_id) = current_route_id {
            resolved = format!("{route_id}:{rest}");
        }
    }

    VariableTarget {
        repository: Some(id.to_string()),
        name: resolved,
    }
}

/// Registry of variable repositories by id
#[derive(Debug)]
pub struct VariableRepositoryFactory {
    global: Arc<GlobalVariableRepository>,
    route: Arc<RouteVariableRepository>,
    custom: DashMap<String, Arc<dyn VariableRepository>>,
}

impl VariableRepositoryFactory {
    pub fn new() -> Self {
        Self {
            global: Arc::new(GlobalVariableRepository::new()),
            route: Arc::new(RouteVariableRepository::new()),
            custom: DashMap::new(),
        }
    }

    pub fn global(&self) -> Arc<GlobalVariableRepository> {
        self.global.clone()
    }

    pub fn route(&self) -> Arc<RouteVariableRepository> {
        self.route.clone()
    }

    /// Register a custom repository under its own id, replacing any previous one
    pub fn register(&self, repository: Arc<dyn VariableRepository>) {
        let id = repository.id().to_string();
        debug!(repository_id = %id, "Registering variable repository");
        self.custom.insert(id, repository);
    }

    pub fn unregister(&self, id: &str) -> bool {
        self.custom.remove(id).is_some()
    }

    /// Look up a repository; built-in ids win over custom registrations
    pub fn get(&self, id: &str) -> Option<Arc<dyn VariableRepository>> {
        match id {
            GLOBAL_REPOSITORY_ID => Some(self.global.clone() as Arc<dyn VariableRepository>),
            ROUTE_REPOSITORY_ID => Some(self.route.clone() as Arc<dyn VariableRepository>),
            other => self.custom.get(other).map(|r| r.value().clone()),
        }
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids = vec![
            GLOBAL_REPOSITORY_ID.to_string(),
            ROUTE_REPOSITORY_ID.to_string(),
        ];
        ids.extend(self.custom.iter().map(|e| e.key().clone()));
        ids
    }
}

impl Default for VariableRepositoryFactory {
    fn default() -> Self {
        Self::new()
    }
}
