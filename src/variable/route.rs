use super::{VariableRepository, ROUTE_REPOSITORY_ID};
use crate::error::{SupportError, SupportResult};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;

/// Variables scoped to a route.
///
/// Names use the `routeId:name` form. Removing `routeId:*` clears every
/// variable of that route.
#[derive(Debug, Default)]
pub struct RouteVariableRepository {
    routes: DashMap<String, HashMap<String, Value>>,
}

impl RouteVariableRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn split(name: &str) -> Option<(&str, &str)> {
        name.split_once(':')
            .filter(|(route, key)| !route.is_empty() && !key.is_empty())
    }

    /// Variable names (without route prefix) stored for a route
    pub fn names_for_route(&self, route_id: &str) -> Vec<String> {
        self.routes
            .get(route_id)
            .map(|vars| vars.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn route_ids(&self) -> Vec<String> {
        self.routes.iter().map(|e| e.key().clone()).collect()
    }
}

impl VariableRepository for RouteVariableRepository {
    fn id(&self) -> &str {
        ROUTE_REPOSITORY_ID
    }

    fn get(&self, name: &str) -> Option<Value> {
        let (route, key) = Self::split(name)?;
        self.routes.get(route).and_then(|vars| vars.get(key).cloned())
    }

    fn set(&self, name: &str, value: Value) -> SupportResult<()> {
        let (route, key) = Self::split(name).ok_or_else(|| {
            SupportError::InvalidState(format!(
                "Route variable name must be in routeId:name format, was: {name}"
            ))
        })?;
        self.routes
            .entry(route.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, name: &str) -> Option<Value> {
        if name == "*" {
            self.routes.clear();
            return None;
        }
        let (route, key) = Self::split(name)?;
        if key == "*" {
            self.routes.remove(route);
            return None;
        }
        let mut vars = self.routes.get_mut(route)?;
        if let Some(prefix) = key.strip_suffix('*') {
            vars.retain(|k, _| !k.starts_with(prefix));
            return None;
        }
        vars.remove(key)
    }

    fn names(&self) -> Vec<String> {
        self.routes
            .iter()
            .flat_map(|entry| {
                let route = entry.key().clone();
                entry
                    .value()
                    .keys()
                    .map(|k| format!("{route}:{k}"))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn clear(&self) {
        self.routes.clear();
    }
}
