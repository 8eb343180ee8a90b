use super::{VariableRepository, GLOBAL_REPOSITORY_ID};
use crate::error::SupportResult;
use dashmap::DashMap;
use serde_json::Value;

/// Process wide variables shared by every exchange
#[derive(Debug, Default)]
pub struct GlobalVariableRepository {
    variables: DashMap<String, Value>,
}

impl GlobalVariableRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VariableRepository for GlobalVariableRepository {
    fn id(&self) -> &str {
        GLOBAL_REPOSITORY_ID
    }

    fn get(&self, name: &str) -> Option<Value> {
        self.variables.get(name).map(|v| v.value().clone())
    }

    fn set(&self, name: &str, value: Value) -> SupportResult<()> {
        self.variables.insert(name.to_string(), value);
        Ok(())
    }

    fn remove(&self, name: &str) -> Option<Value> {
        if name == "*" {
            self.variables.clear();
            return None;
        }
        if let Some(prefix) = name.strip_suffix('*') {
            self.variables.retain(|key, _| !key.starts_with(prefix));
            return None;
        }
        self.variables.remove(name).map(|(_, v)| v)
    }

    fn names(&self) -> Vec<String> {
        self.variables.iter().map(|e| e.key().clone()).collect()
    }

    fn size(&self) -> usize {
        self.variables.len()
    }

    fn clear(&self) {
        self.variables.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get_remove() {
        let repo = GlobalVariableRepository::new();
        repo.set("greeting", json!("hello")).unwrap();
        assert!(repo.has("greeting"));
        assert_eq!(repo.remove("greeting"), Some(json!("hello")));
        assert!(!repo.has("greeting"));
    }

    #[test]
    fn test_wildcard_removal() {
        let repo = GlobalVariableRepository::new();
        repo.set("order.id", json!(1)).unwrap();
        repo.set("order.total", json!(2)).unwrap();
        repo.set("customer", json!(3)).unwrap();

        assert_eq!(repo.remove("order.*"), None);
        assert_eq!(repo.names(), vec!["customer".to_string()]);

        repo.remove("*");
        assert_eq!(repo.size(), 0);
    }
}
