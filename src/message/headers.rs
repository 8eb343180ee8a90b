use crate::utils::pattern::{matches_any, matches_pattern};
use serde_json::Value;
use std::collections::BTreeMap;

/// Case-insensitive header map.
///
/// Lookups ignore case while the key casing of the first insertion is kept
/// for iteration and output. Iteration is ordered by the lowercased key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers {
    entries: BTreeMap<String, (String, Value)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, value)| value)
    }

    /// Insert or replace a header, returning the previous value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        match self.entries.get_mut(&key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value.into())),
            None => {
                self.entries.insert(key, (name, value.into()));
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.entries
            .remove(&name.to_ascii_lowercase())
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Remove every header whose name matches `pattern` unless it matches one of
    /// `excludes`. Returns whether anything was removed.
    pub fn remove_matching(&mut self, pattern: &str, excludes: &[&str]) -> bool {
        let before = self.entries.len();
        self.entries.retain(|key, (name, _)| {
            let matched = matches_pattern(name, pattern) || matches_pattern(key, pattern);
            !matched || matches_any(name, excludes)
        });
        before != self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate headers with their original casing
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .values()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.values().map(|(name, _)| name.clone()).collect()
    }

    /// Copy all headers from `other`; existing values are replaced only when `overwrite` is set
    pub fn extend_from(&mut self, other: &Headers, overwrite: bool) {
        for (name, value) in other.iter() {
            if overwrite || !self.contains(name) {
                self.set(name, value.clone());
            }
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.set(k, v);
        }
        headers
    }
}
