//! # Property Binding
//!
//! Binds a flat `key -> value` map of options onto a typed target. The target
//! round-trips through its serde JSON form, so any `Serialize +
//! DeserializeOwned` struct can be configured from URI parameters or
//! property files.
//!
//! Keys may be nested with dots (`pool.max-size`) and index into map or list
//! fields with brackets (`labels[team]`, `hosts[0]`). Option names match
//! fields written in snake_case, camelCase or dash-case; with
//! [`PropertyBinder::with_ignore_case`] any casing matches. String values are
//! coerced to the type the field currently holds.
//!
//! ```rust
//! use conduit_support::property_binding::PropertyBinder;
//! use serde::{Deserialize, Serialize};
//! use serde_json::json;
//! use std::collections::HashMap;
//!
//! #[derive(Default, Serialize, Deserialize)]
//! struct Options {
//!     max_retries: u32,
//!     verbose: bool,
//! }
//!
//! let mut options = Options::default();
//! let mut properties = HashMap::from([
//!     ("max-retries".to_string(), json!("5")),
//!     ("verbose".to_string(), json!("true")),
//! ]);
//! assert!(PropertyBinder::new().bind(&mut options, &mut properties).unwrap());
//! assert_eq!(options.max_retries, 5);
//! assert!(options.verbose);
//! assert!(properties.is_empty());
//! ```

use crate::error::{SupportError, SupportResult};
use crate::utils::json_type_name;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Configurable binder of option maps onto typed targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyBinder {
    option_prefix: Option<String>,
    ignore_case: bool,
    mandatory: bool,
    remove_parameters: bool,
    nesting: bool,
}

impl Default for PropertyBinder {
    fn default() -> Self {
        Self {
            option_prefix: None,
            ignore_case: false,
            mandatory: false,
            remove_parameters: true,
            nesting: true,
        }
    }
}

impl PropertyBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only bind keys starting with `prefix`, which is stripped before matching
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.option_prefix = Some(prefix.into());
        self
    }

    pub fn with_ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    /// Fail on keys that match no field. A key starting with `?` stays optional.
    pub fn with_mandatory(mut self, mandatory: bool) -> Self {
        self.mandatory = mandatory;
        self
    }

    /// Remove bound keys from the property map (on by default)
    pub fn with_remove_parameters(mut self, remove_parameters: bool) -> Self {
        self.remove_parameters = remove_parameters;
        self
    }

    /// Allow dotted keys into nested fields (on by default)
    pub fn with_nesting(mut self, nesting: bool) -> Self {
        self.nesting = nesting;
        self
    }

    /// Bind `properties` onto `target`, returning whether any key was bound.
    ///
    /// The target is only replaced once every key has been applied, so a
    /// failed bind leaves it untouched.
    pub fn bind<T>(&self, target: &mut T, properties: &mut HashMap<String, Value>) -> SupportResult<bool>
    where
        T: Serialize + DeserializeOwned,
    {
        if properties.is_empty() {
            return Ok(false);
        }
        let target_type = std::any::type_name::<T>();
        let mut tree = serde_json::to_value(&*target).map_err(|e| SupportError::PropertyBinding {
            name: target_type.to_string(),
            reason: e.to_string(),
        })?;
        if !tree.is_object() {
            return Err(SupportError::PropertyBinding {
                name: target_type.to_string(),
                reason: format!("cannot bind onto a {}", json_type_name(&tree)),
            });
        }

        // parents before their nested keys
        let mut keys: Vec<&String> = properties.keys().collect();
        keys.sort_by(|a, b| depth(a).cmp(&depth(b)).then_with(|| a.cmp(b)));

        let mut bound = Vec::new();
        let mut created = HashSet::new();
        for key in keys {
            let (body, optional) = match key.strip_prefix('?') {
                Some(rest) => (rest, true),
                None => (key.as_str(), false),
            };
            let Some(option) = self.strip_prefix(body) else {
                continue;
            };
            if !self.nesting && depth(option) > 0 {
                continue;
            }

            if self.bind_path(&mut tree, option, &properties[key], &mut created)? {
                bound.push(key.clone());
            } else if self.mandatory && !optional {
                return Err(SupportError::PropertyBinding {
                    name: option.to_string(),
                    reason: format!("no such property on {target_type}"),
                });
            }
        }

        if bound.is_empty() {
            return Ok(false);
        }
        *target = serde_json::from_value(tree).map_err(|e| SupportError::PropertyBinding {
            name: bound.join(","),
            reason: e.to_string(),
        })?;
        debug!(target_type, bound = bound.len(), "Bound properties");

        if self.remove_parameters {
            for key in &bound {
                properties.remove(key);
            }
        }
        Ok(true)
    }

    /// Bind a single option onto `target`
    pub fn bind_one<T>(&self, target: &mut T, key: &str, value: impl Into<Value>) -> SupportResult<bool>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut properties = HashMap::from([(key.to_string(), value.into())]);
        self.bind(target, &mut properties)
    }

    fn strip_prefix<'a>(&self, key: &'a str) -> Option<&'a str> {
        let Some(prefix) = self.option_prefix.as_deref() else {
            return Some(key);
        };
        match key.get(..prefix.len()) {
            Some(head) if head.eq_ignore_ascii_case(prefix) => Some(&key[prefix.len()..]),
            _ => None,
        }
    }

    /// Apply one option. Objects created here for null parents accept any
    /// field name; `created` remembers them across options.
    fn bind_path(
        &self,
        tree: &mut Value,
        path: &str,
        value: &Value,
        created: &mut HashSet<String>,
    ) -> SupportResult<bool> {
        let segments: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            return Ok(false);
        };

        let mut node = tree;
        let mut open = false;
        for (position, segment) in parents.iter().enumerate() {
            let Some(child) = self.descend(node, segment, true, open)? else {
                return Ok(false);
            };
            let parent_path = segments[..=position].join(".");
            if child.is_null() {
                *child = Value::Object(Map::new());
                created.insert(parent_path.clone());
            }
            open = created.contains(&parent_path);
            node = child;
        }

        match self.descend(node, last, false, open)? {
            Some(slot) => {
                let coerced = coerce(path, slot, value)?;
                *slot = coerced;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Step from `node` into the field or element named by `segment`
    fn descend<'v>(
        &self,
        node: &'v mut Value,
        segment: &str,
        intermediate: bool,
        open: bool,
    ) -> SupportResult<Option<&'v mut Value>> {
        let (field, index) = split_index(segment)?;
        let Some(object) = node.as_object_mut() else {
            return Ok(None);
        };
        let name = match self.resolve_field(object, field) {
            Some(name) => name,
            None if open => {
                let name = field.replace('-', "_");
                object.insert(name.clone(), Value::Null);
                name
            }
            None => return Ok(None),
        };
        let Some(slot) = object.get_mut(&name) else {
            return Ok(None);
        };
        let Some(index) = index else {
            return Ok(Some(slot));
        };

        if slot.is_null() {
            *slot = match index.parse::<usize>() {
                Ok(_) => Value::Array(Vec::new()),
                Err(_) => Value::Object(Map::new()),
            };
        }
        let placeholder = if intermediate {
            Value::Object(Map::new())
        } else {
            Value::Null
        };
        match slot {
            Value::Object(entries) => Ok(Some(entries.entry(index).or_insert(placeholder))),
            Value::Array(items) => {
                let position = index.parse::<usize>().map_err(|_| SupportError::PropertyBinding {
                    name: segment.to_string(),
                    reason: format!("'{index}' is not a list index"),
                })?;
                if position > items.len() {
                    return Err(SupportError::PropertyBinding {
                        name: segment.to_string(),
                        reason: format!("index {position} is past the end of a list of {}", items.len()),
                    });
                }
                if position == items.len() {
                    items.push(placeholder);
                }
                Ok(items.get_mut(position))
            }
            other => Err(SupportError::PropertyBinding {
                name: segment.to_string(),
                reason: format!("cannot index into a {}", json_type_name(other)),
            }),
        }
    }

    fn resolve_field(&self, object: &Map<String, Value>, option: &str) -> Option<String> {
        if object.contains_key(option) {
            return Some(option.to_string());
        }
        let candidates = [option.replace('-', "_"), dash_to_camel(option)];
        if let Some(found) = candidates.into_iter().find(|c| object.contains_key(c)) {
            return Some(found);
        }
        if self.ignore_case {
            let wanted = canonical(option);
            return object.keys().find(|name| canonical(name) == wanted).cloned();
        }
        None
    }
}

/// Bind with the default [`PropertyBinder`] settings
pub fn bind_properties<T>(target: &mut T, properties: &mut HashMap<String, Value>) -> SupportResult<bool>
where
    T: Serialize + DeserializeOwned,
{
    PropertyBinder::new().bind(target, properties)
}

fn depth(key: &str) -> usize {
    key.matches('.').count()
}

fn split_index(segment: &str) -> SupportResult<(&str, Option<&str>)> {
    let Some(open) = segment.find('[') else {
        return Ok((segment, None));
    };
    match segment.strip_suffix(']') {
        Some(inner) if open > 0 => Ok((&segment[..open], Some(&inner[open + 1..]))),
        _ => Err(SupportError::PropertyBinding {
            name: segment.to_string(),
            reason: "malformed index, expected name[key]".to_string(),
        }),
    }
}

fn dash_to_camel(option: &str) -> String {
    let mut out = String::with_capacity(option.len());
    let mut upper = false;
    for c in option.chars() {
        if c == '-' || c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn canonical(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Convert `value` to the JSON kind `current` holds
fn coerce(name: &str, current: &Value, value: &Value) -> SupportResult<Value> {
    let failed = |reason: String| SupportError::PropertyBinding {
        name: name.to_string(),
        reason,
    };
    let Value::String(text) = value else {
        return Ok(match (current, value) {
            (Value::String(_), Value::Number(_) | Value::Bool(_)) => Value::String(value.to_string()),
            _ => value.clone(),
        });
    };
    let trimmed = text.trim();

    match current {
        Value::Number(_) => match serde_json::from_str::<Value>(trimmed) {
            Ok(number @ Value::Number(_)) => Ok(number),
            _ => Err(failed(format!("'{text}' is not a number"))),
        },
        Value::Bool(_) => match trimmed.to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(failed(format!("'{text}' is not a boolean"))),
        },
        Value::Array(items) => {
            if let Ok(parsed @ Value::Array(_)) = serde_json::from_str::<Value>(trimmed) {
                return Ok(parsed);
            }
            trimmed
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| match items.first() {
                    Some(sample) => coerce(name, sample, &Value::String(item.to_string())),
                    None => Ok(serde_json::from_str::<Value>(item)
                        .unwrap_or_else(|_| Value::String(item.to_string()))),
                })
                .collect::<SupportResult<Vec<_>>>()
                .map(Value::Array)
        }
        Value::Object(_) => match serde_json::from_str::<Value>(trimmed) {
            Ok(object @ Value::Object(_)) => Ok(object),
            _ => Err(failed(format!("'{text}' is not a JSON object"))),
        },
        Value::String(_) | Value::Null => Ok(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct Pool {
        max_size: u32,
        name: String,
    }

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Endpoint {
        host: String,
        port: u16,
        use_tls: bool,
        timeout_secs: f64,
        tags: Vec<String>,
        retry_codes: Vec<u16>,
        labels: HashMap<String, String>,
        pool: Pool,
        backup: Option<Pool>,
    }

    fn props(entries: &[(&str, Value)]) -> HashMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_binds_and_coerces_flat_options() {
        let mut endpoint = Endpoint::default();
        let mut properties = props(&[
            ("host", json!("example.org")),
            ("port", json!("8443")),
            ("use-tls", json!("TRUE")),
            ("timeoutSecs", json!(2.5)),
            ("tags", json!("a, b")),
            ("retry_codes", json!("500,503")),
        ]);

        assert!(bind_properties(&mut endpoint, &mut properties).unwrap());
        assert!(properties.is_empty());
        assert_eq!(endpoint.host, "example.org");
        assert_eq!(endpoint.port, 8443);
        assert!(endpoint.use_tls);
        assert_eq!(endpoint.timeout_secs, 2.5);
        assert_eq!(endpoint.tags, vec!["a", "b"]);
        assert_eq!(endpoint.retry_codes, vec![500, 503]);
    }

    #[test]
    fn test_nested_and_indexed_keys() {
        let mut endpoint = Endpoint::default();
        let mut properties = props(&[
            ("pool.max-size", json!("10")),
            ("pool.name", json!("primary")),
            ("backup.max_size", json!(2)),
            ("backup.name", json!("spare")),
            ("labels[team]", json!("core")),
            ("tags[0]", json!("first")),
        ]);

        assert!(bind_properties(&mut endpoint, &mut properties).unwrap());
        assert_eq!(endpoint.pool, Pool { max_size: 10, name: "primary".into() });
        assert_eq!(endpoint.backup, Some(Pool { max_size: 2, name: "spare".into() }));
        assert_eq!(endpoint.labels.get("team").map(String::as_str), Some("core"));
        assert_eq!(endpoint.tags, vec!["first"]);
    }

    #[test]
    fn test_unknown_keys_are_left_unless_mandatory() {
        let mut endpoint = Endpoint::default();
        let mut properties = props(&[("host", json!("h")), ("colour", json!("red"))]);
        assert!(bind_properties(&mut endpoint, &mut properties).unwrap());
        assert_eq!(properties.keys().collect::<Vec<_>>(), vec!["colour"]);

        let binder = PropertyBinder::new().with_mandatory(true);
        let err = binder.bind(&mut endpoint, &mut properties).unwrap_err();
        assert!(matches!(err, SupportError::PropertyBinding { ref name, .. } if name == "colour"));

        let mut optional = props(&[("?colour", json!("red")), ("port", json!(1))]);
        assert!(binder.bind(&mut endpoint, &mut optional).unwrap());
        assert_eq!(endpoint.port, 1);
    }

    #[test]
    fn test_prefix_and_case_options() {
        let mut endpoint = Endpoint::default();
        let mut properties = props(&[
            ("http.HOST", json!("upper")),
            ("http.Port", json!("81")),
            ("other.host", json!("ignored")),
        ]);

        let binder = PropertyBinder::new()
            .with_prefix("http.")
            .with_ignore_case(true)
            .with_remove_parameters(false);
        assert!(binder.bind(&mut endpoint, &mut properties).unwrap());
        assert_eq!(endpoint.host, "upper");
        assert_eq!(endpoint.port, 81);
        assert_eq!(properties.len(), 3);

        let mut strict = props(&[("HOST", json!("x"))]);
        assert!(!PropertyBinder::new().bind(&mut endpoint, &mut strict).unwrap());
        assert_eq!(endpoint.host, "upper");
    }

    #[test]
    fn test_failed_bind_leaves_target_untouched() {
        let mut endpoint = Endpoint {
            host: "before".into(),
            ..Endpoint::default()
        };
        let mut properties = props(&[("host", json!("after")), ("port", json!("not-a-port"))]);
        assert!(bind_properties(&mut endpoint, &mut properties).is_err());
        assert_eq!(endpoint.host, "before");
        assert_eq!(properties.len(), 2);

        let mut too_big = props(&[("port", json!(70000))]);
        assert!(bind_properties(&mut endpoint, &mut too_big).is_err());
    }

    #[test]
    fn test_nesting_can_be_disabled() {
        let mut endpoint = Endpoint::default();
        let binder = PropertyBinder::new().with_nesting(false);
        assert!(!binder.bind_one(&mut endpoint, "pool.name", "p").unwrap());
        assert!(binder.bind_one(&mut endpoint, "host", "h").unwrap());
        assert_eq!(endpoint.pool.name, "");
    }
}
