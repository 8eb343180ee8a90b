use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Message payload
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Body {
    #[default]
    Empty,
    Text(String),
    Bytes(Vec<u8>),
    Json(Value),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            Self::Bytes(b) => b.is_empty(),
            Self::Json(v) => v.is_null(),
        }
    }

    /// Render the body as text; binary content must be valid UTF-8
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Text(s) => Some(s.clone()),
            Self::Bytes(b) => String::from_utf8(b.clone()).ok(),
            Self::Json(Value::String(s)) => Some(s.clone()),
            Self::Json(v) => Some(v.to_string()),
        }
    }

    /// Render the body as a JSON value
    pub fn as_json(&self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Text(s) => Value::String(s.clone()),
            Self::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => Value::String(s.to_string()),
                Err(_) => Value::Array(b.iter().map(|x| Value::from(*x)).collect()),
            },
            Self::Json(v) => v.clone(),
        }
    }

    /// Short type name used in log output
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
        }
    }
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Bytes(b) => write!(f, "[{} bytes]", b.len()),
            other => write!(f, "{}", other.as_text().unwrap_or_default()),
        }
    }
}

impl From<&str> for Body {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        if value.is_null() {
            Self::Empty
        } else {
            Self::Json(value)
        }
    }
}

/// Data type information attached to a body, e.g. `application/json` or a schema name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataType {
    pub name: String,
    pub schema: Option<String>,
}

impl DataType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}:{}", self.name, schema),
            None => write!(f, "{}", self.name),
        }
    }
}
