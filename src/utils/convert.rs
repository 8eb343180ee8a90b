//! Lenient conversion of JSON values to typed Rust values.
//!
//! Headers, properties and bound options usually arrive as strings. A value
//! is first deserialized as-is; when that fails a string is re-read as JSON
//! (`"42"` becomes `42`, `"true"` becomes `true`) and scalars are retried as
//! their string form.

use crate::error::{SupportError, SupportResult};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Convert `value` to `T`, naming `name` in the error
pub fn convert_value<T: DeserializeOwned>(name: &str, value: &Value) -> SupportResult<T> {
    let direct = match serde_json::from_value::<T>(value.clone()) {
        Ok(converted) => return Ok(converted),
        Err(error) => error,
    };

    let retried = match value {
        Value::String(text) => serde_json::from_str::<T>(text.trim()).ok(),
        Value::Number(_) | Value::Bool(_) => {
            serde_json::from_value::<T>(Value::String(value.to_string())).ok()
        }
        _ => None,
    };

    retried.ok_or_else(|| SupportError::TypeConversion {
        name: name.to_string(),
        expected: std::any::type_name::<T>().to_string(),
        reason: direct.to_string(),
    })
}

/// Lower-case JSON type name of a value, for dumps and error messages
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
