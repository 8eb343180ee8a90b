/*!
 * Serde utilities for common serialization/deserialization patterns.
 *
 * Configuration values can arrive from TOML files, where numbers are typed,
 * or from environment variables, where everything is a string. These helpers
 * accept both forms consistently.
 */

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Deserialize an unsigned integer that may be represented as a number or string.
///
/// # Examples
///
/// ```toml
/// # Both of these are accepted:
/// delay_ms = 500
/// delay_ms = "500"
/// ```
///
/// # Usage with serde
///
/// ```rust
/// use serde::Deserialize;
/// use conduit_support::utils::serde::deserialize_flexible_u64;
///
/// #[derive(Deserialize)]
/// struct Polling {
///     #[serde(deserialize_with = "deserialize_flexible_u64")]
///     delay_ms: u64,
/// }
/// ```
pub fn deserialize_flexible_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Ok(u)
            } else if let Some(f) = n.as_f64().filter(|f| *f >= 0.0) {
                // Truncate floating point to integer
                Ok(f as u64)
            } else {
                Err(D::Error::custom(format!("Invalid unsigned value: {n}")))
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| D::Error::custom(format!("Cannot parse '{s}' as unsigned integer"))),
        other => Err(D::Error::custom(format!(
            "Expected numeric value, found: {other:?}"
        ))),
    }
}

/// Deserialize a boolean that may be represented as a bool or a string
/// (`"true"`, `"false"`, `"1"`, `"0"`, `"yes"`, `"no"`).
pub fn deserialize_flexible_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Bool(b) => Ok(b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(D::Error::custom(format!("Cannot parse '{s}' as boolean"))),
        },
        Value::Number(n) => Ok(n.as_u64().unwrap_or(0) != 0),
        other => Err(D::Error::custom(format!(
            "Expected boolean value, found: {other:?}"
        ))),
    }
}
