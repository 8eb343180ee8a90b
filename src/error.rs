//! Error types for the conduit support layer.
//!

use std::time::Duration;
use thiserror::Error;

/// Failures raised by the support layer.
///
/// Errors are `Clone` because an exchange carries its failure with it, and
/// copies of an exchange carry a copy of that failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SupportError {
    #[error("Lifecycle error in {service}: {reason}")]
    Lifecycle { service: String, reason: String },
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("No bean could be found in the registry for: {name}")]
    NoSuchBean { name: String },
    #[error("Bean {name} is not of the expected type {expected}")]
    BeanTypeMismatch { name: String, expected: String },
    #[error("VariableRepository with id: {id} does not exist")]
    NoSuchVariableRepository { id: String },
    #[error("Processing failed for exchange {exchange_id}: {reason}")]
    Processing { exchange_id: String, reason: String },
    #[error("Interrupted while waiting for asynchronous callback for exchange {exchange_id}")]
    Interrupted { exchange_id: String },
    #[error("Timed out after {timeout:?} waiting for asynchronous callback for exchange {exchange_id}")]
    Timeout {
        exchange_id: String,
        timeout: Duration,
    },
    #[error("No '{name}' header available on exchange {exchange_id}")]
    NoSuchHeader { exchange_id: String, name: String },
    #[error("No '{name}' property available on exchange {exchange_id}")]
    NoSuchProperty { exchange_id: String, name: String },
    #[error("Error converting {name} to {expected}: {reason}")]
    TypeConversion {
        name: String,
        expected: String,
        reason: String,
    },
    #[error("Error binding property {name}: {reason}")]
    PropertyBinding { name: String, reason: String },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Reload error: {0}")]
    Reload(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SupportError {
    /// Shorthand for a processing failure on the given exchange
    pub fn processing(exchange_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Processing {
            exchange_id: exchange_id.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a lifecycle failure of the named service
    pub fn lifecycle(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Lifecycle {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error was caused by an interrupted or timed-out wait
    pub fn is_interruption(&self) -> bool {
        matches!(self, Self::Interrupted { .. } | Self::Timeout { .. })
    }
}

impl From<serde_json::Error> for SupportError {
    fn from(error: serde_json::Error) -> Self {
        SupportError::Serialization(format!("JSON serialization error: {error}"))
    }
}

impl From<std::io::Error> for SupportError {
    fn from(error: std::io::Error) -> Self {
        SupportError::Io(error.to_string())
    }
}

impl From<config::ConfigError> for SupportError {
    fn from(error: config::ConfigError) -> Self {
        SupportError::Configuration(error.to_string())
    }
}

pub type SupportResult<T> = std::result::Result<T, SupportError>;
