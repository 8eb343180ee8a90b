//! # Exchange Model
//!
//! An [`Exchange`] is the container a message travels in while it is routed:
//! an in message, an optional out message, properties, variables, a failure
//! and a set of routing flags held by the [`ExchangeExtension`].
//!
//! ## Overview
//!
//! - Exchange ids are generated lazily with the UUID generator of the owning
//!   [`ExchangeContext`], so exchanges that are never logged or correlated
//!   never pay for an id.
//! - Internal properties ([`ExchangePropertyKey`]) are stored in a fixed
//!   array indexed by the key; user properties live in a map.
//! - Pooled exchanges are handed out by a
//!   [`PooledExchangeFactory`](factory::PooledExchangeFactory) and restored
//!   with [`Exchange::reset`] when released.
//!
//! ## Usage
//!
//! ```rust
//! use conduit_support::exchange::{Exchange, ExchangeContext, ExchangePattern};
//!
//! let mut exchange = Exchange::with_pattern(ExchangeContext::default(), ExchangePattern::InOut);
//! exchange.in_message_mut().set_body("hello");
//! exchange.set_property("tenant", "acme");
//!
//! let copy = exchange.copy();
//! assert_ne!(copy.exchange_id(), exchange.exchange_id());
//! assert_eq!(copy.property("tenant"), exchange.property("tenant"));
//! ```

mod extension;
pub mod factory;
pub mod helper;
mod property_key;

pub use extension::{ExchangeExtension, Synchronization};
pub use factory::{
    ExchangeFactory, ExchangeFactoryManager, ExchangeFactoryStatistics, PooledExchangeFactory,
    PrototypeExchangeFactory,
};
pub use property_key::ExchangePropertyKey;

use crate::clock::{Clock, ExchangeClock};
use crate::error::SupportError;
use crate::id_generator::{DefaultUuidGenerator, UuidGenerator};
use crate::message::Message;
use crate::utils::pattern::{matches_any, matches_pattern};
use crate::variable::VariableRepositoryFactory;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Message exchange pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExchangePattern {
    /// One-way, no reply expected
    #[default]
    InOnly,
    /// Request-reply
    InOut,
}

impl ExchangePattern {
    pub fn is_out_capable(self) -> bool {
        matches!(self, ExchangePattern::InOut)
    }
}

impl fmt::Display for ExchangePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangePattern::InOnly => write!(f, "InOnly"),
            ExchangePattern::InOut => write!(f, "InOut"),
        }
    }
}

impl FromStr for ExchangePattern {
    type Err = SupportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inonly" | "in_only" | "in-only" => Ok(ExchangePattern::InOnly),
            "inout" | "in_out" | "in-out" => Ok(ExchangePattern::InOut),
            _ => Err(SupportError::InvalidState(format!(
                "Unknown exchange pattern: {s}"
            ))),
        }
    }
}

/// Services an exchange needs from its surroundings
#[derive(Debug, Clone)]
pub struct ExchangeContext {
    uuid_generator: Arc<dyn UuidGenerator>,
    variable_repositories: Arc<VariableRepositoryFactory>,
}

impl ExchangeContext {
    pub fn new(
        uuid_generator: Arc<dyn UuidGenerator>,
        variable_repositories: Arc<VariableRepositoryFactory>,
    ) -> Self {
        Self {
            uuid_generator,
            variable_repositories,
        }
    }

    pub fn uuid_generator(&self) -> &Arc<dyn UuidGenerator> {
        &self.uuid_generator
    }

    pub fn variable_repositories(&self) -> &Arc<VariableRepositoryFactory> {
        &self.variable_repositories
    }
}

impl Default for ExchangeContext {
    fn default() -> Self {
        Self::new(
            Arc::new(DefaultUuidGenerator::new()),
            Arc::new(VariableRepositoryFactory::new()),
        )
    }
}

type InternalProperties = [Option<Value>; ExchangePropertyKey::COUNT];

fn empty_internal_properties() -> InternalProperties {
    std::array::from_fn(|_| None)
}

pub struct Exchange {
    context: ExchangeContext,
    exchange_id: OnceLock<String>,
    pattern: ExchangePattern,
    original_pattern: ExchangePattern,
    clock: ExchangeClock,
    in_message: Message,
    out_message: Option<Message>,
    exception: Option<SupportError>,
    internal_properties: InternalProperties,
    properties: HashMap<String, Value>,
    variables: HashMap<String, Value>,
    rollback_only: bool,
    rollback_only_last: bool,
    route_stop: bool,
    extension: ExchangeExtension,
    pooled: bool,
    auto_release: bool,
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("exchange_id", &self.exchange_id.get())
            .field("pattern", &self.pattern)
            .field("in_message", &self.in_message)
            .field("out_message", &self.out_message)
            .field("exception", &self.exception)
            .field("properties", &self.properties)
            .field("pooled", &self.pooled)
            .finish()
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Exchange[{}]", self.exchange_id())
    }
}

impl Exchange {
    /// Create a new `InOnly` exchange
    pub fn new(context: ExchangeContext) -> Self {
        Self::with_pattern(context, ExchangePattern::InOnly)
    }

    /// Create a new exchange with the given pattern
    pub fn with_pattern(context: ExchangeContext, pattern: ExchangePattern) -> Self {
        Self::build(context, pattern, ExchangeClock::monotonic(), false)
    }

    /// Create an exchange owned by a pool
    pub(crate) fn new_pooled(context: ExchangeContext, pattern: ExchangePattern) -> Self {
        Self::build(context, pattern, ExchangeClock::resetable(), true)
    }

    fn build(
        context: ExchangeContext,
        pattern: ExchangePattern,
        clock: ExchangeClock,
        pooled: bool,
    ) -> Self {
        Self {
            context,
            exchange_id: OnceLock::new(),
            pattern,
            original_pattern: pattern,
            clock,
            in_message: Message::new(),
            out_message: None,
            exception: None,
            internal_properties: empty_internal_properties(),
            properties: HashMap::new(),
            variables: HashMap::new(),
            rollback_only: false,
            rollback_only_last: false,
            route_stop: false,
            extension: ExchangeExtension::default(),
            pooled,
            auto_release: false,
        }
    }

    pub fn context(&self) -> &ExchangeContext {
        &self.context
    }

    /// The exchange id, generated on first access
    pub fn exchange_id(&self) -> &str {
        self.exchange_id
            .get_or_init(|| self.context.uuid_generator.generate_exchange_uuid())
    }

    /// The exchange id if one has been generated or assigned
    pub fn existing_exchange_id(&self) -> Option<&str> {
        self.exchange_id.get().map(String::as_str)
    }

    pub fn set_exchange_id(&mut self, id: impl Into<String>) {
        self.exchange_id = OnceLock::from(id.into());
    }

    pub fn pattern(&self) -> ExchangePattern {
        self.pattern
    }

    pub fn set_pattern(&mut self, pattern: ExchangePattern) {
        self.pattern = pattern;
    }

    /// Creation time in epoch millis
    pub fn created(&self) -> i64 {
        self.clock.created()
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    pub fn clock(&self) -> &ExchangeClock {
        &self.clock
    }

    // messages

    pub fn in_message(&self) -> &Message {
        &self.in_message
    }

    pub fn in_message_mut(&mut self) -> &mut Message {
        &mut self.in_message
    }

    pub fn set_in(&mut self, message: Message) {
        self.in_message = message;
    }

    pub fn has_out(&self) -> bool {
        self.out_message.is_some()
    }

    pub fn out_message(&self) -> Option<&Message> {
        self.out_message.as_ref()
    }

    /// The out message, created empty on first access
    pub fn out_message_mut(&mut self) -> &mut Message {
        self.out_message.get_or_insert_with(Message::new)
    }

    pub fn set_out(&mut self, message: Option<Message>) {
        self.out_message = message;
    }

    pub(crate) fn take_out(&mut self) -> Option<Message> {
        self.out_message.take()
    }

    /// The current message: out when present, otherwise in
    pub fn message(&self) -> &Message {
        self.out_message.as_ref().unwrap_or(&self.in_message)
    }

    pub fn message_mut(&mut self) -> &mut Message {
        match self.out_message {
            Some(ref mut out) => out,
            None => &mut self.in_message,
        }
    }

    /// Replace the current message
    pub fn set_message(&mut self, message: Message) {
        match self.out_message {
            Some(ref mut out) => *out = message,
            None => self.in_message = message,
        }
    }

    // properties

    /// Look up a property, checking the internal key table first
    pub fn property(&self, name: &str) -> Option<&Value> {
        match ExchangePropertyKey::from_key(name) {
            Some(key) => self.property_by_key(key),
            None => self.properties.get(name),
        }
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        match ExchangePropertyKey::from_key(&name) {
            Some(key) => self.set_property_by_key(key, value),
            None => {
                self.properties.insert(name, value.into());
            }
        }
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Value> {
        match ExchangePropertyKey::from_key(name) {
            Some(key) => self.remove_property_by_key(key),
            None => self.properties.remove(name),
        }
    }

    /// Remove every property, internal ones included, whose name matches
    /// `pattern` unless it matches one of `excludes`.
    pub fn remove_properties(&mut self, pattern: &str, excludes: &[&str]) -> bool {
        let mut removed = false;
        for key in ExchangePropertyKey::ALL {
            let slot = &mut self.internal_properties[key.index()];
            if slot.is_some()
                && matches_pattern(key.as_key(), pattern)
                && !matches_any(key.as_key(), excludes)
            {
                *slot = None;
                removed = true;
            }
        }
        let before = self.properties.len();
        self.properties
            .retain(|name, _| !matches_pattern(name, pattern) || matches_any(name, excludes));
        removed || before != self.properties.len()
    }

    pub fn property_by_key(&self, key: ExchangePropertyKey) -> Option<&Value> {
        self.internal_properties[key.index()].as_ref()
    }

    pub fn set_property_by_key(&mut self, key: ExchangePropertyKey, value: impl Into<Value>) {
        let value = value.into();
        self.internal_properties[key.index()] = if value.is_null() { None } else { Some(value) };
    }

    pub fn remove_property_by_key(&mut self, key: ExchangePropertyKey) -> Option<Value> {
        self.internal_properties[key.index()].take()
    }

    /// User properties, without the internal ones
    pub fn properties(&self) -> &HashMap<String, Value> {
        &self.properties
    }

    /// User and internal properties merged into one map
    pub fn all_properties(&self) -> HashMap<String, Value> {
        let mut all = self.properties.clone();
        for key in ExchangePropertyKey::ALL {
            if let Some(value) = &self.internal_properties[key.index()] {
                all.insert(key.as_key().to_string(), value.clone());
            }
        }
        all
    }

    pub fn has_properties(&self) -> bool {
        !self.properties.is_empty() || self.internal_properties.iter().any(Option::is_some)
    }

    // variables

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn remove_variable(&mut self, name: &str) -> Option<Value> {
        if name == "*" {
            self.variables.clear();
            return None;
        }
        self.variables.remove(name)
    }

    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    pub fn has_variables(&self) -> bool {
        !self.variables.is_empty()
    }

    // failure

    pub fn exception(&self) -> Option<&SupportError> {
        self.exception.as_ref()
    }

    /// Set or clear the failure; a failure is also recorded as the caught exception
    pub fn set_exception(&mut self, exception: Option<SupportError>) {
        if let Some(error) = &exception {
            self.set_property_by_key(ExchangePropertyKey::ExceptionCaught, error.to_string());
        }
        self.exception = exception;
    }

    pub fn take_exception(&mut self) -> Option<SupportError> {
        self.exception.take()
    }

    pub fn is_failed(&self) -> bool {
        self.exception.is_some()
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    pub fn set_rollback_only(&mut self, rollback_only: bool) {
        self.rollback_only = rollback_only;
    }

    pub fn is_rollback_only_last(&self) -> bool {
        self.rollback_only_last
    }

    pub fn set_rollback_only_last(&mut self, rollback_only_last: bool) {
        self.rollback_only_last = rollback_only_last;
    }

    pub fn is_route_stop(&self) -> bool {
        self.route_stop
    }

    pub fn set_route_stop(&mut self, route_stop: bool) {
        self.route_stop = route_stop;
    }

    pub fn is_transacted(&self) -> bool {
        self.extension.is_transacted()
    }

    // origin

    pub fn from_endpoint(&self) -> Option<&str> {
        self.extension.from_endpoint()
    }

    pub fn from_route_id(&self) -> Option<&str> {
        self.extension.from_route_id()
    }

    pub fn extension(&self) -> &ExchangeExtension {
        &self.extension
    }

    pub fn extension_mut(&mut self) -> &mut ExchangeExtension {
        &mut self.extension
    }

    /// Run and clear the registered on-completions
    pub fn done_on_completions(&mut self) {
        let synchronizations = self.extension.take_on_completions();
        let failed = self.is_failed();
        for synchronization in synchronizations {
            if failed {
                synchronization.on_failure(self);
            } else {
                synchronization.on_complete(self);
            }
        }
    }

    // pooling

    pub fn is_pooled(&self) -> bool {
        self.pooled
    }

    pub fn is_auto_release(&self) -> bool {
        self.auto_release
    }

    pub(crate) fn set_auto_release(&mut self, auto_release: bool) {
        self.auto_release = auto_release;
    }

    /// Deep copy with a new exchange id; on-completions are not copied
    pub fn copy(&self) -> Exchange {
        Exchange {
            context: self.context.clone(),
            exchange_id: OnceLock::new(),
            pattern: self.pattern,
            original_pattern: self.pattern,
            clock: ExchangeClock::monotonic(),
            in_message: self.in_message.clone(),
            out_message: self.out_message.clone(),
            exception: self.exception.clone(),
            internal_properties: self.internal_properties.clone(),
            properties: self.properties.clone(),
            variables: self.variables.clone(),
            rollback_only: self.rollback_only,
            rollback_only_last: self.rollback_only_last,
            route_stop: self.route_stop,
            extension: self.extension.copy_for_exchange(),
            pooled: false,
            auto_release: false,
        }
    }

    /// Restore the exchange to the state it had when first created so it can
    /// be reused. The next id access generates a new id.
    pub fn reset(&mut self) {
        self.exchange_id = OnceLock::new();
        self.pattern = self.original_pattern;
        self.clock.reset();
        self.in_message.reset();
        self.out_message = None;
        self.exception = None;
        self.internal_properties = empty_internal_properties();
        self.properties.clear();
        self.variables.clear();
        self.rollback_only = false;
        self.rollback_only_last = false;
        self.route_stop = false;
        self.extension.reset();
    }

    /// Move the contents out, leaving a shell with the same id and pattern
    pub fn detach(&mut self) -> Exchange {
        let id = self.exchange_id().to_string();
        let mut shell = Exchange::with_pattern(self.context.clone(), self.pattern);
        shell.set_exchange_id(id);
        std::mem::replace(self, shell)
    }
}
