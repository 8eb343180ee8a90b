//! # Message Model
//!
//! A [`Message`] is the unit of data flowing through an exchange: a [`Body`]
//! with optional [`DataType`] information, a case-insensitive header map,
//! a lazily assigned message id and an optional timestamp.
//!
//! Messages are plain values; exchanges own their in and out messages and
//! copying an exchange deep-copies them.

mod body;
mod headers;
pub mod helper;

pub use body::{Body, DataType};
pub use headers::Headers;

use crate::id_generator::UuidGenerator;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    body: Body,
    data_type: Option<DataType>,
    headers: Headers,
    message_id: Option<String>,
    timestamp: Option<i64>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(body: impl Into<Body>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    /// Replace the body; any data type information is dropped
    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
        self.data_type = None;
    }

    pub fn set_body_with_type(&mut self, body: impl Into<Body>, data_type: DataType) {
        self.body = body.into();
        self.data_type = Some(data_type);
    }

    pub fn take_body(&mut self) -> Body {
        self.data_type = None;
        std::mem::take(&mut self.body)
    }

    pub fn body_as_text(&self) -> Option<String> {
        self.body.as_text()
    }

    pub fn data_type(&self) -> Option<&DataType> {
        self.data_type.as_ref()
    }

    pub fn set_data_type(&mut self, data_type: Option<DataType>) {
        self.data_type = data_type;
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn header(&self, name: &str) -> Option<&Value> {
        self.headers.get(name)
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.headers.set(name, value);
    }

    pub fn remove_header(&mut self, name: &str) -> Option<Value> {
        self.headers.remove(name)
    }

    /// Remove headers matching `pattern`, keeping those matching any of `excludes`
    pub fn remove_headers(&mut self, pattern: &str, excludes: &[&str]) -> bool {
        self.headers.remove_matching(pattern, excludes)
    }

    pub fn has_headers(&self) -> bool {
        !self.headers.is_empty()
    }

    /// The message id, generating one on first access
    pub fn message_id(&mut self, generator: &dyn UuidGenerator) -> &str {
        self.message_id
            .get_or_insert_with(|| generator.generate_uuid())
            .as_str()
    }

    /// The message id if one has been assigned
    pub fn existing_message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn set_message_id(&mut self, id: Option<String>) {
        self.message_id = id;
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: Option<i64>) {
        self.timestamp = timestamp;
    }

    /// Make this message a copy of `other`
    pub fn copy_from(&mut self, other: &Message) {
        self.clone_from(other);
    }

    /// Copy everything from `other` except the body, which is replaced by `body`
    pub fn copy_from_with_new_body(&mut self, other: &Message, body: impl Into<Body>) {
        self.headers = other.headers.clone();
        self.message_id = other.message_id.clone();
        self.timestamp = other.timestamp;
        self.body = body.into();
        self.data_type = None;
    }

    /// Clear the message so it can be reused by a pooled exchange
    pub fn reset(&mut self) {
        self.body = Body::Empty;
        self.data_type = None;
        self.headers.clear();
        self.message_id = None;
        self.timestamp = None;
    }
}
