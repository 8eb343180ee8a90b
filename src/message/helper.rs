//! Message helpers: header and body copying, log-safe body rendering and
//! JSON dumps of a message with its exchange.

use super::{Body, Message};
use crate::constants::defaults;
use crate::exchange::Exchange;
use crate::utils::json_type_name;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Copy every header of `source` to `target`. Existing target headers are
/// only replaced with `override_existing`; a null header counts as absent.
pub fn copy_headers(source: &Message, target: &mut Message, override_existing: bool) {
    if !source.has_headers() {
        return;
    }
    for (name, value) in source.headers().iter() {
        let absent = target.header(name).map_or(true, Value::is_null);
        if absent || override_existing {
            target.set_header(name, value.clone());
        }
    }
}

/// Copy the body and its data type from `source` to `target`
pub fn copy_body(source: &Message, target: &mut Message) {
    target.set_body(source.body().clone());
    target.set_data_type(source.data_type().cloned());
}

/// Render the body for a log line, prefixed with `Message: `
pub fn extract_body_for_logging(message: &Message) -> String {
    extract_body_for_logging_with(message, Some("Message: "), defaults::LOG_BODY_MAX_CHARS)
}

/// Render the body for a log line.
///
/// `max_chars` clips longer bodies; `0` disables clipping and a negative
/// value hides the body entirely.
pub fn extract_body_for_logging_with(
    message: &Message,
    prepend: Option<&str>,
    max_chars: i64,
) -> String {
    let value = extract_value_for_logging(message.body(), max_chars);
    match prepend {
        Some(prefix) => format!("{prefix}{value}"),
        None => value,
    }
}

fn extract_value_for_logging(body: &Body, max_chars: i64) -> String {
    if max_chars < 0 {
        return "[Body is not logged]".to_string();
    }
    let text = match body {
        Body::Empty => return "[Body is null]".to_string(),
        Body::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => return format!("[Body is binary: {} bytes]", bytes.len()),
        },
        other => other.as_text().unwrap_or_default(),
    };
    clip(text, max_chars)
}

fn clip(text: String, max_chars: i64) -> String {
    let limit = usize::try_from(max_chars).unwrap_or(usize::MAX);
    let total = text.chars().count();
    if limit == 0 || total <= limit {
        return text;
    }
    let clipped: String = text.chars().take(limit).collect();
    format!("{clipped}... [Body clipped after {limit} chars, total length is {total}]")
}

/// What [`dump_as_json`] includes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonDumpOptions {
    pub include_body: bool,
    pub include_properties: bool,
    pub include_variables: bool,
    /// Clip text bodies after this many chars, `0` for no limit
    pub max_chars: i64,
    pub pretty: bool,
}

impl Default for JsonDumpOptions {
    fn default() -> Self {
        Self {
            include_body: true,
            include_properties: false,
            include_variables: false,
            max_chars: defaults::DUMP_BODY_MAX_CHARS,
            pretty: true,
        }
    }
}

/// Dump the current message of `exchange` as JSON text
pub fn dump_as_json(exchange: &Exchange, options: &JsonDumpOptions) -> String {
    let dump = dump_as_json_value(exchange, exchange.message(), options);
    let rendered = if options.pretty {
        serde_json::to_string_pretty(&dump)
    } else {
        serde_json::to_string(&dump)
    };
    rendered.unwrap_or_else(|_| dump.to_string())
}

/// Dump `message`, which belongs to `exchange`, as a JSON object.
///
/// Headers, properties and variables are listed by name as
/// `{"key", "type", "value"}` entries.
pub fn dump_as_json_value(exchange: &Exchange, message: &Message, options: &JsonDumpOptions) -> Value {
    let mut dump = Map::new();
    dump.insert("exchangeId".into(), json!(exchange.exchange_id()));
    dump.insert("exchangePattern".into(), json!(exchange.pattern().to_string()));
    if let Some(message_id) = message.existing_message_id() {
        dump.insert("messageId".into(), json!(message_id));
    }

    if options.include_variables && exchange.has_variables() {
        dump.insert("exchangeVariables".into(), entries(exchange.variables()));
    }
    if options.include_properties && exchange.has_properties() {
        dump.insert("exchangeProperties".into(), entries(&exchange.all_properties()));
    }
    if message.has_headers() {
        let headers = message.headers().iter().map(|(key, value)| entry(key, value));
        dump.insert("headers".into(), Value::Array(headers.collect()));
    }
    if options.include_body {
        let value = match message.body() {
            Body::Json(value) => value.clone(),
            body => Value::String(extract_value_for_logging(body, options.max_chars)),
        };
        dump.insert(
            "body".into(),
            json!({ "type": message.body().type_name(), "value": value }),
        );
    }

    json!({ "message": Value::Object(dump) })
}

fn entries(values: &HashMap<String, Value>) -> Value {
    let sorted: BTreeMap<&String, &Value> = values.iter().collect();
    Value::Array(sorted.into_iter().map(|(key, value)| entry(key, value)).collect())
}

fn entry(key: &str, value: &Value) -> Value {
    json!({ "key": key, "type": json_type_name(value), "value": value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ExchangeContext;

    #[test]
    fn test_copy_headers_respects_override() {
        let mut source = Message::new();
        source.set_header("Color", "red");
        source.set_header("size", 3);

        let mut target = Message::new();
        target.set_header("color", "blue");
        target.set_header("empty", Value::Null);
        copy_headers(&source, &mut target, false);
        assert_eq!(target.header("COLOR"), Some(&json!("blue")));
        assert_eq!(target.header("size"), Some(&json!(3)));

        source.set_header("empty", "filled");
        copy_headers(&source, &mut target, false);
        assert_eq!(target.header("empty"), Some(&json!("filled")));

        copy_headers(&source, &mut target, true);
        assert_eq!(target.header("color"), Some(&json!("red")));
    }

    #[test]
    fn test_body_for_logging_is_clipped() {
        let message = Message::with_body("abcdefghij");
        assert_eq!(extract_body_for_logging(&message), "Message: abcdefghij");
        assert_eq!(
            extract_body_for_logging_with(&message, None, 4),
            "abcd... [Body clipped after 4 chars, total length is 10]"
        );
        assert_eq!(extract_body_for_logging_with(&message, None, 0), "abcdefghij");
        assert_eq!(
            extract_body_for_logging_with(&message, None, -1),
            "[Body is not logged]"
        );
        assert_eq!(
            extract_body_for_logging_with(&Message::new(), None, 10),
            "[Body is null]"
        );
        assert_eq!(
            extract_body_for_logging_with(&Message::with_body(vec![0xff_u8, 0xfe]), None, 10),
            "[Body is binary: 2 bytes]"
        );
    }

    #[test]
    fn test_dump_lists_sorted_headers_and_body() {
        let mut exchange = Exchange::new(ExchangeContext::default());
        exchange.set_exchange_id("ID-1");
        exchange.set_property("tenant", "acme");
        exchange.in_message_mut().set_header("b", 2);
        exchange.in_message_mut().set_header("a", "one");
        exchange.in_message_mut().set_body(json!({"order": 7}));

        let options = JsonDumpOptions {
            include_properties: true,
            pretty: false,
            ..JsonDumpOptions::default()
        };
        let dump: Value = serde_json::from_str(&dump_as_json(&exchange, &options)).unwrap();
        let message = &dump["message"];
        assert_eq!(message["exchangeId"], "ID-1");
        assert_eq!(message["exchangePattern"], "InOnly");
        assert_eq!(message["headers"][0], json!({"key": "a", "type": "string", "value": "one"}));
        assert_eq!(message["headers"][1]["key"], "b");
        assert_eq!(message["body"], json!({"type": "json", "value": {"order": 7}}));
        assert_eq!(message["exchangeProperties"][0]["key"], "tenant");
        assert!(message.get("exchangeVariables").is_none());
    }

    #[test]
    fn test_dump_without_body() {
        let mut exchange = Exchange::new(ExchangeContext::default());
        exchange.in_message_mut().set_body("secret");
        let options = JsonDumpOptions {
            include_body: false,
            ..JsonDumpOptions::default()
        };
        let dump = dump_as_json_value(&exchange, exchange.in_message(), &options);
        assert!(dump["message"].get("body").is_none());
        assert!(dump["message"].get("headers").is_none());
    }
}
