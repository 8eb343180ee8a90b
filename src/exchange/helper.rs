//! Free functions for common exchange manipulations: copying, result
//! propagation, failure handling and repository-aware variable access.

use super::{Exchange, ExchangePropertyKey};
use crate::constants::headers;
use crate::error::{SupportError, SupportResult};
use crate::message::{Body, Message};
use crate::utils::convert_value;
use crate::variable::{parse_variable_name, VariableRepository, VariableTarget};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Copy an exchange and correlate the copy to it.
///
/// The copy gets a new exchange id and the `CorrelationId` property set to
/// the id of `exchange`. With `handover` the on-completions move to the copy.
/// Unless `use_same_message_id` is set the copy's in message gets a fresh id.
pub fn create_correlated_copy(
    exchange: &mut Exchange,
    handover: bool,
    use_same_message_id: bool,
) -> Exchange {
    let id = exchange.exchange_id().to_string();
    let mut copy = exchange.copy();
    if !use_same_message_id {
        copy.in_message_mut().set_message_id(None);
    }
    copy.set_property_by_key(ExchangePropertyKey::CorrelationId, id);
    if handover {
        exchange
            .extension_mut()
            .handover_completions(copy.extension_mut());
    }
    copy
}

/// Copy an exchange, optionally keeping its exchange id
pub fn create_copy(exchange: &Exchange, preserve_exchange_id: bool) -> Exchange {
    let mut copy = exchange.copy();
    if preserve_exchange_id {
        copy.set_exchange_id(exchange.exchange_id());
    }
    copy
}

/// Copy the results of `source` onto `target`.
///
/// An out message on the source becomes the target's out message. Without one
/// the source's in message is treated as the result: it becomes the out of an
/// out-capable target, otherwise it replaces the target's in message and any
/// stale out is dropped.
pub fn copy_results(target: &mut Exchange, source: &Exchange) {
    do_copy_results(target, source, false);
}

/// Like [`copy_results`] but the target's pattern decides which message
/// receives the source's out message.
pub fn copy_results_preserve_pattern(target: &mut Exchange, source: &Exchange) {
    do_copy_results(target, source, true);
}

fn do_copy_results(target: &mut Exchange, source: &Exchange, preserve_pattern: bool) {
    if let Some(out) = source.out_message() {
        if preserve_pattern {
            result_message_mut(target).copy_from(out);
        } else {
            target.out_message_mut().copy_from(out);
        }
    } else if target.pattern().is_out_capable() {
        target.out_message_mut().copy_from(source.in_message());
    } else {
        target.in_message_mut().copy_from(source.in_message());
        target.set_out(None);
    }

    for (name, value) in source.all_properties() {
        target.set_property(name, value);
    }
    for (name, value) in source.variables() {
        target.set_variable(name.clone(), value.clone());
    }

    target.set_route_stop(source.is_route_stop());
    target.set_rollback_only(source.is_rollback_only());
    target.set_rollback_only_last(source.is_rollback_only_last());
    target.set_exception(source.exception().cloned());
}

/// The message a result should be written to given the exchange pattern
pub fn result_message_mut(exchange: &mut Exchange) -> &mut Message {
    if exchange.pattern().is_out_capable() {
        exchange.out_message_mut()
    } else {
        exchange.in_message_mut()
    }
}

pub fn is_out_capable(exchange: &Exchange) -> bool {
    exchange.pattern().is_out_capable()
}

/// Make the out message, if any, the new in message
pub fn prepare_out_to_in(exchange: &mut Exchange) {
    if let Some(out) = exchange.take_out() {
        exchange.set_in(out);
    }
}

/// Mark the failure as handled and clear the exception
pub fn set_failure_handled(exchange: &mut Exchange) {
    exchange.extension_mut().set_failure_handled(true);
    exchange.set_exception(None);
}

pub fn is_failure_handled(exchange: &Exchange) -> bool {
    exchange.extension().is_failure_handled()
}

pub fn is_redelivered(exchange: &Exchange) -> bool {
    let flagged = exchange
        .in_message()
        .header(headers::REDELIVERED)
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let counted = exchange
        .property_by_key(ExchangePropertyKey::RedeliveryCounter)
        .and_then(Value::as_u64)
        .is_some_and(|n| n > 0);
    flagged || counted
}

/// Message and exchange ids formatted for log output
pub fn log_ids(exchange: &Exchange) -> String {
    let message_id = exchange
        .message()
        .existing_message_id()
        .unwrap_or("n/a")
        .to_string();
    format!(
        "(MessageId: {} on ExchangeId: {})",
        message_id,
        exchange.exchange_id()
    )
}

/// The result body, or the failure if the exchange failed
pub fn extract_result_body(exchange: &Exchange) -> SupportResult<Body> {
    if let Some(error) = exchange.exception() {
        return Err(error.clone());
    }
    Ok(exchange.message().body().clone())
}

/// Set the body on the message matching the exchange pattern.
///
/// An out-capable exchange without an out message gets one copied from the
/// in message first, so headers carry over.
pub fn set_in_out_body_pattern_aware(exchange: &mut Exchange, body: impl Into<Body>) {
    if exchange.has_out() {
        exchange.out_message_mut().set_body(body);
    } else if exchange.pattern().is_out_capable() {
        let mut out = exchange.in_message().clone();
        out.set_body(body);
        exchange.set_out(Some(out));
    } else {
        exchange.in_message_mut().set_body(body);
    }
}

fn current_route_id(exchange: &Exchange) -> Option<String> {
    exchange
        .extension()
        .at_route_id()
        .or_else(|| exchange.from_route_id())
        .map(str::to_string)
}

fn resolve_target(
    exchange: &Exchange,
    name: &str,
) -> SupportResult<(VariableTarget, Option<Arc<dyn VariableRepository>>)> {
    let route_id = current_route_id(exchange);
    let target = parse_variable_name(name, route_id.as_deref());
    let repository = match &target.repository {
        Some(id) => Some(
            exchange
                .context()
                .variable_repositories()
                .get(id)
                .ok_or_else(|| SupportError::NoSuchVariableRepository { id: id.clone() })?,
        ),
        None => None,
    };
    Ok((target, repository))
}

/// Set a variable, honouring a `repo:` prefix on the name
pub fn set_variable(exchange: &mut Exchange, name: &str, value: impl Into<Value>) -> SupportResult<()> {
    let (target, repository) = resolve_target(exchange, name)?;
    match repository {
        Some(repository) => repository.set(&target.name, value.into()),
        None => {
            exchange.set_variable(target.name, value);
            Ok(())
        }
    }
}

/// Get a variable, honouring a `repo:` prefix on the name
pub fn get_variable(exchange: &Exchange, name: &str) -> SupportResult<Option<Value>> {
    let (target, repository) = resolve_target(exchange, name)?;
    Ok(match repository {
        Some(repository) => repository.get(&target.name),
        None => exchange.variable(&target.name).cloned(),
    })
}

/// Store a message as variables: the body under `name` and each header under
/// `header:{name}.{header}`.
pub fn set_variable_from_message(
    exchange: &mut Exchange,
    name: &str,
    message: &Message,
) -> SupportResult<()> {
    let (target, repository) = resolve_target(exchange, name)?;
    let body = message.body().as_json();
    match &repository {
        Some(repository) => repository.set(&target.name, body)?,
        None => exchange.set_variable(target.name.clone(), body),
    }

    for (header, value) in message.headers().iter() {
        let key = format!("header:{}.{}", target.name, header);
        match &repository {
            Some(repository) => repository.set(&key, value.clone())?,
            None => exchange.set_variable(key, value.clone()),
        }
    }
    Ok(())
}

/// Typed in-message header that must be present and non-null
pub fn mandatory_header<T: DeserializeOwned>(exchange: &Exchange, name: &str) -> SupportResult<T> {
    match exchange.in_message().header(name) {
        Some(value) if !value.is_null() => convert_value(name, value),
        _ => Err(SupportError::NoSuchHeader {
            exchange_id: exchange.exchange_id().to_string(),
            name: name.to_string(),
        }),
    }
}

/// Typed exchange property that must be present and non-null
pub fn mandatory_property<T: DeserializeOwned>(exchange: &Exchange, name: &str) -> SupportResult<T> {
    match exchange.property(name) {
        Some(value) if !value.is_null() => convert_value(name, value),
        _ => Err(SupportError::NoSuchProperty {
            exchange_id: exchange.exchange_id().to_string(),
            name: name.to_string(),
        }),
    }
}

/// Look `name` up as an in-message header, then as an exchange property
pub fn header_or_property<T: DeserializeOwned>(
    exchange: &Exchange,
    name: &str,
) -> SupportResult<Option<T>> {
    let value = exchange
        .in_message()
        .header(name)
        .filter(|value| !value.is_null())
        .or_else(|| exchange.property(name).filter(|value| !value.is_null()));
    value.map(|value| convert_value(name, value)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{ExchangeContext, ExchangePattern};
    use crate::variable::VariableRepository;
    use serde_json::json;

    fn exchange(pattern: ExchangePattern) -> Exchange {
        Exchange::with_pattern(ExchangeContext::default(), pattern)
    }

    #[test]
    fn test_correlated_copy() {
        let mut source = exchange(ExchangePattern::InOnly);
        source.in_message_mut().set_message_id(Some("m1".into()));
        let source_id = source.exchange_id().to_string();

        let copy = create_correlated_copy(&mut source, false, false);
        assert_ne!(copy.exchange_id(), source_id);
        assert_eq!(
            copy.property_by_key(ExchangePropertyKey::CorrelationId),
            Some(&json!(source_id))
        );
        assert_eq!(copy.in_message().existing_message_id(), None);

        let same_message = create_correlated_copy(&mut source, false, true);
        assert_eq!(same_message.in_message().existing_message_id(), Some("m1"));
    }

    #[test]
    fn test_create_copy_preserving_id() {
        let source = exchange(ExchangePattern::InOnly);
        assert_eq!(create_copy(&source, true).exchange_id(), source.exchange_id());
        assert_ne!(create_copy(&source, false).exchange_id(), source.exchange_id());
    }

    #[test]
    fn test_copy_results_in_only_replaces_in() {
        let mut target = exchange(ExchangePattern::InOnly);
        target.out_message_mut().set_body("stale");
        let mut source = exchange(ExchangePattern::InOnly);
        source.in_message_mut().set_body("result");
        source.set_property("p", 1);

        copy_results(&mut target, &source);
        assert!(!target.has_out());
        assert_eq!(target.in_message().body_as_text().as_deref(), Some("result"));
        assert_eq!(target.property("p"), Some(&json!(1)));
    }

    #[test]
    fn test_copy_results_in_out_sets_out() {
        let mut target = exchange(ExchangePattern::InOut);
        let mut source = exchange(ExchangePattern::InOnly);
        source.in_message_mut().set_body("reply");
        source.set_exception(Some(SupportError::InvalidState("x".into())));

        copy_results(&mut target, &source);
        assert_eq!(
            target.out_message().and_then(|m| m.body_as_text()).as_deref(),
            Some("reply")
        );
        assert!(target.is_failed());
    }

    #[test]
    fn test_copy_results_preserve_pattern() {
        let mut target = exchange(ExchangePattern::InOnly);
        let mut source = exchange(ExchangePattern::InOut);
        source.out_message_mut().set_body("out");

        copy_results_preserve_pattern(&mut target, &source);
        assert!(!target.has_out());
        assert_eq!(target.in_message().body_as_text().as_deref(), Some("out"));
    }

    #[test]
    fn test_prepare_out_to_in() {
        let mut ex = exchange(ExchangePattern::InOut);
        ex.out_message_mut().set_body("out");
        prepare_out_to_in(&mut ex);
        assert!(!ex.has_out());
        assert_eq!(ex.in_message().body_as_text().as_deref(), Some("out"));
    }

    #[test]
    fn test_failure_handled_clears_exception() {
        let mut ex = exchange(ExchangePattern::InOnly);
        ex.set_exception(Some(SupportError::InvalidState("x".into())));
        set_failure_handled(&mut ex);
        assert!(is_failure_handled(&ex));
        assert!(!ex.is_failed());
        assert!(ex.property_by_key(ExchangePropertyKey::ExceptionCaught).is_some());
    }

    #[test]
    fn test_redelivered_detection() {
        let mut ex = exchange(ExchangePattern::InOnly);
        assert!(!is_redelivered(&ex));
        ex.in_message_mut().set_header(headers::REDELIVERED, true);
        assert!(is_redelivered(&ex));

        let mut counted = exchange(ExchangePattern::InOnly);
        counted.set_property_by_key(ExchangePropertyKey::RedeliveryCounter, 2);
        assert!(is_redelivered(&counted));
    }

    #[test]
    fn test_extract_result_body() {
        let mut ex = exchange(ExchangePattern::InOut);
        ex.out_message_mut().set_body("done");
        assert_eq!(extract_result_body(&ex).unwrap(), Body::Text("done".into()));

        ex.set_exception(Some(SupportError::InvalidState("x".into())));
        assert!(extract_result_body(&ex).is_err());
    }

    #[test]
    fn test_pattern_aware_body() {
        let mut in_out = exchange(ExchangePattern::InOut);
        in_out.in_message_mut().set_header("h", 1);
        set_in_out_body_pattern_aware(&mut in_out, "reply");
        let out = in_out.out_message().unwrap();
        assert_eq!(out.body_as_text().as_deref(), Some("reply"));
        assert_eq!(out.header("h"), Some(&json!(1)));

        let mut in_only = exchange(ExchangePattern::InOnly);
        set_in_out_body_pattern_aware(&mut in_only, "body");
        assert!(!in_only.has_out());
    }

    #[test]
    fn test_variables_with_repositories() {
        let mut ex = exchange(ExchangePattern::InOnly);
        ex.extension_mut().set_from_route_id(Some("orders".into()));

        set_variable(&mut ex, "local", 1).unwrap();
        set_variable(&mut ex, "global:shared", 2).unwrap();
        set_variable(&mut ex, "route:count", 3).unwrap();

        assert_eq!(ex.variable("local"), Some(&json!(1)));
        assert_eq!(get_variable(&ex, "global:shared").unwrap(), Some(json!(2)));
        assert_eq!(
            ex.context().variable_repositories().route().get("orders:count"),
            Some(json!(3))
        );
        assert_eq!(get_variable(&ex, "route:count").unwrap(), Some(json!(3)));

        let err = set_variable(&mut ex, "missing:x", 1).unwrap_err();
        assert_eq!(
            err,
            SupportError::NoSuchVariableRepository { id: "missing".into() }
        );
    }

    #[test]
    fn test_variable_from_message() {
        let mut ex = exchange(ExchangePattern::InOnly);
        let mut message = Message::with_body("hello");
        message.set_header("Foo", "bar");

        set_variable_from_message(&mut ex, "reply", &message).unwrap();
        assert_eq!(ex.variable("reply"), Some(&json!("hello")));
        assert_eq!(ex.variable("header:reply.Foo"), Some(&json!("bar")));
    }

    #[test]
    fn test_mandatory_header_converts_or_fails() {
        let mut exchange = exchange(ExchangePattern::InOnly);
        exchange.in_message_mut().set_header("Retries", "3");
        exchange.in_message_mut().set_header("gone", Value::Null);

        assert_eq!(mandatory_header::<u32>(&exchange, "retries").unwrap(), 3);
        assert!(matches!(
            mandatory_header::<u32>(&exchange, "gone"),
            Err(SupportError::NoSuchHeader { ref name, .. }) if name == "gone"
        ));
        assert!(matches!(
            mandatory_header::<u32>(&exchange, "missing"),
            Err(SupportError::NoSuchHeader { .. })
        ));
        exchange.in_message_mut().set_header("retries", "lots");
        assert!(matches!(
            mandatory_header::<u32>(&exchange, "retries"),
            Err(SupportError::TypeConversion { .. })
        ));
    }

    #[test]
    fn test_mandatory_property() {
        let mut exchange = exchange(ExchangePattern::InOnly);
        exchange.set_property("enabled", true);
        assert!(mandatory_property::<bool>(&exchange, "enabled").unwrap());

        let err = mandatory_property::<bool>(&exchange, "other").unwrap_err();
        assert!(err.to_string().contains(exchange.exchange_id()));
        assert!(matches!(err, SupportError::NoSuchProperty { .. }));
    }

    #[test]
    fn test_header_wins_over_property() {
        let mut exchange = exchange(ExchangePattern::InOnly);
        exchange.set_property("region", "eu");
        assert_eq!(
            header_or_property::<String>(&exchange, "region").unwrap().as_deref(),
            Some("eu")
        );

        exchange.in_message_mut().set_header("region", "us");
        assert_eq!(
            header_or_property::<String>(&exchange, "region").unwrap().as_deref(),
            Some("us")
        );
        assert_eq!(header_or_property::<String>(&exchange, "zone").unwrap(), None);
    }
}
