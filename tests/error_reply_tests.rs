use dbus_marshal::message::{ErrorReply, HeaderField, MessageType, RequestHeader};
use dbus_marshal::remote_error::{BoxError, ErrorRegistry, ExecutionError, NESTED_SEPARATOR};
use dbus_marshal::{Error, ErrorKind, Value};
use std::collections::BTreeMap;
use std::error::Error as _;

#[derive(Debug, thiserror::Error)]
#[error("quota exceeded for {0}")]
struct QuotaExceeded(String);

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct BarError(String);

fn failed_reply(name: &str, body: &(&str,)) -> ErrorReply {
    ErrorReply::new("app.bar", name, 1, Some("s"), body).unwrap()
}

// ── Construction ───────────────────────────────────────────────────────────

#[test]
fn test_reply_without_signature_has_no_body() {
    let reply = ErrorReply::without_body("app.bar", "org.Err.Failed", 7).unwrap();
    assert_eq!(reply.message_type(), MessageType::Error);
    assert_eq!(reply.destination(), Some("app.bar"));
    assert_eq!(reply.error_name(), Some("org.Err.Failed"));
    assert_eq!(reply.reply_serial(), Some(7));
    assert_eq!(reply.signature(), None);
    assert!(reply.header(HeaderField::Signature).is_none());
    assert!(reply.body().is_empty());
}

#[test]
fn test_empty_signature_means_no_body() {
    let reply = ErrorReply::new("app.bar", "org.Err.Failed", 7, Some(""), &()).unwrap();
    assert_eq!(reply.signature(), None);
    assert!(reply.header(HeaderField::Signature).is_none());
    assert!(reply.body().is_empty());
}

#[test]
fn test_missing_destination_or_name() {
    let err = ErrorReply::without_body("", "org.Err.Failed", 7).unwrap_err();
    assert_eq!(err, Error::ErrorFormat("destination"));
    assert_eq!(err.kind(), ErrorKind::Format);

    let err = ErrorReply::without_body("app.bar", "", 7).unwrap_err();
    assert_eq!(err, Error::ErrorFormat("error name"));
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_reply_with_body() {
    let reply =
        ErrorReply::new("app.bar", "org.Err.Full", 3, Some("si"), &("disk full", 3i32)).unwrap();
    assert_eq!(reply.signature(), Some("si"));
    assert_eq!(
        reply.header(HeaderField::Signature),
        Some(&Value::Signature("si".into()))
    );
    assert_eq!(reply.body(), [Value::from("disk full"), Value::Int32(3)]);
}

#[test]
fn test_body_must_match_signature() {
    let err = ErrorReply::new("app.bar", "org.Err.Full", 3, Some("s"), &("a", 1u32)).unwrap_err();
    assert!(matches!(err, Error::ArgumentCount { .. }));
    assert_eq!(err.kind(), ErrorKind::Marshal);

    let err = ErrorReply::new("app.bar", "org.Err.Full", 3, Some("a{"), &()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Signature);
}

#[test]
fn test_reply_from_failure() {
    let request = RequestHeader::new(Some(":1.42"), 99);
    let reply = ErrorReply::from_failure(&request, &QuotaExceeded("alice".into())).unwrap();

    let name = reply.error_name().unwrap();
    assert!(name.ends_with(".QuotaExceeded"), "{name}");
    assert!(!name.contains("::"));
    assert_eq!(reply.destination(), Some(":1.42"));
    assert_eq!(reply.reply_serial(), Some(99));
    assert_eq!(reply.signature(), Some("s"));
    assert_eq!(reply.body(), [Value::from("quota exceeded for alice")]);
}

#[test]
fn test_failure_without_sender_is_format_error() {
    let request = RequestHeader::new(None, 1);
    let err = ErrorReply::from_failure(&request, &QuotaExceeded("bob".into())).unwrap_err();
    assert_eq!(err, Error::ErrorFormat("destination"));
}

#[test]
fn test_reply_from_parts() {
    let mut headers = BTreeMap::new();
    headers.insert(HeaderField::ErrorName, Value::from("org.Err.Remote"));
    headers.insert(HeaderField::ReplySerial, Value::UInt32(5));
    let reply = ErrorReply::from_parts(headers, vec![Value::from("gone")]).unwrap();
    assert_eq!(reply.error_name(), Some("org.Err.Remote"));
    assert_eq!(reply.destination(), None);
    assert_eq!(reply.message(), "gone");

    let err = ErrorReply::from_parts(BTreeMap::new(), vec![]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_header_field_codes() {
    assert_eq!(HeaderField::ErrorName.code(), 4);
    assert_eq!(HeaderField::ReplySerial.code(), 5);
    assert_eq!(HeaderField::from_code(8), Some(HeaderField::Signature));
    assert_eq!(HeaderField::from_code(0), None);
}

#[test]
fn test_message_joins_body_values() {
    let reply = ErrorReply::new("app.bar", "org.Err.X", 1, Some("sus"), &("a", 2u32, "c ")).unwrap();
    assert_eq!(reply.message(), "a 2 c");
    let empty = ErrorReply::without_body("app.bar", "org.Err.X", 1).unwrap();
    assert_eq!(empty.message(), "");
}

// ── Recovery ───────────────────────────────────────────────────────────────

#[test]
fn test_recovery_fallback_keeps_identifier() {
    let registry = ErrorRegistry::new();
    let reply = failed_reply("com.example.Foo.BarError", &("boom",));

    let err = reply.recover_typed_error(&registry);
    assert!(!err.is_typed());
    assert_eq!(err.error_type(), "com.example.Foo.BarError");
    assert_eq!(err.message(), "boom");
    assert_eq!(err.to_string(), "boom");
    assert!(err.source().is_none());
}

#[test]
fn test_recovery_builds_registered_type() {
    let registry = ErrorRegistry::new();
    registry.register("com.example.Foo.BarError", BarError);
    let reply = failed_reply("com.example.Foo.BarError", &("boom",));

    let err = reply.recover_typed_error(&registry);
    assert!(err.is_typed());
    assert_eq!(err.error_type(), "com.example.Foo.BarError");
    assert_eq!(err.downcast_ref::<BarError>().unwrap().0, "boom");
    assert!(err.downcast_ref::<QuotaExceeded>().is_none());
    assert!(err.source().is_some());
}

#[test]
fn test_recovery_tries_nested_spellings() {
    let registry = ErrorRegistry::new();
    let nested = format!("com.example.Foo{}BarError", NESTED_SEPARATOR);
    registry.register(nested, BarError);

    let err = registry.recover("com.example.Foo.BarError", "nested".into());
    assert!(err.is_typed());
    assert_eq!(err.error_type(), "com.example.Foo.BarError");
}

#[test]
fn test_recovery_stops_before_last_separator() {
    let registry = ErrorRegistry::new();
    registry.register("com$example", BarError);
    assert!(!registry.recover("com.example", String::new()).is_typed());
}

#[test]
fn test_failing_constructor_falls_back() {
    let registry = ErrorRegistry::new();
    registry.register_fallible("org.Err.Picky", |message| {
        if message.is_empty() {
            Err(BoxError::from("empty message"))
        } else {
            Ok(Box::new(BarError(message)) as BoxError)
        }
    });

    let err = registry.recover("org.Err.Picky", String::new());
    assert!(!err.is_typed());
    assert_eq!(err.error_type(), "org.Err.Picky");

    assert!(registry.recover("org.Err.Picky", "fine".into()).is_typed());
}

#[test]
fn test_panicking_constructor_falls_back() {
    let registry = ErrorRegistry::new();
    registry.register("org.Err.Explodes", |_message: String| -> BarError {
        panic!("constructor failure")
    });

    let err = registry.recover("org.Err.Explodes", "x".into());
    assert!(!err.is_typed());
    assert_eq!(err.error_type(), "org.Err.Explodes");
    assert_eq!(err.message(), "x");
}

#[test]
fn test_recovery_is_repeatable() {
    let registry = ErrorRegistry::new();
    registry.register("org.Err.Again", BarError);
    let reply = failed_reply("org.Err.Again", &("once",));

    let first = reply.recover_typed_error(&registry);
    let second = reply.recover_typed_error(&registry);
    assert_eq!(first.message(), second.message());
    assert!(first.is_typed() && second.is_typed());
    assert_eq!(reply.body(), [Value::from("once")]);
}

#[test]
fn test_into_result_uses_global_registry() {
    ErrorRegistry::global().register("org.example.Tests.GlobalOnly", BarError);
    let reply = failed_reply("org.example.Tests.GlobalOnly", &("global",));

    let err: ExecutionError = reply.into_result::<()>().unwrap_err();
    assert!(err.is_typed());
    assert_eq!(err.downcast_ref::<BarError>().unwrap().0, "global");
}

#[test]
fn test_registry_membership() {
    let registry = ErrorRegistry::new();
    registry.register("org.Err.Temp", BarError);
    assert!(registry.contains("org.Err.Temp"));
    assert!(registry.unregister("org.Err.Temp"));
    assert!(!registry.contains("org.Err.Temp"));
    assert!(!registry.unregister("org.Err.Temp"));
}
