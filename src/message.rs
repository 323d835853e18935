//! Error reply messages.
//!
//! An [`ErrorReply`] answers a method call with a failure: it names the error
//! with a dotted identifier, addresses the caller, references the serial of
//! the call it answers and optionally carries a marshalled body.

use crate::config::MarshalConfig;
use crate::error::{Error, Result};
use crate::remote_error::{ErrorRegistry, ExecutionError};
use crate::ser::to_values_with_config;
use crate::value::Value;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Message header field codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum HeaderField {
    Path = 1,
    Interface = 2,
    Member = 3,
    ErrorName = 4,
    ReplySerial = 5,
    Destination = 6,
    Sender = 7,
    Signature = 8,
}

impl HeaderField {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => HeaderField::Path,
            2 => HeaderField::Interface,
            3 => HeaderField::Member,
            4 => HeaderField::ErrorName,
            5 => HeaderField::ReplySerial,
            6 => HeaderField::Destination,
            7 => HeaderField::Sender,
            8 => HeaderField::Signature,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    MethodCall = 1,
    MethodReturn = 2,
    Error = 3,
    Signal = 4,
}

/// The parts of an incoming call an error reply needs.
pub trait Request {
    /// Unique name of the calling peer.
    fn sender(&self) -> Option<&str>;

    fn serial(&self) -> u32;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    sender: Option<String>,
    serial: u32,
}

impl RequestHeader {
    pub fn new(sender: Option<&str>, serial: u32) -> Self {
        RequestHeader {
            sender: sender.map(str::to_string),
            serial,
        }
    }
}

impl Request for RequestHeader {
    fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    fn serial(&self) -> u32 {
        self.serial
    }
}

/// Dotted error identifier for a host error type: the fully qualified type
/// path with generic arguments dropped and `::` replaced by `.`.
///
/// ```rust
/// use dbus_marshal::message::error_name_of;
///
/// struct Rejected<T>(T);
///
/// let name = error_name_of::<Rejected<u8>>();
/// assert!(name.ends_with(".Rejected"));
/// assert!(!name.contains("::"));
/// ```
pub fn error_name_of<E: ?Sized>() -> String {
    let full = std::any::type_name::<E>();
    let path = full.split('<').next().unwrap_or(full);
    path.replace("::", ".")
}

/// An immutable error reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReply {
    headers: BTreeMap<HeaderField, Value>,
    body: Vec<Value>,
}

impl ErrorReply {
    /// Build an error reply. With a non-empty `signature`, `args` (a tuple,
    /// one element per argument) is marshalled against it as the body;
    /// without one the reply has no body and `args` is ignored.
    ///
    /// ```rust
    /// use dbus_marshal::message::ErrorReply;
    ///
    /// let reply = ErrorReply::new(":1.7", "org.example.Error.Busy", 12, Some("su"), &("retry", 5u32))
    ///     .unwrap();
    /// assert_eq!(reply.signature(), Some("su"));
    /// assert_eq!(reply.body().len(), 2);
    /// ```
    pub fn new<T: Serialize + ?Sized>(
        destination: &str,
        error_name: &str,
        reply_serial: u32,
        signature: Option<&str>,
        args: &T,
    ) -> Result<Self> {
        Self::with_config(
            destination,
            error_name,
            reply_serial,
            signature,
            args,
            &MarshalConfig::default(),
        )
    }

    pub fn with_config<T: Serialize + ?Sized>(
        destination: &str,
        error_name: &str,
        reply_serial: u32,
        signature: Option<&str>,
        args: &T,
        config: &MarshalConfig,
    ) -> Result<Self> {
        if destination.is_empty() {
            return Err(Error::ErrorFormat("destination"));
        }
        if error_name.is_empty() {
            return Err(Error::ErrorFormat("error name"));
        }

        let mut headers = BTreeMap::new();
        headers.insert(HeaderField::ErrorName, Value::from(error_name));
        headers.insert(HeaderField::Destination, Value::from(destination));
        headers.insert(HeaderField::ReplySerial, Value::UInt32(reply_serial));

        let body = match signature.filter(|s| !s.is_empty()) {
            Some(signature) => {
                let body = to_values_with_config(args, signature, config)?;
                headers.insert(HeaderField::Signature, Value::Signature(signature.to_string()));
                body
            }
            None => Vec::new(),
        };

        log::trace!(
            "error reply {} to {} for serial {} ({} body values)",
            error_name,
            destination,
            reply_serial,
            body.len()
        );
        Ok(ErrorReply { headers, body })
    }

    /// An error reply without a body.
    pub fn without_body(destination: &str, error_name: &str, reply_serial: u32) -> Result<Self> {
        Self::new(destination, error_name, reply_serial, None, &())
    }

    /// Answer `request` with `failure`. The identifier comes from the
    /// failure's type, the body is its message as a single string.
    pub fn from_failure<R, E>(request: &R, failure: &E) -> Result<Self>
    where
        R: Request + ?Sized,
        E: std::error::Error + ?Sized,
    {
        Self::new(
            request.sender().unwrap_or_default(),
            &error_name_of::<E>(),
            request.serial(),
            Some("s"),
            &(failure.to_string(),),
        )
    }

    /// Rebuild a received error reply from its decoded headers and body.
    pub fn from_parts(headers: BTreeMap<HeaderField, Value>, body: Vec<Value>) -> Result<Self> {
        match headers.get(&HeaderField::ErrorName) {
            Some(Value::String(name)) if !name.is_empty() => Ok(ErrorReply { headers, body }),
            _ => Err(Error::ErrorFormat("error name")),
        }
    }

    pub fn message_type(&self) -> MessageType {
        MessageType::Error
    }

    pub fn header(&self, field: HeaderField) -> Option<&Value> {
        self.headers.get(&field)
    }

    pub fn headers(&self) -> impl Iterator<Item = (HeaderField, &Value)> {
        self.headers.iter().map(|(field, value)| (*field, value))
    }

    fn string_header(&self, field: HeaderField) -> Option<&str> {
        match self.headers.get(&field)? {
            Value::String(s) | Value::Signature(s) => Some(s),
            _ => None,
        }
    }

    pub fn error_name(&self) -> Option<&str> {
        self.string_header(HeaderField::ErrorName)
    }

    pub fn destination(&self) -> Option<&str> {
        self.string_header(HeaderField::Destination)
    }

    pub fn signature(&self) -> Option<&str> {
        self.string_header(HeaderField::Signature)
    }

    pub fn reply_serial(&self) -> Option<u32> {
        match self.headers.get(&HeaderField::ReplySerial)? {
            Value::UInt32(serial) => Some(*serial),
            _ => None,
        }
    }

    pub fn body(&self) -> &[Value] {
        &self.body
    }

    /// The body values joined by single spaces.
    pub fn message(&self) -> String {
        let joined: Vec<String> = self.body.iter().map(Value::to_string).collect();
        joined.join(" ").trim().to_string()
    }

    /// Rebuild the host error this reply carries, using `registry` to find
    /// a typed constructor for the identifier. Never fails.
    pub fn recover_typed_error(&self, registry: &ErrorRegistry) -> ExecutionError {
        registry.recover(self.error_name().unwrap_or_default(), self.message())
    }

    /// `Err` with the recovered error, using the global registry.
    pub fn into_result<T>(self) -> std::result::Result<T, ExecutionError> {
        Err(self.recover_typed_error(ErrorRegistry::global()))
    }
}

impl fmt::Display for ErrorReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_name().unwrap_or_default(), self.message())
    }
}
