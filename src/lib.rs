//! # dbus-marshal
//!
//! The type-system core of a D-Bus binding, built on top of the `serde`
//! framework: a signature compiler for host types, a signature parser, a
//! marshaller between host values and the generic wire [`Value`] tree, and
//! error reply messages with typed error recovery.
//!
//! Byte-level encoding is left to the transport; this crate stops at the
//! decoded [`Value`] tree.
//!
//! ## Type mapping
//!
//! | Rust / serde type | Wire type |
//! |-------------------|-----------|
//! | `u8`              | `y` byte |
//! | `bool`            | `b` boolean |
//! | `i16`, `u16`      | `n`, `q` |
//! | `i32`, `u32`      | `i`, `u` |
//! | `i64`, `u64`      | `x`, `t` |
//! | `f64`             | `d` double |
//! | `&str`, `String`  | `s` string |
//! | [`ObjectPath`], [`RemoteObject`] | `o` object path |
//! | [`TypeSignature`] | `g` signature |
//! | [`Variant`], unbound generics | `v` variant |
//! | `Vec<T>`, `[T; N]`, `&[u8]` | `aT` array |
//! | `HashMap<K, V>`, `BTreeMap<K, V>` | `a{KV}` dict (basic `K` only) |
//! | Struct with a [`DBusType`] layout, tuple in a struct slot | `(...)` struct |
//! | Argument tuple `(A, B, ..)` | one argument per element |
//! | [`WireSerializable`](serializable::WireSerializable) | one argument per wire field |
//!
//! ## Example
//!
//! ```rust
//! use dbus_marshal::types::{DBusType, FieldSpec, HostType, StructDef};
//! use dbus_marshal::{Context, Value, from_values, marshal};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Track {
//!     title: String,
//!     length: u32,
//! }
//!
//! impl DBusType for Track {
//!     fn host_type() -> HostType {
//!         HostType::structure(StructDef::new("Track", vec![
//!             FieldSpec::at("title", 0, String::host_type()),
//!             FieldSpec::at("length", 1, u32::host_type()),
//!         ]))
//!     }
//! }
//!
//! let track = Track { title: "Intro".into(), length: 93 };
//!
//! // Compile the signature and marshal the arguments
//! let (signature, body) = marshal(&(7u32, &track)).unwrap();
//! assert_eq!(signature, "u(su)");
//! assert_eq!(body[0], Value::UInt32(7));
//!
//! // Demarshal them back
//! let (n, decoded): (u32, Track) = from_values(&body, &Context::new()).unwrap();
//! assert_eq!((n, decoded), (7, track));
//! ```

pub mod config;
pub mod de;
pub mod error;
pub mod message;
pub mod object;
pub mod remote_error;
pub mod ser;
pub mod serializable;
pub mod signature;
pub mod types;
pub mod value;

pub use config::MarshalConfig;
pub use de::{Context, Deserializer, from_value, from_values};
pub use error::{Error, ErrorKind, Result};
pub use message::ErrorReply;
pub use object::{ExportedObjects, ObjectPath, ObjectRegistry, RemoteObject};
pub use remote_error::{ErrorRegistry, ExecutionError};
pub use ser::{Serializer, marshal, to_value, to_values};
pub use signature::{TypeDescriptor, TypeSignature, parse_signature};
pub use types::{DBusType, compile, signature_of};
pub use value::{Value, Variant};

pub use serde::{Deserialize, Serialize};

// Newtype-struct names the marshaller and demarshaller intercept to route
// special types through serde.
pub(crate) const OBJECT_PATH_TOKEN: &str = "$dbus_marshal::private::ObjectPath";
pub(crate) const SIGNATURE_TOKEN: &str = "$dbus_marshal::private::Signature";
pub(crate) const VARIANT_TOKEN: &str = "$dbus_marshal::private::Variant";
pub(crate) const REMOTE_OBJECT_TOKEN: &str = "$dbus_marshal::private::RemoteObject";
pub(crate) const SERIALIZABLE_TOKEN: &str = "$dbus_marshal::private::Serializable";
