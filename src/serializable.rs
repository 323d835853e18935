//! Serde helpers for user types that travel as several wire values.
//!
//! A [`WireSerializable`] type converts itself to a tuple of wire-mappable
//! values and back. As a top-level argument it contributes one argument per
//! tuple element; it cannot be nested inside a container.
//!
//! # Usage
//!
//! ```rust
//! use dbus_marshal::serializable::{self, WireSerializable};
//! use dbus_marshal::types::{DBusType, HostType};
//! use dbus_marshal::{Context, Value, from_values, marshal};
//! use serde::{Deserialize, Deserializer, Serialize, Serializer};
//!
//! #[derive(Debug, PartialEq)]
//! struct Version {
//!     major: u16,
//!     minor: u16,
//! }
//!
//! impl WireSerializable for Version {
//!     const NAME: &'static str = "Version";
//!     type Wire = (u16, u16);
//!
//!     fn to_wire(&self) -> (u16, u16) {
//!         (self.major, self.minor)
//!     }
//!
//!     fn from_wire((major, minor): (u16, u16)) -> dbus_marshal::Result<Self> {
//!         Ok(Version { major, minor })
//!     }
//! }
//!
//! impl DBusType for Version {
//!     fn host_type() -> HostType {
//!         serializable::host_type::<Self>()
//!     }
//! }
//!
//! impl Serialize for Version {
//!     fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
//!         serializable::serialize(self, s)
//!     }
//! }
//!
//! impl<'de> Deserialize<'de> for Version {
//!     fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
//!         serializable::deserialize(d)
//!     }
//! }
//!
//! let (signature, body) = marshal(&("node", Version { major: 1, minor: 4 })).unwrap();
//! assert_eq!(signature, "sqq");
//! assert_eq!(body[1..], [Value::UInt16(1), Value::UInt16(4)]);
//!
//! let (name, version): (String, Version) = from_values(&body, &Context::new()).unwrap();
//! assert_eq!(name, "node");
//! assert_eq!(version, Version { major: 1, minor: 4 });
//! ```

use crate::error::Result;
use crate::types::{DBusType, HostType, SerializableDef};
use serde::de::value::SeqAccessDeserializer;
use serde::de::{self, DeserializeOwned, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// A type that decomposes itself into wire values.
pub trait WireSerializable: Sized {
    /// Name used in signatures and error messages.
    const NAME: &'static str;

    /// The wire form: a tuple with one element per wire value, or a single
    /// wire-mappable type.
    type Wire: Serialize + DeserializeOwned + DBusType;

    fn to_wire(&self) -> Self::Wire;

    fn from_wire(wire: Self::Wire) -> Result<Self>;
}

/// The [`HostType`] of a serializable type; use it to implement
/// [`DBusType`].
pub fn host_type<T: WireSerializable>() -> HostType {
    HostType::serializable(SerializableDef::new(T::NAME, wire_types::<T>()))
}

fn wire_types<T: WireSerializable>() -> Vec<HostType> {
    match T::Wire::host_type() {
        HostType::Tuple(items) => items,
        other => vec![other],
    }
}

fn wire_is_tuple<T: WireSerializable>() -> bool {
    matches!(T::Wire::host_type(), HostType::Tuple(_))
}

// ── serde functions ────────────────────────────────────────────────────────

/// Serialize `value` as its wire tuple.
pub fn serialize<T, S>(value: &T, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    T: WireSerializable,
    S: serde::Serializer,
{
    // The token tells the marshaller to splice the tuple into the argument
    // list instead of building a struct.
    let wire = value.to_wire();
    if wire_is_tuple::<T>() {
        serializer.serialize_newtype_struct(crate::SERIALIZABLE_TOKEN, &wire)
    } else {
        serializer.serialize_newtype_struct(crate::SERIALIZABLE_TOKEN, &(wire,))
    }
}

/// Deserialize a value from its wire tuple.
pub fn deserialize<'de, T, D>(deserializer: D) -> std::result::Result<T, D::Error>
where
    T: WireSerializable,
    D: serde::Deserializer<'de>,
{
    deserializer.deserialize_newtype_struct(
        crate::SERIALIZABLE_TOKEN,
        SerializableVisitor::<T>(PhantomData),
    )
}

struct SerializableVisitor<T>(PhantomData<T>);

impl<'de, T: WireSerializable> Visitor<'de> for SerializableVisitor<T> {
    type Value = T;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "the wire values of {}", T::NAME)
    }

    fn visit_newtype_struct<D: serde::Deserializer<'de>>(
        self,
        de: D,
    ) -> std::result::Result<T, D::Error> {
        de.deserialize_tuple_struct(T::NAME, wire_types::<T>().len(), self)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> std::result::Result<T, A::Error> {
        let wire = if wire_is_tuple::<T>() {
            T::Wire::deserialize(SeqAccessDeserializer::new(seq))?
        } else {
            <(T::Wire,)>::deserialize(SeqAccessDeserializer::new(seq))?.0
        };
        T::from_wire(wire).map_err(de::Error::custom)
    }
}
