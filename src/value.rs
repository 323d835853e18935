//! The generic wire value tree.
//!
//! A [`Value`] is what the transport decodes from (or encodes to) message
//! bytes: every node knows its own wire type, so containers carry their
//! element types even when empty.

use crate::de::{Context, from_value};
use crate::error::Result;
use crate::object::ObjectPath;
use crate::signature::{PrimitiveType, TypeDescriptor, TypeSignature, parse_single};
use serde::de::{self, DeserializeOwned, DeserializeSeed, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq, SerializeTuple};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A decoded wire value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Byte(u8),
    Boolean(bool),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    String(String),
    ObjectPath(ObjectPath),
    Signature(String),
    Variant(Box<Variant>),
    Array {
        element: TypeDescriptor,
        items: Vec<Value>,
    },
    Dict {
        key: TypeDescriptor,
        value: TypeDescriptor,
        entries: Vec<(Value, Value)>,
    },
    Struct(Vec<Value>),
}

impl Value {
    /// The wire type of this value.
    pub fn descriptor(&self) -> TypeDescriptor {
        match self {
            Value::Byte(_) => TypeDescriptor::Primitive(PrimitiveType::Byte),
            Value::Boolean(_) => TypeDescriptor::Primitive(PrimitiveType::Boolean),
            Value::Int16(_) => TypeDescriptor::Primitive(PrimitiveType::Int16),
            Value::UInt16(_) => TypeDescriptor::Primitive(PrimitiveType::UInt16),
            Value::Int32(_) => TypeDescriptor::Primitive(PrimitiveType::Int32),
            Value::UInt32(_) => TypeDescriptor::Primitive(PrimitiveType::UInt32),
            Value::Int64(_) => TypeDescriptor::Primitive(PrimitiveType::Int64),
            Value::UInt64(_) => TypeDescriptor::Primitive(PrimitiveType::UInt64),
            Value::Double(_) => TypeDescriptor::Primitive(PrimitiveType::Double),
            Value::String(_) => TypeDescriptor::Primitive(PrimitiveType::String),
            Value::ObjectPath(_) => TypeDescriptor::ObjectReference,
            Value::Signature(_) => TypeDescriptor::Signature,
            Value::Variant(_) => TypeDescriptor::Variant,
            Value::Array { element, .. } => TypeDescriptor::array(element.clone()),
            Value::Dict { key, value, .. } => TypeDescriptor::dict(key.clone(), value.clone()),
            Value::Struct(fields) => {
                TypeDescriptor::Struct(fields.iter().map(Value::descriptor).collect())
            }
        }
    }

    pub fn signature(&self) -> String {
        self.descriptor().to_string()
    }

    pub fn is_basic(&self) -> bool {
        self.descriptor().is_basic()
    }

    /// Short name of the value's shape, for error messages.
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Value::Byte(_) => "byte",
            Value::Boolean(_) => "boolean",
            Value::Int16(_) => "int16",
            Value::UInt16(_) => "uint16",
            Value::Int32(_) => "int32",
            Value::UInt32(_) => "uint32",
            Value::Int64(_) => "int64",
            Value::UInt64(_) => "uint64",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::ObjectPath(_) => "object path",
            Value::Signature(_) => "signature",
            Value::Variant(_) => "variant",
            Value::Array { .. } => "array",
            Value::Dict { .. } => "dict",
            Value::Struct(_) => "struct",
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    u8 => Byte,
    bool => Boolean,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f64 => Double,
    String => String,
    ObjectPath => ObjectPath,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Variant> for Value {
    fn from(v: Variant) -> Self {
        Value::Variant(Box::new(v))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Byte(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::UInt16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::UInt32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::UInt64(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::String(v) | Value::Signature(v) => f.write_str(v),
            Value::ObjectPath(p) => write!(f, "{}", p),
            Value::Variant(v) => write!(f, "{}", v.value),
            Value::Array { items, .. } => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Dict { entries, .. } => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Struct(fields) => {
                write!(f, "(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Byte(v) => serializer.serialize_u8(*v),
            Value::Boolean(v) => serializer.serialize_bool(*v),
            Value::Int16(v) => serializer.serialize_i16(*v),
            Value::UInt16(v) => serializer.serialize_u16(*v),
            Value::Int32(v) => serializer.serialize_i32(*v),
            Value::UInt32(v) => serializer.serialize_u32(*v),
            Value::Int64(v) => serializer.serialize_i64(*v),
            Value::UInt64(v) => serializer.serialize_u64(*v),
            Value::Double(v) => serializer.serialize_f64(*v),
            Value::String(v) => serializer.serialize_str(v),
            Value::ObjectPath(p) => p.serialize(serializer),
            Value::Signature(s) => {
                serializer.serialize_newtype_struct(crate::SIGNATURE_TOKEN, s.as_str())
            }
            Value::Variant(v) => v.serialize(serializer),
            Value::Array { items, .. } => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Dict { entries, .. } => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Value::Struct(fields) => {
                let mut tuple = serializer.serialize_tuple(fields.len())?;
                for field in fields {
                    tuple.serialize_element(field)?;
                }
                tuple.end()
            }
        }
    }
}

// ── Variant ────────────────────────────────────────────────────────────────

/// A self-describing value: a wire type tag plus a value of that type.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    signature: TypeDescriptor,
    value: Value,
}

impl Variant {
    /// Wrap `value`, tagging it with its own wire type.
    pub fn new(value: impl Into<Value>) -> Self {
        let value = value.into();
        Variant {
            signature: value.descriptor(),
            value,
        }
    }

    /// Caller guarantees `value` is of type `signature`.
    pub(crate) fn from_parts(signature: TypeDescriptor, value: Value) -> Self {
        Variant { signature, value }
    }

    pub fn signature(&self) -> &TypeDescriptor {
        &self.signature
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Demarshal the payload into a host type.
    pub fn get<T: DeserializeOwned>(&self) -> Result<T> {
        from_value(&self.value, &Context::new())
    }
}

impl Serialize for Variant {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(
            crate::VARIANT_TOKEN,
            &(self.signature.to_string(), &self.value),
        )
    }
}

impl<'de> Deserialize<'de> for Variant {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_newtype_struct(crate::VARIANT_TOKEN, VariantVisitor)
    }
}

struct VariantVisitor;

impl<'de> Visitor<'de> for VariantVisitor {
    type Value = Variant;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a variant (signature, value)")
    }

    fn visit_newtype_struct<D: Deserializer<'de>>(self, de: D) -> std::result::Result<Variant, D::Error> {
        de.deserialize_tuple(2, self)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Variant, A::Error> {
        let signature: String = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let signature = parse_single(&signature).map_err(de::Error::custom)?;
        let value = seq
            .next_element_seed(ValueSeed(&signature))?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
        Ok(Variant { signature, value })
    }
}

// ── ValueSeed: descriptor-directed reconstruction of a Value ───────────────

/// Rebuilds a [`Value`] of a known wire type from any deserializer.
pub(crate) struct ValueSeed<'a>(pub &'a TypeDescriptor);

impl<'de> DeserializeSeed<'de> for ValueSeed<'_> {
    type Value = Value;

    fn deserialize<D: Deserializer<'de>>(self, d: D) -> std::result::Result<Value, D::Error> {
        match self.0 {
            TypeDescriptor::Primitive(p) => match p {
                PrimitiveType::Byte => u8::deserialize(d).map(Value::Byte),
                PrimitiveType::Boolean => bool::deserialize(d).map(Value::Boolean),
                PrimitiveType::Int16 => i16::deserialize(d).map(Value::Int16),
                PrimitiveType::UInt16 => u16::deserialize(d).map(Value::UInt16),
                PrimitiveType::Int32 => i32::deserialize(d).map(Value::Int32),
                PrimitiveType::UInt32 => u32::deserialize(d).map(Value::UInt32),
                PrimitiveType::Int64 => i64::deserialize(d).map(Value::Int64),
                PrimitiveType::UInt64 => u64::deserialize(d).map(Value::UInt64),
                PrimitiveType::Double => f64::deserialize(d).map(Value::Double),
                PrimitiveType::String => String::deserialize(d).map(Value::String),
            },
            TypeDescriptor::ObjectReference => ObjectPath::deserialize(d).map(Value::ObjectPath),
            TypeDescriptor::Signature => {
                TypeSignature::deserialize(d).map(|s| Value::Signature(s.to_string()))
            }
            TypeDescriptor::Variant => Variant::deserialize(d).map(Value::from),
            TypeDescriptor::Array(element) => d.deserialize_seq(ArrayVisitor(element)),
            TypeDescriptor::Dict(key, value) => d.deserialize_map(DictVisitor(key, value)),
            TypeDescriptor::Struct(fields) => {
                d.deserialize_tuple(fields.len(), StructVisitor(fields))
            }
        }
    }
}

struct ArrayVisitor<'a>(&'a TypeDescriptor);

impl<'de> Visitor<'de> for ArrayVisitor<'_> {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "an array of {}", self.0)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element_seed(ValueSeed(self.0))? {
            items.push(item);
        }
        Ok(Value::Array {
            element: self.0.clone(),
            items,
        })
    }
}

struct DictVisitor<'a>(&'a TypeDescriptor, &'a TypeDescriptor);

impl<'de> Visitor<'de> for DictVisitor<'_> {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a dict of {} to {}", self.0, self.1)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Value, A::Error> {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some(k) = map.next_key_seed(ValueSeed(self.0))? {
            let v = map.next_value_seed(ValueSeed(self.1))?;
            entries.push((k, v));
        }
        Ok(Value::Dict {
            key: self.0.clone(),
            value: self.1.clone(),
            entries,
        })
    }
}

struct StructVisitor<'a>(&'a [TypeDescriptor]);

impl<'de> Visitor<'de> for StructVisitor<'_> {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a struct of {} fields", self.0.len())
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Value, A::Error> {
        let mut fields = Vec::with_capacity(self.0.len());
        for (i, ty) in self.0.iter().enumerate() {
            let field = seq
                .next_element_seed(ValueSeed(ty))?
                .ok_or_else(|| de::Error::invalid_length(i, &self))?;
            fields.push(field);
        }
        Ok(Value::Struct(fields))
    }
}
