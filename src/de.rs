//! Value demarshaller.
//!
//! A [`Deserializer`] walks a decoded [`Value`] and feeds any
//! `T: Deserialize` from it.
//!
//! Notes:
//! - A variant is transparent: asking for anything other than a
//!   [`Variant`](crate::Variant) reads the variant's payload
//! - Integers widen or narrow to the requested width when the value fits
//! - Structs are read in registered field-position order, or declaration
//!   order when no layout is registered; a string-keyed dict also fills a
//!   struct by field name
//! - Enums read from a variant name (`s`) or index (integers)
//! - Object paths resolve to [`RemoteObject`](crate::RemoteObject)s through
//!   the [`Context`]

use crate::error::{Error, Result};
use crate::object::{ExportedObjects, ObjectPath, RemoteObject};
use crate::types::lookup_layout;
use crate::value::Value;
use serde::de::value::{SeqDeserializer, StrDeserializer, StringDeserializer, U32Deserializer};
use serde::de::{
    self, Deserialize, DeserializeSeed, IntoDeserializer, MapAccess, SeqAccess, Visitor,
};
use std::slice;

/// Where demarshalled values came from: the sending peer and the
/// connection's exported objects.
#[derive(Clone, Copy, Default)]
pub struct Context<'a> {
    peer: Option<&'a str>,
    objects: Option<&'a dyn ExportedObjects>,
}

impl<'a> Context<'a> {
    pub const fn new() -> Self {
        Context {
            peer: None,
            objects: None,
        }
    }

    pub fn with_peer(mut self, peer: &'a str) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn with_objects(mut self, objects: &'a dyn ExportedObjects) -> Self {
        self.objects = Some(objects);
        self
    }

    pub fn peer(&self) -> Option<&'a str> {
        self.peer
    }

    /// Look up the object exported at `path` for the sending peer.
    pub fn resolve(&self, path: &ObjectPath) -> Result<RemoteObject> {
        let peer = self.peer.unwrap_or_default();
        match self.objects.and_then(|o| o.exported_object(peer, path)) {
            Some(object) => {
                log::trace!("resolved {} for peer {:?} to {}", path, peer, object.interface());
                Ok(object)
            }
            None => Err(Error::UnknownObject {
                peer: peer.to_string(),
                path: path.to_string(),
            }),
        }
    }
}

// ── Public entry points ────────────────────────────────────────────────────

/// Demarshal a single value.
pub fn from_value<'a, T: Deserialize<'a>>(value: &'a Value, ctx: &'a Context<'a>) -> Result<T> {
    T::deserialize(Deserializer::new(value, ctx))
}

/// Demarshal a message body into a host argument tuple.
///
/// `T` is usually a tuple with one element per argument; user-serializable
/// elements consume one value per wire field. A non-tuple `T` reads exactly
/// one value and `()` reads none. Every value must be consumed.
///
/// ```rust
/// use dbus_marshal::{Context, Value, from_values};
///
/// let body = [Value::UInt32(7), Value::from("seven")];
/// let (n, name): (u64, String) = from_values(&body, &Context::new()).unwrap();
/// assert_eq!((n, name.as_str()), (7, "seven"));
/// ```
pub fn from_values<'a, T: Deserialize<'a>>(values: &'a [Value], ctx: &'a Context<'a>) -> Result<T> {
    let mut cursor = ArgCursor {
        values,
        pos: 0,
        ctx,
    };
    let out = T::deserialize(ArgDeserializer {
        cursor: &mut cursor,
        mode: ArgMode::Top,
    })?;
    if cursor.pos != values.len() {
        return Err(Error::ArgumentCount {
            signature: values.iter().map(Value::signature).collect(),
            expected: cursor.pos,
            found: values.len(),
        });
    }
    Ok(out)
}

// ── Deserializer ───────────────────────────────────────────────────────────

/// Deserializer over one wire value.
pub struct Deserializer<'a> {
    value: &'a Value,
    ctx: &'a Context<'a>,
}

impl<'a> Deserializer<'a> {
    pub fn new(value: &'a Value, ctx: &'a Context<'a>) -> Self {
        Deserializer { value, ctx }
    }

    /// The value with any variant wrappers removed.
    fn payload(&self) -> &'a Value {
        let mut value = self.value;
        while let Value::Variant(v) = value {
            value = v.value();
        }
        value
    }

    fn mismatch(&self, expected: &str) -> Error {
        let found = self.payload();
        Error::mismatch(expected, format!("{} {}", found.kind_name(), found))
    }

    /// Items of a struct or array, checked to hold at least `expected`.
    fn aggregate(&self, type_name: &str, expected: usize) -> Result<&'a [Value]> {
        let items = match self.payload() {
            Value::Struct(items) | Value::Array { items, .. } => items.as_slice(),
            _ => return Err(self.mismatch(type_name)),
        };
        if items.len() < expected {
            return Err(Error::NotEnoughElements {
                type_name: type_name.to_string(),
                remaining: items.len(),
                expected,
            });
        }
        if items.len() > expected {
            return Err(self.mismatch(type_name));
        }
        Ok(items)
    }
}

impl<'de> de::Deserializer<'de> for Deserializer<'de> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.payload() {
            Value::Byte(v) => visitor.visit_u8(*v),
            Value::Boolean(v) => visitor.visit_bool(*v),
            Value::Int16(v) => visitor.visit_i16(*v),
            Value::UInt16(v) => visitor.visit_u16(*v),
            Value::Int32(v) => visitor.visit_i32(*v),
            Value::UInt32(v) => visitor.visit_u32(*v),
            Value::Int64(v) => visitor.visit_i64(*v),
            Value::UInt64(v) => visitor.visit_u64(*v),
            Value::Double(v) => visitor.visit_f64(*v),
            Value::String(s) | Value::Signature(s) => visitor.visit_borrowed_str(s),
            Value::ObjectPath(p) => visitor.visit_borrowed_str(p.as_str()),
            Value::Array { items, .. } | Value::Struct(items) => {
                visitor.visit_seq(Items::new(items, self.ctx))
            }
            Value::Dict { entries, .. } => visitor.visit_map(Entries::new(entries, self.ctx)),
            // payload() strips every wrapper
            Value::Variant(_) => Err(self.mismatch("unwrapped value")),
        }
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        identifier
    }

    /// `ay` reads as bytes; strings read as their UTF-8 bytes.
    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.payload() {
            Value::String(s) => visitor.visit_borrowed_bytes(s.as_bytes()),
            Value::Array { items, .. } => {
                let bytes = items
                    .iter()
                    .map(|item| match item {
                        Value::Byte(b) => Ok(*b),
                        other => Err(Error::mismatch("byte", other.kind_name())),
                    })
                    .collect::<Result<Vec<u8>>>()?;
                visitor.visit_byte_buf(bytes)
            }
            _ => Err(self.mismatch("byte array")),
        }
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_bytes(visitor)
    }

    /// The wire has no null; a present value is always `Some`.
    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_some(self)
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.payload() {
            Value::Struct(items) if items.is_empty() => visitor.visit_unit(),
            _ => Err(self.mismatch("()")),
        }
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        match name {
            crate::VARIANT_TOKEN => visitor.visit_newtype_struct(VariantBody {
                value: self.value,
                ctx: self.ctx,
            }),
            crate::REMOTE_OBJECT_TOKEN => {
                let path = match self.payload() {
                    Value::ObjectPath(path) => path.clone(),
                    Value::String(s) => ObjectPath::new(s.as_str())?,
                    _ => return Err(self.mismatch("object path")),
                };
                let object = self.ctx.resolve(&path)?;
                let parts = vec![
                    object.peer().to_string(),
                    object.path().to_string(),
                    object.interface().to_string(),
                ];
                visitor.visit_newtype_struct(SeqDeserializer::<_, Error>::new(parts.into_iter()))
            }
            crate::SERIALIZABLE_TOKEN => Err(Error::MultiValued),
            _ => visitor.visit_newtype_struct(Deserializer::new(self.payload(), self.ctx)),
        }
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.payload() {
            Value::Array { items, .. } | Value::Struct(items) => {
                visitor.visit_seq(Items::new(items, self.ctx))
            }
            _ => Err(self.mismatch("array")),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value> {
        let items = self.aggregate(&format!("tuple of {}", len), len)?;
        visitor.visit_seq(Items::new(items, self.ctx))
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value> {
        let items = self.aggregate(name, len)?;
        visitor.visit_seq(Items::new(items, self.ctx))
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.payload() {
            Value::Dict { entries, .. } => visitor.visit_map(Entries::new(entries, self.ctx)),
            _ => Err(self.mismatch("dict")),
        }
    }

    /// Struct fields are matched to wire slots by registered position, or by
    /// declaration order when `name` has no layout.
    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self.payload() {
            Value::Struct(items) => {
                let names: Vec<String> = match lookup_layout(name) {
                    Some(layout) => layout.field_names().map(str::to_string).collect(),
                    None => fields.iter().map(|f| f.to_string()).collect(),
                };
                if items.len() < names.len() {
                    return Err(Error::NotEnoughElements {
                        type_name: name.to_string(),
                        remaining: items.len(),
                        expected: names.len(),
                    });
                }
                if items.len() > names.len() {
                    return Err(self.mismatch(name));
                }
                visitor.visit_map(Fields {
                    names: names.into_iter(),
                    items: items.iter(),
                    ctx: self.ctx,
                })
            }
            Value::Dict { entries, .. } => visitor.visit_map(Entries::new(entries, self.ctx)),
            _ => Err(self.mismatch(name)),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        let index = match self.payload() {
            Value::String(s) => {
                let access: StrDeserializer<'_, Error> = s.as_str().into_deserializer();
                return visitor.visit_enum(access);
            }
            Value::Byte(v) => u32::from(*v),
            Value::UInt16(v) => u32::from(*v),
            Value::UInt32(v) => *v,
            Value::Int16(v) => u32::try_from(*v).map_err(|_| self.mismatch(name))?,
            Value::Int32(v) => u32::try_from(*v).map_err(|_| self.mismatch(name))?,
            Value::Int64(v) => u32::try_from(*v).map_err(|_| self.mismatch(name))?,
            Value::UInt64(v) => u32::try_from(*v).map_err(|_| self.mismatch(name))?,
            _ => return Err(self.mismatch(name)),
        };
        let access: U32Deserializer<Error> = index.into_deserializer();
        visitor.visit_enum(access)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }
}

// ── Access helpers ─────────────────────────────────────────────────────────

struct Items<'a> {
    iter: slice::Iter<'a, Value>,
    ctx: &'a Context<'a>,
}

impl<'a> Items<'a> {
    fn new(items: &'a [Value], ctx: &'a Context<'a>) -> Self {
        Items {
            iter: items.iter(),
            ctx,
        }
    }
}

impl<'de> SeqAccess<'de> for Items<'de> {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        match self.iter.next() {
            Some(value) => seed.deserialize(Deserializer::new(value, self.ctx)).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct Entries<'a> {
    iter: slice::Iter<'a, (Value, Value)>,
    pending: Option<&'a Value>,
    ctx: &'a Context<'a>,
}

impl<'a> Entries<'a> {
    fn new(entries: &'a [(Value, Value)], ctx: &'a Context<'a>) -> Self {
        Entries {
            iter: entries.iter(),
            pending: None,
            ctx,
        }
    }
}

impl<'de> MapAccess<'de> for Entries<'de> {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        match self.iter.next() {
            Some((key, value)) => {
                self.pending = Some(value);
                seed.deserialize(Deserializer::new(key, self.ctx)).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        let value = self
            .pending
            .take()
            .ok_or_else(|| Error::Message("dict value requested before its key".into()))?;
        seed.deserialize(Deserializer::new(value, self.ctx))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

/// Struct slots presented as a map keyed by field name.
struct Fields<'a> {
    names: std::vec::IntoIter<String>,
    items: slice::Iter<'a, Value>,
    ctx: &'a Context<'a>,
}

impl<'de> MapAccess<'de> for Fields<'de> {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        match self.names.next() {
            Some(name) => {
                let key: StringDeserializer<Error> = name.into_deserializer();
                seed.deserialize(key).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        let value = self
            .items
            .next()
            .ok_or_else(|| Error::Message("struct field without a value".into()))?;
        seed.deserialize(Deserializer::new(value, self.ctx))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.names.len())
    }
}

/// The `(signature, value)` pair a [`Variant`](crate::Variant) reads. A
/// plain value presents itself with its own signature.
struct VariantBody<'a> {
    value: &'a Value,
    ctx: &'a Context<'a>,
}

impl<'de> de::Deserializer<'de> for VariantBody<'de> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let (signature, value) = match self.value {
            Value::Variant(v) => (v.signature().to_string(), v.value()),
            other => (other.signature(), other),
        };
        visitor.visit_seq(VariantParts {
            signature: Some(signature),
            value: Some(value),
            ctx: self.ctx,
        })
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map struct enum identifier ignored_any
    }
}

struct VariantParts<'a> {
    signature: Option<String>,
    value: Option<&'a Value>,
    ctx: &'a Context<'a>,
}

impl<'de> SeqAccess<'de> for VariantParts<'de> {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        if let Some(signature) = self.signature.take() {
            let de: StringDeserializer<Error> = signature.into_deserializer();
            return seed.deserialize(de).map(Some);
        }
        match self.value.take() {
            Some(value) => seed.deserialize(Deserializer::new(value, self.ctx)).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(usize::from(self.signature.is_some()) + usize::from(self.value.is_some()))
    }
}

// ── Argument lists ─────────────────────────────────────────────────────────

struct ArgCursor<'a> {
    values: &'a [Value],
    pos: usize,
    ctx: &'a Context<'a>,
}

impl<'a> ArgCursor<'a> {
    fn remaining(&self) -> usize {
        self.values.len() - self.pos
    }

    fn next(&mut self, type_name: &str) -> Result<&'a Value> {
        let value = self
            .values
            .get(self.pos)
            .ok_or_else(|| Error::NotEnoughElements {
                type_name: type_name.to_string(),
                remaining: 0,
                expected: 1,
            })?;
        self.pos += 1;
        Ok(value)
    }

    /// Reserve `len` values for `type_name`.
    fn reserve(&self, type_name: &str, len: usize) -> Result<()> {
        if self.remaining() < len {
            return Err(Error::NotEnoughElements {
                type_name: type_name.to_string(),
                remaining: self.remaining(),
                expected: len,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ArgMode {
    /// The whole argument list.
    Top,
    /// One element of the argument tuple.
    Element,
    /// The wire fields of a user-serializable value.
    Splice,
}

struct ArgDeserializer<'s, 'a> {
    cursor: &'s mut ArgCursor<'a>,
    mode: ArgMode,
}

impl<'s, 'a> ArgDeserializer<'s, 'a> {
    /// Read the next value on its own.
    fn single(self) -> Result<Deserializer<'a>> {
        if self.mode == ArgMode::Splice {
            return Err(Error::Message(
                "serializable types must read their wire fields as a tuple".into(),
            ));
        }
        let ctx = self.cursor.ctx;
        let value = self.cursor.next("argument")?;
        Ok(Deserializer::new(value, ctx))
    }

    fn spread<V: Visitor<'a>>(self, type_name: &str, len: usize, visitor: V) -> Result<V::Value> {
        self.cursor.reserve(type_name, len)?;
        visitor.visit_seq(ArgSeq {
            cursor: self.cursor,
            left: len,
        })
    }
}

macro_rules! single_value {
    ($($method:ident($($arg:ident: $ty:ty),*)),* $(,)?) => {
        $(
            fn $method<V: Visitor<'a>>(self, $($arg: $ty,)* visitor: V) -> Result<V::Value> {
                self.single()?.$method($($arg,)* visitor)
            }
        )*
    };
}

impl<'a> de::Deserializer<'a> for ArgDeserializer<'_, 'a> {
    type Error = Error;

    single_value! {
        deserialize_any(),
        deserialize_bool(),
        deserialize_i8(),
        deserialize_i16(),
        deserialize_i32(),
        deserialize_i64(),
        deserialize_u8(),
        deserialize_u16(),
        deserialize_u32(),
        deserialize_u64(),
        deserialize_f32(),
        deserialize_f64(),
        deserialize_char(),
        deserialize_str(),
        deserialize_string(),
        deserialize_bytes(),
        deserialize_byte_buf(),
        deserialize_option(),
        deserialize_seq(),
        deserialize_map(),
        deserialize_identifier(),
        deserialize_ignored_any(),
        deserialize_struct(name: &'static str, fields: &'static [&'static str]),
        deserialize_enum(name: &'static str, variants: &'static [&'static str]),
    }

    fn deserialize_unit<V: Visitor<'a>>(self, visitor: V) -> Result<V::Value> {
        match self.mode {
            ArgMode::Top => visitor.visit_unit(),
            _ => self.single()?.deserialize_unit(visitor),
        }
    }

    fn deserialize_unit_struct<V: Visitor<'a>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        match self.mode {
            ArgMode::Top => visitor.visit_unit(),
            _ => self.single()?.deserialize_unit_struct(name, visitor),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'a>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        match (name, self.mode) {
            (crate::SERIALIZABLE_TOKEN, ArgMode::Top | ArgMode::Element) => {
                visitor.visit_newtype_struct(ArgDeserializer {
                    cursor: self.cursor,
                    mode: ArgMode::Splice,
                })
            }
            _ => self.single()?.deserialize_newtype_struct(name, visitor),
        }
    }

    fn deserialize_tuple<V: Visitor<'a>>(self, len: usize, visitor: V) -> Result<V::Value> {
        match self.mode {
            ArgMode::Top => self.spread("argument tuple", len, visitor),
            ArgMode::Splice => self.spread("serializable", len, visitor),
            ArgMode::Element => self.single()?.deserialize_tuple(len, visitor),
        }
    }

    fn deserialize_tuple_struct<V: Visitor<'a>>(
        self,
        name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value> {
        match self.mode {
            ArgMode::Splice => self.spread(name, len, visitor),
            _ => self.single()?.deserialize_tuple_struct(name, len, visitor),
        }
    }
}

struct ArgSeq<'s, 'a> {
    cursor: &'s mut ArgCursor<'a>,
    left: usize,
}

impl<'a> SeqAccess<'a> for ArgSeq<'_, 'a> {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'a>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        if self.left == 0 {
            return Ok(None);
        }
        self.left -= 1;
        seed.deserialize(ArgDeserializer {
            cursor: &mut *self.cursor,
            mode: ArgMode::Element,
        })
        .map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.left)
    }
}
