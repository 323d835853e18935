//! Value marshaller.
//!
//! The [`Serializer`] turns any `T: Serialize` into a wire [`Value`], guided
//! by the [`TypeDescriptor`] the value must satisfy.
//!
//! ## Mapping summary
//! - Integers convert between widths when the value fits the target type
//! - `f32`/`f64` -> `d`, `char`/`&str` -> `s` (or `o`/`g` when the slot says so)
//! - Sequences and byte slices -> `a` (bounded by [`MarshalConfig`])
//! - Maps -> `a{..}`; keys must marshal to basic values
//! - Structs and tuples -> `(..)`, ordered by the registered field positions
//! - Anything in a `v` slot is marshalled by its natural type and wrapped in
//!   a [`Variant`]
//! - `Some(x)` is `x`; `None` has no wire form
//! - Unit enum variants -> their name (`s` slots) or index (integer slots)

use crate::config::MarshalConfig;
use crate::error::{Error, Result};
use crate::object::ObjectPath;
use crate::signature::{PrimitiveType, TypeDescriptor, parse_signature, parse_single};
use crate::types::{DBusType, HostType, StructLayout, compile, lookup_layout};
use crate::value::{Value, Variant};
use serde::ser::{self, Impossible, Serialize};
use std::cell::Cell;
use std::sync::Arc;

static DEFAULT_CONFIG: MarshalConfig = MarshalConfig::new();
static OBJECT_PATH_TYPE: TypeDescriptor = TypeDescriptor::ObjectReference;
static SIGNATURE_TYPE: TypeDescriptor = TypeDescriptor::Signature;
static STRING_TYPE: TypeDescriptor = TypeDescriptor::Primitive(PrimitiveType::String);

// ── Public entry points ────────────────────────────────────────────────────

/// Marshal `value` as a single wire value of type `ty`.
pub fn to_value<T: Serialize + ?Sized>(value: &T, ty: &TypeDescriptor) -> Result<Value> {
    to_value_with_config(value, ty, &DEFAULT_CONFIG)
}

pub fn to_value_with_config<T: Serialize + ?Sized>(
    value: &T,
    ty: &TypeDescriptor,
    config: &MarshalConfig,
) -> Result<Value> {
    value.serialize(Serializer::with_config(ty, config))
}

/// Marshal an argument tuple against `signature`.
///
/// Each tuple element becomes one argument, except user-serializable values
/// which contribute one argument per wire field. Use `(x,)` for a single
/// argument and `()` for none.
///
/// ```rust
/// use dbus_marshal::{Value, to_values};
///
/// let values = to_values(&(7u32, "seven"), "us").unwrap();
/// assert_eq!(values, [Value::UInt32(7), Value::from("seven")]);
/// ```
pub fn to_values<T: Serialize + ?Sized>(args: &T, signature: &str) -> Result<Vec<Value>> {
    to_values_with_config(args, signature, &DEFAULT_CONFIG)
}

pub fn to_values_with_config<T: Serialize + ?Sized>(
    args: &T,
    signature: &str,
    config: &MarshalConfig,
) -> Result<Vec<Value>> {
    let (types, _) = parse_signature(signature, None)?;
    let carrier = args.serialize(Serializer {
        expected: Expected::Args(&types, true),
        config,
        splice: None,
    })?;
    match carrier {
        Value::Struct(values) => Ok(values),
        other => Ok(vec![other]),
    }
}

/// Compile the signature of `T` and marshal `args` against it.
pub fn marshal<T: Serialize + DBusType + ?Sized>(args: &T) -> Result<(String, Vec<Value>)> {
    let host = T::host_type();
    let signature = compile(&host)?.concat();
    let values = match host {
        HostType::Tuple(_) | HostType::Serializable(_) => to_values(args, &signature)?,
        _ => vec![to_value(args, &parse_single(&signature)?)?],
    };
    Ok((signature, values))
}

// ── Serializer ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Expected<'a> {
    Type(&'a TypeDescriptor),
    /// No target type: produce the value's natural wire type.
    Infer,
    /// The `(signature, value)` pair inside a variant.
    VariantBody,
    /// An argument list. The flag is set when every type must be consumed.
    Args(&'a [TypeDescriptor], bool),
}

impl Expected<'_> {
    fn name(&self) -> String {
        match self {
            Expected::Type(ty) => ty.to_string(),
            Expected::Infer => "any wire type".to_string(),
            Expected::VariantBody => "variant body".to_string(),
            Expected::Args(types, _) => format!("argument tuple {}", concat(types)),
        }
    }
}

/// Argument-list position of a value that may expand to several arguments.
#[derive(Clone, Copy)]
struct Splice<'a> {
    remaining: &'a [TypeDescriptor],
    taken: &'a Cell<bool>,
}

/// The marshaller. Produces one [`Value`] per serialized host value.
///
/// ```rust
/// use dbus_marshal::ser::Serializer;
/// use dbus_marshal::signature::parse_single;
/// use dbus_marshal::Value;
/// use serde::Serialize;
///
/// let ty = parse_single("x").unwrap();
/// let value = 42u8.serialize(Serializer::new(&ty)).unwrap();
/// assert_eq!(value, Value::Int64(42));
/// ```
#[derive(Clone, Copy)]
pub struct Serializer<'a> {
    expected: Expected<'a>,
    config: &'a MarshalConfig,
    splice: Option<Splice<'a>>,
}

impl<'a> Serializer<'a> {
    pub fn new(ty: &'a TypeDescriptor) -> Self {
        Self::with_config(ty, &DEFAULT_CONFIG)
    }

    pub fn with_config(ty: &'a TypeDescriptor, config: &'a MarshalConfig) -> Self {
        Serializer {
            expected: Expected::Type(ty),
            config,
            splice: None,
        }
    }

    fn infer(config: &'a MarshalConfig) -> Self {
        Serializer {
            expected: Expected::Infer,
            config,
            splice: None,
        }
    }

    fn child(&self, ty: &'a TypeDescriptor) -> Self {
        Self::with_config(ty, self.config)
    }

    fn mismatch(&self, found: impl std::fmt::Display) -> Error {
        Error::mismatch(self.expected.name(), found)
    }

    fn check_len(&self, len: usize) -> Result<()> {
        check_len(self.config, len)
    }

    /// Fit a naturally-typed value into the expected slot.
    fn scalar(self, natural: Value) -> Result<Value> {
        match self.expected {
            Expected::Infer => Ok(natural),
            Expected::Type(TypeDescriptor::Variant) => Ok(Value::from(Variant::new(natural))),
            Expected::Type(ty) => coerce(natural, ty),
            _ => Err(self.mismatch(natural.kind_name())),
        }
    }

    /// Serialize a value whose natural wire type is `natural` (object paths,
    /// signatures).
    fn special<T: Serialize + ?Sized>(self, natural: &'a TypeDescriptor, value: &T) -> Result<Value> {
        match self.expected {
            Expected::Type(ty) if ty == natural => value.serialize(self),
            Expected::Type(TypeDescriptor::Variant) | Expected::Infer => {
                let inner = value.serialize(self.child(natural))?;
                self.scalar(inner)
            }
            _ => Err(self.mismatch(natural)),
        }
    }

    fn wraps(&self) -> bool {
        matches!(self.expected, Expected::Type(TypeDescriptor::Variant))
    }
}

fn check_len(config: &MarshalConfig, len: usize) -> Result<()> {
    let max = config.max_array_len();
    if len > max {
        return Err(Error::ArrayTooLong { max, len });
    }
    Ok(())
}

fn concat(types: &[TypeDescriptor]) -> String {
    types.iter().map(TypeDescriptor::to_string).collect()
}

fn wrap_if(wrap: bool, value: Value) -> Value {
    if wrap {
        Value::from(Variant::new(value))
    } else {
        value
    }
}

fn coerce(natural: Value, ty: &TypeDescriptor) -> Result<Value> {
    match ty {
        TypeDescriptor::Primitive(p) if p.is_integer() => integer(natural, *p),
        _ if natural.descriptor() == *ty => Ok(natural),
        _ => Err(Error::mismatch(ty, natural.kind_name())),
    }
}

/// Convert between integer widths, rejecting values that do not fit.
fn integer(natural: Value, target: PrimitiveType) -> Result<Value> {
    let wide: i128 = match natural {
        Value::Byte(v) => v.into(),
        Value::Int16(v) => v.into(),
        Value::UInt16(v) => v.into(),
        Value::Int32(v) => v.into(),
        Value::UInt32(v) => v.into(),
        Value::Int64(v) => v.into(),
        Value::UInt64(v) => v.into(),
        other => return Err(Error::mismatch(target.code(), other.kind_name())),
    };
    let converted = match target {
        PrimitiveType::Byte => u8::try_from(wide).map(Value::Byte).ok(),
        PrimitiveType::Int16 => i16::try_from(wide).map(Value::Int16).ok(),
        PrimitiveType::UInt16 => u16::try_from(wide).map(Value::UInt16).ok(),
        PrimitiveType::Int32 => i32::try_from(wide).map(Value::Int32).ok(),
        PrimitiveType::UInt32 => u32::try_from(wide).map(Value::UInt32).ok(),
        PrimitiveType::Int64 => i64::try_from(wide).map(Value::Int64).ok(),
        PrimitiveType::UInt64 => u64::try_from(wide).map(Value::UInt64).ok(),
        _ => None,
    };
    converted.ok_or_else(|| Error::mismatch(target.code(), format!("{} (out of range)", wide)))
}

// ── serde::Serializer impl ─────────────────────────────────────────────────

impl<'a> ser::Serializer for Serializer<'a> {
    type Ok = Value;
    type Error = Error;

    type SerializeSeq = SerializeArray<'a>;
    type SerializeTuple = SerializeTuple<'a>;
    type SerializeTupleStruct = SerializeTuple<'a>;
    type SerializeTupleVariant = Impossible<Value, Error>;
    type SerializeMap = SerializeDict<'a>;
    type SerializeStruct = SerializeRecord<'a>;
    type SerializeStructVariant = Impossible<Value, Error>;

    // ── Primitives ─────────────────────────────────────────────────────────

    fn serialize_bool(self, v: bool) -> Result<Value> {
        self.scalar(Value::Boolean(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value> {
        self.scalar(Value::Int16(v.into()))
    }
    fn serialize_i16(self, v: i16) -> Result<Value> {
        self.scalar(Value::Int16(v))
    }
    fn serialize_i32(self, v: i32) -> Result<Value> {
        self.scalar(Value::Int32(v))
    }
    fn serialize_i64(self, v: i64) -> Result<Value> {
        self.scalar(Value::Int64(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Value> {
        self.scalar(Value::Byte(v))
    }
    fn serialize_u16(self, v: u16) -> Result<Value> {
        self.scalar(Value::UInt16(v))
    }
    fn serialize_u32(self, v: u32) -> Result<Value> {
        self.scalar(Value::UInt32(v))
    }
    fn serialize_u64(self, v: u64) -> Result<Value> {
        self.scalar(Value::UInt64(v))
    }

    fn serialize_f32(self, v: f32) -> Result<Value> {
        self.scalar(Value::Double(v.into()))
    }
    fn serialize_f64(self, v: f64) -> Result<Value> {
        self.scalar(Value::Double(v))
    }

    fn serialize_char(self, v: char) -> Result<Value> {
        self.serialize_str(v.encode_utf8(&mut [0u8; 4]))
    }

    /// Strings also fill `o` and `g` slots, after validation.
    fn serialize_str(self, v: &str) -> Result<Value> {
        match self.expected {
            Expected::Type(TypeDescriptor::ObjectReference) => {
                Ok(Value::ObjectPath(ObjectPath::new(v)?))
            }
            Expected::Type(TypeDescriptor::Signature) => {
                parse_signature(v, None)?;
                Ok(Value::Signature(v.to_string()))
            }
            _ => self.scalar(Value::String(v.to_string())),
        }
    }

    /// Byte slices become `ay`.
    fn serialize_bytes(self, v: &[u8]) -> Result<Value> {
        self.check_len(v.len())?;
        self.scalar(Value::Array {
            element: TypeDescriptor::Primitive(PrimitiveType::Byte),
            items: v.iter().copied().map(Value::Byte).collect(),
        })
    }

    fn serialize_none(self) -> Result<Value> {
        Err(self.mismatch("None"))
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value> {
        match self.expected {
            Expected::Args(types, _) if types.is_empty() => Ok(Value::Struct(Vec::new())),
            _ => self.scalar(Value::Struct(Vec::new())),
        }
    }
    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value> {
        self.serialize_unit()
    }

    /// Unit enum variant -> name in string slots, index in integer slots.
    fn serialize_unit_variant(
        self,
        _name: &'static str,
        variant_index: u32,
        variant: &'static str,
    ) -> Result<Value> {
        match self.expected {
            Expected::Type(TypeDescriptor::Primitive(p)) if p.is_integer() => {
                integer(Value::UInt32(variant_index), *p)
            }
            _ => self.scalar(Value::String(variant.to_string())),
        }
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<Value> {
        match name {
            crate::OBJECT_PATH_TOKEN => self.special(&OBJECT_PATH_TYPE, value),
            crate::SIGNATURE_TOKEN => self.special(&SIGNATURE_TYPE, value),
            crate::VARIANT_TOKEN => match self.expected {
                Expected::Type(TypeDescriptor::Variant) | Expected::Infer => {
                    value.serialize(Serializer {
                        expected: Expected::VariantBody,
                        config: self.config,
                        splice: None,
                    })
                }
                _ => Err(self.mismatch("variant")),
            },
            crate::SERIALIZABLE_TOKEN => match (self.splice, self.expected) {
                (Some(splice), _) => {
                    let carrier = value.serialize(Serializer {
                        expected: Expected::Args(splice.remaining, false),
                        config: self.config,
                        splice: None,
                    })?;
                    splice.taken.set(true);
                    Ok(carrier)
                }
                (None, Expected::Args(..)) => value.serialize(self),
                (None, _) => Err(Error::MultiValued),
            },
            _ => value.serialize(self),
        }
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _value: &T,
    ) -> Result<Value> {
        Err(self.mismatch(format!("enum variant {}::{}", name, variant)))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SerializeArray<'a>> {
        if let Some(len) = len {
            self.check_len(len)?;
        }
        match self.expected {
            Expected::Type(TypeDescriptor::Array(element)) => {
                Ok(SerializeArray::new(Some(&**element), false, self.config))
            }
            Expected::Type(TypeDescriptor::Variant) | Expected::Infer => {
                Ok(SerializeArray::new(None, self.wraps(), self.config))
            }
            _ => Err(self.mismatch("array")),
        }
    }

    /// Tuples fill struct slots; fixed-size arrays (`[T; N]`) fill array slots.
    fn serialize_tuple(self, len: usize) -> Result<SerializeTuple<'a>> {
        match self.expected {
            Expected::Type(TypeDescriptor::Struct(fields)) => Ok(SerializeTuple::Struct(
                SerializeStruct::new(Some(fields.as_slice()), false, self.config),
            )),
            Expected::Type(TypeDescriptor::Array(element)) => {
                self.check_len(len)?;
                Ok(SerializeTuple::Array(SerializeArray::new(
                    Some(&**element),
                    false,
                    self.config,
                )))
            }
            Expected::Type(TypeDescriptor::Variant) | Expected::Infer => Ok(SerializeTuple::Struct(
                SerializeStruct::new(None, self.wraps(), self.config),
            )),
            Expected::VariantBody if len == 2 => Ok(SerializeTuple::Variant(SerializeVariant {
                signature: None,
                value: None,
                config: self.config,
            })),
            Expected::Args(types, exact) => {
                let types = if exact {
                    types
                } else {
                    types.get(..len).ok_or_else(|| Error::ArgumentCount {
                        signature: concat(types),
                        expected: types.len(),
                        found: len,
                    })?
                };
                Ok(SerializeTuple::Args(SerializeArgs {
                    types,
                    values: Vec::with_capacity(types.len()),
                    config: self.config,
                }))
            }
            _ => Err(self.mismatch(format!("tuple of {}", len))),
        }
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SerializeTuple<'a>> {
        match self.expected {
            Expected::Args(..) => Err(self.mismatch("tuple struct")),
            _ => self.serialize_tuple(len),
        }
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(self.mismatch(format!("enum variant {}::{}", name, variant)))
    }

    fn serialize_map(self, len: Option<usize>) -> Result<SerializeDict<'a>> {
        if let Some(len) = len {
            self.check_len(len)?;
        }
        match self.expected {
            Expected::Type(TypeDescriptor::Dict(key, value)) => {
                Ok(SerializeDict::new(Some((&**key, &**value)), false, self.config))
            }
            Expected::Type(TypeDescriptor::Variant) | Expected::Infer => {
                Ok(SerializeDict::new(None, self.wraps(), self.config))
            }
            _ => Err(self.mismatch("map")),
        }
    }

    /// Structs fill struct slots by field position, or string-keyed dict
    /// slots by field name.
    fn serialize_struct(self, name: &'static str, _len: usize) -> Result<SerializeRecord<'a>> {
        match self.expected {
            Expected::Type(TypeDescriptor::Struct(fields)) => Ok(SerializeRecord::Fields(
                SerializeFields::new(name, Some(fields.as_slice()), false, self.config)?,
            )),
            Expected::Type(TypeDescriptor::Dict(key, value)) if **key == STRING_TYPE => {
                Ok(SerializeRecord::Dict(SerializeDict::new(
                    Some((&**key, &**value)),
                    false,
                    self.config,
                )))
            }
            Expected::Type(TypeDescriptor::Variant) | Expected::Infer => Ok(SerializeRecord::Fields(
                SerializeFields::new(name, None, self.wraps(), self.config)?,
            )),
            _ => Err(self.mismatch(format!("struct {}", name))),
        }
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(self.mismatch(format!("enum variant {}::{}", name, variant)))
    }
}

// ── Element typing ─────────────────────────────────────────────────────────

/// The type of one container position: fixed by the descriptor, or learned
/// from the first element when marshalling into a variant.
struct ElementType<'a> {
    fixed: Option<&'a TypeDescriptor>,
    inferred: Option<TypeDescriptor>,
}

impl<'a> ElementType<'a> {
    fn new(fixed: Option<&'a TypeDescriptor>) -> Self {
        ElementType {
            fixed,
            inferred: None,
        }
    }

    fn serialize<T: Serialize + ?Sized>(&mut self, value: &T, config: &MarshalConfig) -> Result<Value> {
        if let Some(ty) = self.fixed {
            return value.serialize(Serializer::with_config(ty, config));
        }
        if let Some(ty) = &self.inferred {
            return value.serialize(Serializer::with_config(ty, config));
        }
        let out = value.serialize(Serializer::infer(config))?;
        self.inferred = Some(out.descriptor());
        Ok(out)
    }

    fn resolve(self, what: &str) -> Result<TypeDescriptor> {
        match (self.fixed, self.inferred) {
            (Some(ty), _) => Ok(ty.clone()),
            (None, Some(ty)) => Ok(ty),
            (None, None) => Err(Error::mismatch(
                format!("{} type", what),
                "empty container in a variant",
            )),
        }
    }
}

// ── Compound serializers ───────────────────────────────────────────────────

pub struct SerializeArray<'a> {
    element: ElementType<'a>,
    items: Vec<Value>,
    wrap: bool,
    config: &'a MarshalConfig,
}

impl<'a> SerializeArray<'a> {
    fn new(element: Option<&'a TypeDescriptor>, wrap: bool, config: &'a MarshalConfig) -> Self {
        SerializeArray {
            element: ElementType::new(element),
            items: Vec::new(),
            wrap,
            config,
        }
    }

    fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let item = self.element.serialize(value, self.config)?;
        self.items.push(item);
        check_len(self.config, self.items.len())
    }

    fn finish(self) -> Result<Value> {
        let element = self.element.resolve("array element")?;
        Ok(wrap_if(
            self.wrap,
            Value::Array {
                element,
                items: self.items,
            },
        ))
    }
}

impl ser::SerializeSeq for SerializeArray<'_> {
    type Ok = Value;
    type Error = Error;
    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }
    fn end(self) -> Result<Value> {
        self.finish()
    }
}

pub struct SerializeDict<'a> {
    key: ElementType<'a>,
    value: ElementType<'a>,
    pending: Option<Value>,
    entries: Vec<(Value, Value)>,
    wrap: bool,
    config: &'a MarshalConfig,
}

impl<'a> SerializeDict<'a> {
    fn new(
        types: Option<(&'a TypeDescriptor, &'a TypeDescriptor)>,
        wrap: bool,
        config: &'a MarshalConfig,
    ) -> Self {
        SerializeDict {
            key: ElementType::new(types.map(|(k, _)| k)),
            value: ElementType::new(types.map(|(_, v)| v)),
            pending: None,
            entries: Vec::new(),
            wrap,
            config,
        }
    }
}

impl ser::SerializeMap for SerializeDict<'_> {
    type Ok = Value;
    type Error = Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<()> {
        let key = self.key.serialize(key, self.config)?;
        if !key.is_basic() {
            return Err(Error::DictKeyNotBasic(key.signature()));
        }
        self.pending = Some(key);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let key = self
            .pending
            .take()
            .ok_or_else(|| Error::Message("dict value serialized before its key".into()))?;
        let value = self.value.serialize(value, self.config)?;
        self.entries.push((key, value));
        check_len(self.config, self.entries.len())
    }

    fn end(self) -> Result<Value> {
        let key = self.key.resolve("dict key")?;
        let value = self.value.resolve("dict value")?;
        Ok(wrap_if(
            self.wrap,
            Value::Dict {
                key,
                value,
                entries: self.entries,
            },
        ))
    }
}

/// Positional struct built from a tuple.
pub struct SerializeStruct<'a> {
    fields: Option<&'a [TypeDescriptor]>,
    items: Vec<Value>,
    wrap: bool,
    config: &'a MarshalConfig,
}

impl<'a> SerializeStruct<'a> {
    fn new(fields: Option<&'a [TypeDescriptor]>, wrap: bool, config: &'a MarshalConfig) -> Self {
        SerializeStruct {
            fields,
            items: Vec::new(),
            wrap,
            config,
        }
    }

    fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let item = match self.fields {
            Some(fields) => {
                let ty = fields.get(self.items.len()).ok_or_else(|| {
                    Error::mismatch(
                        TypeDescriptor::Struct(fields.to_vec()),
                        format!("more than {} fields", fields.len()),
                    )
                })?;
                value.serialize(Serializer::with_config(ty, self.config))?
            }
            None => value.serialize(Serializer::infer(self.config))?,
        };
        self.items.push(item);
        Ok(())
    }

    fn finish(self) -> Result<Value> {
        if let Some(fields) = self.fields
            && fields.len() != self.items.len()
        {
            return Err(Error::mismatch(
                TypeDescriptor::Struct(fields.to_vec()),
                format!("{} fields", self.items.len()),
            ));
        }
        Ok(wrap_if(self.wrap, Value::Struct(self.items)))
    }
}

/// `(signature, value)` pair of an explicit [`Variant`].
pub struct SerializeVariant<'a> {
    signature: Option<TypeDescriptor>,
    value: Option<Value>,
    config: &'a MarshalConfig,
}

impl SerializeVariant<'_> {
    fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        if let Some(ty) = &self.signature {
            if self.value.is_some() {
                return Err(Error::mismatch("variant body", "more than 2 elements"));
            }
            self.value = Some(value.serialize(Serializer::with_config(ty, self.config))?);
            return Ok(());
        }
        match value.serialize(Serializer::with_config(&STRING_TYPE, self.config))? {
            Value::String(s) => {
                self.signature = Some(parse_single(&s)?);
                Ok(())
            }
            other => Err(Error::mismatch("variant signature", other.kind_name())),
        }
    }

    fn finish(self) -> Result<Value> {
        match (self.signature, self.value) {
            (Some(signature), Some(value)) => Ok(Value::from(Variant::from_parts(signature, value))),
            _ => Err(Error::mismatch("variant body", "fewer than 2 elements")),
        }
    }
}

/// An argument list.
pub struct SerializeArgs<'a> {
    types: &'a [TypeDescriptor],
    values: Vec<Value>,
    config: &'a MarshalConfig,
}

impl SerializeArgs<'_> {
    fn count_error(&self, found: usize) -> Error {
        Error::ArgumentCount {
            signature: concat(self.types),
            expected: self.types.len(),
            found,
        }
    }

    fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let pos = self.values.len();
        let Some(ty) = self.types.get(pos) else {
            return Err(self.count_error(pos + 1));
        };
        let taken = Cell::new(false);
        let out = value.serialize(Serializer {
            expected: Expected::Type(ty),
            config: self.config,
            splice: Some(Splice {
                remaining: &self.types[pos..],
                taken: &taken,
            }),
        })?;
        match out {
            Value::Struct(items) if taken.get() => self.values.extend(items),
            single => self.values.push(single),
        }
        Ok(())
    }

    fn finish(self) -> Result<Value> {
        if self.values.len() != self.types.len() {
            return Err(self.count_error(self.values.len()));
        }
        Ok(Value::Struct(self.values))
    }
}

pub enum SerializeTuple<'a> {
    Array(SerializeArray<'a>),
    Struct(SerializeStruct<'a>),
    Variant(SerializeVariant<'a>),
    Args(SerializeArgs<'a>),
}

impl SerializeTuple<'_> {
    fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        match self {
            SerializeTuple::Array(s) => s.push(value),
            SerializeTuple::Struct(s) => s.push(value),
            SerializeTuple::Variant(s) => s.push(value),
            SerializeTuple::Args(s) => s.push(value),
        }
    }

    fn finish(self) -> Result<Value> {
        match self {
            SerializeTuple::Array(s) => s.finish(),
            SerializeTuple::Struct(s) => s.finish(),
            SerializeTuple::Variant(s) => s.finish(),
            SerializeTuple::Args(s) => s.finish(),
        }
    }
}

impl ser::SerializeTuple for SerializeTuple<'_> {
    type Ok = Value;
    type Error = Error;
    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }
    fn end(self) -> Result<Value> {
        self.finish()
    }
}

impl ser::SerializeTupleStruct for SerializeTuple<'_> {
    type Ok = Value;
    type Error = Error;
    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }
    fn end(self) -> Result<Value> {
        self.finish()
    }
}

/// Named struct fields placed by their registered wire position.
pub struct SerializeFields<'a> {
    name: &'static str,
    layout: Option<Arc<StructLayout>>,
    fields: Option<&'a [TypeDescriptor]>,
    slots: Vec<Option<Value>>,
    wrap: bool,
    config: &'a MarshalConfig,
}

impl<'a> SerializeFields<'a> {
    fn new(
        name: &'static str,
        fields: Option<&'a [TypeDescriptor]>,
        wrap: bool,
        config: &'a MarshalConfig,
    ) -> Result<Self> {
        let layout = lookup_layout(name);
        let slots = match (&layout, fields) {
            (Some(layout), Some(fields)) if layout.len() != fields.len() => {
                return Err(Error::mismatch(
                    TypeDescriptor::Struct(fields.to_vec()),
                    format!("struct {} with {} positioned fields", name, layout.len()),
                ));
            }
            (Some(layout), _) => vec![None; layout.len()],
            (None, _) => Vec::new(),
        };
        Ok(SerializeFields {
            name,
            layout,
            fields,
            slots,
            wrap,
            config,
        })
    }

    fn field_serializer(&self, slot: usize) -> Result<Serializer<'a>> {
        match self.fields {
            Some(fields) => fields
                .get(slot)
                .map(|ty| Serializer::with_config(ty, self.config))
                .ok_or_else(|| {
                    Error::mismatch(
                        TypeDescriptor::Struct(fields.to_vec()),
                        format!("struct {} with more fields", self.name),
                    )
                }),
            None => Ok(Serializer::infer(self.config)),
        }
    }
}

impl ser::SerializeStruct for SerializeFields<'_> {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()> {
        match &self.layout {
            Some(layout) => {
                // Fields without a position stay off the wire.
                let Some(slot) = layout.slot_of(key) else {
                    return Ok(());
                };
                let item = value.serialize(self.field_serializer(slot)?)?;
                self.slots[slot] = Some(item);
            }
            None => {
                let item = value.serialize(self.field_serializer(self.slots.len())?)?;
                self.slots.push(Some(item));
            }
        }
        Ok(())
    }

    fn end(self) -> Result<Value> {
        let mut items = Vec::with_capacity(self.slots.len());
        for (slot, item) in self.slots.into_iter().enumerate() {
            match item {
                Some(item) => items.push(item),
                None => {
                    let field = self
                        .layout
                        .as_ref()
                        .and_then(|l| l.field_names().nth(slot).map(str::to_string))
                        .unwrap_or_default();
                    return Err(Error::mismatch(
                        format!("field {} of {}", field, self.name),
                        "nothing",
                    ));
                }
            }
        }
        if let Some(fields) = self.fields
            && fields.len() != items.len()
        {
            return Err(Error::mismatch(
                TypeDescriptor::Struct(fields.to_vec()),
                format!("struct {} with {} fields", self.name, items.len()),
            ));
        }
        Ok(wrap_if(self.wrap, Value::Struct(items)))
    }
}

pub enum SerializeRecord<'a> {
    Fields(SerializeFields<'a>),
    Dict(SerializeDict<'a>),
}

impl ser::SerializeStruct for SerializeRecord<'_> {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()> {
        match self {
            SerializeRecord::Fields(s) => ser::SerializeStruct::serialize_field(s, key, value),
            SerializeRecord::Dict(s) => ser::SerializeMap::serialize_entry(s, key, value),
        }
    }

    fn end(self) -> Result<Value> {
        match self {
            SerializeRecord::Fields(s) => ser::SerializeStruct::end(s),
            SerializeRecord::Dict(s) => ser::SerializeMap::end(s),
        }
    }
}
