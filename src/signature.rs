//! Wire signature grammar and parser.
//!
//! A signature is a string of single-character type codes. Containers are
//! built from three constructs:
//!
//! | Construct | Meaning |
//! |-----------|---------|
//! | `aT`      | array of `T` |
//! | `a{KV}`   | dict from basic key `K` to value `V` |
//! | `(T...)`  | struct with the listed fields |
//!
//! [`parse_signature`] turns a signature back into [`TypeDescriptor`]s.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The type-code alphabet.
pub mod code {
    pub const BYTE: char = 'y';
    pub const BOOLEAN: char = 'b';
    pub const INT16: char = 'n';
    pub const UINT16: char = 'q';
    pub const INT32: char = 'i';
    pub const UINT32: char = 'u';
    pub const INT64: char = 'x';
    pub const UINT64: char = 't';
    pub const DOUBLE: char = 'd';
    pub const STRING: char = 's';
    pub const OBJECT_PATH: char = 'o';
    pub const SIGNATURE: char = 'g';
    pub const VARIANT: char = 'v';
    pub const ARRAY: char = 'a';
    pub const DICT_OPEN: char = '{';
    pub const DICT_CLOSE: char = '}';
    pub const STRUCT_OPEN: char = '(';
    pub const STRUCT_CLOSE: char = ')';
}

/// Scalar wire types with a fixed one-character code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Byte,
    Boolean,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Double,
    String,
}

impl PrimitiveType {
    pub const fn code(self) -> char {
        match self {
            PrimitiveType::Byte => code::BYTE,
            PrimitiveType::Boolean => code::BOOLEAN,
            PrimitiveType::Int16 => code::INT16,
            PrimitiveType::UInt16 => code::UINT16,
            PrimitiveType::Int32 => code::INT32,
            PrimitiveType::UInt32 => code::UINT32,
            PrimitiveType::Int64 => code::INT64,
            PrimitiveType::UInt64 => code::UINT64,
            PrimitiveType::Double => code::DOUBLE,
            PrimitiveType::String => code::STRING,
        }
    }

    pub const fn from_code(c: char) -> Option<Self> {
        Some(match c {
            code::BYTE => PrimitiveType::Byte,
            code::BOOLEAN => PrimitiveType::Boolean,
            code::INT16 => PrimitiveType::Int16,
            code::UINT16 => PrimitiveType::UInt16,
            code::INT32 => PrimitiveType::Int32,
            code::UINT32 => PrimitiveType::UInt32,
            code::INT64 => PrimitiveType::Int64,
            code::UINT64 => PrimitiveType::UInt64,
            code::DOUBLE => PrimitiveType::Double,
            code::STRING => PrimitiveType::String,
            _ => return None,
        })
    }

    pub const fn is_integer(self) -> bool {
        !matches!(
            self,
            PrimitiveType::Boolean | PrimitiveType::Double | PrimitiveType::String
        )
    }
}

/// One parsed wire type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Primitive(PrimitiveType),
    Array(Box<TypeDescriptor>),
    Dict(Box<TypeDescriptor>, Box<TypeDescriptor>),
    Struct(Vec<TypeDescriptor>),
    Variant,
    ObjectReference,
    Signature,
}

impl TypeDescriptor {
    pub fn array(element: TypeDescriptor) -> Self {
        TypeDescriptor::Array(Box::new(element))
    }

    pub fn dict(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        TypeDescriptor::Dict(Box::new(key), Box::new(value))
    }

    /// Basic types are the ones legal as dict keys.
    pub fn is_basic(&self) -> bool {
        matches!(
            self,
            TypeDescriptor::Primitive(_)
                | TypeDescriptor::ObjectReference
                | TypeDescriptor::Signature
        )
    }

    pub fn is_container(&self) -> bool {
        !self.is_basic()
    }

    /// The signature fragment for this type.
    pub fn signature(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Primitive(p) => write!(f, "{}", p.code()),
            TypeDescriptor::Array(element) => write!(f, "{}{}", code::ARRAY, element),
            TypeDescriptor::Dict(key, value) => write!(
                f,
                "{}{}{}{}{}",
                code::ARRAY,
                code::DICT_OPEN,
                key,
                value,
                code::DICT_CLOSE
            ),
            TypeDescriptor::Struct(fields) => {
                write!(f, "{}", code::STRUCT_OPEN)?;
                for field in fields {
                    write!(f, "{}", field)?;
                }
                write!(f, "{}", code::STRUCT_CLOSE)
            }
            TypeDescriptor::Variant => write!(f, "{}", code::VARIANT),
            TypeDescriptor::ObjectReference => write!(f, "{}", code::OBJECT_PATH),
            TypeDescriptor::Signature => write!(f, "{}", code::SIGNATURE),
        }
    }
}

impl FromStr for TypeDescriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_single(s)
    }
}

// ── Parser ─────────────────────────────────────────────────────────────────

/// Parse up to `limit` top-level types from `signature` (`None` = all).
///
/// Returns the descriptors and the number of bytes consumed.
///
/// ```rust
/// use dbus_marshal::signature::{parse_signature, PrimitiveType, TypeDescriptor};
///
/// let (types, consumed) = parse_signature("a{sv}i", Some(1)).unwrap();
/// assert_eq!(consumed, 5);
/// assert_eq!(
///     types,
///     [TypeDescriptor::dict(
///         TypeDescriptor::Primitive(PrimitiveType::String),
///         TypeDescriptor::Variant,
///     )]
/// );
/// ```
pub fn parse_signature(signature: &str, limit: Option<usize>) -> Result<(Vec<TypeDescriptor>, usize)> {
    if signature.len() > MAX_SIGNATURE_LENGTH {
        return Err(Error::SignatureLimit {
            signature: signature.to_string(),
            limit: "length",
        });
    }
    let mut parser = Parser::new(signature, 0, signature.len());
    let types = parser.parse_many(limit)?;
    Ok((types, parser.pos))
}

/// Parse a signature that must hold exactly one complete type.
pub fn parse_single(signature: &str) -> Result<TypeDescriptor> {
    let (mut types, consumed) = parse_signature(signature, Some(1))?;
    if consumed < signature.len() {
        return Err(Error::UnexpectedToken {
            signature: signature.to_string(),
            position: consumed,
            found: signature[consumed..].chars().next().unwrap_or_default(),
        });
    }
    types.pop().ok_or_else(|| Error::UnterminatedSignature {
        signature: signature.to_string(),
        position: 0,
    })
}

/// Longest signature the bus accepts, in bytes.
pub const MAX_SIGNATURE_LENGTH: usize = 255;
/// Deepest array nesting the bus accepts.
pub const MAX_ARRAY_DEPTH: usize = 32;
/// Deepest struct (and dict entry) nesting the bus accepts.
pub const MAX_STRUCT_DEPTH: usize = 32;

struct Parser<'s> {
    signature: &'s str,
    bytes: &'s [u8],
    pos: usize,
    end: usize,
    arrays: usize,
    structs: usize,
}

impl<'s> Parser<'s> {
    fn new(signature: &'s str, start: usize, end: usize) -> Self {
        Parser {
            signature,
            bytes: signature.as_bytes(),
            pos: start,
            end,
            arrays: 0,
            structs: 0,
        }
    }

    fn nested(&self, start: usize, end: usize) -> Self {
        Parser {
            arrays: self.arrays,
            structs: self.structs,
            ..Parser::new(self.signature, start, end)
        }
    }

    fn enter(&mut self, arrays: usize, structs: usize) -> Result<()> {
        self.arrays += arrays;
        self.structs += structs;
        let limit = if self.arrays > MAX_ARRAY_DEPTH {
            "array nesting"
        } else if self.structs > MAX_STRUCT_DEPTH {
            "struct nesting"
        } else {
            return Ok(());
        };
        Err(Error::SignatureLimit {
            signature: self.signature.to_string(),
            limit,
        })
    }

    fn leave(&mut self, arrays: usize, structs: usize) {
        self.arrays -= arrays;
        self.structs -= structs;
    }

    fn peek(&self) -> Option<u8> {
        if self.pos < self.end {
            Some(self.bytes[self.pos])
        } else {
            None
        }
    }

    fn char_at(&self, position: usize) -> char {
        self.signature[position..].chars().next().unwrap_or_default()
    }

    fn unterminated(&self, position: usize) -> Error {
        Error::UnterminatedSignature {
            signature: self.signature.to_string(),
            position,
        }
    }

    fn unexpected(&self, position: usize) -> Error {
        Error::UnexpectedToken {
            signature: self.signature.to_string(),
            position,
            found: self.char_at(position),
        }
    }

    fn parse_many(&mut self, limit: Option<usize>) -> Result<Vec<TypeDescriptor>> {
        let mut types = Vec::new();
        while self.pos < self.end && limit.is_none_or(|l| types.len() < l) {
            types.push(self.parse_one()?);
        }
        Ok(types)
    }

    fn parse_one(&mut self) -> Result<TypeDescriptor> {
        let start = self.pos;
        let b = self.peek().ok_or_else(|| self.unterminated(start))?;
        self.pos += 1;

        match b as char {
            code::STRUCT_OPEN => {
                let close = self.matching_close(start)?;
                let mut inner = self.nested(start + 1, close);
                inner.enter(0, 1)?;
                let fields = inner.parse_many(None)?;
                self.pos = close + 1;
                Ok(TypeDescriptor::Struct(fields))
            }
            code::ARRAY if self.peek() == Some(code::DICT_OPEN as u8) => {
                self.pos += 1;
                self.enter(1, 1)?;
                let key_pos = self.pos;
                let key = self.parse_one()?;
                if !key.is_basic() {
                    log::trace!("dict key {} at {} in {:?} is not basic", key, key_pos, self.signature);
                    return Err(Error::NotBasic(key.to_string()));
                }
                let value = self.parse_one()?;
                self.leave(1, 1);
                match self.peek() {
                    Some(b) if b as char == code::DICT_CLOSE => {
                        self.pos += 1;
                        Ok(TypeDescriptor::dict(key, value))
                    }
                    Some(_) => Err(self.unexpected(self.pos)),
                    None => Err(self.unterminated(self.pos)),
                }
            }
            code::ARRAY => {
                self.enter(1, 0)?;
                let element = self.parse_one()?;
                self.leave(1, 0);
                Ok(TypeDescriptor::array(element))
            }
            code::VARIANT => Ok(TypeDescriptor::Variant),
            code::OBJECT_PATH => Ok(TypeDescriptor::ObjectReference),
            code::SIGNATURE => Ok(TypeDescriptor::Signature),
            code::STRUCT_CLOSE | code::DICT_OPEN | code::DICT_CLOSE => Err(self.unexpected(start)),
            c => PrimitiveType::from_code(c)
                .map(TypeDescriptor::Primitive)
                .ok_or_else(|| Error::UnknownTypeCode {
                    signature: self.signature.to_string(),
                    position: start,
                    code: self.char_at(start),
                }),
        }
    }

    /// Index of the `)` closing the `(` at `open`.
    fn matching_close(&self, open: usize) -> Result<usize> {
        let mut depth = 1usize;
        for i in open + 1..self.end {
            match self.bytes[i] as char {
                code::STRUCT_OPEN => depth += 1,
                code::STRUCT_CLOSE => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(i);
                    }
                }
                _ => {}
            }
        }
        Err(self.unterminated(open))
    }
}

// ── TypeSignature ──────────────────────────────────────────────────────────

/// Host-side value of a `g` (signature) wire value: the list of types the
/// signature encodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TypeSignature(Vec<TypeDescriptor>);

impl TypeSignature {
    pub fn new(types: Vec<TypeDescriptor>) -> Self {
        TypeSignature(types)
    }

    pub fn types(&self) -> &[TypeDescriptor] {
        &self.0
    }

    pub fn into_types(self) -> Vec<TypeDescriptor> {
        self.0
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ty in &self.0 {
            write!(f, "{}", ty)?;
        }
        Ok(())
    }
}

impl FromStr for TypeSignature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(TypeSignature(parse_signature(s, None)?.0))
    }
}

impl Serialize for TypeSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(crate::SIGNATURE_TOKEN, &self.to_string())
    }
}

impl<'de> Deserialize<'de> for TypeSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_newtype_struct(crate::SIGNATURE_TOKEN, TypeSignatureVisitor)
    }
}

struct TypeSignatureVisitor;

impl<'de> serde::de::Visitor<'de> for TypeSignatureVisitor {
    type Value = TypeSignature;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a wire type signature")
    }

    fn visit_newtype_struct<D: Deserializer<'de>>(self, de: D) -> std::result::Result<TypeSignature, D::Error> {
        let s = String::deserialize(de)?;
        self.visit_str(&s)
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> std::result::Result<TypeSignature, E> {
        v.parse().map_err(E::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumed_count_stops_at_limit() {
        let (types, consumed) = parse_signature("(yi)as", Some(1)).unwrap();
        assert_eq!(types.len(), 1);
        assert_eq!(consumed, 4);
    }

    #[test]
    fn zero_limit_consumes_nothing() {
        assert_eq!(parse_signature("iii", Some(0)).unwrap(), (vec![], 0));
    }

    #[test]
    fn nested_struct_positions_are_absolute() {
        let err = parse_signature("(i(y", None).unwrap_err();
        assert_eq!(
            err,
            Error::UnterminatedSignature {
                signature: "(i(y".into(),
                position: 0
            }
        );

        let err = parse_signature("(ia)", None).unwrap_err();
        assert_eq!(
            err,
            Error::UnterminatedSignature {
                signature: "(ia)".into(),
                position: 3
            }
        );
    }

    #[test]
    fn nesting_limits() {
        let arrays = "a".repeat(MAX_ARRAY_DEPTH) + "i";
        assert!(parse_single(&arrays).is_ok());
        let err = parse_single(&format!("a{}", arrays)).unwrap_err();
        assert!(matches!(err, Error::SignatureLimit { limit: "array nesting", .. }));

        let depth = MAX_STRUCT_DEPTH;
        let structs = format!("{}i{}", "(".repeat(depth), ")".repeat(depth));
        assert!(parse_single(&structs).is_ok());
        let err = parse_single(&format!("({})", structs)).unwrap_err();
        assert!(matches!(err, Error::SignatureLimit { limit: "struct nesting", .. }));

        // dict entries count against both limits
        let dicts = format!("{}i{}", "a{s".repeat(depth), "}".repeat(depth));
        assert!(parse_single(&dicts).is_ok());
        assert!(parse_single(&format!("a{}", dicts)).is_err());
    }

    #[test]
    fn empty_struct_is_accepted() {
        assert_eq!(parse_single("()").unwrap(), TypeDescriptor::Struct(vec![]));
    }

    #[test]
    fn display_matches_input() {
        for sig in ["a{oa{sv}}", "(a(ii)g)", "aay", "v"] {
            assert_eq!(parse_single(sig).unwrap().to_string(), sig);
        }
    }
}
