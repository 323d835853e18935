use serde::{de, ser};
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Broad classes of failure, used by callers that only need to know which
/// stage rejected the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A type could not be expressed as a wire signature, or a signature
    /// string is malformed.
    Signature,
    /// A host value could not be mapped to or from the wire value tree.
    Marshal,
    /// Wire data is inconsistent with the type it claims to carry.
    Protocol,
    /// An error reply is missing a required header.
    Format,
}

/// Errors raised while compiling signatures or (de)marshalling values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A custom error message from serde
    #[error("{0}")]
    Message(String),

    #[error("{0} is not a basic type")]
    NotBasic(String),

    #[error("multi-valued array types not permitted")]
    MultiValued,

    #[error("map must have 2 type parameters, found {0}")]
    MapArity(usize),

    #[error("exporting non-exportable type {0}")]
    NonExportable(String),

    #[error("serializable type {0} must serialize to native wire types")]
    SerializableShape(String),

    #[error("duplicate field position {position} in struct {name}")]
    DuplicatePosition { name: String, position: usize },

    #[error("struct {0} is registered with different field positions")]
    LayoutConflict(String),

    #[error("signature {signature:?} exceeds the {limit} limit")]
    SignatureLimit {
        signature: String,
        limit: &'static str,
    },

    /// Truncated signature or unmatched bracket.
    #[error("failed to parse signature {signature:?}: unterminated at position {position}")]
    UnterminatedSignature { signature: String, position: usize },

    #[error("failed to parse signature {signature:?}: unexpected {found:?} at position {position}")]
    UnexpectedToken {
        signature: String,
        position: usize,
        found: char,
    },

    #[error("failed to parse signature {signature:?}: unknown type code {code:?} at position {position}")]
    UnknownTypeCode {
        signature: String,
        position: usize,
        code: char,
    },

    #[error("array exceeds maximum length of {max} (got {len})")]
    ArrayTooLong { max: usize, len: usize },

    #[error("dict key must be a basic type, found {0}")]
    DictKeyNotBasic(String),

    #[error("signature {signature:?} declares {expected} arguments, found {found}")]
    ArgumentCount {
        signature: String,
        expected: usize,
        found: usize,
    },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("not enough elements to construct type {type_name} ({remaining} < {expected})")]
    NotEnoughElements {
        type_name: String,
        remaining: usize,
        expected: usize,
    },

    #[error("invalid object path {0:?}")]
    InvalidObjectPath(String),

    #[error("no exported object at {path} for peer {peer:?}")]
    UnknownObject { peer: String, path: String },

    #[error("must specify destination and error name to errors (missing {0})")]
    ErrorFormat(&'static str),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotBasic(_)
            | Error::MultiValued
            | Error::MapArity(_)
            | Error::NonExportable(_)
            | Error::SerializableShape(_)
            | Error::DuplicatePosition { .. }
            | Error::LayoutConflict(_)
            | Error::SignatureLimit { .. }
            | Error::UnterminatedSignature { .. }
            | Error::UnexpectedToken { .. } => ErrorKind::Signature,
            Error::UnknownTypeCode { .. } | Error::NotEnoughElements { .. } => {
                ErrorKind::Protocol
            }
            Error::ErrorFormat(_) => ErrorKind::Format,
            Error::Message(_)
            | Error::ArrayTooLong { .. }
            | Error::DictKeyNotBasic(_)
            | Error::ArgumentCount { .. }
            | Error::TypeMismatch { .. }
            | Error::InvalidObjectPath(_)
            | Error::UnknownObject { .. } => ErrorKind::Marshal,
        }
    }

    pub(crate) fn mismatch(expected: impl fmt::Display, found: impl fmt::Display) -> Self {
        Error::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

impl ser::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::Message(msg.to_string())
    }
}

impl de::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::Message(msg.to_string())
    }
}
