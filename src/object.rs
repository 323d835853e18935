//! Object references.
//!
//! An `o` wire value names an object by path. The demarshaller hands it to
//! the host either as a plain [`ObjectPath`] or, when the host asks for a
//! [`RemoteObject`], as the entry the connection exported for that
//! `(peer, path)` pair.

use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// A validated object path such as `/org/example/Player`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if is_valid_path(&path) {
            Ok(ObjectPath(path))
        } else {
            Err(Error::InvalidObjectPath(path))
        }
    }

    pub fn root() -> Self {
        ObjectPath("/".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// `/`, or `/`-separated non-empty segments of `[A-Za-z0-9_]`.
fn is_valid_path(path: &str) -> bool {
    if path == "/" {
        return true;
    }
    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    rest.split('/').all(|segment| {
        !segment.is_empty()
            && segment
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_')
    })
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for ObjectPath {
    type Error = Error;

    fn try_from(path: &str) -> Result<Self> {
        ObjectPath::new(path)
    }
}

impl AsRef<str> for ObjectPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for ObjectPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(crate::OBJECT_PATH_TOKEN, self.as_str())
    }
}

impl<'de> Deserialize<'de> for ObjectPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_newtype_struct(crate::OBJECT_PATH_TOKEN, ObjectPathVisitor)
    }
}

struct ObjectPathVisitor;

impl<'de> Visitor<'de> for ObjectPathVisitor {
    type Value = ObjectPath;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "an object path")
    }

    fn visit_newtype_struct<D: Deserializer<'de>>(self, de: D) -> std::result::Result<ObjectPath, D::Error> {
        let s = String::deserialize(de)?;
        self.visit_str(&s)
    }

    // Non-bus formats carry the path as a plain string.
    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<ObjectPath, E> {
        ObjectPath::new(v).map_err(E::custom)
    }
}

// ── Remote objects ─────────────────────────────────────────────────────────

/// A live handle to an object exported on a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteObject {
    peer: String,
    path: ObjectPath,
    interface: String,
}

impl RemoteObject {
    pub fn new(peer: impl Into<String>, path: ObjectPath, interface: impl Into<String>) -> Self {
        RemoteObject {
            peer: peer.into(),
            path,
            interface: interface.into(),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }
}

/// On the wire a remote object is only its path.
impl Serialize for RemoteObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.path.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RemoteObject {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_newtype_struct(crate::REMOTE_OBJECT_TOKEN, RemoteObjectVisitor)
    }
}

struct RemoteObjectVisitor;

impl<'de> Visitor<'de> for RemoteObjectVisitor {
    type Value = RemoteObject;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "an exported object (peer, path, interface)")
    }

    fn visit_newtype_struct<D: Deserializer<'de>>(self, de: D) -> std::result::Result<RemoteObject, D::Error> {
        let (peer, path, interface) = <(String, String, String)>::deserialize(de)?;
        let path = ObjectPath::new(path).map_err(de::Error::custom)?;
        Ok(RemoteObject::new(peer, path, interface))
    }
}

/// The connection-side registry of exported objects.
pub trait ExportedObjects: Send + Sync {
    fn exported_object(&self, peer: &str, path: &ObjectPath) -> Option<RemoteObject>;
}

/// In-memory [`ExportedObjects`] keyed by `(peer, path)`.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    objects: RwLock<HashMap<(String, ObjectPath), RemoteObject>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export `interface` at `path` for `peer`, replacing any earlier entry.
    pub fn export(&self, peer: &str, path: ObjectPath, interface: &str) -> RemoteObject {
        let object = RemoteObject::new(peer, path.clone(), interface);
        self.objects
            .write()
            .insert((peer.to_string(), path), object.clone());
        object
    }

    pub fn unexport(&self, peer: &str, path: &ObjectPath) -> Option<RemoteObject> {
        self.objects.write().remove(&(peer.to_string(), path.clone()))
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl ExportedObjects for ObjectRegistry {
    fn exported_object(&self, peer: &str, path: &ObjectPath) -> Option<RemoteObject> {
        self.objects
            .read()
            .get(&(peer.to_string(), path.clone()))
            .cloned()
    }
}
