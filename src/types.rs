//! Host type descriptors and the signature compiler.
//!
//! Every host type that crosses the bus describes itself through
//! [`DBusType`], producing a [`HostType`]. [`compile`] turns a `HostType`
//! into wire signature fragments: exactly one fragment for anything that can
//! sit inside a container, possibly several for an argument list or a
//! user-serializable type.
//!
//! Compiled signatures and struct layouts are cached for the life of the
//! process, keyed by the full host type. Both caches publish an entry once;
//! later writers see the first entry.

use crate::error::{Error, Result};
use crate::object::{ObjectPath, RemoteObject};
use crate::signature::{PrimitiveType, TypeSignature, code};
use crate::value::Variant;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Parameterized container kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GenericKind {
    Map,
    List,
    Variant,
    RemoteObject,
    /// A parameterized type with no wire mapping.
    Other(String),
}

/// Describes a host type to the signature compiler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HostType {
    /// An unbound type parameter. Travels as a variant.
    Param(String),
    Primitive(PrimitiveType),
    ObjectPath,
    /// A handle to an exported object.
    RemoteObject,
    Variant,
    /// Placeholder element meaning "a wire type"; an array of these is a
    /// signature.
    TypeToken,
    /// A native array.
    Array(Box<HostType>),
    Generic {
        kind: GenericKind,
        args: Vec<HostType>,
    },
    Struct(Arc<StructDef>),
    Serializable(Arc<SerializableDef>),
    /// An argument list; each element contributes its own fragments.
    Tuple(Vec<HostType>),
}

impl HostType {
    pub fn array(element: HostType) -> Self {
        HostType::Array(Box::new(element))
    }

    pub fn list(element: HostType) -> Self {
        HostType::Generic {
            kind: GenericKind::List,
            args: vec![element],
        }
    }

    pub fn map(key: HostType, value: HostType) -> Self {
        HostType::Generic {
            kind: GenericKind::Map,
            args: vec![key, value],
        }
    }

    pub fn structure(def: StructDef) -> Self {
        HostType::Struct(Arc::new(def))
    }

    pub fn serializable(def: SerializableDef) -> Self {
        HostType::Serializable(Arc::new(def))
    }

    /// Whether this type may be compiled in basic-only mode (dict keys).
    pub fn is_basic(&self) -> bool {
        match self {
            HostType::Primitive(_) | HostType::ObjectPath | HostType::RemoteObject => true,
            HostType::Array(element) => **element == HostType::TypeToken,
            _ => false,
        }
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostType::Param(name) => f.write_str(name),
            HostType::Primitive(p) => write!(f, "{:?}", p),
            HostType::ObjectPath => f.write_str("ObjectPath"),
            HostType::RemoteObject => f.write_str("RemoteObject"),
            HostType::Variant => f.write_str("Variant"),
            HostType::TypeToken => f.write_str("Type"),
            HostType::Array(element) => write!(f, "[{}]", element),
            HostType::Generic { kind, args } => {
                match kind {
                    GenericKind::Map => f.write_str("Map")?,
                    GenericKind::List => f.write_str("List")?,
                    GenericKind::Variant => f.write_str("Variant")?,
                    GenericKind::RemoteObject => f.write_str("RemoteObject")?,
                    GenericKind::Other(name) => f.write_str(name)?,
                }
                write!(f, "<")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ">")
            }
            HostType::Struct(def) => f.write_str(&def.name),
            HostType::Serializable(def) => f.write_str(&def.name),
            HostType::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// One field of a user struct. `position` is its slot on the wire; fields
/// without one are not transmitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldSpec {
    pub name: String,
    pub position: Option<usize>,
    pub ty: HostType,
}

impl FieldSpec {
    pub fn at(name: impl Into<String>, position: usize, ty: HostType) -> Self {
        FieldSpec {
            name: name.into(),
            position: Some(position),
            ty,
        }
    }

    pub fn unpositioned(name: impl Into<String>, ty: HostType) -> Self {
        FieldSpec {
            name: name.into(),
            position: None,
            ty,
        }
    }
}

/// A user struct. `name` must match the serde container name so the
/// marshaller can find the layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

impl StructDef {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        StructDef {
            name: name.into(),
            fields,
        }
    }
}

/// A user type that decomposes itself into several wire values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SerializableDef {
    pub name: String,
    pub wire_types: Vec<HostType>,
}

impl SerializableDef {
    pub fn new(name: impl Into<String>, wire_types: Vec<HostType>) -> Self {
        SerializableDef {
            name: name.into(),
            wire_types,
        }
    }
}

/// Positioned fields of a struct, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    name: String,
    fields: Vec<(String, HostType)>,
}

impl StructLayout {
    fn from_def(def: &StructDef) -> Result<Self> {
        let mut positioned: Vec<(usize, &FieldSpec)> = def
            .fields
            .iter()
            .filter_map(|f| f.position.map(|p| (p, f)))
            .collect();
        positioned.sort_by_key(|(p, _)| *p);
        for pair in positioned.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(Error::DuplicatePosition {
                    name: def.name.clone(),
                    position: pair[0].0,
                });
            }
        }
        Ok(StructLayout {
            name: def.name.clone(),
            fields: positioned
                .into_iter()
                .map(|(_, f)| (f.name.clone(), f.ty.clone()))
                .collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn field_types(&self) -> impl Iterator<Item = &HostType> {
        self.fields.iter().map(|(_, ty)| ty)
    }

    /// Wire slot of the named field.
    pub fn slot_of(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|(name, _)| name == field)
    }
}

// ── Caches ─────────────────────────────────────────────────────────────────

static SIGNATURE_CACHE: LazyLock<RwLock<HashMap<HostType, Arc<[String]>>>> =
    LazyLock::new(Default::default);

static LAYOUT_CACHE: LazyLock<RwLock<HashMap<StructDef, Arc<StructLayout>>>> =
    LazyLock::new(Default::default);

/// Layouts by serde container name. Instantiations of a generic struct share
/// a name and must agree on field positions; the types come from the slot.
static LAYOUT_BY_NAME: LazyLock<RwLock<HashMap<String, Arc<StructLayout>>>> =
    LazyLock::new(Default::default);

/// Resolve (and cache) the wire layout of a struct.
pub fn struct_layout(def: &StructDef) -> Result<Arc<StructLayout>> {
    if let Some(hit) = LAYOUT_CACHE.read().get(def) {
        return Ok(hit.clone());
    }
    let layout = Arc::new(StructLayout::from_def(def)?);
    publish_name(&layout)?;
    let mut cache = LAYOUT_CACHE.write();
    let entry = cache.entry(def.clone()).or_insert_with(|| {
        log::trace!("layout for struct {} cached ({} fields)", def.name, layout.len());
        layout
    });
    Ok(entry.clone())
}

fn publish_name(layout: &Arc<StructLayout>) -> Result<()> {
    let mut by_name = LAYOUT_BY_NAME.write();
    match by_name.get(layout.name()) {
        Some(existing) if !existing.field_names().eq(layout.field_names()) => {
            Err(Error::LayoutConflict(layout.name().to_string()))
        }
        Some(_) => Ok(()),
        None => {
            by_name.insert(layout.name().to_string(), layout.clone());
            Ok(())
        }
    }
}

/// The field order published for `name`, if the struct has been compiled
/// or registered.
pub fn lookup_layout(name: &str) -> Option<Arc<StructLayout>> {
    LAYOUT_BY_NAME.read().get(name).cloned()
}

// ── Compiler ───────────────────────────────────────────────────────────────

/// Compile `ty` to its signature fragments, consulting the process-wide
/// cache.
pub fn compile(ty: &HostType) -> Result<Arc<[String]>> {
    if let Some(hit) = SIGNATURE_CACHE.read().get(ty) {
        return Ok(hit.clone());
    }
    let compiled: Arc<[String]> = compile_with(ty, false)?.into();
    let mut cache = SIGNATURE_CACHE.write();
    let entry = cache.entry(ty.clone()).or_insert_with(|| {
        log::trace!("signature for {} cached as {:?}", ty, compiled);
        compiled
    });
    Ok(entry.clone())
}

/// Compile `ty` without caching the result. With `basic` set, anything that
/// is not a basic type is rejected.
pub fn compile_with(ty: &HostType, basic: bool) -> Result<Vec<String>> {
    if basic && !ty.is_basic() {
        return Err(Error::NotBasic(ty.to_string()));
    }

    let fragment = match ty {
        HostType::Param(_) | HostType::Variant => code::VARIANT.to_string(),
        HostType::Primitive(p) => p.code().to_string(),
        HostType::ObjectPath | HostType::RemoteObject => code::OBJECT_PATH.to_string(),
        HostType::TypeToken => return Err(Error::NonExportable(ty.to_string())),
        HostType::Array(element) => array_fragment(element)?,
        HostType::Generic { kind, args } => match kind {
            GenericKind::Map => {
                if args.len() < 2 {
                    return Err(Error::MapArity(args.len()));
                }
                format!(
                    "{}{}{}{}{}",
                    code::ARRAY,
                    code::DICT_OPEN,
                    single(&args[0], true)?,
                    single(&args[1], false)?,
                    code::DICT_CLOSE
                )
            }
            GenericKind::List => {
                if args.is_empty() {
                    return Err(Error::NonExportable(ty.to_string()));
                }
                let mut out = String::new();
                for arg in args {
                    out.push_str(&array_fragment(arg)?);
                }
                out
            }
            GenericKind::Variant => code::VARIANT.to_string(),
            GenericKind::RemoteObject => code::OBJECT_PATH.to_string(),
            GenericKind::Other(_) => {
                return Err(Error::NonExportable(format!("parameterized type {}", ty)));
            }
        },
        HostType::Struct(def) => {
            let layout = struct_layout(def)?;
            let mut out = String::from(code::STRUCT_OPEN);
            for field in layout.field_types() {
                out.push_str(&single(field, false)?);
            }
            out.push(code::STRUCT_CLOSE);
            out
        }
        HostType::Serializable(def) => {
            let mut out = Vec::with_capacity(def.wire_types.len());
            for wire in &def.wire_types {
                let fragments = compile(wire)?;
                if fragments.len() != 1 {
                    return Err(Error::SerializableShape(def.name.clone()));
                }
                out.push(fragments[0].clone());
            }
            return Ok(out);
        }
        HostType::Tuple(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.extend(compile(item)?.iter().cloned());
            }
            return Ok(out);
        }
    };

    Ok(vec![fragment])
}

/// `g` for an array of type tokens, `a` + element otherwise.
fn array_fragment(element: &HostType) -> Result<String> {
    if *element == HostType::TypeToken {
        Ok(code::SIGNATURE.to_string())
    } else {
        Ok(format!("{}{}", code::ARRAY, single(element, false)?))
    }
}

/// Compile a type that must occupy exactly one fragment. Serializable types
/// only expand at the top of an argument list, whatever their width.
fn single(ty: &HostType, basic: bool) -> Result<String> {
    if basic && !ty.is_basic() {
        return Err(Error::NotBasic(ty.to_string()));
    }
    if let HostType::Serializable(_) = ty {
        return Err(Error::MultiValued);
    }
    let fragments = compile(ty)?;
    match &*fragments {
        [one] => Ok(one.clone()),
        _ => Err(Error::MultiValued),
    }
}

// ── DBusType ───────────────────────────────────────────────────────────────

/// A host type with a wire mapping.
///
/// User structs implement this by hand, naming each field's wire position:
///
/// ```rust
/// use dbus_marshal::types::{DBusType, FieldSpec, HostType, StructDef, signature_of};
///
/// #[derive(serde::Serialize, serde::Deserialize)]
/// struct Track {
///     length: u32,
///     title: String,
/// }
///
/// impl DBusType for Track {
///     fn host_type() -> HostType {
///         HostType::structure(StructDef::new("Track", vec![
///             FieldSpec::at("length", 1, u32::host_type()),
///             FieldSpec::at("title", 0, String::host_type()),
///         ]))
///     }
/// }
///
/// assert_eq!(signature_of::<Track>().unwrap(), "(su)");
/// ```
pub trait DBusType {
    fn host_type() -> HostType;
}

/// The full signature of `T`, all fragments concatenated.
pub fn signature_of<T: DBusType + ?Sized>() -> Result<String> {
    Ok(compile(&T::host_type())?.concat())
}

/// Compile `T` up front, publishing its struct layouts so the marshaller
/// honours field positions.
pub fn register<T: DBusType + ?Sized>() -> Result<Arc<[String]>> {
    compile(&T::host_type())
}

macro_rules! primitive_type {
    ($($t:ty => $p:ident),* $(,)?) => {
        $(
            impl DBusType for $t {
                fn host_type() -> HostType {
                    HostType::Primitive(PrimitiveType::$p)
                }
            }
        )*
    };
}

primitive_type! {
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
    str => String,
}

impl DBusType for ObjectPath {
    fn host_type() -> HostType {
        HostType::ObjectPath
    }
}

impl DBusType for RemoteObject {
    fn host_type() -> HostType {
        HostType::RemoteObject
    }
}

impl DBusType for Variant {
    fn host_type() -> HostType {
        HostType::Variant
    }
}

impl DBusType for TypeSignature {
    fn host_type() -> HostType {
        HostType::array(HostType::TypeToken)
    }
}

impl<T: DBusType + ?Sized> DBusType for &T {
    fn host_type() -> HostType {
        T::host_type()
    }
}

impl<T: DBusType + ?Sized> DBusType for Box<T> {
    fn host_type() -> HostType {
        T::host_type()
    }
}

impl<T: DBusType + ?Sized> DBusType for Arc<T> {
    fn host_type() -> HostType {
        T::host_type()
    }
}

impl<T: DBusType> DBusType for Vec<T> {
    fn host_type() -> HostType {
        HostType::list(T::host_type())
    }
}

impl<T: DBusType> DBusType for [T] {
    fn host_type() -> HostType {
        HostType::array(T::host_type())
    }
}

impl<T: DBusType, const N: usize> DBusType for [T; N] {
    fn host_type() -> HostType {
        HostType::array(T::host_type())
    }
}

impl<K: DBusType, V: DBusType, S> DBusType for HashMap<K, V, S> {
    fn host_type() -> HostType {
        HostType::map(K::host_type(), V::host_type())
    }
}

impl<K: DBusType, V: DBusType> DBusType for BTreeMap<K, V> {
    fn host_type() -> HostType {
        HostType::map(K::host_type(), V::host_type())
    }
}

impl DBusType for () {
    fn host_type() -> HostType {
        HostType::Tuple(Vec::new())
    }
}

macro_rules! tuple_type {
    ($($name:ident)+) => {
        impl<$($name: DBusType),+> DBusType for ($($name,)+) {
            fn host_type() -> HostType {
                HostType::Tuple(vec![$($name::host_type()),+])
            }
        }
    };
}

tuple_type!(A);
tuple_type!(A B);
tuple_type!(A B C);
tuple_type!(A B C D);
tuple_type!(A B C D E);
tuple_type!(A B C D E F);
tuple_type!(A B C D E F G);
tuple_type!(A B C D E F G H);
