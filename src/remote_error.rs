//! Typed recovery of errors received in error replies.
//!
//! A remote failure arrives as an error identifier (`org.example.Error.NotFound`)
//! and a message. An [`ErrorRegistry`] maps identifiers to constructors for
//! host error types; [`ErrorRegistry::recover`] finds the constructor for an
//! identifier and builds the typed error, or falls back to a generic
//! [`ExecutionError`] when nothing matches.
//!
//! Identifiers of nested types name the nesting with [`NESTED_SEPARATOR`]:
//! `org.example.Outer.Inner` is also looked up as `org.example.Outer$Inner`.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, LazyLock};

/// Separates a nested type from its enclosing type in an error identifier.
pub const NESTED_SEPARATOR: char = '$';

pub type BoxError = Box<dyn StdError + Send + Sync>;

type Constructor = Arc<dyn Fn(String) -> Result<BoxError, BoxError> + Send + Sync>;

static GLOBAL: LazyLock<ErrorRegistry> = LazyLock::new(ErrorRegistry::new);

/// Error identifiers mapped to host error constructors.
#[derive(Default)]
pub struct ErrorRegistry {
    constructors: RwLock<HashMap<String, Constructor>>,
}

impl ErrorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static ErrorRegistry {
        &GLOBAL
    }

    /// Register a constructor that always succeeds.
    ///
    /// ```rust
    /// use dbus_marshal::remote_error::ErrorRegistry;
    ///
    /// #[derive(Debug, thiserror::Error)]
    /// #[error("no such track: {0}")]
    /// struct NoSuchTrack(String);
    ///
    /// let registry = ErrorRegistry::new();
    /// registry.register("org.example.Player.NoSuchTrack", NoSuchTrack);
    ///
    /// let err = registry.recover("org.example.Player.NoSuchTrack", "42".into());
    /// assert!(err.is_typed());
    /// assert_eq!(err.downcast_ref::<NoSuchTrack>().unwrap().0, "42");
    /// ```
    pub fn register<E, F>(&self, name: impl Into<String>, constructor: F)
    where
        E: StdError + Send + Sync + 'static,
        F: Fn(String) -> E + Send + Sync + 'static,
    {
        self.register_fallible(name, move |message| Ok(Box::new(constructor(message)) as BoxError));
    }

    /// Register a constructor that may reject the message.
    pub fn register_fallible<F>(&self, name: impl Into<String>, constructor: F)
    where
        F: Fn(String) -> Result<BoxError, BoxError> + Send + Sync + 'static,
    {
        let name = name.into();
        log::trace!("error constructor registered for {}", name);
        self.constructors.write().insert(name, Arc::new(constructor));
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.constructors.write().remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.read().contains_key(name)
    }

    /// Find the constructor for `error_name`, trying nested spellings.
    fn lookup(&self, error_name: &str) -> Option<(String, Constructor)> {
        let constructors = self.constructors.read();
        candidates(error_name).find_map(|candidate| {
            constructors
                .get(&candidate)
                .map(|constructor| (candidate, constructor.clone()))
        })
    }

    /// Build the host error for `error_name`. Never fails: a missing,
    /// failing or panicking constructor yields an untyped error.
    pub fn recover(&self, error_name: &str, message: String) -> ExecutionError {
        let typed = match self.lookup(error_name) {
            Some((candidate, constructor)) => {
                let attempt = panic::catch_unwind(AssertUnwindSafe(|| constructor(message.clone())));
                match attempt {
                    Ok(Ok(typed)) => Some(typed),
                    Ok(Err(e)) => {
                        log::debug!("constructor for {} rejected {:?}: {}", candidate, message, e);
                        None
                    }
                    Err(_) => {
                        log::debug!("constructor for {} panicked", candidate);
                        None
                    }
                }
            }
            None => {
                log::debug!("no error type registered for {}", error_name);
                None
            }
        };
        ExecutionError {
            error_type: error_name.to_string(),
            message,
            typed,
        }
    }
}

impl fmt::Debug for ErrorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let constructors = self.constructors.read();
        let mut names: Vec<&String> = constructors.keys().collect();
        names.sort();
        f.debug_struct("ErrorRegistry").field("names", &names).finish()
    }
}

/// Lookup names for an identifier: the identifier itself, then with the
/// rightmost `.` turned into [`NESTED_SEPARATOR`], repeatedly, for as long
/// as the rewritten name still contains a `.`.
pub fn candidates(error_name: &str) -> impl Iterator<Item = String> {
    let mut next = Some(error_name.to_string());
    std::iter::from_fn(move || {
        let current = next.take()?;
        if let Some(dot) = current.rfind('.') {
            let mut nested = current.clone();
            nested.replace_range(dot..dot + 1, &NESTED_SEPARATOR.to_string());
            if nested.contains('.') {
                next = Some(nested);
            }
        }
        Some(current)
    })
}

/// A failure reported by a remote peer.
#[derive(Debug)]
pub struct ExecutionError {
    error_type: String,
    message: String,
    typed: Option<BoxError>,
}

impl ExecutionError {
    /// The error identifier from the reply, as received.
    pub fn error_type(&self) -> &str {
        &self.error_type
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether a registered host error type was constructed.
    pub fn is_typed(&self) -> bool {
        self.typed.is_some()
    }

    pub fn typed(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.typed.as_deref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.typed.as_ref()?.downcast_ref::<E>()
    }

    pub fn into_typed(self) -> Option<BoxError> {
        self.typed
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for ExecutionError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.typed.as_deref().map(|e| e as &(dyn StdError + 'static))
    }
}
