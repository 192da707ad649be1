//! Request-scoped state.
//!
//! Each request carries its own [`RequestState`]: typed extensions that hooks
//! and the auth gate attach, and the values pipeline input stages inject
//! under a key. Nothing in here is shared between requests.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which makes it suitable for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

type AnyBox = Box<dyn Any + Send + Sync>;

/// Per-request state scope.
///
/// # Example
///
/// ```
/// use dyne_core::RequestState;
///
/// #[derive(Debug, PartialEq)]
/// struct Tenant(&'static str);
///
/// let mut state = RequestState::new();
/// state.insert(Tenant("acme"));
/// state.inject("data", vec![1, 2, 3]);
///
/// assert_eq!(state.get::<Tenant>(), Some(&Tenant("acme")));
/// assert_eq!(state.injected::<Vec<i32>>("data"), Some(&vec![1, 2, 3]));
/// assert!(state.injected::<String>("data").is_none());
/// ```
#[derive(Default)]
pub struct RequestState {
    extensions: HashMap<TypeId, AnyBox>,
    injected: HashMap<String, AnyBox>,
}

impl RequestState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a typed extension, replacing any previous value of that type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Returns a typed extension.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|b| b.downcast_ref())
    }

    /// Returns a typed extension mutably.
    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.extensions
            .get_mut(&TypeId::of::<T>())
            .and_then(|b| b.downcast_mut())
    }

    /// Removes and returns a typed extension.
    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|b| b.downcast().ok())
            .map(|b| *b)
    }

    /// Injects a value under `key`, replacing any previous value.
    pub fn inject<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.injected.insert(key.into(), Box::new(value));
    }

    /// Injects an already-boxed value under `key`.
    pub fn inject_boxed(&mut self, key: impl Into<String>, value: AnyBox) {
        self.injected.insert(key.into(), value);
    }

    /// Returns the value injected under `key` if it has type `T`.
    #[must_use]
    pub fn injected<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.injected.get(key).and_then(|b| b.downcast_ref())
    }

    /// Removes the value injected under `key` if it has type `T`.
    ///
    /// A value of another type is left in place.
    pub fn take_injected<T: Send + Sync + 'static>(&mut self, key: &str) -> Option<T> {
        if !self.injected.get(key).is_some_and(|b| b.is::<T>()) {
            return None;
        }
        self.injected
            .remove(key)
            .and_then(|b| b.downcast().ok())
            .map(|b| *b)
    }

    /// Returns true if something was injected under `key`.
    #[must_use]
    pub fn has_injected(&self, key: &str) -> bool {
        self.injected.contains_key(key)
    }
}

impl fmt::Debug for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestState")
            .field("extensions", &self.extensions.len())
            .field("injected", &self.injected.keys().collect::<Vec<_>>())
            .finish()
    }
}
