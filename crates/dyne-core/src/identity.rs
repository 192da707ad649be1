//! Authenticated user identity.
//!
//! The credential verifier decides what a user is: a name, a database row,
//! a claims struct. The core only carries it, so [`User`] is an opaque,
//! cheaply clonable handle that callers downcast back to their own type.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque identity produced by an auth backend.
///
/// # Example
///
/// ```
/// use dyne_core::User;
///
/// #[derive(Debug)]
/// struct Account { id: u64 }
///
/// let user = User::new(Account { id: 7 });
/// assert_eq!(user.downcast_ref::<Account>().map(|a| a.id), Some(7));
///
/// let named = User::new("john".to_string());
/// assert_eq!(named.name(), Some("john"));
/// ```
#[derive(Clone)]
pub struct User(Arc<dyn Any + Send + Sync>);

impl User {
    /// Wraps any identity value.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrows the identity as `T`.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    /// Returns the identity as a string when it is a `String` or `&'static str`.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.0
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| self.0.downcast_ref::<&'static str>().copied())
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.debug_tuple("User").field(&name).finish(),
            None => f.write_str("User(..)"),
        }
    }
}
