//! HTTP method sets.
//!
//! A route owns a [`MethodSet`]; the router uses it both to pick a route and,
//! when no route accepts the request method, to build the `Allow` header of
//! the 405 response.

use std::fmt;

use http::Method;
use smallvec::SmallVec;

/// Ordered, duplicate-free set of HTTP methods.
///
/// # Example
///
/// ```rust
/// use dyne_router::MethodSet;
/// use http::Method;
///
/// let methods = MethodSet::new().get().post();
/// assert!(methods.contains(&Method::GET));
/// assert!(!methods.contains(&Method::DELETE));
/// assert_eq!(methods.to_string(), "GET, POST");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodSet {
    methods: SmallVec<[Method; 4]>,
}

impl MethodSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds GET.
    #[must_use]
    pub fn get(self) -> Self {
        self.with(Method::GET)
    }

    /// Adds POST.
    #[must_use]
    pub fn post(self) -> Self {
        self.with(Method::POST)
    }

    /// Adds PUT.
    #[must_use]
    pub fn put(self) -> Self {
        self.with(Method::PUT)
    }

    /// Adds PATCH.
    #[must_use]
    pub fn patch(self) -> Self {
        self.with(Method::PATCH)
    }

    /// Adds DELETE.
    #[must_use]
    pub fn delete(self) -> Self {
        self.with(Method::DELETE)
    }

    /// Adds an arbitrary method.
    #[must_use]
    pub fn with(mut self, method: Method) -> Self {
        self.insert(method);
        self
    }

    /// Inserts a method, keeping the set ordered. Returns false if present.
    pub fn insert(&mut self, method: Method) -> bool {
        if self.contains(&method) {
            return false;
        }
        let pos = self
            .methods
            .iter()
            .position(|m| m.as_str() > method.as_str())
            .unwrap_or(self.methods.len());
        self.methods.insert(pos, method);
        true
    }

    /// Removes a method. Returns true if it was present.
    pub fn remove(&mut self, method: &Method) -> bool {
        let before = self.methods.len();
        self.methods.retain(|m| m != method);
        before != self.methods.len()
    }

    /// Returns true if the set contains `method`.
    pub fn contains(&self, method: &Method) -> bool {
        self.methods.iter().any(|m| m == method)
    }

    /// Returns true if the two sets share any method.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.methods.iter().any(|m| other.contains(m))
    }

    /// Adds every method of `other`.
    pub fn extend(&mut self, other: &Self) {
        for m in &other.methods {
            self.insert(m.clone());
        }
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Number of methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Methods in order.
    pub fn iter(&self) -> impl Iterator<Item = &Method> {
        self.methods.iter()
    }
}

impl FromIterator<Method> for MethodSet {
    fn from_iter<I: IntoIterator<Item = Method>>(iter: I) -> Self {
        let mut set = Self::new();
        for m in iter {
            set.insert(m);
        }
        set
    }
}

impl<'a> FromIterator<&'a Method> for MethodSet {
    fn from_iter<I: IntoIterator<Item = &'a Method>>(iter: I) -> Self {
        iter.into_iter().cloned().collect()
    }
}

impl From<Method> for MethodSet {
    fn from(method: Method) -> Self {
        Self::new().with(method)
    }
}

/// Renders as an `Allow` header value.
impl fmt::Display for MethodSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, m) in self.methods.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(m.as_str())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_ordered_and_deduplicated() {
        let mut set = MethodSet::new().post().get();
        assert!(!set.insert(Method::GET));
        assert_eq!(set.len(), 2);
        assert_eq!(set.to_string(), "GET, POST");
    }

    #[test]
    fn test_remove_and_overlap() {
        let mut a = MethodSet::new().get().put();
        let b = MethodSet::new().put().delete();
        assert!(a.overlaps(&b));
        assert!(a.remove(&Method::PUT));
        assert!(!a.overlaps(&b));
        assert!(!a.remove(&Method::PUT));
    }

    #[test]
    fn test_extend() {
        let mut a = MethodSet::from(Method::GET);
        a.extend(&MethodSet::new().delete().get());
        assert_eq!(a.to_string(), "DELETE, GET");
    }

    #[test]
    fn test_extension_method() {
        let purge = Method::from_bytes(b"PURGE").unwrap();
        let set: MethodSet = [purge.clone(), Method::GET].into_iter().collect();
        assert!(set.contains(&purge));
    }
}
