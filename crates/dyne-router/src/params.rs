//! Extracted path parameters.
//!
//! Most routes carry one to four parameters, so values are stored inline in
//! a small vector and looked up by linear scan.

use serde::ser::{Serialize, SerializeMap, Serializer};
use smallvec::SmallVec;

use crate::converter::ParamValue;

/// Maximum number of parameters stored inline (stack allocated).
const INLINE_PARAMS: usize = 4;

/// Converted parameters from a route match, in template order.
///
/// # Example
///
/// ```rust
/// use dyne_router::{Params, ParamValue};
///
/// let mut params = Params::new();
/// params.push("id", ParamValue::Int(42));
/// params.push("slug", ParamValue::Str("hello".into()));
///
/// assert_eq!(params.get_int("id"), Some(42));
/// assert_eq!(params.get_str("slug"), Some("hello"));
/// assert_eq!(params.get("missing"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params {
    inner: SmallVec<[(String, ParamValue); INLINE_PARAMS]>,
}

impl Params {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter.
    pub fn push(&mut self, name: impl Into<String>, value: ParamValue) {
        self.inner.push((name.into(), value));
    }

    /// Drops parameters past `len`. Used when a match attempt backtracks.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.inner.truncate(len);
    }

    /// Returns a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.inner.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Returns a textual parameter by name.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    /// Returns an integer parameter by name.
    #[must_use]
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ParamValue::as_int)
    }

    /// Returns true if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Iterates over `(name, value)` pairs in template order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.inner.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl FromIterator<(String, ParamValue)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

impl Serialize for Params {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.inner.len()))?;
        for (name, value) in &self.inner {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_new() {
        let params = Params::new();
        assert!(params.is_empty());
        assert_eq!(params.len(), 0);
    }

    #[test]
    fn test_typed_getters() {
        let mut params = Params::new();
        params.push("id", ParamValue::Int(1));
        params.push("name", ParamValue::Str("x".into()));
        assert_eq!(params.get_int("name"), None);
        assert_eq!(params.get_str("id"), None);
        assert_eq!(params.get_int("id"), Some(1));
    }

    #[test]
    fn test_truncate_backtracks() {
        let mut params = Params::new();
        params.push("a", ParamValue::Int(1));
        params.push("b", ParamValue::Int(2));
        params.truncate(1);
        assert_eq!(params.len(), 1);
        assert!(params.get("b").is_none());
    }

    #[test]
    fn test_iter_preserves_order() {
        let params: Params = vec![
            ("z".to_string(), ParamValue::Int(1)),
            ("a".to_string(), ParamValue::Int(2)),
        ]
        .into_iter()
        .collect();
        let names: Vec<_> = params.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["z", "a"]);
    }
}
