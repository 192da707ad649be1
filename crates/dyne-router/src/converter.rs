//! Typed segment converters.
//!
//! A converter turns one raw path segment into a [`ParamValue`]. Templates
//! reference converters by tag (`{id:int}`); the tag is resolved against a
//! [`ConverterRegistry`] when the template is compiled, so an unknown tag is
//! a registration-time error rather than a request-time surprise.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::error::ConversionError;

/// Converter tag used when a placeholder names none.
pub const DEFAULT_CONVERTER: &str = "str";

/// A converted path parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Single-segment string.
    Str(String),
    /// Non-negative integer.
    Int(i64),
    /// Non-negative decimal number.
    Float(f64),
    /// Canonical UUID.
    Uuid(Uuid),
    /// Remainder of the path, possibly containing `/`.
    Path(String),
}

impl ParamValue {
    /// Returns the value as a string slice when it is textual.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) | Self::Path(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a float. Integers widen.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Returns the value as a UUID.
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(u) => Some(*u),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) | Self::Path(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Uuid(u) => write!(f, "{}", u.hyphenated()),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Uuid> for ParamValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

/// Parses a raw segment into a typed value.
pub trait Converter: Send + Sync + 'static {
    /// The tag templates use to select this converter.
    fn tag(&self) -> &str;

    /// Converts one raw (already percent-decoded) segment.
    fn convert(&self, raw: &str) -> Result<ParamValue, ConversionError>;

    /// Whether the converter swallows the rest of the path, slashes included.
    fn is_catch_all(&self) -> bool {
        false
    }
}

impl fmt::Debug for dyn Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter").field("tag", &self.tag()).finish()
    }
}

/// Passes the segment through unchanged. Rejects empty segments.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrConverter;

impl Converter for StrConverter {
    fn tag(&self) -> &str {
        "str"
    }

    fn convert(&self, raw: &str) -> Result<ParamValue, ConversionError> {
        if raw.is_empty() || raw.contains('/') {
            return Err(ConversionError::new(self.tag(), raw, "expected one path segment"));
        }
        Ok(ParamValue::Str(raw.to_string()))
    }
}

/// ASCII digits only: no sign, no whitespace, no separators.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntConverter;

impl Converter for IntConverter {
    fn tag(&self) -> &str {
        "int"
    }

    fn convert(&self, raw: &str) -> Result<ParamValue, ConversionError> {
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConversionError::new(self.tag(), raw, "expected ASCII digits"));
        }
        raw.parse::<i64>()
            .map(ParamValue::Int)
            .map_err(|e| ConversionError::new(self.tag(), raw, e.to_string()))
    }
}

/// Digits with an optional `.` fraction. No sign, exponent, or whitespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatConverter;

impl Converter for FloatConverter {
    fn tag(&self) -> &str {
        "float"
    }

    fn convert(&self, raw: &str) -> Result<ParamValue, ConversionError> {
        let (whole, fraction) = match raw.split_once('.') {
            Some((w, f)) => (w, Some(f)),
            None => (raw, None),
        };
        let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if !digits(whole) || fraction.is_some_and(|f| !digits(f)) {
            return Err(ConversionError::new(self.tag(), raw, "expected a decimal number"));
        }
        raw.parse::<f64>()
            .map(ParamValue::Float)
            .map_err(|e| ConversionError::new(self.tag(), raw, e.to_string()))
    }
}

/// Canonical hyphenated UUID.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidConverter;

impl Converter for UuidConverter {
    fn tag(&self) -> &str {
        "uuid"
    }

    fn convert(&self, raw: &str) -> Result<ParamValue, ConversionError> {
        // Uuid::parse_str also accepts braced, URN and simple forms.
        if raw.len() != 36 {
            return Err(ConversionError::new(self.tag(), raw, "expected hyphenated UUID"));
        }
        Uuid::parse_str(raw)
            .map(ParamValue::Uuid)
            .map_err(|e| ConversionError::new(self.tag(), raw, e.to_string()))
    }
}

/// Catch-all: the remainder of the path, `/` included. Must be last.
///
/// Segments are percent-decoded, except that a `%2F` inside a segment is
/// kept as `%2F`, so only real separators show up as `/`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathConverter;

impl Converter for PathConverter {
    fn tag(&self) -> &str {
        "path"
    }

    fn convert(&self, raw: &str) -> Result<ParamValue, ConversionError> {
        if raw.is_empty() {
            return Err(ConversionError::new(self.tag(), raw, "expected a non-empty path"));
        }
        Ok(ParamValue::Path(raw.to_string()))
    }

    fn is_catch_all(&self) -> bool {
        true
    }
}

/// Mapping from converter tag to converter.
///
/// # Example
///
/// ```rust
/// use dyne_router::{ConverterRegistry, ParamValue};
///
/// let registry = ConverterRegistry::default();
/// let int = registry.get("int").unwrap();
/// assert_eq!(int.convert("42").unwrap(), ParamValue::Int(42));
/// assert!(int.convert("+42").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ConverterRegistry {
    converters: HashMap<String, Arc<dyn Converter>>,
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(StrConverter);
        registry.register(IntConverter);
        registry.register(FloatConverter);
        registry.register(UuidConverter);
        registry.register(PathConverter);
        registry
    }
}

impl ConverterRegistry {
    /// Creates a registry with no converters, not even `str`.
    pub fn empty() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// Registers a converter under its tag, replacing any previous one.
    pub fn register<C: Converter>(&mut self, converter: C) -> &mut Self {
        self.converters
            .insert(converter.tag().to_string(), Arc::new(converter));
        self
    }

    /// Looks up a converter by tag.
    pub fn get(&self, tag: &str) -> Option<Arc<dyn Converter>> {
        self.converters.get(tag).cloned()
    }

    /// Returns true if a converter is registered for `tag`.
    pub fn contains(&self, tag: &str) -> bool {
        self.converters.contains_key(tag)
    }
}
