//! Schema seam.
//!
//! Stages do not know any schema language. They hand raw input to a
//! [`Schema`], which decodes it into whatever typed value the handler wants,
//! or encodes a handler's output object. Two implementations ship here:
//! [`TypedSchema`] for serde types and [`ObjectSchema`] for declarative
//! field checks.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use dyne_core::FieldErrors;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Raw input gathered from one request location.
#[derive(Debug, Clone, PartialEq)]
pub enum RawInput {
    /// Structured JSON (request body).
    Json(Value),
    /// String pairs (query, form, headers, cookies), in request order.
    Pairs(Vec<(String, String)>),
}

/// A decoded value, injected into the request state as-is.
pub type Decoded = Box<dyn Any + Send + Sync>;

/// Decodes request input and encodes response objects.
pub trait Schema: Send + Sync + 'static {
    /// Identifier for documentation.
    fn id(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Decodes raw input. Errors are keyed by field path, `""` for the
    /// input as a whole.
    fn decode(&self, input: RawInput) -> Result<Decoded, FieldErrors>;

    /// Validates one output object and returns its canonical JSON form.
    fn encode(&self, value: &Value) -> Result<Value, FieldErrors>;
}

impl fmt::Debug for dyn Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema").field("id", &self.id()).finish()
    }
}

/// Schema backed by a serde type.
///
/// Decoding is `T`'s own deserialization: the injected value is a `T`, and
/// no coercion happens beyond what `T`'s `Deserialize` accepts. String-pair
/// locations go through URL-encoded deserialization, so numeric fields
/// parse from their text form.
///
/// # Example
///
/// ```
/// use dyne_pipeline::{RawInput, Schema, TypedSchema};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Page { page: u32 }
///
/// let schema = TypedSchema::<Page>::new();
/// let decoded = schema
///     .decode(RawInput::Pairs(vec![("page".into(), "2".into())]))
///     .unwrap();
/// assert_eq!(decoded.downcast_ref::<Page>(), Some(&Page { page: 2 }));
/// ```
pub struct TypedSchema<T> {
    id: String,
    description: Option<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedSchema<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Schema named after `T`.
    pub fn new() -> Self {
        Self::named(short_type_name::<T>())
    }

    /// Schema with an explicit id.
    pub fn named(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            _marker: PhantomData,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl<T> Default for TypedSchema<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Schema for TypedSchema<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn decode(&self, input: RawInput) -> Result<Decoded, FieldErrors> {
        let value: T = match input {
            RawInput::Json(value) => {
                serde_json::from_value(value).map_err(|e| field_errors(&e.to_string()))?
            }
            RawInput::Pairs(pairs) => {
                let encoded = serde_urlencoded::to_string(&pairs).map_err(|e| field_errors(&e.to_string()))?;
                serde_urlencoded::from_str(&encoded).map_err(|e| field_errors(&e.to_string()))?
            }
        };
        Ok(Box::new(value))
    }

    fn encode(&self, value: &Value) -> Result<Value, FieldErrors> {
        let typed: T = serde_json::from_value(value.clone()).map_err(|e| field_errors(&e.to_string()))?;
        serde_json::to_value(&typed).map_err(|e| field_errors(&e.to_string()))
    }
}

fn short_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Maps a serde message to field errors, pulling out the field name serde
/// puts in backticks for missing and unknown fields.
fn field_errors(message: &str) -> FieldErrors {
    let mut errors = FieldErrors::new();
    let field = ["missing field `", "unknown field `", "duplicate field `"]
        .iter()
        .find_map(|prefix| message.strip_prefix(prefix))
        .and_then(|rest| rest.split_once('`'))
        .map(|(name, _)| name)
        .unwrap_or_default();
    errors.add(field, message);
    errors
}

/// Expected JSON type of an [`ObjectSchema`] field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// String.
    String,
    /// Integer.
    Integer,
    /// Any number.
    Number,
    /// Boolean.
    Boolean,
    /// Array.
    Array,
    /// Object.
    Object,
    /// No check.
    Any,
}

impl FieldType {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        }
    }
}

/// Declarative object schema: required fields, field types, and whether
/// undeclared fields are accepted. Decodes to a [`serde_json::Value`].
///
/// # Example
///
/// ```
/// use dyne_pipeline::{FieldType, ObjectSchema, RawInput, Schema};
///
/// let schema = ObjectSchema::builder("ItemCreate")
///     .required("name", FieldType::String)
///     .field("price", FieldType::Number)
///     .allow_additional(false)
///     .build();
///
/// let err = schema
///     .decode(RawInput::Json(serde_json::json!({"price": "free", "extra": 1})))
///     .unwrap_err();
/// assert!(err.get("name").is_some());
/// assert!(err.get("price").is_some());
/// assert!(err.get("extra").is_some());
/// ```
#[derive(Debug, Clone)]
pub struct ObjectSchema {
    id: String,
    description: Option<String>,
    required: Vec<String>,
    fields: IndexMap<String, FieldType>,
    allow_additional: bool,
}

impl ObjectSchema {
    /// Starts a schema builder.
    pub fn builder(id: impl Into<String>) -> ObjectSchemaBuilder {
        ObjectSchemaBuilder {
            schema: Self {
                id: id.into(),
                description: None,
                required: Vec::new(),
                fields: IndexMap::new(),
                allow_additional: true,
            },
        }
    }

    fn validate(&self, value: &Value) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        let Some(object) = value.as_object() else {
            errors.add("", "expected an object");
            return Err(errors);
        };
        for name in &self.required {
            if !object.contains_key(name) {
                errors.add(name.as_str(), "field is required");
            }
        }
        for (name, field_value) in object {
            match self.fields.get(name) {
                Some(ty) if !ty.matches(field_value) => {
                    errors.add(name.as_str(), format!("expected {}", ty.name()));
                }
                Some(_) => {}
                None if !self.allow_additional => errors.add(name.as_str(), "unknown field"),
                None => {}
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Builds an object from string pairs, converting only declared types.
    fn object_from_pairs(&self, pairs: Vec<(String, String)>) -> Result<Value, FieldErrors> {
        let mut errors = FieldErrors::new();
        let mut object = Map::new();
        for (name, raw) in pairs {
            let ty = self.fields.get(&name).copied().unwrap_or(FieldType::String);
            let converted = match ty {
                FieldType::Integer => raw.parse::<i64>().map(Value::from).ok(),
                FieldType::Number => raw
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number),
                FieldType::Boolean => match raw.as_str() {
                    "true" => Some(Value::Bool(true)),
                    "false" => Some(Value::Bool(false)),
                    _ => None,
                },
                FieldType::Array => {
                    if let Some(Value::Array(items)) = object.get_mut(&name) {
                        items.push(Value::String(raw));
                        continue;
                    }
                    Some(Value::Array(vec![Value::String(raw)]))
                }
                FieldType::String | FieldType::Object | FieldType::Any => Some(Value::String(raw)),
            };
            match converted {
                Some(value) => {
                    object.entry(name).or_insert(value);
                }
                None => errors.add(name, format!("expected {}", ty.name())),
            }
        }
        if errors.is_empty() {
            Ok(Value::Object(object))
        } else {
            Err(errors)
        }
    }
}

impl Schema for ObjectSchema {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn decode(&self, input: RawInput) -> Result<Decoded, FieldErrors> {
        let value = match input {
            RawInput::Json(value) => value,
            RawInput::Pairs(pairs) => self.object_from_pairs(pairs)?,
        };
        self.validate(&value)?;
        Ok(Box::new(value))
    }

    fn encode(&self, value: &Value) -> Result<Value, FieldErrors> {
        self.validate(value)?;
        Ok(value.clone())
    }
}

/// Builder for [`ObjectSchema`].
#[derive(Debug)]
pub struct ObjectSchemaBuilder {
    schema: ObjectSchema,
}

impl ObjectSchemaBuilder {
    /// Declares a required field.
    #[must_use]
    pub fn required(mut self, name: &str, ty: FieldType) -> Self {
        self.schema.required.push(name.to_string());
        self.schema.fields.insert(name.to_string(), ty);
        self
    }

    /// Declares an optional field.
    #[must_use]
    pub fn field(mut self, name: &str, ty: FieldType) -> Self {
        self.schema.fields.insert(name.to_string(), ty);
        self
    }

    /// Whether undeclared fields are accepted (default true).
    #[must_use]
    pub fn allow_additional(mut self, allow: bool) -> Self {
        self.schema.allow_additional = allow;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.schema.description = Some(description.into());
        self
    }

    /// Builds the schema.
    pub fn build(self) -> ObjectSchema {
        self.schema
    }
}
