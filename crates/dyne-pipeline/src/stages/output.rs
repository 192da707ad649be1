//! Output serialization stage.

use std::sync::Arc;

use dyne_core::{BoxFuture, FieldErrors, Response, SerializationError};
use http::header::CONTENT_TYPE;
use http::StatusCode;
use serde_json::Value;

use crate::metadata::{SchemaRef, StageKind, StageMetadata};
use crate::schema::Schema;
use crate::stage::Stage;

/// Encodes the handler's response object with a schema.
///
/// The handler attaches an object ([`Response::with_object`]); this stage
/// encodes it (element by element for arrays) into a JSON body and applies
/// the declared status. A missing object, or one the schema rejects, is a
/// [`SerializationError`].
///
/// # Example
///
/// ```
/// use dyne_core::Response;
/// use dyne_pipeline::{OutputStage, Stage, TypedSchema};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Item { name: String }
///
/// # tokio_test::block_on(async {
/// let stage = OutputStage::new(TypedSchema::<Item>::new()).status(201);
/// let mut resp = Response::new().with_object(serde_json::json!({"name": "pen"}));
/// stage.apply_response(&mut resp).await.unwrap();
/// assert_eq!(resp.status().as_u16(), 201);
/// assert_eq!(resp.body(), r#"{"name":"pen"}"#);
/// # });
/// ```
pub struct OutputStage {
    schema: Arc<dyn Schema>,
    status: StatusCode,
    description: Option<String>,
}

impl OutputStage {
    /// Encodes with `schema`, responding 200.
    pub fn new(schema: impl Schema) -> Self {
        Self {
            schema: Arc::new(schema),
            status: StatusCode::OK,
            description: None,
        }
    }

    /// Declared success status. Invalid codes are ignored.
    #[must_use]
    pub fn status(mut self, status: u16) -> Self {
        if let Ok(status) = StatusCode::from_u16(status) {
            self.status = status;
        }
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn encode(&self, object: &Value) -> Result<Value, SerializationError> {
        let failed = |errors: FieldErrors| {
            SerializationError::with_fields(
                format!("response object does not match schema `{}`", self.schema.id()),
                errors,
            )
        };
        match object {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                let mut errors = FieldErrors::new();
                for (i, item) in items.iter().enumerate() {
                    match self.schema.encode(item) {
                        Ok(v) => out.push(v),
                        Err(e) => errors.merge_prefixed(&format!("[{i}]"), e),
                    }
                }
                if errors.is_empty() {
                    Ok(Value::Array(out))
                } else {
                    Err(failed(errors))
                }
            }
            other => self.schema.encode(other).map_err(failed),
        }
    }
}

impl Stage for OutputStage {
    fn name(&self) -> &'static str {
        "output"
    }

    fn metadata(&self) -> StageMetadata {
        StageMetadata {
            schema: Some(SchemaRef {
                id: self.schema.id().to_string(),
                description: self.schema.description().map(str::to_string),
            }),
            status_codes: vec![self.status.as_u16()],
            description: self.description.clone(),
            ..StageMetadata::new(StageKind::Output)
        }
    }

    fn apply_response<'a>(&'a self, resp: &'a mut Response) -> BoxFuture<'a, Result<(), SerializationError>> {
        Box::pin(async move {
            let object = resp
                .take_object()
                .ok_or_else(|| SerializationError::new("handler did not attach a response object"))?;
            let encoded = self.encode(&object)?;
            let body = serde_json::to_vec(&encoded).map_err(|e| SerializationError::new(e.to_string()))?;
            resp.set_header(CONTENT_TYPE.as_str(), "application/json");
            resp.set_body(body);
            resp.set_status(self.status);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, ObjectSchema, TypedSchema};
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Item {
        name: String,
        #[serde(default)]
        qty: u32,
    }

    #[tokio::test]
    async fn test_missing_object_is_serialization_error() {
        let stage = OutputStage::new(TypedSchema::<Item>::new());
        let mut resp = Response::text("raw");
        let err = stage.apply_response(&mut resp).await.unwrap_err();
        assert!(err.message.contains("response object"));
    }

    #[tokio::test]
    async fn test_list_is_encoded_per_item() {
        let stage = OutputStage::new(TypedSchema::<Item>::new());
        let mut resp = Response::new().with_object(serde_json::json!([{"name": "a"}, {"name": "b", "qty": 2}]));
        stage.apply_response(&mut resp).await.unwrap();
        let body: Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body, serde_json::json!([{"name": "a", "qty": 0}, {"name": "b", "qty": 2}]));
        assert_eq!(resp.header("content-type"), Some("application/json"));
    }

    #[tokio::test]
    async fn test_bad_item_reports_index() {
        let schema = ObjectSchema::builder("Item").required("name", FieldType::String).build();
        let stage = OutputStage::new(schema);
        let mut resp = Response::new().with_object(serde_json::json!([{"name": "a"}, {"qty": 1}]));
        let err = stage.apply_response(&mut resp).await.unwrap_err();
        assert!(err.fields.get("[1].name").is_some());
    }

    #[tokio::test]
    async fn test_single_object_with_declared_status() {
        let stage = OutputStage::new(TypedSchema::<Item>::new()).status(201);
        let mut resp = Response::new().with_object(serde_json::json!({"name": "a"}));
        stage.apply_response(&mut resp).await.unwrap();
        assert_eq!(resp.body(), r#"{"name":"a","qty":0}"#);
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert!(resp.object().is_none());
    }
}
