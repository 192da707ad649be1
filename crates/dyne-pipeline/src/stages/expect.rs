//! Documentation-only stage listing additional expected responses.

use std::sync::Arc;

use crate::metadata::{ResponseDoc, SchemaRef, StageKind, StageMetadata};
use crate::schema::Schema;
use crate::stage::Stage;

/// Documents responses a route may produce beyond its main output, e.g.
/// `401 Invalid access token` or `404 Item not found`. No runtime effect.
///
/// # Example
///
/// ```
/// use dyne_pipeline::{ExpectStage, Stage};
///
/// let stage = ExpectStage::new()
///     .response(401, "Invalid access or refresh token")
///     .response(403, "Please verify your account");
/// assert_eq!(stage.metadata().status_codes, vec![401, 403]);
/// ```
#[derive(Default)]
pub struct ExpectStage {
    responses: Vec<(u16, Option<Arc<dyn Schema>>, String)>,
}

impl ExpectStage {
    /// Creates an empty expectation list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a response with a description only.
    #[must_use]
    pub fn response(mut self, status: u16, description: impl Into<String>) -> Self {
        self.responses.push((status, None, description.into()));
        self
    }

    /// Adds a response with a body schema.
    #[must_use]
    pub fn response_with_schema(mut self, status: u16, schema: impl Schema, description: impl Into<String>) -> Self {
        self.responses.push((status, Some(Arc::new(schema)), description.into()));
        self
    }
}

impl Stage for ExpectStage {
    fn name(&self) -> &'static str {
        "expect"
    }

    fn metadata(&self) -> StageMetadata {
        StageMetadata {
            status_codes: self.responses.iter().map(|(s, _, _)| *s).collect(),
            responses: self
                .responses
                .iter()
                .map(|(status, schema, description)| ResponseDoc {
                    status: *status,
                    schema: schema.as_ref().map(|s| SchemaRef {
                        id: s.id().to_string(),
                        description: s.description().map(str::to_string),
                    }),
                    description: description.clone(),
                })
                .collect(),
            ..StageMetadata::new(StageKind::Expect)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, ObjectSchema};

    #[test]
    fn test_metadata_lists_responses_in_order() {
        let problem = ObjectSchema::builder("Problem").required("detail", FieldType::String).build();
        let stage = ExpectStage::new()
            .response(404, "Item not found")
            .response_with_schema(409, problem, "Conflict");
        let meta = stage.metadata();
        assert_eq!(meta.kind, StageKind::Expect);
        assert_eq!(meta.responses.len(), 2);
        assert_eq!(meta.responses[1].schema.as_ref().unwrap().id, "Problem");
        assert!(meta.schema.is_none());
    }
}
