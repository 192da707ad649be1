//! Input validation stage.
//!
//! Gathers raw input from one request location, decodes it with a schema,
//! and injects the decoded value into the request state under a key. The
//! handler reads it back with `req.injected::<T>(key)`.
//!
//! Multipart bodies split in two: text fields go through the schema, files
//! are checked against their [`FileRule`]s and injected separately as
//! [`UploadedFiles`].

use std::str::FromStr;
use std::sync::Arc;

use dyne_core::{BoxFuture, FieldErrors, Request, ValidationError};
use http::StatusCode;
use serde_json::Value;

use crate::error::StageConfigError;
use crate::metadata::{Location, SchemaRef, StageKind, StageMetadata};
use crate::multipart::{FileRule, MultipartConfig, MultipartForm, UploadedFiles};
use crate::schema::{RawInput, Schema};
use crate::stage::Stage;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const YAML_CONTENT_TYPES: [&str; 3] = ["application/yaml", "application/x-yaml", "text/yaml"];

/// Decodes one request location and injects the result.
///
/// # Example
///
/// ```
/// use dyne_core::Request;
/// use dyne_pipeline::{InputStage, Stage, TypedSchema};
/// use http::Method;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Search { q: String }
///
/// # tokio_test::block_on(async {
/// let stage = InputStage::at(TypedSchema::<Search>::new(), "params").unwrap();
/// let mut req = Request::new(Method::GET, "/search?q=rust".parse().unwrap());
/// stage.apply_request(&mut req).await.unwrap();
/// assert_eq!(req.injected::<Search>("query"), Some(&Search { q: "rust".into() }));
/// # });
/// ```
pub struct InputStage {
    schema: Arc<dyn Schema>,
    location: Location,
    key: String,
    status: StatusCode,
    description: Option<String>,
    files_key: String,
    file_rules: Vec<(String, FileRule)>,
    multipart: MultipartConfig,
}

impl InputStage {
    /// Reads `location` with `schema`, injecting under the location's
    /// default key.
    pub fn new(schema: impl Schema, location: Location) -> Self {
        Self {
            schema: Arc::new(schema),
            location,
            key: location.default_key().to_string(),
            status: StatusCode::UNPROCESSABLE_ENTITY,
            description: None,
            files_key: "files".to_string(),
            file_rules: Vec::new(),
            multipart: MultipartConfig::default(),
        }
    }

    /// Like [`InputStage::new`], parsing the location name (`media`,
    /// `params`, ... are accepted aliases).
    pub fn at(schema: impl Schema, location: &str) -> Result<Self, StageConfigError> {
        Ok(Self::new(schema, Location::from_str(location)?))
    }

    /// Injects under `key` instead of the default.
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Status for schema failures (default 422). Must be a 4xx code.
    #[must_use]
    pub fn status(mut self, status: StatusCode) -> Self {
        if status.is_client_error() {
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

    /// Checks files sent under `field` with `rule`.
    #[must_use]
    pub fn file(mut self, field: impl Into<String>, rule: FileRule) -> Self {
        self.file_rules.push((field.into(), rule));
        self
    }

    /// Injects uploaded files under `key` (default `files`).
    #[must_use]
    pub fn files_key(mut self, key: impl Into<String>) -> Self {
        self.files_key = key.into();
        self
    }

    /// Replaces the multipart parsing limits.
    #[must_use]
    pub fn multipart_limits(mut self, config: MultipartConfig) -> Self {
        self.multipart = config;
        self
    }

    fn malformed(&self, message: impl ToString) -> ValidationError {
        let mut fields = FieldErrors::new();
        fields.add(self.location.as_str(), message.to_string());
        ValidationError::with_fields(format!("malformed {}", self.location), fields).with_status(StatusCode::BAD_REQUEST)
    }

    async fn gather(&self, req: &Request) -> Result<(RawInput, Option<UploadedFiles>), ValidationError> {
        let content_type = req.content_type();
        let content_type = content_type.as_deref();
        let raw = match self.location {
            Location::Body | Location::Form if MultipartForm::is_multipart(req) => {
                let form = MultipartForm::parse(req, &self.multipart)
                    .await
                    .map_err(|e| self.malformed(e))?;
                let files = self.check_files(form.files)?;
                return Ok((RawInput::Pairs(form.fields), Some(files)));
            }
            Location::Body if content_type == Some(FORM_CONTENT_TYPE) => {
                req.form_pairs().map(RawInput::Pairs).map_err(|e| self.malformed(e))?
            }
            Location::Body if content_type.is_some_and(|ct| YAML_CONTENT_TYPES.contains(&ct)) => self.yaml(req)?,
            Location::Body => {
                if req.body().is_empty() {
                    RawInput::Json(Value::Null)
                } else {
                    req.json::<Value>().map(RawInput::Json).map_err(|e| self.malformed(e))?
                }
            }
            Location::Yaml => self.yaml(req)?,
            Location::Form => req.form_pairs().map(RawInput::Pairs).map_err(|e| self.malformed(e))?,
            Location::Query => req.query_pairs().map(RawInput::Pairs).map_err(|e| self.malformed(e))?,
            Location::Header => RawInput::Pairs(
                req.headers()
                    .iter()
                    .filter_map(|(name, value)| {
                        let value = value.to_str().ok()?;
                        Some((name.as_str().replace('-', "_"), value.to_string()))
                    })
                    .collect(),
            ),
            Location::Cookie => RawInput::Pairs(req.cookies()),
        };
        Ok((raw, None))
    }

    fn yaml(&self, req: &Request) -> Result<RawInput, ValidationError> {
        if req.body().is_empty() {
            return Ok(RawInput::Json(Value::Null));
        }
        serde_yaml::from_slice::<Value>(req.body())
            .map(RawInput::Json)
            .map_err(|e| self.malformed(format!("invalid YAML: {e}")))
    }

    fn check_files(&self, mut files: Vec<crate::multipart::File>) -> Result<UploadedFiles, ValidationError> {
        let mut errors = FieldErrors::new();
        for (field, rule) in &self.file_rules {
            let mut present = false;
            for file in files.iter_mut().filter(|f| f.field() == field) {
                present = true;
                for problem in rule.check(file) {
                    errors.add(field.as_str(), problem);
                }
            }
            if rule.is_required() && !present {
                errors.add(field.as_str(), "file is required");
            }
        }
        if errors.is_empty() {
            return Ok(files.into());
        }
        let mut fields = FieldErrors::new();
        fields.merge_prefixed(self.location.as_str(), errors);
        Err(ValidationError::with_fields(format!("invalid files in {}", self.location), fields).with_status(self.status))
    }
}

impl Stage for InputStage {
    fn name(&self) -> &'static str {
        "input"
    }

    fn metadata(&self) -> StageMetadata {
        StageMetadata {
            location: Some(self.location),
            schema: Some(SchemaRef {
                id: self.schema.id().to_string(),
                description: self.schema.description().map(str::to_string),
            }),
            status_codes: vec![self.status.as_u16()],
            key: Some(self.key.clone()),
            description: self.description.clone(),
            ..StageMetadata::new(StageKind::Input)
        }
    }

    fn apply_request<'a>(&'a self, req: &'a mut Request) -> BoxFuture<'a, Result<(), ValidationError>> {
        Box::pin(async move {
            let (raw, files) = self.gather(req).await?;
            match self.schema.decode(raw) {
                Ok(decoded) => {
                    req.state_mut().inject_boxed(self.key.clone(), decoded);
                    if let Some(files) = files {
                        tracing::debug!(count = files.len(), key = %self.files_key, "files uploaded");
                        req.state_mut().inject(self.files_key.clone(), files);
                    }
                    Ok(())
                }
                Err(errors) => {
                    let mut fields = FieldErrors::new();
                    fields.merge_prefixed(self.location.as_str(), errors);
                    Err(ValidationError::with_fields(
                        format!("invalid {} for schema `{}`", self.location, self.schema.id()),
                        fields,
                    )
                    .with_status(self.status))
                }
            }
        })
    }

    fn injection_key(&self) -> Option<&str> {
        Some(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, ObjectSchema, TypedSchema};
    use http::Method;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        name: String,
        price: f64,
    }

    fn post(body: &str) -> Request {
        Request::new(Method::POST, "/items".parse().unwrap())
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
    }

    #[tokio::test]
    async fn test_body_decodes_into_data() {
        let stage = InputStage::new(TypedSchema::<Item>::new(), Location::Body);
        let mut req = post(r#"{"name":"pen","price":1.5}"#);
        stage.apply_request(&mut req).await.unwrap();
        let expected: Item = serde_json::from_str(r#"{"name":"pen","price":1.5}"#).unwrap();
        assert_eq!(req.injected::<Item>("data"), Some(&expected));
    }

    #[tokio::test]
    async fn test_schema_failure_is_422_with_fields() {
        let stage = InputStage::new(TypedSchema::<Item>::new(), Location::Body);
        let mut req = post(r#"{"price":1.5}"#);
        let err = stage.apply_request(&mut req).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.fields.get("body.name").is_some());
        assert!(!req.state().has_injected("data"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_400() {
        let stage = InputStage::new(TypedSchema::<Item>::new(), Location::Body);
        let err = stage.apply_request(&mut post("{oops")).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_custom_status_and_key() {
        let stage = InputStage::new(TypedSchema::<Item>::new(), Location::Body)
            .key("item")
            .status(StatusCode::BAD_REQUEST);
        let err = stage.apply_request(&mut post("{}")).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let mut req = post(r#"{"name":"a","price":2}"#);
        stage.apply_request(&mut req).await.unwrap();
        assert!(req.injected::<Item>("item").is_some());
    }

    #[tokio::test]
    async fn test_body_accepts_urlencoded_form() {
        let schema = ObjectSchema::builder("Item")
            .required("name", FieldType::String)
            .required("price", FieldType::Number)
            .build();
        let stage = InputStage::new(schema, Location::Body);
        let mut req = Request::new(Method::POST, "/items".parse().unwrap())
            .with_header("content-type", "application/x-www-form-urlencoded")
            .with_body("name=pen&price=2.5");
        stage.apply_request(&mut req).await.unwrap();
        let value = req.injected::<Value>("data").unwrap();
        assert_eq!(value["price"], 2.5);
    }

    #[tokio::test]
    async fn test_headers_normalize_dashes() {
        #[derive(Debug, Serialize, Deserialize)]
        struct Version {
            x_version: String,
        }
        let stage = InputStage::at(TypedSchema::<Version>::new(), "headers").unwrap();
        let mut req = Request::new(Method::GET, "/".parse().unwrap()).with_header("X-Version", "2");
        stage.apply_request(&mut req).await.unwrap();
        assert_eq!(req.injected::<Version>("header").unwrap().x_version, "2");
    }

    #[tokio::test]
    async fn test_cookie_location() {
        #[derive(Debug, Serialize, Deserialize)]
        struct Session {
            sid: String,
        }
        let stage = InputStage::new(TypedSchema::<Session>::new(), Location::Cookie);
        let mut req = Request::new(Method::GET, "/".parse().unwrap()).with_header("cookie", "sid=abc; x=1");
        stage.apply_request(&mut req).await.unwrap();
        assert_eq!(req.injected::<Session>("cookie").unwrap().sid, "abc");
    }

    #[test]
    fn test_metadata() {
        let stage = InputStage::at(TypedSchema::<Item>::new(), "media")
            .unwrap()
            .describe("new item");
        let meta = stage.metadata();
        assert_eq!(meta.kind, StageKind::Input);
        assert_eq!(meta.location, Some(Location::Body));
        assert_eq!(meta.key.as_deref(), Some("data"));
        assert_eq!(meta.schema.unwrap().id, "Item");
        assert_eq!(meta.status_codes, vec![422]);
    }

    #[test]
    fn test_unknown_location() {
        assert!(InputStage::at(TypedSchema::<Item>::new(), "xml").is_err());
    }

    #[tokio::test]
    async fn test_yaml_location_and_content_type() {
        let stage = InputStage::at(TypedSchema::<Item>::new(), "yaml").unwrap();
        let mut req = Request::new(Method::POST, "/items".parse().unwrap()).with_body("name: pen\nprice: 1.5\n");
        stage.apply_request(&mut req).await.unwrap();
        assert_eq!(req.injected::<Item>("data").unwrap().name, "pen");

        let body = InputStage::new(TypedSchema::<Item>::new(), Location::Body);
        let mut req = Request::new(Method::POST, "/items".parse().unwrap())
            .with_header("content-type", "application/x-yaml")
            .with_body("name: ink\nprice: 3\n");
        body.apply_request(&mut req).await.unwrap();
        assert_eq!(req.injected::<Item>("data").unwrap().price, 3.0);

        let err = stage
            .apply_request(&mut Request::new(Method::POST, "/items".parse().unwrap()).with_body("name: [unclosed"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.fields.get("yaml").is_some());
    }

    fn upload(filename: &str) -> Request {
        let body = format!(
            "--B\r\n\
             Content-Disposition: form-data; name=\"name\"\r\n\r\n\
             pen\r\n\
             --B\r\n\
             Content-Disposition: form-data; name=\"photo\"; filename=\"{filename}\"\r\n\
             Content-Type: image/png\r\n\r\n\
             PNG\r\n\
             --B--\r\n"
        );
        Request::new(Method::POST, "/items".parse().unwrap())
            .with_header("content-type", "multipart/form-data; boundary=B")
            .with_body(body)
    }

    #[tokio::test]
    async fn test_multipart_form_injects_fields_and_files() {
        let schema = ObjectSchema::builder("Upload").required("name", FieldType::String).build();
        let stage = InputStage::new(schema, Location::Form).file("photo", FileRule::new().required().extensions(["png"]));
        let mut req = upload("pen.png");
        stage.apply_request(&mut req).await.unwrap();

        assert_eq!(req.injected::<Value>("data").unwrap()["name"], "pen");
        let files = req.injected::<UploadedFiles>("files").unwrap();
        let photo = files.get("photo").unwrap();
        assert_eq!(photo.filename(), Some("pen.png"));
        assert_eq!(photo.size(), 3);
    }

    #[tokio::test]
    async fn test_multipart_filename_is_rejected_or_sanitized() {
        let schema = || ObjectSchema::builder("Upload").required("name", FieldType::String).build();
        let strict = InputStage::new(schema(), Location::Body).file("photo", FileRule::new());
        let err = strict.apply_request(&mut upload("../pen.png")).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.fields.get("body.photo").unwrap(), ["filename contains unsafe characters"]);

        let lenient = InputStage::new(schema(), Location::Body)
            .files_key("uploads")
            .file("photo", FileRule::new().sanitize());
        let mut req = upload("../pen.png");
        lenient.apply_request(&mut req).await.unwrap();
        let files = req.injected::<UploadedFiles>("uploads").unwrap();
        assert_eq!(files.get("photo").unwrap().filename(), Some("pen.png"));
    }

    #[tokio::test]
    async fn test_multipart_missing_file_and_bad_body() {
        let stage = InputStage::new(TypedSchema::<Value>::new(), Location::Form)
            .file("avatar", FileRule::new().required());
        let err = stage.apply_request(&mut upload("pen.png")).await.unwrap_err();
        assert_eq!(err.fields.get("form.avatar").unwrap(), ["file is required"]);

        let mut broken = Request::new(Method::POST, "/items".parse().unwrap())
            .with_header("content-type", "multipart/form-data")
            .with_body("whatever");
        let err = stage.apply_request(&mut broken).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.fields.get("form").is_some());
    }
}
