//! Declarative stage metadata.
//!
//! Every stage describes itself with a [`StageMetadata`]. The server collects
//! these per route for documentation generators; the core never interprets
//! the schema behind a [`SchemaRef`].

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::StageConfigError;

/// What a stage does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Decodes and validates request input.
    Input,
    /// Encodes the handler's response object.
    Output,
    /// Documents additional responses.
    Expect,
    /// Marks the route as a webhook.
    Webhook,
}

/// Where in the request an input stage reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    /// Request body: JSON, or URL-encoded, multipart or YAML when the
    /// content type says so.
    Body,
    /// URL-encoded or multipart form body.
    Form,
    /// YAML body, whatever the content type.
    Yaml,
    /// Query string.
    Query,
    /// Request headers.
    Header,
    /// Cookies.
    Cookie,
}

impl Location {
    /// Canonical name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Body => "body",
            Self::Form => "form",
            Self::Yaml => "yaml",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
        }
    }

    /// Injection key used when a stage names none.
    pub fn default_key(self) -> &'static str {
        match self {
            Self::Body | Self::Form | Self::Yaml => "data",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Location {
    type Err = StageConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "body" | "media" | "json" => Ok(Self::Body),
            "form" => Ok(Self::Form),
            "yaml" => Ok(Self::Yaml),
            "query" | "params" => Ok(Self::Query),
            "header" | "headers" => Ok(Self::Header),
            "cookie" | "cookies" => Ok(Self::Cookie),
            _ => Err(StageConfigError::UnknownLocation(s.to_string())),
        }
    }
}

/// Opaque reference to a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaRef {
    /// Identifier a documentation generator can resolve.
    pub id: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One documented response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseDoc {
    /// Status code.
    pub status: u16,
    /// Body schema, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaRef>,
    /// Description.
    pub description: String,
}

/// Webhook details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookDoc {
    /// Webhook name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Group the webhook is listed under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Method the webhook is delivered with.
    pub method: String,
}

/// Metadata one stage contributes to its route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageMetadata {
    /// Stage kind.
    pub kind: StageKind,
    /// Input location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// Schema reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaRef>,
    /// Status codes the stage affects.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub status_codes: Vec<u16>,
    /// Injection key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Documented responses (expect stages).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub responses: Vec<ResponseDoc>,
    /// Webhook details (webhook stages).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookDoc>,
}

impl StageMetadata {
    /// Empty metadata of `kind`.
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            location: None,
            schema: None,
            status_codes: Vec::new(),
            key: None,
            description: None,
            responses: Vec::new(),
            webhook: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_aliases() {
        assert_eq!("media".parse::<Location>().unwrap(), Location::Body);
        assert_eq!("params".parse::<Location>().unwrap(), Location::Query);
        assert_eq!("Headers".parse::<Location>().unwrap(), Location::Header);
        assert_eq!("YAML".parse::<Location>().unwrap(), Location::Yaml);
        assert!(matches!(
            "xml".parse::<Location>(),
            Err(StageConfigError::UnknownLocation(l)) if l == "xml"
        ));
    }

    #[test]
    fn test_default_keys() {
        assert_eq!(Location::Body.default_key(), "data");
        assert_eq!(Location::Form.default_key(), "data");
        assert_eq!(Location::Yaml.default_key(), "data");
        assert_eq!(Location::Query.default_key(), "query");
        assert_eq!(Location::Cookie.default_key(), "cookie");
    }

    #[test]
    fn test_metadata_serialization_skips_empty() {
        let meta = StageMetadata::new(StageKind::Expect);
        assert_eq!(serde_json::to_value(&meta).unwrap(), serde_json::json!({"kind": "expect"}));
    }
}
