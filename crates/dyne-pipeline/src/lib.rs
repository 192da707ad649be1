//! # Dyne Pipeline
//!
//! Composable stages that wrap a handler with validation, serialization and
//! documentation, without tying the core to a schema library.
//!
//! ## Stage protocol
//!
//! A [`Stage`] has a request phase (may reject with a
//! [`ValidationError`](dyne_core::ValidationError)), a response phase (may
//! fail with a [`SerializationError`](dyne_core::SerializationError)), and
//! declarative [`StageMetadata`]. A [`StageChain`] runs request phases in
//! declaration order and response phases in reverse.
//!
//! ## Built-in stages
//!
//! | Stage | Runtime effect | Metadata |
//! |---|---|---|
//! | [`InputStage`] | decode a location, inject under a key | location, schema, key |
//! | [`OutputStage`] | encode the response object | schema, status |
//! | [`ExpectStage`] | none | documented responses |
//! | [`WebhookStage`] | none | webhook name, method |
//!
//! ## Uploads
//!
//! Input stages reading `body` or `form` accept `multipart/form-data`. Text
//! parts are decoded by the schema; files are checked against [`FileRule`]s
//! and injected as [`UploadedFiles`]. See [`secure_filename`] for how client
//! filenames are reduced.
//!
//! ## Schemas
//!
//! Stages delegate to the [`Schema`] trait. [`TypedSchema`] wraps any serde
//! type; [`ObjectSchema`] checks required fields and field types.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod chain;
mod error;
mod metadata;
mod multipart;
mod schema;
mod stage;
pub mod stages;

pub use chain::{BoxedStage, StageChain};
pub use error::StageConfigError;
pub use metadata::{Location, ResponseDoc, SchemaRef, StageKind, StageMetadata, WebhookDoc};
pub use multipart::{
    secure_filename, validate_filename, File, FileRule, FilenameError, MultipartConfig, MultipartError, MultipartForm,
    UploadedFiles,
};
pub use schema::{Decoded, FieldType, ObjectSchema, ObjectSchemaBuilder, RawInput, Schema, TypedSchema};
pub use stage::Stage;
pub use stages::{ExpectStage, InputStage, OutputStage, WebhookStage};
