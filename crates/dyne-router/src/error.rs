//! Error types for template compilation, segment conversion, and URL building.

use thiserror::Error;

/// A route template could not be compiled.
///
/// These errors surface at registration time and are meant to stop
/// application startup: a template that fails to compile can never match.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteTemplateError {
    /// The template does not begin with `/`.
    #[error("route template `{template}` must start with '/'")]
    MissingLeadingSlash {
        /// The offending template.
        template: String,
    },

    /// A `{` has no matching `}` (or vice versa).
    #[error("route template `{template}` has unbalanced braces")]
    UnbalancedBraces {
        /// The offending template.
        template: String,
    },

    /// A placeholder shares a segment with literal text, e.g. `/file{id}.json`.
    #[error("placeholder in segment `{segment}` must span the whole segment")]
    MixedSegment {
        /// The offending segment.
        segment: String,
    },

    /// A placeholder has no name, e.g. `{}` or `{:int}`.
    #[error("placeholder in segment `{segment}` has an empty name")]
    EmptyName {
        /// The offending segment.
        segment: String,
    },

    /// Two placeholders in one template share a name.
    #[error("parameter `{name}` appears more than once in `{template}`")]
    DuplicateParam {
        /// The repeated parameter name.
        name: String,
        /// The offending template.
        template: String,
    },

    /// A placeholder names a converter that is not registered.
    #[error("unknown converter `{converter}` for parameter `{name}`")]
    UnknownConverter {
        /// The parameter name.
        name: String,
        /// The converter tag that could not be resolved.
        converter: String,
    },

    /// A catch-all converter is followed by more segments.
    #[error("catch-all parameter `{name}` must be the last segment")]
    CatchAllNotLast {
        /// The parameter name.
        name: String,
    },
}

/// A raw path segment could not be converted into a typed value.
///
/// At match time this is never a request failure: the router treats it as
/// "this template does not match" and keeps looking.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot convert `{raw}` with converter `{converter}`: {reason}")]
pub struct ConversionError {
    /// The converter that rejected the value.
    pub converter: String,
    /// The raw segment text.
    pub raw: String,
    /// Short human-readable reason.
    pub reason: String,
}

impl ConversionError {
    /// Creates a new conversion error.
    pub fn new(
        converter: impl Into<String>,
        raw: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            converter: converter.into(),
            raw: raw.into(),
            reason: reason.into(),
        }
    }
}

/// A concrete path could not be built from a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A placeholder had no value supplied.
    #[error("missing value for parameter `{0}`")]
    MissingParam(String),

    /// A supplied value does not satisfy the placeholder's converter.
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}
