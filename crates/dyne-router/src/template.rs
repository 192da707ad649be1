//! Route template compilation and reverse URL building.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::converter::{Converter, ConverterRegistry, ParamValue, DEFAULT_CONVERTER};
use crate::error::{BuildError, RouteTemplateError};

/// One compiled template segment.
#[derive(Debug, Clone)]
pub enum Segment {
    /// Literal text that must match exactly.
    Literal(String),
    /// A `{name}` or `{name:tag}` placeholder.
    Param {
        /// Parameter name.
        name: String,
        /// Converter tag as written (or the default).
        tag: String,
        /// Resolved converter.
        converter: Arc<dyn Converter>,
    },
}

impl Segment {
    /// Key used to tell tree siblings apart: the literal text, or
    /// `{name:tag}` for placeholders.
    pub(crate) fn key(&self) -> String {
        match self {
            Self::Literal(text) => text.clone(),
            Self::Param { name, tag, .. } => format!("{{{name}:{tag}}}"),
        }
    }
}

/// A compiled, immutable route template.
///
/// # Example
///
/// ```rust
/// use dyne_router::{ConverterRegistry, PathTemplate, ParamValue};
///
/// let registry = ConverterRegistry::default();
/// let template = PathTemplate::compile("/items/{id:int}", &registry).unwrap();
/// assert_eq!(template.param_names().collect::<Vec<_>>(), vec!["id"]);
///
/// let url = template.build([("id", ParamValue::Int(7))]).unwrap();
/// assert_eq!(url, "/items/7");
/// ```
#[derive(Debug, Clone)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Compiles `template` against the converters in `registry`.
    pub fn compile(template: &str, registry: &ConverterRegistry) -> Result<Self, RouteTemplateError> {
        if !template.starts_with('/') {
            return Err(RouteTemplateError::MissingLeadingSlash {
                template: template.to_string(),
            });
        }
        check_braces(template)?;

        let mut segments = Vec::new();
        let mut seen = HashSet::new();
        for part in template.split('/').filter(|s| !s.is_empty()) {
            if let Some(Segment::Param { name, converter, .. }) = segments.last() {
                if converter.is_catch_all() {
                    return Err(RouteTemplateError::CatchAllNotLast { name: name.clone() });
                }
            }
            let segment = parse_segment(part, registry)?;
            if let Segment::Param { name, .. } = &segment {
                if !seen.insert(name.clone()) {
                    return Err(RouteTemplateError::DuplicateParam {
                        name: name.clone(),
                        template: template.to_string(),
                    });
                }
            }
            segments.push(segment);
        }

        Ok(Self {
            raw: normalize(template),
            segments,
        })
    }

    /// The template text, trailing slash removed.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Compiled segments in order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Parameter names in template order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Parameter names paired with their converter tags.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param { name, tag, .. } => Some((name.as_str(), tag.as_str())),
            Segment::Literal(_) => None,
        })
    }

    /// Builds a concrete path by substituting `values` into placeholders.
    ///
    /// Every value must survive its placeholder's converter, so a URL built
    /// here always routes back to this template. Extra values are ignored.
    pub fn build<I, K, V>(&self, values: I) -> Result<String, BuildError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ParamValue>,
    {
        let values: Vec<(K, ParamValue)> = values.into_iter().map(|(k, v)| (k, v.into())).collect();
        if self.segments.is_empty() {
            return Ok("/".to_string());
        }

        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Param { name, converter, .. } => {
                    let value = values
                        .iter()
                        .find(|(k, _)| k.as_ref() == name)
                        .map(|(_, v)| v.to_string())
                        .ok_or_else(|| BuildError::MissingParam(name.clone()))?;
                    converter.convert(&value)?;
                    if converter.is_catch_all() {
                        let encoded: Vec<_> = value.split('/').map(urlencoding::encode).collect();
                        out.push_str(&encoded.join("/"));
                    } else {
                        out.push_str(&urlencoding::encode(&value));
                    }
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn normalize(template: &str) -> String {
    let trimmed = template.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn check_braces(template: &str) -> Result<(), RouteTemplateError> {
    let mut open = false;
    for c in template.chars() {
        match (c, open) {
            ('{', false) => open = true,
            ('}', true) => open = false,
            ('{' | '}', _) => {
                return Err(RouteTemplateError::UnbalancedBraces {
                    template: template.to_string(),
                })
            }
            ('/', true) => {
                return Err(RouteTemplateError::UnbalancedBraces {
                    template: template.to_string(),
                })
            }
            _ => {}
        }
    }
    if open {
        return Err(RouteTemplateError::UnbalancedBraces {
            template: template.to_string(),
        });
    }
    Ok(())
}

fn parse_segment(part: &str, registry: &ConverterRegistry) -> Result<Segment, RouteTemplateError> {
    if !part.contains('{') {
        return Ok(Segment::Literal(part.to_string()));
    }

    let inner = part
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| RouteTemplateError::MixedSegment {
            segment: part.to_string(),
        })?;

    let (name, tag) = match inner.split_once(':') {
        Some((name, tag)) => (name.trim(), tag.trim()),
        None => (inner.trim(), DEFAULT_CONVERTER),
    };
    if name.is_empty() {
        return Err(RouteTemplateError::EmptyName {
            segment: part.to_string(),
        });
    }

    let converter = registry
        .get(tag)
        .ok_or_else(|| RouteTemplateError::UnknownConverter {
            name: name.to_string(),
            converter: tag.to_string(),
        })?;

    Ok(Segment::Param {
        name: name.to_string(),
        tag: tag.to_string(),
        converter,
    })
}
