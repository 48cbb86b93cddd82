//! URI templates and positional segment matching.
//!
//! # Responsibilities
//! - Parse an endpoint URI such as `/users/{id}/requests` into segments
//! - Match pre-split request segments, binding named parameters
//! - Order templates by specificity for deterministic resolution
//!
//! # Design Decisions
//! - Empty segments are dropped, so leading/trailing slashes are insignificant
//! - Literal segments compare case-sensitively
//! - Parameter values are restricted to `[A-Za-z0-9_]+`
//! - No regex: one pass over the segments, anchored by the length check

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

/// Errors raised while parsing a URI template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template '{template}': invalid parameter segment '{segment}'")]
    InvalidParameter { template: String, segment: String },

    #[error("template '{template}': parameter '{name}' declared twice")]
    DuplicateParameter { template: String, name: String },
}

/// One segment of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

impl Segment {
    pub fn is_param(&self) -> bool {
        matches!(self, Segment::Param(_))
    }
}

/// Path parameters bound by a successful match, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathArgs(Vec<(String, String)>);

impl PathArgs {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PathArgs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A parsed endpoint URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    normalized: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parse a template. Segments of the form `{name}` become parameters.
    pub fn parse(uri: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        for raw in split_segments(uri) {
            let segment = match raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) if is_segment_value(name) => {
                    if segments.iter().any(|s| matches!(s, Segment::Param(n) if n == name)) {
                        return Err(TemplateError::DuplicateParameter {
                            template: uri.to_string(),
                            name: name.to_string(),
                        });
                    }
                    Segment::Param(name.to_string())
                }
                Some(_) => {
                    return Err(TemplateError::InvalidParameter {
                        template: uri.to_string(),
                        segment: raw.to_string(),
                    })
                }
                None if raw.contains(['{', '}']) => {
                    return Err(TemplateError::InvalidParameter {
                        template: uri.to_string(),
                        segment: raw.to_string(),
                    })
                }
                None => Segment::Literal(raw.to_string()),
            };
            segments.push(segment);
        }

        let normalized = format!("/{}", split_segments(uri).collect::<Vec<_>>().join("/"));
        Ok(Self {
            normalized,
            segments,
        })
    }

    /// The template with redundant slashes removed, e.g. `/airports/{code}`.
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Match already-split request segments against the whole template.
    pub fn matches(&self, request_segments: &[&str]) -> Option<PathArgs> {
        if request_segments.len() != self.segments.len() {
            return None;
        }

        let mut args = Vec::new();
        for (segment, value) in self.segments.iter().zip(request_segments) {
            match segment {
                Segment::Literal(text) if text == value => {}
                Segment::Param(name) if is_segment_value(value) => {
                    args.push((name.clone(), value.to_string()));
                }
                _ => return None,
            }
        }
        Some(PathArgs(args))
    }

    /// Match a request path (query string ignored).
    pub fn matches_path(&self, path: &str) -> Option<PathArgs> {
        let path = path.split('?').next().unwrap_or_default();
        let segments: Vec<&str> = split_segments(path).collect();
        self.matches(&segments)
    }

    /// Total order used to rank templates: shorter templates first, then,
    /// position by position, a literal sorts before a parameter.
    pub fn cmp_specificity(&self, other: &Self) -> Ordering {
        self.len().cmp(&other.len()).then_with(|| {
            self.segments
                .iter()
                .map(Segment::is_param)
                .cmp(other.segments.iter().map(Segment::is_param))
        })
    }

    /// True when both templates match exactly the same set of paths.
    pub fn same_shape(&self, other: &Self) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|pair| match pair {
                    (Segment::Literal(a), Segment::Literal(b)) => a == b,
                    (Segment::Param(_), Segment::Param(_)) => true,
                    _ => false,
                })
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

/// Split a path on `/`, dropping empty segments.
pub fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn is_segment_value(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
