//! Path templates compiled into a per-segment state machine.
//!
//! Each `/`-separated segment of a template becomes one [`Segment`]:
//!
//! - `users` is a literal and must match exactly.
//! - `{id}` captures the whole segment.
//! - `{name}.json` or `v{major}-{minor}` mixes literals and captures; these few
//!   segments compile to an anchored regex, everything else avoids regex.

use regex::Regex;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

use super::core::MAX_INLINE_PARAMS;

#[derive(Debug, Clone)]
pub(crate) enum Segment {
    Literal(Box<str>),
    Capture,
    Mixed { regex: Regex, count: usize },
}

/// A template that could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateError {
    pub template: String,
    pub reason: &'static str,
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid path template '{}': {}", self.template, self.reason)
    }
}

impl std::error::Error for TemplateError {}

/// Raw captures borrowed from the request path, by capture index.
pub(crate) type Captures<'p> = SmallVec<[&'p str; MAX_INLINE_PARAMS]>;

#[derive(Debug, Clone)]
pub struct PathTemplate {
    raw: Arc<str>,
    segments: Vec<Segment>,
    names: Vec<Arc<str>>,
    param_segments: usize,
}

impl PathTemplate {
    /// Compile a full template (base path already prepended).
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let err = |reason| TemplateError {
            template: template.to_string(),
            reason,
        };
        if !template.starts_with('/') {
            return Err(err("must start with '/'"));
        }

        let mut segments = Vec::new();
        let mut names: Vec<Arc<str>> = Vec::new();
        let mut param_segments = 0;

        for segment in split_path(template) {
            let parts = split_segment(segment).ok_or_else(|| err("unbalanced braces"))?;
            match parts.as_slice() {
                [] => segments.push(Segment::Literal("".into())),
                [Part::Literal(lit)] => segments.push(Segment::Literal((*lit).into())),
                [Part::Param(name)] => {
                    if name.is_empty() {
                        return Err(err("empty parameter name"));
                    }
                    segments.push(Segment::Capture);
                    names.push(Arc::from(*name));
                    param_segments += 1;
                }
                mixed => {
                    let first = names.len();
                    let mut pattern = String::from("^");
                    let mut last_was_param = false;
                    for part in mixed {
                        match part {
                            Part::Literal(lit) => {
                                pattern.push_str(&regex::escape(lit));
                                last_was_param = false;
                            }
                            Part::Param(name) => {
                                if name.is_empty() {
                                    return Err(err("empty parameter name"));
                                }
                                if last_was_param {
                                    return Err(err("adjacent parameters need a literal between them"));
                                }
                                pattern.push_str("(.+?)");
                                names.push(Arc::from(*name));
                                last_was_param = true;
                            }
                        }
                    }
                    pattern.push('$');
                    let regex = Regex::new(&pattern).map_err(|_| err("segment is not matchable"))?;
                    segments.push(Segment::Mixed {
                        regex,
                        count: names.len() - first,
                    });
                    param_segments += 1;
                }
            }
        }

        Ok(PathTemplate {
            raw: Arc::from(template),
            segments,
            names,
            param_segments,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Capture names in order of appearance.
    #[must_use]
    pub fn names(&self) -> &[Arc<str>] {
        &self.names
    }

    /// Number of segments containing at least one parameter. Lower is more specific.
    #[must_use]
    pub fn param_segments(&self) -> usize {
        self.param_segments
    }

    /// Match pre-split request segments, returning raw (still encoded) captures.
    pub(crate) fn match_segments<'p>(&self, path: &[&'p str]) -> Option<Captures<'p>> {
        if path.len() != self.segments.len() {
            return None;
        }
        let mut captures: Captures<'p> = SmallVec::new();
        for (segment, actual) in self.segments.iter().zip(path) {
            match segment {
                Segment::Literal(lit) => {
                    if lit.as_ref() != *actual {
                        return None;
                    }
                }
                Segment::Capture => {
                    if actual.is_empty() {
                        return None;
                    }
                    captures.push(actual);
                }
                Segment::Mixed { regex, count, .. } => {
                    let caps = regex.captures(actual)?;
                    for i in 1..=*count {
                        captures.push(caps.get(i)?.as_str());
                    }
                }
            }
        }
        Some(captures)
    }

    #[cfg(test)]
    pub(crate) fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

/// Split a path into segments, ignoring one trailing slash (except for `/` itself).
pub(crate) fn split_path(path: &str) -> SmallVec<[&str; 16]> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return SmallVec::new();
    }
    trimmed.split('/').collect()
}

enum Part<'t> {
    Literal(&'t str),
    Param(&'t str),
}

fn split_segment(segment: &str) -> Option<SmallVec<[Part<'_>; 4]>> {
    let mut parts = SmallVec::new();
    let mut rest = segment;
    while !rest.is_empty() {
        match rest.find('{') {
            Some(0) => {
                let end = rest.find('}')?;
                let name = rest[1..end].trim_end_matches('*');
                if name.contains('{') {
                    return None;
                }
                parts.push(Part::Param(name));
                rest = &rest[end + 1..];
            }
            Some(start) => {
                let lit = &rest[..start];
                if lit.contains('}') {
                    return None;
                }
                parts.push(Part::Literal(lit));
                rest = &rest[start..];
            }
            None => {
                if rest.contains('}') {
                    return None;
                }
                parts.push(Part::Literal(rest));
                rest = "";
            }
        }
    }
    Some(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_and_capture_segments() {
        let t = PathTemplate::parse("/users/{id}/posts").unwrap();
        assert_eq!(t.names().len(), 1);
        assert_eq!(t.param_segments(), 1);
        assert!(matches!(t.segments()[1], Segment::Capture));

        let caps = t.match_segments(&["users", "42", "posts"]).unwrap();
        assert_eq!(caps.as_slice(), &["42"]);
        assert!(t.match_segments(&["users", "42"]).is_none());
        assert!(t.match_segments(&["users", "", "posts"]).is_none());
    }

    #[test]
    fn mixed_segment_uses_regex() {
        let t = PathTemplate::parse("/files/{name}.{ext}").unwrap();
        assert!(matches!(t.segments()[1], Segment::Mixed { .. }));
        let caps = t.match_segments(&["files", "report.final.pdf"]).unwrap();
        assert_eq!(caps.as_slice(), &["report", "final.pdf"]);
        assert!(t.match_segments(&["files", "noext"]).is_none());
    }

    #[test]
    fn rejects_malformed_templates() {
        assert!(PathTemplate::parse("/users/{id").is_err());
        assert!(PathTemplate::parse("/users/id}").is_err());
        assert!(PathTemplate::parse("/users/{}").is_err());
        assert!(PathTemplate::parse("/x/{a}{b}").is_err());
        assert!(PathTemplate::parse("users").is_err());
    }

    #[test]
    fn root_and_trailing_slash() {
        let root = PathTemplate::parse("/").unwrap();
        assert!(root.match_segments(&split_path("/")).is_some());
        let t = PathTemplate::parse("/ping").unwrap();
        assert!(t.match_segments(&split_path("/ping/")).is_some());
    }
}
