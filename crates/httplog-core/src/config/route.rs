//! Route scopes: an optional method plus an ant-style path pattern

use crate::error::{Error, Result};
use http::Method;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    /// `**`: zero or more whole segments
    AnyDepth,
    /// A single segment, possibly containing `*` and `?`
    Glob(Vec<char>),
}

/// An ant-style path pattern
///
/// - `?` matches one character within a segment
/// - `*` matches any run of characters within a segment
/// - `**` matches any number of whole segments
///
/// ```rust
/// use httplog_core::config::RoutePattern;
///
/// let pattern: RoutePattern = "/api/**/secret-*".parse().unwrap();
/// assert!(pattern.matches("/api/v1/users/secret-key"));
/// assert!(!pattern.matches("/public/secret-key"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    source: String,
    parts: Vec<Part>,
}

impl RoutePattern {
    /// Parse a pattern; it must start with `/`
    pub fn parse(source: &str) -> Result<Self> {
        let trimmed = source.trim();
        if !trimmed.starts_with('/') {
            return Err(Error::pattern(source, "must start with `/`"));
        }

        let mut parts = segments(trimmed)
            .map(|segment| match segment {
                "**" => Ok(Part::AnyDepth),
                s if s.contains("**") => Err(Error::pattern(
                    source,
                    "`**` must be a whole path segment",
                )),
                s => Ok(Part::Glob(s.chars().collect())),
            })
            .collect::<Result<Vec<_>>>()?;
        parts.dedup_by(|a, b| *a == Part::AnyDepth && *b == Part::AnyDepth);

        Ok(Self {
            source: trimmed.to_string(),
            parts,
        })
    }

    /// Whether `path` (without query string) matches
    pub fn matches(&self, path: &str) -> bool {
        let path: Vec<&str> = segments(path).collect();
        match_parts(&self.parts, &path)
    }

    /// The pattern as written
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for RoutePattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        RoutePattern::parse(s)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Segment-level match, linear in the number of parts times path segments
fn match_parts(parts: &[Part], path: &[&str]) -> bool {
    // reachable[j]: the parts seen so far can consume exactly path[..j]
    let mut reachable = vec![false; path.len() + 1];
    reachable[0] = true;

    for part in parts {
        match part {
            Part::AnyDepth => {
                let mut open = false;
                for slot in reachable.iter_mut() {
                    open |= *slot;
                    *slot = open;
                }
            }
            Part::Glob(glob) => {
                for j in (1..=path.len()).rev() {
                    reachable[j] = reachable[j - 1] && match_glob(glob, path[j - 1]);
                }
                reachable[0] = false;
            }
        }
        if !reachable.contains(&true) {
            return false;
        }
    }

    reachable[path.len()]
}

/// Single-segment wildcard match with `*` backtracking
fn match_glob(pattern: &[char], segment: &str) -> bool {
    let text: Vec<char> = segment.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// A method (or any method) plus a path pattern
///
/// Parsed from `"METHOD /pattern"` or just `"/pattern"`; a method of `*`
/// matches every method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteScope {
    method: Option<Method>,
    pattern: RoutePattern,
}

impl RouteScope {
    /// Scope matching `pattern` for any method
    pub fn any(pattern: &str) -> Result<Self> {
        Ok(Self {
            method: None,
            pattern: pattern.parse()?,
        })
    }

    /// Scope matching `pattern` for one method
    pub fn method(method: Method, pattern: &str) -> Result<Self> {
        Ok(Self {
            method: Some(method),
            pattern: pattern.parse()?,
        })
    }

    /// Whether the scope covers this request
    pub fn matches(&self, method: &Method, path: &str) -> bool {
        self.method.as_ref().map_or(true, |m| m == method) && self.pattern.matches(path)
    }

    /// The path pattern
    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }
}

impl FromStr for RouteScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once(char::is_whitespace) {
            Some((method, pattern)) if method != "*" => {
                let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                    .map_err(|_| Error::pattern(s, format!("invalid method `{}`", method)))?;
                RouteScope::method(method, pattern.trim())
            }
            Some((_, pattern)) => RouteScope::any(pattern.trim()),
            None => RouteScope::any(s),
        }
    }
}

impl fmt::Display for RouteScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.method {
            Some(method) => write!(f, "{} {}", method, self.pattern),
            None => write!(f, "* {}", self.pattern),
        }
    }
}
