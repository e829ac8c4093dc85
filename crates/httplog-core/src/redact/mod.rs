//! Field-level body redaction
//!
//! Sensitive values inside JSON bodies are located with a [`JsonPath`] and
//! masked according to a [`MaskStrategy`] before the body is logged. The
//! engine never fails an exchange: bodies it cannot parse are logged as they
//! are and the record carries a [`RedactionNote`] saying why.
//!
//! # Example
//!
//! ```rust
//! use bytes::Bytes;
//! use httplog_core::redact::{redact, MaskStrategy, Rule};
//!
//! let rules = vec![Rule::new("$.user.ssn", MaskStrategy::Full).unwrap()];
//! let out = redact(
//!     &Bytes::from_static(br#"{"user":{"ssn":"123-45-6789"}}"#),
//!     Some("application/json"),
//!     &rules,
//!     "***",
//! );
//! assert_eq!(&out.bytes[..], br#"{"user":{"ssn":"***"}}"#);
//! ```

mod engine;
mod path;

pub use engine::{is_form_content, is_json_content, mask_text, redact, Redacted};
pub use path::JsonPath;

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// How a matched value is masked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MaskStrategy {
    /// Replace the value with the mask token
    #[default]
    Full,
    /// Keep the last `keep_last` characters of a string, star the rest
    ///
    /// Non-string values are fully replaced.
    Partial {
        /// Number of trailing characters left visible
        keep_last: usize,
    },
    /// Delete the member (or array element) altogether
    Remove,
}

impl MaskStrategy {
    /// Partial masking keeping the last `keep_last` characters
    pub fn partial(keep_last: usize) -> Self {
        MaskStrategy::Partial { keep_last }
    }
}

impl fmt::Display for MaskStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaskStrategy::Full => f.write_str("full"),
            MaskStrategy::Partial { keep_last } => write!(f, "partial:{}", keep_last),
            MaskStrategy::Remove => f.write_str("remove"),
        }
    }
}

impl FromStr for MaskStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "full" => Ok(MaskStrategy::Full),
            "remove" => Ok(MaskStrategy::Remove),
            other => other
                .strip_prefix("partial:")
                .and_then(|n| n.trim().parse().ok())
                .map(MaskStrategy::partial)
                .ok_or_else(|| Error::InvalidStrategy(s.to_string())),
        }
    }
}

/// A path expression paired with the strategy applied to what it matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    path: JsonPath,
    strategy: MaskStrategy,
}

impl Rule {
    /// Parse `path` and pair it with `strategy`
    pub fn new(path: &str, strategy: MaskStrategy) -> Result<Self> {
        Ok(Self {
            path: path.parse()?,
            strategy,
        })
    }

    /// The parsed path expression
    pub fn path(&self) -> &JsonPath {
        &self.path
    }

    /// The mask strategy
    pub fn strategy(&self) -> MaskStrategy {
        self.strategy
    }
}

/// Parses `$.path=strategy`; the strategy defaults to `full` when omitted.
impl FromStr for Rule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (path, strategy) = match s.rsplit_once('=') {
            Some((path, strategy)) => (path, strategy.parse()?),
            None => (s, MaskStrategy::Full),
        };

        let path = path.trim();
        if path.is_empty() {
            return Err(Error::InvalidRule {
                rule: s.to_string(),
                reason: "missing path expression".to_string(),
            });
        }

        Rule::new(path, strategy)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.path, self.strategy)
    }
}

/// What the engine did with a body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionNote {
    /// Parsed, but no rule matched (or there were no rules)
    Untouched,
    /// At least one value was masked or removed
    Masked {
        /// Number of values affected
        matches: usize,
    },
    /// The content type is not one the engine understands
    NotJson,
    /// The body could not be parsed; it is logged verbatim
    Unparseable,
}

impl RedactionNote {
    /// Whether any value was masked
    pub fn is_masked(&self) -> bool {
        matches!(self, RedactionNote::Masked { .. })
    }
}
