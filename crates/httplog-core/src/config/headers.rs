//! Header selection and masking

use super::rules::HeaderRule;
use crate::error::{Error, Result};
use crate::record::HeaderLog;
use crate::redact::mask_text;
use http::HeaderMap;
use std::collections::BTreeSet;
use std::str::FromStr;

/// Which headers make it into a record
///
/// Names are compared case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HeaderFilter {
    /// No headers are logged
    #[default]
    None,
    /// Every header is logged
    All,
    /// Only the listed headers are logged
    Allow(BTreeSet<String>),
    /// Every header except the listed ones is logged
    Deny(BTreeSet<String>),
}

impl HeaderFilter {
    /// Log only `names`
    pub fn allow(names: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        HeaderFilter::Allow(lowercase_set(names))
    }

    /// Log everything except `names`
    pub fn deny(names: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        HeaderFilter::Deny(lowercase_set(names))
    }

    /// Whether `name` passes the filter
    pub fn allows(&self, name: &str) -> bool {
        match self {
            HeaderFilter::None => false,
            HeaderFilter::All => true,
            HeaderFilter::Allow(names) => names.contains(&name.to_ascii_lowercase()),
            HeaderFilter::Deny(names) => !names.contains(&name.to_ascii_lowercase()),
        }
    }

    /// Whether no header can pass
    pub fn is_none(&self) -> bool {
        matches!(self, HeaderFilter::None)
    }
}

impl From<bool> for HeaderFilter {
    fn from(include: bool) -> Self {
        if include {
            HeaderFilter::All
        } else {
            HeaderFilter::None
        }
    }
}

/// Parses `all`, `none`, `allow:a,b` or `deny:a,b`
impl FromStr for HeaderFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let list = |names: &str| {
            names
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        };

        match s.to_ascii_lowercase().as_str() {
            "all" | "true" => Ok(HeaderFilter::All),
            "none" | "false" | "" => Ok(HeaderFilter::None),
            lowered => {
                if let Some(names) = lowered.strip_prefix("allow:") {
                    Ok(HeaderFilter::allow(list(names)))
                } else if let Some(names) = lowered.strip_prefix("deny:") {
                    Ok(HeaderFilter::deny(list(names)))
                } else {
                    Err(Error::Config(format!(
                        "invalid header filter `{}` (expected all, none, allow:.. or deny:..)",
                        s
                    )))
                }
            }
        }
    }
}

fn lowercase_set(names: impl IntoIterator<Item = impl AsRef<str>>) -> BTreeSet<String> {
    names
        .into_iter()
        .map(|name| name.as_ref().trim().to_ascii_lowercase())
        .collect()
}

/// Build the logged form of `headers`: filter first, then mask.
///
/// A header masked with [`Remove`](crate::redact::MaskStrategy::Remove) is
/// dropped from the log.
pub(crate) fn collect_headers<'r>(
    headers: &HeaderMap,
    filter: &HeaderFilter,
    rules: impl IntoIterator<Item = &'r HeaderRule> + Clone,
    mask_token: &str,
) -> HeaderLog {
    let mut log = HeaderLog::new();
    if filter.is_none() {
        return log;
    }

    for (name, value) in headers {
        let name = name.as_str();
        if !filter.allows(name) {
            continue;
        }

        let mut value = Some(String::from_utf8_lossy(value.as_bytes()).into_owned());
        for rule in rules.clone().into_iter().filter(|rule| rule.name() == name) {
            value = value.and_then(|v| mask_text(&v, rule.strategy(), mask_token));
        }

        if let Some(value) = value {
            log.entry(name.to_string()).or_default().push(value);
        }
    }

    log
}
