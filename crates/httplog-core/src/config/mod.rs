//! Logging configuration
//!
//! [`LoggingConfig`] is a plain immutable value: build it once at startup,
//! wrap it in an `Arc` and hand it to the recorder. Path expressions, route
//! patterns and header names are validated when the builder runs, so nothing
//! in the request path can fail on configuration.
//!
//! ```rust
//! use httplog_core::config::{HeaderFilter, LoggingConfig, Target};
//! use httplog_core::redact::MaskStrategy;
//!
//! let config = LoggingConfig::builder()
//!     .max_capture_bytes(4096)
//!     .log_bodies(true)
//!     .include_headers(HeaderFilter::deny(["cookie"]))
//!     .redact("$.password", MaskStrategy::Full)
//!     .redact_on(Target::Response, "$.card.number", MaskStrategy::partial(4))
//!     .mask_header("authorization", MaskStrategy::Full)
//!     .exclude("GET /health/**")
//!     .build()
//!     .unwrap();
//!
//! assert!(!config.should_log(&http::Method::GET, "/health/live"));
//! ```

mod client;
mod headers;
mod route;
mod rules;

pub(crate) use client::cookie_value;
pub use client::{RequestHead, UsernameProvider};
pub(crate) use headers::collect_headers;
pub use headers::HeaderFilter;
pub use route::{RoutePattern, RouteScope};
pub use rules::{BodyRule, HeaderRule, RuleSet, Target};

use crate::capture::CaptureBuffer;
use crate::error::{Error, Result};
use crate::record::Side;
use crate::redact::{MaskStrategy, Rule};
use http::Method;

/// Default per-body capture cap
pub const DEFAULT_MAX_CAPTURE_BYTES: usize = 8 * 1024;

/// Default replacement for fully masked values
pub const DEFAULT_MASK_TOKEN: &str = "***";

/// Immutable logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub(crate) enabled: bool,
    pub(crate) max_capture_bytes: usize,
    pub(crate) log_request_body: bool,
    pub(crate) log_response_body: bool,
    pub(crate) include_headers: HeaderFilter,
    pub(crate) include_query_string: bool,
    pub(crate) include_client_info: bool,
    pub(crate) username_provider: Option<UsernameProvider>,
    pub(crate) session_cookie: Option<String>,
    pub(crate) exclude: Vec<RouteScope>,
    pub(crate) rules: RuleSet,
    pub(crate) mask_token: String,
}

impl Default for LoggingConfig {
    /// Defaults:
    /// - logging enabled
    /// - 8 KiB capture cap per body
    /// - bodies and headers not logged
    /// - query string and client address logged
    /// - no username provider, no session cookie
    /// - no exclusions, no rules
    /// - mask token `***`
    fn default() -> Self {
        Self {
            enabled: true,
            max_capture_bytes: DEFAULT_MAX_CAPTURE_BYTES,
            log_request_body: false,
            log_response_body: false,
            include_headers: HeaderFilter::None,
            include_query_string: true,
            include_client_info: true,
            username_provider: None,
            session_cookie: None,
            exclude: Vec::new(),
            rules: RuleSet::new(),
            mask_token: DEFAULT_MASK_TOKEN.to_string(),
        }
    }
}

impl LoggingConfig {
    /// Start building a configuration from the defaults
    pub fn builder() -> LoggingConfigBuilder {
        LoggingConfigBuilder::default()
    }

    /// Master switch: when off, no request is logged
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Per-body capture cap in bytes
    pub fn max_capture_bytes(&self) -> usize {
        self.max_capture_bytes
    }

    /// Whether request bodies are logged
    pub fn log_request_body(&self) -> bool {
        self.log_request_body
    }

    /// Whether response bodies are logged
    pub fn log_response_body(&self) -> bool {
        self.log_response_body
    }

    /// Whether bodies on `side` are logged
    pub fn logs_body(&self, side: Side) -> bool {
        match side {
            Side::Request => self.log_request_body,
            Side::Response => self.log_response_body,
        }
    }

    /// Header selection
    pub fn include_headers(&self) -> &HeaderFilter {
        &self.include_headers
    }

    /// Whether the query string is kept in the logged URI
    pub fn include_query_string(&self) -> bool {
        self.include_query_string
    }

    /// Whether the client address, session id and username are logged
    pub fn include_client_info(&self) -> bool {
        self.include_client_info
    }

    /// Resolver for the authenticated user
    pub fn username_provider(&self) -> Option<&UsernameProvider> {
        self.username_provider.as_ref()
    }

    /// Name of the cookie carrying the session id
    pub fn session_cookie(&self) -> Option<&str> {
        self.session_cookie.as_deref()
    }

    /// Routes that bypass logging
    pub fn exclusions(&self) -> &[RouteScope] {
        &self.exclude
    }

    /// Redaction rules
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Replacement for fully masked values
    pub fn mask_token(&self) -> &str {
        &self.mask_token
    }

    /// Whether a request should be logged at all
    pub fn should_log(&self, method: &Method, path: &str) -> bool {
        self.enabled && !self.exclude.iter().any(|scope| scope.matches(method, path))
    }

    /// A fresh capture buffer for one body on `side`
    ///
    /// Disabled when that side's body is not logged, so the stream is still
    /// tracked for completion without retaining anything.
    pub fn capture_buffer(&self, side: Side) -> CaptureBuffer {
        if self.logs_body(side) {
            CaptureBuffer::new(self.max_capture_bytes)
        } else {
            CaptureBuffer::disabled()
        }
    }
}

/// Builder for [`LoggingConfig`]
///
/// The first invalid path, pattern or header name is reported by
/// [`build`](LoggingConfigBuilder::build).
#[derive(Debug, Default)]
pub struct LoggingConfigBuilder {
    config: LoggingConfig,
    error: Option<Error>,
}

impl LoggingConfigBuilder {
    fn record<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.error.get_or_insert(e);
                None
            }
        }
    }

    /// Turn logging on or off as a whole
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Set the per-body capture cap
    pub fn max_capture_bytes(mut self, bytes: usize) -> Self {
        self.config.max_capture_bytes = bytes;
        self
    }

    /// Enable or disable request body logging
    pub fn log_request_body(mut self, enabled: bool) -> Self {
        self.config.log_request_body = enabled;
        self
    }

    /// Enable or disable response body logging
    pub fn log_response_body(mut self, enabled: bool) -> Self {
        self.config.log_response_body = enabled;
        self
    }

    /// Enable or disable body logging on both sides
    pub fn log_bodies(self, enabled: bool) -> Self {
        self.log_request_body(enabled).log_response_body(enabled)
    }

    /// Choose which headers are logged
    pub fn include_headers(mut self, filter: impl Into<HeaderFilter>) -> Self {
        self.config.include_headers = filter.into();
        self
    }

    /// Keep or strip the query string in the logged URI
    pub fn include_query_string(mut self, include: bool) -> Self {
        self.config.include_query_string = include;
        self
    }

    /// Log the client address, session id and username when known
    pub fn include_client_info(mut self, include: bool) -> Self {
        self.config.include_client_info = include;
        self
    }

    /// Resolve the authenticated user of each logged request
    pub fn username_provider(mut self, provider: UsernameProvider) -> Self {
        self.config.username_provider = Some(provider);
        self
    }

    /// Read the session id from the cookie `name`
    pub fn session_cookie(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.config.session_cookie = (!name.trim().is_empty()).then(|| name.trim().to_string());
        self
    }

    /// Skip logging for requests matching `scope` (`"METHOD /pattern"` or `"/pattern"`)
    pub fn exclude(mut self, scope: &str) -> Self {
        if let Some(scope) = self.record(scope.parse()) {
            self.config.exclude.push(scope);
        }
        self
    }

    /// Skip logging for requests matching an already parsed scope
    pub fn exclude_scope(mut self, scope: RouteScope) -> Self {
        self.config.exclude.push(scope);
        self
    }

    /// Mask `path` in request and response bodies
    pub fn redact(self, path: &str, strategy: MaskStrategy) -> Self {
        self.redact_on(Target::Both, path, strategy)
    }

    /// Mask `path` in the bodies of one side
    pub fn redact_on(mut self, target: Target, path: &str, strategy: MaskStrategy) -> Self {
        if let Some(rule) = self.record(BodyRule::new(path, strategy)) {
            self.config.rules.push_body(rule.on(target));
        }
        self
    }

    /// Add a fully specified body rule
    pub fn body_rule(mut self, rule: impl Into<BodyRule>) -> Self {
        self.config.rules.push_body(rule.into());
        self
    }

    /// Add body rules parsed from `$.path=strategy` strings
    pub fn redact_all<S: AsRef<str>>(mut self, rules: impl IntoIterator<Item = S>) -> Self {
        for text in rules {
            if let Some(rule) = self.record(text.as_ref().parse::<Rule>()) {
                self.config.rules.push_body(rule.into());
            }
        }
        self
    }

    /// Mask the header `name` on both sides
    pub fn mask_header(self, name: &str, strategy: MaskStrategy) -> Self {
        self.mask_header_on(Target::Both, name, strategy)
    }

    /// Mask the header `name` on one side
    pub fn mask_header_on(mut self, target: Target, name: &str, strategy: MaskStrategy) -> Self {
        if let Some(rule) = self.record(HeaderRule::new(name, strategy)) {
            self.config.rules.push_header(rule.on(target));
        }
        self
    }

    /// Add a fully specified header rule
    pub fn header_rule(mut self, rule: HeaderRule) -> Self {
        self.config.rules.push_header(rule);
        self
    }

    /// Set the replacement for fully masked values
    pub fn mask_token(mut self, token: impl Into<String>) -> Self {
        self.config.mask_token = token.into();
        self
    }

    /// Validate and produce the configuration
    pub fn build(self) -> Result<LoggingConfig> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.config),
        }
    }
}
