//! Configuration from environment variables and `.env` files
//!
//! Every [`LoggingConfig`] option has an `HTTPLOG_*` variable. Unset
//! variables keep the library default.
//!
//! | Variable | Value |
//! |----------|-------|
//! | `HTTPLOG_ENABLED` | `true` / `false`, master switch |
//! | `HTTPLOG_MAX_CAPTURE_BYTES` | bytes retained per body |
//! | `HTTPLOG_LOG_REQUEST_BODY` | `true` / `false` |
//! | `HTTPLOG_LOG_RESPONSE_BODY` | `true` / `false` |
//! | `HTTPLOG_INCLUDE_HEADERS` | `all`, `none`, `allow:a,b` or `deny:a,b` |
//! | `HTTPLOG_INCLUDE_QUERY_STRING` | `true` / `false` |
//! | `HTTPLOG_INCLUDE_CLIENT_INFO` | `true` / `false` |
//! | `HTTPLOG_SESSION_COOKIE` | cookie carrying the session id |
//! | `HTTPLOG_MASK_TOKEN` | replacement for fully masked values |
//! | `HTTPLOG_REDACT` | comma separated `$.path=strategy`, both sides |
//! | `HTTPLOG_REDACT_REQUEST` | same, request bodies only |
//! | `HTTPLOG_REDACT_RESPONSE` | same, response bodies only |
//! | `HTTPLOG_MASK_HEADERS` | comma separated `name` or `name=strategy` |
//! | `HTTPLOG_EXCLUDE` | comma separated `[METHOD ]/pattern` |
//!
//! # Example
//!
//! ```ignore
//! use httplog_extras::config::{load_dotenv, EnvSettings};
//!
//! // Load .env file at startup
//! load_dotenv();
//!
//! let config = EnvSettings::from_env()?.into_config()?;
//! ```

use httplog_core::config::{BodyRule, HeaderFilter, HeaderRule, RouteScope, Target};
use httplog_core::redact::{MaskStrategy, Rule};
use httplog_core::{LoggingConfig, LoggingConfigBuilder};
use serde::Deserialize;
use thiserror::Error;

/// Prefix of every variable read by [`EnvSettings::from_env`]
pub const ENV_PREFIX: &str = "HTTPLOG_";

/// Error type for configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable deserialization failed
    #[error("Configuration error: {0}")]
    Env(#[from] envy::Error),

    /// A variable was read but its value is not valid
    #[error("Invalid value for {var}: {source}")]
    Invalid {
        /// Variable name, without prefix
        var: &'static str,
        /// What was wrong with it
        #[source]
        source: httplog_core::Error,
    },

    /// The assembled configuration was rejected
    #[error(transparent)]
    Logging(#[from] httplog_core::Error),
}

fn invalid(var: &'static str) -> impl FnOnce(httplog_core::Error) -> ConfigError {
    move |source| ConfigError::Invalid { var, source }
}

/// Raw settings as read from the environment
///
/// Fields map to variables in SCREAMING_SNAKE_CASE behind the prefix, so
/// `max_capture_bytes` reads `HTTPLOG_MAX_CAPTURE_BYTES`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EnvSettings {
    /// Master switch
    pub enabled: Option<bool>,
    /// Bytes retained per body
    pub max_capture_bytes: Option<usize>,
    /// Log request bodies
    pub log_request_body: Option<bool>,
    /// Log response bodies
    pub log_response_body: Option<bool>,
    /// Header filter
    pub include_headers: Option<String>,
    /// Keep the query string in the logged URI
    pub include_query_string: Option<bool>,
    /// Log the client address, session id and username
    pub include_client_info: Option<bool>,
    /// Cookie carrying the session id
    pub session_cookie: Option<String>,
    /// Replacement for fully masked values
    pub mask_token: Option<String>,
    /// Body rules for both sides
    pub redact: Option<String>,
    /// Body rules for request bodies
    pub redact_request: Option<String>,
    /// Body rules for response bodies
    pub redact_response: Option<String>,
    /// Header rules for both sides
    pub mask_headers: Option<String>,
    /// Excluded route scopes
    pub exclude: Option<String>,
}

fn items(list: &Option<String>) -> impl Iterator<Item = &str> {
    list.as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
}

impl EnvSettings {
    /// Read `HTTPLOG_*` variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(envy::prefixed(ENV_PREFIX).from_env::<Self>()?)
    }

    /// Read variables behind a custom prefix (followed by underscore)
    pub fn from_env_prefixed(prefix: &str) -> Result<Self, ConfigError> {
        Ok(envy::prefixed(format!("{}_", prefix)).from_env::<Self>()?)
    }

    /// Apply the settings on top of `builder`
    ///
    /// Variables that are unset leave the builder untouched.
    pub fn apply(&self, mut builder: LoggingConfigBuilder) -> Result<LoggingConfigBuilder, ConfigError> {
        if let Some(enabled) = self.enabled {
            builder = builder.enabled(enabled);
        }
        if let Some(bytes) = self.max_capture_bytes {
            builder = builder.max_capture_bytes(bytes);
        }
        if let Some(enabled) = self.log_request_body {
            builder = builder.log_request_body(enabled);
        }
        if let Some(enabled) = self.log_response_body {
            builder = builder.log_response_body(enabled);
        }
        if let Some(filter) = &self.include_headers {
            let filter: HeaderFilter = filter.parse().map_err(invalid("INCLUDE_HEADERS"))?;
            builder = builder.include_headers(filter);
        }
        if let Some(include) = self.include_query_string {
            builder = builder.include_query_string(include);
        }
        if let Some(include) = self.include_client_info {
            builder = builder.include_client_info(include);
        }
        if let Some(name) = &self.session_cookie {
            builder = builder.session_cookie(name.clone());
        }
        if let Some(token) = &self.mask_token {
            builder = builder.mask_token(token.clone());
        }

        for (var, list, target) in [
            ("REDACT", &self.redact, Target::Both),
            ("REDACT_REQUEST", &self.redact_request, Target::Request),
            ("REDACT_RESPONSE", &self.redact_response, Target::Response),
        ] {
            for text in items(list) {
                let rule: Rule = text.parse().map_err(invalid(var))?;
                builder = builder.body_rule(BodyRule::from(rule).on(target));
            }
        }

        for text in items(&self.mask_headers) {
            let (name, strategy) = match text.split_once('=') {
                Some((name, strategy)) => (name.trim(), strategy.parse().map_err(invalid("MASK_HEADERS"))?),
                None => (text, MaskStrategy::Full),
            };
            let rule = HeaderRule::new(name, strategy).map_err(invalid("MASK_HEADERS"))?;
            builder = builder.header_rule(rule);
        }

        for text in items(&self.exclude) {
            let scope: RouteScope = text.parse().map_err(invalid("EXCLUDE"))?;
            builder = builder.exclude_scope(scope);
        }

        Ok(builder)
    }

    /// Build a configuration from the defaults plus these settings
    pub fn into_config(self) -> Result<LoggingConfig, ConfigError> {
        Ok(self.apply(LoggingConfig::builder())?.build()?)
    }
}

/// Build a configuration from `HTTPLOG_*` variables
///
/// Shorthand for `EnvSettings::from_env()?.into_config()`.
pub fn config_from_env() -> Result<LoggingConfig, ConfigError> {
    EnvSettings::from_env()?.into_config()
}

/// Load environment variables from a `.env` file
///
/// Looks in the current directory and its parents. A missing file is not
/// an error, and variables already set take precedence.
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!(error = %e, "no .env file loaded");
    }
}

/// Load environment variables from a specific file path
pub fn load_dotenv_from<P: AsRef<std::path::Path>>(path: P) {
    let path = path.as_ref();
    if let Err(e) = dotenvy::from_path(path) {
        tracing::debug!(path = %path.display(), error = %e, "env file not loaded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use httplog_core::Side;
    use serial_test::serial;
    use std::io::Write;

    const VARS: [&str; 14] = [
        "ENABLED",
        "MAX_CAPTURE_BYTES",
        "LOG_REQUEST_BODY",
        "LOG_RESPONSE_BODY",
        "INCLUDE_HEADERS",
        "INCLUDE_QUERY_STRING",
        "INCLUDE_CLIENT_INFO",
        "SESSION_COOKIE",
        "MASK_TOKEN",
        "REDACT",
        "REDACT_REQUEST",
        "REDACT_RESPONSE",
        "MASK_HEADERS",
        "EXCLUDE",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(format!("{}{}", ENV_PREFIX, var));
        }
    }

    #[test]
    #[serial]
    fn test_unset_variables_keep_defaults() {
        clear_env();

        let settings = EnvSettings::from_env().unwrap();
        assert_eq!(settings, EnvSettings::default());

        let config = settings.into_config().unwrap();
        assert_eq!(config.max_capture_bytes(), httplog_core::DEFAULT_MAX_CAPTURE_BYTES);
        assert!(!config.log_request_body());
        assert!(config.include_query_string());
        assert!(config.enabled());
        assert_eq!(config.session_cookie(), None);
        assert_eq!(config.mask_token(), "***");
    }

    #[test]
    #[serial]
    fn test_full_environment() {
        clear_env();
        std::env::set_var("HTTPLOG_MAX_CAPTURE_BYTES", "2048");
        std::env::set_var("HTTPLOG_LOG_REQUEST_BODY", "true");
        std::env::set_var("HTTPLOG_LOG_RESPONSE_BODY", "false");
        std::env::set_var("HTTPLOG_INCLUDE_HEADERS", "deny:cookie,x-secret");
        std::env::set_var("HTTPLOG_INCLUDE_CLIENT_INFO", "false");
        std::env::set_var("HTTPLOG_SESSION_COOKIE", "JSESSIONID");
        std::env::set_var("HTTPLOG_MASK_TOKEN", "[hidden]");
        std::env::set_var("HTTPLOG_REDACT", "$.password, $.card.number=partial:4");
        std::env::set_var("HTTPLOG_REDACT_RESPONSE", "$.token=remove");
        std::env::set_var("HTTPLOG_MASK_HEADERS", "authorization,x-api-key=partial:2");
        std::env::set_var("HTTPLOG_EXCLUDE", "GET /health/**, /metrics");

        let config = config_from_env().unwrap();
        clear_env();

        assert_eq!(config.max_capture_bytes(), 2048);
        assert!(config.log_request_body());
        assert!(!config.log_response_body());
        assert!(!config.include_client_info());
        assert_eq!(config.session_cookie(), Some("JSESSIONID"));
        assert!(!config.include_headers().allows("cookie"));
        assert!(config.include_headers().allows("accept"));
        assert_eq!(config.mask_token(), "[hidden]");

        let request_rules = config
            .rules()
            .body_rules_for(Side::Request, &Method::POST, "/pay")
            .count();
        let response_rules = config
            .rules()
            .body_rules_for(Side::Response, &Method::POST, "/pay")
            .count();
        assert_eq!(request_rules, 2);
        assert_eq!(response_rules, 3);
        assert_eq!(config.rules().headers().len(), 2);

        assert!(!config.should_log(&Method::GET, "/health/live"));
        assert!(config.should_log(&Method::POST, "/health/live"));
        assert!(!config.should_log(&Method::DELETE, "/metrics"));
    }

    #[test]
    #[serial]
    fn test_master_switch_disables_everything() {
        clear_env();
        std::env::set_var("HTTPLOG_ENABLED", "false");
        let config = config_from_env().unwrap();
        clear_env();

        assert!(!config.enabled());
        assert!(!config.should_log(&Method::GET, "/api/users"));
    }

    #[test]
    #[serial]
    fn test_invalid_values_name_the_variable() {
        clear_env();
        std::env::set_var("HTTPLOG_REDACT", "$.a=sometimes");
        let err = config_from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "REDACT", .. }));

        clear_env();
        std::env::set_var("HTTPLOG_EXCLUDE", "health");
        let err = config_from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "EXCLUDE", .. }));

        clear_env();
        std::env::set_var("HTTPLOG_MAX_CAPTURE_BYTES", "lots");
        let err = config_from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Env(_)));
        assert!(err.to_string().starts_with("Configuration error"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_custom_prefix() {
        std::env::set_var("MYAPP_LOG_MAX_CAPTURE_BYTES", "64");
        let settings = EnvSettings::from_env_prefixed("MYAPP_LOG").unwrap();
        std::env::remove_var("MYAPP_LOG_MAX_CAPTURE_BYTES");

        assert_eq!(settings.max_capture_bytes, Some(64));
        assert_eq!(settings.log_request_body, None);
    }

    #[test]
    #[serial]
    fn test_load_dotenv_from_file() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "HTTPLOG_LOG_REQUEST_BODY=true").unwrap();
        writeln!(file, "HTTPLOG_REDACT=$.ssn").unwrap();
        file.flush().unwrap();

        load_dotenv_from(file.path());
        let config = config_from_env().unwrap();
        clear_env();

        assert!(config.log_request_body());
        assert_eq!(config.rules().body().len(), 1);
    }

    #[test]
    #[serial]
    fn test_existing_variables_win_over_dotenv() {
        clear_env();
        std::env::set_var("HTTPLOG_MASK_TOKEN", "from-env");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "HTTPLOG_MASK_TOKEN=from-file\n").unwrap();

        load_dotenv_from(&path);
        let settings = EnvSettings::from_env().unwrap();
        clear_env();

        assert_eq!(settings.mask_token.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        load_dotenv_from("/nonexistent/httplog/.env");
    }
}
