//! # httplog-extras
//!
//! Optional additions to the httplog core, each behind a Cargo feature.
//!
//! ## Features
//!
//! - `config` - Build a `LoggingConfig` from `HTTPLOG_*` environment variables and `.env` files
//! - `formats` - Text, logfmt and JSON line formatters plus a formatting sink
//! - `tracing-init` - One-call `tracing-subscriber` setup with an `EnvFilter`
//! - `full` - All features enabled
//!
//! ## Example
//!
//! ```toml
//! [dependencies]
//! httplog-extras = { version = "0.1", features = ["config", "formats"] }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Environment configuration module
#[cfg(feature = "config")]
pub mod config;

// Log line formatters
#[cfg(feature = "formats")]
pub mod formats;

// Subscriber bootstrap
#[cfg(feature = "tracing-init")]
mod telemetry;

#[cfg(feature = "config")]
pub use config::{load_dotenv, load_dotenv_from, ConfigError, EnvSettings};

#[cfg(feature = "formats")]
pub use formats::{FormattingSink, JsonFormatter, LogFormatter, LogfmtFormatter, TextFormatter};

#[cfg(feature = "tracing-init")]
pub use telemetry::{init_tracing, try_init_tracing};
