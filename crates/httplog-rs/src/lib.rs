//! # httplog
//!
//! Request/response logging for Rust HTTP servers.
//!
//! Every exchange produces exactly one structured record, whether it
//! completes, fails mid-stream or is cancelled. Bodies are captured up to a
//! byte limit while they stream to the handler and to the client, and JSON
//! bodies are masked by path expression before anything reaches a sink.
//!
//! ## Quick Start
//!
//! ```rust
//! use httplog_rs::prelude::*;
//! use http_body_util::Full;
//! use std::convert::Infallible;
//! use tower::ServiceBuilder;
//!
//! let config = LoggingConfig::builder()
//!     .log_bodies(true)
//!     .redact("$.password", MaskStrategy::Full)
//!     .redact("$.card.number", MaskStrategy::partial(4))
//!     .mask_header("authorization", MaskStrategy::Full)
//!     .exclude("GET /health/**")
//!     .build()
//!     .unwrap();
//!
//! let recorder = ExchangeRecorder::new(config, TracingSink::new());
//!
//! let service = ServiceBuilder::new()
//!     .layer(HttpLogLayer::new(recorder))
//!     .service_fn(|_req: http::Request<CaptureBody<Full<bytes::Bytes>>>| async {
//!         Ok::<_, Infallible>(http::Response::new(Full::new(bytes::Bytes::from("ok"))))
//!     });
//! # let _ = service;
//! ```
//!
//! Thread-per-request servers use [`BlockingAdapter`] instead of the layer.
//!
//! ## Optional Features
//!
//! - `config` - Build a `LoggingConfig` from `HTTPLOG_*` variables and `.env` files
//! - `formats` - Text, logfmt and JSON line formatters
//! - `tracing-init` - `tracing-subscriber` setup in one call
//! - `full` - All optional features enabled
//!
//! ```toml
//! [dependencies]
//! httplog-rs = { version = "0.1", features = ["config", "formats"] }
//! ```

// Re-export core functionality
pub use httplog_core::*;

// Re-export extras (feature-gated)
#[cfg(feature = "config")]
pub use httplog_extras::config as env;
#[cfg(feature = "config")]
pub use httplog_extras::{load_dotenv, load_dotenv_from, ConfigError, EnvSettings};

#[cfg(feature = "formats")]
pub use httplog_extras::formats;
#[cfg(feature = "formats")]
pub use httplog_extras::{FormattingSink, JsonFormatter, LogFormatter, LogfmtFormatter, TextFormatter};

#[cfg(feature = "tracing-init")]
pub use httplog_extras::{init_tracing, try_init_tracing};

/// Prelude module - import everything you need with `use httplog_rs::prelude::*`
pub mod prelude {
    pub use httplog_core::{
        // Adapters
        BlockingAdapter,
        CaptureBody,
        // Recording
        Completion,
        // Errors
        Error,
        Exchange,
        ExchangeRecord,
        ExchangeRecorder,
        HandlerError,
        HttpLogLayer,
        // Sinks
        LogSink,
        // Configuration
        LoggingConfig,
        MaskStrategy,
        MemorySink,
        NonBlockingAdapter,
        Outcome,
        Result,
        Side,
        SinkError,
        TracingSink,
        UsernameProvider,
    };
    pub use httplog_core::config::{HeaderFilter, RequestHead, Target};

    // Re-export commonly used external types
    pub use bytes::Bytes;
    pub use tracing::{debug, error, info, trace, warn};

    // Configuration types (feature-gated)
    #[cfg(feature = "config")]
    pub use httplog_extras::{load_dotenv, load_dotenv_from, ConfigError, EnvSettings};

    // Formatter types (feature-gated)
    #[cfg(feature = "formats")]
    pub use httplog_extras::{FormattingSink, JsonFormatter, LogFormatter, LogfmtFormatter, TextFormatter};

    #[cfg(feature = "tracing-init")]
    pub use httplog_extras::init_tracing;
}
