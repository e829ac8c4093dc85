//! # httplog core
//!
//! Request/response logging for HTTP servers: bounded body capture, one
//! record per exchange, JSON-path redaction, and adapters for both blocking
//! and streaming servers.
//!
//! This crate is not meant to be used directly. Use `httplog-rs` instead.

pub mod blocking;
pub mod capture;
pub mod config;
mod error;
pub mod reactive;
pub mod record;
mod recorder;
pub mod redact;
mod sink;

// Public API
pub use blocking::{BlockingAdapter, HandlerError, ResponseWriter};
pub use capture::{CaptureBuffer, CaptureReader, CaptureWriter, CapturedBody, Truncation};
pub use config::{
    LoggingConfig, LoggingConfigBuilder, RequestHead, UsernameProvider, DEFAULT_MASK_TOKEN, DEFAULT_MAX_CAPTURE_BYTES,
};
pub use error::{Error, Result, SinkError};
pub use reactive::{CaptureBody, ExchangeHandle, HttpLogLayer, HttpLogService, NonBlockingAdapter};
pub use record::{ExchangeId, ExchangeRecord, HeaderLog, LoggedBody, Outcome, Side};
pub use recorder::{Completion, Exchange, ExchangeRecorder, Phase, SealStatus};
pub use redact::{MaskStrategy, RedactionNote, Rule};
pub use sink::{ExchangeStart, FnSink, LogSink, MemorySink, TracingSink};
