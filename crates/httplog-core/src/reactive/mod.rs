//! Non-blocking pipeline adapter
//!
//! Both bodies are wrapped in a [`CaptureBody`] that copies data frames into
//! a bounded buffer as they stream past. The buffers live in a shared
//! [`ExchangeTracker`], which the two bodies and the handler future report
//! to. It completes the exchange exactly once:
//!
//! - when both bodies reached their end
//! - as soon as either body yields an error
//! - when the response body is dropped early (client went away)
//! - when the handler fails, or its future is dropped before responding
//!
//! A request body the handler never finishes reading is recorded as
//! abandoned and does not hold the record back once it is dropped. Whatever
//! side is still streaming when the exchange completes early is logged with
//! the prefix seen so far, marked truncated.

mod body;
mod service;
mod tracker;

pub use body::CaptureBody;
pub use service::{ExchangeHandle, HttpLogLayer, HttpLogService, NonBlockingAdapter, ResponseFuture};
pub use tracker::{BodyEnd, ExchangeTracker};
