//! Exchange records
//!
//! One [`ExchangeRecord`] is produced per HTTP exchange. It is sealed when the
//! exchange completes, handed to the [`LogSink`](crate::LogSink) by value and
//! not retained afterwards.

use crate::capture::Truncation;
use crate::redact::RedactionNote;
use bytes::Bytes;
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Multi-valued header mapping as it appears in a record
///
/// Names are lowercase; values keep the order they were received in.
pub type HeaderLog = BTreeMap<String, Vec<String>>;

/// Opaque identifier generated for every exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ExchangeId(Uuid);

impl ExchangeId {
    /// Generate a fresh id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ExchangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which half of the exchange a signal came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The inbound request body
    Request,
    /// The outbound response body
    Response,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Request => f.write_str("request"),
            Side::Response => f.write_str("response"),
        }
    }
}

/// How an exchange ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Both bodies were delivered in full
    Completed,
    /// The handler returned an error instead of a response
    HandlerError {
        /// The handler error's display text
        message: String,
    },
    /// A body stream failed mid-flight
    StreamError {
        /// The failing side
        side: Side,
        /// The stream error's display text
        message: String,
    },
    /// The exchange was cancelled (client disconnect, timeout)
    Cancelled {
        /// The side that observed the cancellation, if any body did
        #[serde(skip_serializing_if = "Option::is_none")]
        side: Option<Side>,
    },
    /// The exchange was dropped without ever being completed
    Aborted,
}

impl Outcome {
    /// Whether the exchange finished normally
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed => f.write_str("completed"),
            Outcome::HandlerError { message } => write!(f, "handler error: {}", message),
            Outcome::StreamError { side, message } => {
                write!(f, "{} stream error: {}", side, message)
            }
            Outcome::Cancelled { side: Some(side) } => write!(f, "cancelled during {}", side),
            Outcome::Cancelled { side: None } => f.write_str("cancelled"),
            Outcome::Aborted => f.write_str("aborted"),
        }
    }
}

/// A captured body after redaction, as it appears in a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoggedBody {
    /// The masked bytes (only ever the masked form is logged)
    #[serde(serialize_with = "serialize_lossy")]
    pub content: Bytes,
    /// Content type the body was declared with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Total size of the body as it passed through
    pub total_len: u64,
    /// Why `content` is only a prefix, if it is
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncation: Option<Truncation>,
    /// What the redaction engine did with the body
    pub redaction: RedactionNote,
}

impl LoggedBody {
    /// Whether `content` is only a prefix of the body
    pub fn is_truncated(&self) -> bool {
        self.truncation.is_some()
    }

    /// Lossy UTF-8 view of the content
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }
}

/// The structured record of one HTTP exchange
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeRecord {
    /// Exchange id
    pub id: ExchangeId,
    /// Wall-clock time the exchange started
    #[serde(serialize_with = "serialize_unix_millis")]
    pub started_at: SystemTime,
    /// Wall-clock time the exchange was sealed
    #[serde(serialize_with = "serialize_unix_millis")]
    pub ended_at: SystemTime,
    /// Elapsed time between start and seal
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    /// HTTP method
    pub method: String,
    /// Request path, with the query string unless configured otherwise
    pub uri: String,
    /// Client address, when known and enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    /// Session id read from the configured cookie
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Authenticated user, as resolved by the username provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Filtered and masked request headers
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub request_headers: HeaderLog,
    /// Request body, when body logging is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<LoggedBody>,
    /// Response status, absent when no response head was produced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Filtered and masked response headers
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub response_headers: HeaderLog,
    /// Response body, when body logging is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<LoggedBody>,
    /// How the exchange ended
    pub outcome: Outcome,
}

impl ExchangeRecord {
    /// Whether either body was only partially captured
    pub fn is_truncated(&self) -> bool {
        self.request_body.as_ref().is_some_and(LoggedBody::is_truncated)
            || self.response_body.as_ref().is_some_and(LoggedBody::is_truncated)
    }

    /// Whether the status is a 4xx
    pub fn is_client_error(&self) -> bool {
        matches!(self.status, Some(400..=499))
    }

    /// Whether the status is a 5xx or the exchange did not complete normally
    pub fn is_failure(&self) -> bool {
        self.status.is_some_and(|status| status >= 500) || !self.outcome.is_completed()
    }

    /// First value of a logged request header
    pub fn request_header(&self, name: &str) -> Option<&str> {
        first_header(&self.request_headers, name)
    }

    /// First value of a logged response header
    pub fn response_header(&self, name: &str) -> Option<&str> {
        first_header(&self.response_headers, name)
    }
}

fn first_header<'a>(headers: &'a HeaderLog, name: &str) -> Option<&'a str> {
    headers
        .get(&name.to_ascii_lowercase())
        .and_then(|values| values.first())
        .map(String::as_str)
}

fn serialize_lossy<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

fn serialize_unix_millis<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    let millis = time
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    serializer.serialize_u64(millis)
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}
