//! Log sinks
//!
//! The recorder hands every sealed [`ExchangeRecord`] to a [`LogSink`]. What
//! the sink does with it (print, ship, store) is up to the sink; failures are
//! reported back as [`SinkError`] and only ever logged.

use crate::error::SinkError;
use crate::record::{ExchangeId, ExchangeRecord, HeaderLog, LoggedBody};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, RwLock};

/// What is known about an exchange when it starts
#[derive(Debug, Clone, Copy)]
pub struct ExchangeStart<'a> {
    /// Exchange id, repeated on the final record
    pub id: ExchangeId,
    /// HTTP method
    pub method: &'a str,
    /// Logged URI
    pub uri: &'a str,
    /// Client address, when known and enabled
    pub client_ip: Option<&'a str>,
    /// Session id, when a session cookie is configured and present
    pub session_id: Option<&'a str>,
    /// Authenticated user, when a username provider resolved one
    pub username: Option<&'a str>,
    /// Filtered and masked request headers
    pub headers: &'a HeaderLog,
}

/// Destination for exchange records
pub trait LogSink: Send + Sync {
    /// Take ownership of a sealed record
    fn emit(&self, record: ExchangeRecord) -> Result<(), SinkError>;

    /// Called when an exchange starts, before any body is read
    fn exchange_started(&self, _start: &ExchangeStart<'_>) {}
}

impl<S: LogSink + ?Sized> LogSink for Arc<S> {
    fn emit(&self, record: ExchangeRecord) -> Result<(), SinkError> {
        (**self).emit(record)
    }

    fn exchange_started(&self, start: &ExchangeStart<'_>) {
        (**self).exchange_started(start)
    }
}

impl<S: LogSink + ?Sized> LogSink for Box<S> {
    fn emit(&self, record: ExchangeRecord) -> Result<(), SinkError> {
        (**self).emit(record)
    }

    fn exchange_started(&self, start: &ExchangeStart<'_>) {
        (**self).exchange_started(start)
    }
}

enum Severity {
    Info,
    Warn,
    Error,
}

fn severity(record: &ExchangeRecord) -> Severity {
    if record.is_failure() {
        Severity::Error
    } else if record.is_client_error() {
        Severity::Warn
    } else {
        Severity::Info
    }
}

/// `name: value` pairs joined with `, `; repeated headers appear once per value
fn header_text(headers: &HeaderLog) -> String {
    let mut out = String::new();
    for (name, values) in headers {
        for value in values {
            if !out.is_empty() {
                out.push_str(", ");
            }
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
        }
    }
    out
}

fn body_text(body: &Option<LoggedBody>) -> String {
    body.as_ref()
        .map(|body| body.text().into_owned())
        .unwrap_or_default()
}

/// Sink emitting each record as a `tracing` event on the `httplog` target
///
/// 5xx responses and exchanges that did not complete are logged at `ERROR`,
/// 4xx at `WARN`, everything else at `INFO`.
#[derive(Debug, Clone, Default)]
pub struct TracingSink {
    entry_events: bool,
}

impl TracingSink {
    /// Create a sink that only logs completed exchanges
    pub fn new() -> Self {
        Self::default()
    }

    /// Also emit a `DEBUG` event when an exchange starts
    pub fn with_entry_events(mut self, enabled: bool) -> Self {
        self.entry_events = enabled;
        self
    }
}

macro_rules! record_event {
    ($level:expr, $record:expr) => {{
        let record = $record;
        tracing::event!(
            target: "httplog",
            $level,
            exchange_id = %record.id,
            method = %record.method,
            uri = %record.uri,
            status = record.status.unwrap_or_default(),
            duration_ms = record.duration.as_millis() as u64,
            client_ip = record.client_ip.as_deref().unwrap_or_default(),
            session_id = record.session_id.as_deref().unwrap_or_default(),
            username = record.username.as_deref().unwrap_or_default(),
            outcome = %record.outcome,
            truncated = record.is_truncated(),
            request_headers = %header_text(&record.request_headers),
            request_body = %body_text(&record.request_body),
            response_headers = %header_text(&record.response_headers),
            response_body = %body_text(&record.response_body),
            "{} {} {}",
            record.method,
            record.uri,
            record.outcome
        )
    }};
}

impl LogSink for TracingSink {
    fn emit(&self, record: ExchangeRecord) -> Result<(), SinkError> {
        match severity(&record) {
            Severity::Error => record_event!(tracing::Level::ERROR, &record),
            Severity::Warn => record_event!(tracing::Level::WARN, &record),
            Severity::Info => record_event!(tracing::Level::INFO, &record),
        }
        Ok(())
    }

    fn exchange_started(&self, start: &ExchangeStart<'_>) {
        if self.entry_events {
            tracing::debug!(
                target: "httplog",
                exchange_id = %start.id,
                method = start.method,
                uri = start.uri,
                client_ip = start.client_ip.unwrap_or_default(),
                session_id = start.session_id.unwrap_or_default(),
                username = start.username.unwrap_or_default(),
                request_headers = %header_text(start.headers),
                "exchange started"
            );
        }
    }
}

/// Bounded in-memory sink, mostly useful in tests
pub struct MemorySink {
    records: RwLock<VecDeque<ExchangeRecord>>,
    capacity: usize,
    evict_oldest: bool,
}

impl MemorySink {
    /// Keep the last 1000 records
    pub fn new() -> Self {
        Self::bounded(1000)
    }

    /// Keep the last `capacity` records, evicting the oldest
    pub fn bounded(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::with_capacity(capacity.min(1000))),
            capacity,
            evict_oldest: true,
        }
    }

    /// Keep the first `capacity` records and reject the rest with [`SinkError::Full`]
    pub fn rejecting(capacity: usize) -> Self {
        Self {
            evict_oldest: false,
            ..Self::bounded(capacity)
        }
    }

    /// Snapshot of the stored records, oldest first
    pub fn records(&self) -> Vec<ExchangeRecord> {
        self.records
            .read()
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The most recent record
    pub fn last(&self) -> Option<ExchangeRecord> {
        self.records
            .read()
            .ok()
            .and_then(|records| records.back().cloned())
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.read().map(|records| records.len()).unwrap_or(0)
    }

    /// Whether nothing has been stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every stored record
    pub fn clear(&self) {
        if let Ok(mut records) = self.records.write() {
            records.clear();
        }
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemorySink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySink")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, record: ExchangeRecord) -> Result<(), SinkError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| SinkError::Failed(format!("failed to acquire lock: {}", e)))?;

        if records.len() >= self.capacity {
            if !self.evict_oldest || self.capacity == 0 {
                return Err(SinkError::Full);
            }
            records.pop_front();
        }

        records.push_back(record);
        Ok(())
    }
}

/// Sink backed by a closure
pub struct FnSink<F> {
    f: F,
}

impl<F> FnSink<F>
where
    F: Fn(ExchangeRecord) + Send + Sync,
{
    /// Wrap `f`
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> fmt::Debug for FnSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSink").finish_non_exhaustive()
    }
}

impl<F> LogSink for FnSink<F>
where
    F: Fn(ExchangeRecord) + Send + Sync,
{
    fn emit(&self, record: ExchangeRecord) -> Result<(), SinkError> {
        (self.f)(record);
        Ok(())
    }
}
