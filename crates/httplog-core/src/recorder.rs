//! Exchange recorder
//!
//! [`ExchangeRecorder::start`] opens an [`Exchange`] when a request arrives;
//! [`Exchange::complete`] seals it into an [`ExchangeRecord`], runs redaction
//! and hands the record to the sink. Completion happens at most once per
//! exchange no matter how many completion or error signals race for it, and
//! an exchange dropped without completing still produces an `Aborted` record.

use crate::capture::CapturedBody;
use crate::config::{collect_headers, cookie_value, LoggingConfig, RequestHead};
use crate::record::{ExchangeId, ExchangeRecord, HeaderLog, LoggedBody, Outcome, Side};
use crate::redact::redact;
use crate::sink::{ExchangeStart, LogSink};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method, StatusCode, Uri};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

/// Opens exchanges and owns the configuration and sink they report to
///
/// Cheap to clone.
#[derive(Clone)]
pub struct ExchangeRecorder {
    config: Arc<LoggingConfig>,
    sink: Arc<dyn LogSink>,
}

impl ExchangeRecorder {
    /// Create a recorder
    pub fn new(config: impl Into<Arc<LoggingConfig>>, sink: impl LogSink + 'static) -> Self {
        Self::with_shared_sink(config, Arc::new(sink))
    }

    /// Create a recorder sharing an existing sink
    pub fn with_shared_sink(config: impl Into<Arc<LoggingConfig>>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            config: config.into(),
            sink,
        }
    }

    /// The configuration
    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }

    /// Whether a request is logged at all
    pub fn should_log(&self, method: &Method, path: &str) -> bool {
        self.config.should_log(method, path)
    }

    /// Open an exchange. Returns `None` when the route is excluded.
    pub fn start(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> Option<Exchange> {
        self.start_with_client(method, uri, headers, None)
    }

    /// Open an exchange for a request from `client`
    ///
    /// Without a socket address the first `X-Forwarded-For` entry is used.
    pub fn start_with_client(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        client: Option<SocketAddr>,
    ) -> Option<Exchange> {
        self.start_head(&RequestHead::new(method, uri, headers), client)
    }

    /// Open an exchange from a request head
    ///
    /// Adapters use this so the username provider sees the request
    /// extensions.
    pub fn start_head(&self, head: &RequestHead<'_>, client: Option<SocketAddr>) -> Option<Exchange> {
        let RequestHead {
            method,
            uri,
            headers,
            ..
        } = *head;
        let path = uri.path();
        if !self.should_log(method, path) {
            tracing::trace!(%method, path, "route excluded from exchange logging");
            return None;
        }

        let config = &self.config;
        let logged_uri = if config.include_query_string {
            uri.path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| path.to_string())
        } else {
            path.to_string()
        };

        let client_ip = config
            .include_client_info
            .then(|| {
                client
                    .map(|addr| addr.ip().to_string())
                    .or_else(|| forwarded_for(headers))
            })
            .flatten();
        let session_id = config
            .session_cookie
            .as_deref()
            .filter(|_| config.include_client_info)
            .and_then(|name| cookie_value(headers, name));
        let username = config
            .username_provider
            .as_ref()
            .filter(|_| config.include_client_info)
            .and_then(|provider| provider.username(head));

        let request_headers = collect_headers(
            headers,
            &config.include_headers,
            config.rules.header_rules_for(Side::Request, method, path),
            &config.mask_token,
        );

        let exchange = Exchange {
            recorder: self.clone(),
            id: ExchangeId::new(),
            started_at: SystemTime::now(),
            started: Instant::now(),
            method: method.clone(),
            path: path.to_string(),
            uri: logged_uri,
            client_ip,
            session_id,
            username,
            request_headers,
            request_content_type: content_type(headers),
            request_body: None,
            phase: Phase::Started,
            completed: AtomicBool::new(false),
        };

        self.sink.exchange_started(&ExchangeStart {
            id: exchange.id,
            method: exchange.method.as_str(),
            uri: &exchange.uri,
            client_ip: exchange.client_ip.as_deref(),
            session_id: exchange.session_id.as_deref(),
            username: exchange.username.as_deref(),
            headers: &exchange.request_headers,
        });
        tracing::trace!(exchange_id = %exchange.id, "exchange started");

        Some(exchange)
    }
}

impl fmt::Debug for ExchangeRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeRecorder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

/// Lifecycle of an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Headers recorded, handler not yet invoked
    Started,
    /// The handler is producing the response
    HandlerRunning,
    /// The record has been sealed
    Completed,
}

/// How the exchange ended, as reported by an adapter
#[derive(Debug, Clone)]
pub struct Completion {
    /// Response status, if a response head was produced
    pub status: Option<StatusCode>,
    /// Response headers
    pub headers: HeaderMap,
    /// Captured response body
    pub body: Option<CapturedBody>,
    /// Outcome of the exchange
    pub outcome: Outcome,
}

impl Completion {
    /// A normally completed exchange with `status`
    pub fn new(status: StatusCode) -> Self {
        Self {
            status: Some(status),
            headers: HeaderMap::new(),
            body: None,
            outcome: Outcome::Completed,
        }
    }

    /// An exchange that ended without a response head
    pub fn without_response(outcome: Outcome) -> Self {
        Self {
            status: None,
            headers: HeaderMap::new(),
            body: None,
            outcome,
        }
    }

    /// Set the response headers
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set the captured response body
    pub fn body(mut self, body: CapturedBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Set the outcome
    pub fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }
}

/// Result of [`Exchange::complete`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealStatus {
    /// The record was handed to the sink
    Emitted,
    /// The sink rejected the record; the failure was logged
    SinkFailed,
    /// The exchange had already been completed; nothing was emitted
    AlreadyCompleted,
}

/// One in-flight HTTP exchange
pub struct Exchange {
    recorder: ExchangeRecorder,
    id: ExchangeId,
    started_at: SystemTime,
    started: Instant,
    method: Method,
    path: String,
    uri: String,
    client_ip: Option<String>,
    session_id: Option<String>,
    username: Option<String>,
    request_headers: HeaderLog,
    request_content_type: Option<String>,
    request_body: Option<CapturedBody>,
    phase: Phase,
    completed: AtomicBool,
}

impl Exchange {
    /// Exchange id
    pub fn id(&self) -> ExchangeId {
        self.id
    }

    /// Request method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path, without query string
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Current lifecycle phase
    ///
    /// [`Phase::Completed`] as soon as the record has been sealed.
    pub fn phase(&self) -> Phase {
        if self.is_completed() {
            Phase::Completed
        } else {
            self.phase
        }
    }

    /// The configuration the exchange was opened under
    pub fn config(&self) -> &LoggingConfig {
        &self.recorder.config
    }

    /// Whether the record has been sealed
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Note that the handler has been invoked
    pub fn handler_running(&mut self) {
        if self.phase == Phase::Started {
            self.phase = Phase::HandlerRunning;
            tracing::trace!(exchange_id = %self.id, "handler running");
        }
    }

    /// Attach the captured request body
    ///
    /// A later call replaces an earlier one; after completion it is ignored.
    pub fn attach_request_body(&mut self, body: CapturedBody) {
        if self.is_completed() {
            tracing::debug!(exchange_id = %self.id, "request body attached after completion, ignored");
            return;
        }
        self.request_body = Some(body);
    }

    /// Seal the record and hand it to the sink
    ///
    /// Only the first call has any effect. Later calls log a warning and
    /// return [`SealStatus::AlreadyCompleted`].
    pub fn complete(&self, completion: Completion) -> SealStatus {
        if self.completed.swap(true, Ordering::AcqRel) {
            tracing::warn!(
                exchange_id = %self.id,
                outcome = %completion.outcome,
                "exchange completed more than once, ignoring"
            );
            return SealStatus::AlreadyCompleted;
        }

        let record = self.seal(completion);
        match self.recorder.sink.emit(record) {
            Ok(()) => SealStatus::Emitted,
            Err(e) => {
                tracing::warn!(exchange_id = %self.id, error = %e, "log sink failed to emit exchange record");
                SealStatus::SinkFailed
            }
        }
    }

    fn seal(&self, completion: Completion) -> ExchangeRecord {
        let config = self.config();
        let rules = &config.rules;

        let request_body = config.log_request_body.then(|| {
            self.logged_body(
                Side::Request,
                self.request_body.clone().unwrap_or_default(),
                self.request_content_type.clone(),
            )
        });

        let response_body = config.log_response_body.then(|| {
            self.logged_body(
                Side::Response,
                completion.body.unwrap_or_default(),
                content_type(&completion.headers),
            )
        });

        let response_headers = collect_headers(
            &completion.headers,
            &config.include_headers,
            rules.header_rules_for(Side::Response, &self.method, &self.path),
            &config.mask_token,
        );

        tracing::trace!(exchange_id = %self.id, outcome = %completion.outcome, "exchange completed");

        ExchangeRecord {
            id: self.id,
            started_at: self.started_at,
            ended_at: SystemTime::now(),
            duration: self.started.elapsed(),
            method: self.method.to_string(),
            uri: self.uri.clone(),
            client_ip: self.client_ip.clone(),
            session_id: self.session_id.clone(),
            username: self.username.clone(),
            request_headers: self.request_headers.clone(),
            request_body,
            status: completion.status.map(|status| status.as_u16()),
            response_headers,
            response_body,
            outcome: completion.outcome,
        }
    }

    fn logged_body(&self, side: Side, body: CapturedBody, content_type: Option<String>) -> LoggedBody {
        let config = self.config();
        let redacted = redact(
            &body.bytes,
            content_type.as_deref(),
            config.rules.body_rules_for(side, &self.method, &self.path),
            &config.mask_token,
        );

        LoggedBody {
            content: redacted.bytes,
            content_type,
            total_len: body.total_len,
            truncation: body.truncation,
            redaction: redacted.note,
        }
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        if !self.is_completed() {
            tracing::debug!(exchange_id = %self.id, phase = ?self.phase, "exchange dropped before completion");
            self.complete(Completion::without_response(Outcome::Aborted));
        }
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("phase", &self.phase())
            .field("completed", &self.is_completed())
            .finish()
    }
}
