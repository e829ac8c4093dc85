//! Blocking pipeline adapter
//!
//! Runs one exchange on the calling thread. The request body is wrapped in a
//! [`CaptureReader`] before the handler sees it; once the handler returns,
//! whatever it left unread is drained (up to the capture budget), the
//! response body is read to completion through its own capture, and the
//! exchange is completed exactly once.
//!
//! ```rust
//! use httplog_core::blocking::BlockingAdapter;
//! use httplog_core::{ExchangeRecorder, LoggingConfig, MemorySink};
//! use std::io::{Cursor, Read};
//! use std::sync::Arc;
//!
//! let sink = Arc::new(MemorySink::new());
//! let config = LoggingConfig::builder().log_bodies(true).build().unwrap();
//! let adapter = BlockingAdapter::new(ExchangeRecorder::with_shared_sink(config, sink.clone()));
//!
//! let request = http::Request::post("/echo").body(Cursor::new(b"ping".to_vec())).unwrap();
//! let response = adapter
//!     .handle(request, |mut req| -> std::io::Result<_> {
//!         let mut body = Vec::new();
//!         req.body_mut().read_to_end(&mut body)?;
//!         Ok(http::Response::new(Cursor::new(body)))
//!     })
//!     .unwrap();
//!
//! assert_eq!(&response.body()[..], b"ping");
//! assert_eq!(sink.last().unwrap().response_body.unwrap().text(), "ping");
//! ```

use crate::capture::{CaptureBuffer, CaptureReader, CaptureWriter, CapturedBody};
use crate::config::RequestHead;
use crate::record::{Outcome, Side};
use crate::recorder::{Completion, Exchange, ExchangeRecorder};
use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, Request, Response, StatusCode};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::SocketAddr;

/// Errors a blocking handler may return
///
/// The adapter records the error's display text and the status it maps to,
/// then returns the error to the caller untouched.
pub trait HandlerError: fmt::Display {
    /// HTTP status the error will be rendered as, if known
    fn status(&self) -> Option<StatusCode> {
        None
    }
}

impl HandlerError for io::Error {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    ExchangeStarted,
    HandlerRunning,
    Completed,
}

impl State {
    fn advance(&mut self, next: State) {
        tracing::trace!(from = ?*self, to = ?next, "blocking exchange state");
        *self = next;
    }
}

/// Adapter for thread-per-request servers
#[derive(Debug, Clone)]
pub struct BlockingAdapter {
    recorder: ExchangeRecorder,
}

impl BlockingAdapter {
    /// Create an adapter reporting to `recorder`
    pub fn new(recorder: ExchangeRecorder) -> Self {
        Self { recorder }
    }

    /// The underlying recorder
    pub fn recorder(&self) -> &ExchangeRecorder {
        &self.recorder
    }

    /// Run `handler` for `request` and return the fully buffered response.
    ///
    /// A `SocketAddr` in the request extensions is logged as the client
    /// address. A handler error is recorded and returned unchanged.
    pub fn handle<R, B, E, F>(&self, request: Request<R>, handler: F) -> Result<Response<Bytes>, E>
    where
        R: Read,
        B: Read,
        E: HandlerError + From<io::Error>,
        F: FnOnce(Request<&mut CaptureReader<R>>) -> Result<Response<B>, E>,
    {
        let mut state = State::Idle;
        let (parts, body) = request.into_parts();
        let (exchange, mut reader) = self.open(&parts, body, &mut state);

        let Some(mut exchange) = exchange else {
            return match handler(Request::from_parts(parts, &mut reader)) {
                Ok(response) => buffer_response(response, CaptureBuffer::disabled())
                    .map(|(response, _)| response)
                    .map_err(|(e, _)| E::from(e)),
                Err(e) => Err(e),
            };
        };

        exchange.handler_running();
        state.advance(State::HandlerRunning);
        let result = handler(Request::from_parts(parts, &mut reader));
        finish_request(&mut exchange, reader);

        let result = match result {
            Ok(response) => {
                let status = response.status();
                let headers = response.headers().clone();
                let capture = exchange.config().capture_buffer(Side::Response);

                match buffer_response(response, capture) {
                    Ok((response, captured)) => {
                        exchange.complete(Completion::new(status).headers(headers).body(captured));
                        Ok(response)
                    }
                    Err((e, captured)) => {
                        exchange.complete(
                            Completion::new(status)
                                .headers(headers)
                                .body(captured)
                                .outcome(Outcome::StreamError {
                                    side: Side::Response,
                                    message: e.to_string(),
                                }),
                        );
                        Err(E::from(e))
                    }
                }
            }
            Err(e) => {
                exchange.complete(handler_failure(&e));
                Err(e)
            }
        };

        state.advance(State::Completed);
        result
    }

    /// Run a handler that writes its response into a [`ResponseWriter`].
    ///
    /// Returns the status and headers the handler set, with `out` as the body.
    pub fn handle_with_writer<R, W, E, F>(
        &self,
        request: Request<R>,
        out: W,
        handler: F,
    ) -> Result<Response<W>, E>
    where
        R: Read,
        W: Write,
        E: HandlerError + From<io::Error>,
        F: FnOnce(Request<&mut CaptureReader<R>>, &mut ResponseWriter<W>) -> Result<(), E>,
    {
        let mut state = State::Idle;
        let (parts, body) = request.into_parts();
        let (exchange, mut reader) = self.open(&parts, body, &mut state);

        let Some(mut exchange) = exchange else {
            let mut writer = ResponseWriter::new(CaptureWriter::with_buffer(out, CaptureBuffer::disabled()));
            handler(Request::from_parts(parts, &mut reader), &mut writer)?;
            writer.body.close()?;
            return Ok(writer.into_response().0);
        };

        let mut writer = ResponseWriter::new(CaptureWriter::with_buffer(
            out,
            exchange.config().capture_buffer(Side::Response),
        ));

        exchange.handler_running();
        state.advance(State::HandlerRunning);
        let result = handler(Request::from_parts(parts, &mut reader), &mut writer);
        finish_request(&mut exchange, reader);

        let result = match result {
            Ok(()) => match writer.body.close() {
                Ok(()) => {
                    let (response, captured) = writer.into_response();
                    exchange.complete(
                        Completion::new(response.status())
                            .headers(response.headers().clone())
                            .body(captured),
                    );
                    Ok(response)
                }
                Err(e) => {
                    let outcome = Outcome::StreamError {
                        side: Side::Response,
                        message: e.to_string(),
                    };
                    let (response, captured) = writer.into_response();
                    exchange.complete(
                        Completion::new(response.status())
                            .headers(response.headers().clone())
                            .body(captured)
                            .outcome(outcome),
                    );
                    Err(E::from(e))
                }
            },
            Err(e) => {
                let (_, captured) = writer.into_response();
                exchange.complete(handler_failure(&e).body(captured));
                Err(e)
            }
        };

        state.advance(State::Completed);
        result
    }

    fn open<R>(&self, parts: &Parts, body: R, state: &mut State) -> (Option<Exchange>, CaptureReader<R>) {
        let client = parts.extensions.get::<SocketAddr>().copied();
        match self.recorder.start_head(&RequestHead::from(parts), client) {
            Some(exchange) => {
                state.advance(State::ExchangeStarted);
                let buffer = exchange.config().capture_buffer(Side::Request);
                (Some(exchange), CaptureReader::with_buffer(body, buffer))
            }
            None => (None, CaptureReader::with_buffer(body, CaptureBuffer::disabled())),
        }
    }
}

/// Drain what the handler left unread and attach the request capture
fn finish_request<R: Read>(exchange: &mut Exchange, mut reader: CaptureReader<R>) {
    let budget = exchange
        .config()
        .max_capture_bytes()
        .saturating_sub(reader.capture().total_len() as usize);

    if let Err(e) = reader.drain(budget) {
        tracing::debug!(exchange_id = %exchange.id(), error = %e, "failed to drain unread request body");
    }
    exchange.attach_request_body(reader.take_capture());
}

fn handler_failure<E: HandlerError>(error: &E) -> Completion {
    Completion {
        status: error.status(),
        headers: HeaderMap::new(),
        body: None,
        outcome: Outcome::HandlerError {
            message: error.to_string(),
        },
    }
}

type Buffered = (Response<Bytes>, CapturedBody);

/// Read a response body to completion through a capture
fn buffer_response<B: Read>(
    response: Response<B>,
    capture: CaptureBuffer,
) -> Result<Buffered, (io::Error, CapturedBody)> {
    let (parts, body) = response.into_parts();
    let mut reader = CaptureReader::with_buffer(body, capture);
    let mut out = Vec::new();

    match reader.read_to_end(&mut out) {
        Ok(_) => {
            let (_, captured) = reader.into_parts();
            Ok((Response::from_parts(parts, Bytes::from(out)), captured))
        }
        Err(e) => {
            let (_, captured) = reader.into_parts();
            Err((e, captured))
        }
    }
}

/// Servlet-style response under construction
///
/// Bytes written go straight to the wrapped writer and are captured on the
/// way through.
#[derive(Debug)]
pub struct ResponseWriter<W> {
    status: StatusCode,
    headers: HeaderMap,
    body: CaptureWriter<W>,
}

impl<W> ResponseWriter<W> {
    fn new(body: CaptureWriter<W>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// Current status (`200 OK` until set)
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Set the response status
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Response headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable response headers
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn into_response(self) -> (Response<W>, CapturedBody) {
        let (inner, captured) = self.body.into_parts();
        let mut response = Response::new(inner);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        (response, captured)
    }
}

impl<W: Write> Write for ResponseWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.body.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.body.flush()
    }
}
