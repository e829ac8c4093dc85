//! Body capture
//!
//! A [`CaptureBuffer`] retains a bounded copy of the bytes flowing through a
//! body while the bytes themselves continue to their original consumer
//! untouched. The same buffer backs every wrapper in this crate:
//!
//! - [`CaptureReader`] for blocking request and response sources
//! - [`CaptureWriter`] for blocking response sinks
//! - [`CaptureBody`](crate::reactive::CaptureBody) for streamed `http_body` bodies
//!
//! # Example
//!
//! ```rust
//! use httplog_core::capture::CaptureReader;
//! use std::io::Read;
//!
//! let mut reader = CaptureReader::new(&b"hello world"[..], 5);
//! let mut out = String::new();
//! reader.read_to_string(&mut out).unwrap();
//!
//! let (_, captured) = reader.into_parts();
//! assert_eq!(out, "hello world");
//! assert_eq!(&captured.bytes[..], b"hello");
//! assert!(captured.is_truncated());
//! ```

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use std::fmt;
use std::io::{self, Read, Write};

/// Upper bound for the buffer's initial allocation
const INITIAL_CAPACITY: usize = 1024;

/// Why a captured body is incomplete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cause", content = "detail", rename_all = "snake_case")]
pub enum Truncation {
    /// The body was longer than the capture limit
    Limit,
    /// The consumer stopped reading before end-of-stream
    Abandoned,
    /// The exchange was cancelled while the body was in flight
    Cancelled,
    /// The underlying source or sink failed
    Error(String),
}

impl Truncation {
    /// Higher ranks replace lower ones; equal ranks keep the first cause.
    fn rank(&self) -> u8 {
        match self {
            Truncation::Limit => 0,
            Truncation::Abandoned => 1,
            Truncation::Cancelled => 2,
            Truncation::Error(_) => 3,
        }
    }
}

impl fmt::Display for Truncation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Truncation::Limit => f.write_str("limit"),
            Truncation::Abandoned => f.write_str("abandoned"),
            Truncation::Cancelled => f.write_str("cancelled"),
            Truncation::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// Bounded byte accumulator owned by exactly one body wrapper
#[derive(Debug)]
pub struct CaptureBuffer {
    buf: BytesMut,
    limit: usize,
    enabled: bool,
    total: u64,
    truncation: Option<Truncation>,
    finished: bool,
}

impl CaptureBuffer {
    /// Create a buffer retaining at most `limit` bytes
    pub fn new(limit: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(limit.min(INITIAL_CAPACITY)),
            limit,
            enabled: true,
            total: 0,
            truncation: None,
            finished: false,
        }
    }

    /// Create a buffer that counts bytes but retains none of them
    ///
    /// Used when body logging is switched off: the stream is still tracked
    /// for completion, but nothing is copied.
    pub fn disabled() -> Self {
        Self {
            buf: BytesMut::new(),
            limit: 0,
            enabled: false,
            total: 0,
            truncation: None,
            finished: false,
        }
    }

    /// Whether bytes are retained at all
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append a chunk, retaining only what fits under the limit
    ///
    /// Chunks arriving after a terminal signal are ignored.
    pub fn record(&mut self, chunk: &[u8]) {
        if self.finished || chunk.is_empty() {
            return;
        }

        self.total += chunk.len() as u64;
        if !self.enabled {
            return;
        }

        let room = self.limit.saturating_sub(self.buf.len());
        if chunk.len() > room {
            self.buf.extend_from_slice(&chunk[..room]);
            self.mark(Truncation::Limit);
        } else {
            self.buf.extend_from_slice(chunk);
        }
    }

    /// Signal end-of-stream. Returns `true` only for the first terminal signal.
    pub fn finish(&mut self) -> bool {
        !std::mem::replace(&mut self.finished, true)
    }

    /// Signal that the underlying stream failed.
    ///
    /// The prefix captured so far is kept. Returns `true` only for the first
    /// terminal signal.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        self.mark(Truncation::Error(message.into()));
        self.finish()
    }

    /// Signal that the stream stopped early for a non-error reason
    pub fn interrupt(&mut self, cause: Truncation) -> bool {
        if self.finished {
            return false;
        }
        self.mark(cause);
        self.finish()
    }

    fn mark(&mut self, cause: Truncation) {
        match &self.truncation {
            Some(current) if current.rank() >= cause.rank() => {}
            _ => self.truncation = Some(cause),
        }
    }

    /// Whether a terminal signal has been observed
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether the retained bytes are only a prefix of the body
    pub fn is_truncated(&self) -> bool {
        self.truncation.is_some()
    }

    /// The bytes retained so far
    pub fn captured(&self) -> &[u8] {
        &self.buf
    }

    /// Number of bytes observed, retained or not
    pub fn total_len(&self) -> u64 {
        self.total
    }

    /// The configured retention limit
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Freeze the buffer into an immutable capture
    pub fn freeze(self) -> CapturedBody {
        CapturedBody {
            bytes: self.buf.freeze(),
            total_len: self.total,
            truncation: self.truncation,
        }
    }

    /// Freeze the buffer in place, leaving an empty finished buffer behind
    pub fn take(&mut self) -> CapturedBody {
        let mut replacement = if self.enabled {
            CaptureBuffer::new(0)
        } else {
            CaptureBuffer::disabled()
        };
        replacement.finished = true;
        std::mem::replace(self, replacement).freeze()
    }
}

/// The immutable result of capturing one body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedBody {
    /// Retained prefix of the body
    pub bytes: Bytes,
    /// Total number of bytes that passed through
    pub total_len: u64,
    /// Why the retained bytes are incomplete, if they are
    pub truncation: Option<Truncation>,
}

impl CapturedBody {
    /// An empty, complete body
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the retained bytes are only a prefix of the body
    pub fn is_truncated(&self) -> bool {
        self.truncation.is_some()
    }
}

/// Pass-through reader that captures what its consumer reads
///
/// End-of-stream is signalled once: after the inner reader returns `Ok(0)`
/// every further read returns `Ok(0)` without touching the inner reader.
/// An error (other than [`io::ErrorKind::Interrupted`]) marks the capture
/// truncated and is returned unchanged.
#[derive(Debug)]
pub struct CaptureReader<R> {
    inner: R,
    capture: CaptureBuffer,
    eof: bool,
}

impl<R> CaptureReader<R> {
    /// Wrap `inner`, retaining at most `limit` bytes
    pub fn new(inner: R, limit: usize) -> Self {
        Self::with_buffer(inner, CaptureBuffer::new(limit))
    }

    /// Wrap `inner` with an existing buffer
    pub fn with_buffer(inner: R, capture: CaptureBuffer) -> Self {
        Self {
            inner,
            capture,
            eof: false,
        }
    }

    /// The capture state
    pub fn capture(&self) -> &CaptureBuffer {
        &self.capture
    }

    /// Whether end-of-stream has been reached
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Reference to the wrapped reader
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Freeze the capture, leaving the reader usable as a plain pass-through
    pub fn take_capture(&mut self) -> CapturedBody {
        self.capture.take()
    }

    /// Split into the wrapped reader and the frozen capture
    pub fn into_parts(self) -> (R, CapturedBody) {
        (self.inner, self.capture.freeze())
    }
}

impl<R: Read> CaptureReader<R> {
    /// Read and discard the rest of the input.
    ///
    /// Stops at end-of-stream or once more than `budget` bytes were drained,
    /// in which case the capture is marked [`Truncation::Abandoned`].
    /// Interrupted reads are retried. Any other error fails the capture
    /// before it is returned.
    pub fn drain(&mut self, budget: usize) -> io::Result<u64> {
        let mut scratch = [0u8; 4096];
        let mut drained = 0u64;

        while !self.eof {
            if drained > budget as u64 {
                self.capture.interrupt(Truncation::Abandoned);
                break;
            }
            match self.read(&mut scratch) {
                Ok(n) => drained += n as u64,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        Ok(drained)
    }
}

impl<R: Read> Read for CaptureReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.eof {
            return Ok(0);
        }

        match self.inner.read(buf) {
            Ok(0) if !buf.is_empty() => {
                self.eof = true;
                if self.capture.finish() {
                    tracing::trace!(bytes = self.capture.total_len(), "captured body reached end of stream");
                }
                Ok(0)
            }
            Ok(n) => {
                self.capture.record(&buf[..n]);
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(e),
            Err(e) => {
                self.capture.fail(e.to_string());
                Err(e)
            }
        }
    }
}

/// Pass-through writer that captures what its producer writes
///
/// Only the bytes the inner writer actually accepted are captured.
/// [`close`](CaptureWriter::close) flushes and signals end-of-stream; calling
/// it again is a no-op.
#[derive(Debug)]
pub struct CaptureWriter<W> {
    inner: W,
    capture: CaptureBuffer,
    closed: bool,
}

impl<W> CaptureWriter<W> {
    /// Wrap `inner`, retaining at most `limit` bytes
    pub fn new(inner: W, limit: usize) -> Self {
        Self::with_buffer(inner, CaptureBuffer::new(limit))
    }

    /// Wrap `inner` with an existing buffer
    pub fn with_buffer(inner: W, capture: CaptureBuffer) -> Self {
        Self {
            inner,
            capture,
            closed: false,
        }
    }

    /// The capture state
    pub fn capture(&self) -> &CaptureBuffer {
        &self.capture
    }

    /// Whether [`close`](CaptureWriter::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Reference to the wrapped writer
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Split into the wrapped writer and the frozen capture
    pub fn into_parts(self) -> (W, CapturedBody) {
        (self.inner, self.capture.freeze())
    }
}

impl<W: Write> CaptureWriter<W> {
    /// Flush the inner writer and signal end-of-stream
    pub fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match self.inner.flush() {
            Ok(()) => {
                self.capture.finish();
                Ok(())
            }
            Err(e) => {
                self.capture.fail(e.to_string());
                Err(e)
            }
        }
    }
}

impl<W: Write> Write for CaptureWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write after response body was closed",
            ));
        }

        match self.inner.write(buf) {
            Ok(n) => {
                self.capture.record(&buf[..n]);
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(e),
            Err(e) => {
                self.capture.fail(e.to_string());
                Err(e)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().map_err(|e| {
            self.capture.fail(e.to_string());
            e
        })
    }
}
