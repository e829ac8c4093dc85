use crate::capture::{CaptureBuffer, Truncation};
use crate::record::{ExchangeId, Outcome, Side};
use crate::recorder::{Completion, Exchange};
use http::{HeaderMap, StatusCode};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// How a body stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyEnd {
    /// End-of-stream was reached
    Complete,
    /// The stream yielded an error
    Failed(String),
    /// The body was dropped before its end
    Dropped,
}

#[derive(Debug)]
struct State {
    exchange: Option<Exchange>,
    request: Option<CaptureBuffer>,
    response: Option<CaptureBuffer>,
    head: Option<(StatusCode, HeaderMap)>,
}

impl State {
    fn buffer(&mut self, side: Side) -> Option<&mut CaptureBuffer> {
        match side {
            Side::Request => self.request.as_mut(),
            Side::Response => self.response.as_mut(),
        }
    }

    /// Take the exchange out for completion with `outcome`
    ///
    /// A body still streaming keeps the prefix captured so far, marked with
    /// why it stopped.
    fn seal(&mut self, outcome: Outcome) -> Option<(Exchange, Completion)> {
        let mut exchange = self.exchange.take()?;

        let request_cause = match outcome {
            Outcome::Cancelled { .. } => Truncation::Cancelled,
            _ => Truncation::Abandoned,
        };
        if let Some(buffer) = self.request.as_mut() {
            buffer.interrupt(request_cause);
            exchange.attach_request_body(buffer.take());
        }
        let body = self.response.as_mut().map(|buffer| {
            buffer.interrupt(Truncation::Cancelled);
            buffer.take()
        });

        let (status, headers) = match self.head.take() {
            Some((status, headers)) => (Some(status), headers),
            None => (None, HeaderMap::new()),
        };

        let completion = Completion {
            status,
            headers,
            body,
            outcome,
        };
        Some((exchange, completion))
    }

    fn seal_if_done(&mut self) -> Option<(Exchange, Completion)> {
        let request_done = self.request.as_ref().map_or(true, CaptureBuffer::is_finished);
        let response_done = self.response.as_ref().is_some_and(CaptureBuffer::is_finished);
        if request_done && response_done {
            self.seal(Outcome::Completed)
        } else {
            None
        }
    }
}

/// Completion state shared by the two bodies and the handler future of one
/// exchange
///
/// The exchange is completed once both bodies have ended, or as soon as
/// either body fails, the response is cancelled, or the handler fails or is
/// dropped. Every later signal is ignored. The lock is never held while the
/// record is redacted and emitted.
///
/// Both capture buffers live here rather than in the bodies, so an early
/// completion still sees what the other side has streamed so far.
#[derive(Debug)]
pub struct ExchangeTracker {
    id: ExchangeId,
    state: Mutex<State>,
}

impl ExchangeTracker {
    /// Start tracking `exchange`
    pub fn new(mut exchange: Exchange) -> Self {
        exchange.handler_running();
        Self {
            id: exchange.id(),
            state: Mutex::new(State {
                exchange: Some(exchange),
                request: None,
                response: None,
                head: None,
            }),
        }
    }

    /// The tracked exchange's id
    pub fn id(&self) -> ExchangeId {
        self.id
    }

    /// Whether the exchange has been completed
    pub fn is_completed(&self) -> bool {
        self.lock().exchange.is_none()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fire(&self, sealed: Option<(Exchange, Completion)>) {
        if let Some((exchange, completion)) = sealed {
            exchange.complete(completion);
        }
    }

    /// Start capturing one side into `buffer`
    ///
    /// Once the request side is tracked, normal completion waits for it to
    /// end. Ignored after completion.
    pub fn track(&self, side: Side, buffer: CaptureBuffer) {
        let mut state = self.lock();
        if state.exchange.is_none() {
            return;
        }
        match side {
            Side::Request => state.request = Some(buffer),
            Side::Response => state.response = Some(buffer),
        }
    }

    /// Append a data frame seen on `side`
    pub fn record(&self, side: Side, data: &[u8]) {
        let mut state = self.lock();
        if state.exchange.is_none() {
            return;
        }
        if let Some(buffer) = state.buffer(side) {
            buffer.record(data);
        }
    }

    /// A body reached its end, failed, or was dropped
    ///
    /// A failure completes the exchange immediately. A dropped response body
    /// means the client went away and completes it as cancelled; a dropped
    /// request body only means the handler stopped reading.
    pub fn body_ended(&self, side: Side, end: BodyEnd) {
        let sealed = {
            let mut state = self.lock();
            if state.exchange.is_none() {
                tracing::trace!(exchange_id = %self.id, %side, ?end, "body ended after completion");
                return;
            }
            let Some(buffer) = state.buffer(side) else {
                tracing::trace!(exchange_id = %self.id, %side, ?end, "body ended on an untracked side");
                return;
            };

            let first = match (&end, side) {
                (BodyEnd::Complete, _) => buffer.finish(),
                (BodyEnd::Failed(message), _) => buffer.fail(message.clone()),
                (BodyEnd::Dropped, Side::Request) => buffer.interrupt(Truncation::Abandoned),
                (BodyEnd::Dropped, Side::Response) => buffer.interrupt(Truncation::Cancelled),
            };
            if !first {
                return;
            }

            match (end, side) {
                (BodyEnd::Failed(message), side) => state.seal(Outcome::StreamError { side, message }),
                (BodyEnd::Dropped, Side::Response) => state.seal(Outcome::Cancelled {
                    side: Some(Side::Response),
                }),
                (BodyEnd::Complete, _) | (BodyEnd::Dropped, Side::Request) => state.seal_if_done(),
            }
        };

        self.fire(sealed);
    }

    /// The handler produced a response head
    pub fn response_started(&self, status: StatusCode, headers: HeaderMap) {
        let mut state = self.lock();
        if state.exchange.is_some() {
            state.head = Some((status, headers));
        }
    }

    /// The handler failed instead of producing a response
    pub fn handler_failed(&self, message: String) {
        let sealed = self.lock().seal(Outcome::HandlerError { message });
        self.fire(sealed);
    }

    /// The handler future was dropped before producing a response
    pub fn cancelled(&self) {
        let sealed = {
            let mut state = self.lock();
            if state.head.is_some() {
                None
            } else {
                state.seal(Outcome::Cancelled { side: None })
            }
        };
        self.fire(sealed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoggingConfig;
    use crate::recorder::ExchangeRecorder;
    use crate::sink::MemorySink;
    use http::{Method, Uri};
    use std::sync::Arc;

    fn tracker() -> (ExchangeTracker, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let config = LoggingConfig::builder().log_bodies(true).build().unwrap();
        let recorder = ExchangeRecorder::with_shared_sink(config, sink.clone());
        let uri: Uri = "/".parse().unwrap();
        let exchange = recorder.start(&Method::POST, &uri, &HeaderMap::new()).unwrap();
        (ExchangeTracker::new(exchange), sink)
    }

    fn stream(tracker: &ExchangeTracker, side: Side, data: &[u8], end: BodyEnd) {
        tracker.record(side, data);
        tracker.body_ended(side, end);
    }

    #[test]
    fn test_completes_after_both_sides_in_either_order() {
        for request_first in [true, false] {
            let (tracker, sink) = tracker();
            tracker.track(Side::Request, CaptureBuffer::new(64));
            tracker.response_started(StatusCode::OK, HeaderMap::new());
            tracker.track(Side::Response, CaptureBuffer::new(64));

            if request_first {
                stream(&tracker, Side::Request, b"req", BodyEnd::Complete);
                assert!(sink.is_empty());
                stream(&tracker, Side::Response, b"res", BodyEnd::Complete);
            } else {
                stream(&tracker, Side::Response, b"res", BodyEnd::Complete);
                assert!(sink.is_empty());
                stream(&tracker, Side::Request, b"req", BodyEnd::Complete);
            }

            let record = sink.last().unwrap();
            assert_eq!(sink.len(), 1);
            assert_eq!(record.outcome, Outcome::Completed);
            assert_eq!(record.request_body.unwrap().text(), "req");
            assert_eq!(record.response_body.unwrap().text(), "res");
            assert!(tracker.is_completed());
        }
    }

    #[test]
    fn test_error_completes_immediately_and_later_signals_are_ignored() {
        let (tracker, sink) = tracker();
        tracker.track(Side::Request, CaptureBuffer::new(64));
        stream(&tracker, Side::Request, b"0123456789", BodyEnd::Failed("reset".to_string()));

        assert_eq!(sink.len(), 1);
        tracker.handler_failed("body error".to_string());
        tracker.response_started(StatusCode::OK, HeaderMap::new());
        tracker.track(Side::Response, CaptureBuffer::new(64));
        stream(&tracker, Side::Response, b"late", BodyEnd::Complete);
        tracker.cancelled();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].outcome,
            Outcome::StreamError {
                side: Side::Request,
                message: "reset".to_string()
            }
        );
        assert_eq!(records[0].status, None);
        assert_eq!(records[0].response_body.as_ref().unwrap().total_len, 0);
    }

    #[test]
    fn test_dropped_request_body_waits_for_response() {
        let (tracker, sink) = tracker();
        tracker.track(Side::Request, CaptureBuffer::new(64));
        stream(&tracker, Side::Request, b"par", BodyEnd::Dropped);
        assert!(sink.is_empty());

        tracker.response_started(StatusCode::NO_CONTENT, HeaderMap::new());
        tracker.track(Side::Response, CaptureBuffer::new(64));
        tracker.body_ended(Side::Response, BodyEnd::Complete);

        let record = sink.last().unwrap();
        assert_eq!(record.status, Some(204));
        let request = record.request_body.unwrap();
        assert_eq!(request.text(), "par");
        assert_eq!(request.truncation, Some(Truncation::Abandoned));
    }

    #[test]
    fn test_dropped_response_body_is_a_cancellation() {
        let (tracker, sink) = tracker();
        tracker.response_started(StatusCode::OK, HeaderMap::new());
        tracker.track(Side::Response, CaptureBuffer::new(64));
        stream(&tracker, Side::Response, b"half", BodyEnd::Dropped);

        let record = sink.last().unwrap();
        assert_eq!(
            record.outcome,
            Outcome::Cancelled {
                side: Some(Side::Response)
            }
        );
        assert_eq!(record.status, Some(200));
        assert_eq!(record.response_body.unwrap().text(), "half");
    }

    #[test]
    fn test_cancel_after_response_head_is_ignored() {
        let (tracker, sink) = tracker();
        tracker.response_started(StatusCode::OK, HeaderMap::new());
        tracker.track(Side::Response, CaptureBuffer::new(64));
        tracker.cancelled();
        assert!(sink.is_empty());

        stream(&tracker, Side::Response, b"ok", BodyEnd::Complete);
        assert_eq!(sink.last().unwrap().outcome, Outcome::Completed);
    }

    #[test]
    fn test_cancel_keeps_prefix_of_request_in_flight() {
        let (tracker, sink) = tracker();
        tracker.track(Side::Request, CaptureBuffer::new(64));
        tracker.record(Side::Request, b"0123456789");
        tracker.cancelled();

        let record = sink.last().unwrap();
        assert_eq!(record.outcome, Outcome::Cancelled { side: None });
        let request = record.request_body.unwrap();
        assert_eq!(request.text(), "0123456789");
        assert_eq!(request.total_len, 10);
        assert_eq!(request.truncation, Some(Truncation::Cancelled));

        // The body's own drop arrives after the seal
        tracker.body_ended(Side::Request, BodyEnd::Dropped);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_response_error_keeps_prefix_of_unread_request() {
        let (tracker, sink) = tracker();
        tracker.track(Side::Request, CaptureBuffer::new(64));
        tracker.record(Side::Request, b"head");
        tracker.response_started(StatusCode::OK, HeaderMap::new());
        tracker.track(Side::Response, CaptureBuffer::new(64));
        stream(&tracker, Side::Response, b"par", BodyEnd::Failed("broken pipe".to_string()));

        let record = sink.last().unwrap();
        let request = record.request_body.unwrap();
        assert_eq!(request.text(), "head");
        assert_eq!(request.truncation, Some(Truncation::Abandoned));
        let response = record.response_body.unwrap();
        assert_eq!(response.text(), "par");
        assert_eq!(
            response.truncation,
            Some(Truncation::Error("broken pipe".to_string()))
        );
    }

    #[test]
    fn test_dropping_an_incomplete_tracker_aborts() {
        let (tracker, sink) = tracker();
        drop(tracker);
        assert_eq!(sink.last().unwrap().outcome, Outcome::Aborted);
    }

    #[test]
    fn test_concurrent_signals_emit_once() {
        let (tracker, sink) = tracker();
        let tracker = Arc::new(tracker);
        tracker.response_started(StatusCode::OK, HeaderMap::new());
        tracker.track(Side::Response, CaptureBuffer::new(64));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        stream(&tracker, Side::Response, b"x", BodyEnd::Complete);
                    } else {
                        tracker.handler_failed(format!("worker {}", i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(sink.len(), 1);
    }
}
