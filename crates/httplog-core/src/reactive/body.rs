use super::tracker::{BodyEnd, ExchangeTracker};
use crate::capture::CaptureBuffer;
use crate::record::Side;
use bytes::Bytes;
use futures_util::ready;
use hyper::body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Tracker registration of one body
///
/// Reports its end exactly once: at end-of-stream, on the first error, or
/// when dropped before either.
struct Capture {
    side: Side,
    tracker: Arc<ExchangeTracker>,
    ended: bool,
}

impl Capture {
    fn end(&mut self, end: BodyEnd) {
        if !std::mem::replace(&mut self.ended, true) {
            self.tracker.body_ended(self.side, end);
        }
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.end(BodyEnd::Dropped);
    }
}

pin_project! {
    /// A body that captures its data frames on the way through
    ///
    /// Frames are forwarded untouched. Data frames are appended to this
    /// side's bounded buffer, which the exchange's tracker holds. End-of-stream,
    /// errors and early drops are reported to the same tracker.
    pub struct CaptureBody<B> {
        #[pin]
        inner: B,
        capture: Option<Capture>,
    }
}

impl<B: Body> CaptureBody<B> {
    pub(crate) fn tracked(inner: B, side: Side, buffer: CaptureBuffer, tracker: Arc<ExchangeTracker>) -> Self {
        tracker.track(side, buffer);
        let mut capture = Capture {
            side,
            tracker,
            ended: false,
        };
        // hyper stops polling once the body reports its end
        if inner.is_end_stream() {
            capture.end(BodyEnd::Complete);
        }

        Self {
            inner,
            capture: Some(capture),
        }
    }
}

impl<B> CaptureBody<B> {
    /// Wrap a body without capturing anything (excluded routes)
    pub fn untracked(inner: B) -> Self {
        Self {
            inner,
            capture: None,
        }
    }

    /// Whether frames are being captured
    pub fn is_tracked(&self) -> bool {
        self.capture.is_some()
    }

    /// Reference to the wrapped body
    pub fn get_ref(&self) -> &B {
        &self.inner
    }
}

impl<B> Body for CaptureBody<B>
where
    B: Body<Data = Bytes>,
    B::Error: fmt::Display,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        let result = ready!(this.inner.as_mut().poll_frame(cx));

        if let Some(capture) = this.capture.as_mut() {
            match &result {
                Some(Ok(frame)) => {
                    if let Some(data) = frame.data_ref() {
                        capture.tracker.record(capture.side, data);
                    }
                    if this.inner.is_end_stream() {
                        capture.end(BodyEnd::Complete);
                    }
                }
                Some(Err(e)) => capture.end(BodyEnd::Failed(e.to_string())),
                None => capture.end(BodyEnd::Complete),
            }
        }

        Poll::Ready(result)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B: fmt::Debug> fmt::Debug for CaptureBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureBody")
            .field("inner", &self.inner)
            .field("tracked", &self.is_tracked())
            .finish()
    }
}
