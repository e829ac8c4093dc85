use super::body::CaptureBody;
use super::tracker::ExchangeTracker;
use crate::config::RequestHead;
use crate::record::{ExchangeId, Side};
use crate::recorder::ExchangeRecorder;
use futures_util::ready;
use http::{Request, Response};
use hyper::body::Body;
use pin_project_lite::pin_project;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Opens exchanges for a stream-based server
///
/// Servers that are not built on tower call [`begin`](Self::begin) per
/// request and route the two bodies and the handler result through the
/// returned [`ExchangeHandle`]. Tower users apply [`HttpLogLayer`] instead.
#[derive(Debug, Clone)]
pub struct NonBlockingAdapter {
    recorder: ExchangeRecorder,
}

impl NonBlockingAdapter {
    /// Create an adapter reporting to `recorder`
    pub fn new(recorder: ExchangeRecorder) -> Self {
        Self { recorder }
    }

    /// The recorder exchanges are reported to
    pub fn recorder(&self) -> &ExchangeRecorder {
        &self.recorder
    }

    /// Open an exchange for `request`
    ///
    /// Returns `None` when the route is excluded or logging is disabled. The
    /// client address is taken from a [`SocketAddr`] request extension when
    /// present.
    pub fn begin<B>(&self, request: &Request<B>) -> Option<ExchangeHandle> {
        let client = request.extensions().get::<SocketAddr>().copied();
        let exchange = self.recorder.start_head(&RequestHead::of(request), client)?;

        Some(ExchangeHandle {
            tracker: Arc::new(ExchangeTracker::new(exchange)),
            recorder: self.recorder.clone(),
        })
    }
}

/// The per-request side of a non-blocking exchange
#[derive(Debug)]
pub struct ExchangeHandle {
    tracker: Arc<ExchangeTracker>,
    recorder: ExchangeRecorder,
}

impl ExchangeHandle {
    /// Exchange id
    pub fn id(&self) -> ExchangeId {
        self.tracker.id()
    }

    /// Whether the record has already been emitted
    pub fn is_completed(&self) -> bool {
        self.tracker.is_completed()
    }

    /// Wrap the inbound body. Completion then waits for it to end.
    pub fn wrap_request<B: Body>(&self, body: B) -> CaptureBody<B> {
        let buffer = self.recorder.config().capture_buffer(Side::Request);
        CaptureBody::tracked(body, Side::Request, buffer, self.tracker.clone())
    }

    /// Record the response head and wrap the outbound body
    pub fn wrap_response<B: Body>(&self, response: Response<B>) -> Response<CaptureBody<B>> {
        let (parts, body) = response.into_parts();
        self.tracker
            .response_started(parts.status, parts.headers.clone());

        let buffer = self.recorder.config().capture_buffer(Side::Response);
        let body = CaptureBody::tracked(body, Side::Response, buffer, self.tracker.clone());
        Response::from_parts(parts, body)
    }

    /// The handler failed without producing a response
    pub fn handler_failed(&self, error: &impl fmt::Display) {
        self.tracker.handler_failed(error.to_string());
    }

    /// The request was abandoned before the handler produced a response
    pub fn cancel(&self) {
        self.tracker.cancelled();
    }
}

/// Tower layer logging every exchange that passes through it
///
/// ```rust
/// use http_body_util::Full;
/// use bytes::Bytes;
/// use httplog_core::reactive::{CaptureBody, HttpLogLayer};
/// use httplog_core::{ExchangeRecorder, LoggingConfig, MemorySink};
/// use std::convert::Infallible;
/// use std::sync::Arc;
/// use tower::{ServiceBuilder, ServiceExt};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let sink = Arc::new(MemorySink::new());
/// let config = LoggingConfig::builder().build().unwrap();
/// let recorder = ExchangeRecorder::with_shared_sink(config, sink.clone());
///
/// let service = ServiceBuilder::new()
///     .layer(HttpLogLayer::new(recorder))
///     .service_fn(|_req: http::Request<CaptureBody<Full<Bytes>>>| async {
///         Ok::<_, Infallible>(http::Response::new(Full::new(Bytes::new())))
///     });
///
/// let request = http::Request::get("/ping").body(Full::new(Bytes::new())).unwrap();
/// let response = service.oneshot(request).await.unwrap();
///
/// assert_eq!(response.status(), 200);
/// assert_eq!(sink.last().unwrap().uri, "/ping");
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpLogLayer {
    adapter: NonBlockingAdapter,
}

impl HttpLogLayer {
    /// Create a layer reporting to `recorder`
    pub fn new(recorder: ExchangeRecorder) -> Self {
        Self {
            adapter: NonBlockingAdapter::new(recorder),
        }
    }
}

impl<S> Layer<S> for HttpLogLayer {
    type Service = HttpLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HttpLogService {
            inner,
            adapter: self.adapter.clone(),
        }
    }
}

/// Service produced by [`HttpLogLayer`]
#[derive(Debug, Clone)]
pub struct HttpLogService<S> {
    inner: S,
    adapter: NonBlockingAdapter,
}

impl<S, ReqB, ResB> Service<Request<ReqB>> for HttpLogService<S>
where
    S: Service<Request<CaptureBody<ReqB>>, Response = Response<ResB>>,
    S::Error: fmt::Display,
    ReqB: Body,
    ResB: Body,
{
    type Response = Response<CaptureBody<ResB>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqB>) -> Self::Future {
        let handle = self.adapter.begin(&request);
        let request = match &handle {
            Some(handle) => request.map(|body| handle.wrap_request(body)),
            None => request.map(CaptureBody::untracked),
        };

        ResponseFuture {
            inner: self.inner.call(request),
            guard: HandlerGuard(handle),
        }
    }
}

/// Cancels the exchange if the handler future is dropped before it resolves
#[derive(Debug)]
struct HandlerGuard(Option<ExchangeHandle>);

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            tracing::debug!(exchange_id = %handle.id(), "handler future dropped before responding");
            handle.cancel();
        }
    }
}

pin_project! {
    /// Response future of [`HttpLogService`]
    #[derive(Debug)]
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        guard: HandlerGuard,
    }
}

impl<F, B, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
    B: Body,
    E: fmt::Display,
{
    type Output = Result<Response<CaptureBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = ready!(this.inner.poll(cx));

        Poll::Ready(match (result, this.guard.0.take()) {
            (Ok(response), Some(handle)) => Ok(handle.wrap_response(response)),
            (Ok(response), None) => Ok(response.map(CaptureBody::untracked)),
            (Err(e), Some(handle)) => {
                handle.handler_failed(&e);
                Err(e)
            }
            (Err(e), None) => Err(e),
        })
    }
}
