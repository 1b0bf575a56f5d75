/// Request correlation IDs
///
/// Every request gets an ID: the caller's `X-Request-ID` when it sent a
/// usable one, otherwise a fresh UUID v4. The ID is
///
/// - stored in the request extensions as [`RequestId`] (the trace span reads
///   it from there),
/// - available anywhere inside the handler through [`current_request_id`],
/// - echoed back in the response's `X-Request-ID` header.
///
/// # Example
///
/// ```no_run
/// use axum::{routing::get, Router};
/// use modelgate_api::middleware::request_id::{current_request_id, RequestIdLayer};
///
/// async fn handler() -> String {
///     current_request_id().unwrap_or_default()
/// }
///
/// let app: Router = Router::new()
///     .route("/", get(handler))
///     .layer(RequestIdLayer::new());
/// ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    response::Response,
};
use tower::{Layer, Service};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Longest caller-supplied ID that is reused as is
const MAX_REQUEST_ID_LEN: usize = 128;

tokio::task_local! {
    static REQUEST_ID: String;
}

/// ID of the request being handled by the current task, if any.
pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(|id| id.clone()).ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn incoming_request_id(request: &Request) -> Option<String> {
    let value = request.headers().get(&REQUEST_ID_HEADER)?.to_str().ok()?.trim();

    let usable = !value.is_empty()
        && value.len() <= MAX_REQUEST_ID_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    usable.then(|| value.to_string())
}

#[derive(Debug, Clone, Default)]
pub struct RequestIdLayer;

impl RequestIdLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdMiddleware { inner }
    }
}

#[derive(Debug, Clone)]
pub struct RequestIdMiddleware<S> {
    inner: S,
}

impl<S> Service<Request> for RequestIdMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        let id = incoming_request_id(&request).unwrap_or_else(|| Uuid::new_v4().to_string());
        request.extensions_mut().insert(RequestId(id.clone()));

        let future = self.inner.call(request);

        Box::pin(REQUEST_ID.scope(id.clone(), async move {
            let mut response = future.await?;

            // Only IDs that pass `incoming_request_id` or are UUIDs get here
            if let Ok(value) = HeaderValue::from_str(&id) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }

            Ok(response)
        }))
    }
}
