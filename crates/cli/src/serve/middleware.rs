//! HTTP middleware: identity propagation and request logging.

use std::time::Instant;

use approvals_core::{Identity, RequestContext, ROLES_HEADER, USER_HEADER};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

/// Parse the identity headers into a [`RequestContext`] request extension.
///
/// The context belongs to this request only and is dropped with it,
/// whatever the outcome.
pub(crate) async fn identity_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let (user, roles) = {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        (header(USER_HEADER), header(ROLES_HEADER))
    };
    let identity = Identity::from_headers(user.as_deref(), roles.as_deref());
    request
        .extensions_mut()
        .insert(RequestContext::new(identity));
    next.run(request).await
}

/// Log method, path, status and latency of every request at `debug`.
pub(crate) async fn trace_middleware(request: Request<axum::body::Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    tracing::debug!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}
