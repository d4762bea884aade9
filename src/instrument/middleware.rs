//! Server span middleware.
//!
//! Wraps the router so every inbound request runs inside a server span.
//! The span is stored (as a [`Scope`]) in the request extensions before the
//! handler runs and finished when the handler's response is ready or the
//! request future is dropped.

use std::task::{Context, Poll};

use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use tower::{Layer, Service};

use crate::instrument::span::{record_status, FinishOnDrop};
use crate::instrument::{Backend, Scope};

#[derive(Debug, Clone)]
pub struct ServerSpanLayer {
    backend: Backend,
}

impl ServerSpanLayer {
    pub(crate) fn new(backend: Backend) -> Self {
        Self { backend }
    }
}

impl<S> Layer<S> for ServerSpanLayer {
    type Service = ServerSpan<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ServerSpan {
            inner,
            backend: self.backend.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerSpan<S> {
    inner: S,
    backend: Backend,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for ServerSpan<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let (mut parts, body) = request.into_parts();
        let scope = self
            .backend
            .factory()
            .server_scope(&parts.method, &parts.uri, &parts.headers);
        let span = scope.span().clone();
        parts.extensions.insert(scope);
        let request = Request::from_parts(parts, body);

        // the clone may not be ready; keep the one poll_ready was called on
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let future = inner.call(request);

        Box::pin(async move {
            let guard = FinishOnDrop(span);
            let result = future.await;
            if let Ok(response) = &result {
                record_status(&guard.0, response.status());
            }
            result
        })
    }
}
