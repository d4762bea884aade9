//! Instrumented outbound transport.
//!
//! Wraps any request/response service (normally the hyper client) so that
//! each outbound call gets a client span parented on the [`Scope`] found in
//! the request extensions, with trace context injected into its headers.

use std::fmt;
use std::task::{Context, Poll};

use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use tower::Service;

use crate::instrument::span::{record_status, FinishOnDrop, ERROR_TAG};
use crate::instrument::{Backend, Scope};

#[derive(Debug, Clone)]
pub struct TracedTransport<S> {
    inner: S,
    backend: Backend,
}

impl<S> TracedTransport<S> {
    pub(crate) fn new(inner: S, backend: Backend) -> Self {
        Self { inner, backend }
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for TracedTransport<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: fmt::Display,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        let parent = Scope::from_extensions(request.extensions());
        let method = request.method().clone();
        let uri = request.uri().clone();
        let span = self
            .backend
            .factory()
            .client_span(&parent, &method, &uri, request.headers_mut());

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let future = inner.call(request);

        Box::pin(async move {
            let guard = FinishOnDrop(span);
            match future.await {
                Ok(response) => {
                    record_status(&guard.0, response.status());
                    Ok(response)
                }
                Err(e) => {
                    guard.0.tag(ERROR_TAG, &e.to_string());
                    Err(e)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::reporter::{BatchOptions, Reporter};
    use crate::instrument::zipkin::{model::Kind, ZipkinSettings};
    use axum::body::Body;
    use axum::http::StatusCode;
    use std::convert::Infallible;
    use tower::{service_fn, ServiceExt};
    use url::Url;

    fn backend() -> (Backend, tokio::sync::mpsc::UnboundedReceiver<crate::instrument::zipkin::model::Span>) {
        let settings = ZipkinSettings {
            service_name: "svc".to_string(),
            local_hostport: None,
            single_host_spans: true,
            sample_rate: 1.0,
            reporter_endpoint: Url::parse("http://127.0.0.1:9/").unwrap(),
            batch: BatchOptions::default(),
        };
        let (reporter, rx) = Reporter::capture();
        (Backend::zipkin(&settings, reporter).unwrap(), rx)
    }

    #[tokio::test]
    async fn test_injects_headers_and_records_client_span() {
        let (backend, mut rx) = backend();
        let upstream = service_fn(|request: Request<Body>| async move {
            let traced = request.headers().contains_key("x-b3-traceid");
            let status = if traced { StatusCode::OK } else { StatusCode::BAD_REQUEST };
            Ok::<_, Infallible>(Response::builder().status(status).body(Body::empty()).unwrap())
        });
        let transport = TracedTransport::new(upstream, backend);

        let request = Request::get("http://svc-b:8000/").body(Body::empty()).unwrap();
        let response = transport.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let exported = rx.recv().await.unwrap();
        assert_eq!(exported.kind, Some(Kind::Client));
        assert!(!exported.tags.contains_key("error"));
    }

    #[tokio::test]
    async fn test_transport_error_is_tagged() {
        let (backend, mut rx) = backend();
        let upstream = service_fn(|_request: Request<Body>| async move {
            Err::<Response<Body>, _>("connection refused")
        });
        let transport = TracedTransport::new(upstream, backend);

        let request = Request::get("http://svc-b:8000/").body(Body::empty()).unwrap();
        assert!(transport.oneshot(request).await.is_err());

        let exported = rx.recv().await.unwrap();
        assert_eq!(exported.tags.get("error").map(String::as_str), Some("connection refused"));
    }
}
