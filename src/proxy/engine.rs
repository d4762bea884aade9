//! Hop forwarding.
//!
//! # Responsibilities
//! - Resolve the next hop from the request path
//! - Apply this instance's latency and error policy
//! - Rewrite and forward the request through the traced transport
//! - Hand the next hop's response to the absorption hook

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::header::{self, HeaderValue, InvalidHeaderValue};
use axum::http::{HeaderName, Request, Version};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use tower::ServiceExt;

use crate::behavior::BehaviorStore;
use crate::error::ErrorCode;
use crate::http::headers::{remove_hop_by_hop, PROXIED_BY};
use crate::instrument::{Scope, TracedTransport};
use crate::observability::metrics;
use crate::proxy::directive::ProxyDirective;
use crate::proxy::intercept::{absorb_failures, Interception};

/// The outbound HTTP client wrapped in client-span instrumentation.
pub type Upstream = TracedTransport<Client<HttpConnector, Body>>;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

#[derive(Debug, Clone)]
pub struct ProxyEngine {
    service_name: Arc<str>,
    proxied_by: HeaderValue,
    behavior: Arc<BehaviorStore>,
    upstream: Upstream,
}

impl ProxyEngine {
    pub fn new(
        service_name: &str,
        behavior: Arc<BehaviorStore>,
        upstream: Upstream,
    ) -> Result<Self, InvalidHeaderValue> {
        Ok(Self {
            service_name: Arc::from(service_name),
            proxied_by: HeaderValue::from_str(service_name)?,
            behavior,
            upstream,
        })
    }

    /// Forward `request` one hop. An `Err` is a failure this instance
    /// reports itself; everything from the next hop comes back as an
    /// [`Interception`].
    pub async fn handle(&self, request: Request<Body>) -> Result<Interception, ErrorCode> {
        let raw_path = request
            .uri()
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/");
        let directive = ProxyDirective::parse(raw_path)?;

        let policy = self.behavior.snapshot();
        if !policy.latency.is_zero() {
            tokio::time::sleep(policy.latency).await;
        }
        if policy.error_percent.roll() {
            tracing::info!(target_host = %directive.target(), "Injecting proxy failure");
            metrics::record_fault("error");
            return Err(ErrorCode::InternalFailure);
        }

        let url = directive.to_string();
        let outbound = self.rewrite(request, &directive)?;
        tracing::debug!(url = %url, "Forwarding to next hop");

        let response = match self.upstream.clone().oneshot(outbound).await {
            Ok(response) => response.map(Body::new),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Next hop unreachable");
                return Err(ErrorCode::UpstreamFailure);
            }
        };
        metrics::record_hop();

        let (mut parts, body) = response.into_parts();
        remove_hop_by_hop(&mut parts.headers);
        let response = axum::http::Response::from_parts(parts, body);

        if policy.absorb_failures {
            let outcome = absorb_failures(&self.service_name, &url, response).await;
            if matches!(outcome, Interception::Substitute(_)) {
                metrics::record_fault("absorbed");
            }
            Ok(outcome)
        } else {
            Ok(Interception::Forward(response))
        }
    }

    fn rewrite(&self, request: Request<Body>, directive: &ProxyDirective) -> Result<Request<Body>, ErrorCode> {
        let (parts, body) = request.into_parts();

        let mut headers = parts.headers.clone();
        remove_hop_by_hop(&mut headers);
        headers.append(PROXIED_BY, self.proxied_by.clone());
        let host = HeaderValue::from_str(directive.target().as_str())
            .map_err(|_| ErrorCode::InvalidProxyTarget)?;
        headers.insert(header::HOST, host);
        if let Some(ConnectInfo(peer)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            append_forwarded_for(&mut headers, peer);
        }

        let mut outbound = Request::builder()
            .method(parts.method)
            .uri(directive.uri()?)
            .version(Version::HTTP_11)
            .body(body)
            .map_err(|_| ErrorCode::InvalidProxyTarget)?;
        *outbound.headers_mut() = headers;
        outbound
            .extensions_mut()
            .insert(Scope::from_extensions(&parts.extensions));
        Ok(outbound)
    }
}

fn append_forwarded_for(headers: &mut axum::http::HeaderMap, peer: &SocketAddr) {
    let client = peer.ip().to_string();
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{prior}, {client}"),
        None => client,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    #[test]
    fn test_forwarded_for_is_appended() {
        let peer: SocketAddr = "10.0.0.7:5555".parse().unwrap();
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, &peer);
        assert_eq!(headers[&X_FORWARDED_FOR], "10.0.0.7");

        append_forwarded_for(&mut headers, &"10.0.0.8:1".parse().unwrap());
        assert_eq!(headers[&X_FORWARDED_FOR], "10.0.0.7, 10.0.0.8");
    }
}
