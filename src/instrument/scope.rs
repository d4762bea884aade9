//! Per-request trace context.
//!
//! The server middleware stores a [`Scope`] in the request extensions.
//! Handlers pull it back out with the extractor; outbound requests carry a
//! copy so the transport knows which span to parent its client span on.

use std::collections::BTreeMap;
use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap, HeaderName};

use crate::instrument::span::Span;

/// Header carrying the caller-supplied request id.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
/// Baggage key the request id travels under.
pub const REQUEST_ID_KEY: &str = "X-Request-Id";

/// Key/value pairs propagated alongside the trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Baggage(BTreeMap<String, String>);

impl Baggage {
    /// Baggage implied by plain request headers: the request id, if any.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut baggage = Baggage::default();
        if let Some(request_id) = headers.get(REQUEST_ID_HEADER).and_then(|v| v.to_str().ok()) {
            baggage.set(REQUEST_ID_KEY, request_id);
        }
        baggage
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn request_id(&self) -> Option<&str> {
        self.get(REQUEST_ID_KEY)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl FromIterator<(String, String)> for Baggage {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Baggage(iter.into_iter().collect())
    }
}

/// The active span plus the baggage that travels with it.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    span: Span,
    baggage: Baggage,
}

impl Scope {
    pub fn new(span: Span, baggage: Baggage) -> Self {
        Self { span, baggage }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn baggage(&self) -> &Baggage {
        &self.baggage
    }

    /// Same baggage, different active span.
    pub fn child(&self, span: Span) -> Scope {
        Scope {
            span,
            baggage: self.baggage.clone(),
        }
    }

    /// Scope attached to a request, or an empty scope with a no-op span.
    pub fn from_extensions(extensions: &Extensions) -> Scope {
        extensions.get::<Scope>().cloned().unwrap_or_default()
    }
}

impl<S> FromRequestParts<S> for Scope
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Scope::from_extensions(&parts.extensions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_scope_is_noop() {
        let extensions = Extensions::new();
        let scope = Scope::from_extensions(&extensions);
        assert!(scope.span().is_noop());
        assert!(scope.baggage().is_empty());
    }

    #[test]
    fn test_child_keeps_baggage() {
        let mut baggage = Baggage::default();
        baggage.set(REQUEST_ID_KEY, "abc");
        let scope = Scope::new(Span::Noop, baggage);
        let child = scope.child(Span::Noop);
        assert_eq!(child.baggage().request_id(), Some("abc"));
    }
}
