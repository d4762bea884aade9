//! The JSON envelope returned by every handler that produces its own body.
//!
//! ```text
//! {
//!   "service": "svc-a",
//!   "statusCode": 200,
//!   "traceID": "4bf92f3577b34da6a3ce929d0e0e4736",
//!   "message": "...",          (optional)
//!   "error": "...",            (optional)
//!   "headers": {"Accept": ["*/*"]}   (echo only)
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::ErrorCode;
use crate::http::headers;
use crate::instrument::Scope;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub service: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    #[serde(rename = "traceID")]
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, Vec<String>>>,
}

impl Envelope {
    pub fn ok() -> Self {
        Self {
            service: String::new(),
            status_code: StatusCode::OK.as_u16(),
            trace_id: String::new(),
            message: None,
            error: None,
            headers: None,
        }
    }

    pub fn failure(code: ErrorCode) -> Self {
        Self {
            status_code: code.status().as_u16(),
            error: Some(code),
            ..Self::ok()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_headers(mut self, received: &HeaderMap) -> Self {
        self.headers = Some(headers::to_map(received));
        self
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let status = self.status();
        match serde_json::to_string_pretty(&self) {
            Ok(mut body) => {
                body.push('\n');
                (
                    status,
                    [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
                    body,
                )
                    .into_response()
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode response envelope");
                status.into_response()
            }
        }
    }
}

/// Stamps envelopes with this instance's name and the request's trace id.
#[derive(Debug, Clone)]
pub struct Responder {
    service_name: Arc<str>,
}

impl Responder {
    pub fn new(service_name: &str) -> Self {
        Self {
            service_name: Arc::from(service_name),
        }
    }

    pub fn stamp(&self, scope: &Scope, mut envelope: Envelope) -> Envelope {
        envelope.service = self.service_name.to_string();
        envelope.trace_id = scope.span().trace_id();
        envelope
    }

    pub fn render(&self, scope: &Scope, envelope: Envelope) -> Response {
        self.stamp(scope, envelope).into_response()
    }

    /// Render the outcome of a policy setter.
    pub fn confirm(&self, scope: &Scope, outcome: Result<String, ErrorCode>) -> Response {
        let envelope = match outcome {
            Ok(message) => Envelope::ok().with_message(message),
            Err(code) => Envelope::failure(code),
        };
        self.render(scope, envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_fields_are_omitted() {
        let envelope = Responder::new("svc-a").stamp(&Scope::default(), Envelope::ok());
        let json: serde_json::Value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"service": "svc-a", "statusCode": 200, "traceID": ""})
        );
    }

    #[test]
    fn test_failure_carries_code_and_status() {
        let envelope = Envelope::failure(ErrorCode::InvalidPercentage);
        assert_eq!(envelope.status(), StatusCode::BAD_REQUEST);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["error"], "expected percentage value between 0 and 100");
        assert_eq!(json["statusCode"], 400);
        assert!(json.get("message").is_none());
    }

    #[tokio::test]
    async fn test_rendered_body_is_pretty_json() {
        let response = Envelope::ok().with_message("hi").into_response();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.starts_with("{\n  \"service\""));
        assert!(text.ends_with("}\n"));
    }
}
