//! Post-processing of next-hop responses.

use axum::body::Body;
use axum::http::{Response, StatusCode};

use crate::http::response::Envelope;

/// Upper bound on how much of a failed response body is quoted back.
const MAX_CAPTURED_BODY: usize = 1024 * 1024;

/// What to send back for a next-hop response.
#[derive(Debug)]
pub enum Interception {
    /// Relay the response as is.
    Forward(Response<Body>),
    /// Replace it with this envelope.
    Substitute(Envelope),
}

/// Relay 200 responses; turn anything else into a 200 envelope quoting the
/// failure so the caller sees a healthy answer.
pub async fn absorb_failures(service: &str, url: &str, response: Response<Body>) -> Interception {
    if response.status() == StatusCode::OK {
        return Interception::Forward(response);
    }
    let status = response.status();
    let body = match axum::body::to_bytes(response.into_body(), MAX_CAPTURED_BODY).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::warn!(url, error = %e, "Failed to read failed response body");
            String::new()
        }
    };
    tracing::info!(url, status = status.as_u16(), "Absorbed downstream failure");
    Interception::Substitute(Envelope::ok().with_message(format!(
        "{service} called {url} and got error return ({}): {body}",
        status.as_u16()
    )))
}
