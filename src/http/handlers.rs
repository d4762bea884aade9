//! Request handlers.
//!
//! Every handler answers with an [`Envelope`] stamped by the shared
//! [`Responder`], except a proxied hop whose next-hop response is relayed
//! as is.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{self, HeaderValue};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::concurrency::{self, ConcurrencyMode};
use crate::error::ErrorCode;
use crate::http::response::Envelope;
use crate::http::server::AppState;
use crate::instrument::Scope;
use crate::observability::metrics;
use crate::proxy::Interception;

pub async fn set_duplicate_headers(
    State(state): State<AppState>,
    scope: Scope,
    Path(percentage): Path<String>,
) -> Response {
    let outcome = state.behavior.set_duplicate_header_percent(&percentage);
    log_policy_change("headers", &percentage, &outcome);
    state.responder.confirm(&scope, outcome)
}

pub async fn set_errors(State(state): State<AppState>, scope: Scope, Path(percentage): Path<String>) -> Response {
    let outcome = state.behavior.set_error_percent(&percentage);
    log_policy_change("errors", &percentage, &outcome);
    state.responder.confirm(&scope, outcome)
}

pub async fn set_handle_failures(State(state): State<AppState>, scope: Scope, Path(flag): Path<String>) -> Response {
    let outcome = state.behavior.set_absorb_failures(&flag);
    log_policy_change("graceful", &flag, &outcome);
    state.responder.confirm(&scope, outcome)
}

pub async fn set_latency(State(state): State<AppState>, scope: Scope, Path(duration): Path<String>) -> Response {
    let outcome = state.behavior.set_latency(&duration);
    log_policy_change("latency", &duration, &outcome);
    state.responder.confirm(&scope, outcome)
}

fn log_policy_change(knob: &'static str, raw: &str, outcome: &Result<String, ErrorCode>) {
    match outcome {
        Ok(message) => tracing::info!(knob, value = %raw, "{}", message),
        Err(code) => tracing::debug!(knob, value = %raw, error = %code, "Rejected policy change"),
    }
}

pub async fn crash(State(state): State<AppState>, scope: Scope, Path(message): Path<String>) -> Response {
    state.crash.schedule(message);
    let message = format!("crashing in {} seconds", state.crash.delay().as_secs());
    state.responder.render(&scope, Envelope::ok().with_message(message))
}

/// `/local/{mode}/latency/{duration}`
pub async fn emulate_concurrency(
    State(state): State<AppState>,
    scope: Scope,
    Path((mode, duration)): Path<(String, String)>,
) -> Response {
    let parsed = crate::behavior::parse_duration(&duration)
        .and_then(|duration| Ok((mode.parse::<ConcurrencyMode>()?, duration)));
    let (mode, duration) = match parsed {
        Ok(parsed) => parsed,
        Err(code) => return state.responder.render(&scope, Envelope::failure(code)),
    };

    tracing::debug!(mode = ?mode, duration = ?duration, "Emulating local work");
    concurrency::emulate(&state.tracer, &scope, mode, duration).await;
    state
        .responder
        .render(&scope, Envelope::ok().with_message("ran several local spans"))
}

/// `/proxy/{host[:port]}/{rest...}`
pub async fn proxy(State(state): State<AppState>, scope: Scope, request: Request<Body>) -> Response {
    match state.proxy.handle(request).await {
        Ok(Interception::Forward(response)) => response,
        Ok(Interception::Substitute(envelope)) => state.responder.render(&scope, envelope),
        Err(code) => state.responder.render(&scope, Envelope::failure(code)),
    }
}

/// Terminal hop: echo the received headers back.
pub async fn echo(State(state): State<AppState>, scope: Scope, method: Method, headers: HeaderMap) -> Response {
    if method != Method::GET {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let policy = state.behavior.snapshot();
    if !policy.latency.is_zero() {
        tokio::time::sleep(policy.latency).await;
    }
    if policy.error_percent.roll() {
        tracing::info!("Injecting echo failure");
        metrics::record_fault("error");
        return state
            .responder
            .render(&scope, Envelope::failure(ErrorCode::InternalFailure));
    }

    let duplicate = policy.duplicate_header_percent.roll();
    let mut response = state
        .responder
        .render(&scope, Envelope::ok().with_headers(&headers));
    if duplicate {
        metrics::record_fault("duplicate_headers");
        let response_headers = response.headers_mut();
        response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        response_headers.append(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    response
}
