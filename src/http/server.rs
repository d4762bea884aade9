//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (request id, request logging, server spans, metrics)
//! - Build the shared state: fault policy, responder, tracer, proxy engine
//! - Serve until the shutdown coordinator fires
//!
//! # Layer order (outermost first)
//! ```text
//! SetRequestId → PropagateRequestId → TraceLayer → ServerSpan
//!     → track_requests → routes
//! ```
//!
//! There is no request deadline: injected latency is unbounded and a slow
//! hop must still answer with an envelope.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{MatchedPath, Request};
use axum::http::header::InvalidHeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::behavior::BehaviorStore;
use crate::config::Settings;
use crate::http::handlers;
use crate::http::response::Responder;
use crate::instrument::scope::REQUEST_ID_HEADER;
use crate::instrument::{Instrumenter, Tracer};
use crate::lifecycle::crash::CrashScheduler;
use crate::lifecycle::shutdown;
use crate::observability::metrics;
use crate::proxy::ProxyEngine;

/// Application state injected into handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub behavior: Arc<BehaviorStore>,
    pub responder: Responder,
    pub tracer: Tracer,
    pub proxy: ProxyEngine,
    pub crash: CrashScheduler,
}

/// HTTP server for a topology node.
pub struct HttpServer {
    router: Router,
    bind_address: String,
}

impl HttpServer {
    /// Build the server. Terminates the process on `/crash`.
    pub fn new(settings: &Settings, instrumenter: &Instrumenter) -> Result<Self, InvalidHeaderValue> {
        Self::with_crash_scheduler(settings, instrumenter, CrashScheduler::new(settings.crash_delay))
    }

    /// Build the server with a custom crash scheduler.
    pub fn with_crash_scheduler(
        settings: &Settings,
        instrumenter: &Instrumenter,
        crash: CrashScheduler,
    ) -> Result<Self, InvalidHeaderValue> {
        let behavior = Arc::new(BehaviorStore::new(settings.behavior));

        let client: Client<HttpConnector, Body> = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let proxy = ProxyEngine::new(&settings.service_name, behavior.clone(), instrumenter.transport(client))?;

        let state = AppState {
            behavior,
            responder: Responder::new(&settings.service_name),
            tracer: instrumenter.tracer(),
            proxy,
            crash,
        };

        Ok(Self {
            router: Self::build_router(instrumenter, state),
            bind_address: settings.bind_address.clone(),
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(instrumenter: &Instrumenter, state: AppState) -> Router {
        Router::new()
            .route("/headers/{percentage}", get(handlers::set_duplicate_headers))
            .route("/errors/{percentage}", get(handlers::set_errors))
            .route("/graceful/{flag}", get(handlers::set_handle_failures))
            .route("/latency/{duration}", get(handlers::set_latency))
            .route("/crash/{message}", get(handlers::crash))
            .route("/local/{mode}/latency/{duration}", get(handlers::emulate_concurrency))
            .route("/proxy/{*rest}", get(handlers::proxy))
            .fallback(handlers::echo)
            .with_state(state)
            .layer(middleware::from_fn(track_requests))
            .layer(instrumenter.middleware())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
                let request_id = request
                    .headers()
                    .get(&REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }))
            .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
            .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
    }

    /// The fully layered router, for in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Count and time each request by its route template.
async fn track_requests(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let handler = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "echo".to_string());
    let response = next.run(request).await;
    metrics::record_request(&handler, response.status().as_u16(), start);
    response
}
