//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Initialize subsystems in dependency order (metrics, tracing backend)
//! - Bind the listener and begin accepting traffic
//! - Flush the tracing backend once serving stops
//!
//! # Design Decisions
//! - Fail fast: any error before serving is fatal
//! - The listener binds last, so traffic only arrives once ready

use metrics_exporter_prometheus::BuildError;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{validate_config, ServiceConfig, ValidationError};
use crate::http::HttpServer;
use crate::instrument::{InstrumentError, Instrumenter};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::wait_for_signal;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("tracing backend unavailable: {0}")]
    BackendUnavailable(#[from] InstrumentError),

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] BuildError),

    #[error("service name cannot be sent as a header: {0}")]
    ServiceName(#[from] axum::http::header::InvalidHeaderValue),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Run a node until SIGINT/SIGTERM.
pub async fn run(config: ServiceConfig) -> Result<(), StartupError> {
    let settings = validate_config(&config).map_err(StartupError::Validation)?;
    tracing::info!(
        service = %settings.service_name,
        instance = %settings.instance_name,
        bind_address = %settings.bind_address,
        instrumenter = %settings.instrumenter,
        "Configuration loaded"
    );

    if let Some(addr) = settings.metrics_address {
        metrics::init_metrics(addr)?;
    }

    let instrumenter = Instrumenter::start(settings.instrumenter.name(), settings.candidates())?;
    let server = HttpServer::new(&settings, &instrumenter)?;

    let listener = match TcpListener::bind(server.bind_address()).await {
        Ok(listener) => listener,
        Err(source) => {
            instrumenter.shutdown().await;
            return Err(StartupError::Bind {
                address: settings.bind_address.clone(),
                source,
            });
        }
    };

    let shutdown = Shutdown::new();
    let serving = server.run(listener, shutdown.subscribe());
    let signalled = {
        let shutdown = shutdown.clone();
        async move {
            wait_for_signal().await;
            shutdown.trigger();
        }
    };
    tokio::pin!(serving);

    let result = tokio::select! {
        result = &mut serving => result,
        _ = signalled => serving.await,
    };

    instrumenter.shutdown().await;
    result.map_err(StartupError::Serve)?;
    tracing::info!("Shutdown complete");
    Ok(())
}
