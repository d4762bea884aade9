//! Pluggable distributed tracing.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → middleware.rs (extract context, open server span, store Scope)
//!     → handler (Scope extractor, Tracer::start_span for local work)
//!     → transport.rs (client span, inject context into outbound headers)
//!     → span.rs finish → backend → reporter.rs (batched HTTP export)
//! ```
//!
//! # Design Decisions
//! - One backend is active per process, chosen at startup by name
//! - Callers only see [`Instrumenter`], [`Tracer`], [`Span`] and [`Scope`]
//! - Backends differ only behind the [`SpanFactory`] seam

pub mod middleware;
pub mod reporter;
pub mod sampler;
pub mod scope;
pub mod skywalking;
pub mod span;
pub mod transport;
pub mod zipkin;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use axum::http::{Extensions, HeaderMap, Method, Uri};
use thiserror::Error;

pub use middleware::{ServerSpan, ServerSpanLayer};
pub use reporter::{BatchOptions, Reporter};
pub use scope::{Baggage, Scope};
pub use span::Span;
pub use transport::TracedTransport;

use sampler::SamplerError;
use skywalking::{Skywalking, SkywalkingSettings};
use zipkin::{Zipkin, ZipkinSettings};

/// Backend names accepted by `observability-instrumenter`.
pub const SUPPORTED_BACKENDS: [&str; 2] = ["zipkin", "skywalking"];

/// Why a tracing backend could not be selected or started.
#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("unsupported instrumenter {0:?}, expected one of: zipkin, skywalking")]
    Unsupported(String),

    #[error("instrumenter {0} was not provided")]
    NotProvided(&'static str),

    #[error("invalid sampler configuration: {0}")]
    Sampler(#[from] SamplerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Zipkin,
    Skywalking,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Zipkin => "zipkin",
            BackendKind::Skywalking => "skywalking",
        }
    }
}

impl FromStr for BackendKind {
    type Err = InstrumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zipkin" => Ok(BackendKind::Zipkin),
            "skywalking" => Ok(BackendKind::Skywalking),
            _ => Err(InstrumentError::Unsupported(s.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What every backend must be able to do.
pub(crate) trait SpanFactory: Send + Sync {
    /// Span for in-process work, child of `parent` when it belongs to this backend.
    fn local_span(&self, parent: &Span, name: &str) -> Span;

    /// Server span for an inbound request, continuing any propagated trace.
    fn server_scope(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> Scope;

    /// Client span for an outbound request; writes propagation headers.
    fn client_span(&self, parent: &Scope, method: &Method, uri: &Uri, headers: &mut HeaderMap) -> Span;
}

/// A started backend.
#[derive(Debug, Clone)]
pub enum Backend {
    Zipkin(Arc<Zipkin>),
    Skywalking(Arc<Skywalking>),
}

impl Backend {
    pub fn zipkin(settings: &ZipkinSettings, reporter: Reporter<zipkin::model::Span>) -> Result<Self, InstrumentError> {
        Ok(Backend::Zipkin(Arc::new(Zipkin::new(settings, reporter)?)))
    }

    pub fn skywalking(
        settings: &SkywalkingSettings,
        reporter: Reporter<skywalking::model::SegmentObject>,
    ) -> Result<Self, InstrumentError> {
        Ok(Backend::Skywalking(Arc::new(Skywalking::new(settings, reporter)?)))
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Zipkin(_) => BackendKind::Zipkin,
            Backend::Skywalking(_) => BackendKind::Skywalking,
        }
    }

    pub(crate) fn factory(&self) -> &dyn SpanFactory {
        match self {
            Backend::Zipkin(tracer) => tracer,
            Backend::Skywalking(tracer) => tracer,
        }
    }

    async fn close(&self) {
        match self {
            Backend::Zipkin(tracer) => tracer.close().await,
            Backend::Skywalking(tracer) => tracer.close().await,
        }
    }
}

/// A backend that can be started on demand.
#[derive(Debug, Clone)]
pub enum Candidate {
    Zipkin(ZipkinSettings),
    Skywalking(SkywalkingSettings),
}

impl Candidate {
    pub fn kind(&self) -> BackendKind {
        match self {
            Candidate::Zipkin(_) => BackendKind::Zipkin,
            Candidate::Skywalking(_) => BackendKind::Skywalking,
        }
    }

    /// Start the backend with an HTTP reporter. Requires a Tokio runtime.
    fn start(self) -> Result<Backend, InstrumentError> {
        match self {
            Candidate::Zipkin(settings) => {
                let reporter = Reporter::http(settings.reporter_endpoint.clone(), settings.batch.clone());
                Backend::zipkin(&settings, reporter)
            }
            Candidate::Skywalking(settings) => {
                let reporter = Reporter::http(settings.reporter_endpoint.clone(), settings.batch.clone());
                Backend::skywalking(&settings, reporter)
            }
        }
    }
}

/// Facade over the one active backend.
#[derive(Debug, Clone)]
pub struct Instrumenter {
    delegate: Backend,
}

impl Instrumenter {
    /// Pick `name` out of `candidates` and start only that backend.
    pub fn start(name: &str, candidates: Vec<Candidate>) -> Result<Self, InstrumentError> {
        let kind: BackendKind = name.parse()?;
        let candidate = candidates
            .into_iter()
            .find(|candidate| candidate.kind() == kind)
            .ok_or(InstrumentError::NotProvided(kind.name()))?;
        let delegate = candidate.start()?;
        tracing::info!(instrumenter = %kind, "Tracing backend started");
        Ok(Self { delegate })
    }

    pub fn from_backend(delegate: Backend) -> Self {
        Self { delegate }
    }

    pub fn kind(&self) -> BackendKind {
        self.delegate.kind()
    }

    pub fn tracer(&self) -> Tracer {
        Tracer {
            backend: self.delegate.clone(),
        }
    }

    /// Span attached to an in-flight request, or a no-op span.
    pub fn span_from_context(&self, extensions: &Extensions) -> Span {
        Scope::from_extensions(extensions).span().clone()
    }

    pub fn middleware(&self) -> ServerSpanLayer {
        ServerSpanLayer::new(self.delegate.clone())
    }

    pub fn transport<S>(&self, inner: S) -> TracedTransport<S> {
        TracedTransport::new(inner, self.delegate.clone())
    }

    /// Flush and stop the backend's reporter.
    pub async fn shutdown(&self) {
        self.delegate.close().await;
        tracing::info!(instrumenter = %self.kind(), "Tracing backend stopped");
    }
}

/// Opens in-process spans.
#[derive(Debug, Clone)]
pub struct Tracer {
    backend: Backend,
}

impl Tracer {
    /// Start a span named `name` under `parent`. The returned scope keeps the
    /// parent's baggage.
    pub fn start_span(&self, parent: &Scope, name: &str) -> Scope {
        parent.child(self.backend.factory().local_span(parent.span(), name))
    }
}
