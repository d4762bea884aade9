//! Zipkin backend.
//!
//! Spans are exported as Zipkin v2 JSON to `/api/v2/spans`. Context travels
//! between hops in B3 headers. With `single_host_spans` disabled a server
//! span reuses the caller's span id (`shared`), so one RPC is one span id
//! split across two hosts. Enabled, every span lives on a single host and
//! the server span is a child of the caller's client span.

pub mod model;
pub mod propagation;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use axum::http::{HeaderMap, HeaderValue, Method, Uri};
use url::Url;

use crate::instrument::reporter::{BatchOptions, Reporter};
use crate::instrument::sampler::{BoundarySampler, SamplerError};
use crate::instrument::scope::{Baggage, Scope, REQUEST_ID_HEADER};
use crate::instrument::span::{BackendSpan, FinishedSpan, Recording, Span, Tags};
use crate::instrument::SpanFactory;

use model::{Endpoint, Kind};
use propagation::{span_id_hex, B3Context, TraceId};

const VERSION_TAG: &str = "version";

/// Everything needed to start the Zipkin backend.
#[derive(Debug, Clone)]
pub struct ZipkinSettings {
    /// Name recorded as the local endpoint's service name.
    pub service_name: String,
    /// Address recorded on the local endpoint, if known.
    pub local_hostport: Option<SocketAddr>,
    /// Keep every span on one host instead of sharing the caller's span id.
    pub single_host_spans: bool,
    /// Fraction of new traces to record, in `[0, 1]`.
    pub sample_rate: f64,
    pub reporter_endpoint: Url,
    pub batch: BatchOptions,
}

/// Running Zipkin tracer.
#[derive(Debug)]
pub struct Zipkin {
    local_endpoint: Endpoint,
    sampler: BoundarySampler,
    shared_spans: bool,
    reporter: Reporter<model::Span>,
}

impl Zipkin {
    pub fn new(settings: &ZipkinSettings, reporter: Reporter<model::Span>) -> Result<Self, SamplerError> {
        Ok(Self {
            local_endpoint: Endpoint::new(Some(settings.service_name.clone()), settings.local_hostport),
            sampler: BoundarySampler::new(settings.sample_rate, fastrand::i64(..))?,
            shared_spans: !settings.single_host_spans,
            reporter,
        })
    }

    pub(crate) async fn close(&self) {
        self.reporter.close().await;
    }

    fn root_context(&self) -> SpanContext {
        let trace_id = TraceId::random();
        SpanContext {
            trace_id,
            span_id: new_span_id(),
            parent_id: None,
            sampled: self.sampler.sample(trace_id.low),
            debug: false,
        }
    }

    fn context_under(&self, parent: &Span) -> SpanContext {
        match parent {
            Span::Zipkin(parent) => parent.context.child(),
            _ => self.root_context(),
        }
    }
}

fn new_span_id() -> u64 {
    fastrand::u64(1..)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SpanContext {
    trace_id: TraceId,
    span_id: u64,
    parent_id: Option<u64>,
    sampled: bool,
    debug: bool,
}

impl SpanContext {
    fn child(&self) -> SpanContext {
        SpanContext {
            span_id: new_span_id(),
            parent_id: Some(self.span_id),
            ..*self
        }
    }

    fn to_b3(self) -> B3Context {
        B3Context {
            trace_id: self.trace_id,
            span_id: self.span_id,
            parent_id: self.parent_id,
            sampled: Some(self.sampled),
            debug: self.debug,
        }
    }
}

/// A span recorded by the Zipkin backend.
#[derive(Debug)]
pub struct ZipkinSpan {
    context: SpanContext,
    kind: Option<Kind>,
    shared: bool,
    remote_endpoint: Option<Endpoint>,
    recording: Recording,
    tracer: Arc<Zipkin>,
}

impl BackendSpan for ZipkinSpan {
    fn trace_id(&self) -> String {
        self.context.trace_id.to_string()
    }

    fn span_id(&self) -> String {
        span_id_hex(self.context.span_id)
    }

    fn recording(&self) -> &Recording {
        &self.recording
    }

    fn on_finish(&self, finished: FinishedSpan) {
        if !self.context.sampled {
            return;
        }
        let timestamp = finished
            .start
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or_default();
        self.tracer.reporter.report(model::Span {
            trace_id: self.context.trace_id.to_string(),
            parent_id: self.context.parent_id.map(span_id_hex),
            id: span_id_hex(self.context.span_id),
            kind: self.kind,
            name: finished.name,
            timestamp,
            duration: (finished.duration.as_micros() as u64).max(1),
            local_endpoint: Some(self.tracer.local_endpoint.clone()),
            remote_endpoint: self.remote_endpoint.clone(),
            tags: finished.tags.into_inner(),
            debug: self.context.debug,
            shared: self.shared,
        });
    }
}

fn open(
    tracer: &Arc<Zipkin>,
    name: &str,
    context: SpanContext,
    kind: Option<Kind>,
    remote_endpoint: Option<Endpoint>,
    shared: bool,
) -> Arc<ZipkinSpan> {
    let mut tags = Tags::default();
    tags.set(VERSION_TAG, env!("CARGO_PKG_VERSION"));
    Arc::new(ZipkinSpan {
        context,
        kind,
        shared,
        remote_endpoint,
        recording: Recording::new(name, tags),
        tracer: tracer.clone(),
    })
}

impl SpanFactory for Arc<Zipkin> {
    fn local_span(&self, parent: &Span, name: &str) -> Span {
        let context = self.context_under(parent);
        Span::Zipkin(open(self, name, context, None, None, false))
    }

    fn server_scope(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> Scope {
        let (context, shared) = match propagation::extract(headers) {
            Some(incoming) => {
                let sampled = incoming
                    .sampled
                    .unwrap_or_else(|| self.sampler.sample(incoming.trace_id.low));
                let joined = SpanContext {
                    trace_id: incoming.trace_id,
                    span_id: incoming.span_id,
                    parent_id: incoming.parent_id,
                    sampled,
                    debug: incoming.debug,
                };
                if self.shared_spans {
                    (joined, true)
                } else {
                    (joined.child(), false)
                }
            }
            None => (self.root_context(), false),
        };

        let name = method.as_str().to_lowercase();
        let span = open(self, &name, context, Some(Kind::Server), None, shared);
        span.recording.tag("http.method", method.as_str());
        span.recording.tag("http.path", uri.path());
        Scope::new(Span::Zipkin(span), Baggage::from_headers(headers))
    }

    fn client_span(&self, parent: &Scope, method: &Method, uri: &Uri, headers: &mut HeaderMap) -> Span {
        let context = self.context_under(parent.span());
        let remote = uri
            .authority()
            .map(|authority| Endpoint::from_authority(authority.host(), authority.port_u16()));
        let name = method.as_str().to_lowercase();
        let span = open(self, &name, context, Some(Kind::Client), remote, false);
        span.recording.tag("http.method", method.as_str());
        span.recording.tag("http.url", &uri.to_string());

        propagation::inject(&context.to_b3(), headers);
        if let Some(request_id) = parent.baggage().request_id() {
            if let Ok(value) = HeaderValue::from_str(request_id) {
                headers.insert(REQUEST_ID_HEADER, value);
            }
        }
        Span::Zipkin(span)
    }
}
