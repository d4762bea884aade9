//! SkyWalking backend.
//!
//! Spans opened for one trace within this instance share a segment. The
//! segment is reported to the OAP HTTP receiver once its last open span
//! finishes. Context crosses hops in `sw8`, baggage in `sw8-correlation`.

pub mod model;
pub mod propagation;

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{HeaderMap, HeaderValue, Method, Uri};
use url::Url;
use uuid::Uuid;

use crate::instrument::reporter::{BatchOptions, Reporter};
use crate::instrument::sampler::{RandomSampler, SamplerError};
use crate::instrument::scope::{Baggage, Scope, REQUEST_ID_KEY};
use crate::instrument::span::{BackendSpan, FinishedSpan, Recording, Span, Tags};
use crate::instrument::SpanFactory;

use model::{KeyStringValuePair, RefType, SegmentObject, SegmentReference, SpanLayer, SpanObject, SpanType};
use propagation::{decode_correlation, encode_correlation, Sw8, CORRELATION_HEADER, SW8_HEADER};

const HTTP_SERVER_COMPONENT: i32 = 5004;
const HTTP_CLIENT_COMPONENT: i32 = 5005;
const VERSION_TAG: &str = "version";

/// Everything needed to start the SkyWalking backend.
#[derive(Debug, Clone)]
pub struct SkywalkingSettings {
    pub service_name: String,
    pub instance_name: String,
    pub sample_rate: f64,
    pub reporter_endpoint: Url,
    pub batch: BatchOptions,
}

/// Running SkyWalking tracer.
#[derive(Debug)]
pub struct Skywalking {
    service: String,
    instance: String,
    sampler: RandomSampler,
    reporter: Reporter<SegmentObject>,
}

impl Skywalking {
    pub fn new(settings: &SkywalkingSettings, reporter: Reporter<SegmentObject>) -> Result<Self, SamplerError> {
        Ok(Self {
            service: settings.service_name.clone(),
            instance: settings.instance_name.clone(),
            sampler: RandomSampler::new(settings.sample_rate)?,
            reporter,
        })
    }

    pub(crate) async fn close(&self) {
        self.reporter.close().await;
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn epoch_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[derive(Debug)]
struct Segment {
    trace_id: String,
    segment_id: String,
    sampled: bool,
    entry_endpoint: String,
    next_span_id: AtomicI32,
    open_spans: AtomicUsize,
    finished: Mutex<Vec<SpanObject>>,
    tracer: Arc<Skywalking>,
}

impl Segment {
    fn new(tracer: &Arc<Skywalking>, trace_id: String, sampled: bool, entry_endpoint: &str) -> Arc<Self> {
        Arc::new(Segment {
            trace_id,
            segment_id: new_id(),
            sampled,
            entry_endpoint: entry_endpoint.to_string(),
            next_span_id: AtomicI32::new(0),
            open_spans: AtomicUsize::new(0),
            finished: Mutex::new(Vec::new()),
            tracer: tracer.clone(),
        })
    }

    fn open_span(&self) -> i32 {
        self.acquire();
        self.next_span_id.fetch_add(1, Ordering::Relaxed)
    }

    fn close_span(&self, span: SpanObject) {
        self.finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(span);
        self.release();
    }

    fn acquire(&self) {
        self.open_spans.fetch_add(1, Ordering::AcqRel);
    }

    /// Report the segment once nothing keeps it open.
    fn release(&self) {
        if self.open_spans.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let mut spans = std::mem::take(&mut *self.finished.lock().unwrap_or_else(PoisonError::into_inner));

        if self.sampled {
            spans.sort_by_key(|span| span.span_id);
            self.tracer.reporter.report(SegmentObject {
                trace_id: self.trace_id.clone(),
                trace_segment_id: self.segment_id.clone(),
                spans,
                service: self.tracer.service.clone(),
                service_instance: self.tracer.instance.clone(),
                is_size_limited: false,
            });
        }
    }
}

/// Keeps a segment from being reported while work that will add spans to it
/// is still pending.
#[derive(Debug)]
pub(crate) struct SegmentHold(Arc<Segment>);

impl Drop for SegmentHold {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// A span recorded by the SkyWalking backend.
#[derive(Debug)]
pub struct SkywalkingSpan {
    segment: Arc<Segment>,
    span_id: i32,
    parent_span_id: i32,
    span_type: SpanType,
    component_id: i32,
    peer: String,
    refs: Vec<SegmentReference>,
    recording: Recording,
}

impl SkywalkingSpan {
    fn open(
        segment: Arc<Segment>,
        parent_span_id: i32,
        operation: &str,
        span_type: SpanType,
        peer: String,
        refs: Vec<SegmentReference>,
    ) -> Arc<Self> {
        let component_id = match span_type {
            SpanType::Entry => HTTP_SERVER_COMPONENT,
            SpanType::Exit => HTTP_CLIENT_COMPONENT,
            SpanType::Local => 0,
        };
        let span_id = segment.open_span();
        Arc::new(SkywalkingSpan {
            segment,
            span_id,
            parent_span_id,
            span_type,
            component_id,
            peer,
            refs,
            recording: Recording::new(operation, Tags::default()),
        })
    }

    pub(crate) fn hold_segment(&self) -> SegmentHold {
        self.segment.acquire();
        SegmentHold(self.segment.clone())
    }
}

impl BackendSpan for SkywalkingSpan {
    fn trace_id(&self) -> String {
        self.segment.trace_id.clone()
    }

    fn span_id(&self) -> String {
        format!("{}.{}", self.segment.segment_id, self.span_id)
    }

    fn recording(&self) -> &Recording {
        &self.recording
    }

    fn on_finish(&self, finished: FinishedSpan) {
        let span_layer = match self.span_type {
            SpanType::Local => SpanLayer::Unknown,
            SpanType::Entry | SpanType::Exit => SpanLayer::Http,
        };
        let is_error = finished.tags.has_error();
        let tags = finished
            .tags
            .into_inner()
            .into_iter()
            .map(|(key, value)| KeyStringValuePair { key, value })
            .collect();
        self.segment.close_span(SpanObject {
            span_id: self.span_id,
            parent_span_id: self.parent_span_id,
            start_time: epoch_millis(finished.start),
            end_time: epoch_millis(finished.start + finished.duration),
            refs: self.refs.clone(),
            operation_name: finished.name,
            peer: self.peer.clone(),
            span_type: self.span_type,
            span_layer,
            component_id: self.component_id,
            is_error,
            tags,
            skip_analysis: false,
        });
    }
}

fn segment_under(tracer: &Arc<Skywalking>, parent: &Span, endpoint: &str) -> (Arc<Segment>, i32) {
    match parent {
        Span::Skywalking(parent) => (parent.segment.clone(), parent.span_id),
        _ => (Segment::new(tracer, new_id(), tracer.sampler.sample(), endpoint), -1),
    }
}

impl SpanFactory for Arc<Skywalking> {
    fn local_span(&self, parent: &Span, name: &str) -> Span {
        let (segment, parent_span_id) = segment_under(self, parent, name);
        Span::Skywalking(SkywalkingSpan::open(
            segment,
            parent_span_id,
            name,
            SpanType::Local,
            String::new(),
            Vec::new(),
        ))
    }

    fn server_scope(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> Scope {
        let operation = format!("/{}{}", method, uri.path());
        let incoming = headers
            .get(SW8_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| match Sw8::decode(v) {
                Ok(context) => Some(context),
                Err(e) => {
                    tracing::debug!(error = %e, "Ignoring malformed sw8 header");
                    None
                }
            });

        let (segment, refs) = match incoming {
            Some(context) => {
                let reference = SegmentReference {
                    ref_type: RefType::CrossProcess,
                    trace_id: context.trace_id.clone(),
                    parent_trace_segment_id: context.parent_segment_id,
                    parent_span_id: context.parent_span_id,
                    parent_service: context.parent_service,
                    parent_service_instance: context.parent_service_instance,
                    parent_endpoint: context.parent_endpoint,
                    network_address_used_at_peer: context.address_used_at_client,
                };
                let segment = Segment::new(self, context.trace_id, context.sampled, &operation);
                (segment, vec![reference])
            }
            None => (Segment::new(self, new_id(), self.sampler.sample(), &operation), Vec::new()),
        };

        let span = SkywalkingSpan::open(segment, -1, &operation, SpanType::Entry, String::new(), refs);
        span.recording.tag("http.method", method.as_str());
        span.recording.tag("url", &uri.to_string());
        span.recording.tag(VERSION_TAG, env!("CARGO_PKG_VERSION"));

        let mut baggage = headers
            .get(CORRELATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(decode_correlation)
            .unwrap_or_default();
        if baggage.request_id().is_none() {
            if let Some(request_id) = Baggage::from_headers(headers).request_id() {
                baggage.set(REQUEST_ID_KEY, request_id);
            }
        }
        if let Some(request_id) = baggage.request_id() {
            span.recording.tag(REQUEST_ID_KEY, request_id);
        }
        Scope::new(Span::Skywalking(span), baggage)
    }

    fn client_span(&self, parent: &Scope, method: &Method, uri: &Uri, headers: &mut HeaderMap) -> Span {
        let peer = uri.authority().map(|a| a.to_string()).unwrap_or_default();
        let (segment, parent_span_id) = segment_under(self, parent.span(), uri.path());
        let span = SkywalkingSpan::open(
            segment.clone(),
            parent_span_id,
            uri.path(),
            SpanType::Exit,
            peer.clone(),
            Vec::new(),
        );
        span.recording.tag("http.method", method.as_str());
        span.recording.tag("url", &uri.to_string());

        let context = Sw8 {
            sampled: segment.sampled,
            trace_id: segment.trace_id.clone(),
            parent_segment_id: segment.segment_id.clone(),
            parent_span_id: span.span_id,
            parent_service: self.service.clone(),
            parent_service_instance: self.instance.clone(),
            parent_endpoint: segment.entry_endpoint.clone(),
            address_used_at_client: peer,
        };
        if let Ok(value) = HeaderValue::from_str(&context.encode()) {
            headers.insert(SW8_HEADER, value);
        }
        if let Some(value) = encode_correlation(parent.baggage()).and_then(|c| HeaderValue::from_str(&c).ok()) {
            headers.insert(CORRELATION_HEADER, value);
        }
        Span::Skywalking(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn tracer(rate: f64) -> (Arc<Skywalking>, UnboundedReceiver<SegmentObject>) {
        let settings = SkywalkingSettings {
            service_name: "svc-a".to_string(),
            instance_name: "pod-a".to_string(),
            sample_rate: rate,
            reporter_endpoint: Url::parse("http://oap:12800/v3/segments").unwrap(),
            batch: BatchOptions::default(),
        };
        let (reporter, rx) = Reporter::capture();
        (Arc::new(Skywalking::new(&settings, reporter).unwrap()), rx)
    }

    #[tokio::test]
    async fn test_segment_reported_after_last_span() {
        let (tracer, mut rx) = tracer(1.0);
        let scope = tracer.server_scope(&Method::GET, &"/proxy/svc-b/echo".parse().unwrap(), &HeaderMap::new());
        let mut outbound = HeaderMap::new();
        let exit = tracer.client_span(
            &scope,
            &Method::GET,
            &"http://svc-b:8000/echo".parse().unwrap(),
            &mut outbound,
        );
        exit.tag("error", "503");
        exit.finish();
        assert!(rx.try_recv().is_err());

        scope.span().finish();
        let segment = rx.recv().await.unwrap();
        assert_eq!(segment.service, "svc-a");
        assert_eq!(segment.service_instance, "pod-a");
        assert_eq!(segment.spans.len(), 2);

        let entry = &segment.spans[0];
        assert_eq!(entry.span_type, SpanType::Entry);
        assert_eq!(entry.operation_name, "/GET/proxy/svc-b/echo");
        assert_eq!(entry.parent_span_id, -1);
        assert_eq!(entry.component_id, HTTP_SERVER_COMPONENT);

        let exit = &segment.spans[1];
        assert_eq!(exit.span_type, SpanType::Exit);
        assert_eq!(exit.peer, "svc-b:8000");
        assert_eq!(exit.parent_span_id, entry.span_id);
        assert!(exit.is_error);
    }

    #[tokio::test]
    async fn test_entry_span_continues_incoming_trace() {
        let (caller, _caller_rx) = tracer(1.0);
        let caller_scope = caller.server_scope(&Method::GET, &"/proxy/b".parse().unwrap(), &HeaderMap::new());
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("req-7"));
        let caller_scope = Scope::new(caller_scope.span().clone(), Baggage::from_headers(&headers));
        let mut outbound = HeaderMap::new();
        let exit = caller.client_span(&caller_scope, &Method::GET, &"http://b:8000/".parse().unwrap(), &mut outbound);

        let (callee, mut callee_rx) = tracer(0.0);
        let scope = callee.server_scope(&Method::GET, &"/".parse().unwrap(), &outbound);
        assert_eq!(scope.span().trace_id(), caller_scope.span().trace_id());
        assert_eq!(scope.baggage().request_id(), Some("req-7"));

        scope.span().finish();
        let segment = callee_rx.recv().await.unwrap();
        let reference = &segment.spans[0].refs[0];
        assert_eq!(reference.ref_type, RefType::CrossProcess);
        assert_eq!(reference.parent_service, "svc-a");
        assert_eq!(reference.parent_endpoint, "/GET/proxy/b");
        assert_eq!(reference.network_address_used_at_peer, "b:8000");
        assert_eq!(
            format!("{}.{}", reference.parent_trace_segment_id, reference.parent_span_id),
            exit.span_id()
        );
    }

    #[tokio::test]
    async fn test_hold_delays_segment_until_released() {
        let (tracer, mut rx) = tracer(1.0);
        let scope = tracer.server_scope(&Method::GET, &"/local/serial/latency/1s".parse().unwrap(), &HeaderMap::new());
        let Span::Skywalking(entry) = scope.span() else {
            panic!("expected skywalking span");
        };
        let hold = entry.hold_segment();

        scope.span().finish();
        assert!(rx.try_recv().is_err());

        let late = tracer.local_span(scope.span(), "proc-0");
        late.finish();
        assert!(rx.try_recv().is_err());

        drop(hold);
        let segment = rx.recv().await.unwrap();
        assert_eq!(segment.spans.len(), 2);
        assert_eq!(segment.spans[1].operation_name, "proc-0");
        assert_eq!(segment.spans[1].parent_span_id, segment.spans[0].span_id);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsampled_segment_is_dropped() {
        let (tracer, mut rx) = tracer(0.0);
        let span = tracer.local_span(&Span::Noop, "proc-0");
        span.finish();
        assert!(rx.try_recv().is_err());
    }
}
