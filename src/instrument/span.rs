//! Backend-neutral span handle.
//!
//! A [`Span`] is cheap to clone and safe to share across tasks. Finishing is
//! idempotent: only the first `finish` hands the span to its backend.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use axum::http::StatusCode;

use crate::instrument::skywalking::{SegmentHold, SkywalkingSpan};
use crate::instrument::zipkin::ZipkinSpan;

/// Tag key marking a span as failed.
pub const ERROR_TAG: &str = "error";
pub const STATUS_CODE_TAG: &str = "http.status_code";

/// Key/value annotations on a span.
///
/// The first `error` value wins; later attempts to overwrite it are ignored
/// so the root cause is what gets reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    pub fn set(&mut self, key: &str, value: &str) {
        if key == ERROR_TAG && self.0.contains_key(ERROR_TAG) {
            return;
        }
        self.0.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn has_error(&self) -> bool {
        self.0.contains_key(ERROR_TAG)
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

/// Everything a backend needs to export a completed span.
#[derive(Debug, Clone)]
pub struct FinishedSpan {
    pub name: String,
    pub tags: Tags,
    pub start: SystemTime,
    pub duration: Duration,
}

#[derive(Debug)]
struct RecordingState {
    name: String,
    tags: Tags,
    finished: bool,
}

/// Mutable part of an open span, shared by every backend.
#[derive(Debug)]
pub(crate) struct Recording {
    state: Mutex<RecordingState>,
    start: SystemTime,
    started: Instant,
}

impl Recording {
    pub(crate) fn new(name: &str, tags: Tags) -> Self {
        Self {
            state: Mutex::new(RecordingState {
                name: name.to_string(),
                tags,
                finished: false,
            }),
            start: SystemTime::now(),
            started: Instant::now(),
        }
    }

    pub(crate) fn tag(&self, key: &str, value: &str) {
        let mut state = self.lock();
        if !state.finished {
            state.tags.set(key, value);
        }
    }

    /// Close the span. Returns the export payload on the first call only.
    pub(crate) fn finish(&self) -> Option<FinishedSpan> {
        let mut state = self.lock();
        if state.finished {
            return None;
        }
        state.finished = true;
        Some(FinishedSpan {
            name: state.name.clone(),
            tags: std::mem::take(&mut state.tags),
            start: self.start,
            duration: self.started.elapsed(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Implemented by each backend's concrete span type.
pub(crate) trait BackendSpan: Send + Sync + fmt::Debug {
    fn trace_id(&self) -> String;
    fn span_id(&self) -> String;
    fn recording(&self) -> &Recording;
    fn on_finish(&self, finished: FinishedSpan);
}

/// A span from whichever backend is active, or a no-op span when the
/// current request carries none.
#[derive(Debug, Clone, Default)]
pub enum Span {
    #[default]
    Noop,
    Zipkin(Arc<ZipkinSpan>),
    Skywalking(Arc<SkywalkingSpan>),
}

impl Span {
    fn backend(&self) -> Option<&dyn BackendSpan> {
        match self {
            Span::Noop => None,
            Span::Zipkin(span) => Some(span.as_ref()),
            Span::Skywalking(span) => Some(span.as_ref()),
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Span::Noop)
    }

    /// Trace identifier as propagated on the wire; empty for a no-op span.
    pub fn trace_id(&self) -> String {
        self.backend().map(|span| span.trace_id()).unwrap_or_default()
    }

    pub fn span_id(&self) -> String {
        self.backend().map(|span| span.span_id()).unwrap_or_default()
    }

    pub fn tag(&self, key: &str, value: &str) {
        if let Some(span) = self.backend() {
            span.recording().tag(key, value);
        }
    }

    /// Keep this span's trace unit open for spans that will be started
    /// after the span itself may have finished. Only SkyWalking batches spans
    /// per segment; other backends need no hold.
    pub(crate) fn hold(&self) -> Option<SegmentHold> {
        match self {
            Span::Skywalking(span) => Some(span.hold_segment()),
            Span::Noop | Span::Zipkin(_) => None,
        }
    }

    pub fn finish(&self) {
        if let Some(span) = self.backend() {
            if let Some(finished) = span.recording().finish() {
                span.on_finish(finished);
            }
        }
    }
}

/// Tag a span with the outcome of an HTTP exchange.
pub(crate) fn record_status(span: &Span, status: StatusCode) {
    if !status.is_success() {
        span.tag(STATUS_CODE_TAG, status.as_str());
    }
    if status.is_client_error() || status.is_server_error() {
        span.tag(ERROR_TAG, status.as_str());
    }
}

/// Finishes the held span when dropped, including on cancellation.
pub(crate) struct FinishOnDrop(pub(crate) Span);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        self.0.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_error_tag_wins() {
        let mut tags = Tags::default();
        tags.set(ERROR_TAG, "connection refused");
        tags.set(ERROR_TAG, "503");
        tags.set("http.method", "GET");
        tags.set("http.method", "POST");
        assert_eq!(tags.get(ERROR_TAG), Some("connection refused"));
        assert_eq!(tags.get("http.method"), Some("POST"));
        assert!(tags.has_error());
    }

    #[test]
    fn test_recording_finishes_once() {
        let recording = Recording::new("op", Tags::default());
        recording.tag("k", "v");
        let finished = recording.finish().unwrap();
        assert_eq!(finished.name, "op");
        assert_eq!(finished.tags.get("k"), Some("v"));
        assert!(recording.finish().is_none());
    }

    #[test]
    fn test_mutation_after_finish_is_ignored() {
        let recording = Recording::new("op", Tags::default());
        recording.finish();
        recording.tag("late", "x");
        assert!(recording.finish().is_none());
    }

    #[test]
    fn test_noop_span() {
        let span = Span::default();
        span.tag("k", "v");
        span.finish();
        assert!(span.is_noop());
        assert_eq!(span.trace_id(), "");
    }
}
