//! B3 header propagation.
//!
//! Extraction understands both the single `b3` header and the multi-header
//! `X-B3-*` form, preferring the single header when both are present.
//! Injection always writes the multi-header form.

use std::fmt;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

pub const B3_SINGLE_HEADER: HeaderName = HeaderName::from_static("b3");
pub const B3_TRACE_ID_HEADER: HeaderName = HeaderName::from_static("x-b3-traceid");
pub const B3_SPAN_ID_HEADER: HeaderName = HeaderName::from_static("x-b3-spanid");
pub const B3_PARENT_SPAN_ID_HEADER: HeaderName = HeaderName::from_static("x-b3-parentspanid");
pub const B3_SAMPLED_HEADER: HeaderName = HeaderName::from_static("x-b3-sampled");
pub const B3_FLAGS_HEADER: HeaderName = HeaderName::from_static("x-b3-flags");

/// 64 or 128 bit trace identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId {
    pub high: u64,
    pub low: u64,
}

impl TraceId {
    pub fn random() -> Self {
        TraceId {
            high: fastrand::u64(1..),
            low: fastrand::u64(1..),
        }
    }

    fn parse(hex: &str) -> Option<Self> {
        if !is_lower_hex(hex) {
            return None;
        }
        let id = match hex.len() {
            16 => TraceId {
                high: 0,
                low: u64::from_str_radix(hex, 16).ok()?,
            },
            32 => TraceId {
                high: u64::from_str_radix(&hex[..16], 16).ok()?,
                low: u64::from_str_radix(&hex[16..], 16).ok()?,
            },
            _ => return None,
        };
        Some(id).filter(|id| id.high != 0 || id.low != 0)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.high == 0 {
            write!(f, "{:016x}", self.low)
        } else {
            write!(f, "{:016x}{:016x}", self.high, self.low)
        }
    }
}

/// Identifiers and sampling state carried between hops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct B3Context {
    pub trace_id: TraceId,
    pub span_id: u64,
    pub parent_id: Option<u64>,
    /// `None` defers the decision to the receiver.
    pub sampled: Option<bool>,
    pub debug: bool,
}

pub fn span_id_hex(id: u64) -> String {
    format!("{id:016x}")
}

fn is_lower_hex(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn parse_span_id(hex: &str) -> Option<u64> {
    if hex.len() != 16 || !is_lower_hex(hex) {
        return None;
    }
    u64::from_str_radix(hex, 16).ok().filter(|id| *id != 0)
}

/// Sampling state plus debug flag.
fn parse_sampled(value: &str) -> Option<(bool, bool)> {
    match value {
        "1" | "true" => Some((true, false)),
        "0" | "false" => Some((false, false)),
        "d" => Some((true, true)),
        _ => None,
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Read an incoming context. Malformed headers yield `None`, so the
/// receiver starts a fresh trace instead of joining a broken one.
pub fn extract(headers: &HeaderMap) -> Option<B3Context> {
    match header(headers, &B3_SINGLE_HEADER) {
        Some(single) => extract_single(single),
        None => extract_multi(headers),
    }
}

fn extract_single(value: &str) -> Option<B3Context> {
    let parts: Vec<&str> = value.split('-').collect();
    if parts.len() < 2 || parts.len() > 4 {
        return None;
    }
    let trace_id = TraceId::parse(parts[0])?;
    let span_id = parse_span_id(parts[1])?;
    let (sampled, debug) = match parts.get(2) {
        Some(state) => {
            let (sampled, debug) = parse_sampled(state)?;
            (Some(sampled), debug)
        }
        None => (None, false),
    };
    let parent_id = match parts.get(3) {
        Some(parent) => Some(parse_span_id(parent)?),
        None => None,
    };
    Some(B3Context {
        trace_id,
        span_id,
        parent_id,
        sampled,
        debug,
    })
}

fn extract_multi(headers: &HeaderMap) -> Option<B3Context> {
    let trace_id = TraceId::parse(header(headers, &B3_TRACE_ID_HEADER)?)?;
    let span_id = parse_span_id(header(headers, &B3_SPAN_ID_HEADER)?)?;
    let parent_id = match header(headers, &B3_PARENT_SPAN_ID_HEADER) {
        Some(parent) => Some(parse_span_id(parent)?),
        None => None,
    };
    let debug = header(headers, &B3_FLAGS_HEADER) == Some("1");
    let sampled = match header(headers, &B3_SAMPLED_HEADER) {
        Some(state) => Some(parse_sampled(state)?.0),
        None if debug => Some(true),
        None => None,
    };
    Some(B3Context {
        trace_id,
        span_id,
        parent_id,
        sampled,
        debug,
    })
}

/// Write `context` as `X-B3-*` headers, replacing any already present.
pub fn inject(context: &B3Context, headers: &mut HeaderMap) {
    headers.remove(B3_SINGLE_HEADER);
    insert(headers, B3_TRACE_ID_HEADER, &context.trace_id.to_string());
    insert(headers, B3_SPAN_ID_HEADER, &span_id_hex(context.span_id));
    match context.parent_id {
        Some(parent) => insert(headers, B3_PARENT_SPAN_ID_HEADER, &span_id_hex(parent)),
        None => {
            headers.remove(B3_PARENT_SPAN_ID_HEADER);
        }
    }
    headers.remove(B3_SAMPLED_HEADER);
    headers.remove(B3_FLAGS_HEADER);
    if context.debug {
        headers.insert(B3_FLAGS_HEADER, HeaderValue::from_static("1"));
    } else if let Some(sampled) = context.sampled {
        let value = if sampled { "1" } else { "0" };
        headers.insert(B3_SAMPLED_HEADER, HeaderValue::from_static(value));
    }
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    // hex digits are always valid header bytes
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
