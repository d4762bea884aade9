//! `sw8` and `sw8-correlation` header codecs.
//!
//! `sw8` is eight dash-separated fields:
//! `sample-traceId-segmentId-spanId-service-instance-endpoint-peer`, where
//! every field except the sample flag and span id is base64 encoded.
//! `sw8-correlation` is a comma-separated list of `base64(key):base64(value)`.

use axum::http::HeaderName;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;

use crate::instrument::scope::Baggage;

pub const SW8_HEADER: HeaderName = HeaderName::from_static("sw8");
pub const CORRELATION_HEADER: HeaderName = HeaderName::from_static("sw8-correlation");

/// Why an incoming `sw8` header was ignored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropagationError {
    #[error("expected 8 fields in sw8 header, found {0}")]
    FieldCount(usize),

    #[error("invalid sample flag {0:?}")]
    SampleFlag(String),

    #[error("invalid parent span id {0:?}")]
    SpanId(String),

    #[error("field is not valid base64 text: {0:?}")]
    Encoding(String),
}

/// Decoded `sw8` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sw8 {
    pub sampled: bool,
    pub trace_id: String,
    pub parent_segment_id: String,
    pub parent_span_id: i32,
    pub parent_service: String,
    pub parent_service_instance: String,
    pub parent_endpoint: String,
    pub address_used_at_client: String,
}

impl Sw8 {
    pub fn encode(&self) -> String {
        [
            if self.sampled { "1" } else { "0" }.to_string(),
            STANDARD.encode(&self.trace_id),
            STANDARD.encode(&self.parent_segment_id),
            self.parent_span_id.to_string(),
            STANDARD.encode(&self.parent_service),
            STANDARD.encode(&self.parent_service_instance),
            STANDARD.encode(&self.parent_endpoint),
            STANDARD.encode(&self.address_used_at_client),
        ]
        .join("-")
    }

    pub fn decode(value: &str) -> Result<Self, PropagationError> {
        let fields: Vec<&str> = value.split('-').collect();
        if fields.len() != 8 {
            return Err(PropagationError::FieldCount(fields.len()));
        }
        let sampled = match fields[0] {
            "1" => true,
            "0" => false,
            other => return Err(PropagationError::SampleFlag(other.to_string())),
        };
        let parent_span_id = fields[3]
            .parse()
            .map_err(|_| PropagationError::SpanId(fields[3].to_string()))?;
        Ok(Sw8 {
            sampled,
            trace_id: decode_field(fields[1])?,
            parent_segment_id: decode_field(fields[2])?,
            parent_span_id,
            parent_service: decode_field(fields[4])?,
            parent_service_instance: decode_field(fields[5])?,
            parent_endpoint: decode_field(fields[6])?,
            address_used_at_client: decode_field(fields[7])?,
        })
    }
}

fn decode_field(field: &str) -> Result<String, PropagationError> {
    STANDARD
        .decode(field)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| PropagationError::Encoding(field.to_string()))
}

/// Encode baggage for `sw8-correlation`; `None` when there is nothing to send.
pub fn encode_correlation(baggage: &Baggage) -> Option<String> {
    if baggage.is_empty() {
        return None;
    }
    let pairs: Vec<String> = baggage
        .iter()
        .map(|(key, value)| format!("{}:{}", STANDARD.encode(key), STANDARD.encode(value)))
        .collect();
    Some(pairs.join(","))
}

/// Decode `sw8-correlation`, skipping entries that do not decode.
pub fn decode_correlation(value: &str) -> Baggage {
    value
        .split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once(':')?;
            Some((decode_field(key).ok()?, decode_field(value).ok()?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::scope::REQUEST_ID_KEY;

    fn sample() -> Sw8 {
        Sw8 {
            sampled: true,
            trace_id: "trace-1".to_string(),
            parent_segment_id: "segment-1".to_string(),
            parent_span_id: 2,
            parent_service: "svc-a".to_string(),
            parent_service_instance: "pod-a".to_string(),
            parent_endpoint: "/GET/proxy/svc-b".to_string(),
            address_used_at_client: "svc-b:8000".to_string(),
        }
    }

    #[test]
    fn test_encode_layout() {
        let encoded = sample().encode();
        let fields: Vec<&str> = encoded.split('-').collect();
        assert_eq!(fields.len(), 8);
        assert_eq!(fields[0], "1");
        assert_eq!(fields[1], STANDARD.encode("trace-1"));
        assert_eq!(fields[3], "2");
        assert_eq!(Sw8::decode(&encoded).unwrap(), sample());
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(Sw8::decode("1-a-b"), Err(PropagationError::FieldCount(3)));
        assert_eq!(
            Sw8::decode("x-YQ==-YQ==-0-YQ==-YQ==-YQ==-YQ=="),
            Err(PropagationError::SampleFlag("x".to_string()))
        );
        assert_eq!(
            Sw8::decode("1-YQ==-YQ==-z-YQ==-YQ==-YQ==-YQ=="),
            Err(PropagationError::SpanId("z".to_string()))
        );
        assert!(matches!(
            Sw8::decode("1-!!!-YQ==-0-YQ==-YQ==-YQ==-YQ=="),
            Err(PropagationError::Encoding(_))
        ));
    }

    #[test]
    fn test_correlation() {
        let mut baggage = Baggage::default();
        baggage.set(REQUEST_ID_KEY, "req-9");
        let encoded = encode_correlation(&baggage).unwrap();
        assert_eq!(encoded, format!("{}:{}", STANDARD.encode(REQUEST_ID_KEY), STANDARD.encode("req-9")));

        let decoded = decode_correlation(&format!("{encoded},garbage,@@:@@"));
        assert_eq!(decoded.request_id(), Some("req-9"));
        assert!(encode_correlation(&Baggage::default()).is_none());
    }
}
