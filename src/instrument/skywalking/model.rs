//! SkyWalking segment model as accepted by the OAP HTTP receiver
//! (`POST /v3/segments`, JSON array of segments).

use serde::Serialize;

/// All spans one instance recorded for one trace, reported together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentObject {
    pub trace_id: String,
    pub trace_segment_id: String,
    pub spans: Vec<SpanObject>,
    pub service: String,
    pub service_instance: String,
    pub is_size_limited: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanObject {
    pub span_id: i32,
    pub parent_span_id: i32,
    /// Milliseconds since the epoch.
    pub start_time: i64,
    pub end_time: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<SegmentReference>,
    pub operation_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub peer: String,
    pub span_type: SpanType,
    pub span_layer: SpanLayer,
    pub component_id: i32,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<KeyStringValuePair>,
    pub skip_analysis: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpanType {
    Entry,
    Exit,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpanLayer {
    Unknown,
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RefType {
    CrossProcess,
}

/// Link from an entry span back to the caller's exit span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentReference {
    pub ref_type: RefType,
    pub trace_id: String,
    pub parent_trace_segment_id: String,
    pub parent_span_id: i32,
    pub parent_service: String,
    pub parent_service_instance: String,
    pub parent_endpoint: String,
    pub network_address_used_at_peer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyStringValuePair {
    pub key: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_json_field_names() {
        let span = SpanObject {
            span_id: 0,
            parent_span_id: -1,
            start_time: 1,
            end_time: 2,
            refs: Vec::new(),
            operation_name: "/GET/echo".to_string(),
            peer: String::new(),
            span_type: SpanType::Entry,
            span_layer: SpanLayer::Http,
            component_id: 5004,
            is_error: false,
            tags: vec![KeyStringValuePair {
                key: "http.method".to_string(),
                value: "GET".to_string(),
            }],
            skip_analysis: false,
        };
        let json = serde_json::to_value(&span).unwrap();
        assert_eq!(json["parentSpanId"], -1);
        assert_eq!(json["spanType"], "Entry");
        assert_eq!(json["spanLayer"], "Http");
        assert_eq!(json["componentId"], 5004);
        assert_eq!(json["tags"][0]["key"], "http.method");
        assert!(json.get("refs").is_none());
        assert!(json.get("peer").is_none());
    }
}
