//! Zipkin v2 JSON span model.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Kind {
    Client,
    Server,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<Ipv4Addr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<Ipv6Addr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Endpoint {
    pub fn new(service_name: Option<String>, socket_addr: Option<SocketAddr>) -> Self {
        let mut endpoint = Endpoint {
            service_name,
            ..Endpoint::default()
        };
        match socket_addr {
            Some(SocketAddr::V4(v4)) => {
                endpoint.ipv4 = Some(*v4.ip());
                endpoint.port = Some(v4.port());
            }
            Some(SocketAddr::V6(v6)) => {
                endpoint.ipv6 = Some(*v6.ip());
                endpoint.port = Some(v6.port());
            }
            None => {}
        }
        endpoint
    }

    /// Endpoint for a `host:port` authority. Hostnames become the service
    /// name since Zipkin only records literal addresses.
    pub fn from_authority(host: &str, port: Option<u16>) -> Self {
        let trimmed = host.trim_start_matches('[').trim_end_matches(']');
        match trimmed.parse::<IpAddr>() {
            Ok(ip) => {
                let mut endpoint = Endpoint::new(None, Some(SocketAddr::new(ip, port.unwrap_or(80))));
                endpoint.port = port;
                endpoint
            }
            Err(_) => Endpoint {
                service_name: Some(host.to_string()),
                port,
                ..Endpoint::default()
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<Kind>,
    pub name: String,
    /// Microseconds since the epoch.
    pub timestamp: u64,
    /// Microseconds, never zero.
    pub duration: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_endpoint: Option<Endpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_endpoint: Option<Endpoint>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub debug: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub shared: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_json() {
        let endpoint = Endpoint::new(
            Some("svc-a".to_string()),
            Some("127.0.0.1:8080".parse().unwrap()),
        );
        assert_eq!(
            serde_json::to_string(&endpoint).unwrap(),
            r#"{"serviceName":"svc-a","ipv4":"127.0.0.1","port":8080}"#
        );
        assert_eq!(serde_json::to_string(&Endpoint::default()).unwrap(), "{}");
    }

    #[test]
    fn test_endpoint_from_hostname() {
        let endpoint = Endpoint::from_authority("svc-b", Some(9000));
        assert_eq!(endpoint.service_name.as_deref(), Some("svc-b"));
        assert_eq!(endpoint.port, Some(9000));
        assert!(endpoint.ipv4.is_none());

        let endpoint = Endpoint::from_authority("[::1]", None);
        assert_eq!(endpoint.ipv6, Some(Ipv6Addr::LOCALHOST));
        assert_eq!(endpoint.port, None);
    }

    #[test]
    fn test_span_json_omits_empty_fields() {
        let span = Span {
            trace_id: "0000000000000001".to_string(),
            parent_id: None,
            id: "0000000000000002".to_string(),
            kind: Some(Kind::Server),
            name: "get".to_string(),
            timestamp: 10,
            duration: 5,
            local_endpoint: None,
            remote_endpoint: None,
            tags: BTreeMap::new(),
            debug: false,
            shared: true,
        };
        assert_eq!(
            serde_json::to_string(&span).unwrap(),
            r#"{"traceId":"0000000000000001","id":"0000000000000002","kind":"SERVER","name":"get","timestamp":10,"duration":5,"shared":true}"#
        );
    }
}
