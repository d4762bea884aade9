//! Configuration schema definitions.
//!
//! Every field has a default so an empty file (or no file at all) yields a
//! runnable node. Values here are raw; [`crate::config::validation`] turns
//! them into typed [`crate::config::Settings`].

use serde::{Deserialize, Serialize};

pub const DEFAULT_SERVICE_NAME: &str = "demosvc";

/// Root configuration for a topology node.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Name this instance reports in envelopes, `Proxied-By` and spans.
    pub service_name: String,

    /// Instance name for backends that distinguish instances. Falls back to
    /// the service name.
    pub instance_name: Option<String>,

    pub listener: ListenerConfig,

    /// Boot-time fault policy.
    pub behavior: BehaviorConfig,

    pub observability: ObservabilityConfig,

    pub tracing: TracingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            instance_name: None,
            listener: ListenerConfig::default(),
            behavior: BehaviorConfig::default(),
            observability: ObservabilityConfig::default(),
            tracing: TracingConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address, `host:port` or `:port`.
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: ":8000".to_string(),
        }
    }
}

/// Fault policy in effect until changed over HTTP.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Error percentage, 0 to 100.
    pub errors: i64,

    /// Duplicate `Content-Type` percentage, 0 to 100.
    pub headers: i64,

    /// Injected latency (`"250ms"`, `"1s"`, or bare milliseconds).
    pub latency: String,

    pub handle_failures: bool,

    /// Seconds between a crash request and process termination.
    pub crash_delay_secs: u64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            errors: 0,
            headers: 0,
            latency: "0s".to_string(),
            handle_failures: false,
            crash_delay_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Distributed tracing backends. Only `instrumenter` is started.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TracingConfig {
    pub instrumenter: String,
    pub zipkin: ZipkinConfig,
    pub skywalking: SkywalkingConfig,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            instrumenter: "zipkin".to_string(),
            zipkin: ZipkinConfig::default(),
            skywalking: SkywalkingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ZipkinConfig {
    /// Full URL of the Zipkin HTTP collector.
    pub reporter_endpoint: String,

    /// Overrides the service name on the local endpoint.
    pub local_service_name: Option<String>,

    /// `ip:port` reported on the local endpoint.
    pub local_hostport: Option<String>,

    /// Do not use Zipkin RPC shared spans.
    pub single_host_spans: bool,

    /// Between never (0.0) and always (1.0), smallest increment 0.0001.
    pub sample_rate: f64,

    pub batch: BatchConfig,
}

impl Default for ZipkinConfig {
    fn default() -> Self {
        Self {
            reporter_endpoint: "http://zipkin.istio-system.svc.cluster.local:9411/api/v2/spans".to_string(),
            local_service_name: None,
            local_hostport: None,
            single_host_spans: true,
            sample_rate: 1.0,
            batch: BatchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SkywalkingConfig {
    /// Full URL of the OAP HTTP segment receiver.
    pub reporter_endpoint: String,

    pub local_service_name: Option<String>,

    pub local_instance_name: Option<String>,

    /// Between never (0.0) and always (1.0).
    pub sample_rate: f64,

    pub batch: BatchConfig,
}

impl Default for SkywalkingConfig {
    fn default() -> Self {
        Self {
            reporter_endpoint: "http://oap.default.svc.cluster.local:12800/v3/segments".to_string(),
            local_service_name: None,
            local_instance_name: None,
            sample_rate: 1.0,
            batch: BatchConfig::default(),
        }
    }
}

/// Reporter queue and batch sizing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_queue_size: usize,
    pub max_batch_size: usize,
    pub flush_interval_ms: u64,
    pub export_timeout_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 2_048,
            max_batch_size: 512,
            flush_interval_ms: 1_000,
            export_timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config: ServiceConfig = toml::from_str("").unwrap();
        assert_eq!(config.service_name, DEFAULT_SERVICE_NAME);
        assert_eq!(config.listener.bind_address, ":8000");
        assert_eq!(config.tracing.instrumenter, "zipkin");
        assert!(config.tracing.zipkin.single_host_spans);
        assert_eq!(config.behavior.crash_delay_secs, 5);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config: ServiceConfig = toml::from_str(
            r#"
            service_name = "svc-a"

            [behavior]
            errors = 25
            latency = "150ms"

            [observability]
            log_format = "json"

            [tracing.skywalking]
            sample_rate = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.service_name, "svc-a");
        assert_eq!(config.behavior.errors, 25);
        assert_eq!(config.behavior.headers, 0);
        assert_eq!(config.behavior.latency, "150ms");
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.tracing.skywalking.sample_rate, 0.5);
        assert_eq!(config.tracing.skywalking.batch.max_batch_size, 512);
    }
}
