//! Command-line flags.
//!
//! Flags mirror the config file and win over it. `SVCNAME` and `HOSTNAME`
//! are read through clap's `env` support so they sit between the file and
//! explicit flags.

use std::path::PathBuf;

use clap::Parser;

use crate::config::schema::{LogFormat, ServiceConfig};

#[derive(Debug, Clone, Default, Parser)]
#[command(name = "topology-tester", version, about = "Flexible HTTP service to create observed topologies")]
pub struct Cli {
    /// TOML configuration file.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Service name reported by this instance.
    #[arg(long, env = "SVCNAME")]
    pub service_name: Option<String>,

    /// Instance name reported by this instance.
    #[arg(long, env = "HOSTNAME")]
    pub instance_name: Option<String>,

    /// Address to listen on (`host:port` or `:port`).
    #[arg(long = "http-listen-address", short = 'a')]
    pub listen_address: Option<String>,

    /// Tracing backend: zipkin or skywalking.
    #[arg(long)]
    pub observability_instrumenter: Option<String>,

    /// Percentage of requests failed with an injected error.
    #[arg(long = "ep-errors", allow_negative_numbers = true)]
    pub errors: Option<i64>,

    /// Percentage of echo responses with duplicated headers.
    #[arg(long = "ep-headers", allow_negative_numbers = true)]
    pub headers: Option<i64>,

    /// Latency added to every request.
    #[arg(long = "ep-duration")]
    pub latency: Option<String>,

    /// Turn next-hop failures into successful responses.
    #[arg(long = "ep-handle-failures", num_args = 0..=1, default_missing_value = "true")]
    pub handle_failures: Option<bool>,

    #[arg(long)]
    pub log_level: Option<String>,

    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Expose Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_address: Option<String>,

    /// Full address, including URI, of the Zipkin HTTP collector.
    #[arg(long)]
    pub zipkin_reporter_endpoint: Option<String>,

    #[arg(long = "zipkin-local-servicename")]
    pub zipkin_local_service_name: Option<String>,

    /// Local ip:port to report.
    #[arg(long)]
    pub zipkin_local_hostport: Option<String>,

    /// Do not use Zipkin RPC shared spans.
    #[arg(long = "zipkin-singlehost-spans", num_args = 0..=1, default_missing_value = "true")]
    pub zipkin_single_host_spans: Option<bool>,

    /// Between never (0.0) and always (1.0), smallest increment 0.0001.
    #[arg(long)]
    pub zipkin_sample_rate: Option<f64>,

    /// Full address, including URI, of the SkyWalking OAP HTTP receiver.
    #[arg(long)]
    pub skywalking_reporter_endpoint: Option<String>,

    #[arg(long = "skywalking-local-servicename")]
    pub skywalking_local_service_name: Option<String>,

    #[arg(long = "skywalking-local-serviceinstancename")]
    pub skywalking_local_instance_name: Option<String>,

    #[arg(long)]
    pub skywalking_sample_rate: Option<f64>,
}

impl Cli {
    /// Overlay every flag that was given onto `config`.
    pub fn apply(self, config: &mut ServiceConfig) {
        if let Some(v) = self.service_name.filter(|v| !v.is_empty()) {
            config.service_name = v;
        }
        if let Some(v) = self.instance_name.filter(|v| !v.is_empty()) {
            config.instance_name = Some(v);
        }
        if let Some(v) = self.listen_address {
            config.listener.bind_address = v;
        }
        if let Some(v) = self.observability_instrumenter {
            config.tracing.instrumenter = v;
        }

        let behavior = &mut config.behavior;
        if let Some(v) = self.errors {
            behavior.errors = v;
        }
        if let Some(v) = self.headers {
            behavior.headers = v;
        }
        if let Some(v) = self.latency {
            behavior.latency = v;
        }
        if let Some(v) = self.handle_failures {
            behavior.handle_failures = v;
        }

        let observability = &mut config.observability;
        if let Some(v) = self.log_level {
            observability.log_level = v;
        }
        if let Some(v) = self.log_format {
            observability.log_format = v;
        }
        if let Some(v) = self.metrics_address {
            observability.metrics_address = v;
            observability.metrics_enabled = true;
        }

        let zipkin = &mut config.tracing.zipkin;
        if let Some(v) = self.zipkin_reporter_endpoint {
            zipkin.reporter_endpoint = v;
        }
        if let Some(v) = self.zipkin_local_service_name {
            zipkin.local_service_name = Some(v);
        }
        if let Some(v) = self.zipkin_local_hostport {
            zipkin.local_hostport = Some(v);
        }
        if let Some(v) = self.zipkin_single_host_spans {
            zipkin.single_host_spans = v;
        }
        if let Some(v) = self.zipkin_sample_rate {
            zipkin.sample_rate = v;
        }

        let skywalking = &mut config.tracing.skywalking;
        if let Some(v) = self.skywalking_reporter_endpoint {
            skywalking.reporter_endpoint = v;
        }
        if let Some(v) = self.skywalking_local_service_name {
            skywalking.local_service_name = Some(v);
        }
        if let Some(v) = self.skywalking_local_instance_name {
            skywalking.local_instance_name = Some(v);
        }
        if let Some(v) = self.skywalking_sample_rate {
            skywalking.sample_rate = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_use_original_names() {
        let cli = Cli::try_parse_from([
            "topology-tester",
            "-a",
            ":9000",
            "--observability-instrumenter",
            "skywalking",
            "--ep-errors",
            "30",
            "--ep-duration",
            "20ms",
            "--ep-handle-failures",
            "--zipkin-singlehost-spans",
            "false",
            "--skywalking-local-serviceinstancename",
            "pod-1",
        ])
        .unwrap();

        let mut config = ServiceConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.listener.bind_address, ":9000");
        assert_eq!(config.tracing.instrumenter, "skywalking");
        assert_eq!(config.behavior.errors, 30);
        assert_eq!(config.behavior.latency, "20ms");
        assert!(config.behavior.handle_failures);
        assert!(!config.tracing.zipkin.single_host_spans);
        assert_eq!(config.tracing.skywalking.local_instance_name.as_deref(), Some("pod-1"));
    }

    #[test]
    fn test_absent_flags_leave_config_untouched() {
        let mut config = ServiceConfig::default();
        config.behavior.headers = 40;
        Cli::default().apply(&mut config);
        assert_eq!(config.behavior.headers, 40);
        assert_eq!(config.service_name, "demosvc");
    }

    #[test]
    fn test_metrics_address_enables_metrics() {
        let cli = Cli::try_parse_from(["topology-tester", "--metrics-address", "127.0.0.1:9100"]).unwrap();
        let mut config = ServiceConfig::default();
        cli.apply(&mut config);
        assert!(config.observability.metrics_enabled);
        assert_eq!(config.observability.metrics_address, "127.0.0.1:9100");
    }
}
