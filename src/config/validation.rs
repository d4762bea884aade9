//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (percentages, sample rates, durations)
//! - Resolve fallbacks (instance name, per-backend service names)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: `&ServiceConfig` → `Result<Settings, Vec<ValidationError>>`

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::behavior::{parse_duration, Percentage, RuntimeBehavior};
use crate::config::schema::{BatchConfig, ServiceConfig};
use crate::config::settings::Settings;
use crate::instrument::sampler::{BoundarySampler, RandomSampler};
use crate::instrument::skywalking::SkywalkingSettings;
use crate::instrument::zipkin::ZipkinSettings;
use crate::instrument::{BackendKind, BatchOptions};

/// A single rejected setting.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ServiceConfig) -> Result<Settings, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let service_name = config.service_name.trim().to_string();
    if service_name.is_empty() {
        errors.push(ValidationError::new("service_name", "is required"));
    }
    let instance_name = config
        .instance_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(&service_name)
        .to_string();

    let bind_address = normalize_listen_address(&config.listener.bind_address).unwrap_or_else(|message| {
        errors.push(ValidationError::new("listener.bind_address", message));
        String::new()
    });

    let behavior = validate_behavior(config, &mut errors);

    let metrics_address = if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => Some(addr),
            Err(e) => {
                errors.push(ValidationError::new("observability.metrics_address", e.to_string()));
                None
            }
        }
    } else {
        None
    };

    let instrumenter = config
        .tracing
        .instrumenter
        .parse::<BackendKind>()
        .map_err(|e| errors.push(ValidationError::new("tracing.instrumenter", e.to_string())))
        .ok();

    let zipkin_cfg = &config.tracing.zipkin;
    let zipkin_endpoint = parse_endpoint("tracing.zipkin.reporter_endpoint", &zipkin_cfg.reporter_endpoint, &mut errors);
    let local_hostport = match zipkin_cfg.local_hostport.as_deref().filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse::<SocketAddr>()
            .map_err(|e| errors.push(ValidationError::new("tracing.zipkin.local_hostport", e.to_string())))
            .ok(),
        None => None,
    };
    if let Err(e) = BoundarySampler::new(zipkin_cfg.sample_rate, 0) {
        errors.push(ValidationError::new("tracing.zipkin.sample_rate", e.to_string()));
    }

    let skywalking_cfg = &config.tracing.skywalking;
    let skywalking_endpoint = parse_endpoint(
        "tracing.skywalking.reporter_endpoint",
        &skywalking_cfg.reporter_endpoint,
        &mut errors,
    );
    if let Err(e) = RandomSampler::new(skywalking_cfg.sample_rate) {
        errors.push(ValidationError::new("tracing.skywalking.sample_rate", e.to_string()));
    }

    let (Some(instrumenter), Some(zipkin_endpoint), Some(skywalking_endpoint)) =
        (instrumenter, zipkin_endpoint, skywalking_endpoint)
    else {
        return Err(errors);
    };
    if !errors.is_empty() {
        return Err(errors);
    }

    let zipkin = ZipkinSettings {
        service_name: fallback(&zipkin_cfg.local_service_name, &service_name),
        local_hostport,
        single_host_spans: zipkin_cfg.single_host_spans,
        sample_rate: zipkin_cfg.sample_rate,
        reporter_endpoint: zipkin_endpoint,
        batch: batch_options(&zipkin_cfg.batch),
    };
    let skywalking = SkywalkingSettings {
        service_name: fallback(&skywalking_cfg.local_service_name, &service_name),
        instance_name: fallback(&skywalking_cfg.local_instance_name, &instance_name),
        sample_rate: skywalking_cfg.sample_rate,
        reporter_endpoint: skywalking_endpoint,
        batch: batch_options(&skywalking_cfg.batch),
    };

    Ok(Settings {
        service_name,
        instance_name,
        bind_address,
        behavior,
        crash_delay: Duration::from_secs(config.behavior.crash_delay_secs),
        metrics_address,
        instrumenter,
        zipkin,
        skywalking,
    })
}

fn validate_behavior(config: &ServiceConfig, errors: &mut Vec<ValidationError>) -> RuntimeBehavior {
    let raw = &config.behavior;
    let mut behavior = RuntimeBehavior {
        absorb_failures: raw.handle_failures,
        ..RuntimeBehavior::default()
    };
    match Percentage::new(raw.errors) {
        Ok(p) => behavior.error_percent = p,
        Err(code) => errors.push(ValidationError::new("behavior.errors", code.to_string())),
    }
    match Percentage::new(raw.headers) {
        Ok(p) => behavior.duplicate_header_percent = p,
        Err(code) => errors.push(ValidationError::new("behavior.headers", code.to_string())),
    }
    match parse_duration(&raw.latency) {
        Ok(d) => behavior.latency = d,
        Err(code) => errors.push(ValidationError::new("behavior.latency", code.to_string())),
    }
    behavior
}

/// Accept `host:port` or `:port`, returning a bindable `host:port`.
fn normalize_listen_address(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("is required".to_string());
    }
    let (host, port) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("{raw:?} is missing a port"))?;
    port.parse::<u16>()
        .map_err(|_| format!("{raw:?} has an invalid port"))?;
    if host.is_empty() {
        Ok(format!("0.0.0.0:{port}"))
    } else {
        Ok(raw.to_string())
    }
}

fn parse_endpoint(field: &'static str, raw: &str, errors: &mut Vec<ValidationError>) -> Option<Url> {
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
        Ok(url) => {
            errors.push(ValidationError::new(field, format!("unsupported scheme {:?}", url.scheme())));
            None
        }
        Err(e) => {
            errors.push(ValidationError::new(field, e.to_string()));
            None
        }
    }
}

fn fallback(value: &Option<String>, default: &str) -> String {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
        .to_string()
}

fn batch_options(raw: &BatchConfig) -> BatchOptions {
    BatchOptions {
        max_queue_size: raw.max_queue_size,
        max_batch_size: raw.max_batch_size.max(1),
        flush_interval: Duration::from_millis(raw.flush_interval_ms.max(1)),
        export_timeout: Duration::from_secs(raw.export_timeout_secs.max(1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = validate_config(&ServiceConfig::default()).unwrap();
        assert_eq!(settings.service_name, "demosvc");
        assert_eq!(settings.instance_name, "demosvc");
        assert_eq!(settings.bind_address, "0.0.0.0:8000");
        assert_eq!(settings.instrumenter, BackendKind::Zipkin);
        assert_eq!(settings.zipkin.service_name, "demosvc");
        assert!(settings.metrics_address.is_none());
    }

    #[test]
    fn test_all_errors_are_reported() {
        let mut config = ServiceConfig::default();
        config.listener.bind_address = "localhost".to_string();
        config.behavior.errors = 150;
        config.behavior.latency = "-1s".to_string();
        config.tracing.instrumenter = "jaeger".to_string();
        config.tracing.zipkin.sample_rate = 0.00001;
        config.tracing.skywalking.reporter_endpoint = "not a url".to_string();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "behavior.errors",
                "behavior.latency",
                "tracing.instrumenter",
                "tracing.zipkin.sample_rate",
                "tracing.skywalking.reporter_endpoint",
            ]
        );
    }

    #[test]
    fn test_boot_behavior_is_typed() {
        let mut config = ServiceConfig::default();
        config.behavior.errors = 10;
        config.behavior.headers = 100;
        config.behavior.latency = "60".to_string();
        config.behavior.handle_failures = true;

        let behavior = validate_config(&config).unwrap().behavior;
        assert_eq!(behavior.error_percent.get(), 10);
        assert_eq!(behavior.duplicate_header_percent, Percentage::ALWAYS);
        assert_eq!(behavior.latency, Duration::from_millis(60));
        assert!(behavior.absorb_failures);
    }

    #[test]
    fn test_instance_name_falls_back_to_service_name() {
        let mut config = ServiceConfig::default();
        config.service_name = "svc-a".to_string();
        config.instance_name = Some("  ".to_string());
        let settings = validate_config(&config).unwrap();
        assert_eq!(settings.instance_name, "svc-a");
        assert_eq!(settings.skywalking.instance_name, "svc-a");

        config.tracing.skywalking.local_instance_name = Some("pod-7".to_string());
        assert_eq!(validate_config(&config).unwrap().skywalking.instance_name, "pod-7");
    }

    #[test]
    fn test_listen_address_forms() {
        assert_eq!(normalize_listen_address(":8000").unwrap(), "0.0.0.0:8000");
        assert_eq!(normalize_listen_address("127.0.0.1:0").unwrap(), "127.0.0.1:0");
        assert!(normalize_listen_address("127.0.0.1").is_err());
        assert!(normalize_listen_address(":http").is_err());
    }
}
