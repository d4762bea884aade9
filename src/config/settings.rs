//! Validated, typed configuration.

use std::net::SocketAddr;
use std::time::Duration;

use crate::behavior::RuntimeBehavior;
use crate::instrument::skywalking::SkywalkingSettings;
use crate::instrument::zipkin::ZipkinSettings;
use crate::instrument::{BackendKind, Candidate};

/// Everything a node needs to start, after validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub service_name: String,
    pub instance_name: String,
    /// Normalised `host:port`; a bare `:port` becomes `0.0.0.0:port`.
    pub bind_address: String,
    pub behavior: RuntimeBehavior,
    pub crash_delay: Duration,
    /// Prometheus listener, when enabled.
    pub metrics_address: Option<SocketAddr>,
    pub instrumenter: BackendKind,
    pub zipkin: ZipkinSettings,
    pub skywalking: SkywalkingSettings,
}

impl Settings {
    /// Backends the instrumenter may choose from. Only the selected one is
    /// started.
    pub fn candidates(&self) -> Vec<Candidate> {
        vec![
            Candidate::Zipkin(self.zipkin.clone()),
            Candidate::Skywalking(self.skywalking.clone()),
        ]
    }
}
