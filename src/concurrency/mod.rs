//! Local work emulation.
//!
//! Runs a fixed batch of timed work units, each in its own child span of the
//! request's server span, to produce recognisable in-process span shapes.
//!
//! The batch runs on its own task. A caller that goes away (client
//! disconnect) stops waiting but does not cut the work short, so every unit
//! span still finishes.

use std::str::FromStr;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::behavior::format_duration;
use crate::error::ErrorCode;
use crate::instrument::skywalking::SegmentHold;
use crate::instrument::span::FinishOnDrop;
use crate::instrument::{Scope, Tracer};

/// Number of work units per emulation run.
pub const WORK_UNITS: usize = 8;

/// How the work units are scheduled relative to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyMode {
    /// One after another.
    Serial,
    /// Even-indexed units run concurrently while odd-indexed ones run in order.
    Mixed,
    /// All at once.
    Parallel,
}

impl FromStr for ConcurrencyMode {
    type Err = ErrorCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "serial" => Ok(ConcurrencyMode::Serial),
            "mixed" => Ok(ConcurrencyMode::Mixed),
            "parallel" => Ok(ConcurrencyMode::Parallel),
            _ => Err(ErrorCode::InvalidConcurrencyMode),
        }
    }
}

/// Run [`WORK_UNITS`] units of `duration` each. Returns once every unit,
/// including the concurrent ones, has finished.
pub async fn emulate(tracer: &Tracer, scope: &Scope, mode: ConcurrencyMode, duration: Duration) {
    let hold = scope.span().hold();
    let batch = tokio::spawn(run_batch(tracer.clone(), scope.clone(), mode, duration, hold));
    if let Err(e) = batch.await {
        tracing::warn!(error = %e, "Local work batch did not complete");
    }
}

async fn run_batch(
    tracer: Tracer,
    scope: Scope,
    mode: ConcurrencyMode,
    duration: Duration,
    _hold: Option<SegmentHold>,
) {
    let mut concurrent = JoinSet::new();
    for index in 0..WORK_UNITS {
        let unit = work_unit(tracer.clone(), scope.clone(), index, duration);
        let spawn = match mode {
            ConcurrencyMode::Serial => false,
            ConcurrencyMode::Parallel => true,
            ConcurrencyMode::Mixed => index % 2 == 0,
        };
        if spawn {
            concurrent.spawn(unit);
        } else {
            unit.await;
        }
    }
    while let Some(result) = concurrent.join_next().await {
        if let Err(e) = result {
            tracing::warn!(error = %e, "Work unit did not complete");
        }
    }
}

async fn work_unit(tracer: Tracer, parent: Scope, index: usize, duration: Duration) {
    let scope = tracer.start_span(&parent, &format!("proc-{index}"));
    let span = FinishOnDrop(scope.span().clone());
    span.0.tag("duration", &format_duration(duration));
    tokio::time::sleep(duration).await;
}
