//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! handlers, proxy engine, middleware
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (request, fault and hop counters)
//!
//! Consumers:
//!     → stdout (text or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! Distributed tracing spans live in [`crate::instrument`]; this module only
//! covers process-local signals.

pub mod logging;
pub mod metrics;
