//! topology-tester: an HTTP node for building observed service topologies.
//!
//! Each instance echoes requests, forwards them along `/proxy/...` chains,
//! emulates local work, and injects latency, errors and malformed headers
//! on demand, all while emitting Zipkin or SkyWalking spans.
//!
//! ```text
//!                     ┌────────────────────────────────────────────────┐
//!   client ──────────▶│ http::server  (request id, logging, server span)│
//!                     │     │                                          │
//!                     │     ├─ policy setters ──▶ behavior::store       │
//!                     │     ├─ /local ──────────▶ concurrency           │
//!                     │     ├─ /proxy ──────────▶ proxy::engine ────────┼──▶ next hop
//!                     │     └─ echo                                    │
//!                     │                                                │
//!                     │  instrument (zipkin | skywalking) ──▶ reporter ─┼──▶ collector
//!                     └────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod behavior;
pub mod config;
pub mod error;
pub mod http;
pub mod proxy;

// Workloads
pub mod concurrency;

// Cross-cutting concerns
pub mod instrument;
pub mod lifecycle;
pub mod observability;

pub use config::{ServiceConfig, Settings};
pub use error::ErrorCode;
pub use http::HttpServer;
pub use instrument::Instrumenter;
pub use lifecycle::Shutdown;
