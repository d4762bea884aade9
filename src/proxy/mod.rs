//! Proxy chaining.
//!
//! # Data Flow
//! ```text
//! GET /proxy/{host}/{rest...}
//!     → directive.rs (split next hop from the remaining path)
//!     → engine.rs (latency, error roll, header rewrite, forward)
//!     → intercept.rs (relay, or absorb a non-200 into an envelope)
//! ```

pub mod directive;
pub mod engine;
pub mod intercept;

pub use directive::ProxyDirective;
pub use engine::{ProxyEngine, Upstream};
pub use intercept::Interception;
