//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validate config → metrics → tracing backend → bind → serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop accepting → drain requests → flush spans → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//!
//! Crash (crash.rs):
//!     /crash request → unsupervised delayed task → abort
//! ```

pub mod crash;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use crash::CrashScheduler;
pub use shutdown::Shutdown;
pub use startup::StartupError;
