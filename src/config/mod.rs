//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults → TOML file → SVCNAME/HOSTNAME → flags
//!     → loader.rs + cli.rs (raw ServiceConfig)
//!     → validation.rs (semantic checks, all errors at once)
//!     → Settings (typed, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the fault policy changes at runtime
//!   through HTTP, not through config reloads
//! - All fields have defaults to allow minimal configs

pub mod cli;
pub mod loader;
pub mod schema;
pub mod settings;
pub mod validation;

pub use cli::Cli;
pub use loader::{load, ConfigError};
pub use schema::{LogFormat, ObservabilityConfig, ServiceConfig};
pub use settings::Settings;
pub use validation::{validate_config, ValidationError};
