//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, logging, server span)
//!     → handlers.rs (policy setters, crash, local work, proxy, echo)
//!     → response.rs (JSON envelope, pretty-printed)
//!     → Send to client
//! ```

pub mod handlers;
pub mod headers;
pub mod response;
pub mod server;

pub use response::{Envelope, Responder};
pub use server::{AppState, HttpServer};
