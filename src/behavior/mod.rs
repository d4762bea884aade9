//! Runtime fault policy.
//!
//! # Data Flow
//! ```text
//! startup flags / config file
//!     → RuntimeBehavior (initial values)
//!     → BehaviorStore
//!
//! GET /errors/{p}, /headers/{p}, /latency/{d}, /graceful/{b}
//!     → policy.rs / duration.rs (parse + validate)
//!     → store.rs (atomic swap on success, unchanged on failure)
//!
//! every echo / proxy request
//!     → BehaviorStore::snapshot() once, then sleep → roll → act
//! ```

pub mod duration;
pub mod policy;
pub mod store;

pub use duration::{format_duration, parse_duration};
pub use policy::{parse_flag, Percentage, RuntimeBehavior};
pub use store::BehaviorStore;
