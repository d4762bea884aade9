//! Process-wide holder of the runtime fault policy.
//!
//! Handlers take one [`RuntimeBehavior`] snapshot per request so a request
//! never observes a mix of old and new values. Setters validate first and
//! only then swap the value in; a rejected update leaves the policy as it was.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::behavior::duration::{format_duration, parse_duration};
use crate::behavior::policy::{parse_flag, Percentage, RuntimeBehavior};
use crate::error::ErrorCode;

/// Shared, mutable fault policy.
#[derive(Debug, Default)]
pub struct BehaviorStore {
    inner: RwLock<RuntimeBehavior>,
}

impl BehaviorStore {
    pub fn new(initial: RuntimeBehavior) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    /// Consistent copy of all four values.
    pub fn snapshot(&self) -> RuntimeBehavior {
        *self.read()
    }

    pub fn set_error_percent(&self, raw: &str) -> Result<String, ErrorCode> {
        let percent: Percentage = raw.parse()?;
        self.write().error_percent = percent;
        Ok(format!("errors percentage set to: {percent}%"))
    }

    pub fn set_duplicate_header_percent(&self, raw: &str) -> Result<String, ErrorCode> {
        let percent: Percentage = raw.parse()?;
        self.write().duplicate_header_percent = percent;
        Ok(format!("double headers percentage set to: {percent}%"))
    }

    pub fn set_latency(&self, raw: &str) -> Result<String, ErrorCode> {
        let latency = parse_duration(raw)?;
        self.write().latency = latency;
        Ok(format!("duration set to: {}", format_duration(latency)))
    }

    pub fn set_absorb_failures(&self, raw: &str) -> Result<String, ErrorCode> {
        let absorb = parse_flag(raw)?;
        self.write().absorb_failures = absorb;
        Ok(format!("handle failures set to: {absorb}"))
    }

    // Every field is Copy and written in a single assignment, so a poisoned
    // lock still holds a coherent value.
    fn read(&self) -> RwLockReadGuard<'_, RuntimeBehavior> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RuntimeBehavior> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
