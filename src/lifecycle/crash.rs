//! Delayed, deliberate process termination.
//!
//! The crash endpoint answers first and terminates later. The delayed task
//! is spawned and never awaited or supervised: once scheduled nothing
//! cancels it, and graceful shutdown does not wait for it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

type Terminator = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone)]
pub struct CrashScheduler {
    delay: Duration,
    terminate: Terminator,
}

impl CrashScheduler {
    /// Scheduler that aborts the process after `delay`.
    pub fn new(delay: Duration) -> Self {
        Self::with_terminator(delay, abort_process)
    }

    /// Scheduler that runs `terminate` instead of aborting.
    pub fn with_terminator(delay: Duration, terminate: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            delay,
            terminate: Arc::new(terminate),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Terminate after the delay with `message`. Must be called from within
    /// a Tokio runtime.
    pub fn schedule(&self, message: String) {
        let delay = self.delay;
        let terminate = Arc::clone(&self.terminate);
        tracing::warn!(delay = ?delay, message = %message, "Crash scheduled");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            terminate(&message);
        });
    }
}

impl fmt::Debug for CrashScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrashScheduler").field("delay", &self.delay).finish_non_exhaustive()
    }
}

fn abort_process(message: &str) {
    tracing::error!(message = %message, "crash requested");
    eprintln!("crash requested: {message}");
    std::process::abort();
}
