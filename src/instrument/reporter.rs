//! Batching span reporter.
//!
//! # Responsibilities
//! - Accept finished spans without blocking the request path
//! - Batch them and POST each batch as a JSON array to a collector
//! - Flush what is pending on shutdown
//!
//! # Design Decisions
//! - Bounded queue; a full queue drops the span with a warning
//! - A batch is flushed when it reaches `max_batch_size` or when
//!   `flush_interval` elapses, whichever comes first
//! - Export failures are logged and the batch is discarded

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use url::Url;

/// Queue and batch sizing for the HTTP reporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    pub max_queue_size: usize,
    pub max_batch_size: usize,
    pub flush_interval: Duration,
    pub export_timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_queue_size: 2_048,
            max_batch_size: 512,
            flush_interval: Duration::from_secs(1),
            export_timeout: Duration::from_secs(10),
        }
    }
}

enum Command<T> {
    Report(T),
    Shutdown(oneshot::Sender<()>),
}

enum Sink<T> {
    Batch(mpsc::Sender<Command<T>>),
    Capture(mpsc::UnboundedSender<T>),
}

/// Hands finished spans (or segments) to a collector.
pub struct Reporter<T> {
    sink: Sink<T>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T> Reporter<T>
where
    T: Serialize + Send + 'static,
{
    /// Reporter exporting to `endpoint`. Spawns the export task, so this
    /// must be called from within a Tokio runtime.
    pub fn http(endpoint: Url, options: BatchOptions) -> Self {
        let (tx, rx) = mpsc::channel(options.max_queue_size.max(1));
        let uploader = Uploader {
            client: reqwest::Client::new(),
            endpoint,
            timeout: options.export_timeout,
        };
        let worker = tokio::spawn(export_loop(rx, uploader, options));
        Self {
            sink: Sink::Batch(tx),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Reporter that forwards every item to the returned receiver.
    pub fn capture() -> (Self, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let reporter = Self {
            sink: Sink::Capture(tx),
            worker: Mutex::new(None),
        };
        (reporter, rx)
    }

    pub fn report(&self, item: T) {
        match &self.sink {
            Sink::Batch(tx) => match tx.try_send(Command::Report(item)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("Span queue full, dropping span");
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!("Reporter closed, dropping span");
                }
            },
            Sink::Capture(tx) => {
                let _ = tx.send(item);
            }
        }
    }

    /// Flush pending items and stop the export task.
    pub async fn close(&self) {
        if let Sink::Batch(tx) = &self.sink {
            let (ack_tx, ack_rx) = oneshot::channel();
            if tx.send(Command::Shutdown(ack_tx)).await.is_ok() {
                let _ = ack_rx.await;
            }
        }
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }
}

impl<T> fmt::Debug for Reporter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.sink {
            Sink::Batch(_) => "batch",
            Sink::Capture(_) => "capture",
        };
        f.debug_struct("Reporter").field("mode", &mode).finish()
    }
}

async fn export_loop<T>(mut rx: mpsc::Receiver<Command<T>>, uploader: Uploader, options: BatchOptions)
where
    T: Serialize + Send + 'static,
{
    let mut batch = Vec::with_capacity(options.max_batch_size);
    let mut ticker = tokio::time::interval(options.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Report(item)) => {
                    batch.push(item);
                    if batch.len() >= options.max_batch_size {
                        uploader.upload(&mut batch).await;
                    }
                }
                Some(Command::Shutdown(ack)) => {
                    uploader.upload(&mut batch).await;
                    let _ = ack.send(());
                    break;
                }
                None => {
                    uploader.upload(&mut batch).await;
                    break;
                }
            },
            _ = ticker.tick() => uploader.upload(&mut batch).await,
        }
    }
}

struct Uploader {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl Uploader {
    async fn upload<T: Serialize>(&self, batch: &mut Vec<T>) {
        if batch.is_empty() {
            return;
        }
        let count = batch.len();
        let request = self
            .client
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .json(&*batch);
        batch.clear();

        match request.send().await.and_then(|r| r.error_for_status()) {
            Ok(_) => tracing::debug!(count, endpoint = %self.endpoint, "Exported spans"),
            Err(e) => tracing::warn!(
                count,
                endpoint = %self.endpoint,
                error = %e,
                "Failed to export spans"
            ),
        }
    }
}
