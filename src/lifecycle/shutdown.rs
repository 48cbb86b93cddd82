//! Graceful shutdown of the API server.
//!
//! # Data Flow
//! ```text
//! SIGINT / SIGTERM → signals::wait_for_shutdown
//!     → Shutdown::trigger
//!     → every subscribed receiver (HTTP server drains and stops)
//! ```

use std::future::Future;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Fan-out of a single stop request to every server task.
#[derive(Debug, Clone)]
pub struct Shutdown {
    /// Sender side; receivers come from `subscribe`.
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a coordinator with no subscribers.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Receiver that resolves once `trigger` is called.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Ask every subscriber to stop. A no-op when nobody listens.
    pub fn trigger(&self) {
        if self.tx.send(()).is_err() {
            tracing::debug!("Shutdown triggered with no subscribers");
        }
    }

    /// Trigger once `stop` resolves, from a background task.
    pub fn trigger_on<F>(&self, stop: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.clone();
        tokio::spawn(async move {
            stop.await;
            shutdown.trigger();
        })
    }

    /// Tasks still holding a receiver.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
