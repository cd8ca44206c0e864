use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use wordtree_common::transport::Receiver;

use super::processor::ProcessorHandle;
use super::task::TaskFactory;

/// Moves values from one [`Receiver`] into a processor.
///
/// Each iteration polls the receiver (bounded by its poll timeout) and
/// forwards the result, empty polls included, so the loop re-checks its
/// liveness flag at least once per poll timeout.
pub struct Poller {
    live: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    /// Starts polling `receiver`, wrapping every value with `wrap` before
    /// submitting it to `processor`.
    ///
    /// # Arguments
    ///
    /// * `receiver` - The endpoint to drain; it may be shared with other pollers
    /// * `processor` - Where wrapped values are submitted, empty polls included
    /// * `wrap` - Turns a received value into the processor's input
    pub fn spawn<T, F, W>(receiver: Arc<Receiver<T>>, processor: ProcessorHandle<F>, wrap: W) -> Self
    where
        T: DeserializeOwned + Send + 'static,
        F: TaskFactory,
        W: Fn(T) -> F::Input + Send + 'static,
    {
        let (live, live_rx) = watch::channel(true);

        let worker = tokio::spawn(async move {
            let addr = receiver.local_addr();
            while *live_rx.borrow() {
                let value = receiver.poll().await;
                processor.submit(value.map(&wrap));
            }
            debug!("Poller for {} stopped", addr);
        });

        Self {
            live,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Stops the loop; returns once the current poll has finished.
    pub async fn shutdown(&self) {
        self.live.send_replace(false);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("Poller ended abnormally: {}", e);
            }
        }
    }
}
