use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use wordtree_common::TransportConfig;

use super::task::{Task, TaskFactory};

/// Cloneable submission side of a [`Processor`].
///
/// Pollers hold one of these; the processor itself owns the queue and the
/// pool.
pub struct ProcessorHandle<F: TaskFactory> {
    factory: Arc<F>,
    queue: mpsc::UnboundedSender<F::Task>,
}

impl<F: TaskFactory> Clone for ProcessorHandle<F> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            queue: self.queue.clone(),
        }
    }
}

impl<F: TaskFactory> ProcessorHandle<F> {
    /// Builds a task for `input` and queues it.
    ///
    /// `None` is ignored, which lets a poller forward empty polls unchanged.
    /// Returns whether a task was queued; after shutdown nothing is.
    pub fn submit(&self, input: Option<F::Input>) -> bool {
        let Some(input) = input else {
            return false;
        };

        let task = self.factory.new_task(input);
        self.queue.send(task).is_ok()
    }
}

/// Runs the tasks built by one [`TaskFactory`] on a bounded pool.
///
/// The dispatch loop polls the task queue with the configured poll timeout,
/// re-checks liveness between polls, and runs each task on the blocking pool
/// under one of `pool_size` permits.
pub struct Processor<F: TaskFactory> {
    handle: ProcessorHandle<F>,
    live: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<F: TaskFactory> Processor<F> {
    /// Starts the dispatch loop. Must be called from within a tokio runtime.
    pub fn spawn(factory: F, config: &TransportConfig) -> Self {
        let (queue, tasks) = mpsc::unbounded_channel();
        let (live, live_rx) = watch::channel(true);

        let worker = tokio::spawn(run_tasks::<F>(
            tasks,
            live_rx,
            Arc::new(Semaphore::new(config.pool_size)),
            config.pool_size,
            config.poll_timeout,
        ));

        Self {
            handle: ProcessorHandle {
                factory: Arc::new(factory),
                queue,
            },
            live,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// A cloneable handle that submits to this processor.
    pub fn handle(&self) -> ProcessorHandle<F> {
        self.handle.clone()
    }

    #[cfg(test)]
    fn factory(&self) -> &F {
        &self.handle.factory
    }

    /// Same as [`ProcessorHandle::submit`].
    pub fn submit(&self, input: Option<F::Input>) -> bool {
        self.handle.submit(input)
    }

    /// Stops the loop after the tasks already queued have run, and waits for
    /// every running task to finish.
    pub async fn shutdown(&self) {
        self.live.send_replace(false);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("Processor loop ended abnormally: {}", e);
            }
        }
    }
}

async fn run_tasks<F: TaskFactory>(
    mut tasks: mpsc::UnboundedReceiver<F::Task>,
    live: watch::Receiver<bool>,
    pool: Arc<Semaphore>,
    pool_size: usize,
    poll_timeout: Duration,
) {
    loop {
        if !*live.borrow() {
            break;
        }

        match tokio::time::timeout(poll_timeout, tasks.recv()).await {
            Ok(Some(task)) => {
                if !dispatch(task, &pool).await {
                    break;
                }
            }
            // Every handle is gone, nothing can arrive any more
            Ok(None) => break,
            Err(_) => continue,
        }
    }

    // Run what was queued before shutdown
    tasks.close();
    while let Some(task) = tasks.recv().await {
        if !dispatch(task, &pool).await {
            break;
        }
    }

    if pool.acquire_many(pool_size as u32).await.is_err() {
        error!("Processor pool closed while draining");
    }
    debug!("Processor drained");
}

async fn dispatch<T: Task>(task: T, pool: &Arc<Semaphore>) -> bool {
    let permit = match Arc::clone(pool).acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return false,
    };

    tokio::task::spawn_blocking(move || {
        let _permit = permit;
        task.execute();
    });
    true
}
