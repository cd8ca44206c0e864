use std::collections::{HashMap, HashSet, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::protocol::error::{Result, WordTreeError};
use crate::transport::codec::JsonCodec;
use crate::transport::tcp::TcpTransport;
use crate::transport::TransportConfig;

/// Report of a send that could not be completed.
///
/// Senders are fire-and-forget; callers that care about unreachable peers
/// (e.g. to evict them from membership) subscribe with
/// [`Sender::spawn_with_failure_reports`].
#[derive(Debug, Clone)]
pub struct DeliveryFailure {
    pub destination: IpAddr,
    pub port: u16,
    pub reason: String,
}

/// A queued send: an already-encoded frame and where it goes.
struct Outbound {
    destination: IpAddr,
    frame: Vec<u8>,
}

/// Outbound transport for one fixed port.
///
/// `send` only encodes the payload and queues it; a background dispatcher
/// delivers it on a bounded pool. The dispatcher guarantees that at most one
/// connection per destination is open at any time: a request for a
/// destination that is already being served is parked in that destination's
/// deferred queue and released when the active send completes. Nothing spins
/// while a destination is busy.
///
/// Each delivery opens a connection, writes one frame, closes it and then
/// releases the destination whether or not it succeeded. There is no retry.
///
/// # Example
///
/// ```no_run
/// use std::net::IpAddr;
/// use wordtree_common::{Payload, TransportConfig};
/// use wordtree_common::transport::Sender;
///
/// # #[tokio::main]
/// # async fn main() -> wordtree_common::Result<()> {
/// let sender = Sender::spawn(8505, &TransportConfig::default());
/// let dest: IpAddr = "10.0.0.2".parse()?;
/// sender.send(&Payload::batch(["a", "b"]), dest)?;
/// sender.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct Sender {
    port: u16,
    requests: mpsc::UnboundedSender<Outbound>,
    live: watch::Sender<bool>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Sender {
    /// Starts a sender whose connections all target `port`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(port: u16, config: &TransportConfig) -> Self {
        Self::start(port, config, None)
    }

    /// Starts a sender that also reports every failed delivery on `failures`.
    pub fn spawn_with_failure_reports(
        port: u16,
        config: &TransportConfig,
        failures: mpsc::UnboundedSender<DeliveryFailure>,
    ) -> Self {
        Self::start(port, config, Some(failures))
    }

    fn start(
        port: u16,
        config: &TransportConfig,
        failures: Option<mpsc::UnboundedSender<DeliveryFailure>>,
    ) -> Self {
        let (requests, requests_rx) = mpsc::unbounded_channel();
        let (live, live_rx) = watch::channel(true);

        let dispatcher = Dispatcher {
            port,
            io_timeout: config.io_timeout,
            pool: Arc::new(Semaphore::new(config.pool_size)),
            failures,
            active: HashSet::new(),
            deferred: HashMap::new(),
        };
        let handle = tokio::spawn(dispatcher.run(requests_rx, live_rx));

        Self {
            port,
            requests,
            live,
            dispatcher: Mutex::new(Some(handle)),
        }
    }

    /// The remote port every send from this sender connects to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Queues `payload` for delivery to `destination`.
    ///
    /// Never waits on the network. The payload is encoded immediately so a
    /// value that cannot be serialized is rejected here, synchronously.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the payload cannot be serialized
    /// - `Shutdown` if [`shutdown`](Self::shutdown) has been called
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T, destination: IpAddr) -> Result<()> {
        if !*self.live.borrow() {
            return Err(WordTreeError::Shutdown(format!("sender on port {}", self.port)));
        }

        let frame = JsonCodec::encode(payload).map_err(|e| {
            WordTreeError::InvalidArgument(format!("payload is not serializable: {}", e))
        })?;

        self.requests
            .send(Outbound { destination, frame })
            .map_err(|_| WordTreeError::Shutdown(format!("sender on port {}", self.port)))
    }

    /// Stops accepting sends and waits until everything already accepted has
    /// been attempted.
    ///
    /// Blocks the caller until the dispatcher has drained. Do not await it
    /// from a task that the dispatcher itself is waiting on.
    pub async fn shutdown(&self) {
        self.live.send_replace(false);

        let handle = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Sender dispatcher on port {} ended abnormally: {}", self.port, e);
            }
            info!("Sender on port {} shut down", self.port);
        }
    }
}

/// Releases a destination when the send task finishes, even if it panics.
struct ActiveGuard {
    destination: IpAddr,
    done: mpsc::UnboundedSender<IpAddr>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let _ = self.done.send(self.destination);
    }
}

/// State owned by the background dispatch task.
struct Dispatcher {
    port: u16,
    io_timeout: Duration,
    pool: Arc<Semaphore>,
    failures: Option<mpsc::UnboundedSender<DeliveryFailure>>,
    /// Destinations with a connection in flight
    active: HashSet<IpAddr>,
    /// Frames waiting for their destination to become free
    deferred: HashMap<IpAddr, VecDeque<Vec<u8>>>,
}

impl Dispatcher {
    async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<Outbound>,
        mut live: watch::Receiver<bool>,
    ) {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let mut accepting = true;
        let mut closing = false;

        loop {
            tokio::select! {
                request = requests.recv(), if accepting => match request {
                    Some(outbound) => self.dispatch_or_defer(outbound, &done_tx),
                    None => accepting = false,
                },
                Some(destination) = done_rx.recv() => {
                    self.release(destination, &done_tx);
                }
                changed = live.changed(), if !closing => {
                    if changed.is_err() || !*live.borrow() {
                        // Refuse new requests but keep draining what is buffered
                        closing = true;
                        requests.close();
                    }
                }
            }

            if !accepting && self.active.is_empty() {
                break;
            }
        }

        debug!("Sender dispatcher on port {} drained", self.port);
    }

    fn dispatch_or_defer(&mut self, outbound: Outbound, done: &mpsc::UnboundedSender<IpAddr>) {
        let Outbound { destination, frame } = outbound;

        if self.active.contains(&destination) {
            debug!("Destination {} busy on port {}, deferring send", destination, self.port);
            self.deferred.entry(destination).or_default().push_back(frame);
            return;
        }

        self.active.insert(destination);
        self.deliver(destination, frame, done);
    }

    /// Called when the send to `destination` finished: hand it the next
    /// deferred frame, or mark it free.
    fn release(&mut self, destination: IpAddr, done: &mpsc::UnboundedSender<IpAddr>) {
        let next = match self.deferred.get_mut(&destination) {
            Some(queue) => {
                let next = queue.pop_front();
                if queue.is_empty() {
                    self.deferred.remove(&destination);
                }
                next
            }
            None => None,
        };

        match next {
            Some(frame) => self.deliver(destination, frame, done),
            None => {
                self.active.remove(&destination);
            }
        }
    }

    fn deliver(&self, destination: IpAddr, frame: Vec<u8>, done: &mpsc::UnboundedSender<IpAddr>) {
        let guard = ActiveGuard {
            destination,
            done: done.clone(),
        };
        let pool = Arc::clone(&self.pool);
        let failures = self.failures.clone();
        let port = self.port;
        let io_timeout = self.io_timeout;

        tokio::spawn(async move {
            let _guard = guard;
            let _permit = match pool.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            let addr = SocketAddr::new(destination, port);
            match send_frame(addr, &frame, io_timeout).await {
                Ok(()) => debug!("Delivered {} bytes to {}", frame.len(), addr),
                Err(e) => {
                    warn!("Failed to deliver to {}: {}", addr, e);
                    if let Some(failures) = failures {
                        let _ = failures.send(DeliveryFailure {
                            destination,
                            port,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        });
    }
}

/// Connect, write one frame, close.
async fn send_frame(addr: SocketAddr, frame: &[u8], io_timeout: Duration) -> Result<()> {
    let mut stream = TcpTransport::connect(addr, io_timeout).await?;
    TcpTransport::write_frame(&mut stream, frame, io_timeout).await?;
    TcpTransport::close(&mut stream, io_timeout).await
}
