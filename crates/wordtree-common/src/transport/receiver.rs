use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::protocol::error::{Result, WordTreeError};
use crate::transport::codec::JsonCodec;
use crate::transport::tcp::TcpTransport;
use crate::transport::TransportConfig;

/// Inbound transport for one local address.
///
/// Accepts connections in the background, reads exactly one frame from each
/// on a bounded pool and publishes the decoded value to an unbounded FIFO.
/// Consumers drain the FIFO with [`poll`](Self::poll), which waits at most
/// the configured poll timeout so that callers can periodically re-check
/// their own liveness.
///
/// Frames that fail to decode as `T` are logged and dropped; they never
/// reach the FIFO.
pub struct Receiver<T> {
    local_addr: SocketAddr,
    poll_timeout: Duration,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<T>>,
    live: watch::Sender<bool>,
    acceptor: Mutex<Option<JoinHandle<()>>>,
}

impl<T> Receiver<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Binds `addr` and starts accepting in the background.
    ///
    /// Binding happens before this returns, so a bind failure is reported to
    /// the caller and a successful return means peers can already connect.
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is in use or cannot be bound.
    pub fn bind(addr: SocketAddr, config: &TransportConfig) -> Result<Self> {
        let std_listener = std::net::TcpListener::bind(addr)
            .map_err(|e| WordTreeError::Connection(format!("Failed to bind {}: {}", addr, e)))?;
        std_listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(std_listener)?;
        let local_addr = listener.local_addr()?;

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (live, live_rx) = watch::channel(true);

        let acceptor = Acceptor {
            listener,
            local_addr,
            io_timeout: config.io_timeout,
            pool_size: config.pool_size,
            pool: Arc::new(Semaphore::new(config.pool_size)),
            inbox: inbox_tx,
        };
        let handle = tokio::spawn(acceptor.run(live_rx));

        info!("Receiver listening on {}", local_addr);

        Ok(Self {
            local_addr,
            poll_timeout: config.poll_timeout,
            inbox: tokio::sync::Mutex::new(inbox_rx),
            live,
            acceptor: Mutex::new(Some(handle)),
        })
    }

    /// The address actually bound (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Takes the oldest received value, waiting up to the poll timeout.
    ///
    /// Returns `None` if nothing arrived in time. Each received value is
    /// returned by exactly one call, even with concurrent pollers.
    pub async fn poll(&self) -> Option<T> {
        let mut inbox = self.inbox.lock().await;
        tokio::time::timeout(self.poll_timeout, inbox.recv())
            .await
            .ok()
            .flatten()
    }

    /// Stops accepting, waits for in-flight reads to finish and releases the
    /// port.
    ///
    /// Values already published stay available to [`poll`](Self::poll).
    pub async fn shutdown(&self) {
        self.live.send_replace(false);

        let handle = self
            .acceptor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Receiver on {} ended abnormally: {}", self.local_addr, e);
            }
            info!("Receiver on {} shut down", self.local_addr);
        }
    }
}

struct Acceptor<T> {
    listener: TcpListener,
    local_addr: SocketAddr,
    io_timeout: Duration,
    pool_size: usize,
    pool: Arc<Semaphore>,
    inbox: mpsc::UnboundedSender<T>,
}

impl<T> Acceptor<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn run(self, mut live: watch::Receiver<bool>) {
        loop {
            // Don't accept more than the pool can read
            let permit = tokio::select! {
                permit = Arc::clone(&self.pool).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = live.wait_for(|live| !*live) => break,
            };

            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                _ = live.wait_for(|live| !*live) => break,
            };

            match accepted {
                Ok((stream, peer)) => {
                    debug!("Accepted connection from {} on {}", peer, self.local_addr);
                    let inbox = self.inbox.clone();
                    let io_timeout = self.io_timeout;
                    tokio::spawn(async move {
                        let _permit = permit;
                        handle_connection(stream, peer, io_timeout, inbox).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection on {}: {}", self.local_addr, e);
                }
            }
        }

        // Close the listening socket first, then let in-flight reads finish
        let Acceptor {
            listener,
            local_addr,
            pool,
            pool_size,
            ..
        } = self;
        drop(listener);

        if pool.acquire_many(pool_size as u32).await.is_err() {
            warn!("Receiver pool on {} closed while draining", local_addr);
        }
        debug!("Receiver on {} drained", local_addr);
    }
}

async fn handle_connection<T>(
    mut stream: TcpStream,
    peer: SocketAddr,
    io_timeout: Duration,
    inbox: mpsc::UnboundedSender<T>,
) where
    T: DeserializeOwned,
{
    let frame = match TcpTransport::read_frame(&mut stream, io_timeout).await {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Failed to read frame from {}: {}", peer, e);
            return;
        }
    };

    match JsonCodec::decode::<T>(&frame) {
        Ok(value) => {
            // The receiving end only disappears when the Receiver is dropped
            let _ = inbox.send(value);
        }
        Err(e) => {
            warn!("Dropping undecodable payload from {}: {}", peer, e);
        }
    }
}
