use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::debug;
use wordtree_common::protocol::error::{Result, WordTreeError};
use wordtree_common::transport::{DeliveryFailure, Receiver, Sender};
use wordtree_common::{Payload, TransportConfig};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The transport endpoints of one node, keyed by port.
///
/// Senders and receivers are created on first use: a sender for every port
/// the node sends on, a receiver bound to the node's own address for every
/// port it listens on. All senders report failed deliveries on the same
/// channel.
pub struct Links {
    own_addr: IpAddr,
    transport: TransportConfig,
    failures: mpsc::UnboundedSender<DeliveryFailure>,
    senders: Mutex<HashMap<u16, Arc<Sender>>>,
    receivers: Mutex<HashMap<u16, Arc<Receiver<Payload>>>>,
    closed: AtomicBool,
}

impl Links {
    /// Creates an empty registry.
    ///
    /// # Arguments
    ///
    /// * `own_addr` - Address every receiver binds to
    /// * `transport` - Pool size and timeouts for every endpoint
    /// * `failures` - Where all senders report failed deliveries
    pub fn new(
        own_addr: IpAddr,
        transport: TransportConfig,
        failures: mpsc::UnboundedSender<DeliveryFailure>,
    ) -> Self {
        Self {
            own_addr,
            transport,
            failures,
            senders: Mutex::new(HashMap::new()),
            receivers: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(WordTreeError::Shutdown(format!("links of {}", self.own_addr)));
        }
        Ok(())
    }

    /// The sender targeting `port`, started on first use.
    pub fn sender(&self, port: u16) -> Result<Arc<Sender>> {
        self.ensure_open()?;

        let mut senders = lock(&self.senders);
        let sender = senders.entry(port).or_insert_with(|| {
            debug!("Starting sender for port {}", port);
            Arc::new(Sender::spawn_with_failure_reports(
                port,
                &self.transport,
                self.failures.clone(),
            ))
        });
        Ok(Arc::clone(sender))
    }

    /// The receiver listening on `own_addr:port`, bound on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be bound.
    pub fn receiver(&self, port: u16) -> Result<Arc<Receiver<Payload>>> {
        self.ensure_open()?;

        let mut receivers = lock(&self.receivers);
        if let Some(receiver) = receivers.get(&port) {
            return Ok(Arc::clone(receiver));
        }

        let receiver = Arc::new(Receiver::bind(
            SocketAddr::new(self.own_addr, port),
            &self.transport,
        )?);
        receivers.insert(port, Arc::clone(&receiver));
        Ok(receiver)
    }

    /// Queues `payload` for `destination:port`.
    pub fn send(&self, payload: &Payload, destination: IpAddr, port: u16) -> Result<()> {
        debug!("Sending {} to {}:{}", payload.describe(), destination, port);
        self.sender(port)?.send(payload, destination)
    }

    /// Forgets the sender for `port` and returns it so it can be shut down.
    pub fn remove_sender(&self, port: u16) -> Option<Arc<Sender>> {
        lock(&self.senders).remove(&port)
    }

    /// Forgets the receiver for `port` and returns it so it can be shut down.
    pub fn remove_receiver(&self, port: u16) -> Option<Arc<Receiver<Payload>>> {
        lock(&self.receivers).remove(&port)
    }

    /// Refuses new endpoints and shuts every existing one down.
    ///
    /// Senders deliver what they already accepted before this returns.
    pub async fn shutdown_all(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let senders: Vec<_> = lock(&self.senders).drain().map(|(_, s)| s).collect();
        let receivers: Vec<_> = lock(&self.receivers).drain().map(|(_, r)| r).collect();

        join_all(senders.iter().map(|s| s.shutdown())).await;
        join_all(receivers.iter().map(|r| r.shutdown())).await;
    }
}
