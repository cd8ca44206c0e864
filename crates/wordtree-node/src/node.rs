use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wordtree_common::protocol::error::{Result, WordTreeError};
use wordtree_common::transport::DeliveryFailure;
use wordtree_common::Payload;

use crate::config::NodeConfig;
use crate::coordination::{Channel, CoordinationFactory, Inbound, NodeContext};
use crate::links::Links;
use crate::network_model::{MembershipEvent, NetworkModel, PortLayout};
use crate::pipeline::{Poller, Processor, ProcessorHandle};
use crate::word_counter::{WordCount, WordCounter};

/// A WordTree node.
///
/// Owns the membership model, the transport endpoints, the coordination
/// processor with one poller per listening port, the local word counter and
/// a maintenance loop. A node without a coordinator is the root.
///
/// # Lifecycle
///
/// 1. [`start`](Self::start) binds the listening ports, starts polling them
///    and, for a worker, sends the join request to the coordinator
/// 2. the tree forms through the handshakes handled by the coordination
///    tasks; the maintenance loop follows port shifts, evicts unreachable
///    workers and expires busy leases
/// 3. [`shutdown`](Self::shutdown) stops everything; it is terminal
///
/// # Example
///
/// ```no_run
/// use std::net::IpAddr;
/// use wordtree_node::{Node, NodeConfig};
///
/// # #[tokio::main]
/// # async fn main() -> wordtree_common::Result<()> {
/// let own: IpAddr = "10.0.0.1".parse()?;
/// let root = Node::start(NodeConfig::default(), own, None)?;
///
/// root.submit_job(vec!["to".into(), "be".into(), "or".into()]);
/// if let Some(counts) = root.poll_result().await {
///     println!("{:?}", counts);
/// }
/// root.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct Node {
    ctx: Arc<NodeContext>,
    processor: Arc<Processor<CoordinationFactory>>,
    attachments: Arc<Attachments>,
    live: watch::Sender<bool>,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    /// Starts a node at `own_addr`, as the root (`coordinator == None`) or as
    /// a worker joining `coordinator`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the configuration is invalid
    /// - `coordinator` is the node's own address
    /// - a listening port cannot be bound
    pub fn start(config: NodeConfig, own_addr: IpAddr, coordinator: Option<IpAddr>) -> Result<Self> {
        config.validate()?;
        if coordinator == Some(own_addr) {
            return Err(WordTreeError::Config(format!(
                "node {} cannot be its own coordinator",
                own_addr
            )));
        }

        let transport = config.transport();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();

        let model = Arc::new(NetworkModel::new(config.base_port, coordinator)?.with_event_sink(events_tx));
        let links = Arc::new(Links::new(own_addr, transport.clone(), failures_tx));
        let counter = Arc::new(WordCounter::spawn(&transport));

        let ctx = Arc::new(NodeContext {
            own_addr,
            config,
            model,
            links,
            counter,
        });

        let processor = Arc::new(Processor::spawn(
            CoordinationFactory::new(Arc::clone(&ctx)),
            &transport,
        ));
        let attachments = Arc::new(Attachments {
            links: Arc::clone(&ctx.links),
            processor: processor.handle(),
            pollers: Mutex::new(HashMap::new()),
        });

        let ports = ctx.model.ports();
        attachments.attach(ports.worker_receive, Channel::Workers)?;
        if let Some(coordinator) = coordinator {
            attachments.attach(ports.coordinator_send, Channel::Coordinator)?;

            info!("Node {} joining {} on port {}", own_addr, coordinator, ports.coordinator_receive);
            ctx.links
                .send(&Payload::Address(own_addr), coordinator, ports.coordinator_receive)?;
        } else {
            info!("Root node {} listening for workers on port {}", own_addr, ports.worker_receive);
        }

        let (live, live_rx) = watch::channel(true);
        let maintenance = Maintenance {
            ctx: Arc::clone(&ctx),
            attachments: Arc::clone(&attachments),
            events: events_rx,
            failures: failures_rx,
        };
        let maintenance = tokio::spawn(maintenance.run(live_rx));

        Ok(Self {
            ctx,
            processor,
            attachments,
            live,
            maintenance: Mutex::new(Some(maintenance)),
        })
    }

    /// The address this node announces and listens on.
    pub fn own_addr(&self) -> IpAddr {
        self.ctx.own_addr
    }

    /// Whether this node has no coordinator.
    pub fn is_root(&self) -> bool {
        self.ctx.model.is_root()
    }

    /// The node's current ports. They change when the node is handed off.
    pub fn ports(&self) -> PortLayout {
        self.ctx.model.ports()
    }

    /// The node's membership model, for inspection.
    pub fn model(&self) -> &Arc<NetworkModel> {
        &self.ctx.model
    }

    /// Injects a job at this node, as if it came from a coordinator.
    ///
    /// Returns false once the node is shut down.
    pub fn submit_job(&self, words: Vec<String>) -> bool {
        self.processor
            .submit(Some(Inbound::new(Channel::Local, Payload::Batch(words))))
    }

    /// Takes the oldest locally computed count, waiting up to the poll
    /// timeout.
    pub async fn poll_result(&self) -> Option<WordCount> {
        self.ctx.counter.poll_result().await
    }

    /// Stops the node.
    ///
    /// Stops listening first, then lets queued coordination tasks finish,
    /// then drains the senders and the counter. Counts already computed stay
    /// available to [`poll_result`](Self::poll_result).
    pub async fn shutdown(&self) {
        self.live.send_replace(false);

        let maintenance = self
            .maintenance
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(maintenance) = maintenance else {
            return;
        };
        if let Err(e) = maintenance.await {
            warn!("Maintenance loop ended abnormally: {}", e);
        }

        self.attachments.detach_all().await;
        self.processor.shutdown().await;
        self.ctx.links.shutdown_all().await;
        self.ctx.counter.shutdown().await;

        info!("Node {} shut down", self.ctx.own_addr);
    }
}

/// The pollers feeding the coordination processor, one per listening port.
struct Attachments {
    links: Arc<Links>,
    processor: ProcessorHandle<CoordinationFactory>,
    pollers: Mutex<HashMap<u16, Poller>>,
}

impl Attachments {
    /// Starts polling `port` (binding it if needed), tagging payloads with
    /// `channel`. Attaching a port twice is a no-op.
    fn attach(&self, port: u16, channel: Channel) -> Result<()> {
        let mut pollers = self.pollers.lock().unwrap_or_else(PoisonError::into_inner);
        if pollers.contains_key(&port) {
            return Ok(());
        }

        let receiver = self.links.receiver(port)?;
        let poller = Poller::spawn(receiver, self.processor.clone(), move |payload| {
            Inbound::new(channel, payload)
        });
        pollers.insert(port, poller);

        debug!("Polling port {} as {:?} channel", port, channel);
        Ok(())
    }

    /// Stops polling `port` and releases it.
    async fn detach(&self, port: u16) {
        let poller = self
            .pollers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&port);

        if let Some(poller) = poller {
            poller.shutdown().await;
        }
        if let Some(receiver) = self.links.remove_receiver(port) {
            receiver.shutdown().await;
        }
    }

    async fn detach_all(&self) {
        let ports: Vec<u16> = self
            .pollers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();

        for port in ports {
            self.detach(port).await;
        }
    }
}

/// Background upkeep of one node.
struct Maintenance {
    ctx: Arc<NodeContext>,
    attachments: Arc<Attachments>,
    events: mpsc::UnboundedReceiver<MembershipEvent>,
    failures: mpsc::UnboundedReceiver<DeliveryFailure>,
}

impl Maintenance {
    async fn run(mut self, mut live: watch::Receiver<bool>) {
        let mut leases = tokio::time::interval(self.ctx.config.maintenance_interval);

        loop {
            tokio::select! {
                changed = live.changed() => {
                    if changed.is_err() || !*live.borrow() {
                        break;
                    }
                }
                Some(event) = self.events.recv() => self.on_event(event).await,
                Some(failure) = self.failures.recv() => self.on_failure(failure),
                _ = leases.tick() => {
                    let released = self.ctx.model.expire_leases(self.ctx.config.busy_lease);
                    if !released.is_empty() {
                        info!("Busy lease expired, {:?} idle again", released);
                    }
                }
            }
        }

        debug!("Maintenance loop of {} stopped", self.ctx.own_addr);
    }

    async fn on_event(&self, event: MembershipEvent) {
        match event {
            MembershipEvent::PortsShifted { previous, current } => {
                self.follow_shift(previous, current).await;
            }
            MembershipEvent::CoordinatorChanged { previous, current } => {
                debug!("Coordinator {:?} -> {}", previous, current);
            }
            MembershipEvent::WorkerRegistered(addr) => {
                debug!("Worker {} registered", addr);
            }
            MembershipEvent::WorkerEvicted(addr) => {
                debug!("Worker {} evicted", addr);
            }
        }
    }

    /// Moves polling to the new listening ports and retires the old
    /// endpoints.
    async fn follow_shift(&self, previous: PortLayout, current: PortLayout) {
        for (port, channel) in [
            (current.coordinator_send, Channel::Coordinator),
            (current.worker_receive, Channel::Workers),
        ] {
            if let Err(e) = self.attachments.attach(port, channel) {
                warn!("Could not listen on port {} after shift: {}", port, e);
            }
        }

        for port in previous.listening() {
            if !current.listening().contains(&port) {
                self.attachments.detach(port).await;
            }
        }

        for port in [previous.coordinator_receive, previous.worker_send] {
            if port != current.coordinator_receive && port != current.worker_send {
                if let Some(sender) = self.ctx.links.remove_sender(port) {
                    sender.shutdown().await;
                }
            }
        }

        info!("Now listening on ports {:?}", current.listening());
    }

    fn on_failure(&self, failure: DeliveryFailure) {
        let model = &self.ctx.model;

        let ports = model.ports();

        if failure.port == ports.worker_send && model.evict(failure.destination) {
            warn!(
                "Worker {} unreachable ({}), evicted",
                failure.destination, failure.reason
            );
        } else if failure.port == ports.worker_send {
            // Only redirect replies go to non-members on worker_send
            if let Some(target) = model.revoke_redirect(failure.destination) {
                warn!(
                    "Redirect of {} to {} not delivered ({}), credit returned",
                    failure.destination, target, failure.reason
                );
            }
        } else if Some(failure.destination) == model.coordinator()
            && failure.port == ports.coordinator_receive
        {
            warn!(
                "Coordinator {} not listening on port {} ({}); a worker must join through the root of the tree",
                failure.destination, failure.port, failure.reason
            );
        } else if Some(failure.destination) == model.coordinator() {
            warn!(
                "Coordinator {} unreachable on port {}: {}",
                failure.destination, failure.port, failure.reason
            );
        } else {
            debug!(
                "Delivery to {}:{} failed: {}",
                failure.destination, failure.port, failure.reason
            );
        }
    }
}
