//! The coordination protocol.
//!
//! Every payload a node receives becomes one [`CoordinationTask`]:
//!
//! - an **address** is membership control. From the coordinator side it is a
//!   confirmation (our coordinator's own address, which we acknowledge) or a
//!   redirect (any other address, which we hand off to). From the worker side
//!   it is a join request or the acknowledgement of one.
//! - a **batch** is a job. It is split across idle workers, each fragment is
//!   forwarded down the tree, and the remainder is counted locally.
//!
//! Handshake as seen on the wire (`W` joins `C`):
//!
//! ```text
//! W ──addr(W)──▶ C     join request        (C registers W)
//! W ◀──addr(C)── C     confirmation
//! W ──addr(W)──▶ C     acknowledgement     (C already knows W: no reply)
//! ```
//!
//! A full coordinator answers a join with `addr(T)` for one of its workers
//! `T`; `W` then hands off to `T` and starts the same exchange one level
//! down.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, info, warn};
use wordtree_common::protocol::error::Result;
use wordtree_common::Payload;

use crate::config::NodeConfig;
use crate::links::Links;
use crate::network_model::{Admission, NetworkModel};
use crate::pipeline::{Task, TaskFactory};
use crate::word_counter::WordCounter;

/// Which side of the tree a payload arrived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// From this node's coordinator
    Coordinator,
    /// From one of this node's workers
    Workers,
    /// Injected locally, treated like the coordinator side
    Local,
}

/// A received payload tagged with its channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub channel: Channel,
    pub payload: Payload,
}

impl Inbound {
    pub fn new(channel: Channel, payload: Payload) -> Self {
        Self { channel, payload }
    }
}

/// Everything a coordination task may touch.
pub struct NodeContext {
    pub own_addr: IpAddr,
    pub config: NodeConfig,
    pub model: Arc<NetworkModel>,
    pub links: Arc<Links>,
    pub counter: Arc<WordCounter>,
}

/// One unit of coordination work.
pub enum CoordinationTask {
    Handshake(HandshakeTask),
    Job(JobTask),
}

impl Task for CoordinationTask {
    fn execute(self) {
        let result = match self {
            CoordinationTask::Handshake(task) => task.run(),
            CoordinationTask::Job(task) => task.run(),
        };

        if let Err(e) = result {
            warn!("Coordination task failed: {}", e);
        }
    }
}

pub struct CoordinationFactory {
    ctx: Arc<NodeContext>,
}

impl CoordinationFactory {
    pub fn new(ctx: Arc<NodeContext>) -> Self {
        Self { ctx }
    }
}

impl TaskFactory for CoordinationFactory {
    type Input = Inbound;
    type Task = CoordinationTask;

    fn new_task(&self, inbound: Inbound) -> CoordinationTask {
        let ctx = Arc::clone(&self.ctx);
        match inbound.payload {
            Payload::Address(peer) => CoordinationTask::Handshake(HandshakeTask {
                ctx,
                channel: inbound.channel,
                peer,
            }),
            Payload::Batch(words) => CoordinationTask::Job(JobTask {
                ctx,
                channel: inbound.channel,
                words,
            }),
        }
    }
}

/// Reaction to an address payload.
pub struct HandshakeTask {
    ctx: Arc<NodeContext>,
    channel: Channel,
    peer: IpAddr,
}

impl HandshakeTask {
    fn run(self) -> Result<()> {
        if self.peer == self.ctx.own_addr {
            debug!("Ignoring own address on {:?} channel", self.channel);
            return Ok(());
        }

        match self.channel {
            Channel::Workers => self.admit_worker(),
            Channel::Coordinator | Channel::Local => self.follow_coordinator(),
        }
    }

    /// Worker side: `peer` came from our coordinator.
    fn follow_coordinator(self) -> Result<()> {
        let ctx = &self.ctx;
        let own = Payload::Address(ctx.own_addr);

        match ctx.model.coordinator() {
            None => {
                warn!("Root received coordinator address {}, ignoring", self.peer);
                Ok(())
            }
            Some(coordinator) if coordinator == self.peer => {
                // Confirmation of our join: acknowledge
                debug!("Acknowledging coordinator {}", coordinator);
                let port = ctx.model.ports().coordinator_receive;
                ctx.links.send(&own, coordinator, port)
            }
            Some(previous) => {
                let shift = ctx.model.hand_off(self.peer)?;
                info!(
                    "Redirected from {} to {}, now at depth {}",
                    previous,
                    self.peer,
                    ctx.model.depth()
                );

                // Listen on the new ports before announcing ourselves there
                for port in shift.current.listening() {
                    ctx.links.receiver(port)?;
                }
                ctx.links
                    .send(&own, self.peer, shift.current.coordinator_receive)
            }
        }
    }

    /// Coordinator side: `peer` came from a (prospective) worker.
    fn admit_worker(self) -> Result<()> {
        let ctx = &self.ctx;
        let worker_send = ctx.model.ports().worker_send;

        match ctx.model.admit(self.peer, ctx.config.max_workers_per_branch) {
            Admission::AlreadyKnown => {
                debug!("Worker {} acknowledged", self.peer);
                Ok(())
            }
            Admission::Registered => {
                ctx.links
                    .send(&Payload::Address(ctx.own_addr), self.peer, worker_send)
            }
            Admission::Redirect(target) => {
                ctx.links.send(&Payload::Address(target), self.peer, worker_send)
            }
            Admission::Rejected => {
                warn!("No room for worker {} and nowhere to redirect it", self.peer);
                Ok(())
            }
        }
    }
}

/// Reaction to a batch payload.
pub struct JobTask {
    ctx: Arc<NodeContext>,
    channel: Channel,
    words: Vec<String>,
}

impl JobTask {
    fn run(self) -> Result<()> {
        let ctx = &self.ctx;

        if self.channel == Channel::Workers {
            warn!(
                "Discarding batch of {} words sent up by a worker",
                self.words.len()
            );
            return Ok(());
        }

        let worker_send = ctx.model.ports().worker_send;
        let split = ctx
            .model
            .claim_fragments(self.words, ctx.config.min_fragment_unit);

        info!(
            "Job of {} words: {} fragments forwarded, {} words kept",
            split.total_words(),
            split.assignments.len(),
            split.retained.len()
        );

        for (worker, fragment) in split.assignments {
            let words = fragment.len();
            if let Err(e) = ctx.links.send(&Payload::Batch(fragment), worker, worker_send) {
                warn!("Could not forward {} words to {}: {}", words, worker, e);
                ctx.model.mark_idle(worker);
            }
        }

        if !split.retained.is_empty() {
            ctx.counter.submit(split.retained);
        }

        Ok(())
    }
}
