use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info};
use wordtree_common::protocol::error::{Result, WordTreeError};

use crate::splitter::{split_job, IdleWorker, JobSplit};

/// Distance between the port namespaces of two adjacent tree levels
pub const PORT_STRIDE: u16 = 2;

/// The four ports a node uses.
///
/// Ports are named after who sends on them, so that a coordinator and its
/// worker agree: a coordinator sends to its workers on its `worker_send`,
/// which is the worker's `coordinator_send`; a worker answers on its
/// `coordinator_receive`, which is the coordinator's `worker_receive`.
///
/// A node therefore listens on `coordinator_send` (payloads from its
/// coordinator) and `worker_receive` (payloads from its workers), and sends
/// on `coordinator_receive` and `worker_send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortLayout {
    pub coordinator_send: u16,
    pub coordinator_receive: u16,
    pub worker_send: u16,
    pub worker_receive: u16,
}

impl PortLayout {
    /// `base`, `base + 1`, `base + 2`, `base + 3`.
    pub fn from_base(base: u16) -> Result<Self> {
        let port = |offset: u16| {
            base.checked_add(offset).ok_or_else(|| {
                WordTreeError::Config(format!("base port {} is too high for a port namespace", base))
            })
        };
        Ok(Self {
            coordinator_send: port(0)?,
            coordinator_receive: port(1)?,
            worker_send: port(2)?,
            worker_receive: port(3)?,
        })
    }

    /// The layout one tree level further down: every port moves by [`PORT_STRIDE`].
    pub fn shifted(&self) -> Result<Self> {
        let base = self
            .coordinator_send
            .checked_add(PORT_STRIDE)
            .ok_or_else(|| WordTreeError::Config("port namespace exhausted".to_string()))?;
        Self::from_base(base)
    }

    /// Ports this node accepts connections on.
    pub fn listening(&self) -> [u16; 2] {
        [self.coordinator_send, self.worker_receive]
    }
}

/// What the membership model reports to whoever subscribed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    WorkerRegistered(IpAddr),
    WorkerEvicted(IpAddr),
    CoordinatorChanged {
        previous: Option<IpAddr>,
        current: IpAddr,
    },
    PortsShifted {
        previous: PortLayout,
        current: PortLayout,
    },
}

/// Outcome of a worker asking to join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The address is already a member; the join was an acknowledgement
    AlreadyKnown,
    /// The address is now a member with capacity 0, idle
    Registered,
    /// The node is full; the joiner should join this member instead
    Redirect(IpAddr),
    /// The node is full and has nowhere to redirect to
    Rejected,
}

/// Old and new layout after a handoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortShift {
    pub previous: PortLayout,
    pub current: PortLayout,
}

/// Snapshot of one member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStatus {
    pub capacity: usize,
    pub busy: bool,
}

#[derive(Debug, Clone, Copy)]
struct WorkerEntry {
    capacity: usize,
    busy_since: Option<Instant>,
}

impl WorkerEntry {
    fn new() -> Self {
        Self {
            capacity: 0,
            busy_since: None,
        }
    }
}

#[derive(Debug)]
struct ModelState {
    workers: BTreeMap<IpAddr, WorkerEntry>,
    coordinator: Option<IpAddr>,
    ports: PortLayout,
    depth: u16,
    /// Joiners redirected to a member, and the member credited for them
    redirects: BTreeMap<IpAddr, IpAddr>,
}

/// Membership and port state of one node.
///
/// Holds the subordinate workers (capacity and idle/busy flag per address),
/// the coordinator address and the current [`PortLayout`]. Every operation
/// takes one lock, so compound changes such as [`hand_off`](Self::hand_off),
/// [`admit`](Self::admit) and [`claim_fragments`](Self::claim_fragments) are
/// atomic with respect to concurrently running coordination tasks.
///
/// Workers are kept in address order, which is the stable order
/// [`idle_workers`](Self::idle_workers) reports them in.
///
/// Changes are published as [`MembershipEvent`]s on an optional channel.
pub struct NetworkModel {
    state: Mutex<ModelState>,
    events: Option<mpsc::UnboundedSender<MembershipEvent>>,
}

impl NetworkModel {
    /// Creates the model for a root (`coordinator == None`) or a worker.
    ///
    /// A worker starts one level below its coordinator, so its namespace is
    /// already shifted once relative to `base_port`.
    pub fn new(base_port: u16, coordinator: Option<IpAddr>) -> Result<Self> {
        let root_ports = PortLayout::from_base(base_port)?;
        let (ports, depth) = match coordinator {
            Some(_) => (root_ports.shifted()?, 1),
            None => (root_ports, 0),
        };

        Ok(Self {
            state: Mutex::new(ModelState {
                workers: BTreeMap::new(),
                coordinator,
                ports,
                depth,
                redirects: BTreeMap::new(),
            }),
            events: None,
        })
    }

    /// Publishes every membership change on `events`.
    pub fn with_event_sink(mut self, events: mpsc::UnboundedSender<MembershipEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn lock(&self) -> MutexGuard<'_, ModelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: MembershipEvent) {
        if let Some(events) = &self.events {
            // Nobody listening is fine
            let _ = events.send(event);
        }
    }

    // ------------------------------------------------------------------
    // Role and ports
    // ------------------------------------------------------------------

    /// Whether this node has no coordinator.
    pub fn is_root(&self) -> bool {
        self.lock().coordinator.is_none()
    }

    /// The node this one reports to, `None` at the root.
    pub fn coordinator(&self) -> Option<IpAddr> {
        self.lock().coordinator
    }

    /// The current port layout. Changes on every hand-off.
    pub fn ports(&self) -> PortLayout {
        self.lock().ports
    }

    /// Number of shifts from the root namespace.
    pub fn depth(&self) -> u16 {
        self.lock().depth
    }

    /// Records a new coordinator without touching the ports.
    ///
    /// Setting the current coordinator again emits nothing.
    pub fn set_coordinator(&self, coordinator: IpAddr) {
        let previous = {
            let mut state = self.lock();
            let previous = state.coordinator.replace(coordinator);
            if previous == Some(coordinator) {
                return;
            }
            previous
        };

        info!("Coordinator changed from {:?} to {}", previous, coordinator);
        self.emit(MembershipEvent::CoordinatorChanged {
            previous,
            current: coordinator,
        });
    }

    /// Moves all four ports down one level.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the new namespace would leave the `u16` range; the
    /// layout is unchanged in that case.
    pub fn shift_ports(&self) -> Result<PortLayout> {
        let shift = {
            let mut state = self.lock();
            Self::shift_locked(&mut state)?
        };

        self.emit(MembershipEvent::PortsShifted {
            previous: shift.previous,
            current: shift.current,
        });
        Ok(shift.current)
    }

    fn shift_locked(state: &mut ModelState) -> Result<PortShift> {
        let previous = state.ports;
        let current = previous.shifted()?;
        state.ports = current;
        state.depth += 1;
        Ok(PortShift { previous, current })
    }

    /// Re-parents this node under `coordinator` and shifts its ports, as one
    /// step.
    ///
    /// Either both changes happen or neither does.
    pub fn hand_off(&self, coordinator: IpAddr) -> Result<PortShift> {
        let (previous_coordinator, shift) = {
            let mut state = self.lock();
            let shift = Self::shift_locked(&mut state)?;
            let previous = state.coordinator.replace(coordinator);
            (previous, shift)
        };

        info!(
            "Handed off from {:?} to {}, ports {:?} -> {:?}",
            previous_coordinator, coordinator, shift.previous, shift.current
        );
        self.emit(MembershipEvent::CoordinatorChanged {
            previous: previous_coordinator,
            current: coordinator,
        });
        self.emit(MembershipEvent::PortsShifted {
            previous: shift.previous,
            current: shift.current,
        });
        Ok(shift)
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Adds `addr` (or resets an existing entry) with capacity 0, idle.
    pub fn register_worker(&self, addr: IpAddr) {
        self.lock().workers.insert(addr, WorkerEntry::new());
        info!("Registered worker {}", addr);
        self.emit(MembershipEvent::WorkerRegistered(addr));
    }

    /// Decides, atomically, what to do with a worker asking to join.
    ///
    /// A node below `max_workers` registers the joiner. A full node redirects
    /// it to the member with the smallest capacity (lowest address on ties)
    /// and counts the joiner towards that member's capacity, until
    /// [`revoke_redirect`](Self::revoke_redirect) takes the credit back.
    ///
    /// # Arguments
    ///
    /// * `addr` - The address the join request announced
    /// * `max_workers` - How many direct members this node accepts
    ///
    /// # Returns
    ///
    /// What the coordinator should answer; see [`Admission`].
    pub fn admit(&self, addr: IpAddr, max_workers: usize) -> Admission {
        let admission = {
            let mut state = self.lock();

            if state.workers.contains_key(&addr) {
                state.redirects.remove(&addr);
                Admission::AlreadyKnown
            } else if state.workers.len() < max_workers {
                state.redirects.remove(&addr);
                state.workers.insert(addr, WorkerEntry::new());
                Admission::Registered
            } else {
                // A joiner asking again is no longer under its earlier target
                if let Some(previous) = state.redirects.remove(&addr) {
                    Self::debit_locked(&mut state, previous);
                }

                // BTreeMap iterates in address order, min_by_key keeps the first minimum
                let target = state
                    .workers
                    .iter_mut()
                    .min_by_key(|(_, entry)| entry.capacity)
                    .map(|(target, entry)| {
                        entry.capacity += 1;
                        *target
                    });
                match target {
                    Some(target) => {
                        state.redirects.insert(addr, target);
                        Admission::Redirect(target)
                    }
                    None => Admission::Rejected,
                }
            }
        };

        match admission {
            Admission::Registered => {
                info!("Registered worker {}", addr);
                self.emit(MembershipEvent::WorkerRegistered(addr));
            }
            Admission::Redirect(target) => {
                info!("Branch full, redirecting {} to {}", addr, target);
            }
            Admission::AlreadyKnown | Admission::Rejected => {}
        }

        admission
    }

    /// Takes back the capacity credited when `joiner` was redirected, for a
    /// joiner that never received the redirect.
    ///
    /// Returns the member that lost the credit, or `None` if `joiner` has no
    /// pending redirect.
    pub fn revoke_redirect(&self, joiner: IpAddr) -> Option<IpAddr> {
        let target = {
            let mut state = self.lock();
            let target = state.redirects.remove(&joiner)?;
            Self::debit_locked(&mut state, target);
            target
        };

        info!("Redirect of {} to {} revoked", joiner, target);
        Some(target)
    }

    /// The member `joiner` was last redirected to, if that redirect is still
    /// pending.
    pub fn redirect_target(&self, joiner: IpAddr) -> Option<IpAddr> {
        self.lock().redirects.get(&joiner).copied()
    }

    fn debit_locked(state: &mut ModelState, target: IpAddr) {
        if let Some(entry) = state.workers.get_mut(&target) {
            entry.capacity = entry.capacity.saturating_sub(1);
        }
    }

    /// Whether `addr` is a direct member.
    pub fn contains(&self, addr: IpAddr) -> bool {
        self.lock().workers.contains_key(&addr)
    }

    /// Number of direct members, busy or idle.
    pub fn worker_count(&self) -> usize {
        self.lock().workers.len()
    }

    /// Snapshot of one member, `None` if `addr` is not a member.
    pub fn worker(&self, addr: IpAddr) -> Option<WorkerStatus> {
        self.lock().workers.get(&addr).map(|entry| WorkerStatus {
            capacity: entry.capacity,
            busy: entry.busy_since.is_some(),
        })
    }

    /// How many nodes below `addr` this node knows of.
    ///
    /// Grows by one for every joiner redirected to `addr`.
    pub fn capacity(&self, addr: IpAddr) -> Option<usize> {
        self.lock().workers.get(&addr).map(|entry| entry.capacity)
    }

    /// Records that `addr` manages one more node. Returns false if unknown.
    pub fn increment_capacity(&self, addr: IpAddr) -> bool {
        match self.lock().workers.get_mut(&addr) {
            Some(entry) => {
                entry.capacity += 1;
                true
            }
            None => false,
        }
    }

    /// Marks `addr` as working on a fragment, starting its busy lease.
    ///
    /// Returns false if `addr` is not a member.
    pub fn mark_busy(&self, addr: IpAddr) -> bool {
        match self.lock().workers.get_mut(&addr) {
            Some(entry) => {
                entry.busy_since = Some(Instant::now());
                true
            }
            None => false,
        }
    }

    /// Returns false if `addr` is not a member.
    pub fn mark_idle(&self, addr: IpAddr) -> bool {
        match self.lock().workers.get_mut(&addr) {
            Some(entry) => {
                entry.busy_since = None;
                true
            }
            None => false,
        }
    }

    /// Idle members in address order.
    pub fn idle_workers(&self) -> Vec<IpAddr> {
        self.lock()
            .workers
            .iter()
            .filter(|(_, entry)| entry.busy_since.is_none())
            .map(|(addr, _)| *addr)
            .collect()
    }

    /// Splits a job across the idle members and marks every member that
    /// received a fragment busy, atomically.
    ///
    /// Two jobs arriving at once therefore never hand a fragment to the same
    /// idle worker.
    ///
    /// # Arguments
    ///
    /// * `words` - The job, consumed left to right
    /// * `unit` - Words per unit of worker capacity
    ///
    /// # Returns
    ///
    /// The fragments per worker and the words this node keeps.
    pub fn claim_fragments(&self, words: Vec<String>, unit: usize) -> JobSplit {
        let mut state = self.lock();

        let idle: Vec<IdleWorker> = state
            .workers
            .iter()
            .filter(|(_, entry)| entry.busy_since.is_none())
            .map(|(addr, entry)| IdleWorker {
                addr: *addr,
                capacity: entry.capacity,
            })
            .collect();

        let split = split_job(words, &idle, unit);

        let now = Instant::now();
        for (addr, _) in &split.assignments {
            if let Some(entry) = state.workers.get_mut(addr) {
                entry.busy_since = Some(now);
            }
        }

        split
    }

    /// Removes a member, together with the redirects credited to it.
    /// Returns false if it was not one.
    pub fn evict(&self, addr: IpAddr) -> bool {
        let removed = {
            let mut state = self.lock();
            let removed = state.workers.remove(&addr).is_some();
            if removed {
                state.redirects.retain(|_, target| *target != addr);
            }
            removed
        };
        if removed {
            info!("Evicted worker {}", addr);
            self.emit(MembershipEvent::WorkerEvicted(addr));
        }
        removed
    }

    /// Returns every member busy for at least `lease` to idle and reports
    /// which ones were released.
    pub fn expire_leases(&self, lease: Duration) -> Vec<IpAddr> {
        let mut state = self.lock();
        let mut released = Vec::new();

        for (addr, entry) in state.workers.iter_mut() {
            if let Some(since) = entry.busy_since {
                if since.elapsed() >= lease {
                    entry.busy_since = None;
                    released.push(*addr);
                }
            }
        }

        if !released.is_empty() {
            debug!("Busy lease expired for {:?}", released);
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn addr(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn words(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("w{}", i)).collect()
    }

    fn root() -> NetworkModel {
        NetworkModel::new(8502, None).unwrap()
    }

    // ========================================================================
    // Ports
    // ========================================================================

    #[test]
    fn test_root_ports_start_at_base() {
        let model = root();
        assert!(model.is_root());
        assert_eq!(
            model.ports(),
            PortLayout {
                coordinator_send: 8502,
                coordinator_receive: 8503,
                worker_send: 8504,
                worker_receive: 8505,
            }
        );
    }

    #[test]
    fn test_worker_ports_match_coordinator_worker_side() {
        let parent = root();
        let child = NetworkModel::new(8502, Some(addr(1))).unwrap();

        assert!(!child.is_root());
        assert_eq!(child.depth(), 1);
        assert_eq!(child.ports().coordinator_send, parent.ports().worker_send);
        assert_eq!(child.ports().coordinator_receive, parent.ports().worker_receive);
    }

    #[test]
    fn test_shift_ports_moves_all_four() {
        let model = root();
        let before = model.ports();

        let once = model.shift_ports().unwrap();
        assert_eq!(once.coordinator_send, before.coordinator_send + 2);
        assert_eq!(once.coordinator_receive, before.coordinator_receive + 2);
        assert_eq!(once.worker_send, before.worker_send + 2);
        assert_eq!(once.worker_receive, before.worker_receive + 2);

        let twice = model.shift_ports().unwrap();
        assert_eq!(twice.worker_receive, before.worker_receive + 4);
        assert_eq!(model.depth(), 2);
    }

    #[test]
    fn test_shift_past_u16_fails_without_change() {
        let model = NetworkModel::new(u16::MAX - 4, None).unwrap();
        let before = model.ports();

        assert!(model.shift_ports().is_err());
        assert_eq!(model.ports(), before);
        assert!(PortLayout::from_base(u16::MAX - 2).is_err());
    }

    #[test]
    fn test_hand_off_is_atomic() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let model = NetworkModel::new(8502, Some(addr(1))).unwrap().with_event_sink(tx);
        let before = model.ports();

        let shift = model.hand_off(addr(9)).unwrap();
        assert_eq!(shift.previous, before);
        assert_eq!(shift.current, before.shifted().unwrap());
        assert_eq!(model.coordinator(), Some(addr(9)));

        assert_eq!(
            rx.try_recv().unwrap(),
            MembershipEvent::CoordinatorChanged {
                previous: Some(addr(1)),
                current: addr(9)
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            MembershipEvent::PortsShifted {
                previous: shift.previous,
                current: shift.current
            }
        );
    }

    #[test]
    fn test_failed_hand_off_keeps_coordinator() {
        let model = NetworkModel::new(u16::MAX - 6, Some(addr(1))).unwrap();

        assert!(model.hand_off(addr(2)).is_err());
        assert_eq!(model.coordinator(), Some(addr(1)));
    }

    // ========================================================================
    // Membership
    // ========================================================================

    #[test]
    fn test_idle_workers_excludes_busy() {
        let model = root();
        model.register_worker(addr(3));
        model.register_worker(addr(2));

        assert_eq!(model.idle_workers(), vec![addr(2), addr(3)]);

        assert!(model.mark_busy(addr(2)));
        assert_eq!(model.idle_workers(), vec![addr(3)]);

        assert!(model.mark_idle(addr(2)));
        assert_eq!(model.idle_workers(), vec![addr(2), addr(3)]);

        assert!(!model.mark_busy(addr(7)));
    }

    #[test]
    fn test_register_resets_entry() {
        let model = root();
        model.register_worker(addr(2));
        model.increment_capacity(addr(2));
        model.mark_busy(addr(2));

        model.register_worker(addr(2));
        assert_eq!(
            model.worker(addr(2)),
            Some(WorkerStatus {
                capacity: 0,
                busy: false
            })
        );
        assert_eq!(model.worker_count(), 1);
    }

    #[test]
    fn test_admit_until_full_then_redirect() {
        let model = root();

        assert_eq!(model.admit(addr(2), 2), Admission::Registered);
        assert_eq!(model.admit(addr(3), 2), Admission::Registered);
        assert_eq!(model.admit(addr(2), 2), Admission::AlreadyKnown);

        // Both have capacity 0: lowest address wins, then capacities even out
        assert_eq!(model.admit(addr(4), 2), Admission::Redirect(addr(2)));
        assert_eq!(model.capacity(addr(2)), Some(1));
        assert_eq!(model.admit(addr(5), 2), Admission::Redirect(addr(3)));
        assert_eq!(model.admit(addr(6), 2), Admission::Redirect(addr(2)));
        assert_eq!(model.capacity(addr(2)), Some(2));

        assert!(!model.contains(addr(4)));
    }

    #[test]
    fn test_revoked_redirect_returns_credit() {
        let model = root();
        model.admit(addr(2), 1);

        assert_eq!(model.admit(addr(4), 1), Admission::Redirect(addr(2)));
        assert_eq!(model.capacity(addr(2)), Some(1));
        assert_eq!(model.redirect_target(addr(4)), Some(addr(2)));

        assert_eq!(model.revoke_redirect(addr(4)), Some(addr(2)));
        assert_eq!(model.capacity(addr(2)), Some(0));

        // Only once, and never for joiners that were not redirected
        assert_eq!(model.revoke_redirect(addr(4)), None);
        assert_eq!(model.revoke_redirect(addr(2)), None);
        assert_eq!(model.capacity(addr(2)), Some(0));
    }

    #[test]
    fn test_repeated_join_moves_redirect_credit() {
        let model = root();
        model.admit(addr(2), 2);
        model.admit(addr(3), 2);

        assert_eq!(model.admit(addr(9), 2), Admission::Redirect(addr(2)));
        // Asking again: the old credit is dropped before a new target is picked
        assert_eq!(model.admit(addr(9), 2), Admission::Redirect(addr(2)));
        assert_eq!(model.capacity(addr(2)), Some(1));
        assert_eq!(model.capacity(addr(3)), Some(0));
    }

    #[test]
    fn test_evicting_target_drops_its_redirects() {
        let model = root();
        model.admit(addr(2), 1);
        model.admit(addr(4), 1);

        assert!(model.evict(addr(2)));
        assert_eq!(model.redirect_target(addr(4)), None);
        assert_eq!(model.revoke_redirect(addr(4)), None);
    }

    #[test]
    fn test_admit_with_no_room_and_no_members_is_rejected() {
        let model = root();
        assert_eq!(model.admit(addr(2), 0), Admission::Rejected);
    }

    #[test]
    fn test_concurrent_admits_never_exceed_limit() {
        let model = Arc::new(root());

        let handles: Vec<_> = (2..40u8)
            .map(|last| {
                let model = Arc::clone(&model);
                std::thread::spawn(move || model.admit(addr(last), 4))
            })
            .collect();

        let registered = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|a| *a == Admission::Registered)
            .count();

        assert_eq!(registered, 4);
        assert_eq!(model.worker_count(), 4);
    }

    #[test]
    fn test_claim_fragments_marks_assigned_busy() {
        let model = root();
        model.register_worker(addr(2));
        model.register_worker(addr(3));
        model.increment_capacity(addr(2));
        model.increment_capacity(addr(2));

        let split = model.claim_fragments(words(10), 2);

        // addr(2) has capacity 2 -> 4 words, addr(3) capacity 0 -> one unit
        assert_eq!(split.assignments[0].0, addr(2));
        assert_eq!(split.assignments[0].1.len(), 4);
        assert_eq!(split.assignments[1].1.len(), 2);
        assert_eq!(split.retained.len(), 4);
        assert!(model.idle_workers().is_empty());

        // Second job finds nobody idle
        let split = model.claim_fragments(words(5), 2);
        assert!(split.assignments.is_empty());
        assert_eq!(split.retained.len(), 5);
    }

    #[test]
    fn test_claim_with_empty_share_leaves_worker_idle() {
        let model = root();
        model.register_worker(addr(2));
        model.register_worker(addr(3));

        let split = model.claim_fragments(words(1), 2);
        assert_eq!(split.assignments.len(), 1);
        assert_eq!(model.idle_workers(), vec![addr(3)]);
    }

    #[test]
    fn test_evict_and_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let model = root().with_event_sink(tx);

        model.register_worker(addr(2));
        assert!(model.evict(addr(2)));
        assert!(!model.evict(addr(2)));

        assert_eq!(rx.try_recv().unwrap(), MembershipEvent::WorkerRegistered(addr(2)));
        assert_eq!(rx.try_recv().unwrap(), MembershipEvent::WorkerEvicted(addr(2)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_expire_leases() {
        let model = root();
        model.register_worker(addr(2));
        model.register_worker(addr(3));
        model.mark_busy(addr(2));

        assert!(model.expire_leases(Duration::from_secs(60)).is_empty());
        assert_eq!(model.expire_leases(Duration::ZERO), vec![addr(2)]);
        assert_eq!(model.idle_workers(), vec![addr(2), addr(3)]);
    }

    #[test]
    fn test_set_coordinator_same_value_is_silent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let model = NetworkModel::new(8502, Some(addr(1))).unwrap().with_event_sink(tx);

        model.set_coordinator(addr(1));
        assert!(rx.try_recv().is_err());

        model.set_coordinator(addr(5));
        assert!(matches!(
            rx.try_recv().unwrap(),
            MembershipEvent::CoordinatorChanged { current, .. } if current == addr(5)
        ));
    }
}
