//! Multi-session broadcast driver
//!
//! The orchestrator owns one [`BroadcastSession`] per node that has relaying
//! work, keyed by that node. Each tick it steps every session in ascending key
//! order and hands every reached node over to that node's own session:
//!
//! 1. A node without a session gets one, seeded with what the relaying session
//!    knows, and starts relaying on the next tick
//! 2. A node that already has a session learns who delivered to it
//!
//! Each node therefore relays with partial knowledge of who already holds the
//! payload, and the broadcast-wide delivery counts show the redundancy.

use std::collections::BTreeMap;
use std::sync::Arc;

use meshcast_logging::spans;
use serde::Serialize;
use tracing::{debug, debug_span, info, warn};

use crate::error::PrecondFailed;
use crate::session::BroadcastSession;
use crate::strategy::PropagationStrategy;
use crate::topology::Topology;
use crate::types::{DeliveryEvent, NodeIndex, Payload};

/// Lifecycle of one orchestrator run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum BroadcastPhase {
    #[default]
    Idle,
    Initiated,
    Ticking,
    Complete,
}

/// Broadcast efficiency statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastStats {
    pub ticks: u64,
    pub deliveries: u64,
    /// Deliveries to a node that already held the payload
    pub redundant_deliveries: u64,
    pub sessions_spawned: u64,
    /// Tick at which the destination first received the payload
    pub destination_reached_at: Option<u64>,
}

/// Drives a broadcast across every node it reaches
#[derive(Debug)]
pub struct BroadcastOrchestrator {
    topology: Arc<Topology>,
    strategy: PropagationStrategy,
    sessions: BTreeMap<NodeIndex, BroadcastSession>,
    delivery_counts: BTreeMap<NodeIndex, u32>,
    endpoints: Option<(NodeIndex, NodeIndex)>,
    phase: BroadcastPhase,
    step_count: u64,
    stats: BroadcastStats,
}

impl BroadcastOrchestrator {
    pub fn new(topology: Arc<Topology>, strategy: PropagationStrategy) -> Self {
        Self {
            topology,
            strategy,
            sessions: BTreeMap::new(),
            delivery_counts: BTreeMap::new(),
            endpoints: None,
            phase: BroadcastPhase::Idle,
            step_count: 0,
            stats: BroadcastStats::default(),
        }
    }

    /// Start a broadcast, replacing any broadcast already running
    pub fn initiate(
        &mut self,
        origin: NodeIndex,
        destination: NodeIndex,
        payload: impl Into<Payload>,
    ) -> Result<(), PrecondFailed> {
        for node in [origin, destination] {
            if !self.topology.contains(node) {
                return Err(PrecondFailed::UnknownNode(node));
            }
        }
        if origin == destination {
            return Err(PrecondFailed::SameEndpoints(origin));
        }
        if self.topology.degree(origin) == 0 {
            return Err(PrecondFailed::IsolatedOrigin(origin));
        }

        if self.phase != BroadcastPhase::Idle {
            debug!(phase = ?self.phase, "Replacing running broadcast");
        }
        self.reset();

        let session = BroadcastSession::start(
            origin,
            destination,
            payload,
            self.strategy,
            Arc::clone(&self.topology),
        );
        self.sessions.insert(origin, session);
        self.delivery_counts.insert(origin, 1);
        self.endpoints = Some((origin, destination));
        self.phase = BroadcastPhase::Initiated;

        info!(
            origin = origin.0,
            destination = destination.0,
            strategy = %self.strategy,
            "Broadcast initiated"
        );
        Ok(())
    }

    /// Advance every session by one hop and return this tick's deliveries
    ///
    /// Event counts are broadcast-wide.
    pub fn tick(&mut self) -> Vec<DeliveryEvent> {
        if self.sessions.is_empty() {
            warn!("No broadcast initiated, ignoring tick");
            return Vec::new();
        }

        self.step_count += 1;
        self.stats.ticks += 1;
        self.phase = BroadcastPhase::Ticking;
        let _span = debug_span!(spans::BROADCAST_TICK, step = self.step_count).entered();

        let keys: Vec<NodeIndex> = self.sessions.keys().copied().collect();
        let mut tick_events = Vec::new();

        for key in keys {
            let Some(session) = self.sessions.get_mut(&key) else {
                continue;
            };
            let events = session.step_once();
            for event in &events {
                session.release(event.node);
            }

            for mut event in events {
                self.hand_over(key, &event);
                self.record(&mut event);
                tick_events.push(event);
            }
        }

        debug!(
            deliveries = tick_events.len(),
            sessions = self.sessions.len(),
            "Tick processed"
        );

        if self.is_complete() {
            self.phase = BroadcastPhase::Complete;
            info!(
                ticks = self.step_count,
                deliveries = self.stats.deliveries,
                redundant = self.stats.redundant_deliveries,
                destination_reached = self.stats.destination_reached_at.is_some(),
                "Broadcast complete"
            );
        }

        tick_events
    }

    /// Route a delivery to the receiving node's session, creating it if needed
    fn hand_over(&mut self, relay: NodeIndex, event: &DeliveryEvent) {
        if let Some(target) = self.sessions.get_mut(&event.node) {
            target.receive(event.from);
            return;
        }

        let Some(child) = self
            .sessions
            .get(&relay)
            .map(|session| session.spawn_relay(event.node, event.from))
        else {
            return;
        };
        debug!(node = event.node.0, from = event.from.0, "Spawning relay session");
        self.sessions.insert(event.node, child);
        self.stats.sessions_spawned += 1;
    }

    fn record(&mut self, event: &mut DeliveryEvent) {
        let count = self.delivery_counts.entry(event.node).or_insert(0);
        *count += 1;
        event.count_after = *count;

        self.stats.deliveries += 1;
        if event.count_after > 1 {
            self.stats.redundant_deliveries += 1;
        }
        if self.destination() == Some(event.node) && self.stats.destination_reached_at.is_none() {
            self.stats.destination_reached_at = Some(self.step_count);
            info!(node = event.node.0, step = self.step_count, "Destination reached");
        }
    }

    /// Discard every session. Safe to call at any time, any number of times.
    pub fn abort(&mut self) {
        if self.phase != BroadcastPhase::Idle {
            info!(step = self.step_count, "Broadcast aborted");
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.sessions.clear();
        self.delivery_counts.clear();
        self.endpoints = None;
        self.phase = BroadcastPhase::Idle;
        self.step_count = 0;
        self.stats = BroadcastStats::default();
    }

    /// Swap in a regenerated topology. Aborts the running broadcast.
    pub fn replace_topology(&mut self, topology: Arc<Topology>) {
        self.abort();
        self.topology = topology;
    }

    /// Strategy used by broadcasts initiated from now on
    pub fn set_strategy(&mut self, strategy: PropagationStrategy) {
        self.strategy = strategy;
    }

    /// Every session has run out of activations
    pub fn is_complete(&self) -> bool {
        !self.sessions.is_empty() && self.sessions.values().all(BroadcastSession::is_complete)
    }

    pub fn phase(&self) -> BroadcastPhase {
        self.phase
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn stats(&self) -> &BroadcastStats {
        &self.stats
    }

    pub fn strategy(&self) -> PropagationStrategy {
        self.strategy
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    pub fn origin(&self) -> Option<NodeIndex> {
        self.endpoints.map(|(origin, _)| origin)
    }

    pub fn destination(&self) -> Option<NodeIndex> {
        self.endpoints.map(|(_, destination)| destination)
    }

    /// Sessions in ascending key order
    pub fn sessions(&self) -> impl Iterator<Item = (NodeIndex, &BroadcastSession)> {
        self.sessions.iter().map(|(key, session)| (*key, session))
    }

    pub fn session(&self, node: NodeIndex) -> Option<&BroadcastSession> {
        self.sessions.get(&node)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Broadcast-wide number of times `node` received the payload
    pub fn delivery_count(&self, node: NodeIndex) -> u32 {
        self.delivery_counts.get(&node).copied().unwrap_or(0)
    }

    pub fn delivery_counts(&self) -> &BTreeMap<NodeIndex, u32> {
        &self.delivery_counts
    }

    /// Number of distinct nodes holding the payload
    pub fn reached_count(&self) -> usize {
        self.delivery_counts.len()
    }

    /// Get a summary of the current state
    pub fn state_summary(&self) -> String {
        let active = self
            .sessions
            .values()
            .filter(|session| !session.is_complete())
            .count();
        format!(
            "Tick {}: {:?}, {} sessions ({} active), {}/{} nodes reached, {} deliveries ({} redundant)",
            self.step_count,
            self.phase,
            self.sessions.len(),
            active,
            self.reached_count(),
            self.topology.len(),
            self.stats.deliveries,
            self.stats.redundant_deliveries
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orchestrator(topology: Topology, strategy: PropagationStrategy) -> BroadcastOrchestrator {
        BroadcastOrchestrator::new(Arc::new(topology), strategy)
    }

    #[test]
    fn test_initiate_preconditions() {
        let mut orch = orchestrator(
            Topology::from_edges(2, &[(0, 1)]).unwrap(),
            PropagationStrategy::Ripple,
        );

        assert_eq!(
            orch.initiate(NodeIndex(1), NodeIndex(1), "x"),
            Err(PrecondFailed::SameEndpoints(NodeIndex(1)))
        );
        assert_eq!(
            orch.initiate(NodeIndex(0), NodeIndex(9), "x"),
            Err(PrecondFailed::UnknownNode(NodeIndex(9)))
        );
        assert_eq!(
            orch.initiate(NodeIndex(3), NodeIndex(0), "x"),
            Err(PrecondFailed::IsolatedOrigin(NodeIndex(3)))
        );
        assert_eq!(orch.phase(), BroadcastPhase::Idle);
        assert_eq!(orch.session_count(), 0);

        orch.initiate(NodeIndex(0), NodeIndex(3), "x").unwrap();
        assert_eq!(orch.phase(), BroadcastPhase::Initiated);
        assert_eq!(orch.session_count(), 1);
        assert_eq!(orch.delivery_count(NodeIndex(0)), 1);
    }

    #[test]
    fn test_tick_without_broadcast_is_noop() {
        let mut orch = orchestrator(Topology::complete(2).unwrap(), PropagationStrategy::Ripple);
        assert!(orch.tick().is_empty());
        assert_eq!(orch.step_count(), 0);
        assert_eq!(orch.phase(), BroadcastPhase::Idle);
        assert!(!orch.is_complete());
    }

    #[test]
    fn test_complete_graph_finishes_in_one_tick() {
        let mut orch = orchestrator(Topology::complete(2).unwrap(), PropagationStrategy::Ripple);
        orch.initiate(NodeIndex(0), NodeIndex(3), "hello").unwrap();

        let events = orch.tick();
        let reached: Vec<usize> = events.iter().map(|e| e.node.0).collect();
        assert_eq!(reached, vec![1, 2, 3]);
        assert!(events.iter().all(|e| e.count_after == 1));
        assert_eq!(orch.session_count(), 4);
        assert!(orch.is_complete());
        assert_eq!(orch.phase(), BroadcastPhase::Complete);
        assert_eq!(orch.stats().destination_reached_at, Some(1));
        assert_eq!(orch.stats().sessions_spawned, 3);
    }

    #[test]
    fn test_children_relay_on_next_tick() {
        // Line 0 - 1 - 2 - 3 on a 2x2 grid
        let mut orch = orchestrator(
            Topology::from_edges(2, &[(0, 1), (1, 2), (2, 3)]).unwrap(),
            PropagationStrategy::Ripple,
        );
        orch.initiate(NodeIndex(0), NodeIndex(3), "hop").unwrap();

        for (step, expected) in [(1, 1), (2, 2), (3, 3)] {
            let events = orch.tick();
            assert_eq!(events.len(), 1, "tick {step}");
            assert_eq!(events[0].node, NodeIndex(expected));
            assert_eq!(events[0].step, step);
        }
        assert!(orch.is_complete());
        assert_eq!(orch.step_count(), 3);
        assert_eq!(orch.stats().redundant_deliveries, 0);
    }

    #[test]
    fn test_concurrent_relays_produce_redundant_deliveries() {
        // Triangle 1-2-3 hanging off 0: 1 and 2 both relay to each other
        // and to 3 without knowing what the other did
        let topology = Topology::from_edges(2, &[(0, 1), (0, 2), (1, 2), (1, 3), (2, 3)]).unwrap();
        let mut orch = orchestrator(topology, PropagationStrategy::Ripple);
        orch.initiate(NodeIndex(0), NodeIndex(3), "dup").unwrap();

        let first = orch.tick();
        assert_eq!(first.len(), 2);

        let second = orch.tick();
        // Both inherited {0, 1, 2} from the origin, so each relays only to 3,
        // unaware the other one does too
        let to_three: Vec<u32> = second
            .iter()
            .filter(|e| e.node == NodeIndex(3))
            .map(|e| e.count_after)
            .collect();
        assert_eq!(to_three, vec![1, 2]);
        assert_eq!(orch.delivery_count(NodeIndex(3)), 2);
        assert_eq!(orch.stats().redundant_deliveries, 1);
        assert!(orch.is_complete());
    }

    #[test]
    fn test_linear_hands_off_one_hop_per_tick() {
        let topology = Topology::from_edges(3, &[(0, 4), (4, 8), (0, 1)]).unwrap();
        let mut orch = orchestrator(topology, PropagationStrategy::Linear);
        orch.initiate(NodeIndex(0), NodeIndex(8), "route").unwrap();

        let events = orch.tick();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].node, NodeIndex(4));
        assert!(orch.session(NodeIndex(0)).unwrap().is_complete());
        assert_eq!(
            orch.session(NodeIndex(4)).unwrap().state().path_head(),
            Some(NodeIndex(4))
        );

        let events = orch.tick();
        assert_eq!(events[0].node, NodeIndex(8));
        assert!(orch.is_complete());
        assert_eq!(
            orch.session(NodeIndex(8)).unwrap().state().path(),
            &[NodeIndex(0), NodeIndex(4), NodeIndex(8)]
        );
    }

    #[test]
    fn test_abort_is_idempotent() {
        let mut orch = orchestrator(Topology::complete(2).unwrap(), PropagationStrategy::Ripple);
        orch.initiate(NodeIndex(0), NodeIndex(3), "x").unwrap();
        orch.tick();

        orch.abort();
        assert_eq!(orch.session_count(), 0);
        assert_eq!(orch.phase(), BroadcastPhase::Idle);
        orch.abort();
        assert_eq!(orch.session_count(), 0);
        assert_eq!(orch.step_count(), 0);
        assert!(orch.delivery_counts().is_empty());
    }

    #[test]
    fn test_initiate_replaces_running_broadcast() {
        let mut orch = orchestrator(Topology::complete(2).unwrap(), PropagationStrategy::Ripple);
        orch.initiate(NodeIndex(0), NodeIndex(3), "first").unwrap();
        orch.tick();

        orch.initiate(NodeIndex(2), NodeIndex(1), "second").unwrap();
        assert_eq!(orch.session_count(), 1);
        assert_eq!(orch.step_count(), 0);
        assert_eq!(orch.origin(), Some(NodeIndex(2)));
        assert_eq!(orch.delivery_count(NodeIndex(3)), 0);
    }

    #[test]
    fn test_state_summary() {
        let mut orch = orchestrator(Topology::complete(2).unwrap(), PropagationStrategy::Ripple);
        orch.initiate(NodeIndex(0), NodeIndex(3), "x").unwrap();
        orch.tick();
        let summary = orch.state_summary();
        assert!(summary.contains("Tick 1"));
        assert!(summary.contains("4/4 nodes reached"));
    }
}
