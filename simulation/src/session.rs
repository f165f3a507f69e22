//! A single broadcast instance
//!
//! [`BroadcastSession`] binds one payload, origin and destination to a
//! [`PropagationStrategy`] and advances it one tick per [`BroadcastSession::step_once`]
//! call. Standalone, a session carries the whole broadcast by itself. Under a
//! [`crate::orchestrator::BroadcastOrchestrator`] each session only relays on
//! behalf of its own node and hands every node it reaches over to that node's
//! session.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use meshcast_logging::spans;
use serde::Serialize;
use tracing::{debug_span, trace};

use crate::strategy::PropagationStrategy;
use crate::topology::Topology;
use crate::types::{Activation, DeliveryEvent, NodeIndex, Payload};

/// Everything needed to resume stepping a broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropagationState {
    payload: Payload,
    origin: NodeIndex,
    destination: NodeIndex,
    /// How many times each node received the payload from this session
    delivery_count: BTreeMap<NodeIndex, u32>,
    /// Nodes eligible to relay during the next tick
    frontier: BTreeSet<NodeIndex>,
    /// Nodes this session knows to hold the payload
    known: BTreeSet<NodeIndex>,
    /// Relay chain from the broadcast origin to the current head
    path: Vec<NodeIndex>,
    step_count: u64,
}

impl PropagationState {
    /// Fresh state: only the origin holds the payload
    pub fn new(origin: NodeIndex, destination: NodeIndex, payload: Payload) -> Self {
        Self {
            payload,
            origin,
            destination,
            delivery_count: BTreeMap::from([(origin, 1)]),
            frontier: BTreeSet::from([origin]),
            known: BTreeSet::from([origin]),
            path: vec![origin],
            step_count: 0,
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn origin(&self) -> NodeIndex {
        self.origin
    }

    pub fn destination(&self) -> NodeIndex {
        self.destination
    }

    pub fn frontier(&self) -> &BTreeSet<NodeIndex> {
        &self.frontier
    }

    /// The single frontier node of a Linear broadcast
    pub fn path_head(&self) -> Option<NodeIndex> {
        self.frontier.first().copied()
    }

    pub fn path(&self) -> &[NodeIndex] {
        &self.path
    }

    /// Whether this session knows `node` holds the payload
    pub fn knows(&self, node: NodeIndex) -> bool {
        self.known.contains(&node)
    }

    pub fn delivery_count(&self, node: NodeIndex) -> u32 {
        self.delivery_count.get(&node).copied().unwrap_or(0)
    }

    pub fn delivery_counts(&self) -> &BTreeMap<NodeIndex, u32> {
        &self.delivery_count
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn destination_reached(&self) -> bool {
        self.delivery_count(self.destination) > 0
    }

    /// Apply one tick's activations and report the resulting deliveries
    pub(crate) fn apply(&mut self, strategy: PropagationStrategy, activations: &[Activation]) -> Vec<DeliveryEvent> {
        self.step_count += 1;
        let mut events = Vec::with_capacity(activations.len());

        for activation in activations {
            let count = self.delivery_count.entry(activation.to).or_insert(0);
            *count += 1;
            self.known.insert(activation.to);
            events.push(DeliveryEvent {
                step: self.step_count,
                from: activation.from,
                node: activation.to,
                payload: self.payload.clone(),
                count_after: *count,
            });
        }

        match strategy {
            PropagationStrategy::Ripple => {
                self.frontier = activations.iter().map(|a| a.to).collect();
            }
            PropagationStrategy::Linear => {
                if let Some(hop) = activations.last() {
                    self.path.push(hop.to);
                    self.frontier = BTreeSet::from([hop.to]);
                }
            }
        }

        events
    }
}

/// One broadcast bound to a strategy and a topology
#[derive(Debug, Clone)]
pub struct BroadcastSession {
    strategy: PropagationStrategy,
    topology: Arc<Topology>,
    state: PropagationState,
}

impl BroadcastSession {
    /// Start a broadcast with only `origin` holding the payload
    pub fn start(
        origin: NodeIndex,
        destination: NodeIndex,
        payload: impl Into<Payload>,
        strategy: PropagationStrategy,
        topology: Arc<Topology>,
    ) -> Self {
        Self {
            strategy,
            topology,
            state: PropagationState::new(origin, destination, payload.into()),
        }
    }

    /// Advance one tick
    ///
    /// The step count grows by one even when nothing moves.
    pub fn step_once(&mut self) -> Vec<DeliveryEvent> {
        let _span = debug_span!(
            spans::SESSION_STEP,
            origin = self.state.origin.0,
            step = self.state.step_count + 1
        )
        .entered();

        let activations = self.next_activations();
        let events = self.state.apply(self.strategy, &activations);
        for event in &events {
            trace!(from = event.from.0, node = event.node.0, count = event.count_after, "delivered");
        }
        events
    }

    /// Hops the next [`Self::step_once`] would take
    pub fn next_activations(&self) -> Vec<Activation> {
        self.strategy.next_activations(&self.state, &self.topology)
    }

    /// No further activations are pending (saturated or stalled)
    pub fn is_complete(&self) -> bool {
        self.next_activations().is_empty()
    }

    pub fn strategy(&self) -> PropagationStrategy {
        self.strategy
    }

    pub fn state(&self) -> &PropagationState {
        &self.state
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    /// Session that continues relaying from `node`, which just received the
    /// payload from `from`. It inherits everything this session knows and
    /// starts relaying on the next tick.
    pub(crate) fn spawn_relay(&self, node: NodeIndex, from: NodeIndex) -> Self {
        let mut known = self.state.known.clone();
        known.insert(node);
        known.insert(from);

        let mut path = self.state.path.clone();
        if path.last() != Some(&node) {
            path.push(node);
        }

        Self {
            strategy: self.strategy,
            topology: Arc::clone(&self.topology),
            state: PropagationState {
                payload: self.state.payload.clone(),
                origin: node,
                destination: self.state.destination,
                delivery_count: BTreeMap::from([(node, 1)]),
                frontier: BTreeSet::from([node]),
                known,
                path,
                step_count: self.state.step_count,
            },
        }
    }

    /// Stop relaying from `node`; its own session takes over
    pub(crate) fn release(&mut self, node: NodeIndex) {
        self.state.frontier.remove(&node);
    }

    /// This session's node got the payload again, from `from`
    pub(crate) fn receive(&mut self, from: NodeIndex) {
        self.state.known.insert(from);
        *self.state.delivery_count.entry(self.state.origin).or_insert(0) += 1;
    }
}
