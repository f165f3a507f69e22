//! Core types for the meshcast simulation
//!
//! Models a square grid of peers addressed by dense integer index, and the
//! delivery events a broadcast produces as it moves across the mesh.

use std::collections::BTreeSet;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Opaque broadcast payload. Never interpreted, only forwarded.
pub type Payload = Bytes;

/// Dense node identifier, `0..N-1`, with `index == y * edge_size + x`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeIndex(pub usize);

impl NodeIndex {
    /// The raw arena index
    pub fn get(self) -> usize {
        self.0
    }
}

impl From<usize> for NodeIndex {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl std::fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A peer on the grid together with its adjacency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub index: NodeIndex,
    pub x: usize,
    pub y: usize,
    /// Side length of the grid this node lives on
    pub edge_size: usize,
    /// Symmetric adjacency, kept sorted so iteration order is stable
    pub neighbors: BTreeSet<NodeIndex>,
}

impl Node {
    /// Create an unconnected node at grid position `(x, y)`
    pub fn new(x: usize, y: usize, edge_size: usize) -> Self {
        Self {
            index: NodeIndex(y * edge_size + x),
            x,
            y,
            edge_size,
            neighbors: BTreeSet::new(),
        }
    }

    /// Number of incident edges
    pub fn degree(&self) -> usize {
        self.neighbors.len()
    }

    /// Grid (Manhattan) distance to another node
    pub fn manhattan_distance(&self, other: &Node) -> usize {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

/// One hop the payload takes during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activation {
    pub from: NodeIndex,
    pub to: NodeIndex,
}

impl Activation {
    pub fn new(from: NodeIndex, to: NodeIndex) -> Self {
        Self { from, to }
    }
}

/// A node received the payload
///
/// `count_after` is the receiving node's tally in the scope that produced the
/// event: the session's own map for [`crate::session::BroadcastSession::step_once`],
/// the broadcast-wide map for [`crate::orchestrator::BroadcastOrchestrator::tick`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryEvent {
    /// Tick during which the delivery happened (1-based)
    pub step: u64,
    /// Node that relayed the payload
    pub from: NodeIndex,
    /// Node that received it
    pub node: NodeIndex,
    pub payload: Payload,
    pub count_after: u32,
}
