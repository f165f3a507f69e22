//! Mesh topology generation for meshcast
//!
//! Peers are laid out on an `edge_size x edge_size` grid and wired with
//! random bidirectional edges under min/max degree constraints:
//!
//! 1. Every node draws a target degree uniformly from `[min, max]`
//! 2. Nodes are visited in index order; a node already at its target (thanks
//!    to passive connections made by earlier nodes) skips its active phase
//! 3. Otherwise it connects to random eligible candidates until the target is
//!    met or candidates run out
//!
//! The resulting graph may be disconnected. That is a valid topology.

use std::collections::{BTreeMap, VecDeque};

use meshcast_logging::spans;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, trace};

use crate::error::GenerationError;
use crate::types::{Node, NodeIndex};

/// Degree limits derived from the connect-rate percentages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegreeBounds {
    pub min: usize,
    pub max: usize,
}

impl DegreeBounds {
    /// `max = ceil(max_rate% * (N-1))`, `min = floor(min_rate% * (N-1))`
    pub fn from_rates(node_count: usize, min_rate: u32, max_rate: u32) -> Self {
        let others = node_count.saturating_sub(1);
        Self {
            min: min_rate as usize * others / 100,
            max: (max_rate as usize * others).div_ceil(100),
        }
    }

    /// Whether a degree lies within the bounds
    pub fn contains(&self, degree: usize) -> bool {
        self.min <= degree && degree <= self.max
    }
}

/// A generated mesh. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    edge_size: usize,
    nodes: Vec<Node>,
    bounds: DegreeBounds,
    /// Seed the generator ran with, if the topology was randomly generated
    seed: Option<u64>,
}

impl Topology {
    fn grid(edge_size: usize) -> Vec<Node> {
        (0..edge_size)
            .flat_map(|y| (0..edge_size).map(move |x| Node::new(x, y, edge_size)))
            .collect()
    }

    fn connect(nodes: &mut [Node], a: usize, b: usize) {
        nodes[a].neighbors.insert(NodeIndex(b));
        nodes[b].neighbors.insert(NodeIndex(a));
    }

    /// Build a topology from an explicit edge list
    pub fn from_edges(edge_size: usize, edges: &[(usize, usize)]) -> Result<Self, GenerationError> {
        if edge_size == 0 {
            return Err(GenerationError::InvalidParameters("edge size must be at least 1".into()));
        }
        let mut nodes = Self::grid(edge_size);
        let count = nodes.len();

        for &(a, b) in edges {
            if a >= count || b >= count {
                return Err(GenerationError::InvalidParameters(format!(
                    "edge ({a}, {b}) references a node outside 0..{count}"
                )));
            }
            if a == b {
                return Err(GenerationError::InvalidParameters(format!("self loop on node {a}")));
            }
            Self::connect(&mut nodes, a, b);
        }

        let min = nodes.iter().map(Node::degree).min().unwrap_or(0);
        let max = nodes.iter().map(Node::degree).max().unwrap_or(0);
        Ok(Self {
            edge_size,
            nodes,
            bounds: DegreeBounds { min, max },
            seed: None,
        })
    }

    /// Build a topology where every node is connected to every other
    pub fn complete(edge_size: usize) -> Result<Self, GenerationError> {
        let count = edge_size * edge_size;
        let edges: Vec<(usize, usize)> = (0..count)
            .flat_map(|a| ((a + 1)..count).map(move |b| (a, b)))
            .collect();
        Self::from_edges(edge_size, &edges)
    }

    /// Side length of the grid
    pub fn edge_size(&self) -> usize {
        self.edge_size
    }

    /// All nodes, ordered by index
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, index: NodeIndex) -> Option<&Node> {
        self.nodes.get(index.0)
    }

    pub fn contains(&self, index: NodeIndex) -> bool {
        index.0 < self.nodes.len()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Degree bounds the topology was generated under
    pub fn bounds(&self) -> DegreeBounds {
        self.bounds
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Neighbors of a node in ascending index order (empty for unknown nodes)
    pub fn neighbors(&self, index: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.node(index)
            .into_iter()
            .flat_map(|node| node.neighbors.iter().copied())
    }

    pub fn degree(&self, index: NodeIndex) -> usize {
        self.node(index).map(Node::degree).unwrap_or(0)
    }

    /// Check if two nodes are directly connected
    pub fn are_connected(&self, a: NodeIndex, b: NodeIndex) -> bool {
        self.node(a)
            .map(|node| node.neighbors.contains(&b))
            .unwrap_or(false)
    }

    /// Number of undirected edges
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(Node::degree).sum::<usize>() / 2
    }

    /// Grid distance between two nodes
    pub fn manhattan_distance(&self, a: NodeIndex, b: NodeIndex) -> Option<usize> {
        Some(self.node(a)?.manhattan_distance(self.node(b)?))
    }

    /// Hop counts from `from` to every node reachable from it (BFS)
    pub fn hop_distances(&self, from: NodeIndex) -> BTreeMap<NodeIndex, usize> {
        let mut distances = BTreeMap::new();
        if !self.contains(from) {
            return distances;
        }

        let mut queue = VecDeque::from([from]);
        distances.insert(from, 0);
        while let Some(current) = queue.pop_front() {
            let next_hop = distances[&current] + 1;
            for neighbor in self.neighbors(current) {
                if !distances.contains_key(&neighbor) {
                    distances.insert(neighbor, next_hop);
                    queue.push_back(neighbor);
                }
            }
        }
        distances
    }

    /// Greatest hop count from `from` to any node reachable from it
    pub fn eccentricity(&self, from: NodeIndex) -> Option<usize> {
        self.hop_distances(from).into_values().max()
    }

    /// Whether every node can reach every other node
    pub fn is_connected(&self) -> bool {
        self.is_empty() || self.hop_distances(NodeIndex(0)).len() == self.len()
    }

    /// Print a simple ASCII visualization of the mesh
    pub fn visualize(&self) -> String {
        let mut output = String::new();
        output.push_str("Mesh Topology:\n");
        output.push_str(&format!("  Grid: {0}x{0}\n", self.edge_size));
        output.push_str(&format!("  Nodes: {}\n", self.len()));
        output.push_str(&format!("  Edges: {}\n", self.edge_count()));
        output.push_str(&format!(
            "  Degree bounds: [{}, {}]\n",
            self.bounds.min, self.bounds.max
        ));
        if let Some(seed) = self.seed {
            output.push_str(&format!("  Seed: {}\n", seed));
        }
        output.push('\n');

        for node in &self.nodes {
            let neighbor_str: Vec<String> = node.neighbors.iter().map(|n| n.0.to_string()).collect();
            output.push_str(&format!(
                "  {:>4} ({},{}) -> [{}]\n",
                node.index.0,
                node.x,
                node.y,
                neighbor_str.join(", ")
            ));
        }
        output
    }
}

/// Randomized mesh builder
#[derive(Debug, Clone)]
pub struct TopologyGenerator {
    edge_size: usize,
    min_connect_rate: u32,
    max_connect_rate: u32,
    seed: Option<u64>,
}

impl TopologyGenerator {
    /// Create a generator for an `edge_size x edge_size` grid with the given
    /// connect-rate percentages
    pub fn new(edge_size: usize, min_connect_rate: u32, max_connect_rate: u32) -> Self {
        Self {
            edge_size,
            min_connect_rate,
            max_connect_rate,
            seed: None,
        }
    }

    /// Make generation reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_optional_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    fn check_parameters(&self) -> Result<(), GenerationError> {
        if self.edge_size == 0 {
            return Err(GenerationError::InvalidParameters("edge size must be at least 1".into()));
        }
        for (name, rate) in [
            ("min connect rate", self.min_connect_rate),
            ("max connect rate", self.max_connect_rate),
        ] {
            if rate > 100 {
                return Err(GenerationError::InvalidParameters(format!(
                    "{name} {rate} is outside [0, 100]"
                )));
            }
        }
        Ok(())
    }

    /// Build the mesh
    pub fn generate(&self) -> Result<Topology, GenerationError> {
        self.check_parameters()?;

        let seed = self.seed.unwrap_or_else(|| rand::rng().random());
        let _span = info_span!(spans::GENERATE_TOPOLOGY, edge_size = self.edge_size, seed).entered();
        let mut rng = StdRng::seed_from_u64(seed);

        let mut nodes = Topology::grid(self.edge_size);
        let bounds = DegreeBounds::from_rates(nodes.len(), self.min_connect_rate, self.max_connect_rate);
        if nodes.len() > 1 && bounds.min > bounds.max {
            return Err(GenerationError::InvertedDegreeBounds {
                min: bounds.min,
                max: bounds.max,
            });
        }

        for i in 0..nodes.len() {
            let target = rng.random_range(bounds.min..=bounds.max);

            // Passive connections already cover it
            if nodes[i].degree() >= target {
                trace!(node = i, degree = nodes[i].degree(), target, "skipping active phase");
                continue;
            }

            let mut candidates: Vec<usize> = nodes
                .iter()
                .filter(|candidate| {
                    candidate.index.0 != i
                        && candidate.degree() < bounds.max
                        && !candidate.neighbors.contains(&NodeIndex(i))
                })
                .map(|candidate| candidate.index.0)
                .collect();

            while nodes[i].degree() < target {
                if candidates.is_empty() {
                    let degree = nodes[i].degree();
                    if degree < bounds.min {
                        return Err(GenerationError::DegreeTargetUnreachable {
                            node: NodeIndex(i),
                            degree,
                            min: bounds.min,
                        });
                    }
                    debug!(node = i, degree, target, "candidates exhausted, accepting shortfall");
                    break;
                }
                let picked = candidates.swap_remove(rng.random_range(0..candidates.len()));
                Topology::connect(&mut nodes, i, picked);
            }
        }

        let topology = Topology {
            edge_size: self.edge_size,
            nodes,
            bounds,
            seed: Some(seed),
        };
        info!(
            nodes = topology.len(),
            edges = topology.edge_count(),
            min_degree = bounds.min,
            max_degree = bounds.max,
            "Topology generated"
        );
        Ok(topology)
    }
}

/// Generate a random mesh in one call
pub fn generate(
    edge_size: usize,
    min_connect_rate: u32,
    max_connect_rate: u32,
    seed: Option<u64>,
) -> Result<Topology, GenerationError> {
    TopologyGenerator::new(edge_size, min_connect_rate, max_connect_rate)
        .with_optional_seed(seed)
        .generate()
}
