//! Propagation policies
//!
//! A strategy looks at a session's [`PropagationState`] and the immutable
//! [`Topology`] and names the hops the payload takes during the next tick.
//! It never mutates state; the session applies the result.
//!
//! - **Ripple**: epidemic flood. Every frontier node relays to every neighbor
//!   not yet known to hold the payload. Two frontier nodes sharing such a
//!   neighbor both deliver to it.
//! - **Linear**: a single routed path. The head moves to the neighbor closest
//!   (grid distance) to the destination, lowest index on ties, and only if
//!   that neighbor is strictly closer than the head itself.

use serde::{Deserialize, Serialize};

use crate::session::PropagationState;
use crate::topology::Topology;
use crate::types::Activation;

/// Which propagation policy a broadcast uses
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum PropagationStrategy {
    /// Flood every unreached neighbor each tick
    #[default]
    Ripple,
    /// Advance one greedy hop toward the destination each tick
    Linear,
}

impl PropagationStrategy {
    /// Hops the payload takes during the next tick, in a stable order
    pub fn next_activations(&self, state: &PropagationState, topology: &Topology) -> Vec<Activation> {
        match self {
            Self::Ripple => ripple_activations(state, topology),
            Self::Linear => linear_activations(state, topology),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ripple => "ripple",
            Self::Linear => "linear",
        }
    }
}

impl std::fmt::Display for PropagationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn ripple_activations(state: &PropagationState, topology: &Topology) -> Vec<Activation> {
    state
        .frontier()
        .iter()
        .flat_map(|&from| {
            topology
                .neighbors(from)
                .filter(|to| !state.knows(*to))
                .map(move |to| Activation::new(from, to))
        })
        .collect()
}

fn linear_activations(state: &PropagationState, topology: &Topology) -> Vec<Activation> {
    let Some(head) = state.path_head() else {
        return Vec::new();
    };
    if head == state.destination() {
        return Vec::new();
    }
    let (Some(head_node), Some(destination)) = (topology.node(head), topology.node(state.destination()))
    else {
        return Vec::new();
    };

    let current = head_node.manhattan_distance(destination);
    topology
        .neighbors(head)
        .filter(|candidate| !state.knows(*candidate))
        .filter_map(|candidate| {
            topology
                .node(candidate)
                .map(|node| (node.manhattan_distance(destination), candidate))
        })
        .filter(|(distance, _)| *distance < current)
        .min()
        .map(|(_, to)| vec![Activation::new(head, to)])
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeIndex;

    fn state(origin: usize, destination: usize) -> PropagationState {
        PropagationState::new(NodeIndex(origin), NodeIndex(destination), "hello".into())
    }

    #[test]
    fn test_ripple_floods_all_neighbors() {
        let topology = Topology::complete(2).unwrap();
        let activations = PropagationStrategy::Ripple.next_activations(&state(0, 3), &topology);
        assert_eq!(
            activations,
            vec![
                Activation::new(NodeIndex(0), NodeIndex(1)),
                Activation::new(NodeIndex(0), NodeIndex(2)),
                Activation::new(NodeIndex(0), NodeIndex(3)),
            ]
        );
    }

    #[test]
    fn test_ripple_reports_shared_neighbor_twice() {
        // 0 - 1, 0 - 2, 1 - 3, 2 - 3: after the first hop, 1 and 2 both reach 3
        let topology = Topology::from_edges(2, &[(0, 1), (0, 2), (1, 3), (2, 3)]).unwrap();
        let mut state = state(0, 3);
        let first_hop = PropagationStrategy::Ripple.next_activations(&state, &topology);
        state.apply(PropagationStrategy::Ripple, &first_hop);

        let activations = PropagationStrategy::Ripple.next_activations(&state, &topology);
        assert_eq!(
            activations,
            vec![
                Activation::new(NodeIndex(1), NodeIndex(3)),
                Activation::new(NodeIndex(2), NodeIndex(3)),
            ]
        );
    }

    #[test]
    fn test_linear_prefers_closest_then_lowest_index() {
        // 3x3 grid, origin 0 at (0,0), destination 8 at (2,2).
        // Neighbors of 0: 1 (1,0) dist 3, 3 (0,1) dist 3, 4 (1,1) dist 2
        let topology = Topology::from_edges(3, &[(0, 1), (0, 3), (0, 4)]).unwrap();
        let activations = PropagationStrategy::Linear.next_activations(&state(0, 8), &topology);
        assert_eq!(activations, vec![Activation::new(NodeIndex(0), NodeIndex(4))]);

        // Only equally-distant options left: lowest index wins
        let topology = Topology::from_edges(3, &[(0, 3), (0, 1)]).unwrap();
        let activations = PropagationStrategy::Linear.next_activations(&state(0, 8), &topology);
        assert_eq!(activations, vec![Activation::new(NodeIndex(0), NodeIndex(1))]);
    }

    #[test]
    fn test_linear_stalls_without_closer_neighbor() {
        // 4 (1,1) only links to 0 (0,0), which is farther from 8 (2,2)
        let topology = Topology::from_edges(3, &[(4, 0)]).unwrap();
        let activations = PropagationStrategy::Linear.next_activations(&state(4, 8), &topology);
        assert!(activations.is_empty());
    }

    #[test]
    fn test_linear_stops_at_destination() {
        let topology = Topology::complete(2).unwrap();
        let activations = PropagationStrategy::Linear.next_activations(&state(3, 3), &topology);
        assert!(activations.is_empty());
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(PropagationStrategy::Ripple.to_string(), "ripple");
        assert_eq!(serde_json::to_string(&PropagationStrategy::Linear).unwrap(), "\"linear\"");
        assert_eq!(PropagationStrategy::default(), PropagationStrategy::Ripple);
    }
}
