//! Pre-defined broadcast scenarios
//!
//! Each scenario prints a narrated trace to stdout and returns the finished
//! orchestrator so callers can inspect the outcome.

use std::sync::Arc;

use tracing::info;

use crate::config::GeneratorConfig;
use crate::error::MeshcastResult;
use crate::orchestrator::BroadcastOrchestrator;
use crate::strategy::PropagationStrategy;
use crate::topology::Topology;
use crate::types::NodeIndex;

/// Upper bound on ticks for scenario runs
const SCENARIO_TICK_LIMIT: u64 = 1000;

/// Scenario: Ripple broadcast on a fully connected 3x3 grid
///
/// Every node neighbors the origin, so the whole mesh hears the payload on
/// the first tick and the broadcast completes without redundancy.
pub fn run_complete_graph_scenario() -> MeshcastResult<BroadcastOrchestrator> {
    info!("=== Running Complete Graph Scenario ===");

    let topology = Arc::new(Topology::complete(3)?);
    println!("{}", topology.visualize());

    let mut orch = BroadcastOrchestrator::new(topology, PropagationStrategy::Ripple);
    orch.initiate(NodeIndex(0), NodeIndex(8), "hello mesh")?;

    run_to_completion(&mut orch);
    print_statistics(&orch);
    Ok(orch)
}

/// Scenario: Linear routing into a dead end
///
/// ```text
/// 0 - 1 - 2
/// .   .   .
/// .   .   8
/// ```
///
/// The route follows the top row until no neighbor is closer to the isolated
/// destination, then stalls.
pub fn run_linear_stall_scenario() -> MeshcastResult<BroadcastOrchestrator> {
    info!("=== Running Linear Stall Scenario ===");

    let topology = Arc::new(Topology::from_edges(3, &[(0, 1), (1, 2)])?);
    println!("{}", topology.visualize());

    let mut orch = BroadcastOrchestrator::new(topology, PropagationStrategy::Linear);
    orch.initiate(NodeIndex(0), NodeIndex(8), "route me")?;

    run_to_completion(&mut orch);
    if orch.stats().destination_reached_at.is_none() {
        println!("\n  Route stalled before reaching {}", NodeIndex(8));
    }
    print_statistics(&orch);
    Ok(orch)
}

/// Scenario: Broadcast across the default 20x20 mesh
///
/// Runs from the first node to the last using the built-in generator
/// defaults (2%..5% connect rates).
pub fn run_default_mesh_scenario(
    seed: Option<u64>,
    strategy: PropagationStrategy,
) -> MeshcastResult<BroadcastOrchestrator> {
    info!(?seed, %strategy, "=== Running Default Mesh Scenario ===");

    let config = GeneratorConfig {
        seed,
        ..Default::default()
    };
    let topology = Arc::new(config.generate()?);
    let last = NodeIndex(topology.len() - 1);
    println!(
        "Generated {0}x{0} mesh: {1} nodes, {2} edges, seed {3:?}",
        topology.edge_size(),
        topology.len(),
        topology.edge_count(),
        topology.seed()
    );

    let mut orch = BroadcastOrchestrator::new(topology, strategy);
    orch.initiate(NodeIndex(0), last, "default mesh broadcast")?;

    run_to_completion(&mut orch);
    print_statistics(&orch);
    Ok(orch)
}

fn run_to_completion(orch: &mut BroadcastOrchestrator) {
    println!("\n--- {} ---", orch.state_summary());
    while !orch.is_complete() && orch.step_count() < SCENARIO_TICK_LIMIT {
        let events = orch.tick();
        let reached: Vec<String> = events.iter().map(|e| format!("{}->{}", e.from, e.node)).collect();
        println!("  Tick {}: [{}]", orch.step_count(), reached.join(", "));
        println!("  {}", orch.state_summary());
    }
}

fn print_statistics(orch: &BroadcastOrchestrator) {
    let stats = orch.stats();
    println!("\n=== Final Statistics ===");
    println!("  Ticks: {}", stats.ticks);
    println!("  Nodes reached: {}/{}", orch.reached_count(), orch.topology().len());
    println!("  Deliveries: {}", stats.deliveries);
    println!("  Redundant deliveries: {}", stats.redundant_deliveries);
    println!("  Relay sessions spawned: {}", stats.sessions_spawned);
    match stats.destination_reached_at {
        Some(step) => println!("  Destination reached at tick {}", step),
        None => println!("  Destination not reached"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_graph_scenario() {
        let orch = run_complete_graph_scenario().unwrap();
        assert_eq!(orch.step_count(), 1);
        assert_eq!(orch.reached_count(), 9);
        assert_eq!(orch.stats().redundant_deliveries, 0);
    }

    #[test]
    fn test_linear_stall_scenario() {
        let orch = run_linear_stall_scenario().unwrap();
        assert!(orch.is_complete());
        assert_eq!(orch.step_count(), 2);
        assert_eq!(orch.delivery_count(NodeIndex(8)), 0);
        assert_eq!(orch.stats().destination_reached_at, None);
    }

    #[test]
    fn test_default_mesh_scenario_is_reproducible() {
        let first = run_default_mesh_scenario(Some(42), PropagationStrategy::Ripple).unwrap();
        let second = run_default_mesh_scenario(Some(42), PropagationStrategy::Ripple).unwrap();
        assert_eq!(first.topology(), second.topology());
        assert_eq!(first.stats(), second.stats());
        assert_eq!(first.delivery_counts(), second.delivery_counts());
        assert!(first.is_complete());
    }
}
