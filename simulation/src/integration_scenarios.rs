//! End-to-end scenarios across generation, propagation and orchestration
//!
//! These run generated meshes through the whole stack:
//! - topology generation with fixed seeds
//! - standalone sessions under both strategies
//! - the orchestrator's per-node relay hand-off
//! - the async driver

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::driver::{DriveOptions, DriveOutcome, drive};
use crate::orchestrator::{BroadcastOrchestrator, BroadcastPhase};
use crate::session::BroadcastSession;
use crate::strategy::PropagationStrategy;
use crate::topology::{Topology, generate};
use crate::types::NodeIndex;

const ORIGIN: NodeIndex = NodeIndex(0);
const DESTINATION: NodeIndex = NodeIndex(8);

/// 3x3 mesh with 20%..50% connect rates from the first seed that generates
fn small_mesh() -> Topology {
    (0..32)
        .find_map(|seed| generate(3, 20, 50, Some(seed)).ok())
        .expect("no seed in 0..32 produced a 3x3 mesh")
}

fn run_orchestrator(topology: &Topology, strategy: PropagationStrategy) -> BroadcastOrchestrator {
    let mut orch = BroadcastOrchestrator::new(Arc::new(topology.clone()), strategy);
    orch.initiate(ORIGIN, DESTINATION, "e2e").unwrap();
    while !orch.is_complete() {
        orch.tick();
        assert!(orch.step_count() <= 100, "broadcast never completed");
    }
    orch
}

/// Generated degrees stay within floor(0.2 * 8) = 1 and ceil(0.5 * 8) = 4
#[test]
fn test_small_mesh_respects_degree_bounds() {
    let topology = small_mesh();
    assert_eq!(topology.len(), 9);
    for node in topology.nodes() {
        assert!(
            (1..=4).contains(&node.degree()),
            "{} has degree {}",
            node.index,
            node.degree()
        );
    }
}

/// A standalone Ripple session advances one BFS layer per tick
#[test]
fn test_ripple_session_completes_at_eccentricity() {
    let topology = Arc::new(small_mesh());
    let eccentricity = topology.eccentricity(ORIGIN).unwrap();
    let reachable = topology.hop_distances(ORIGIN);

    let mut session = BroadcastSession::start(
        ORIGIN,
        DESTINATION,
        "ripple",
        PropagationStrategy::Ripple,
        Arc::clone(&topology),
    );
    while !session.is_complete() {
        session.step_once();
    }

    let state = session.state();
    assert_eq!(state.step_count() as usize, eccentricity);
    for node in topology.nodes() {
        let reached = state.delivery_count(node.index) > 0;
        assert_eq!(reached, reachable.contains_key(&node.index), "{}", node.index);
    }
}

/// Every reachable node hears the payload by its hop distance; relays that
/// only re-deliver finish one tick later at most
#[test]
fn test_orchestrated_ripple_reaches_component() {
    let topology = small_mesh();
    let distances = topology.hop_distances(ORIGIN);
    let eccentricity = topology.eccentricity(ORIGIN).unwrap() as u64;

    let orch = run_orchestrator(&topology, PropagationStrategy::Ripple);

    let steps = orch.step_count();
    assert!(eccentricity <= steps && steps <= eccentricity + 1, "{steps} vs {eccentricity}");
    assert!(steps <= topology.len() as u64 - 1);
    assert_eq!(orch.phase(), BroadcastPhase::Complete);
    assert_eq!(orch.reached_count(), distances.len());
    assert_eq!(
        orch.stats().destination_reached_at.is_some(),
        distances.contains_key(&DESTINATION)
    );
    assert_eq!(
        orch.stats().deliveries,
        orch.delivery_counts().values().map(|c| u64::from(*c)).sum::<u64>() - 1
    );
}

#[test]
fn test_first_delivery_tick_matches_hop_distance() {
    let topology = small_mesh();
    let distances = topology.hop_distances(ORIGIN);

    let mut orch = BroadcastOrchestrator::new(Arc::new(topology), PropagationStrategy::Ripple);
    orch.initiate(ORIGIN, DESTINATION, "hops").unwrap();
    while !orch.is_complete() {
        for event in orch.tick() {
            if event.count_after == 1 {
                assert_eq!(event.step as usize, distances[&event.node], "{}", event.node);
            }
        }
    }
}

#[test]
fn test_same_seed_same_broadcast() {
    let first = run_orchestrator(&small_mesh(), PropagationStrategy::Ripple);
    let second = run_orchestrator(&small_mesh(), PropagationStrategy::Ripple);
    assert_eq!(first.topology(), second.topology());
    assert_eq!(first.delivery_counts(), second.delivery_counts());
    assert_eq!(first.stats(), second.stats());
}

/// Linear routes only ever move strictly closer to the destination
#[test]
fn test_linear_route_on_generated_mesh() {
    let topology = small_mesh();
    let orch = run_orchestrator(&topology, PropagationStrategy::Linear);

    let Some((_, tail)) = orch.sessions().max_by_key(|(_, s)| s.state().path().len()) else {
        panic!("no sessions");
    };
    let distances: Vec<usize> = tail
        .state()
        .path()
        .iter()
        .map(|node| topology.manhattan_distance(*node, DESTINATION).unwrap())
        .collect();
    assert!(distances.windows(2).all(|w| w[1] < w[0]), "{distances:?}");
    assert_eq!(orch.step_count() as usize, distances.len() - 1);
    assert_eq!(orch.stats().redundant_deliveries, 0);
}

#[test]
fn test_linear_stall_leaves_destination_unreached() {
    let topology = Topology::from_edges(3, &[(0, 1), (1, 2)]).unwrap();
    let orch = run_orchestrator(&topology, PropagationStrategy::Linear);

    assert_eq!(orch.step_count(), 2);
    assert_eq!(orch.delivery_count(DESTINATION), 0);
    assert_eq!(orch.reached_count(), 3);
}

#[tokio::test]
async fn test_driver_matches_manual_ticks() {
    let topology = small_mesh();
    let manual = run_orchestrator(&topology, PropagationStrategy::Ripple);

    let mut driven = BroadcastOrchestrator::new(Arc::new(topology), PropagationStrategy::Ripple);
    driven.initiate(ORIGIN, DESTINATION, "e2e").unwrap();
    let (tx, mut rx) = mpsc::channel(128);

    let outcome = drive(&mut driven, DriveOptions::default(), tx).await;
    assert_eq!(
        outcome,
        DriveOutcome::Complete {
            ticks: manual.step_count()
        }
    );

    let mut delivered = 0;
    while let Some(report) = rx.recv().await {
        delivered += report.events.len() as u64;
    }
    assert_eq!(delivered, manual.stats().deliveries);
    assert_eq!(driven.delivery_counts(), manual.delivery_counts());
}
