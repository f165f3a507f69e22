//! # Meshcast
//!
//! Randomized mesh generation and stepwise broadcast propagation.
//!
//! ## Overview
//!
//! Nodes sit on an `edge_size x edge_size` grid and are wired with random
//! bidirectional edges whose degree stays within percentage bounds of the
//! node count. A payload injected at one node then spreads one hop per tick
//! under a pluggable propagation strategy:
//!
//! - **Ripple**: epidemic flooding to every neighbor not known to hold it
//! - **Linear**: a single greedy route toward the destination's grid position
//!
//! ## Architecture
//!
//! - **Types** (`types.rs`): Node, NodeIndex, Activation, DeliveryEvent
//! - **Topology** (`topology.rs`): Grid construction and randomized wiring
//! - **Strategy** (`strategy.rs`): Which hops happen next tick
//! - **Session** (`session.rs`): One broadcast's propagation state
//! - **Orchestrator** (`orchestrator.rs`): Per-node relay sessions and redundancy stats
//! - **Driver** (`driver.rs`): Async tick loop with a fixed cadence
//! - **Scenarios** (`scenarios.rs`): Narrated pre-built runs
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use meshcast_simulation::*;
//!
//! let topology = Arc::new(generate(3, 20, 50, Some(7))?);
//! let mut orch = BroadcastOrchestrator::new(topology, PropagationStrategy::Ripple);
//! orch.initiate(NodeIndex(0), NodeIndex(8), "hello")?;
//!
//! while !orch.is_complete() {
//!     for event in orch.tick() {
//!         println!("{} -> {} (x{})", event.from, event.node, event.count_after);
//!     }
//! }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod orchestrator;
pub mod scenarios;
pub mod session;
pub mod strategy;
pub mod topology;
pub mod types;

#[cfg(test)]
mod integration_scenarios;

pub use config::{BroadcastConfig, GeneratorConfig, SimConfig};
pub use driver::{DriveOptions, DriveOutcome, TickReport, drive};
pub use error::{ConfigError, GenerationError, MeshcastError, MeshcastResult, PrecondFailed};
pub use orchestrator::{BroadcastOrchestrator, BroadcastPhase, BroadcastStats};
pub use session::{BroadcastSession, PropagationState};
pub use strategy::PropagationStrategy;
pub use topology::{DegreeBounds, Topology, TopologyGenerator, generate};
pub use types::{Activation, DeliveryEvent, Node, NodeIndex, Payload};
