//! Meshcast - Mesh Broadcast Simulator
//!
//! Generates randomized grid meshes and steps payload broadcasts across them,
//! reporting how many times each node hears the same payload.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;
use tracing::info;

use meshcast_logging::MeshcastSubscriberBuilder;
use meshcast_simulation::{
    BroadcastOrchestrator, DriveOutcome, GeneratorConfig, NodeIndex, PropagationStrategy, SimConfig,
    Topology, TickReport, drive, scenarios,
};

#[derive(Parser)]
#[command(
    name = "meshcast",
    about = "Randomized mesh generation and stepwise broadcast simulation",
    version
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Mesh generation overrides
#[derive(Args, Debug, Default)]
struct MeshArgs {
    /// Grid side length
    #[arg(short, long)]
    edge_size: Option<usize>,

    /// Minimum connect rate (percent)
    #[arg(long)]
    min_rate: Option<u32>,

    /// Maximum connect rate (percent)
    #[arg(long)]
    max_rate: Option<u32>,

    /// Seed for reproducible meshes
    #[arg(short, long)]
    seed: Option<u64>,
}

impl MeshArgs {
    fn apply(&self, config: &mut GeneratorConfig) {
        if let Some(edge_size) = self.edge_size {
            config.edge_size = edge_size;
        }
        if let Some(rate) = self.min_rate {
            config.min_connect_rate = rate;
        }
        if let Some(rate) = self.max_rate {
            config.max_connect_rate = rate;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScenarioName {
    /// Ripple on a fully connected 3x3 grid
    Complete,
    /// Linear route stalling before an isolated destination
    Stall,
    /// Broadcast across the default 20x20 mesh
    Default,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a mesh and print it
    Generate {
        #[command(flatten)]
        mesh: MeshArgs,

        /// Print JSON instead of the ASCII view
        #[arg(long)]
        json: bool,
    },

    /// Generate a mesh and drive one broadcast to completion
    Broadcast {
        #[command(flatten)]
        mesh: MeshArgs,

        /// Origin node index
        #[arg(short, long, default_value = "0")]
        origin: usize,

        /// Destination node index (defaults to the last node)
        #[arg(short, long)]
        destination: Option<usize>,

        /// Propagation strategy
        #[arg(long, value_enum)]
        strategy: Option<PropagationStrategy>,

        /// Payload text
        #[arg(short, long, default_value = "hello mesh")]
        payload: String,

        /// Milliseconds between ticks
        #[arg(long)]
        tick_interval_ms: Option<u64>,

        /// Give up after this many ticks
        #[arg(long)]
        max_ticks: Option<u64>,

        /// Print tick reports and statistics as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Run a pre-built scenario
    Scenario {
        #[arg(value_enum)]
        name: ScenarioName,

        /// Seed for the default mesh scenario
        #[arg(short, long)]
        seed: Option<u64>,

        /// Strategy for the default mesh scenario
        #[arg(long, value_enum)]
        strategy: Option<PropagationStrategy>,
    },

    /// Interactive simulation mode
    Interactive {
        #[command(flatten)]
        mesh: MeshArgs,

        /// Propagation strategy
        #[arg(long, value_enum)]
        strategy: Option<PropagationStrategy>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SimConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SimConfig::default(),
    };

    let mut logging = MeshcastSubscriberBuilder::new().with_config(config.log.clone());
    if cli.verbose {
        logging = logging.with_level("debug");
    }
    if cli.log_json {
        logging = logging.with_pretty_console(false);
    }
    let _guard = logging.init()?;

    match cli.command {
        Commands::Generate { mesh, json } => {
            mesh.apply(&mut config.generator);
            config.validate()?;
            let topology = config.generator.generate()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&topology)?);
            } else {
                println!("{}", topology.visualize());
            }
        }
        Commands::Broadcast {
            mesh,
            origin,
            destination,
            strategy,
            payload,
            tick_interval_ms,
            max_ticks,
            json,
        } => {
            mesh.apply(&mut config.generator);
            if let Some(strategy) = strategy {
                config.broadcast.strategy = strategy;
            }
            if let Some(interval) = tick_interval_ms {
                config.broadcast.tick_interval_ms = interval;
            }
            if let Some(max_ticks) = max_ticks {
                config.broadcast.max_ticks = max_ticks;
            }
            config.validate()?;
            run_broadcast(&config, origin, destination, payload, json).await?;
        }
        Commands::Scenario { name, seed, strategy } => {
            let strategy = strategy.unwrap_or(config.broadcast.strategy);
            match name {
                ScenarioName::Complete => {
                    scenarios::run_complete_graph_scenario()?;
                }
                ScenarioName::Stall => {
                    scenarios::run_linear_stall_scenario()?;
                }
                ScenarioName::Default => {
                    scenarios::run_default_mesh_scenario(seed.or(config.generator.seed), strategy)?;
                }
            }
        }
        Commands::Interactive { mesh, strategy } => {
            mesh.apply(&mut config.generator);
            if let Some(strategy) = strategy {
                config.broadcast.strategy = strategy;
            }
            config.validate()?;
            run_interactive(&config)?;
        }
    }

    Ok(())
}

async fn run_broadcast(
    config: &SimConfig,
    origin: usize,
    destination: Option<usize>,
    payload: String,
    json: bool,
) -> anyhow::Result<()> {
    let topology = Arc::new(config.generator.generate()?);
    let destination = NodeIndex(destination.unwrap_or(topology.len() - 1));
    if !json {
        println!(
            "Mesh {0}x{0}: {1} edges, seed {2:?}",
            topology.edge_size(),
            topology.edge_count(),
            topology.seed()
        );
    }

    let mut orch = BroadcastOrchestrator::new(topology, config.broadcast.strategy);
    orch.initiate(NodeIndex(origin), destination, payload)?;

    let (tx, mut rx) = mpsc::channel::<TickReport>(64);
    let printer = tokio::spawn(async move {
        while let Some(report) = rx.recv().await {
            if json {
                println!("{}", serde_json::to_string(&report)?);
                continue;
            }
            let hops: Vec<String> = report
                .events
                .iter()
                .map(|e| format!("{}->{}(x{})", e.from, e.node, e.count_after))
                .collect();
            println!("  Tick {}: {}", report.step, hops.join(" "));
        }
        Ok::<_, serde_json::Error>(())
    });

    let outcome = drive(&mut orch, config.broadcast.drive_options(), tx).await;
    printer.await??;
    info!(?outcome, "Broadcast finished");

    if json {
        println!("{}", serde_json::to_string(orch.stats())?);
        return Ok(());
    }

    match outcome {
        DriveOutcome::Complete { ticks } => println!("\nCompleted after {} ticks", ticks),
        DriveOutcome::TickLimit { ticks } => println!("\nStopped at the {} tick limit", ticks),
        DriveOutcome::Aborted { ticks } => println!("\nAborted after {} ticks", ticks),
        DriveOutcome::NotInitiated => println!("\nNothing to drive"),
    }
    let stats = orch.stats();
    println!("  Nodes reached: {}/{}", orch.reached_count(), orch.topology().len());
    println!("  Deliveries: {}", stats.deliveries);
    println!("  Redundant deliveries: {}", stats.redundant_deliveries);
    println!("  Relay sessions spawned: {}", stats.sessions_spawned);
    match stats.destination_reached_at {
        Some(step) => println!("  Destination {} reached at tick {}", destination, step),
        None => println!("  Destination {} not reached", destination),
    }
    Ok(())
}

fn print_counts(orch: &BroadcastOrchestrator) {
    let edge_size = orch.topology().edge_size();
    for y in 0..edge_size {
        let row: Vec<String> = (0..edge_size)
            .map(|x| format!("{:>3}", orch.delivery_count(NodeIndex(y * edge_size + x))))
            .collect();
        println!("  {}", row.join(""));
    }
}

fn regenerate(config: &GeneratorConfig, seed: Option<u64>) -> anyhow::Result<Arc<Topology>> {
    let topology = GeneratorConfig {
        seed,
        ..config.clone()
    }
    .generate()?;
    println!(
        "  New mesh: {} nodes, {} edges, seed {:?}",
        topology.len(),
        topology.edge_count(),
        topology.seed()
    );
    Ok(Arc::new(topology))
}

fn run_interactive(config: &SimConfig) -> anyhow::Result<()> {
    let topology = regenerate(&config.generator, config.generator.seed)?;
    let mut orch = BroadcastOrchestrator::new(topology, config.broadcast.strategy);

    println!("\nInteractive mode. Commands:");
    println!("  start <from> <to> [payload] - Initiate a broadcast");
    println!("  step [n]                    - Advance n ticks (default 1)");
    println!("  status                      - Show current state");
    println!("  counts                      - Show delivery counts on the grid");
    println!("  strategy <ripple|linear>    - Strategy for the next broadcast");
    println!("  abort                       - Discard the running broadcast");
    println!("  regen [seed]                - Generate a new mesh");
    println!("  mesh                        - Print the mesh");
    println!("  quit                        - Exit");
    println!();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let parts: Vec<&str> = input.split_whitespace().collect();
        let Some(command) = parts.first() else {
            continue;
        };

        match *command {
            "start" => {
                let endpoints = (
                    parts.get(1).and_then(|s| s.parse::<usize>().ok()),
                    parts.get(2).and_then(|s| s.parse::<usize>().ok()),
                );
                let (Some(from), Some(to)) = endpoints else {
                    println!("  Usage: start <from> <to> [payload]");
                    continue;
                };
                let payload = if parts.len() > 3 {
                    parts[3..].join(" ")
                } else {
                    "hello mesh".to_string()
                };
                match orch.initiate(NodeIndex(from), NodeIndex(to), payload) {
                    Ok(()) => println!("  Broadcast {} -> {} ready ({})", from, to, orch.strategy()),
                    Err(e) => println!("  {}", e),
                }
            }
            "step" => {
                let n: u64 = parts.get(1).and_then(|s| s.parse().ok()).unwrap_or(1);
                for _ in 0..n {
                    if orch.is_complete() {
                        break;
                    }
                    let events = orch.tick();
                    let hops: Vec<String> =
                        events.iter().map(|e| format!("{}->{}", e.from, e.node)).collect();
                    println!("  Tick {}: {}", orch.step_count(), hops.join(" "));
                }
                println!("  {}", orch.state_summary());
            }
            "status" => {
                println!("  {}", orch.state_summary());
                if let (Some(origin), Some(destination)) = (orch.origin(), orch.destination()) {
                    println!("  {} -> {} via {}", origin, destination, orch.strategy());
                }
            }
            "counts" => print_counts(&orch),
            "strategy" => match parts.get(1).map(|s| PropagationStrategy::from_str(s, true)) {
                Some(Ok(strategy)) => {
                    orch.set_strategy(strategy);
                    println!("  Next broadcast uses {}", strategy);
                }
                _ => println!("  Usage: strategy <ripple|linear>"),
            },
            "abort" => {
                orch.abort();
                println!("  Broadcast discarded");
            }
            "regen" => {
                let seed = parts.get(1).and_then(|s| s.parse().ok());
                match regenerate(&config.generator, seed) {
                    Ok(topology) => orch.replace_topology(topology),
                    Err(e) => println!("  {}", e),
                }
            }
            "mesh" => println!("{}", orch.topology().visualize()),
            "quit" | "exit" | "q" => {
                println!("Goodbye!");
                break;
            }
            other => {
                println!("  Unknown command: {}", other);
            }
        }
    }

    Ok(())
}
