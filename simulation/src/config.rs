//! Simulation configuration
//!
//! Everything can be loaded from a JSON file; missing fields fall back to
//! the defaults below, and CLI flags override the loaded values.

use std::path::Path;
use std::time::Duration;

use meshcast_logging::LogConfig;
use serde::{Deserialize, Serialize};

use crate::driver::DriveOptions;
use crate::error::{ConfigError, GenerationError};
use crate::strategy::PropagationStrategy;
use crate::topology::{Topology, TopologyGenerator};

/// Mesh generation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Grid side length; the mesh has `edge_size^2` nodes
    pub edge_size: usize,
    /// Lower degree bound, percent of the other nodes
    pub min_connect_rate: u32,
    /// Upper degree bound, percent of the other nodes
    pub max_connect_rate: u32,
    /// Fixed seed for reproducible meshes
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            edge_size: 20,
            min_connect_rate: 2,
            max_connect_rate: 5,
            seed: None,
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.edge_size == 0 {
            return Err(ConfigError::Invalid("edge_size must be at least 1".into()));
        }
        if self.min_connect_rate > 100 || self.max_connect_rate > 100 {
            return Err(ConfigError::Invalid(format!(
                "connect rates must lie in [0, 100], got {}..{}",
                self.min_connect_rate, self.max_connect_rate
            )));
        }
        Ok(())
    }

    pub fn generator(&self) -> TopologyGenerator {
        TopologyGenerator::new(self.edge_size, self.min_connect_rate, self.max_connect_rate)
            .with_optional_seed(self.seed)
    }

    pub fn generate(&self) -> Result<Topology, GenerationError> {
        self.generator().generate()
    }
}

/// How broadcasts are run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub strategy: PropagationStrategy,
    /// Delay between ticks; 0 runs as fast as possible
    pub tick_interval_ms: u64,
    /// Give up after this many ticks
    pub max_ticks: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            strategy: PropagationStrategy::Ripple,
            tick_interval_ms: 0,
            max_ticks: 1000,
        }
    }
}

impl BroadcastConfig {
    pub fn drive_options(&self) -> DriveOptions {
        DriveOptions {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            max_ticks: self.max_ticks,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub generator: GeneratorConfig,
    pub broadcast: BroadcastConfig,
    pub log: LogConfig,
}

impl SimConfig {
    /// Load and validate a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.generator.validate()
    }
}
