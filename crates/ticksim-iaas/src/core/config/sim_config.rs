//! Simulation configuration.

use serde::{Deserialize, Serialize};

/// Holds raw simulation config parsed from YAML file.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize, Clone)]
struct RawSimulationConfig {
    pub pm_switch_on_duration: Option<u64>,
    pub pm_switch_off_duration: Option<u64>,
    pub network_throughput: Option<u64>,
    pub consolidation_interval: Option<u64>,
    pub improver: Option<String>,
    pub mostly_empty_threshold: Option<f64>,
    pub full_threshold: Option<f64>,
    pub hosts: Option<Vec<HostConfig>>,
}

/// Holds configuration of a single physical host or a set of identical hosts.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct HostConfig {
    /// Host name.
    /// Should be set if count = 1.
    pub name: Option<String>,
    /// Host name prefix.
    /// Full name is produced by appending host instance number to the prefix.
    /// Should be set if count > 1.
    pub name_prefix: Option<String>,
    /// Host CPU capacity.
    pub cpus: f64,
    /// Host memory capacity.
    pub memory: f64,
    /// Number of such hosts.
    pub count: Option<u32>,
    /// Whether the hosts are running at start (default) or switched off.
    pub switched_on: Option<bool>,
}

/// Represents simulation configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct SimulationConfig {
    /// Duration in ticks of powering a host on (at least one tick is used).
    pub pm_switch_on_duration: u64,
    /// Duration in ticks of powering a host off (at least one tick is used).
    pub pm_switch_off_duration: u64,
    /// Network throughput in memory units per tick.
    /// Used to compute VM migration duration, zero means the network is down.
    pub network_throughput: u64,
    /// Period in ticks between consolidation cycles.
    pub consolidation_interval: u64,
    /// Improver used by consolidator, e.g. `Probabilistic[probability=0.4,inner=SimpleConsolidator]`.
    pub improver: String,
    /// A bin hosting VMs is under-allocated when its free capacity ratio exceeds this value.
    pub mostly_empty_threshold: f64,
    /// A bin is full when its free capacity ratio drops below this value.
    pub full_threshold: f64,
    /// Configurations of physical hosts.
    pub hosts: Vec<HostConfig>,
}

impl SimulationConfig {
    /// Creates simulation config by reading parameter values from YAML file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Self {
        let raw: RawSimulationConfig = serde_yaml::from_str(
            &std::fs::read_to_string(file_name).unwrap_or_else(|_| panic!("Can't read file {}", file_name)),
        )
        .unwrap_or_else(|e| panic!("Can't parse YAML from file {}: {}", file_name, e));
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSimulationConfig) -> Self {
        Self {
            pm_switch_on_duration: raw.pm_switch_on_duration.unwrap_or(10),
            pm_switch_off_duration: raw.pm_switch_off_duration.unwrap_or(5),
            network_throughput: raw.network_throughput.unwrap_or(1024),
            consolidation_interval: raw.consolidation_interval.unwrap_or(300),
            improver: raw.improver.unwrap_or_else(|| "FirstFitBestDecreasing".to_string()),
            mostly_empty_threshold: raw.mostly_empty_threshold.unwrap_or(0.75),
            full_threshold: raw.full_threshold.unwrap_or(0.1),
            hosts: raw.hosts.unwrap_or_default(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::from_raw(RawSimulationConfig::default())
    }
}
