use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::decision::VotingAlgorithm;

/// Main configuration structure for Hivecore
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SwarmConfig {
    /// Maximum number of registered agents (1-100)
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,

    /// Consensus engine configuration
    #[serde(default)]
    pub consensus: ConsensusConfig,

    /// Background maintenance configuration
    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

const fn default_max_agents() -> usize {
    10
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            max_agents: default_max_agents(),
            consensus: ConsensusConfig::default(),
            maintenance: MaintenanceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Consensus engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConsensusConfig {
    /// Minimum participation * agreement score required to finalize
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Hard deadline for a decision, in milliseconds
    #[serde(default = "default_max_decision_time_ms")]
    pub max_decision_time_ms: u64,

    /// Resolution check interval, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Winner-selection algorithm
    #[serde(default)]
    pub algorithm: VotingAlgorithm,

    /// Whether resolved decisions are cached by (type, description)
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,
}

const fn default_threshold() -> f64 {
    0.7
}

const fn default_max_decision_time_ms() -> u64 {
    30_000
}

const fn default_poll_interval_ms() -> u64 {
    1_000
}

const fn default_cache_enabled() -> bool {
    true
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            max_decision_time_ms: default_max_decision_time_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            algorithm: VotingAlgorithm::default(),
            cache_enabled: default_cache_enabled(),
        }
    }
}

impl ConsensusConfig {
    pub fn max_decision_time(&self) -> Duration {
        Duration::from_millis(self.max_decision_time_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Background maintenance loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MaintenanceConfig {
    /// Collective-intelligence metrics interval, seconds
    #[serde(default = "default_metrics_interval_secs")]
    pub metrics_interval_secs: u64,

    /// Emergent-behavior detection interval, seconds
    #[serde(default = "default_emergence_interval_secs")]
    pub emergence_interval_secs: u64,

    /// History pruning interval, seconds
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,

    /// Retention for resolved decisions and their votes, seconds
    #[serde(default = "default_history_retention_secs")]
    pub history_retention_secs: u64,

    /// Fraction of the agent population a (type, status) cluster must
    /// exceed to be flagged as emergent behavior
    #[serde(default = "default_emergence_cluster_fraction")]
    pub emergence_cluster_fraction: f64,
}

const fn default_metrics_interval_secs() -> u64 {
    5
}

const fn default_emergence_interval_secs() -> u64 {
    10
}

const fn default_prune_interval_secs() -> u64 {
    60
}

const fn default_history_retention_secs() -> u64 {
    3_600
}

const fn default_emergence_cluster_fraction() -> f64 {
    0.3
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            metrics_interval_secs: default_metrics_interval_secs(),
            emergence_interval_secs: default_emergence_interval_secs(),
            prune_interval_secs: default_prune_interval_secs(),
            history_retention_secs: default_history_retention_secs(),
            emergence_cluster_fraction: default_emergence_cluster_fraction(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
