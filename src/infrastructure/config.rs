use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::SwarmConfig;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_agents: {0}. Must be between 1 and 100")]
    InvalidMaxAgents(usize),

    #[error("Invalid consensus threshold: {0}. Must be in (0, 1]")]
    InvalidThreshold(f64),

    #[error("Invalid max_decision_time_ms: {0}. Must be positive")]
    InvalidDecisionTime(u64),

    #[error("Invalid poll_interval_ms: {0}. Must be positive and at most max_decision_time_ms ({1})")]
    InvalidPollInterval(u64, u64),

    #[error("Invalid emergence_cluster_fraction: {0}. Must be in (0, 1)")]
    InvalidClusterFraction(f64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid maintenance interval: {0}. Must be positive")]
    InvalidMaintenanceInterval(u64),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .hivecore/config.yaml (project config)
    /// 3. .hivecore/local.yaml (project local overrides, optional)
    /// 4. Environment variables (HIVECORE_* prefix, highest priority)
    ///
    /// Configuration is always project-local (pwd/.hivecore/) so one
    /// machine can host multiple swarms with different settings.
    pub fn load() -> Result<SwarmConfig> {
        let config: SwarmConfig = Figment::new()
            .merge(Serialized::defaults(SwarmConfig::default()))
            .merge(Yaml::file(".hivecore/config.yaml"))
            .merge(Yaml::file(".hivecore/local.yaml"))
            .merge(Env::prefixed("HIVECORE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<SwarmConfig> {
        let config: SwarmConfig = Figment::new()
            .merge(Serialized::defaults(SwarmConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &SwarmConfig) -> Result<(), ConfigError> {
        if config.max_agents == 0 || config.max_agents > 100 {
            return Err(ConfigError::InvalidMaxAgents(config.max_agents));
        }

        let threshold = config.consensus.threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }

        if config.consensus.max_decision_time_ms == 0 {
            return Err(ConfigError::InvalidDecisionTime(
                config.consensus.max_decision_time_ms,
            ));
        }

        if config.consensus.poll_interval_ms == 0
            || config.consensus.poll_interval_ms > config.consensus.max_decision_time_ms
        {
            return Err(ConfigError::InvalidPollInterval(
                config.consensus.poll_interval_ms,
                config.consensus.max_decision_time_ms,
            ));
        }

        let fraction = config.maintenance.emergence_cluster_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(ConfigError::InvalidClusterFraction(fraction));
        }

        for interval in [
            config.maintenance.metrics_interval_secs,
            config.maintenance.emergence_interval_secs,
            config.maintenance.prune_interval_secs,
        ] {
            if interval == 0 {
                return Err(ConfigError::InvalidMaintenanceInterval(interval));
            }
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SwarmConfig::default();
        assert_eq!(config.max_agents, 10);
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("default config should be valid");
    }

    #[test]
    fn test_validate_zero_agents() {
        let config = SwarmConfig {
            max_agents: 0,
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidMaxAgents(0)
        ));
    }

    #[test]
    fn test_validate_too_many_agents() {
        let config = SwarmConfig {
            max_agents: 101,
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidMaxAgents(101)
        ));
    }

    #[test]
    fn test_validate_threshold_out_of_range() {
        let mut config = SwarmConfig::default();
        config.consensus.threshold = 1.5;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidThreshold(_)
        ));

        config.consensus.threshold = 0.0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidThreshold(_)
        ));
    }

    #[test]
    fn test_validate_poll_longer_than_deadline() {
        let mut config = SwarmConfig::default();
        config.consensus.poll_interval_ms = 60_000;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidPollInterval(60_000, 30_000)
        ));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = SwarmConfig::default();
        config.logging.level = "verbose".to_string();
        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "verbose"),
            other => panic!("expected InvalidLogLevel, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = SwarmConfig::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLogFormat(_)
        ));
    }

    #[test]
    fn test_hierarchical_merging() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "max_agents: 5\nconsensus:\n  threshold: 0.8\n  algorithm: weighted\nlogging:\n  level: info\n  format: json"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "max_agents: 15\nlogging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config: SwarmConfig = Figment::new()
            .merge(Serialized::defaults(SwarmConfig::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.max_agents, 15, "override should win");
        assert_eq!(
            config.logging.level, "debug",
            "override should win for nested fields"
        );
        assert_eq!(
            config.logging.format, "json",
            "base value should persist when not overridden"
        );
        assert!((config.consensus.threshold - 0.8).abs() < f64::EPSILON);
        // Untouched values keep their defaults.
        assert_eq!(config.consensus.max_decision_time_ms, 30_000);
    }

    #[test]
    fn test_load_from_file_rejects_invalid() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "consensus:\n  threshold: 2.0").unwrap();
        file.flush().unwrap();

        let err = ConfigLoader::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid consensus threshold"));
    }
}
