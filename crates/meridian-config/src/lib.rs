//! Configuration management for Meridian
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence, applied by the caller)
//! 2. Environment variables (`MERIDIAN_*` prefix, `__` between sections)
//! 3. meridian.local.toml (gitignored, local overrides)
//! 4. meridian.toml (git-tracked, project config)
//! 5. ~/.config/meridian/config.toml (user defaults)
//! 6. Built-in defaults (lowest precedence)

use meridian::{DEFAULT_JITTER, DEFAULT_MAX_DELAY_MS, SimConfig, SinkKind};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::{Layer, Paths};

/// Main Meridian configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeridianConfig {
    pub network: NetworkConfig,
    pub simulation: SimulationConfig,
    pub logging: LoggingConfig,
    pub demo: DemoConfig,
}

/// Latency model parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Transit time between antipodal nodes
    pub max_delay_ms: u64,
    /// Jitter fraction, within [0, 1]
    pub jitter: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter: DEFAULT_JITTER,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed seed for reproducible runs; unset means entropy
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Where node log lines go
    pub sink: SinkKind,
    /// `tracing` filter used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::Stdout,
            filter: "info".to_string(),
        }
    }
}

/// Settings of the banking demonstration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub server: String,
    pub client: String,
    /// Account the client credits and debits
    pub account: String,
    /// Number of credit/debit requests the client sends
    pub requests: u32,
    /// Lowest amount drawn (inclusive)
    pub min_amount: i64,
    /// Highest amount drawn (exclusive)
    pub max_amount: i64,
    /// Pause between two requests
    pub pause_ms: u64,
    /// Wait after the last request before the client stops
    pub settle_ms: u64,
    /// Delay between starting the server and starting the client
    pub startup_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            server: "S1".to_string(),
            client: "C1".to_string(),
            account: "Durand".to_string(),
            requests: 5,
            min_amount: -50,
            max_amount: 50,
            pause_ms: 500,
            settle_ms: 3000,
            startup_ms: 100,
        }
    }
}

impl DemoConfig {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn startup(&self) -> Duration {
        Duration::from_millis(self.startup_ms)
    }
}

impl MeridianConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Engine settings described by this configuration
    pub fn sim_config(&self) -> SimConfig {
        SimConfig {
            max_delay_ms: self.network.max_delay_ms,
            jitter: self.network.jitter,
            seed: self.simulation.seed,
            log_sink: self.logging.sink,
        }
    }

    /// Check cross-field constraints the types cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sim_config()
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        let demo = &self.demo;
        if demo.min_amount >= demo.max_amount {
            return Err(ConfigError::ValidationError(format!(
                "demo amount range is empty: [{}, {})",
                demo.min_amount, demo.max_amount
            )));
        }
        if demo.server == demo.client {
            return Err(ConfigError::ValidationError(format!(
                "demo server and client share the name {}",
                demo.server
            )));
        }
        Ok(())
    }

    /// Render as TOML, e.g. for `meridian config show`
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MeridianConfig::default();
        assert_eq!(config.network.max_delay_ms, 1000);
        assert!((config.network.jitter - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.simulation.seed, None);
        assert_eq!(config.logging.sink, SinkKind::Stdout);
        assert_eq!(config.demo.server, "S1");
        assert_eq!(config.demo.client, "C1");
        assert_eq!(config.demo.account, "Durand");
        assert_eq!(config.demo.requests, 5);
        assert_eq!((config.demo.min_amount, config.demo.max_amount), (-50, 50));
        config.validate().unwrap();
    }

    #[test]
    fn test_sim_config_mapping() {
        let mut config = MeridianConfig::default();
        config.network.max_delay_ms = 250;
        config.network.jitter = 0.1;
        config.simulation.seed = Some(7);
        config.logging.sink = SinkKind::Tracing;

        let sim = config.sim_config();
        assert_eq!(sim.max_delay_ms, 250);
        assert!((sim.jitter - 0.1).abs() < f64::EPSILON);
        assert_eq!(sim.seed, Some(7));
        assert_eq!(sim.log_sink, SinkKind::Tracing);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = MeridianConfig::default();
        config.network.jitter = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = MeridianConfig::default();
        config.demo.min_amount = 10;
        config.demo.max_amount = 10;
        assert!(config.validate().is_err());

        let mut config = MeridianConfig::default();
        config.demo.client = "S1".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_rendering_parses_back() {
        let mut config = MeridianConfig::default();
        config.simulation.seed = Some(42);
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("[network]"));
        assert!(rendered.contains("sink = \"stdout\""));

        let parsed: MeridianConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
