//! Configuration loader with multi-source merging

use crate::{ConfigError, MeridianConfig, Paths};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    env_vars: Option<HashMap<String, String>>,
    user_config: bool,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "MERIDIAN".to_string(),
            env_vars: None,
            user_config: true,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "MERIDIAN")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Read overrides from `vars` instead of the process environment
    pub fn with_env_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.env_vars = Some(vars);
        self
    }

    /// Skip ~/.config/meridian/config.toml
    pub fn without_user_config(mut self) -> Self {
        self.user_config = false;
        self
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<MeridianConfig, ConfigError> {
        let mut builder = config::Config::builder();

        // 1. Start with built-in defaults
        let defaults = MeridianConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2-4. User, project and local files, lowest precedence first
        for (_, file) in Paths::new().layers(&self.project_dir, self.user_config) {
            if file.exists() {
                builder = builder.add_source(
                    config::File::from(file)
                        .required(false)
                        .format(config::FileFormat::Toml),
                );
            }
        }

        // 5. Environment variables (MERIDIAN_NETWORK__MAX_DELAY_MS=...)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(self.env_vars),
        );

        let meridian_config: MeridianConfig = builder.build()?.try_deserialize()?;
        meridian_config.validate()?;
        Ok(meridian_config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default(self) -> MeridianConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
