//! Configuration management commands.

use std::path::Path;

use anyhow::{Context, Result};
use meridian_config::{MeridianConfig, Paths};

/// Show the configuration after every layer has been merged.
pub fn show(config: &MeridianConfig) -> Result<()> {
    let rendered = config.to_toml().context("Failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}

/// List the files the loader reads, lowest precedence first.
pub fn paths(project_dir: &Path) -> Result<()> {
    let paths = Paths::new();
    if let Err(err) = paths.user_config_file() {
        println!("{:<8} unavailable ({err})", "user");
    }
    for (layer, path) in paths.layers(project_dir, true) {
        let marker = if path.exists() { "" } else { " (missing)" };
        println!("{:<8} {}{marker}", layer.to_string(), path.display());
    }
    println!("{:<8} MERIDIAN_* variables", "env");
    Ok(())
}
