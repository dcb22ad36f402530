//! Configuration loading

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::info;

use crate::Config;

/// Load and validate configuration
///
/// Config file search order:
/// 1. `explicit_path` (the `--config` flag)
/// 2. `MESHGATE_CONFIG_PATH` environment variable
/// 3. ./config.yaml (current working directory)
/// 4. /config/config.yaml (container mount path)
/// 5. Fall back to environment variables only
///
/// An explicit path (1 or 2) must exist, and any file that is found must
/// load; neither case falls back to defaults.
///
/// Runs before logging is initialized, so progress goes to stderr.
pub fn load_config(explicit_path: Option<&str>) -> Result<Config> {
    let config_path = find_config_file(explicit_path)?;

    let config = if let Some(path) = config_path {
        eprintln!("Loading config from {path}");
        Config::from_file(&path).with_context(|| format!("Failed to load config file {path}"))?
    } else {
        eprintln!("No config file found, using environment variables");
        Config::from_env().context("Failed to load config from environment")?
    };

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Config validation error: {error}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    info!("Configuration loaded and validated successfully");

    Ok(config)
}

fn find_config_file(explicit_path: Option<&str>) -> Result<Option<String>> {
    let explicit = explicit_path
        .map(str::to_string)
        .or_else(|| std::env::var("MESHGATE_CONFIG_PATH").ok().filter(|p| !p.is_empty()));

    if let Some(path) = explicit {
        if !Path::new(&path).exists() {
            bail!("Config file {path} does not exist");
        }
        return Ok(Some(path));
    }

    Ok(["config.yaml", "/config/config.yaml"]
        .into_iter()
        .find(|p| Path::new(p).exists())
        .map(str::to_string))
}
