//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI settings, read from the config file then `FLOWPIPE_*` variables
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Topology built when none is given on the command line
    pub default_topology: Option<String>,
    /// Default output format
    pub default_format: Option<String>,
    /// Emit logs as JSON lines
    pub json_logs: bool,
}

impl Settings {
    /// Load settings from `path`, or from the default location when `None`.
    /// A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let settings = config::Config::builder()
            .add_source(
                config::File::from(path.clone())
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(config::Environment::with_prefix("FLOWPIPE"))
            .build()
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        settings
            .try_deserialize()
            .context("Failed to parse settings")
    }

    /// Get the configuration file path
    fn config_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("flowpipe").join("config.json"))
    }
}
