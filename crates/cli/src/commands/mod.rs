//! CLI command implementations

pub mod build;
pub mod inspect;

use anyhow::{Context, Result};
use pipeline_lib::BuildInput;
use std::path::Path;

/// Read a build bundle (`{spec, flowMetrics, slices, detectedSubnets, clusterId}`)
pub fn load_bundle(path: &Path) -> Result<BuildInput> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read bundle {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse bundle {}", path.display()))
}
