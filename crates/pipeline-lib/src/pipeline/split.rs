//! Static/dynamic split and change digest
//!
//! Static parameters ship in the workload config; a change to them means a
//! restart, detected through the digest. Dynamic parameters go to a
//! side-channel the engine polls.

use super::api::{Stage, StageParam};
use super::builder::{PipelineConfig, ReloadClass};
use super::graph::Topology;
use crate::error::Result;
use crate::metrics::METRICS_PREFIX;
use crate::models::CollectionSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const CONFIG_FILE_NAME: &str = "config.json";

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Workload name the engine runs under for a topology
pub fn workload_name(topology: Topology) -> &'static str {
    match topology {
        Topology::Direct => "flowlogs-pipeline",
        Topology::Transformer => "flowlogs-pipeline-transformer",
    }
}

/// Name of the side-channel holding the dynamic parameters
pub fn dynamic_config_name(topology: Topology) -> String {
    format!("{}-config-dynamic", workload_name(topology))
}

/// Partition parameters by the reload class of their stage, keeping order.
/// A parameter whose stage kind is unknown is treated as static.
pub fn split(config: &PipelineConfig) -> (Vec<StageParam>, Vec<StageParam>) {
    config.parameters.iter().cloned().partition(|p| {
        config
            .kind_of(&p.name)
            .map_or(true, |kind| kind.reload() == ReloadClass::Static)
    })
}

/// Full parameter list in stage order, from both halves of a split
pub fn rejoin(
    stages: &[Stage],
    static_params: &[StageParam],
    dynamic_params: &[StageParam],
) -> Vec<StageParam> {
    let by_name: HashMap<&str, &StageParam> = static_params
        .iter()
        .chain(dynamic_params)
        .map(|p| (p.name.as_str(), p))
        .collect();
    stages
        .iter()
        .filter_map(|s| by_name.get(s.name.as_str()).map(|p| (*p).clone()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSettings {
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSettings {
    pub port: u16,
    pub prefix: String,
    pub no_panic: bool,
}

/// Where the engine finds the dynamic parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicParametersRef {
    pub namespace: String,
    pub name: String,
    pub file_name: String,
}

/// Restart-requiring engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticConfig {
    #[serde(rename = "log-level")]
    pub log_level: String,
    pub health: HealthSettings,
    pub pipeline: Vec<Stage>,
    pub parameters: Vec<StageParam>,
    pub metrics_settings: MetricsSettings,
    pub dynamic_parameters: DynamicParametersRef,
}

impl StaticConfig {
    pub fn new(
        spec: &CollectionSpec,
        topology: Topology,
        config: &PipelineConfig,
        static_params: Vec<StageParam>,
    ) -> Self {
        Self {
            log_level: spec.processor.log_level.clone(),
            health: HealthSettings {
                port: spec.processor.advanced.health_port,
            },
            pipeline: config.stages.clone(),
            parameters: static_params,
            metrics_settings: MetricsSettings {
                port: spec.processor.metrics.server.port,
                prefix: METRICS_PREFIX.to_string(),
                no_panic: true,
            },
            dynamic_parameters: DynamicParametersRef {
                namespace: spec.namespace.clone(),
                name: dynamic_config_name(topology),
                file_name: CONFIG_FILE_NAME.to_string(),
            },
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Hot-reloadable engine configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DynamicConfig {
    pub parameters: Vec<StageParam>,
}

impl DynamicConfig {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

pub fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

pub fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::with_capacity(13);
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Change-detection digest of the serialized static document
pub fn digest(config: &StaticConfig) -> Result<String> {
    let bytes = serde_json::to_vec(config)?;
    Ok(to_base36(fnv1a64(&bytes)))
}
