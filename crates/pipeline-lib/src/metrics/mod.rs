//! Metric definitions
//!
//! - Builtin catalog selection
//! - Three-way merge of builtin, custom and slice-scoped definitions
//! - Label cardinality classification

pub mod cardinality;
pub mod catalog;
pub mod merge;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use cardinality::{classify_cardinality, CardinalityLevel, CardinalityReport};
pub use catalog::{all_builtin_names, builtin_definitions, include_list};
pub use merge::{merge_metrics, metric_name_from_resource, to_definition};

/// Prefix the encoder puts in front of every exported metric name
pub const METRICS_PREFIX: &str = "netobserv_";

/// Where a merged definition came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricOrigin {
    #[default]
    Builtin,
    Custom,
    Slice,
}

/// Encoder-ready metric definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub metric_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub help: String,
    pub filters: Vec<MetricFilterItem>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value_key: String,
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub remap: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flatten: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buckets: Vec<f64>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub value_scale: f64,
    #[serde(skip)]
    pub origin: MetricOrigin,
}

fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

impl MetricDefinition {
    /// Name as it appears on the metrics endpoint
    pub fn exported_name(&self) -> String {
        format!("{}{}", METRICS_PREFIX, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricFilterItem {
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(rename = "type")]
    pub match_type: String,
}
