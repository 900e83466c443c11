//! Stage tree builder
//!
//! Stages are appended under a parent that already exists, so the tree
//! never holds forward references. A frontier maps each logical branch to
//! the stage its next extension follows.

use super::api::{Stage, StageParam};
use crate::error::{BuildError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Whether the running engine can pick up a stage change without restart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadClass {
    Static,
    Dynamic,
}

/// What a stage does, declared when it is appended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Ingest,
    GlobalFilter,
    ConnTrack,
    Enrich,
    /// Admin and namespace filters applied to every record
    CustomFilter,
    Dedup,
    /// Filter in front of a single sink branch
    TargetFilter,
    LokiWrite,
    PromEncode,
    KafkaExport,
    IpfixExport,
    OtelTransform,
    OtelLogs,
    OtelMetrics,
    Trace,
}

impl StageKind {
    pub fn reload(self) -> ReloadClass {
        match self {
            Self::CustomFilter | Self::PromEncode => ReloadClass::Dynamic,
            _ => ReloadClass::Static,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::GlobalFilter => "global_filter",
            Self::ConnTrack => "conn_track",
            Self::Enrich => "enrich",
            Self::CustomFilter => "custom_filter",
            Self::Dedup => "dedup",
            Self::TargetFilter => "target_filter",
            Self::LokiWrite => "loki_write",
            Self::PromEncode => "prom_encode",
            Self::KafkaExport => "kafka_export",
            Self::IpfixExport => "ipfix_export",
            Self::OtelTransform => "otel_transform",
            Self::OtelLogs => "otel_logs",
            Self::OtelMetrics => "otel_metrics",
            Self::Trace => "trace",
        }
    }
}

impl ReloadClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
        }
    }
}

/// Logical branches of the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Branch {
    /// Ingest through dedup
    Main,
    Loki,
    Metrics,
    Exporters,
}

/// Assembled stage tree with the parameters of each stage, in append order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub stages: Vec<Stage>,
    pub parameters: Vec<StageParam>,
    #[serde(skip)]
    pub kinds: BTreeMap<String, StageKind>,
}

impl PipelineConfig {
    pub fn kind_of(&self, name: &str) -> Option<StageKind> {
        self.kinds.get(name).copied()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Serialized `name`/`follows` list, the shape change detection compares
    pub fn stages_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.stages)?)
    }
}

#[derive(Debug)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    names: HashSet<String>,
    frontier: BTreeMap<Branch, String>,
}

impl PipelineBuilder {
    /// Start a tree at its root stage; the main branch points at it
    pub fn new(kind: StageKind, param: StageParam) -> Self {
        let root = param.name.clone();
        let mut builder = Self {
            config: PipelineConfig::default(),
            names: HashSet::new(),
            frontier: BTreeMap::new(),
        };
        builder.push(None, kind, param);
        builder.frontier.insert(Branch::Main, root);
        builder
    }

    /// Stage the next extension of `branch` would follow
    pub fn head(&self, branch: Branch) -> Option<&str> {
        self.frontier.get(&branch).map(String::as_str)
    }

    /// Open `branch` at the current head of `from`
    pub fn fork(&mut self, from: Branch, branch: Branch) -> Result<()> {
        let head = self.require_head(from, branch_label(branch))?;
        self.frontier.insert(branch, head);
        Ok(())
    }

    /// Append after the head of `branch` and move the head to the new stage
    pub fn extend(&mut self, branch: Branch, kind: StageKind, param: StageParam) -> Result<String> {
        let parent = self.require_head(branch, &param.name)?;
        let name = self.append(&parent, kind, param)?;
        self.frontier.insert(branch, name.clone());
        Ok(name)
    }

    /// Append a leaf after the head of `branch`; the head stays put
    pub fn attach(&mut self, branch: Branch, kind: StageKind, param: StageParam) -> Result<String> {
        let parent = self.require_head(branch, &param.name)?;
        self.append(&parent, kind, param)
    }

    /// Append after an existing stage
    pub fn append(&mut self, parent: &str, kind: StageKind, param: StageParam) -> Result<String> {
        if !self.names.contains(parent) {
            return Err(BuildError::UnknownParent {
                parent: parent.to_string(),
                child: param.name.clone(),
            });
        }
        if self.names.contains(&param.name) {
            return Err(BuildError::DuplicateStage { name: param.name });
        }
        let name = param.name.clone();
        self.push(Some(parent.to_string()), kind, param);
        Ok(name)
    }

    pub fn len(&self) -> usize {
        self.config.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.config.stages.is_empty()
    }

    pub fn finish(self) -> PipelineConfig {
        self.config
    }

    fn require_head(&self, branch: Branch, child: &str) -> Result<String> {
        self.frontier
            .get(&branch)
            .cloned()
            .ok_or_else(|| BuildError::UnknownParent {
                parent: branch_label(branch).to_string(),
                child: child.to_string(),
            })
    }

    fn push(&mut self, follows: Option<String>, kind: StageKind, param: StageParam) {
        let name = param.name.clone();
        self.names.insert(name.clone());
        self.config.kinds.insert(name.clone(), kind);
        self.config.stages.push(Stage { name, follows });
        self.config.parameters.push(param);
    }
}

fn branch_label(branch: Branch) -> &'static str {
    match branch {
        Branch::Main => "<main>",
        Branch::Loki => "<loki>",
        Branch::Metrics => "<metrics>",
        Branch::Exporters => "<exporters>",
    }
}
