//! Per-pass status accumulation
//!
//! Builds record metric and slice conditions into a [`StatusAccumulator`]
//! owned by the enclosing reconciliation pass. The pass drains it once,
//! after every topology has been built, and hands the resulting
//! [`StatusReport`] to a [`StatusSink`].

use crate::metrics::cardinality::CardinalityReport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Warnings appended to a subnet warning condition stop growing past this length
const MAX_WARNING_MESSAGE_LEN: usize = 500;

/// Condition types
pub mod conditions {
    pub const READY: &str = "Ready";
    pub const CARDINALITY_WARNING: &str = "CardinalityWarning";
    pub const SUBNET_WARNING: &str = "SubnetWarning";
}

const CONFIGURED_MESSAGE: &str = "flowlogs-pipeline configured";

/// Identity of a namespaced resource
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
}

/// A single status condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_timestamp: i64,
}

impl Condition {
    fn new(
        condition_type: &str,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            condition_type: condition_type.to_string(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn ready() -> Self {
        Self::new(conditions::READY, ConditionStatus::True, "Ready", CONFIGURED_MESSAGE)
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(conditions::READY, ConditionStatus::False, "Failure", message)
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Accumulated status of one metric resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready: Option<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prometheus_name: Option<String>,
}

/// Accumulated status of one namespace slice
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready: Option<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet_warning: Option<Condition>,
    pub filter_applied: String,
    pub subnet_labels_configured: usize,
}

/// Context-scoped condition store. Later writes to the same resource win.
#[derive(Debug, Clone, Default)]
pub struct StatusAccumulator {
    metrics: BTreeMap<ResourceKey, MetricStatus>,
    slices: BTreeMap<ResourceKey, SliceStatus>,
}

impl StatusAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything recorded so far
    pub fn reset(&mut self) {
        self.metrics.clear();
        self.slices.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.slices.is_empty()
    }

    pub fn set_metric_ready(&mut self, key: &ResourceKey) {
        self.metrics.entry(key.clone()).or_default().ready = Some(Condition::ready());
    }

    pub fn set_metric_failure(&mut self, key: &ResourceKey, message: impl Into<String>) {
        self.metrics.entry(key.clone()).or_default().ready = Some(Condition::failure(message));
    }

    pub fn set_prometheus_name(&mut self, key: &ResourceKey, name: impl Into<String>) {
        self.metrics.entry(key.clone()).or_default().prometheus_name = Some(name.into());
    }

    /// Record the cardinality condition; the warning is raised for risky or unknown labels
    pub fn record_cardinality(&mut self, key: &ResourceKey, report: &CardinalityReport) {
        let overall = report.overall();
        let status = if overall.is_warning() {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        };
        self.metrics.entry(key.clone()).or_default().cardinality = Some(Condition::new(
            conditions::CARDINALITY_WARNING,
            status,
            overall.as_str(),
            report.details(),
        ));
    }

    pub fn set_slice_ready(&mut self, key: &ResourceKey) {
        self.slices.entry(key.clone()).or_default().ready = Some(Condition::ready());
    }

    pub fn set_slice_failure(&mut self, key: &ResourceKey, message: impl Into<String>) {
        self.slices.entry(key.clone()).or_default().ready = Some(Condition::failure(message));
    }

    pub fn set_filter_applied(&mut self, key: &ResourceKey, summary: impl Into<String>) {
        self.slices.entry(key.clone()).or_default().filter_applied = summary.into();
    }

    pub fn set_subnet_labels_configured(&mut self, key: &ResourceKey, count: usize) {
        self.slices.entry(key.clone()).or_default().subnet_labels_configured = count;
    }

    pub fn clear_subnet_warning(&mut self, key: &ResourceKey) {
        if let Some(entry) = self.slices.get_mut(key) {
            entry.subnet_warning = None;
        }
    }

    /// Append to the slice's subnet warning, capping the message length
    pub fn add_subnet_warning(&mut self, key: &ResourceKey, message: &str) {
        let entry = self.slices.entry(key.clone()).or_default();
        match entry.subnet_warning.as_mut() {
            Some(existing) => {
                if existing.message.len() < MAX_WARNING_MESSAGE_LEN {
                    existing.message.push_str("; ");
                    existing.message.push_str(message);
                }
            }
            None => {
                entry.subnet_warning = Some(Condition::new(
                    conditions::SUBNET_WARNING,
                    ConditionStatus::True,
                    "SubnetOverlap",
                    message,
                ));
            }
        }
    }

    pub fn metric(&self, key: &ResourceKey) -> Option<&MetricStatus> {
        self.metrics.get(key)
    }

    pub fn slice(&self, key: &ResourceKey) -> Option<&SliceStatus> {
        self.slices.get(key)
    }

    /// Take every entry carrying a ready condition, leaving the accumulator empty.
    /// Entries without one were never reached by a build and are dropped.
    pub fn drain(&mut self) -> StatusReport {
        let metrics = std::mem::take(&mut self.metrics)
            .into_iter()
            .filter(|(_, s)| s.ready.is_some())
            .collect();
        let slices = std::mem::take(&mut self.slices)
            .into_iter()
            .filter(|(_, s)| s.ready.is_some())
            .collect();
        StatusReport { metrics, slices }
    }
}

/// Drained status of a whole pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub metrics: BTreeMap<ResourceKey, MetricStatus>,
    pub slices: BTreeMap<ResourceKey, SliceStatus>,
}

impl StatusReport {
    pub fn failed_metrics(&self) -> usize {
        self.metrics
            .values()
            .filter(|s| s.ready.as_ref().is_some_and(|c| !c.is_true()))
            .count()
    }

    pub fn cardinality_warnings(&self) -> usize {
        self.metrics
            .values()
            .filter(|s| s.cardinality.as_ref().is_some_and(Condition::is_true))
            .count()
    }
}

/// Receives the drained report, typically to patch resource status
pub trait StatusSink {
    fn publish(&mut self, report: &StatusReport);
}

/// Sink that keeps the last published report in memory
#[derive(Debug, Default)]
pub struct MemoryStatusSink {
    pub last: Option<StatusReport>,
    pub publish_count: usize,
}

impl StatusSink for MemoryStatusSink {
    fn publish(&mut self, report: &StatusReport) {
        self.last = Some(report.clone());
        self.publish_count += 1;
    }
}

#[cfg(test)]
mod tests;
