//! Build error types

use std::num::ParseFloatError;
use thiserror::Error;

/// Result type for pipeline builds
pub type Result<T> = std::result::Result<T, BuildError>;

/// Errors that abort a build. No partial pipeline is ever returned.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A subnet label carries a value that is not a CIDR
    #[error("wrong CIDR for subnet label '{label}' in {owner}: '{cidr}' ({reason})")]
    InvalidCidr {
        /// Where the label came from (admin config or a slice)
        owner: String,
        label: String,
        cidr: String,
        reason: String,
    },

    /// A builtin metric definition cannot be converted
    #[error("error reading predefined FlowMetric '{name}': {source}")]
    BuiltinMetric {
        name: String,
        #[source]
        source: MetricError,
    },

    /// A configured sink lacks a required value
    #[error("{component} '{name}' is missing required field '{field}'")]
    MissingField {
        component: &'static str,
        name: String,
        field: &'static str,
    },

    /// Two stages were given the same name
    #[error("stage '{name}' already exists in the pipeline")]
    DuplicateStage { name: String },

    /// A stage was appended after a stage the builder does not know
    #[error("stage '{child}' follows unknown stage '{parent}'")]
    UnknownParent { parent: String, child: String },

    /// Failed to serialize a config document
    #[error("failed to serialize pipeline config: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl BuildError {
    pub fn invalid_cidr(
        owner: impl Into<String>,
        label: impl Into<String>,
        cidr: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidCidr {
            owner: owner.into(),
            label: label.into(),
            cidr: cidr.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_field(
        component: &'static str,
        name: impl Into<String>,
        field: &'static str,
    ) -> Self {
        Self::MissingField {
            component,
            name: name.into(),
            field,
        }
    }

    /// Errors that point at inconsistent builder use rather than bad input
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::BuiltinMetric { .. } | Self::DuplicateStage { .. } | Self::UnknownParent { .. }
        )
    }
}

/// Per-definition conversion failure; custom definitions failing this way
/// are skipped and reported instead of aborting the build.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MetricError {
    #[error("could not parse metric buckets as floats: '{value}': {source}")]
    InvalidBucket {
        value: String,
        #[source]
        source: ParseFloatError,
    },

    #[error("could not parse metric divider as float: '{value}': {source}")]
    InvalidDivider {
        value: String,
        #[source]
        source: ParseFloatError,
    },
}
