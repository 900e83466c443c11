//! Flow pipeline compiler
//!
//! This crate turns a flow collection spec into the stage graph run by
//! flowlogs-pipeline:
//! - Builtin, custom and slice-scoped metric merging with cardinality classification
//! - Subnet label precedence and namespace filter composition
//! - Connection tracking configuration
//! - Stage graph assembly for the direct and queue-consuming topologies
//! - Static/dynamic config split with a change digest

pub mod error;
pub mod merge;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod pass;
pub mod pipeline;
pub mod status;

pub use error::{BuildError, MetricError, Result};
pub use models::*;
pub use observability::{CompilerMetrics, StructuredLogger};
pub use pass::{CompiledPipeline, ReconcilePass};
pub use pipeline::{PipelineConfig, Topology};
pub use status::{MemoryStatusSink, StatusAccumulator, StatusReport, StatusSink};
