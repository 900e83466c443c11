//! Pipeline assembly
//!
//! - Engine wire vocabulary
//! - Stage tree builder with per-kind reload classes
//! - Graph assembly, connection tracking and exporters
//! - Static/dynamic split and digest

pub mod api;
pub mod builder;
pub mod conntrack;
pub mod exporters;
pub mod graph;
pub mod split;

pub use builder::{Branch, PipelineBuilder, PipelineConfig, ReloadClass, StageKind};
pub use conntrack::conntrack_stage;
pub use graph::{build, Topology};
pub use split::{digest, rejoin, split, DynamicConfig, StaticConfig};
