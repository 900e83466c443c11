//! Label and filter merging
//!
//! - Subnet label precedence across admin, slice and detected sources
//! - Namespace keep-rules from the allow-list and slices

pub mod cidr;
pub mod filters;
pub mod labels;

pub use cidr::Cidr;
pub use filters::{all_target_filters, compose_filters, target_filters, SKIPPED_FILTER};
pub use labels::{audit_slice_subnets, merge_labels};
