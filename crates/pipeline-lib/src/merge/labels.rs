//! Subnet label merging
//!
//! Precedence is positional: admin labels first, then slice labels (when
//! slices are enabled), then cluster-detected labels. Within a group the
//! source order is kept and nothing is deduplicated across groups, so the
//! first matching label downstream wins.

use super::cidr::Cidr;
use crate::error::{BuildError, Result};
use crate::models::{NamespaceSlice, SubnetLabel};
use crate::status::{ResourceKey, StatusAccumulator};

const ADMIN_OWNER: &str = "admin";

fn slice_owner(slice: &NamespaceSlice) -> String {
    format!("slice '{}/{}'", slice.namespace, slice.name)
}

fn validate(owner: &str, labels: &[SubnetLabel]) -> Result<()> {
    for label in labels {
        for cidr in &label.cidrs {
            Cidr::parse(cidr)
                .map_err(|reason| BuildError::invalid_cidr(owner, &label.name, cidr, reason))?;
        }
    }
    Ok(())
}

/// Merge the three label sources into the ordered list attached to enrichment
pub fn merge_labels(
    admin: &[SubnetLabel],
    slices: &[NamespaceSlice],
    slices_enabled: bool,
    detected: &[SubnetLabel],
) -> Result<Vec<SubnetLabel>> {
    validate(ADMIN_OWNER, admin)?;
    let mut merged = admin.to_vec();

    if slices_enabled {
        for slice in slices {
            validate(&slice_owner(slice), &slice.subnet_labels)?;
            merged.extend(slice.subnet_labels.iter().cloned());
        }
    }

    merged.extend(detected.iter().cloned());
    Ok(merged)
}

/// Check each slice's subnet labels against admin labels and earlier
/// slices, and record readiness, configured counts and overlap warnings.
///
/// Overlaps are advisory; no entry is removed. A malformed CIDR marks the
/// slice failed and aborts.
pub fn audit_slice_subnets(
    admin: &[SubnetLabel],
    slices: &[NamespaceSlice],
    status: &mut StatusAccumulator,
) -> Result<()> {
    let mut known: Vec<(String, Vec<Cidr>)> = vec![(ADMIN_OWNER.to_string(), parse_all(admin))];

    for slice in slices {
        let key = ResourceKey::new(&slice.namespace, &slice.name);
        let owner = format!("{}/{}", slice.namespace, slice.name);
        let mut configured = 0;
        // A second build in the same pass rewrites the warning, never extends it
        status.clear_subnet_warning(&key);

        for label in &slice.subnet_labels {
            let mut parsed = Vec::with_capacity(label.cidrs.len());
            for raw in &label.cidrs {
                let cidr = match Cidr::parse(raw) {
                    Ok(cidr) => cidr,
                    Err(reason) => {
                        let err = BuildError::invalid_cidr(slice_owner(slice), &label.name, raw, reason);
                        status.set_slice_failure(&key, err.to_string());
                        return Err(err);
                    }
                };
                for (other_owner, others) in &known {
                    for other in others {
                        if other.covers(&cidr) {
                            status.add_subnet_warning(
                                &key,
                                &format!(
                                    "CIDR for '{}' ({}) is fully overlapped by config ({}: {})",
                                    label.name, cidr, other_owner, other
                                ),
                            );
                        } else if cidr.overlaps(other) {
                            status.add_subnet_warning(
                                &key,
                                &format!(
                                    "CIDR for '{}' ({}) overlaps with config ({}: {})",
                                    label.name, cidr, other_owner, other
                                ),
                            );
                        }
                    }
                }
                parsed.push(cidr);
            }
            if !parsed.is_empty() {
                configured += 1;
                known.push((owner.clone(), parsed));
            }
        }

        status.set_subnet_labels_configured(&key, configured);
        status.set_slice_ready(&key);
    }
    Ok(())
}

// Admin labels are validated by `merge_labels`; unparsable ones are ignored here.
fn parse_all(labels: &[SubnetLabel]) -> Vec<Cidr> {
    labels
        .iter()
        .flat_map(|l| l.cidrs.iter())
        .filter_map(|c| Cidr::parse(c).ok())
        .collect()
}
