//! Filter rule composition
//!
//! Turns processor filters and namespace slices into keep-entry rules.
//! Allow-list entries wrapped in slashes (`/prod-.*/`) become regex
//! matches; anything else is an exact namespace match.

use crate::models::{CollectionMode, CollectionSpec, FilterTarget, NamespaceSlice};
use crate::pipeline::api::TransformFilterRule;
use crate::status::{ResourceKey, StatusAccumulator};
use std::collections::HashSet;

/// Recorded on a slice whose namespace was already kept by an earlier rule
pub const SKIPPED_FILTER: &str = "(skipped, not needed)";

fn exact_namespace_query(namespace: &str) -> String {
    format!(r#"SrcK8S_Namespace="{0}" or DstK8S_Namespace="{0}""#, namespace)
}

fn regex_namespace_query(pattern: &str) -> String {
    format!(r#"SrcK8S_Namespace=~"{0}" or DstK8S_Namespace=~"{0}""#, pattern)
}

/// Pattern inside `/.../`, if the entry is a regex
fn as_regex(entry: &str) -> Option<&str> {
    if entry.len() >= 2 {
        entry.strip_prefix('/').and_then(|e| e.strip_suffix('/'))
    } else {
        None
    }
}

fn clamp_sampling(sampling: u32) -> u16 {
    u16::try_from(sampling).unwrap_or(u16::MAX)
}

/// Namespace keep-rules derived from the allow-list and the slices.
///
/// Empty unless slices are enabled in allow-list mode. Admin entries come
/// first in configuration order, then one rule per slice carrying the
/// slice's sampling. Each slice's applied query is recorded in `status`.
pub fn compose_filters(
    spec: &CollectionSpec,
    slices: &[NamespaceSlice],
    status: &mut StatusAccumulator,
) -> Vec<TransformFilterRule> {
    let config = &spec.processor.slices_config;
    if !config.enable || config.collection_mode == CollectionMode::AlwaysCollect {
        return Vec::new();
    }

    let mut processed: HashSet<&str> = HashSet::new();
    let mut rules = Vec::new();

    for entry in &config.namespaces_allow_list {
        if let Some(pattern) = as_regex(entry) {
            rules.push(TransformFilterRule::keep_entry_query(regex_namespace_query(pattern), 0));
        } else if processed.insert(entry.as_str()) {
            rules.push(TransformFilterRule::keep_entry_query(exact_namespace_query(entry), 0));
        }
    }

    for slice in slices {
        let key = ResourceKey::new(&slice.namespace, &slice.name);
        if processed.insert(slice.namespace.as_str()) {
            let query = exact_namespace_query(&slice.namespace);
            status.set_filter_applied(&key, query.clone());
            rules.push(TransformFilterRule::keep_entry_query(
                query,
                clamp_sampling(slice.sampling),
            ));
        } else {
            status.set_filter_applied(&key, SKIPPED_FILTER);
        }
    }

    rules
}

/// Processor filters scoped to `target`, in configuration order
pub fn target_filters(spec: &CollectionSpec, target: FilterTarget) -> Vec<TransformFilterRule> {
    spec.processor
        .filters
        .iter()
        .filter(|f| f.output_target == target)
        .map(|f| TransformFilterRule::keep_entry_query(f.query.clone(), clamp_sampling(f.sampling)))
        .collect()
}

/// Rules applied to every record: admin `All` filters, then namespace rules
pub fn all_target_filters(
    spec: &CollectionSpec,
    namespace_rules: Vec<TransformFilterRule>,
) -> Vec<TransformFilterRule> {
    let mut rules = target_filters(spec, FilterTarget::All);
    rules.extend(namespace_rules);
    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProcessorFilter;
    use pretty_assertions::assert_eq;

    fn slice(namespace: &str, name: &str, sampling: u32) -> NamespaceSlice {
        NamespaceSlice {
            name: name.to_string(),
            namespace: namespace.to_string(),
            sampling,
            subnet_labels: Vec::new(),
        }
    }

    fn allow_list_spec(entries: &[&str]) -> CollectionSpec {
        let mut spec = CollectionSpec::default();
        spec.processor.slices_config.enable = true;
        spec.processor.slices_config.collection_mode = CollectionMode::AllowList;
        spec.processor.slices_config.namespaces_allow_list =
            entries.iter().map(|e| e.to_string()).collect();
        spec
    }

    fn queries(rules: &[TransformFilterRule]) -> Vec<&str> {
        rules
            .iter()
            .map(|r| r.keep_entry_query.as_deref().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_no_rules_when_slices_disabled() {
        let mut spec = allow_list_spec(&["ns1"]);
        spec.processor.slices_config.enable = false;
        let mut status = StatusAccumulator::new();
        assert!(compose_filters(&spec, &[slice("ns1", "s1", 0)], &mut status).is_empty());
    }

    #[test]
    fn test_no_rules_in_always_collect_mode() {
        let mut spec = allow_list_spec(&["ns1"]);
        spec.processor.slices_config.collection_mode = CollectionMode::AlwaysCollect;
        let mut status = StatusAccumulator::new();
        assert!(compose_filters(&spec, &[slice("ns1", "s1", 0)], &mut status).is_empty());
    }

    #[test]
    fn test_regex_allow_list_then_slices() {
        let spec = allow_list_spec(&["/should-.*/"]);
        let slices = vec![slice("ns1", "s1", 0), slice("ns2", "s2", 10)];
        let mut status = StatusAccumulator::new();

        let rules = compose_filters(&spec, &slices, &mut status);
        assert_eq!(
            queries(&rules),
            vec![
                r#"SrcK8S_Namespace=~"should-.*" or DstK8S_Namespace=~"should-.*""#,
                r#"SrcK8S_Namespace="ns1" or DstK8S_Namespace="ns1""#,
                r#"SrcK8S_Namespace="ns2" or DstK8S_Namespace="ns2""#,
            ]
        );
        assert_eq!(rules[1].keep_entry_sampling, None);
        assert_eq!(rules[2].keep_entry_sampling, Some(10));

        let s2 = status.slice(&ResourceKey::new("ns2", "s2")).unwrap();
        assert_eq!(s2.filter_applied, r#"SrcK8S_Namespace="ns2" or DstK8S_Namespace="ns2""#);
    }

    #[test]
    fn test_exact_entries_are_deduplicated() {
        let spec = allow_list_spec(&["ns1", "ns1", "/ns.*/", "/ns.*/"]);
        let slices = vec![slice("ns1", "s1", 0), slice("ns2", "a", 0), slice("ns2", "b", 0)];
        let mut status = StatusAccumulator::new();

        let rules = compose_filters(&spec, &slices, &mut status);
        // regexes are not deduplicated, exact namespaces are
        assert_eq!(rules.len(), 4);
        assert_eq!(
            status.slice(&ResourceKey::new("ns1", "s1")).unwrap().filter_applied,
            SKIPPED_FILTER
        );
        assert_eq!(
            status.slice(&ResourceKey::new("ns2", "b")).unwrap().filter_applied,
            SKIPPED_FILTER
        );
    }

    #[test]
    fn test_single_slash_is_exact() {
        let spec = allow_list_spec(&["/"]);
        let mut status = StatusAccumulator::new();
        let rules = compose_filters(&spec, &[], &mut status);
        assert_eq!(queries(&rules), vec![r#"SrcK8S_Namespace="/" or DstK8S_Namespace="/""#]);
    }

    #[test]
    fn test_admin_filters_precede_namespace_rules() {
        let mut spec = CollectionSpec::default();
        spec.processor.filters = vec![
            ProcessorFilter {
                query: "Proto=6".to_string(),
                output_target: FilterTarget::All,
                sampling: 0,
            },
            ProcessorFilter {
                query: "Proto=17".to_string(),
                output_target: FilterTarget::Loki,
                sampling: 0,
            },
        ];
        let namespace_rules = vec![TransformFilterRule::keep_entry_query("ns".to_string(), 0)];

        let rules = all_target_filters(&spec, namespace_rules);
        assert_eq!(queries(&rules), vec!["Proto=6", "ns"]);
        assert_eq!(queries(&target_filters(&spec, FilterTarget::Loki)), vec!["Proto=17"]);
        assert!(target_filters(&spec, FilterTarget::Metrics).is_empty());
    }
}
