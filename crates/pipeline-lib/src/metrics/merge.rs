//! Metric merging
//!
//! Output order is builtin, then custom, then slice-scoped, each group in
//! input order. Definitions are not deduplicated by name.

use super::cardinality::classify_cardinality;
use super::{MetricDefinition, MetricFilterItem, MetricOrigin};
use crate::error::{BuildError, MetricError, Result};
use crate::models::{FlowDirection, FlowMetric, FlowMetricSpec, MatchType, NamespaceSlice};
use crate::status::{ResourceKey, StatusAccumulator};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn invalid_name_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-zA-Z0-9_]").unwrap_or_else(|_| unreachable!()))
}

/// Metric name derived from a resource name (`te-st` becomes `te_st`)
pub fn metric_name_from_resource(name: &str) -> String {
    invalid_name_chars().replace_all(name, "_").into_owned()
}

/// Filters of a definition, with the direction scope appended
fn filters_of(spec: &FlowMetricSpec) -> Vec<MetricFilterItem> {
    let mut filters: Vec<MetricFilterItem> = spec
        .filters
        .iter()
        .map(|f| MetricFilterItem {
            key: f.field.clone(),
            value: f.value.clone(),
            match_type: f.match_type.as_str().to_string(),
        })
        .collect();

    let direction = match spec.direction {
        FlowDirection::Any => None,
        FlowDirection::Egress => Some("1|2"),
        FlowDirection::Ingress => Some("0|2"),
    };
    if let Some(regex) = direction {
        filters.push(MetricFilterItem {
            key: "FlowDirection".to_string(),
            value: regex.to_string(),
            match_type: MatchType::MatchRegex.as_str().to_string(),
        });
    }
    filters
}

/// Convert one definition into the encoder shape
pub fn to_definition(
    spec: &FlowMetricSpec,
    resource_name: &str,
    origin: MetricOrigin,
) -> std::result::Result<MetricDefinition, MetricError> {
    let name = if spec.metric_name.is_empty() {
        metric_name_from_resource(resource_name)
    } else {
        spec.metric_name.clone()
    };

    let buckets = spec
        .buckets
        .iter()
        .map(|b| {
            b.trim().parse::<f64>().map_err(|source| MetricError::InvalidBucket {
                value: b.clone(),
                source,
            })
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let value_scale = if spec.divider.is_empty() {
        0.0
    } else {
        spec.divider
            .trim()
            .parse::<f64>()
            .map_err(|source| MetricError::InvalidDivider {
                value: spec.divider.clone(),
                source,
            })?
    };

    Ok(MetricDefinition {
        name,
        metric_type: spec.metric_type.as_str().to_string(),
        help: spec.help.clone(),
        filters: filters_of(spec),
        value_key: spec.value_field.clone(),
        labels: spec.labels.clone(),
        remap: spec.remap.clone(),
        flatten: spec.flatten.clone(),
        buckets,
        value_scale,
        origin,
    })
}

/// Merge builtin, custom and slice-scoped definitions.
///
/// A metric resource whose namespace belongs to an active slice is
/// slice-scoped, any other resource is custom. A broken builtin aborts the
/// merge; a broken resource is marked failed and left out. Every
/// converted resource gets its exported name, cardinality condition and a
/// ready condition recorded.
pub fn merge_metrics(
    builtins: &[FlowMetricSpec],
    resources: &[FlowMetric],
    slices: &[NamespaceSlice],
    slices_enabled: bool,
    status: &mut StatusAccumulator,
) -> Result<Vec<MetricDefinition>> {
    let mut merged = Vec::with_capacity(builtins.len() + resources.len());

    for spec in builtins {
        let def = to_definition(spec, &spec.metric_name, MetricOrigin::Builtin).map_err(
            |source| BuildError::BuiltinMetric {
                name: spec.metric_name.clone(),
                source,
            },
        )?;
        merged.push(def);
    }

    let slice_namespaces: HashSet<&str> = if slices_enabled {
        slices.iter().map(|s| s.namespace.as_str()).collect()
    } else {
        HashSet::new()
    };
    let (sliced, custom): (Vec<&FlowMetric>, Vec<&FlowMetric>) = resources
        .iter()
        .partition(|fm| slice_namespaces.contains(fm.namespace.as_str()));

    for (group, origin) in [(custom, MetricOrigin::Custom), (sliced, MetricOrigin::Slice)] {
        for fm in group {
            let key = ResourceKey::new(&fm.namespace, &fm.name);
            match to_definition(&fm.spec, &fm.name, origin) {
                Ok(def) => {
                    status.set_prometheus_name(&key, def.exported_name());
                    status.record_cardinality(&key, &classify_cardinality(&fm.spec.labels));
                    status.set_metric_ready(&key);
                    merged.push(def);
                }
                Err(err) => status.set_metric_failure(&key, err.to_string()),
            }
        }
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::catalog::builtin_definitions;
    use crate::models::{CollectionSpec, MetricFilter, MetricType};
    use pretty_assertions::assert_eq;

    fn flow_metric(namespace: &str, name: &str, spec: FlowMetricSpec) -> FlowMetric {
        FlowMetric {
            name: name.to_string(),
            namespace: namespace.to_string(),
            spec,
        }
    }

    fn slice(namespace: &str) -> NamespaceSlice {
        NamespaceSlice {
            name: "slice".to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_name_sanitization() {
        assert_eq!(metric_name_from_resource("te-st"), "te_st");
        assert_eq!(metric_name_from_resource("a.b/c"), "a_b_c");
        assert_eq!(metric_name_from_resource("ok_name1"), "ok_name1");
    }

    #[test]
    fn test_conversion_shape() {
        let spec = FlowMetricSpec {
            metric_type: MetricType::Histogram,
            value_field: "TimeFlowRttNs".to_string(),
            labels: vec!["SrcK8S_Namespace".to_string()],
            filters: vec![MetricFilter {
                field: "Proto".to_string(),
                value: "6|17".to_string(),
                match_type: MatchType::MatchRegex,
            }],
            direction: FlowDirection::Egress,
            buckets: vec![".5".to_string(), "1".to_string()],
            divider: "1000".to_string(),
            ..Default::default()
        };
        let def = to_definition(&spec, "my-rtt", MetricOrigin::Custom).unwrap();
        assert_eq!(def.name, "my_rtt");
        assert_eq!(def.metric_type, "histogram");
        assert_eq!(def.buckets, vec![0.5, 1.0]);
        assert_eq!(def.value_scale, 1000.0);
        assert_eq!(def.filters.len(), 2);
        assert_eq!(def.filters[0].match_type, "match_regex");
        assert_eq!(def.filters[1].key, "FlowDirection");
        assert_eq!(def.filters[1].value, "1|2");
    }

    #[test]
    fn test_ingress_direction_filter() {
        let spec = FlowMetricSpec {
            direction: FlowDirection::Ingress,
            ..Default::default()
        };
        let def = to_definition(&spec, "m", MetricOrigin::Custom).unwrap();
        assert_eq!(def.filters[0].value, "0|2");
    }

    #[test]
    fn test_bad_bucket_and_divider() {
        let spec = FlowMetricSpec {
            buckets: vec!["1".to_string(), "one".to_string()],
            ..Default::default()
        };
        let err = to_definition(&spec, "m", MetricOrigin::Custom).unwrap_err();
        assert!(err.to_string().contains("could not parse metric buckets as floats: 'one'"));

        let spec = FlowMetricSpec {
            divider: "ten".to_string(),
            ..Default::default()
        };
        let err = to_definition(&spec, "m", MetricOrigin::Custom).unwrap_err();
        assert!(matches!(err, MetricError::InvalidDivider { .. }));
    }

    #[test]
    fn test_default_merge_has_eight_builtins() {
        let builtins = builtin_definitions(&CollectionSpec::default());
        let mut status = StatusAccumulator::new();
        let merged = merge_metrics(&builtins, &[], &[], false, &mut status).unwrap();
        assert_eq!(merged.len(), 8);
        assert!(merged.iter().all(|m| m.origin == MetricOrigin::Builtin));
        assert!(status.is_empty());
    }

    #[test]
    fn test_one_custom_metric_appended() {
        let builtins = builtin_definitions(&CollectionSpec::default());
        let custom = vec![flow_metric("ns1", "te-st", FlowMetricSpec::default())];
        let mut status = StatusAccumulator::new();

        let merged = merge_metrics(&builtins, &custom, &[], false, &mut status).unwrap();
        assert_eq!(merged.len(), 9);
        assert_eq!(merged[8].name, "te_st");
        assert_eq!(merged[8].origin, MetricOrigin::Custom);

        let mut names: Vec<&str> = merged.iter().map(|d| d.name.as_str()).collect();
        names.sort();
        let mut expected: Vec<&str> = builtins.iter().map(|b| b.metric_name.as_str()).collect();
        expected.push("te_st");
        expected.sort();
        assert_eq!(names, expected);
        // sorting moves the custom name ahead of the workload metrics
        assert_ne!(names.last(), Some(&"te_st"));

        let recorded = status.metric(&ResourceKey::new("ns1", "te-st")).unwrap();
        assert_eq!(recorded.prometheus_name.as_deref(), Some("netobserv_te_st"));
        assert!(recorded.ready.as_ref().unwrap().is_true());
        assert!(recorded.cardinality.is_some());
    }

    #[test]
    fn test_failing_custom_metric_is_skipped() {
        let bad = FlowMetricSpec {
            divider: "x".to_string(),
            ..Default::default()
        };
        let custom = vec![
            flow_metric("ns1", "bad", bad),
            flow_metric("ns1", "good", FlowMetricSpec::default()),
        ];
        let mut status = StatusAccumulator::new();

        let merged = merge_metrics(&[], &custom, &[], false, &mut status).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name, "good");
        let failed = status.metric(&ResourceKey::new("ns1", "bad")).unwrap();
        assert!(!failed.ready.as_ref().unwrap().is_true());
    }

    #[test]
    fn test_broken_builtin_aborts() {
        let builtins = vec![FlowMetricSpec {
            metric_name: "broken".to_string(),
            buckets: vec!["?".to_string()],
            ..Default::default()
        }];
        let mut status = StatusAccumulator::new();
        let err = merge_metrics(&builtins, &[], &[], false, &mut status).unwrap_err();
        assert!(err.is_internal());
        assert!(err.to_string().contains("error reading predefined FlowMetric 'broken'"));
    }

    #[test]
    fn test_slice_metrics_come_last() {
        let resources = vec![
            flow_metric("team-a", "a1", FlowMetricSpec::default()),
            flow_metric("other", "o1", FlowMetricSpec::default()),
            flow_metric("team-a", "a2", FlowMetricSpec::default()),
        ];
        let slices = vec![slice("team-a")];
        let mut status = StatusAccumulator::new();

        let merged = merge_metrics(&[], &resources, &slices, true, &mut status).unwrap();
        let names: Vec<_> = merged.iter().map(|m| (m.name.as_str(), m.origin)).collect();
        assert_eq!(
            names,
            vec![
                ("o1", MetricOrigin::Custom),
                ("a1", MetricOrigin::Slice),
                ("a2", MetricOrigin::Slice),
            ]
        );

        // slices disabled: everything is custom, input order kept
        let merged = merge_metrics(&[], &resources, &slices, false, &mut status).unwrap();
        assert!(merged.iter().all(|m| m.origin == MetricOrigin::Custom));
        assert_eq!(merged[0].name, "a1");
    }

    #[test]
    fn test_same_name_is_not_deduplicated() {
        let spec = FlowMetricSpec {
            metric_name: "dup".to_string(),
            ..Default::default()
        };
        let resources = vec![
            flow_metric("ns1", "one", spec.clone()),
            flow_metric("ns2", "two", spec),
        ];
        let mut status = StatusAccumulator::new();
        let merged = merge_metrics(&[], &resources, &[], false, &mut status).unwrap();
        assert_eq!(merged.len(), 2);
    }
}
