//! Builtin metric catalog
//!
//! Per-group traffic, latency, drop, DNS, policy and IPsec metrics for the
//! node, namespace and workload aggregation levels, plus one node-to-node
//! flow counter. The include list selects from it; disabled agent features
//! remove the metrics that would stay empty.

use crate::models::{
    CollectionSpec, FlowDirection, LogTypes, MatchType, MetricFilter, MetricType, FlowMetricSpec,
};
use std::collections::BTreeMap;

const GROUPS: [&str; 3] = ["node", "namespace", "workload"];

const LATENCY_BUCKETS: [&str; 10] = [".005", ".01", ".02", ".03", ".04", ".05", ".075", ".1", ".25", "1"];

const NODE_LABELS: &[&str] = &[
    "K8S_ClusterName",
    "SrcK8S_Zone",
    "DstK8S_Zone",
    "SrcK8S_HostName",
    "DstK8S_HostName",
    "TLSVersion",
];

const NAMESPACE_LABELS: &[&str] = &[
    "K8S_ClusterName",
    "SrcK8S_Zone",
    "DstK8S_Zone",
    "SrcK8S_Namespace",
    "DstK8S_Namespace",
    "K8S_FlowLayer",
    "SrcSubnetLabel",
    "DstSubnetLabel",
    "TLSVersion",
];

const WORKLOAD_LABELS: &[&str] = &[
    "K8S_ClusterName",
    "SrcK8S_Zone",
    "DstK8S_Zone",
    "SrcK8S_Namespace",
    "DstK8S_Namespace",
    "K8S_FlowLayer",
    "SrcSubnetLabel",
    "DstSubnetLabel",
    "SrcK8S_OwnerName",
    "DstK8S_OwnerName",
    "SrcK8S_OwnerType",
    "DstK8S_OwnerType",
    "SrcK8S_Type",
    "DstK8S_Type",
    "TLSVersion",
];

/// Used when no include list is configured and the log sink is on
pub const DEFAULT_INCLUDE_LIST: &[&str] = &[
    "node_ingress_bytes_total",
    "node_egress_bytes_total",
    "node_ingress_packets_total",
    "node_drop_packets_total",
    "workload_sampling",
    "workload_ingress_bytes_total",
    "workload_egress_bytes_total",
    "namespace_flows_total",
    "namespace_ingress_packets_total",
    "namespace_drop_packets_total",
    "namespace_rtt_seconds",
    "namespace_dns_latency_seconds",
    "namespace_network_policy_events_total",
    "node_ipsec_flows_total",
    "node_to_node_ingress_flows_total",
];

/// Wider default when the log sink is off, so metrics carry more of the signal
pub const DEFAULT_INCLUDE_LIST_LOKI_DISABLED: &[&str] = &[
    "node_ingress_bytes_total",
    "node_egress_bytes_total",
    "node_ingress_packets_total",
    "node_drop_packets_total",
    "workload_ingress_bytes_total",
    "workload_egress_bytes_total",
    "workload_sampling",
    "workload_ingress_packets_total",
    "workload_egress_packets_total",
    "workload_flows_total",
    "workload_drop_bytes_total",
    "workload_drop_packets_total",
    "workload_rtt_seconds",
    "workload_dns_latency_seconds",
    "namespace_network_policy_events_total",
    "node_ipsec_flows_total",
    "node_to_node_ingress_flows_total",
];

fn group_labels(group: &str) -> &'static [&'static str] {
    match group {
        "node" => NODE_LABELS,
        "namespace" => NAMESPACE_LABELS,
        _ => WORKLOAD_LABELS,
    }
}

fn labels_with(group: &str, extra: &[&str]) -> Vec<String> {
    group_labels(group)
        .iter()
        .chain(extra.iter())
        .map(|l| l.to_string())
        .collect()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn metric(name: String, metric_type: MetricType, help: String, labels: Vec<String>) -> FlowMetricSpec {
    FlowMetricSpec {
        metric_name: name,
        metric_type,
        help,
        labels,
        ..Default::default()
    }
}

/// The whole catalog, in definition order
pub fn catalog() -> Vec<FlowMetricSpec> {
    let mut defs = Vec::new();

    for group in GROUPS {
        for (kind, value_field) in [("bytes", "Bytes"), ("packets", "Packets")] {
            for (dir, direction) in [("egress", FlowDirection::Egress), ("ingress", FlowDirection::Ingress)] {
                defs.push(FlowMetricSpec {
                    value_field: value_field.to_string(),
                    direction,
                    ..metric(
                        format!("{}_{}_{}_total", group, dir, kind),
                        MetricType::Counter,
                        format!("Total {} per {} in {} direction", kind, group, dir),
                        labels_with(group, &[]),
                    )
                });
            }
        }
        defs.push(FlowMetricSpec {
            value_field: "Sampling".to_string(),
            ..metric(
                format!("{}_sampling", group),
                MetricType::Gauge,
                format!("Sampling per {}", group),
                labels_with(group, &[]),
            )
        });
        defs.push(metric(
            format!("{}_flows_total", group),
            MetricType::Counter,
            format!("Total flows per {}", group),
            labels_with(group, &[]),
        ));
    }

    for group in GROUPS {
        defs.push(FlowMetricSpec {
            value_field: "TimeFlowRttNs".to_string(),
            filters: vec![MetricFilter::presence("TimeFlowRttNs")],
            divider: "1000000000".to_string(),
            buckets: strings(&LATENCY_BUCKETS),
            ..metric(
                format!("{}_rtt_seconds", group),
                MetricType::Histogram,
                format!("Round-trip time latency in seconds per {}", group),
                labels_with(group, &[]),
            )
        });
    }

    for group in GROUPS {
        let drop_labels = &["PktDropLatestState", "PktDropLatestDropCause"];
        defs.push(FlowMetricSpec {
            value_field: "PktDropPackets".to_string(),
            filters: vec![MetricFilter::presence("PktDropPackets")],
            ..metric(
                format!("{}_drop_packets_total", group),
                MetricType::Counter,
                format!("Total dropped packets per {}", group),
                labels_with(group, drop_labels),
            )
        });
        defs.push(FlowMetricSpec {
            value_field: "PktDropBytes".to_string(),
            filters: vec![MetricFilter::presence("PktDropBytes")],
            ..metric(
                format!("{}_drop_bytes_total", group),
                MetricType::Counter,
                format!("Total dropped bytes per {}", group),
                labels_with(group, drop_labels),
            )
        });
    }

    for group in GROUPS {
        defs.push(FlowMetricSpec {
            value_field: "DnsLatencyMs".to_string(),
            filters: vec![MetricFilter::presence("DnsId")],
            divider: "1000".to_string(),
            buckets: strings(&LATENCY_BUCKETS),
            ..metric(
                format!("{}_dns_latency_seconds", group),
                MetricType::Histogram,
                format!("DNS latency in seconds per {}", group),
                labels_with(group, &["DnsFlagsResponseCode"]),
            )
        });
    }

    for group in GROUPS {
        let remap: BTreeMap<String, String> = [
            ("NetworkEvents>Type", "type"),
            ("NetworkEvents>Namespace", "namespace"),
            ("NetworkEvents>Name", "name"),
            ("NetworkEvents>Action", "action"),
            ("NetworkEvents>Direction", "direction"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        defs.push(FlowMetricSpec {
            filters: vec![MetricFilter::equal("NetworkEvents>Feature", "acl")],
            flatten: strings(&["NetworkEvents"]),
            remap,
            ..metric(
                format!("{}_network_policy_events_total", group),
                MetricType::Counter,
                format!("Total network policy events per {}", group),
                labels_with(
                    group,
                    &[
                        "NetworkEvents>Type",
                        "NetworkEvents>Namespace",
                        "NetworkEvents>Name",
                        "NetworkEvents>Action",
                        "NetworkEvents>Direction",
                    ],
                ),
            )
        });
    }

    for group in GROUPS {
        defs.push(FlowMetricSpec {
            filters: vec![MetricFilter::presence("IPSecStatus")],
            ..metric(
                format!("{}_ipsec_flows_total", group),
                MetricType::Counter,
                format!("Total IPsec encrypted flows per {}", group),
                labels_with(group, &["IPSecStatus"]),
            )
        });
    }

    defs.push(FlowMetricSpec {
        filters: vec![
            MetricFilter {
                field: "FlowDirection".to_string(),
                value: "2".to_string(),
                match_type: MatchType::NotEqual,
            },
            MetricFilter::presence("SrcK8S_HostName"),
            MetricFilter::presence("DstK8S_HostName"),
        ],
        ..metric(
            "node_to_node_ingress_flows_total".to_string(),
            MetricType::Counter,
            "Total ingress flows between nodes".to_string(),
            labels_with("node", &[]),
        )
    });

    defs
}

pub fn all_builtin_names() -> Vec<String> {
    catalog().into_iter().map(|d| d.metric_name).collect()
}

/// Names of the builtin metrics enabled for `spec`
pub fn include_list(spec: &CollectionSpec) -> Vec<String> {
    let mut list: Vec<String> = match &spec.processor.metrics.include_list {
        Some(list) => list.clone(),
        None if spec.use_loki() => strings(DEFAULT_INCLUDE_LIST),
        None => strings(DEFAULT_INCLUDE_LIST_LOKI_DISABLED),
    };

    let agent = &spec.agent;
    let gates = [
        (agent.is_packet_drop_enabled(), "_drop_"),
        (agent.is_flow_rtt_enabled(), "_rtt_"),
        (agent.is_dns_tracking_enabled(), "_dns_"),
        (agent.is_network_events_enabled(), "_network_policy_"),
        (spec.has_filters_sampling(), "_sampling"),
        (agent.is_ipsec_enabled(), "_ipsec_"),
    ];
    for (enabled, pattern) in gates {
        if !enabled {
            list.retain(|name| !name.contains(pattern));
        }
    }
    list
}

/// Builtin definitions for `spec`, in catalog order, with labels and
/// filters adjusted to the enabled features
pub fn builtin_definitions(spec: &CollectionSpec) -> Vec<FlowMetricSpec> {
    let names = include_list(spec);

    let mut labels_to_remove: Vec<&str> = Vec::new();
    if !spec.is_zone_enabled() {
        labels_to_remove.extend(["SrcK8S_Zone", "DstK8S_Zone"]);
    }
    if !spec.is_multicluster_enabled() {
        labels_to_remove.push("K8S_ClusterName");
    }
    if !spec.agent.is_tls_tracking_enabled() {
        labels_to_remove.push("TLSVersion");
    }

    // Only one record per connection should be counted
    let record_type_filter = match spec.processor.log_types {
        LogTypes::Flows | LogTypes::EndedConversations => None,
        LogTypes::Conversations => Some(MetricFilter::equal("_RecordType", "endConnection")),
        LogTypes::All => Some(MetricFilter::equal("_RecordType", "flowLog")),
    };

    catalog()
        .into_iter()
        .filter(|def| names.contains(&def.metric_name))
        .map(|mut def| {
            def.labels.retain(|l| !labels_to_remove.contains(&l.as_str()));
            if let Some(filter) = &record_type_filter {
                def.filters.push(filter.clone());
            }
            def
        })
        .collect()
}
