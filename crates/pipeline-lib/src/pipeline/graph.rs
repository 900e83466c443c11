//! Stage graph assembly
//!
//! Fixed order, each step conditional: ingest, global filters, connection
//! tracking, enrichment, custom filters, dedup, then one branch per sink
//! off the last common stage.

use super::api::{
    Decoder, DirectionInfo, Encode, Extract, GenericFieldRule, Ingest, IngestGrpc, IngestKafka, IngestType,
    K8sInfraRule, K8sRule, KubeConfig, NamespaceName, NetworkTransformRule, PromEncode,
    RemoveEntryRule, RemoveEntryType, SamplingCondition, SecondaryNetworkConfig, StageParam,
    Transform, TransformFilter, TransformFilterRule, TransformNetwork, Write, WriteLoki,
};
use super::builder::{Branch, PipelineBuilder, PipelineConfig, StageKind};
use super::conntrack::conntrack_stage;
use super::exporters::attach_exporters;
use crate::error::{BuildError, Result};
use crate::merge::target_filters;
use crate::metrics::{MetricDefinition, METRICS_PREFIX};
use crate::models::{CollectionSpec, DeduperMode, FilterTarget, SubnetLabel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const CLUSTER_NAME_FIELD: &str = "K8S_ClusterName";
pub const SAMPLING_FIELD: &str = "Sampling";
const KAFKA_GROUP_ID: &str = "flowlogs-pipeline";
const OVN_SECONDARY_NETWORK: &str = "ovn-kubernetes";
const OPENSHIFT_NAMESPACE_PREFIX: &str = "openshift";

const LOKI_DEFAULT_LABELS: &[&str] = &[
    "SrcK8S_Namespace",
    "SrcK8S_OwnerName",
    "SrcK8S_Type",
    "DstK8S_Namespace",
    "DstK8S_OwnerName",
    "DstK8S_Type",
    "K8S_FlowLayer",
    "FlowDirection",
];
const LOKI_CONNTRACK_LABELS: &[&str] = &["_RecordType"];
const LOKI_MULTICLUSTER_LABELS: &[&str] = &[CLUSTER_NAME_FIELD];
const LOKI_ZONE_LABELS: &[&str] = &["SrcK8S_Zone", "DstK8S_Zone"];
const LOKI_UDN_LABELS: &[&str] = &["SrcK8S_NetworkName", "DstK8S_NetworkName"];

/// Deployment shape, chosen by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// Collector receiving flows from the agents directly
    #[default]
    Direct,
    /// Transformer consuming flows from a Kafka topic
    Transformer,
}

impl Topology {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Transformer => "transformer",
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topology {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "transformer" | "kafka" => Ok(Self::Transformer),
            other => Err(format!("unknown topology '{other}' (expected direct or transformer)")),
        }
    }
}

fn ingest_stage(spec: &CollectionSpec, topology: Topology) -> Result<StageParam> {
    match topology {
        Topology::Direct => Ok(StageParam::ingest(
            "grpc",
            Ingest {
                ingest_type: IngestType::Grpc,
                grpc: Some(IngestGrpc {
                    port: spec.processor.advanced.port,
                }),
                kafka: None,
            },
        )),
        Topology::Transformer => {
            if spec.kafka.address.is_empty() {
                return Err(BuildError::missing_field("kafka ingest", "kafka-read", "kafka.address"));
            }
            if spec.kafka.topic.is_empty() {
                return Err(BuildError::missing_field("kafka ingest", "kafka-read", "kafka.topic"));
            }
            Ok(StageParam::ingest(
                "kafka-read",
                Ingest {
                    ingest_type: IngestType::Kafka,
                    grpc: None,
                    kafka: Some(IngestKafka {
                        brokers: vec![spec.kafka.address.clone()],
                        topic: spec.kafka.topic.clone(),
                        group_id: KAFKA_GROUP_ID.to_string(),
                        decoder: Decoder {
                            decoder_type: "protobuf".to_string(),
                        },
                    }),
                },
            ))
        }
    }
}

fn k8s_rule(ip: &str, output: &str) -> K8sRule {
    K8sRule {
        ip_field: ip.to_string(),
        output: output.to_string(),
        ..Default::default()
    }
}

fn endpoint_rule(prefix: &str, add_zone: bool) -> NetworkTransformRule {
    NetworkTransformRule::add_kubernetes(K8sRule {
        interfaces_field: "Interfaces".to_string(),
        udns_field: "Udns".to_string(),
        mac_field: format!("{prefix}Mac"),
        add_zone,
        ..k8s_rule(&format!("{prefix}Addr"), &format!("{prefix}K8S"))
    })
}

/// Kubernetes enrichment, direction and flag decoding, and subnet labels
pub fn enrich_stage(spec: &CollectionSpec, labels: &[SubnetLabel]) -> TransformNetwork {
    let add_zone = spec.is_zone_enabled();
    let mut rules = vec![endpoint_rule("Src", add_zone), endpoint_rule("Dst", add_zone)];

    if spec.agent.is_packet_translation_enabled() {
        rules.push(NetworkTransformRule::add_kubernetes(k8s_rule("XlatSrcAddr", "XlatSrcK8S")));
        rules.push(NetworkTransformRule::add_kubernetes(k8s_rule("XlatDstAddr", "XlatDstK8S")));
    }

    rules.push(NetworkTransformRule::reinterpret_direction());
    rules.push(NetworkTransformRule::decode_tcp_flags("Flags", "Flags"));
    rules.push(NetworkTransformRule::add_kubernetes_infra(K8sInfraRule {
        namespace_name_fields: vec![
            NamespaceName::new("SrcK8S_Namespace", "SrcK8S_Name"),
            NamespaceName::new("DstK8S_Namespace", "DstK8S_Name"),
        ],
        output: "K8S_FlowLayer".to_string(),
        infra_prefixes: vec![spec.namespace.clone(), OPENSHIFT_NAMESPACE_PREFIX.to_string()],
        infra_refs: vec![
            NamespaceName::new("default", "kubernetes"),
            NamespaceName::new("default", "openshift"),
        ],
    }));

    if !labels.is_empty() {
        rules.push(NetworkTransformRule::add_subnet_label("SrcAddr", "SrcSubnetLabel"));
        rules.push(NetworkTransformRule::add_subnet_label("DstAddr", "DstSubnetLabel"));
    }

    let mut secondary_networks: Vec<SecondaryNetworkConfig> = spec
        .processor
        .advanced
        .secondary_networks
        .iter()
        .map(|sn| SecondaryNetworkConfig {
            name: sn.name.clone(),
            index: sn
                .index
                .iter()
                .map(|i| (i.to_lowercase(), serde_json::Value::Null))
                .collect(),
        })
        .collect();
    if spec.agent.is_udn_mapping_enabled() {
        secondary_networks.push(SecondaryNetworkConfig {
            name: OVN_SECONDARY_NETWORK.to_string(),
            index: BTreeMap::from([("udn".to_string(), serde_json::Value::Null)]),
        });
    }

    TransformNetwork {
        rules,
        kube_config: KubeConfig {
            secondary_networks,
            tracked_kinds: ["ReplicaSet", "Deployment", "Gateway"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
        },
        direction_info: DirectionInfo {
            reporter_ip_field: "AgentIP".to_string(),
            src_host_field: "SrcK8S_HostIP".to_string(),
            dst_host_field: "DstK8S_HostIP".to_string(),
            flow_direction_field: "FlowDirection".to_string(),
        },
        subnet_labels: labels.to_vec(),
    }
}

/// Duplicate ingress records with no resolved destination owner
fn dedup_predicate() -> Vec<RemoveEntryRule> {
    vec![
        RemoveEntryRule {
            rule_type: RemoveEntryType::RemoveEntryIfEqual,
            remove_entry: GenericFieldRule {
                input: "FlowDirection".to_string(),
                value: serde_json::Value::from(1),
                cast_int: true,
            },
        },
        RemoveEntryRule {
            rule_type: RemoveEntryType::RemoveEntryIfExists,
            remove_entry: GenericFieldRule {
                input: "DstK8S_OwnerName".to_string(),
                value: serde_json::Value::Null,
                cast_int: false,
            },
        },
    ]
}

pub fn dedup_stage(spec: &CollectionSpec) -> Option<TransformFilter> {
    let deduper = &spec.processor.deduper;
    let rule = match deduper.mode {
        DeduperMode::Disabled => return None,
        DeduperMode::Drop => TransformFilterRule::remove_entry_all_satisfied(dedup_predicate()),
        DeduperMode::Sample => TransformFilterRule::conditional_sampling(vec![SamplingCondition {
            value: u16::try_from(deduper.sampling).unwrap_or(u16::MAX),
            rules: dedup_predicate(),
        }]),
    };
    Some(TransformFilter {
        rules: vec![rule],
        sampling_field: None,
    })
}

fn sampled_filter(rules: Vec<TransformFilterRule>) -> Transform {
    Transform::filter(TransformFilter {
        rules,
        sampling_field: Some(SAMPLING_FIELD.to_string()),
    })
}

/// Labels indexed by the log store, minus the excluded ones
pub fn loki_labels(spec: &CollectionSpec) -> Vec<String> {
    let mut groups = vec![LOKI_DEFAULT_LABELS];
    if spec.use_conntrack() {
        groups.push(LOKI_CONNTRACK_LABELS);
    }
    if spec.is_multicluster_enabled() {
        groups.push(LOKI_MULTICLUSTER_LABELS);
    }
    if spec.is_zone_enabled() {
        groups.push(LOKI_ZONE_LABELS);
    }
    if spec.agent.is_udn_mapping_enabled() {
        groups.push(LOKI_UDN_LABELS);
    }
    let excluded = &spec.loki.exclude_labels;
    groups
        .into_iter()
        .flatten()
        .filter(|l| !excluded.iter().any(|e| e.as_str() == **l))
        .map(|l| l.to_string())
        .collect()
}

fn loki_write(spec: &CollectionSpec) -> WriteLoki {
    let loki = &spec.loki;
    WriteLoki {
        url: loki.url.clone(),
        tenant_id: loki.tenant_id.clone(),
        batch_wait: loki.batch_wait.clone(),
        batch_size: loki.batch_size,
        timeout: loki.timeout.clone(),
        labels: loki_labels(spec),
        static_labels: loki.static_labels.clone(),
        timestamp_label: "TimeFlowEndMs".to_string(),
        timestamp_scale: "1ms".to_string(),
    }
}

/// Open `branch` off the main head, behind a target filter when one applies
fn open_sink_branch(
    builder: &mut PipelineBuilder,
    branch: Branch,
    spec: &CollectionSpec,
    target: FilterTarget,
    filter_name: &str,
) -> Result<()> {
    builder.fork(Branch::Main, branch)?;
    let rules = target_filters(spec, target);
    if !rules.is_empty() {
        builder.extend(
            branch,
            StageKind::TargetFilter,
            StageParam::transform(filter_name, sampled_filter(rules)),
        )?;
    }
    Ok(())
}

/// Assemble the stage tree.
///
/// `filters` are the merged rules for every record (admin `All` filters
/// followed by namespace rules). `cluster_name` is the resolved cluster
/// identity, empty when none is known.
pub fn build(
    spec: &CollectionSpec,
    topology: Topology,
    metrics: &[MetricDefinition],
    labels: &[SubnetLabel],
    filters: &[TransformFilterRule],
    cluster_name: &str,
) -> Result<PipelineConfig> {
    let mut b = PipelineBuilder::new(StageKind::Ingest, ingest_stage(spec, topology)?);

    if spec.is_multicluster_enabled() && !cluster_name.is_empty() {
        b.extend(
            Branch::Main,
            StageKind::GlobalFilter,
            StageParam::transform(
                "global-filters",
                Transform::filter(TransformFilter {
                    rules: vec![TransformFilterRule::add_field_if_doesnt_exist(
                        CLUSTER_NAME_FIELD,
                        cluster_name,
                    )],
                    sampling_field: None,
                }),
            ),
        )?;
    }

    if spec.use_conntrack() {
        b.extend(
            Branch::Main,
            StageKind::ConnTrack,
            StageParam::extract(
                "extract_conntrack",
                Extract {
                    extract_type: "conntrack".to_string(),
                    conntrack: conntrack_stage(spec),
                },
            ),
        )?;
    }

    b.extend(
        Branch::Main,
        StageKind::Enrich,
        StageParam::transform("enrich", Transform::network(enrich_stage(spec, labels))),
    )?;

    if !filters.is_empty() {
        b.extend(
            Branch::Main,
            StageKind::CustomFilter,
            StageParam::transform("filters", sampled_filter(filters.to_vec())),
        )?;
    }

    if let Some(dedup) = dedup_stage(spec) {
        b.extend(
            Branch::Main,
            StageKind::Dedup,
            StageParam::transform("dedup", Transform::filter(dedup)),
        )?;
    }

    if spec.use_loki() {
        open_sink_branch(&mut b, Branch::Loki, spec, FilterTarget::Loki, "filters-loki")?;
        b.extend(
            Branch::Loki,
            StageKind::LokiWrite,
            StageParam::write("loki", Write::loki(loki_write(spec))),
        )?;
    }

    if !metrics.is_empty() {
        open_sink_branch(&mut b, Branch::Metrics, spec, FilterTarget::Metrics, "filters-prom")?;
        b.extend(
            Branch::Metrics,
            StageKind::PromEncode,
            StageParam::encode(
                "prometheus",
                Encode::prom(PromEncode {
                    metrics: metrics.to_vec(),
                    prefix: METRICS_PREFIX.to_string(),
                }),
            ),
        )?;
    }

    if !spec.exporters.is_empty() {
        open_sink_branch(&mut b, Branch::Exporters, spec, FilterTarget::Exporters, "filters-exp")?;
        attach_exporters(&mut b, &spec.exporters, metrics)?;
    }

    if spec.is_trace_enabled() {
        b.attach(
            Branch::Main,
            StageKind::Trace,
            StageParam::write("stdout", Write::stdout("json")),
        )?;
    }

    Ok(b.finish())
}
