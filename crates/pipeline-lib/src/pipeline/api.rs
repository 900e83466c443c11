//! Wire vocabulary of the flow-processing engine
//!
//! Stage and parameter shapes as the engine reads them. Optional fields
//! are skipped when unset so serialized configs stay minimal and stable.

use crate::metrics::MetricDefinition;
use crate::models::SubnetLabel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn is_false(v: &bool) -> bool {
    !*v
}

/// A node of the pipeline tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follows: Option<String>,
}

/// Parameters of the stage with the same name. Exactly one section is set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StageParam {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingest: Option<Ingest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<Extract>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encode: Option<Encode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write: Option<Write>,
}

impl StageParam {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn ingest(name: &str, ingest: Ingest) -> Self {
        Self {
            ingest: Some(ingest),
            ..Self::named(name)
        }
    }

    pub fn transform(name: &str, transform: Transform) -> Self {
        Self {
            transform: Some(transform),
            ..Self::named(name)
        }
    }

    pub fn extract(name: &str, extract: Extract) -> Self {
        Self {
            extract: Some(extract),
            ..Self::named(name)
        }
    }

    pub fn encode(name: &str, encode: Encode) -> Self {
        Self {
            encode: Some(encode),
            ..Self::named(name)
        }
    }

    pub fn write(name: &str, write: Write) -> Self {
        Self {
            write: Some(write),
            ..Self::named(name)
        }
    }
}

// Ingest

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestType {
    Grpc,
    Kafka,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingest {
    #[serde(rename = "type")]
    pub ingest_type: IngestType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc: Option<IngestGrpc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kafka: Option<IngestKafka>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestGrpc {
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestKafka {
    pub brokers: Vec<String>,
    pub topic: String,
    pub group_id: String,
    pub decoder: Decoder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoder {
    #[serde(rename = "type")]
    pub decoder_type: String,
}

// Transform

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformType {
    Filter,
    Network,
    Generic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    #[serde(rename = "type")]
    pub transform_type: TransformType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<TransformFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<TransformNetwork>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generic: Option<TransformGeneric>,
}

impl Transform {
    pub fn filter(filter: TransformFilter) -> Self {
        Self {
            transform_type: TransformType::Filter,
            filter: Some(filter),
            network: None,
            generic: None,
        }
    }

    pub fn network(network: TransformNetwork) -> Self {
        Self {
            transform_type: TransformType::Network,
            filter: None,
            network: Some(network),
            generic: None,
        }
    }

    pub fn generic(generic: TransformGeneric) -> Self {
        Self {
            transform_type: TransformType::Generic,
            filter: None,
            network: None,
            generic: Some(generic),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformFilter {
    pub rules: Vec<TransformFilterRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_field: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterRuleType {
    KeepEntryQuery,
    AddFieldIfDoesntExist,
    RemoveEntryAllSatisfied,
    ConditionalSampling,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformFilterRule {
    #[serde(rename = "type")]
    pub rule_type: FilterRuleType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_entry_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_entry_sampling: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_field_if_doesnt_exist: Option<GenericFieldRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_entry_all_satisfied: Option<Vec<RemoveEntryRule>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional_sampling: Option<Vec<SamplingCondition>>,
}

impl TransformFilterRule {
    fn of(rule_type: FilterRuleType) -> Self {
        Self {
            rule_type,
            keep_entry_query: None,
            keep_entry_sampling: None,
            add_field_if_doesnt_exist: None,
            remove_entry_all_satisfied: None,
            conditional_sampling: None,
        }
    }

    /// Keep records matching `query`; a sampling of 0 keeps every match
    pub fn keep_entry_query(query: String, sampling: u16) -> Self {
        Self {
            keep_entry_query: Some(query),
            keep_entry_sampling: (sampling != 0).then_some(sampling),
            ..Self::of(FilterRuleType::KeepEntryQuery)
        }
    }

    pub fn add_field_if_doesnt_exist(input: &str, value: &str) -> Self {
        Self {
            add_field_if_doesnt_exist: Some(GenericFieldRule {
                input: input.to_string(),
                value: serde_json::Value::String(value.to_string()),
                cast_int: false,
            }),
            ..Self::of(FilterRuleType::AddFieldIfDoesntExist)
        }
    }

    pub fn remove_entry_all_satisfied(rules: Vec<RemoveEntryRule>) -> Self {
        Self {
            remove_entry_all_satisfied: Some(rules),
            ..Self::of(FilterRuleType::RemoveEntryAllSatisfied)
        }
    }

    pub fn conditional_sampling(conditions: Vec<SamplingCondition>) -> Self {
        Self {
            conditional_sampling: Some(conditions),
            ..Self::of(FilterRuleType::ConditionalSampling)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericFieldRule {
    pub input: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "is_false")]
    pub cast_int: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoveEntryType {
    RemoveEntryIfExists,
    RemoveEntryIfEqual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveEntryRule {
    #[serde(rename = "type")]
    pub rule_type: RemoveEntryType,
    pub remove_entry: GenericFieldRule,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingCondition {
    pub value: u16,
    pub rules: Vec<RemoveEntryRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformNetwork {
    pub rules: Vec<NetworkTransformRule>,
    pub kube_config: KubeConfig,
    pub direction_info: DirectionInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subnet_labels: Vec<SubnetLabel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkRuleType {
    AddKubernetes,
    AddKubernetesInfra,
    ReinterpretDirection,
    AddSubnetLabel,
    DecodeTcpFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTransformRule {
    #[serde(rename = "type")]
    pub rule_type: NetworkRuleType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<K8sRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_infra: Option<K8sInfraRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_subnet_label: Option<NetworkGenericRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decode_tcp_flags: Option<NetworkGenericRule>,
}

impl NetworkTransformRule {
    fn of(rule_type: NetworkRuleType) -> Self {
        Self {
            rule_type,
            kubernetes: None,
            kubernetes_infra: None,
            add_subnet_label: None,
            decode_tcp_flags: None,
        }
    }

    pub fn add_kubernetes(rule: K8sRule) -> Self {
        Self {
            kubernetes: Some(rule),
            ..Self::of(NetworkRuleType::AddKubernetes)
        }
    }

    pub fn add_kubernetes_infra(rule: K8sInfraRule) -> Self {
        Self {
            kubernetes_infra: Some(rule),
            ..Self::of(NetworkRuleType::AddKubernetesInfra)
        }
    }

    pub fn reinterpret_direction() -> Self {
        Self::of(NetworkRuleType::ReinterpretDirection)
    }

    pub fn add_subnet_label(input: &str, output: &str) -> Self {
        Self {
            add_subnet_label: Some(NetworkGenericRule::new(input, output)),
            ..Self::of(NetworkRuleType::AddSubnetLabel)
        }
    }

    pub fn decode_tcp_flags(input: &str, output: &str) -> Self {
        Self {
            decode_tcp_flags: Some(NetworkGenericRule::new(input, output)),
            ..Self::of(NetworkRuleType::DecodeTcpFlags)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct K8sRule {
    pub ip_field: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interfaces_field: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub udns_field: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mac_field: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub add_zone: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct K8sInfraRule {
    pub namespace_name_fields: Vec<NamespaceName>,
    pub output: String,
    pub infra_prefixes: Vec<String>,
    pub infra_refs: Vec<NamespaceName>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceName {
    pub namespace: String,
    pub name: String,
}

impl NamespaceName {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkGenericRule {
    pub input: String,
    pub output: String,
}

impl NetworkGenericRule {
    pub fn new(input: &str, output: &str) -> Self {
        Self {
            input: input.to_string(),
            output: output.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary_networks: Vec<SecondaryNetworkConfig>,
    pub tracked_kinds: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryNetworkConfig {
    pub name: String,
    /// Index keys; values are unused by the engine
    pub index: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectionInfo {
    #[serde(rename = "reporterIPField")]
    pub reporter_ip_field: String,
    pub src_host_field: String,
    pub dst_host_field: String,
    pub flow_direction_field: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformGeneric {
    pub policy: String,
    pub rules: Vec<GenericMappingRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericMappingRule {
    pub input: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<u32>,
}

// Extract

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extract {
    #[serde(rename = "type")]
    pub extract_type: String,
    pub conntrack: ConnTrack,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnTrack {
    pub key_definition: KeyDefinition,
    pub output_record_types: Vec<RecordType>,
    pub output_fields: Vec<OutputField>,
    pub scheduling: Vec<ConnTrackSchedulingGroup>,
    pub tcp_flags: ConnTrackTcpFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordType {
    FlowLog,
    NewConnection,
    Heartbeat,
    EndConnection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDefinition {
    pub field_groups: Vec<FieldGroup>,
    pub hash: ConnTrackHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldGroup {
    pub name: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnTrackHash {
    pub field_group_refs: Vec<String>,
    #[serde(rename = "fieldGroupARef")]
    pub field_group_a_ref: String,
    #[serde(rename = "fieldGroupBRef")]
    pub field_group_b_ref: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Sum,
    Count,
    Min,
    Max,
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputField {
    pub name: String,
    pub operation: Operation,
    #[serde(default, rename = "splitAB", skip_serializing_if = "is_false")]
    pub split_ab: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub input: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub report_missing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnTrackSchedulingGroup {
    pub selector: BTreeMap<String, String>,
    pub heartbeat_interval: String,
    pub end_connection_timeout: String,
    pub terminating_timeout: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnTrackTcpFlags {
    pub field_name: String,
    pub detect_end_connection: bool,
    #[serde(rename = "swapAB")]
    pub swap_ab: bool,
}

// Encode

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodeType {
    Prom,
    Kafka,
    Otlplogs,
    Otlpmetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encode {
    #[serde(rename = "type")]
    pub encode_type: EncodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prom: Option<PromEncode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kafka: Option<EncodeKafka>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlplogs: Option<EncodeOtlpLogs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlpmetrics: Option<EncodeOtlpMetrics>,
}

impl Encode {
    fn of(encode_type: EncodeType) -> Self {
        Self {
            encode_type,
            prom: None,
            kafka: None,
            otlplogs: None,
            otlpmetrics: None,
        }
    }

    pub fn prom(prom: PromEncode) -> Self {
        Self {
            prom: Some(prom),
            ..Self::of(EncodeType::Prom)
        }
    }

    pub fn kafka(kafka: EncodeKafka) -> Self {
        Self {
            kafka: Some(kafka),
            ..Self::of(EncodeType::Kafka)
        }
    }

    pub fn otlp_logs(logs: EncodeOtlpLogs) -> Self {
        Self {
            otlplogs: Some(logs),
            ..Self::of(EncodeType::Otlplogs)
        }
    }

    pub fn otlp_metrics(metrics: EncodeOtlpMetrics) -> Self {
        Self {
            otlpmetrics: Some(metrics),
            ..Self::of(EncodeType::Otlpmetrics)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromEncode {
    pub metrics: Vec<MetricDefinition>,
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeKafka {
    pub address: String,
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtlpConnectionInfo {
    pub address: String,
    pub port: u16,
    pub connection_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeOtlpLogs {
    #[serde(flatten)]
    pub connection: OtlpConnectionInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeOtlpMetrics {
    #[serde(flatten)]
    pub connection: OtlpConnectionInfo,
    pub prefix: String,
    pub metrics: Vec<MetricDefinition>,
    pub push_time_interval: String,
    pub expiry_time: String,
}

// Write

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteType {
    Loki,
    Ipfix,
    Stdout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Write {
    #[serde(rename = "type")]
    pub write_type: WriteType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loki: Option<WriteLoki>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipfix: Option<WriteIpfix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<WriteStdout>,
}

impl Write {
    fn of(write_type: WriteType) -> Self {
        Self {
            write_type,
            loki: None,
            ipfix: None,
            stdout: None,
        }
    }

    pub fn loki(loki: WriteLoki) -> Self {
        Self {
            loki: Some(loki),
            ..Self::of(WriteType::Loki)
        }
    }

    pub fn ipfix(ipfix: WriteIpfix) -> Self {
        Self {
            ipfix: Some(ipfix),
            ..Self::of(WriteType::Ipfix)
        }
    }

    pub fn stdout(format: &str) -> Self {
        Self {
            stdout: Some(WriteStdout {
                format: format.to_string(),
            }),
            ..Self::of(WriteType::Stdout)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteLoki {
    pub url: String,
    #[serde(rename = "tenantID")]
    pub tenant_id: String,
    pub batch_wait: String,
    pub batch_size: u64,
    pub timeout: String,
    pub labels: Vec<String>,
    pub static_labels: BTreeMap<String, String>,
    pub timestamp_label: String,
    pub timestamp_scale: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteIpfix {
    pub target_host: String,
    pub target_port: u16,
    pub transport: String,
    #[serde(default, rename = "enterpriseID")]
    pub enterprise_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteStdout {
    pub format: String,
}
