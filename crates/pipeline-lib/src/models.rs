//! Input data models
//!
//! Mirrors the collection resource schema: camelCase fields, PascalCase
//! enum values, every field optional with a default.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Namespace the collector is deployed to when none is set
pub const DEFAULT_NAMESPACE: &str = "netobserv";

/// Default flow listener port of the direct topology
pub const DEFAULT_INGEST_PORT: u16 = 2055;

/// Default health endpoint port
pub const DEFAULT_HEALTH_PORT: u16 = 8080;

/// Default metrics server port
pub const DEFAULT_METRICS_PORT: u16 = 9401;

/// Default deduplication sampling rate
pub const DEFAULT_DEDUPER_SAMPLING: u32 = 50;

/// Declarative description of what to collect and where to send it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectionSpec {
    pub namespace: String,
    pub agent: AgentSpec,
    pub processor: ProcessorSpec,
    pub loki: LokiSpec,
    pub kafka: KafkaConfig,
    pub exporters: Vec<ExporterSpec>,
}

impl Default for CollectionSpec {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            agent: AgentSpec::default(),
            processor: ProcessorSpec::default(),
            loki: LokiSpec::default(),
            kafka: KafkaConfig::default(),
            exporters: Vec::new(),
        }
    }
}

impl CollectionSpec {
    pub fn use_loki(&self) -> bool {
        self.loki.enable
    }

    /// Connection tracking runs whenever the processor emits anything besides raw flows
    pub fn use_conntrack(&self) -> bool {
        self.processor.log_types != LogTypes::Flows
    }

    pub fn is_multicluster_enabled(&self) -> bool {
        self.processor.multi_cluster_deployment
    }

    pub fn is_zone_enabled(&self) -> bool {
        self.processor.add_zone
    }

    pub fn is_trace_enabled(&self) -> bool {
        self.processor.log_level.eq_ignore_ascii_case("trace")
    }

    /// True when any processor filter samples more coarsely than 1:1
    pub fn has_filters_sampling(&self) -> bool {
        self.processor.filters.iter().any(|f| f.sampling > 1)
    }

    pub fn slices_enabled(&self) -> bool {
        self.processor.slices_config.enable
    }
}

/// Kernel agent capabilities
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSpec {
    pub features: Vec<AgentFeature>,
    pub privileged: bool,
}

impl AgentSpec {
    pub fn has(&self, feature: AgentFeature) -> bool {
        self.features.contains(&feature)
    }

    /// Packet drop collection needs either a privileged agent or the eBPF manager
    pub fn is_packet_drop_enabled(&self) -> bool {
        (self.privileged || self.has(AgentFeature::EbpfManager)) && self.has(AgentFeature::PacketDrop)
    }

    pub fn is_dns_tracking_enabled(&self) -> bool {
        self.has(AgentFeature::DnsTracking)
    }

    pub fn is_flow_rtt_enabled(&self) -> bool {
        self.has(AgentFeature::FlowRtt)
    }

    pub fn is_network_events_enabled(&self) -> bool {
        self.has(AgentFeature::NetworkEvents)
    }

    pub fn is_packet_translation_enabled(&self) -> bool {
        self.has(AgentFeature::PacketTranslation)
    }

    pub fn is_udn_mapping_enabled(&self) -> bool {
        self.has(AgentFeature::UdnMapping)
    }

    pub fn is_ipsec_enabled(&self) -> bool {
        self.has(AgentFeature::IpSec)
    }

    pub fn is_tls_tracking_enabled(&self) -> bool {
        self.has(AgentFeature::TlsTracking)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentFeature {
    PacketDrop,
    #[serde(rename = "DNSTracking")]
    DnsTracking,
    #[serde(rename = "FlowRTT")]
    FlowRtt,
    NetworkEvents,
    PacketTranslation,
    #[serde(rename = "UDNMapping")]
    UdnMapping,
    #[serde(rename = "IPSec")]
    IpSec,
    #[serde(rename = "TLSTracking")]
    TlsTracking,
    EbpfManager,
}

/// Which records the processor emits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogTypes {
    #[default]
    Flows,
    Conversations,
    EndedConversations,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessorSpec {
    pub log_level: String,
    pub log_types: LogTypes,
    pub multi_cluster_deployment: bool,
    pub cluster_name: String,
    pub add_zone: bool,
    pub deduper: DeduperSpec,
    pub filters: Vec<ProcessorFilter>,
    pub metrics: ProcessorMetrics,
    pub subnet_labels: SubnetLabelsSpec,
    pub slices_config: SlicesConfig,
    pub advanced: AdvancedProcessorConfig,
}

impl Default for ProcessorSpec {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_types: LogTypes::Flows,
            multi_cluster_deployment: false,
            cluster_name: String::new(),
            add_zone: false,
            deduper: DeduperSpec::default(),
            filters: Vec::new(),
            metrics: ProcessorMetrics::default(),
            subnet_labels: SubnetLabelsSpec::default(),
            slices_config: SlicesConfig::default(),
            advanced: AdvancedProcessorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeduperMode {
    #[default]
    Disabled,
    Drop,
    Sample,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeduperSpec {
    pub mode: DeduperMode,
    pub sampling: u32,
}

impl Default for DeduperSpec {
    fn default() -> Self {
        Self {
            mode: DeduperMode::Disabled,
            sampling: DEFAULT_DEDUPER_SAMPLING,
        }
    }
}

/// Where a processor filter applies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterTarget {
    /// Every record, before the sink fan-out
    #[default]
    All,
    /// Primary log sink only
    Loki,
    /// Metrics encoder only
    Metrics,
    /// Custom exporters only
    Exporters,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessorFilter {
    pub query: String,
    pub output_target: FilterTarget,
    pub sampling: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessorMetrics {
    /// Builtin metric names; `None` selects the default list
    pub include_list: Option<Vec<String>>,
    pub server: MetricsServer,
}

impl Default for ProcessorMetrics {
    fn default() -> Self {
        Self {
            include_list: None,
            server: MetricsServer::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsServer {
    pub port: u16,
}

impl Default for MetricsServer {
    fn default() -> Self {
        Self {
            port: DEFAULT_METRICS_PORT,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubnetLabelsSpec {
    pub custom_labels: Vec<SubnetLabel>,
}

/// A named group of CIDRs used to tag addresses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubnetLabel {
    pub name: String,
    pub cidrs: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionMode {
    #[default]
    AlwaysCollect,
    AllowList,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlicesConfig {
    pub enable: bool,
    pub collection_mode: CollectionMode,
    /// Exact namespaces, or regexes wrapped in slashes (`/prod-.*/`)
    pub namespaces_allow_list: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdvancedProcessorConfig {
    pub port: u16,
    pub health_port: u16,
    pub conversation_heartbeat_interval: String,
    pub conversation_end_timeout: String,
    pub conversation_terminating_timeout: String,
    pub secondary_networks: Vec<SecondaryNetwork>,
}

impl Default for AdvancedProcessorConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_INGEST_PORT,
            health_port: DEFAULT_HEALTH_PORT,
            conversation_heartbeat_interval: "30s".to_string(),
            conversation_end_timeout: "10s".to_string(),
            conversation_terminating_timeout: "5s".to_string(),
            secondary_networks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecondaryNetwork {
    pub name: String,
    pub index: Vec<String>,
}

/// Primary log sink
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LokiSpec {
    pub enable: bool,
    pub url: String,
    pub tenant_id: String,
    pub batch_size: u64,
    pub batch_wait: String,
    pub timeout: String,
    pub static_labels: BTreeMap<String, String>,
    pub exclude_labels: Vec<String>,
}

impl Default for LokiSpec {
    fn default() -> Self {
        Self {
            enable: true,
            url: "http://loki:3100/".to_string(),
            tenant_id: "netobserv".to_string(),
            batch_size: 10 * 1024 * 1024,
            batch_wait: "1s".to_string(),
            timeout: "10s".to_string(),
            static_labels: BTreeMap::from([("app".to_string(), "netobserv-flowcollector".to_string())]),
            exclude_labels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KafkaConfig {
    pub address: String,
    pub topic: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExporterType {
    #[default]
    Kafka,
    #[serde(rename = "IPFIX")]
    Ipfix,
    OpenTelemetry,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExporterSpec {
    #[serde(rename = "type")]
    pub exporter_type: ExporterType,
    pub kafka: KafkaConfig,
    pub ipfix: IpfixConfig,
    pub open_telemetry: OpenTelemetryConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IpfixConfig {
    pub target_host: String,
    pub target_port: u16,
    /// `TCP` or `UDP`
    pub transport: String,
    pub enterprise_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenTelemetryConfig {
    pub target_host: String,
    pub target_port: u16,
    /// `http` or `grpc`
    pub protocol: String,
    pub headers: BTreeMap<String, String>,
    /// Replaces the default field mapping when set
    pub fields_mapping: Option<Vec<FieldMapping>>,
    pub logs: OtelLogs,
    pub metrics: OtelMetrics,
}

impl Default for OpenTelemetryConfig {
    fn default() -> Self {
        Self {
            target_host: String::new(),
            target_port: 4317,
            protocol: "grpc".to_string(),
            headers: BTreeMap::new(),
            fields_mapping: None,
            logs: OtelLogs { enable: true },
            metrics: OtelMetrics::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldMapping {
    pub input: String,
    pub output: String,
    pub multiplier: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OtelLogs {
    pub enable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OtelMetrics {
    pub enable: bool,
    pub push_time_interval: String,
}

impl Default for OtelMetrics {
    fn default() -> Self {
        Self {
            enable: false,
            push_time_interval: "20s".to_string(),
        }
    }
}

/// A namespace-scoped collection rule created by a project owner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NamespaceSlice {
    pub name: String,
    pub namespace: String,
    pub sampling: u32,
    pub subnet_labels: Vec<SubnetLabel>,
}

/// User-supplied metric resource
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowMetric {
    pub name: String,
    pub namespace: String,
    pub spec: FlowMetricSpec,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricType {
    #[default]
    Counter,
    Histogram,
    Gauge,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Histogram => "histogram",
            MetricType::Gauge => "gauge",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowDirection {
    #[default]
    Any,
    Egress,
    Ingress,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchType {
    #[default]
    Equal,
    NotEqual,
    Presence,
    Absence,
    MatchRegex,
    NotMatchRegex,
}

impl MatchType {
    /// Wire name understood by the metrics encoder
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Equal => "equal",
            MatchType::NotEqual => "not_equal",
            MatchType::Presence => "presence",
            MatchType::Absence => "absence",
            MatchType::MatchRegex => "match_regex",
            MatchType::NotMatchRegex => "not_match_regex",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricFilter {
    pub field: String,
    pub value: String,
    pub match_type: MatchType,
}

impl MetricFilter {
    pub fn presence(field: &str) -> Self {
        Self {
            field: field.to_string(),
            value: String::new(),
            match_type: MatchType::Presence,
        }
    }

    pub fn equal(field: &str, value: &str) -> Self {
        Self {
            field: field.to_string(),
            value: value.to_string(),
            match_type: MatchType::Equal,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowMetricSpec {
    pub metric_name: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub help: String,
    pub value_field: String,
    pub labels: Vec<String>,
    pub filters: Vec<MetricFilter>,
    pub direction: FlowDirection,
    /// Kept as strings so malformed values can be reported per definition
    pub buckets: Vec<String>,
    pub divider: String,
    pub remap: BTreeMap<String, String>,
    pub flatten: Vec<String>,
}

/// Everything a reconciliation pass compiles
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildInput {
    pub spec: CollectionSpec,
    pub flow_metrics: Vec<FlowMetric>,
    pub slices: Vec<NamespaceSlice>,
    /// Cluster-detected subnet labels, already resolved
    pub detected_subnets: Vec<SubnetLabel>,
    /// Fallback cluster identity for multi-cluster tagging
    pub cluster_id: String,
}

impl BuildInput {
    /// Name written into `K8S_ClusterName`, empty when none resolves
    pub fn cluster_name(&self) -> &str {
        if !self.spec.processor.cluster_name.is_empty() {
            &self.spec.processor.cluster_name
        } else {
            &self.cluster_id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_defaults_from_empty_json() {
        let spec: CollectionSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(spec.namespace, DEFAULT_NAMESPACE);
        assert!(spec.use_loki());
        assert!(!spec.use_conntrack());
        assert_eq!(spec.processor.advanced.port, DEFAULT_INGEST_PORT);
        assert_eq!(spec.processor.deduper.mode, DeduperMode::Disabled);
        assert!(spec.processor.metrics.include_list.is_none());
    }

    #[test]
    fn test_feature_names_deserialize() {
        let agent: AgentSpec = serde_json::from_str(
            r#"{"features":["DNSTracking","FlowRTT","UDNMapping","IPSec","PacketDrop"]}"#,
        )
        .unwrap();
        assert!(agent.is_dns_tracking_enabled());
        assert!(agent.is_flow_rtt_enabled());
        assert!(agent.is_udn_mapping_enabled());
        assert!(agent.is_ipsec_enabled());
        // not privileged and no eBPF manager
        assert!(!agent.is_packet_drop_enabled());
    }

    #[test]
    fn test_packet_drop_with_ebpf_manager() {
        let agent = AgentSpec {
            features: vec![AgentFeature::PacketDrop, AgentFeature::EbpfManager],
            privileged: false,
        };
        assert!(agent.is_packet_drop_enabled());
    }

    #[test]
    fn test_cluster_name_falls_back_to_cluster_id() {
        let mut input = BuildInput {
            cluster_id: "abc-123".to_string(),
            ..Default::default()
        };
        assert_eq!(input.cluster_name(), "abc-123");

        input.spec.processor.cluster_name = "east".to_string();
        assert_eq!(input.cluster_name(), "east");
    }

    #[test]
    fn test_filter_sampling_detection() {
        let mut spec = CollectionSpec::default();
        assert!(!spec.has_filters_sampling());
        spec.processor.filters.push(ProcessorFilter {
            query: "Proto=6".to_string(),
            output_target: FilterTarget::All,
            sampling: 10,
        });
        assert!(spec.has_filters_sampling());
    }
}
