//! Custom exporter stages
//!
//! One leaf per Kafka or IPFIX exporter. An OpenTelemetry exporter gets a
//! key-renaming transform followed by a logs and/or a metrics encoder.

use super::api::{
    Encode, EncodeKafka, EncodeOtlpLogs, EncodeOtlpMetrics, GenericMappingRule, OtlpConnectionInfo,
    StageParam, Transform, TransformGeneric, Write, WriteIpfix,
};
use super::builder::{Branch, PipelineBuilder, StageKind};
use crate::error::{BuildError, Result};
use crate::metrics::{MetricDefinition, MetricFilterItem, METRICS_PREFIX};
use crate::models::{ExporterSpec, ExporterType, FieldMapping, IpfixConfig, KafkaConfig, OpenTelemetryConfig};

const OTEL_EXPIRY_TIME: &str = "2m";

/// Default flow field to OpenTelemetry attribute mapping, sorted by input
pub const DEFAULT_OTEL_MAPPING: &[(&str, &str)] = &[
    ("Bytes", "bytes"),
    ("DnsErrno", "dns.errno"),
    ("DnsFlags", "dns.flags"),
    ("DnsFlagsResponseCode", "dns.responsecode"),
    ("DnsId", "dns.id"),
    ("DnsLatencyMs", "dns.latency"),
    ("Dscp", "dscp"),
    ("DstAddr", "destination.address"),
    ("DstK8S_HostIP", "destination.k8s.host.address"),
    ("DstK8S_HostName", "destination.k8s.host.name"),
    ("DstK8S_Name", "destination.k8s.name"),
    ("DstK8S_Namespace", "destination.k8s.namespace.name"),
    ("DstK8S_OwnerName", "destination.k8s.owner.name"),
    ("DstK8S_OwnerType", "destination.k8s.owner.kind"),
    ("DstK8S_Type", "destination.k8s.kind"),
    ("DstK8S_Zone", "destination.zone"),
    ("DstMac", "destination.mac"),
    ("DstPort", "destination.port"),
    ("DstSubnetLabel", "destination.subnet.label"),
    ("Flags", "tcp.flags"),
    ("FlowDirection", "host.direction"),
    ("IPSecStatus", "ipsec.status"),
    ("IcmpCode", "icmp.code"),
    ("IcmpType", "icmp.type"),
    ("IfDirections", "interface.directions"),
    ("Interfaces", "interface.names"),
    ("K8S_ClusterName", "k8s.cluster.name"),
    ("K8S_FlowLayer", "k8s.layer"),
    ("Packets", "packets"),
    ("PktDropBytes", "drops.bytes"),
    ("PktDropLatestDropCause", "drops.latestcause"),
    ("PktDropLatestFlags", "drops.latestflags"),
    ("PktDropLatestState", "drops.lateststate"),
    ("PktDropPackets", "drops.packets"),
    ("Proto", "protocol"),
    ("SrcAddr", "source.address"),
    ("SrcK8S_HostIP", "source.k8s.host.address"),
    ("SrcK8S_HostName", "source.k8s.host.name"),
    ("SrcK8S_Name", "source.k8s.name"),
    ("SrcK8S_Namespace", "source.k8s.namespace.name"),
    ("SrcK8S_OwnerName", "source.k8s.owner.name"),
    ("SrcK8S_OwnerType", "source.k8s.owner.kind"),
    ("SrcK8S_Type", "source.k8s.kind"),
    ("SrcK8S_Zone", "source.zone"),
    ("SrcMac", "source.mac"),
    ("SrcPort", "source.port"),
    ("SrcSubnetLabel", "source.subnet.label"),
    ("TimeFlowEndMs", "timeflowend"),
    ("TimeFlowRttNs", "tcp.rtt"),
    ("TimeFlowStartMs", "timeflowstart"),
    ("TimeReceived", "timereceived"),
];

fn otel_name(input: &str) -> String {
    DEFAULT_OTEL_MAPPING
        .binary_search_by(|(k, _)| (*k).cmp(input))
        .map(|i| DEFAULT_OTEL_MAPPING[i].1.to_string())
        .unwrap_or_else(|_| input.to_string())
}

pub fn ipfix_transport(transport: &str) -> &'static str {
    match transport {
        "UDP" => "udp",
        _ => "tcp",
    }
}

pub fn otel_connection_type(protocol: &str) -> &'static str {
    match protocol {
        "http" => "http",
        _ => "grpc",
    }
}

pub fn kafka_export(name: &str, kafka: &KafkaConfig) -> Result<StageParam> {
    if kafka.address.is_empty() {
        return Err(BuildError::missing_field("kafka exporter", name, "kafka.address"));
    }
    if kafka.topic.is_empty() {
        return Err(BuildError::missing_field("kafka exporter", name, "kafka.topic"));
    }
    Ok(StageParam::encode(
        name,
        Encode::kafka(EncodeKafka {
            address: kafka.address.clone(),
            topic: kafka.topic.clone(),
        }),
    ))
}

pub fn ipfix_export(name: &str, ipfix: &IpfixConfig) -> Result<StageParam> {
    if ipfix.target_host.is_empty() {
        return Err(BuildError::missing_field("IPFIX exporter", name, "ipfix.targetHost"));
    }
    Ok(StageParam::write(
        name,
        Write::ipfix(WriteIpfix {
            target_host: ipfix.target_host.clone(),
            target_port: ipfix.target_port,
            transport: ipfix_transport(&ipfix.transport).to_string(),
            enterprise_id: ipfix.enterprise_id,
        }),
    ))
}

/// Key renaming rules: the user mapping when given, else the default one
pub fn otel_transform(name: &str, mapping: Option<&[FieldMapping]>) -> Result<TransformGeneric> {
    let rules = match mapping {
        Some(custom) => custom
            .iter()
            .map(|m| {
                if m.input.is_empty() {
                    return Err(BuildError::missing_field("OpenTelemetry field mapping", name, "input"));
                }
                if m.output.is_empty() {
                    return Err(BuildError::missing_field("OpenTelemetry field mapping", name, "output"));
                }
                Ok(GenericMappingRule {
                    input: m.input.clone(),
                    output: m.output.clone(),
                    multiplier: m.multiplier,
                })
            })
            .collect::<Result<Vec<_>>>()?,
        None => DEFAULT_OTEL_MAPPING
            .iter()
            .map(|(input, output)| GenericMappingRule {
                input: input.to_string(),
                output: output.to_string(),
                multiplier: None,
            })
            .collect(),
    };
    Ok(TransformGeneric {
        policy: "replace_keys".to_string(),
        rules,
    })
}

/// Merged metrics with flow field names replaced by their attribute names
pub fn otel_metrics(metrics: &[MetricDefinition]) -> Vec<MetricDefinition> {
    metrics
        .iter()
        .map(|m| MetricDefinition {
            name: otel_name(&m.name),
            metric_type: m.metric_type.clone(),
            help: String::new(),
            filters: m
                .filters
                .iter()
                .map(|f| MetricFilterItem {
                    key: otel_name(&f.key),
                    value: f.value.clone(),
                    match_type: f.match_type.clone(),
                })
                .collect(),
            value_key: otel_name(&m.value_key),
            labels: m.labels.iter().map(|l| otel_name(l)).collect(),
            remap: Default::default(),
            flatten: Vec::new(),
            buckets: m.buckets.clone(),
            value_scale: m.value_scale,
            origin: m.origin,
        })
        .collect()
}

fn attach_otel(
    builder: &mut PipelineBuilder,
    name: &str,
    otel: &OpenTelemetryConfig,
    metrics: &[MetricDefinition],
) -> Result<()> {
    let logs = otel.logs.enable;
    let with_metrics = otel.metrics.enable;
    if !logs && !with_metrics {
        return Ok(());
    }
    if otel.target_host.is_empty() {
        return Err(BuildError::missing_field(
            "OpenTelemetry exporter",
            name,
            "openTelemetry.targetHost",
        ));
    }

    let connection = OtlpConnectionInfo {
        address: otel.target_host.clone(),
        port: otel.target_port,
        connection_type: otel_connection_type(&otel.protocol).to_string(),
        headers: otel.headers.clone(),
    };

    let transform = otel_transform(name, otel.fields_mapping.as_deref())?;
    let transform_stage = builder.attach(
        Branch::Exporters,
        StageKind::OtelTransform,
        StageParam::transform(&format!("{name}-transform"), Transform::generic(transform)),
    )?;

    if logs {
        builder.append(
            &transform_stage,
            StageKind::OtelLogs,
            StageParam::encode(
                &format!("{name}-logs"),
                Encode::otlp_logs(EncodeOtlpLogs {
                    connection: connection.clone(),
                }),
            ),
        )?;
    }
    if with_metrics {
        builder.append(
            &transform_stage,
            StageKind::OtelMetrics,
            StageParam::encode(
                &format!("{name}-metrics"),
                Encode::otlp_metrics(EncodeOtlpMetrics {
                    connection,
                    prefix: METRICS_PREFIX.to_string(),
                    metrics: otel_metrics(metrics),
                    push_time_interval: otel.metrics.push_time_interval.clone(),
                    expiry_time: OTEL_EXPIRY_TIME.to_string(),
                }),
            ),
        )?;
    }
    Ok(())
}

/// Attach every configured exporter to the exporters branch, in order
pub fn attach_exporters(
    builder: &mut PipelineBuilder,
    exporters: &[ExporterSpec],
    metrics: &[MetricDefinition],
) -> Result<()> {
    for (i, exporter) in exporters.iter().enumerate() {
        match exporter.exporter_type {
            ExporterType::Kafka => {
                let param = kafka_export(&format!("kafka-export-{i}"), &exporter.kafka)?;
                builder.attach(Branch::Exporters, StageKind::KafkaExport, param)?;
            }
            ExporterType::Ipfix => {
                let param = ipfix_export(&format!("IPFIX-export-{i}"), &exporter.ipfix)?;
                builder.attach(Branch::Exporters, StageKind::IpfixExport, param)?;
            }
            ExporterType::OpenTelemetry => {
                attach_otel(builder, &format!("Otel-export-{i}"), &exporter.open_telemetry, metrics)?;
            }
        }
    }
    Ok(())
}
