//! Connection tracking stage
//!
//! Aggregates flow logs into conversations keyed by the address/port pair
//! of both ends plus the protocol.

use super::api::{
    ConnTrack, ConnTrackHash, ConnTrackSchedulingGroup, ConnTrackTcpFlags, FieldGroup,
    KeyDefinition, Operation, OutputField, RecordType,
};
use crate::models::{CollectionSpec, LogTypes};
use std::collections::BTreeMap;

fn field(name: &str, operation: Operation) -> OutputField {
    OutputField {
        name: name.to_string(),
        operation,
        split_ab: false,
        input: String::new(),
        report_missing: false,
    }
}

fn split(name: &str, operation: Operation) -> OutputField {
    OutputField {
        split_ab: true,
        ..field(name, operation)
    }
}

fn reported(name: &str, operation: Operation) -> OutputField {
    OutputField {
        report_missing: true,
        ..field(name, operation)
    }
}

fn group(name: &str, fields: &[&str]) -> FieldGroup {
    FieldGroup {
        name: name.to_string(),
        fields: fields.iter().map(|f| f.to_string()).collect(),
    }
}

/// Record types emitted for a log type selection
pub fn record_types(log_types: LogTypes) -> Vec<RecordType> {
    match log_types {
        LogTypes::Flows => vec![RecordType::FlowLog],
        LogTypes::Conversations => vec![
            RecordType::NewConnection,
            RecordType::Heartbeat,
            RecordType::EndConnection,
        ],
        LogTypes::EndedConversations => vec![RecordType::EndConnection],
        LogTypes::All => vec![
            RecordType::FlowLog,
            RecordType::NewConnection,
            RecordType::Heartbeat,
            RecordType::EndConnection,
        ],
    }
}

/// Aggregations always computed, followed by the ones unlocked by agent features
pub fn output_fields(spec: &CollectionSpec) -> Vec<OutputField> {
    let mut fields = vec![
        field("Bytes", Operation::Sum),
        split("Bytes", Operation::Sum),
        field("Packets", Operation::Sum),
        split("Packets", Operation::Sum),
        field("numFlowLogs", Operation::Count),
        reported("TimeFlowStartMs", Operation::Min),
        reported("TimeFlowEndMs", Operation::Max),
        reported("FlowDirection", Operation::First),
        reported("IfDirection", Operation::First),
        reported("AgentIP", Operation::First),
    ];

    let agent = &spec.agent;
    if agent.is_packet_drop_enabled() {
        fields.extend([
            field("PktDropBytes", Operation::Sum),
            split("PktDropBytes", Operation::Sum),
            field("PktDropPackets", Operation::Sum),
            split("PktDropPackets", Operation::Sum),
            field("PktDropLatestState", Operation::Last),
            field("PktDropLatestDropCause", Operation::Last),
        ]);
    }
    if agent.is_dns_tracking_enabled() {
        fields.extend([
            field("DnsFlagsResponseCode", Operation::Last),
            field("DnsLatencyMs", Operation::Max),
        ]);
    }
    if agent.is_network_events_enabled() {
        fields.push(field("NetworkEvents", Operation::Last));
    }
    if agent.is_flow_rtt_enabled() {
        fields.push(OutputField {
            input: "TimeFlowRttNs".to_string(),
            ..field("MaxTimeFlowRttNs", Operation::Max)
        });
    }
    fields
}

/// Full connection tracking configuration for `spec`
pub fn conntrack_stage(spec: &CollectionSpec) -> ConnTrack {
    let advanced = &spec.processor.advanced;
    ConnTrack {
        key_definition: KeyDefinition {
            field_groups: vec![
                group("src", &["SrcAddr", "SrcPort"]),
                group("dst", &["DstAddr", "DstPort"]),
                group("common", &["Proto"]),
            ],
            hash: ConnTrackHash {
                field_group_refs: vec!["common".to_string()],
                field_group_a_ref: "src".to_string(),
                field_group_b_ref: "dst".to_string(),
            },
        },
        output_record_types: record_types(spec.processor.log_types),
        output_fields: output_fields(spec),
        // single default group, empty selector matches every flow
        scheduling: vec![ConnTrackSchedulingGroup {
            selector: BTreeMap::new(),
            heartbeat_interval: advanced.conversation_heartbeat_interval.clone(),
            end_connection_timeout: advanced.conversation_end_timeout.clone(),
            terminating_timeout: advanced.conversation_terminating_timeout.clone(),
        }],
        tcp_flags: ConnTrackTcpFlags {
            field_name: "Flags".to_string(),
            detect_end_connection: true,
            swap_ab: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgentFeature;
    use pretty_assertions::assert_eq;

    fn spec_with(features: &[AgentFeature]) -> CollectionSpec {
        let mut spec = CollectionSpec::default();
        spec.processor.log_types = LogTypes::All;
        spec.agent.privileged = true;
        spec.agent.features = features.to_vec();
        spec
    }

    #[test]
    fn test_base_fields() {
        let fields = output_fields(&spec_with(&[]));
        assert_eq!(fields.len(), 10);
        assert_eq!(fields[1].name, "Bytes");
        assert!(fields[1].split_ab);
        assert!(fields[9].report_missing);
    }

    #[test]
    fn test_features_only_add_fields() {
        let base = output_fields(&spec_with(&[]));
        for feature in [
            AgentFeature::PacketDrop,
            AgentFeature::DnsTracking,
            AgentFeature::FlowRtt,
            AgentFeature::NetworkEvents,
        ] {
            let fields = output_fields(&spec_with(&[feature]));
            assert!(fields.len() > base.len(), "{feature:?} added nothing");
            assert_eq!(&fields[..base.len()], &base[..]);
        }
    }

    #[test]
    fn test_rtt_field_reads_raw_rtt() {
        let fields = output_fields(&spec_with(&[AgentFeature::FlowRtt]));
        let rtt = fields.last().unwrap();
        assert_eq!(rtt.name, "MaxTimeFlowRttNs");
        assert_eq!(rtt.input, "TimeFlowRttNs");
    }

    #[test]
    fn test_unprivileged_agent_has_no_drop_fields() {
        let mut spec = spec_with(&[AgentFeature::PacketDrop]);
        spec.agent.privileged = false;
        assert_eq!(output_fields(&spec).len(), 10);
    }

    #[test]
    fn test_record_types() {
        assert_eq!(record_types(LogTypes::EndedConversations), vec![RecordType::EndConnection]);
        assert_eq!(record_types(LogTypes::Conversations).len(), 3);
        assert_eq!(record_types(LogTypes::All)[0], RecordType::FlowLog);
    }

    #[test]
    fn test_stage_shape() {
        let mut spec = spec_with(&[]);
        spec.processor.advanced.conversation_heartbeat_interval = "1m".to_string();
        let ct = conntrack_stage(&spec);

        assert_eq!(ct.key_definition.field_groups.len(), 3);
        assert_eq!(ct.key_definition.hash.field_group_refs, vec!["common"]);
        assert_eq!(ct.scheduling.len(), 1);
        assert_eq!(ct.scheduling[0].heartbeat_interval, "1m");
        assert_eq!(ct.scheduling[0].end_connection_timeout, "10s");
        assert!(ct.tcp_flags.detect_end_connection && ct.tcp_flags.swap_ab);

        let json = serde_json::to_value(&ct).unwrap();
        assert_eq!(json["keyDefinition"]["hash"]["fieldGroupARef"], "src");
        assert_eq!(json["tcpFlags"]["swapAB"], true);
        assert_eq!(json["outputFields"][1]["splitAB"], true);
    }
}
