//! Label cardinality classification
//!
//! Advisory only: a risky label set never blocks a metric, it raises a
//! warning condition on the metric's status.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Expected number of distinct values a label produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardinalityLevel {
    Fine,
    Careful,
    Avoid,
    Unknown,
}

impl CardinalityLevel {
    /// Reducer precedence: the first level present in this order wins
    const PRECEDENCE: [CardinalityLevel; 4] = [
        CardinalityLevel::Avoid,
        CardinalityLevel::Unknown,
        CardinalityLevel::Careful,
        CardinalityLevel::Fine,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CardinalityLevel::Fine => "fine",
            CardinalityLevel::Careful => "careful",
            CardinalityLevel::Avoid => "avoid",
            CardinalityLevel::Unknown => "unknown",
        }
    }

    /// Levels that raise a cardinality warning
    pub fn is_warning(&self) -> bool {
        matches!(self, CardinalityLevel::Avoid | CardinalityLevel::Unknown)
    }
}

impl fmt::Display for CardinalityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Known flow fields, sorted by name for binary search
static LEVELS: &[(&str, CardinalityLevel)] = &[
    ("AgentIP", CardinalityLevel::Careful),
    ("Bytes", CardinalityLevel::Avoid),
    ("DnsErrno", CardinalityLevel::Fine),
    ("DnsFlags", CardinalityLevel::Fine),
    ("DnsFlagsResponseCode", CardinalityLevel::Fine),
    ("DnsId", CardinalityLevel::Avoid),
    ("DnsLatencyMs", CardinalityLevel::Avoid),
    ("Dscp", CardinalityLevel::Fine),
    ("DstAddr", CardinalityLevel::Avoid),
    ("DstK8S_HostIP", CardinalityLevel::Careful),
    ("DstK8S_HostName", CardinalityLevel::Careful),
    ("DstK8S_Name", CardinalityLevel::Careful),
    ("DstK8S_Namespace", CardinalityLevel::Fine),
    ("DstK8S_NetworkName", CardinalityLevel::Fine),
    ("DstK8S_OwnerName", CardinalityLevel::Careful),
    ("DstK8S_OwnerType", CardinalityLevel::Fine),
    ("DstK8S_Type", CardinalityLevel::Fine),
    ("DstK8S_Zone", CardinalityLevel::Fine),
    ("DstMac", CardinalityLevel::Avoid),
    ("DstPort", CardinalityLevel::Careful),
    ("DstSubnetLabel", CardinalityLevel::Fine),
    ("Duplicate", CardinalityLevel::Fine),
    ("Etype", CardinalityLevel::Fine),
    ("Flags", CardinalityLevel::Fine),
    ("FlowDirection", CardinalityLevel::Fine),
    ("IPSecStatus", CardinalityLevel::Fine),
    ("IcmpCode", CardinalityLevel::Fine),
    ("IcmpType", CardinalityLevel::Fine),
    ("IfDirections", CardinalityLevel::Fine),
    ("Interfaces", CardinalityLevel::Careful),
    ("K8S_ClusterName", CardinalityLevel::Fine),
    ("K8S_FlowLayer", CardinalityLevel::Fine),
    ("NetworkEvents>Action", CardinalityLevel::Fine),
    ("NetworkEvents>Direction", CardinalityLevel::Fine),
    ("NetworkEvents>Name", CardinalityLevel::Careful),
    ("NetworkEvents>Namespace", CardinalityLevel::Fine),
    ("NetworkEvents>Type", CardinalityLevel::Fine),
    ("Packets", CardinalityLevel::Avoid),
    ("PktDropBytes", CardinalityLevel::Avoid),
    ("PktDropLatestDropCause", CardinalityLevel::Fine),
    ("PktDropLatestFlags", CardinalityLevel::Fine),
    ("PktDropLatestState", CardinalityLevel::Fine),
    ("PktDropPackets", CardinalityLevel::Avoid),
    ("Proto", CardinalityLevel::Fine),
    ("Sampling", CardinalityLevel::Fine),
    ("SrcAddr", CardinalityLevel::Avoid),
    ("SrcK8S_HostIP", CardinalityLevel::Careful),
    ("SrcK8S_HostName", CardinalityLevel::Careful),
    ("SrcK8S_Name", CardinalityLevel::Careful),
    ("SrcK8S_Namespace", CardinalityLevel::Fine),
    ("SrcK8S_NetworkName", CardinalityLevel::Fine),
    ("SrcK8S_OwnerName", CardinalityLevel::Careful),
    ("SrcK8S_OwnerType", CardinalityLevel::Fine),
    ("SrcK8S_Type", CardinalityLevel::Fine),
    ("SrcK8S_Zone", CardinalityLevel::Fine),
    ("SrcMac", CardinalityLevel::Avoid),
    ("SrcPort", CardinalityLevel::Avoid),
    ("SrcSubnetLabel", CardinalityLevel::Fine),
    ("TLSVersion", CardinalityLevel::Fine),
    ("TimeFlowEndMs", CardinalityLevel::Avoid),
    ("TimeFlowRttNs", CardinalityLevel::Avoid),
    ("TimeFlowStartMs", CardinalityLevel::Avoid),
    ("TimeReceived", CardinalityLevel::Avoid),
    ("XlatDstAddr", CardinalityLevel::Avoid),
    ("XlatDstPort", CardinalityLevel::Careful),
    ("XlatSrcAddr", CardinalityLevel::Avoid),
    ("XlatSrcPort", CardinalityLevel::Avoid),
    ("_RecordType", CardinalityLevel::Fine),
];

/// Level of a single label; unlisted labels are unknown
pub fn level_of(label: &str) -> CardinalityLevel {
    LEVELS
        .binary_search_by(|(name, _)| (*name).cmp(label))
        .map(|i| LEVELS[i].1)
        .unwrap_or(CardinalityLevel::Unknown)
}

/// Labels grouped by level, in the order they were given
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CardinalityReport {
    pub by_level: BTreeMap<CardinalityLevel, Vec<String>>,
}

impl CardinalityReport {
    /// Worst level present, `fine` when there are no labels
    pub fn overall(&self) -> CardinalityLevel {
        CardinalityLevel::PRECEDENCE
            .into_iter()
            .find(|level| self.by_level.contains_key(level))
            .unwrap_or(CardinalityLevel::Fine)
    }

    /// Human-readable breakdown, worst level first
    pub fn details(&self) -> String {
        let mut out = String::new();
        for level in CardinalityLevel::PRECEDENCE {
            if let Some(labels) = self.by_level.get(&level) {
                out.push_str(&format!(
                    "Cardinality level '{}': {} labels ({}); ",
                    level,
                    labels.len(),
                    labels.join(", ")
                ));
            }
        }
        out
    }

    pub fn labels_at(&self, level: CardinalityLevel) -> &[String] {
        self.by_level.get(&level).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Classify a label set
pub fn classify_cardinality<S: AsRef<str>>(labels: &[S]) -> CardinalityReport {
    let mut report = CardinalityReport::default();
    for label in labels {
        let label = label.as_ref();
        report
            .by_level
            .entry(level_of(label))
            .or_default()
            .push(label.to_string());
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_sorted() {
        assert!(LEVELS.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_empty_label_set_is_fine() {
        let report = classify_cardinality::<&str>(&[]);
        assert_eq!(report.overall(), CardinalityLevel::Fine);
        assert!(report.details().is_empty());
    }

    #[test]
    fn test_worst_level_wins() {
        let report = classify_cardinality(&["SrcK8S_Namespace", "SrcK8S_HostName"]);
        assert_eq!(report.overall(), CardinalityLevel::Careful);

        let report = classify_cardinality(&["SrcK8S_Namespace", "SrcK8S_HostName", "SrcAddr"]);
        assert_eq!(report.overall(), CardinalityLevel::Avoid);
        assert!(report.overall().is_warning());
    }

    #[test]
    fn test_unknown_label_outranks_careful() {
        let report = classify_cardinality(&["SrcK8S_HostName", "MyCustomField"]);
        assert_eq!(report.overall(), CardinalityLevel::Unknown);
        assert!(report.overall().is_warning());
        assert_eq!(report.labels_at(CardinalityLevel::Unknown), ["MyCustomField"]);
    }

    #[test]
    fn test_details_format() {
        let report = classify_cardinality(&["DstAddr", "SrcAddr", "Proto"]);
        assert_eq!(
            report.details(),
            "Cardinality level 'avoid': 2 labels (DstAddr, SrcAddr); Cardinality level 'fine': 1 labels (Proto); "
        );
    }
}
