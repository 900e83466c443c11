use super::*;
use crate::metrics::cardinality::classify_cardinality;

fn key(name: &str) -> ResourceKey {
    ResourceKey::new("ns1", name)
}

#[test]
fn test_accumulator_initial_state() {
    let mut acc = StatusAccumulator::new();
    assert!(acc.is_empty());
    let report = acc.drain();
    assert!(report.metrics.is_empty());
    assert!(report.slices.is_empty());
}

#[test]
fn test_last_write_wins() {
    let mut acc = StatusAccumulator::new();
    acc.set_metric_failure(&key("m1"), "bad buckets");
    acc.set_metric_ready(&key("m1"));

    let status = acc.metric(&key("m1")).unwrap();
    assert!(status.ready.as_ref().unwrap().is_true());
    assert_eq!(status.ready.as_ref().unwrap().reason, "Ready");
}

#[test]
fn test_cardinality_condition() {
    let mut acc = StatusAccumulator::new();
    acc.record_cardinality(&key("m1"), &classify_cardinality(&["SrcAddr"]));
    acc.record_cardinality(&key("m2"), &classify_cardinality(&["SrcK8S_Namespace"]));

    let m1 = acc.metric(&key("m1")).unwrap().cardinality.clone().unwrap();
    assert_eq!(m1.condition_type, conditions::CARDINALITY_WARNING);
    assert_eq!(m1.status, ConditionStatus::True);
    assert_eq!(m1.reason, "avoid");

    let m2 = acc.metric(&key("m2")).unwrap().cardinality.clone().unwrap();
    assert_eq!(m2.status, ConditionStatus::False);
    assert_eq!(m2.reason, "fine");
}

#[test]
fn test_drain_skips_entries_without_ready_condition() {
    let mut acc = StatusAccumulator::new();
    acc.set_prometheus_name(&key("orphan"), "netobserv_orphan");
    acc.set_metric_ready(&key("m1"));
    acc.set_filter_applied(&key("s1"), "SrcK8S_Namespace=\"ns1\"");

    let report = acc.drain();
    assert_eq!(report.metrics.len(), 1);
    assert!(report.metrics.contains_key(&key("m1")));
    assert!(report.slices.is_empty());
    assert!(acc.is_empty());
}

#[test]
fn test_subnet_warning_appends_until_capped() {
    let mut acc = StatusAccumulator::new();
    acc.add_subnet_warning(&key("s1"), "first");
    acc.add_subnet_warning(&key("s1"), "second");

    let warning = acc.slice(&key("s1")).unwrap().subnet_warning.clone().unwrap();
    assert_eq!(warning.message, "first; second");
    assert_eq!(warning.reason, "SubnetOverlap");

    let long = "x".repeat(600);
    acc.add_subnet_warning(&key("s2"), &long);
    acc.add_subnet_warning(&key("s2"), "dropped");
    let warning = acc.slice(&key("s2")).unwrap().subnet_warning.clone().unwrap();
    assert_eq!(warning.message.len(), 600);
}

#[test]
fn test_clear_subnet_warning_keeps_other_fields() {
    let mut acc = StatusAccumulator::new();
    acc.set_subnet_labels_configured(&key("s1"), 2);
    acc.add_subnet_warning(&key("s1"), "first");
    acc.clear_subnet_warning(&key("s1"));
    acc.add_subnet_warning(&key("s1"), "second");

    let slice = acc.slice(&key("s1")).unwrap();
    assert_eq!(slice.subnet_warning.as_ref().unwrap().message, "second");
    assert_eq!(slice.subnet_labels_configured, 2);

    acc.clear_subnet_warning(&key("missing"));
    assert!(acc.slice(&key("missing")).is_none());
}

#[test]
fn test_reset_clears_everything() {
    let mut acc = StatusAccumulator::new();
    acc.set_metric_ready(&key("m1"));
    acc.set_slice_ready(&key("s1"));
    acc.reset();
    assert!(acc.is_empty());
}

#[test]
fn test_report_counters() {
    let mut acc = StatusAccumulator::new();
    acc.set_metric_failure(&key("m1"), "could not parse metric divider as float");
    acc.set_metric_ready(&key("m2"));
    acc.record_cardinality(&key("m2"), &classify_cardinality(&["Unlisted"]));

    let report = acc.drain();
    assert_eq!(report.failed_metrics(), 1);
    assert_eq!(report.cardinality_warnings(), 1);
}

#[test]
fn test_memory_sink_keeps_last_report() {
    let mut acc = StatusAccumulator::new();
    acc.set_slice_ready(&key("s1"));
    let report = acc.drain();

    let mut sink = MemoryStatusSink::default();
    sink.publish(&report);
    assert_eq!(sink.publish_count, 1);
    assert_eq!(sink.last.unwrap(), report);
}
