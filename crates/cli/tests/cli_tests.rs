//! CLI integration tests

use std::path::Path;
use std::process::{Command, Output};

fn flowpipe(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_flowpipe"))
        .arg("--config")
        .arg(dir.join("settings.json"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute command")
}

fn write_bundle(dir: &Path, content: &str) -> String {
    let path = dir.join("bundle.json");
    std::fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let dir = tempfile::tempdir().unwrap();
    let output = flowpipe(dir.path(), &["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("build"), "Should show build command");
    assert!(stdout.contains("validate"), "Should show validate command");
    assert!(stdout.contains("cardinality"), "Should show cardinality command");
    assert!(stdout.contains("catalog"), "Should show catalog command");
    assert!(stdout.contains("--print-metrics"), "Should show metrics flag");
}

#[test]
fn test_cli_version() {
    let dir = tempfile::tempdir().unwrap();
    let output = flowpipe(dir.path(), &["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("flowpipe"), "Should show binary name");
}

#[test]
fn test_build_default_bundle_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = write_bundle(dir.path(), "{}");
    let output = flowpipe(dir.path(), &["build", &bundle, "--format", "json"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let pipeline = &value["pipelines"][0];
    assert_eq!(pipeline["workload"], "flowlogs-pipeline");
    assert_eq!(pipeline["staticConfig"]["pipeline"][0]["name"], "grpc");
    assert_eq!(pipeline["dynamicConfig"]["parameters"][0]["name"], "prometheus");
    assert!(!pipeline["digest"].as_str().unwrap().is_empty());
}

#[test]
fn test_build_writes_documents() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = write_bundle(
        dir.path(),
        r#"{"spec":{"kafka":{"address":"kafka:9092","topic":"flows"}}}"#,
    );
    let out = dir.path().join("out");
    let output = flowpipe(
        dir.path(),
        &["build", &bundle, "--topology", "both", "--out-dir", out.to_str().unwrap()],
    );
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    for name in [
        "flowlogs-pipeline.json",
        "flowlogs-pipeline-config-dynamic.json",
        "flowlogs-pipeline.digest",
        "flowlogs-pipeline-transformer.json",
        "flowlogs-pipeline-transformer-config-dynamic.json",
        "flowlogs-pipeline-transformer.digest",
    ] {
        assert!(out.join(name).exists(), "missing {}", name);
    }

    let transformer: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(out.join("flowlogs-pipeline-transformer.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(transformer["pipeline"][0]["name"], "kafka-read");
}

#[test]
fn test_validate_reports_bad_cidr() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = write_bundle(
        dir.path(),
        r#"{"spec":{"processor":{"subnetLabels":{"customLabels":[{"name":"internal","cidrs":["10.0.0.0/99"]}]}}}}"#,
    );
    let output = flowpipe(dir.path(), &["validate", &bundle]);
    assert!(!output.status.success(), "Bad CIDR should fail validation");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("10.0.0.0/99"), "stderr: {}", stderr);
}

#[test]
fn test_validate_transformer_needs_kafka() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = write_bundle(dir.path(), "{}");
    let output = flowpipe(dir.path(), &["validate", &bundle, "--topology", "transformer", "-f", "json"]);
    assert!(!output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let value: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(value["valid"], false);
    assert!(value["error"].as_str().unwrap().contains("address"));
}

#[test]
fn test_cardinality_json() {
    let dir = tempfile::tempdir().unwrap();
    let output = flowpipe(dir.path(), &["cardinality", "SrcK8S_Namespace", "SrcAddr", "-f", "json"]);
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["overall"], "avoid");
    assert_eq!(value["warning"], true);
    assert_eq!(value["labels"]["fine"][0], "SrcK8S_Namespace");
}

#[test]
fn test_catalog_depends_on_log_sink() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = write_bundle(dir.path(), r#"{"spec":{"loki":{"enable":false}}}"#);

    let default = flowpipe(dir.path(), &["catalog", "-f", "json"]);
    let without_loki = flowpipe(dir.path(), &["catalog", "--bundle", &bundle, "-f", "json"]);
    assert!(default.status.success());
    assert!(without_loki.status.success());

    let included = |out: &Output| {
        let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
        value
            .as_array()
            .unwrap()
            .iter()
            .filter(|e| e["included"] == true)
            .count()
    };
    assert_eq!(included(&default), 8);
    assert_eq!(included(&without_loki), 9);
}

#[test]
fn test_settings_default_format() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("settings.json"), r#"{"default_format":"json"}"#).unwrap();
    let output = flowpipe(dir.path(), &["cardinality", "Proto"]);
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["overall"], "fine");
}

#[test]
fn test_print_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = write_bundle(dir.path(), "{}");
    let output = flowpipe(dir.path(), &["validate", &bundle, "--print-metrics"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("flowpipe_builds_total 1"));
}

#[test]
fn test_invalid_command() {
    let dir = tempfile::tempdir().unwrap();
    let output = flowpipe(dir.path(), &["invalid-command"]);
    assert!(!output.status.success(), "Invalid command should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error") || stderr.contains("invalid"));
}
