//! Pipeline build and validation commands

use anyhow::{bail, Context, Result};
use pipeline_lib::pass::CompiledPipeline;
use pipeline_lib::pipeline::split::dynamic_config_name;
use pipeline_lib::pipeline::{DynamicConfig, StaticConfig};
use pipeline_lib::status::{MetricStatus, SliceStatus};
use pipeline_lib::{MemoryStatusSink, ReconcilePass, StatusReport, Topology};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tabled::Tabled;

use super::load_bundle;
use crate::output::{
    color_level, color_ready, color_reload, print_error, print_info, print_json, print_success,
    print_table, print_warning, OutputFormat,
};

/// Row for the stage table
#[derive(Tabled)]
struct StageRow {
    #[tabled(rename = "Stage")]
    name: String,
    #[tabled(rename = "Follows")]
    follows: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Reload")]
    reload: String,
}

/// Row for the metric status table
#[derive(Tabled)]
struct MetricStatusRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Exported Name")]
    exported_name: String,
    #[tabled(rename = "Ready")]
    ready: String,
    #[tabled(rename = "Cardinality")]
    cardinality: String,
}

/// Row for the slice status table
#[derive(Tabled)]
struct SliceStatusRow {
    #[tabled(rename = "Slice")]
    slice: String,
    #[tabled(rename = "Ready")]
    ready: String,
    #[tabled(rename = "Filter")]
    filter: String,
    #[tabled(rename = "Subnet Labels")]
    subnet_labels: usize,
    #[tabled(rename = "Warning")]
    warning: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PipelineOutput<'a> {
    topology: Topology,
    workload: &'a str,
    digest: &'a str,
    static_config: &'a StaticConfig,
    dynamic_config: &'a DynamicConfig,
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    metrics: BTreeMap<String, &'a MetricStatus>,
    slices: BTreeMap<String, &'a SliceStatus>,
}

impl<'a> From<&'a StatusReport> for StatusOutput<'a> {
    fn from(report: &'a StatusReport) -> Self {
        Self {
            metrics: report.metrics.iter().map(|(k, v)| (k.to_string(), v)).collect(),
            slices: report.slices.iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }
}

/// Run one pass over the bundle, building every requested topology
fn compile_all(path: &Path, topologies: &[Topology]) -> Result<(Vec<CompiledPipeline>, StatusReport)> {
    let input = load_bundle(path)?;
    let mut pass = ReconcilePass::new(input);

    let mut compiled = Vec::with_capacity(topologies.len());
    for topology in topologies {
        let pipeline = pass
            .build(*topology)
            .with_context(|| format!("Failed to build the {} pipeline", topology))?;
        compiled.push(pipeline);
    }

    let mut sink = MemoryStatusSink::default();
    let report = pass.finish(&mut sink);
    Ok((compiled, report))
}

fn write_documents(dir: &Path, compiled: &[CompiledPipeline]) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    for pipeline in compiled {
        let workload = pipeline.workload_name();
        let files = [
            (format!("{workload}.json"), serde_json::to_string_pretty(&pipeline.static_config)?),
            (
                format!("{}.json", dynamic_config_name(pipeline.topology)),
                serde_json::to_string_pretty(&pipeline.dynamic_config)?,
            ),
            (format!("{workload}.digest"), pipeline.digest.clone()),
        ];
        for (name, content) in files {
            let path = dir.join(name);
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
    }
    Ok(())
}

fn stage_rows(pipeline: &CompiledPipeline) -> Vec<StageRow> {
    pipeline
        .config
        .stages
        .iter()
        .map(|stage| {
            let kind = pipeline.config.kind_of(&stage.name);
            StageRow {
                name: stage.name.clone(),
                follows: stage.follows.clone().unwrap_or_else(|| "-".to_string()),
                kind: kind.map_or("-", |k| k.as_str()).to_string(),
                reload: color_reload(kind.map_or("static", |k| k.reload().as_str())),
            }
        })
        .collect()
}

fn print_status(report: &StatusReport) {
    if !report.metrics.is_empty() {
        let rows = report
            .metrics
            .iter()
            .map(|(key, status)| MetricStatusRow {
                resource: key.to_string(),
                exported_name: status.prometheus_name.clone().unwrap_or_else(|| "-".to_string()),
                ready: color_ready(status.ready.as_ref().map(|c| c.is_true())),
                cardinality: status
                    .cardinality
                    .as_ref()
                    .map_or_else(|| "-".to_string(), |c| color_level(&c.reason)),
            })
            .collect();
        print_table(rows, "No metric resources");
    }

    if !report.slices.is_empty() {
        let rows = report
            .slices
            .iter()
            .map(|(key, status)| SliceStatusRow {
                slice: key.to_string(),
                ready: color_ready(status.ready.as_ref().map(|c| c.is_true())),
                filter: status.filter_applied.clone(),
                subnet_labels: status.subnet_labels_configured,
                warning: status
                    .subnet_warning
                    .as_ref()
                    .map_or_else(String::new, |c| c.message.clone()),
            })
            .collect();
        print_table(rows, "No slices");
    }
}

/// Compile the bundle and show or write the resulting documents
pub fn run_build(
    path: &Path,
    topologies: &[Topology],
    out_dir: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let (compiled, report) = compile_all(path, topologies)?;

    if let Some(dir) = out_dir {
        write_documents(dir, &compiled)?;
    }

    match format {
        OutputFormat::Json => {
            let pipelines: Vec<PipelineOutput> = compiled
                .iter()
                .map(|p| PipelineOutput {
                    topology: p.topology,
                    workload: p.workload_name(),
                    digest: &p.digest,
                    static_config: &p.static_config,
                    dynamic_config: &p.dynamic_config,
                })
                .collect();
            print_json(&serde_json::json!({
                "pipelines": pipelines,
                "status": StatusOutput::from(&report),
            }))?;
        }
        OutputFormat::Table => {
            for pipeline in &compiled {
                print_info(&format!(
                    "{} ({}) digest {}",
                    pipeline.workload_name(),
                    pipeline.topology,
                    pipeline.digest
                ));
                print_table(stage_rows(pipeline), "Pipeline has no stages");
            }
            print_status(&report);
            if let Some(dir) = out_dir {
                print_success(&format!("Wrote pipeline documents to {}", dir.display()));
            }
        }
    }

    Ok(())
}

/// Compile the bundle and report whether it builds cleanly
pub fn run_validate(path: &Path, topologies: &[Topology], format: OutputFormat) -> Result<()> {
    let (compiled, report) = match compile_all(path, topologies) {
        Ok(result) => result,
        Err(err) => {
            match format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "valid": false,
                    "error": format!("{:#}", err),
                }))?,
                OutputFormat::Table => print_error(&format!("{:#}", err)),
            }
            bail!("pipeline validation failed");
        }
    };

    match format {
        OutputFormat::Json => {
            let pipelines: Vec<_> = compiled
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "topology": p.topology,
                        "stages": p.config.stages.len(),
                        "digest": p.digest,
                    })
                })
                .collect();
            print_json(&serde_json::json!({
                "valid": true,
                "pipelines": pipelines,
                "failedMetrics": report.failed_metrics(),
                "cardinalityWarnings": report.cardinality_warnings(),
            }))?;
        }
        OutputFormat::Table => {
            for pipeline in &compiled {
                print_success(&format!(
                    "{} pipeline is valid ({} stages, digest {})",
                    pipeline.topology,
                    pipeline.config.stages.len(),
                    pipeline.digest
                ));
            }
            let failed = report.failed_metrics();
            if failed > 0 {
                print_warning(&format!("{} custom metric(s) failed and were skipped", failed));
            }
            let warnings = report.cardinality_warnings();
            if warnings > 0 {
                print_warning(&format!("{} metric(s) carry a cardinality warning", warnings));
            }
        }
    }

    Ok(())
}
