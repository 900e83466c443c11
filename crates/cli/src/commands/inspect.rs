//! Metric inspection commands

use anyhow::Result;
use pipeline_lib::metrics::cardinality::level_of;
use pipeline_lib::metrics::{all_builtin_names, builtin_definitions, classify_cardinality, include_list};
use pipeline_lib::CollectionSpec;
use std::collections::HashSet;
use std::path::Path;
use tabled::Tabled;

use super::load_bundle;
use crate::output::{color_level, print_info, print_json, print_table, print_warning, OutputFormat};

/// Row for the cardinality table
#[derive(Tabled)]
struct LabelRow {
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Level")]
    level: String,
}

/// Row for the catalog table
#[derive(Tabled)]
struct CatalogRow {
    #[tabled(rename = "Metric")]
    name: String,
    #[tabled(rename = "Included")]
    included: String,
    #[tabled(rename = "Labels")]
    labels: String,
}

/// Classify a label set the way custom metric status does
pub fn run_cardinality(labels: &[String], format: OutputFormat) -> Result<()> {
    let report = classify_cardinality(labels);

    match format {
        OutputFormat::Json => {
            print_json(&serde_json::json!({
                "overall": report.overall().as_str(),
                "warning": report.overall().is_warning(),
                "labels": report.by_level
                    .iter()
                    .map(|(level, labels)| (level.as_str(), labels))
                    .collect::<std::collections::BTreeMap<_, _>>(),
            }))?;
        }
        OutputFormat::Table => {
            let rows = labels
                .iter()
                .map(|label| LabelRow {
                    label: label.clone(),
                    level: color_level(level_of(label).as_str()),
                })
                .collect();
            print_table(rows, "No labels given");

            let overall = report.overall();
            if overall.is_warning() {
                print_warning(&format!("Overall cardinality: {}", color_level(overall.as_str())));
            } else {
                print_info(&format!("Overall cardinality: {}", color_level(overall.as_str())));
            }
        }
    }

    Ok(())
}

/// List builtin metrics, marking those the collection spec includes
pub fn run_catalog(bundle: Option<&Path>, format: OutputFormat) -> Result<()> {
    let spec = match bundle {
        Some(path) => load_bundle(path)?.spec,
        None => CollectionSpec::default(),
    };

    let included: HashSet<String> = include_list(&spec).into_iter().collect();
    let definitions = builtin_definitions(&spec);

    let rows: Vec<CatalogRow> = all_builtin_names()
        .into_iter()
        .map(|name| {
            let labels = definitions
                .iter()
                .find(|d| d.metric_name == name)
                .map(|d| d.labels.join(", "))
                .unwrap_or_default();
            CatalogRow {
                included: if included.contains(&name) { "yes" } else { "no" }.to_string(),
                name,
                labels,
            }
        })
        .collect();

    match format {
        OutputFormat::Json => {
            let entries: Vec<_> = rows
                .iter()
                .map(|r| serde_json::json!({ "name": r.name, "included": r.included == "yes" }))
                .collect();
            print_json(&entries)?;
        }
        OutputFormat::Table => {
            print_table(rows, "Catalog is empty");
            println!("\nIncluded: {} of {}", definitions.len(), all_builtin_names().len());
        }
    }

    Ok(())
}
