//! Flow pipeline CLI
//!
//! Compiles build bundles into flowlogs-pipeline configs and inspects the
//! metric catalog and label cardinality.

mod commands;
mod config;
mod output;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use commands::{build, inspect};
use pipeline_lib::Topology;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Flow pipeline compiler
#[derive(Parser)]
#[command(name = "flowpipe")]
#[command(author, version, about = "Compile flow collection specs into flowlogs-pipeline configs", long_about = None)]
pub struct Cli {
    /// Output format (defaults to the configured format, then table)
    #[arg(long, short, global = true)]
    pub format: Option<output::OutputFormat>,

    /// Settings file (defaults to ~/.config/flowpipe/config.json)
    #[arg(long, env = "FLOWPIPE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Print the compiler's Prometheus metrics after the command
    #[arg(long, global = true)]
    pub print_metrics: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Which deployment shapes to build
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TopologyArg {
    Direct,
    Transformer,
    Both,
}

impl TopologyArg {
    fn topologies(self) -> Vec<Topology> {
        match self {
            Self::Direct => vec![Topology::Direct],
            Self::Transformer => vec![Topology::Transformer],
            Self::Both => vec![Topology::Direct, Topology::Transformer],
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a bundle into static and dynamic pipeline documents
    Build {
        /// Bundle file
        bundle: PathBuf,

        /// Topology to build
        #[arg(long, short)]
        topology: Option<TopologyArg>,

        /// Directory receiving the static, dynamic and digest files
        #[arg(long, short)]
        out_dir: Option<PathBuf>,
    },

    /// Check that a bundle compiles
    Validate {
        /// Bundle file
        bundle: PathBuf,

        /// Topology to build
        #[arg(long, short)]
        topology: Option<TopologyArg>,
    },

    /// Classify metric labels by cardinality risk
    Cardinality {
        /// Flow field names used as labels
        #[arg(required = true)]
        labels: Vec<String>,
    },

    /// List builtin metrics and whether a spec includes them
    Catalog {
        /// Bundle whose spec decides inclusion (defaults apply otherwise)
        #[arg(long, short)]
        bundle: Option<PathBuf>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = config::Settings::load(cli.config.as_deref())?;

    init_tracing(cli.json_logs || settings.json_logs);

    let format = match (cli.format, settings.default_format.as_deref()) {
        (Some(format), _) => format,
        (None, Some(name)) => output::OutputFormat::parse(name)
            .ok_or_else(|| anyhow!("unknown output format '{}' in settings", name))?,
        (None, None) => output::OutputFormat::default(),
    };

    let default_topology = match settings.default_topology.as_deref() {
        Some(name) => TopologyArg::from_str(name, true)
            .map_err(|e| anyhow!("invalid default topology in settings: {}", e))?,
        None => TopologyArg::Direct,
    };
    tracing::debug!(format = ?format, topology = ?default_topology, "Settings resolved");

    match cli.command {
        Commands::Build {
            bundle,
            topology,
            out_dir,
        } => {
            let topologies = topology.unwrap_or(default_topology).topologies();
            build::run_build(&bundle, &topologies, out_dir.as_deref(), format)?;
        }
        Commands::Validate { bundle, topology } => {
            let topologies = topology.unwrap_or(default_topology).topologies();
            build::run_validate(&bundle, &topologies, format)?;
        }
        Commands::Cardinality { labels } => {
            inspect::run_cardinality(&labels, format)?;
        }
        Commands::Catalog { bundle } => {
            inspect::run_catalog(bundle.as_deref(), format)?;
        }
    }

    if cli.print_metrics {
        pipeline_lib::CompilerMetrics::new();
        print!("{}", pipeline_lib::observability::gather_text()?);
    }

    Ok(())
}
