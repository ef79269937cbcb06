mod settings;

use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use opportunity_core::{Error, config::AnalysisConfig, pipeline, store::LayerStore};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "opportunity")]
#[command(about = "Ward accessibility and Urban Opportunity Index pipeline")]
struct Cli {
    /// TOML analysis configuration; defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding the layer store
    #[arg(long, global = true, default_value = "data/processed")]
    store: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Project raw ward boundaries and facility CSVs into the store
    BuildLayers {
        #[arg(long)]
        raw_dir: PathBuf,
    },
    /// Check the stored ward count against the configuration
    CheckWards,
    /// Build the drivable road network from OSM data
    FetchNetwork {
        /// Saved Overpass JSON to use instead of downloading
        #[arg(long)]
        input: Option<PathBuf>,
        /// Ignore the cached Overpass response
        #[arg(long)]
        refresh: bool,
    },
    /// Add drive and walk times to the road network
    Enrich,
    /// Travel minutes from each ward to the nearest facility per category
    Accessibility {
        /// Measure every category by network distance at flat speeds
        #[arg(long)]
        distance: bool,
    },
    /// Composite opportunity score and rank per ward
    Index,
    /// Global and local spatial autocorrelation of the score
    Spatial,
    /// Run every stage in order
    Run {
        #[arg(long)]
        raw_dir: PathBuf,
        /// Saved Overpass JSON to use instead of downloading
        #[arg(long)]
        network: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    let mut config: AnalysisConfig = settings::load_config(cli.config.as_deref())?;
    let store = LayerStore::open(&cli.store)?;
    info!("Using layer store at {}", store.root().display());

    match cli.command {
        Command::BuildLayers { raw_dir } => {
            let count = pipeline::build_layers(&store, &config, &raw_dir)?;
            info!("Built layers for {count} wards");
        }
        Command::CheckWards => {
            let count = pipeline::check_wards(&store, &config)?;
            info!("Ward count OK ({count})");
        }
        Command::FetchNetwork { input, refresh } => {
            let network = pipeline::fetch_network(&store, &config, input.as_deref(), refresh)?;
            info!(
                "Road network ready: {} nodes, {} edges",
                network.node_count(),
                network.edge_count()
            );
        }
        Command::Enrich => {
            pipeline::enrich(&store, &config)?;
        }
        Command::Accessibility { distance } => {
            if distance {
                config.access = config.access.distance_only();
            }
            let rows = pipeline::accessibility(&store, &config)?;
            let unreachable = rows
                .iter()
                .filter(|row| {
                    row.time_hospital_min.is_none()
                        || row.time_school_min.is_none()
                        || row.time_transport_min.is_none()
                })
                .count();
            info!(
                "Accessibility computed for {} wards ({unreachable} with an unreachable category)",
                rows.len()
            );
        }
        Command::Index => {
            let index = pipeline::index(&store, &config)?;
            info!(
                "Index built; first component explains {:.1}% of variance",
                index.explained_variance_ratio * 100.0
            );
        }
        Command::Spatial => {
            let summary = pipeline::spatial(&store, &config)?;
            info!(
                "Moran's I = {:.3}, p = {:.4}, {} significant wards",
                summary.global.i, summary.global.p_sim, summary.significant_wards
            );
        }
        Command::Run { raw_dir, network } => {
            let summary = pipeline::run_all(&store, &config, &raw_dir, network.as_deref())?;
            info!(
                "Pipeline finished: Moran's I = {:.3} (p = {:.4})",
                summary.global.i, summary.global.p_sim
            );
        }
    }
    Ok(())
}
