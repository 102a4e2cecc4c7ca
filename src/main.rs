//! CIP GIS administrative CLI
//!
//! ## Usage
//!
//! ```bash
//! # Backfill every phase's distributions, associations and scores
//! cip-gis recompute --all
//!
//! # Recompute one phase
//! cip-gis recompute --phase <phase-id>
//!
//! # Distribution and per-zone cost of a phase, as JSON
//! cip-gis report --phase <phase-id>
//!
//! # Score row, total and associations of a project, as JSON
//! cip-gis score --project <project-id>
//!
//! # Add an asset from a GeoJSON geometry file, or delete one
//! cip-gis asset add --phase <phase-id> --file hydrant.geojson --asset-type hydrant
//! cip-gis asset delete --id <asset-id>
//!
//! # Row counts
//! cip-gis stats
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cip_gis::db::CreateAssetInput;
use cip_gis::gis::ScoringPolicy;
use cip_gis::services::spawn_logging_listener;
use cip_gis::{Config, PlannerDb, Services};

#[derive(Parser, Debug)]
#[command(name = "cip-gis")]
#[command(about = "Geospatial attribution engine for capital-improvement planning")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "CIP_GIS_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// Database file, overriding storage_dir/database_file
    #[arg(long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recompute derived GIS state
    Recompute {
        /// Phase to recompute
        #[arg(long, conflicts_with = "all")]
        phase: Option<String>,

        /// Recompute every phase, one transaction each
        #[arg(long)]
        all: bool,
    },

    /// Print a phase's distribution and cost by zone
    Report {
        #[arg(long)]
        phase: String,
    },

    /// Print a project's scores
    Score {
        #[arg(long)]
        project: String,
    },

    /// Mutate assets
    #[command(subcommand)]
    Asset(AssetCommand),

    /// Print row counts
    Stats,
}

#[derive(Subcommand, Debug)]
enum AssetCommand {
    /// Add an asset from a GeoJSON file
    Add(AddAsset),

    /// Delete an asset
    Delete {
        #[arg(long)]
        id: String,
    },
}

#[derive(ClapArgs, Debug)]
struct AddAsset {
    #[arg(long)]
    phase: String,

    /// GeoJSON geometry or Feature
    #[arg(long)]
    file: PathBuf,

    #[arg(long)]
    asset_id: Option<String>,

    #[arg(long)]
    asset_type: Option<String>,

    #[arg(long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load config: explicit file, else <storage_dir>/config.toml (created with defaults)
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path).with_context(|| format!("loading {}", config_path.display()))?
    } else {
        let storage_dir = args
            .storage_dir
            .clone()
            .unwrap_or_else(cip_gis::config::default_storage_dir);
        Config::load_or_init(&storage_dir)
            .with_context(|| format!("loading config from {}", storage_dir.display()))?
    };

    // Apply CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(config.log_filter.parse()?))
        .init();

    let db_path = match args.database {
        Some(path) => path,
        None => {
            tokio::fs::create_dir_all(&config.storage_dir).await?;
            config.database_path()
        }
    };
    info!(database = %db_path.display(), max_score = config.max_score, "Starting cip-gis");

    let db = Arc::new(PlannerDb::open(&db_path)?);
    let services = Services::new(db.clone(), ScoringPolicy { max_score: config.max_score });
    let listener = spawn_logging_listener(services.events.clone());

    match args.command {
        Command::Recompute { phase: Some(phase), .. } => {
            print_json(&services.phases.recompute(&phase)?)?;
        }
        Command::Recompute { phase: None, all: true } => {
            let summary = services.phases.recompute_all()?;
            print_json(&summary)?;
            if !summary.failed.is_empty() {
                bail!("{} phase(s) failed to recompute", summary.failed.len());
            }
        }
        Command::Recompute { phase: None, all: false } => {
            bail!("pass --phase <id> or --all");
        }
        Command::Report { phase } => {
            print_json(&services.phases.report(&phase)?)?;
        }
        Command::Score { project } => {
            print_json(&services.scores.report(&project)?)?;
        }
        Command::Asset(AssetCommand::Add(add)) => {
            let text = tokio::fs::read_to_string(&add.file)
                .await
                .with_context(|| format!("reading {}", add.file.display()))?;
            let geometry: serde_json::Value = serde_json::from_str(&text)?;

            let mutation = services.assets.create(CreateAssetInput {
                phase_id: add.phase,
                geometry,
                asset_id: add.asset_id,
                asset_type: add.asset_type,
                name: add.name,
            })?;
            print_json(&mutation)?;
        }
        Command::Asset(AssetCommand::Delete { id }) => match services.assets.delete(&id)? {
            Some(outcome) => print_json(&outcome)?,
            None => bail!("asset {} not found", id),
        },
        Command::Stats => {
            print_json(&db.stats()?)?;
        }
    }

    // let the listener drain before exit
    drop(services);
    let _ = listener.await;

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
