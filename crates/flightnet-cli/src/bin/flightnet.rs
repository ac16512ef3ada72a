//! Link, label and export flight networks from JSON files.
//!
//! Usage:
//!   flightnet labels --network network.json
//!   flightnet export --network network.json --buildings buildings.json --flat-elevation 0

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use flightnet_cli::{link_summary, write_json, ProjectFiles};
use flightnet_core::{ElevationProvider, FlatTerrain, NetworkMeta};
use flightnet_gcs::{ElevationClient, ElevationConfig, GcsClient, DEFAULT_ELEVATION_URL};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Offline flight network tools
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Link buildings to the network and resolve link altitudes
    Link {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        elevation: ElevationArgs,
        /// Write the linked buildings here
        #[arg(long)]
        buildings_out: Option<PathBuf>,
    },
    /// Print the distance from every point to the nearest semaphore
    Labels {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Build the flight network artifact
    Export {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        elevation: ElevationArgs,
        /// Output file
        #[arg(long, short, default_value = "flight-network.json")]
        output: PathBuf,
        /// GCS network id (0 for a network not uploaded yet)
        #[arg(long, default_value_t = 0)]
        network_id: u64,
        /// Network name (defaults to the snapshot id)
        #[arg(long)]
        name: Option<String>,
        /// Validate the exported network against this GCS
        #[arg(long)]
        gcs_url: Option<String>,
        #[arg(long, env = "GCS_TOKEN")]
        gcs_token: Option<String>,
    },
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Network snapshot JSON
    #[arg(long)]
    network: PathBuf,
    /// Buildings JSON
    #[arg(long)]
    buildings: Option<PathBuf>,
    /// Project settings JSON
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl InputArgs {
    fn load(&self) -> Result<ProjectFiles> {
        ProjectFiles::load(&self.network, self.buildings.as_deref(), self.settings.as_deref())
    }
}

#[derive(Args, Debug)]
struct ElevationArgs {
    /// Elevation provider URL
    #[arg(long, default_value = DEFAULT_ELEVATION_URL)]
    elevation_url: String,
    /// Answer elevation queries with this constant instead of the provider
    #[arg(long)]
    flat_elevation: Option<f64>,
    #[arg(long, default_value_t = 100)]
    max_points_per_request: usize,
}

impl ElevationArgs {
    fn config(&self) -> ElevationConfig {
        ElevationConfig {
            provider_url: self.elevation_url.clone(),
            max_points_per_request: self.max_points_per_request,
            ..ElevationConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("flightnet_cli=info".parse()?))
        .init();

    let cli = Cli::parse();
    let elevation = match &cli.command {
        Command::Labels { input } => {
            let project = input.load()?;
            for row in project.label_rows() {
                println!("{}", row);
            }
            return Ok(());
        }
        Command::Link { elevation, .. } | Command::Export { elevation, .. } => elevation,
    };

    match elevation.flat_elevation {
        Some(elevation_m) => run(&cli.command, &FlatTerrain::new(elevation_m)).await,
        None => run(&cli.command, &ElevationClient::new(elevation.config())?).await,
    }
}

async fn run<P: ElevationProvider>(command: &Command, provider: &P) -> Result<()> {
    match command {
        Command::Link {
            input,
            buildings_out,
            ..
        } => {
            let mut project = input.load()?;
            let pass = project.link(provider).await?;
            for line in link_summary(&pass) {
                println!("{}", line);
            }
            if let Some(path) = buildings_out {
                write_json(path, &project.buildings)?;
                println!("Wrote linked buildings to {}", path.display());
            }
        }
        Command::Export {
            input,
            output,
            network_id,
            name,
            gcs_url,
            gcs_token,
            ..
        } => {
            let mut project = input.load()?;
            let meta = NetworkMeta {
                id: *network_id,
                name: name.clone().unwrap_or_else(|| project.network_id.clone()),
            };
            let export = project.export(provider, &meta).await?;
            write_json(output, &export.network)?;
            println!(
                "Wrote {} nodes and {} edges to {}",
                export.network.nodes.len(),
                export.network.edges.len(),
                output.display()
            );

            if let Some(url) = gcs_url {
                let gcs = GcsClient::new(url.as_str(), gcs_token.clone())?;
                let errors = gcs.validate_network(&export.network).await?;
                if errors.is_empty() {
                    println!("Network is valid");
                }
                for resolved in export.index.resolve(&errors) {
                    let nodes: Vec<String> = resolved.nodes.iter().map(|n| n.name.clone()).collect();
                    println!("INVALID: {} [{}]", resolved.message, nodes.join(", "));
                }
            }
        }
        Command::Labels { .. } => {}
    }
    Ok(())
}
