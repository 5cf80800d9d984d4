use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

mod commands;
mod config;
mod util;

#[derive(Parser)]
#[command(name = "jsonmap", about = "Map flat data into JSON schema documents", version)]
struct Cli {
    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a jsonmap.toml (default: searched upward from the current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Map CSV rows into JSON documents (JSON Lines)
    Map(commands::map::Args),
    /// Write mapped documents back into CSV rows
    Flatten(commands::flatten::Args),
    /// Print the statements of a document as tab-separated quads
    Triplify(commands::triplify::Args),
    /// Print a search-index mapping for a schema
    EsMapping(commands::es_mapping::Args),
    /// Print the node-link network of mapped CSV rows
    Network(commands::network::Args),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Map(args) => commands::map::run(args, &config),
        Commands::Flatten(args) => commands::flatten::run(args, &config),
        Commands::Triplify(args) => commands::triplify::run(args, &config),
        Commands::EsMapping(args) => commands::es_mapping::run(args, &config),
        Commands::Network(args) => commands::network::run(args, &config),
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    if let Some(path) = path {
        return Config::load(path).with_context(|| format!("Error loading {}", path.display()));
    }
    let current_dir = std::env::current_dir().context("Failed to get current directory")?;
    match Config::load_from_dir(&current_dir)? {
        Some((path, config)) => {
            debug!("Using config {}", path.display());
            Ok(config)
        }
        None => Ok(Config::default()),
    }
}
