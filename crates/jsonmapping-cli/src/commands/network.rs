//! Print the node-link network of mapped CSV rows.

use std::path::PathBuf;

use anyhow::Result;
use jsonmapping::Network;

use crate::config::Config;
use crate::util::{SchemaArgs, build_store, map_file, to_json};

#[derive(clap::Args)]
pub struct Args {
    /// Path to the mapping description
    pub mapping: PathBuf,
    /// Path to the CSV file to map (use - for stdin)
    pub rows: PathBuf,
    #[command(flatten)]
    pub schemas: SchemaArgs,
    /// Pretty print JSON output
    #[arg(short, long)]
    pub pretty: bool,
}

pub fn run(args: Args, config: &Config) -> Result<()> {
    let store = build_store(config, &args.schemas)?;
    let documents = map_file(&args.mapping, &args.rows, &store)?;

    let mut network = Network::new(store);
    for document in &documents {
        network.add(document, None)?;
    }
    println!("{}", to_json(&network.to_node_link(), args.pretty)?);
    Ok(())
}
