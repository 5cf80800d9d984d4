//! Print the search-index mapping of a schema.

use anyhow::Result;
use jsonmapping::elastic::generate_schema_mapping;

use crate::config::Config;
use crate::util::{SchemaArgs, build_store, to_json};

#[derive(clap::Args)]
pub struct Args {
    /// URI of the schema to describe
    pub schema: String,
    #[command(flatten)]
    pub schemas: SchemaArgs,
    /// Pretty print JSON output
    #[arg(short, long)]
    pub pretty: bool,
}

pub fn run(args: Args, config: &Config) -> Result<()> {
    let store = build_store(config, &args.schemas)?;
    let mapping = generate_schema_mapping(store, &args.schema)?;
    println!("{}", to_json(&mapping, args.pretty)?);
    Ok(())
}
