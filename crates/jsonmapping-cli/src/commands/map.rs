//! Map CSV rows into JSON documents, one per output line.

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Result;
use jsonmapping::{DocumentValidator, SchemaValidator};
use rayon::prelude::*;
use tracing::warn;

use crate::config::Config;
use crate::util::{SchemaArgs, build_store, load_mapper, read_rows, to_json};

#[derive(clap::Args)]
pub struct Args {
    /// Path to the mapping description
    pub mapping: PathBuf,
    /// Path to the CSV file to map (use - for stdin)
    pub rows: PathBuf,
    #[command(flatten)]
    pub schemas: SchemaArgs,
    /// Validate each document and wrap it with its errors
    #[arg(long)]
    pub validate: bool,
    /// Pretty print JSON output
    #[arg(short, long)]
    pub pretty: bool,
}

pub fn run(args: Args, config: &Config) -> Result<()> {
    let store = build_store(config, &args.schemas)?;
    let mapper = load_mapper(&args.mapping, &store)?;
    let rows = read_rows(&args.rows)?;

    let validator = if args.validate || config.validate {
        Some(SchemaValidator::for_mapper(&mapper, &store)?)
    } else {
        None
    };
    let validator = validator.as_ref().map(|v| v as &dyn DocumentValidator);

    let results: Vec<_> = rows
        .par_iter()
        .map(|row| mapper.map_row(row, validator))
        .collect();

    let mut out = BufWriter::new(io::stdout().lock());
    let mut invalid = 0;
    for result in results {
        let document = if validator.is_some() {
            if !result.errors.is_empty() {
                invalid += 1;
            }
            serde_json::to_value(&result)?
        } else {
            result.data
        };
        writeln!(out, "{}", to_json(&document, args.pretty)?)?;
    }
    out.flush()?;

    if invalid > 0 {
        warn!("{} of {} documents failed validation", invalid, rows.len());
    }
    Ok(())
}
