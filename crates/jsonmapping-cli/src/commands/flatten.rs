//! Write mapped documents back into CSV rows.

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use indexmap::IndexSet;

use crate::config::Config;
use crate::util::{SchemaArgs, build_store, load_mapper, read_json_lines};

#[derive(clap::Args)]
pub struct Args {
    /// Path to the mapping description the documents were produced with
    pub mapping: PathBuf,
    /// Path to the documents, one JSON object per line (use - for stdin)
    pub documents: PathBuf,
    #[command(flatten)]
    pub schemas: SchemaArgs,
}

pub fn run(args: Args, config: &Config) -> Result<()> {
    let store = build_store(config, &args.schemas)?;
    let mapper = load_mapper(&args.mapping, &store)?;
    let rows: Vec<_> = read_json_lines(&args.documents)?
        .iter()
        .map(|document| mapper.flatten(document))
        .collect();

    // Columns in order of first appearance.
    let columns: IndexSet<&str> = rows
        .iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .collect();

    let mut writer = csv::Writer::from_writer(io::stdout().lock());
    writer.write_record(&columns)?;
    for row in &rows {
        writer.write_record(
            columns
                .iter()
                .map(|column| row.get(*column).map_or("", String::as_str)),
        )?;
    }
    writer.flush()?;
    Ok(())
}
