//! Print the statements of a document as tab-separated quads.

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use jsonmapping::SchemaVisitor;
use serde_json::{Value, json};

use crate::config::Config;
use crate::util::{SchemaArgs, build_store, read_json};

#[derive(clap::Args)]
pub struct Args {
    /// URI of the document's schema
    pub schema: String,
    /// Path to a JSON document or an array of documents (use - for stdin)
    pub document: PathBuf,
    #[command(flatten)]
    pub schemas: SchemaArgs,
}

pub fn run(args: Args, config: &Config) -> Result<()> {
    let store = build_store(config, &args.schemas)?;
    let visitor = SchemaVisitor::new(&json!({"$ref": args.schema}), store, None)?;
    let document = read_json(&args.document)?;
    let documents = match &document {
        Value::Array(documents) => documents.as_slice(),
        other => std::slice::from_ref(other),
    };

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(io::stdout().lock());
    for document in documents {
        for statement in visitor.triplify(document, None) {
            writer.serialize(statement?)?;
        }
    }
    writer.flush()?;
    Ok(())
}
