use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use jsonmapping::{Mapper, SchemaStore};
use rayon::prelude::*;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::Config;

/// Schema directories shared by every command.
#[derive(clap::Args, Clone, Default)]
pub struct SchemaArgs {
    /// Directory of JSON schemas to preload (repeatable)
    #[arg(short, long = "schemas", value_name = "DIR")]
    pub schema_dirs: Vec<PathBuf>,
}

/// Open a file, or stdin for `-`.
pub fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    if path == Path::new("-") {
        Ok(Box::new(io::stdin()))
    } else {
        let file = File::open(path).with_context(|| format!("Error reading {}", path.display()))?;
        Ok(Box::new(file))
    }
}

pub fn read_json(path: &Path) -> Result<Value> {
    let mut text = String::new();
    open_input(path)?.read_to_string(&mut text)?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Read one JSON document per non-blank line.
pub fn read_json_lines(path: &Path) -> Result<Vec<Value>> {
    let reader = BufReader::new(open_input(path)?);
    let mut documents = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let document = serde_json::from_str(&line)
            .with_context(|| format!("Invalid JSON on line {} of {}", index + 1, path.display()))?;
        documents.push(document);
    }
    Ok(documents)
}

/// Read CSV rows keyed by header.
pub fn read_rows(path: &Path) -> Result<Vec<HashMap<String, String>>> {
    let mut reader = csv::Reader::from_reader(open_input(path)?);
    let rows = reader
        .deserialize()
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Error reading CSV from {}", path.display()))?;
    debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Schema store filled from the config and the command-line directories.
pub fn build_store(config: &Config, schemas: &SchemaArgs) -> Result<Arc<SchemaStore>> {
    let store = SchemaStore::new(config.base_uri.as_deref());
    for dir in config.schema_dirs.iter().chain(&schemas.schema_dirs) {
        let loaded = store
            .load_dir(dir)
            .with_context(|| format!("Error loading schemas from {}", dir.display()))?;
        debug!("Loaded {} schemas from {}", loaded.len(), dir.display());
    }
    Ok(Arc::new(store))
}

/// Build a mapper from a mapping file.
///
/// The mapping is registered under its own file URI so that `$ref`s inside
/// it resolve relative to its location.
pub fn load_mapper(path: &Path, store: &Arc<SchemaStore>) -> Result<Mapper> {
    let mapping = read_json(path)?;
    let scope = file_uri(path);
    if let Some(scope) = &scope {
        store.insert(scope, mapping.clone());
    }
    Mapper::new(&mapping, store.clone(), scope.as_deref())
        .with_context(|| format!("Invalid mapping {}", path.display()))
}

fn file_uri(path: &Path) -> Option<String> {
    let absolute = fs::canonicalize(path).ok()?;
    Url::from_file_path(absolute).ok().map(String::from)
}

/// Map every row of a CSV file without validation, preserving row order.
pub fn map_file(mapping: &Path, rows: &Path, store: &Arc<SchemaStore>) -> Result<Vec<Value>> {
    let mapper = load_mapper(mapping, store)?;
    let rows = read_rows(rows)?;
    Ok(rows.par_iter().map(|row| mapper.apply(row).1).collect())
}

pub fn to_json(value: &Value, pretty: bool) -> Result<String> {
    Ok(if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    })
}
