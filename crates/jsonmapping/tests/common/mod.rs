#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use jsonmapping::{Mapper, SchemaStore};
use serde_json::Value;

pub const PERSON: &str = "https://schemas.jsonmapping.dev/popolo/person.json#";

pub fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(path)
}

pub fn store() -> Arc<SchemaStore> {
    let store = SchemaStore::new(None);
    store
        .load_dir(&fixture("schemas"))
        .expect("Failed to load fixture schemas");
    Arc::new(store)
}

pub fn mapping() -> Value {
    let text = std::fs::read_to_string(fixture("mapping.json")).expect("Failed to read mapping");
    serde_json::from_str(&text).expect("Invalid mapping JSON")
}

pub fn mapper(store: &Arc<SchemaStore>) -> Mapper {
    Mapper::new(&mapping(), store.clone(), None).expect("Failed to build mapper")
}

pub fn rows() -> Vec<IndexMap<String, String>> {
    let mut reader = csv::Reader::from_path(fixture("people.csv")).expect("Failed to open CSV");
    reader
        .deserialize()
        .collect::<Result<_, _>>()
        .expect("Failed to read CSV rows")
}

pub fn documents(store: &Arc<SchemaStore>) -> Vec<Value> {
    let mapper = mapper(store);
    rows().iter().map(|row| mapper.apply(row).1).collect()
}
