//! Flat source records
//!
//! A record maps column names to values. Missing columns read as `None`
//! and flow into the same emptiness handling as explicit nulls.

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use indexmap::IndexMap;
use serde_json::{Map, Value};

pub trait Record {
    fn column(&self, name: &str) -> Option<Value>;
}

impl Record for Map<String, Value> {
    fn column(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl Record for Value {
    fn column(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl<S: BuildHasher> Record for HashMap<String, String, S> {
    fn column(&self, name: &str) -> Option<Value> {
        self.get(name).cloned().map(Value::String)
    }
}

impl<S: BuildHasher> Record for IndexMap<String, String, S> {
    fn column(&self, name: &str) -> Option<Value> {
        self.get(name).cloned().map(Value::String)
    }
}

impl Record for BTreeMap<String, String> {
    fn column(&self, name: &str) -> Option<Value> {
        self.get(name).cloned().map(Value::String)
    }
}
