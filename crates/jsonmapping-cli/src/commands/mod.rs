pub mod es_mapping;
pub mod flatten;
pub mod map;
pub mod network;
pub mod triplify;
