//! Named value transforms
//!
//! Every transform takes the leaf's mapping description, the schema node it
//! is bound to and the current list of values, and returns a new list. A
//! pipeline chains them in declaration order. Registering a transform means
//! adding it to [`TRANSFORMS`] and to the `transform` enum of the mapping
//! meta-schema.

use serde_json::Value;
use sha1::{Digest, Sha1};
use unicode_normalization::UnicodeNormalization;

use crate::description::MappingDescription;
use crate::error::MappingError;
use crate::value::text;
use crate::visitor::SchemaVisitor;

pub type TransformFn = fn(&MappingDescription, &SchemaVisitor, Vec<Value>) -> Vec<Value>;

pub const TRANSFORMS: &[(&str, TransformFn)] = &[
    ("coalesce", coalesce),
    ("slugify", slugify),
    ("clean", clean),
    ("latinize", latinize),
    ("join", join),
    ("upper", upper),
    ("lower", lower),
    ("strip", strip),
    ("hash", hash),
];

pub fn lookup(name: &str) -> Option<TransformFn> {
    TRANSFORMS
        .iter()
        .find(|(registered, _)| *registered == name)
        .map(|(_, transform)| *transform)
}

/// A resolved chain of transforms.
#[derive(Clone, Default)]
pub struct Pipeline {
    steps: Vec<TransformFn>,
}

impl Pipeline {
    pub fn new(names: &[String]) -> Result<Self, MappingError> {
        let steps = names
            .iter()
            .map(|name| lookup(name).ok_or_else(|| MappingError::UnknownTransform(name.clone())))
            .collect::<Result<_, _>>()?;
        Ok(Self { steps })
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn run(
        &self,
        mapping: &MappingDescription,
        bind: &SchemaVisitor,
        values: Vec<Value>,
    ) -> Vec<Value> {
        self.steps
            .iter()
            .fold(values, |values, step| step(mapping, bind, values))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.steps.len())
            .finish()
    }
}

/// First non-null value, or nothing.
pub fn coalesce(_: &MappingDescription, _: &SchemaVisitor, values: Vec<Value>) -> Vec<Value> {
    values.into_iter().find(|v| !v.is_null()).into_iter().collect()
}

/// URL-safe, lower-case, ASCII slugs.
pub fn slugify(_: &MappingDescription, _: &SchemaVisitor, values: Vec<Value>) -> Vec<Value> {
    map_strings(values, |s| to_slug(s, '-').map_or(Value::Null, Value::String))
}

/// Replace control and format characters with spaces and collapse whitespace.
pub fn clean(_: &MappingDescription, _: &SchemaVisitor, values: Vec<Value>) -> Vec<Value> {
    map_strings(values, |s| clean_text(s).map_or(Value::Null, Value::String))
}

/// Transliterate into the Latin alphabet.
pub fn latinize(_: &MappingDescription, _: &SchemaVisitor, values: Vec<Value>) -> Vec<Value> {
    map_strings(values, |s| Value::String(deunicode::deunicode(s)))
}

/// All non-null values as one space-separated string.
pub fn join(_: &MappingDescription, _: &SchemaVisitor, values: Vec<Value>) -> Vec<Value> {
    let parts: Vec<_> = values.iter().filter_map(text).collect();
    vec![Value::String(parts.join(" "))]
}

pub fn upper(_: &MappingDescription, _: &SchemaVisitor, values: Vec<Value>) -> Vec<Value> {
    map_strings(values, |s| Value::String(s.to_uppercase()))
}

pub fn lower(_: &MappingDescription, _: &SchemaVisitor, values: Vec<Value>) -> Vec<Value> {
    map_strings(values, |s| Value::String(s.to_lowercase()))
}

pub fn strip(_: &MappingDescription, _: &SchemaVisitor, values: Vec<Value>) -> Vec<Value> {
    map_strings(values, |s| Value::String(s.trim().to_string()))
}

/// SHA-1 hex digest of each value's text; nulls are dropped.
pub fn hash(_: &MappingDescription, _: &SchemaVisitor, values: Vec<Value>) -> Vec<Value> {
    values
        .iter()
        .filter_map(text)
        .map(|t| Value::String(format!("{:x}", Sha1::digest(t.as_bytes()))))
        .collect()
}

fn map_strings(values: Vec<Value>, f: impl Fn(&str) -> Value) -> Vec<Value> {
    values
        .into_iter()
        .map(|value| match &value {
            Value::String(s) => f(s),
            _ => value,
        })
        .collect()
}

fn to_slug(text: &str, separator: char) -> Option<String> {
    let ascii = deunicode::deunicode(text).to_lowercase();
    let mut slug = String::with_capacity(ascii.len());
    let mut gap = false;
    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            if gap && !slug.is_empty() {
                slug.push(separator);
            }
            gap = false;
            slug.push(c);
        } else {
            gap = true;
        }
    }
    (!slug.is_empty()).then_some(slug)
}

fn clean_text(text: &str) -> Option<String> {
    let replaced: String = text
        .nfc()
        .map(|c| if is_other_category(c) { ' ' } else { c })
        .collect();
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

/// Unicode general category C: control, format, private use.
fn is_other_category(c: char) -> bool {
    c.is_control()
        || matches!(
            c,
            '\u{00AD}'
                | '\u{061C}'
                | '\u{180E}'
                | '\u{200B}'..='\u{200F}'
                | '\u{202A}'..='\u{202E}'
                | '\u{2060}'..='\u{2064}'
                | '\u{2066}'..='\u{206F}'
                | '\u{FEFF}'
                | '\u{FFF9}'..='\u{FFFB}'
                | '\u{E000}'..='\u{F8FF}'
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::SchemaStore;
    use serde_json::json;
    use std::sync::Arc;

    fn run(names: &[&str], values: Vec<Value>) -> Vec<Value> {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        let bind =
            SchemaVisitor::new(&json!({"type": "string"}), Arc::new(SchemaStore::default()), None)
                .unwrap();
        Pipeline::new(&names)
            .unwrap()
            .run(&MappingDescription::default(), &bind, values)
    }

    #[test]
    fn test_coalesce() {
        assert_eq!(
            run(&["coalesce"], vec![Value::Null, json!("b"), json!("c")]),
            vec![json!("b")]
        );
        assert!(run(&["coalesce"], vec![Value::Null, Value::Null]).is_empty());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(
            run(&["slugify"], vec![json!("Héllo,  World!"), json!(3)]),
            vec![json!("hello-world"), json!(3)]
        );
        assert_eq!(run(&["slugify"], vec![json!("?!")]), vec![Value::Null]);
    }

    #[test]
    fn test_clean_preserves_case() {
        assert_eq!(
            run(&["clean"], vec![json!("  Ada\t\u{200B}Lovelace\n")]),
            vec![json!("Ada Lovelace")]
        );
    }

    #[test]
    fn test_latinize() {
        assert_eq!(
            run(&["latinize"], vec![json!("Москва"), json!("Zürich")]),
            vec![json!("Moskva"), json!("Zurich")]
        );
    }

    #[test]
    fn test_join_skips_nulls() {
        assert_eq!(
            run(&["join"], vec![json!("Ada"), Value::Null, json!("Lovelace")]),
            vec![json!("Ada Lovelace")]
        );
        assert_eq!(run(&["join"], vec![json!(1), json!(true)]), vec![json!("1 true")]);
    }

    #[test]
    fn test_string_functions_pass_non_strings() {
        assert_eq!(
            run(&["upper"], vec![json!("ada"), json!(1)]),
            vec![json!("ADA"), json!(1)]
        );
        assert_eq!(run(&["lower"], vec![json!("ADA")]), vec![json!("ada")]);
        assert_eq!(run(&["strip"], vec![json!("  ada ")]), vec![json!("ada")]);
    }

    #[test]
    fn test_hash_is_stable() {
        let a = run(&["hash"], vec![json!("hello")]);
        assert_eq!(a, vec![json!("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d")]);
        assert_eq!(a, run(&["hash"], vec![json!("hello")]));
        assert_ne!(a, run(&["hash"], vec![json!("hellp")]));
        assert!(run(&["hash"], vec![Value::Null]).is_empty());
    }

    #[test]
    fn test_pipeline_chains_in_order() {
        assert_eq!(
            run(&["coalesce", "upper"], vec![Value::Null, json!("x"), json!("y")]),
            vec![json!("X")]
        );
        assert_eq!(
            run(&["join", "slugify"], vec![json!("Ada"), json!("Lovelace")]),
            vec![json!("ada-lovelace")]
        );
    }

    #[test]
    fn test_unknown_transform() {
        let err = Pipeline::new(&["nope".to_string()]).unwrap_err();
        assert!(matches!(err, MappingError::UnknownTransform(name) if name == "nope"));
    }
}
