//! Leaf value extraction and type coercion
//!
//! Extraction reads the source columns of a leaf mapping, runs the transform
//! pipeline, applies the optional `format` template, falls back to defaults
//! on empty values and finally coerces the result to the schema's type.
//! Coercion is permissive: a value that cannot be converted is kept as-is.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde_json::{Number, Value};
use tracing::debug;

use crate::description::MappingDescription;
use crate::error::CoercionError;
use crate::record::Record;
use crate::transforms::Pipeline;
use crate::visitor::SchemaVisitor;

/// Coercion targets, in the order they are preferred.
const TYPE_PRIORITY: [&str; 7] = [
    "date-time",
    "date",
    "decimal",
    "integer",
    "boolean",
    "number",
    "string",
];

const DATE_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Read, transform and coerce the value of a leaf mapping.
///
/// Returns whether the extracted value was empty, and the final value
/// (which may be a default when it was).
pub fn extract_value(
    mapping: &MappingDescription,
    pipeline: &Pipeline,
    bind: &SchemaVisitor,
    row: &dyn Record,
) -> (bool, Value) {
    let values: Vec<Value> = mapping
        .source_columns()
        .into_iter()
        .map(|column| row.column(column).unwrap_or(Value::Null))
        .collect();
    let values = pipeline.run(mapping, bind, values);

    let mut value = match mapping.format.as_deref().filter(|f| !f.trim().is_empty()) {
        Some(template) => Value::String(apply_format(template, &values)),
        None => values.into_iter().next().unwrap_or(Value::Null),
    };

    let empty = is_empty(&value);
    if empty {
        value = mapping
            .default
            .clone()
            .filter(|v| !v.is_null())
            .or_else(|| bind.default_value().cloned())
            .unwrap_or(Value::Null);
    }
    (empty, convert_value(bind, value))
}

/// `None`, or text without any non-whitespace content.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// The coercion target for a schema node: its `format` or one of its types.
pub fn get_type(bind: &SchemaVisitor) -> &'static str {
    let format = bind.format();
    TYPE_PRIORITY
        .into_iter()
        .find(|candidate| {
            format == Some(*candidate) || bind.types().iter().any(|t| t == *candidate)
        })
        .unwrap_or("string")
}

/// Coerce `value` to the schema's type, keeping it unchanged on failure.
pub fn convert_value(bind: &SchemaVisitor, value: Value) -> Value {
    let type_name = get_type(bind);
    match coerce(type_name, &value) {
        Ok(converted) => converted,
        Err(e) => {
            debug!("Keeping untyped value at {:?}: {}", bind.path(), e);
            value
        }
    }
}

/// Convert `value` to the JSON representation of `type_name`.
pub fn coerce(type_name: &'static str, value: &Value) -> Result<Value, CoercionError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let fail = || CoercionError {
        type_name,
        value: value.to_string(),
    };
    let trimmed = value.as_str().map(str::trim);

    match type_name {
        "string" => text(value).map(Value::String).ok_or_else(fail),
        "integer" => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::Number(n) => n
                .as_f64()
                .and_then(integral)
                .map(Value::from)
                .ok_or_else(fail),
            Value::String(_) => {
                let s = trimmed.unwrap_or_default();
                if let Ok(i) = s.parse::<i64>() {
                    return Ok(Value::from(i));
                }
                if let Ok(u) = s.parse::<u64>() {
                    return Ok(Value::from(u));
                }
                s.parse::<f64>()
                    .ok()
                    .and_then(integral)
                    .map(Value::from)
                    .ok_or_else(fail)
            }
            _ => Err(fail()),
        },
        "number" => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(_) => trimmed
                .unwrap_or_default()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(fail),
            _ => Err(fail()),
        },
        "decimal" => {
            let source = match value {
                Value::Number(n) => n.to_string(),
                Value::String(_) => trimmed.unwrap_or_default().to_string(),
                _ => return Err(fail()),
            };
            let decimal = Decimal::from_str(&source)
                .or_else(|_| Decimal::from_scientific(&source))
                .map_err(|_| fail())?;
            // Digits a JSON number cannot hold exactly fail the coercion.
            let decimal = decimal.normalize();
            let number = Number::from_str(&decimal.to_string()).map_err(|_| fail())?;
            let written = number.to_string();
            let exact = Decimal::from_str(&written)
                .or_else(|_| Decimal::from_scientific(&written))
                .is_ok_and(|round_trip| round_trip == decimal);
            if exact {
                Ok(Value::Number(number))
            } else {
                Err(fail())
            }
        }
        "boolean" => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Ok(Value::Bool(false)),
                Some(1) => Ok(Value::Bool(true)),
                _ => Err(fail()),
            },
            Value::String(_) => match trimmed.unwrap_or_default().to_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" | "on" => Ok(Value::Bool(true)),
                "false" | "f" | "no" | "n" | "0" | "off" => Ok(Value::Bool(false)),
                _ => Err(fail()),
            },
            _ => Err(fail()),
        },
        "date" => {
            let s = trimmed.ok_or_else(fail)?;
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .or_else(|| parse_date_time(s).map(|dt| dt.date()))
                .ok_or_else(fail)?;
            Ok(Value::String(date.format("%Y-%m-%d").to_string()))
        }
        "date-time" => {
            let s = trimmed.ok_or_else(fail)?;
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(Value::String(dt.to_rfc3339()));
            }
            parse_date_time(s)
                .map(|dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
                .ok_or_else(fail)
        }
        _ => Err(fail()),
    }
}

/// `f` as an `i64`, if it is a whole number inside the `i64` range.
fn integral(f: f64) -> Option<i64> {
    // `i64::MAX as f64` rounds up to 2^63, which is already out of range.
    (f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64)
        .then_some(f as i64)
}

fn parse_date_time(s: &str) -> Option<NaiveDateTime> {
    DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Textual form of a value; `None` for null.
pub fn text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Name of the dynamic type of a scalar, as used in statement contexts.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Column name and textual value of a leaf, for writing back to a flat record.
pub fn flatten_value(
    mapping: &MappingDescription,
    bind: &SchemaVisitor,
    value: &Value,
) -> Option<(String, String)> {
    let column = mapping.dump_column()?;
    let value = match coerce(get_type(bind), value) {
        Ok(typed) => text(&typed),
        Err(_) => text(value),
    };
    Some((column.to_string(), value.unwrap_or_default()))
}

/// Fill `%s` placeholders with `values` in order; missing values render empty.
pub fn apply_format(template: &str, values: &[Value]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut values = values.iter();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some('s' | 'd' | 'i' | 'f' | 'r') => {
                chars.next();
                if let Some(value) = values.next().and_then(text) {
                    out.push_str(&value);
                }
            }
            _ => out.push('%'),
        }
    }
    out
}
