//! Execution Fingerprints
//!
//! Binds a rendered command and its parameter map to a reproducible
//! SHA-256 fingerprint. The canonical encoding sorts keys at every level,
//! drops all insignificant whitespace and escapes non-ASCII text as
//! `\uXXXX`, so fingerprints agree with the pipeline tooling that writes
//! the same ledger.

pub mod lifecycle;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::ProvenanceError;

/// Parameter map carried alongside a command.
pub type ProvenanceParams = Map<String, Value>;

/// A command, its parameters and the fingerprint binding them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub execution_hash: String,
    pub command: String,
    pub params: ProvenanceParams,
}

pub fn make_provenance_record(command: &str, params: ProvenanceParams) -> ProvenanceRecord {
    ProvenanceRecord {
        execution_hash: compute_execution_hash(command, &params),
        command: command.to_string(),
        params,
    }
}

/// Compute the execution hash of `command` under `params`.
///
/// Equivalent maps hash identically regardless of insertion order.
pub fn compute_execution_hash(command: &str, params: &ProvenanceParams) -> String {
    let mut canonical = String::with_capacity(64 + command.len());
    canonical.push_str("{\"command\":");
    write_string(command, &mut canonical);
    canonical.push_str(",\"params\":");
    write_object(params, &mut canonical);
    canonical.push('}');

    sha256_hex(canonical.as_bytes())
}

/// Hash any serializable parameter type.
///
/// # Errors
///
/// `SerializationError` when `params` does not serialize to a JSON object.
pub fn compute_execution_hash_for<T: Serialize>(
    command: &str,
    params: &T,
) -> Result<String, ProvenanceError> {
    let params = to_params(params)?;
    Ok(compute_execution_hash(command, &params))
}

/// Convert a serializable value into a parameter map.
pub fn to_params<T: Serialize>(params: &T) -> Result<ProvenanceParams, ProvenanceError> {
    match serde_json::to_value(params)? {
        Value::Object(map) => Ok(map),
        other => Err(ProvenanceError::SerializationError(format!(
            "parameters must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Parse a JSON document that must hold a parameter object.
pub fn parse_params(text: &str) -> Result<ProvenanceParams, ProvenanceError> {
    let value: Value = serde_json::from_str(text)?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ProvenanceError::SerializationError(format!(
            "parameters must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Render `value` in canonical form.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(number) => match number.as_f64() {
            Some(float) if number.is_f64() => out.push_str(&float_repr(float)),
            _ => out.push_str(&number.to_string()),
        },
        Value::String(text) => write_string(text, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => write_object(map, out),
    }
}

/// Shortest round-trip float text in the layout of Python's `repr`:
/// positional for decimal exponents in `-5..=15`, otherwise `d.ddde±XX`,
/// and `.0` on integral values.
fn float_repr(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let scientific = format!("{:e}", value.abs());
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let exponent: i32 = exponent.parse().unwrap_or(0);
    // Position of the decimal point relative to the first digit.
    let point = exponent + 1;

    let mut out = String::with_capacity(digits.len() + 8);
    if value.is_sign_negative() {
        out.push('-');
    }

    if point <= -4 || point > 16 {
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        let sign = if exponent < 0 { '-' } else { '+' };
        out.push_str(&format!("e{}{:02}", sign, exponent.unsigned_abs()));
    } else if point <= 0 {
        out.push_str("0.");
        out.push_str(&"0".repeat(point.unsigned_abs() as usize));
        out.push_str(&digits);
    } else if (point as usize) < digits.len() {
        out.push_str(&digits[..point as usize]);
        out.push('.');
        out.push_str(&digits[point as usize..]);
    } else {
        out.push_str(&digits);
        out.push_str(&"0".repeat(point as usize - digits.len()));
        out.push_str(".0");
    }
    out
}

fn write_object(map: &Map<String, Value>, out: &mut String) {
    // Byte order of UTF-8 strings is code point order.
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(key, out);
        out.push(':');
        write_value(&map[key.as_str()], out);
    }
    out.push('}');
}

fn write_string(text: &str, out: &mut String) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            ' '..='~' => out.push(ch),
            _ => {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
        }
    }
    out.push('"');
}
