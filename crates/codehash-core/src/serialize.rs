//! Canonical value serializer
//!
//! Renders a value into text that is identical for equal values and never
//! depends on insertion order or memory addresses. Scalars, lists, tuples
//! and dicts are structurally transparent. Everything else is opaque and
//! must be identified by its own [`HashIdentity`](crate::HashIdentity)
//! capability or by the caller's hook.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Write;

use crate::error::HashingError;
use crate::model::{HashHook, HashId, Value};

/// Render `value` as canonical text.
pub fn canonical_repr(value: &Value, hook: Option<&HashHook>) -> Result<String, HashingError> {
    let mut out = String::new();
    write_value(&mut out, value, hook)?;
    Ok(out)
}

/// Canonical text of the record `{"ast_code": shape, "globals": tokens}`.
///
/// Produces exactly what [`canonical_repr`] renders for the equivalent dict;
/// string-only records cannot fail.
pub fn canonical_record(code_shape: &str, dependencies: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    let _ = write!(out, "{{\"ast_code\": {code_shape:?}, \"globals\": {{");
    for (i, (name, token)) in dependencies.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{name:?}: {token:?}");
    }
    out.push_str("}}");
    out
}

fn write_value(out: &mut String, value: &Value, hook: Option<&HashHook>) -> Result<(), HashingError> {
    match value {
        Value::None => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Int(i) => {
            let _ = write!(out, "{i}");
        }
        Value::Float(x) => {
            let _ = write!(out, "{x:?}");
        }
        Value::Str(s) => {
            let _ = write!(out, "{s:?}");
        }
        Value::Bytes(b) => {
            let _ = write!(out, "b\"{}\"", b.escape_ascii());
        }
        Value::List(items) => {
            out.push('[');
            write_items(out, items, hook)?;
            out.push(']');
        }
        Value::Tuple(items) => {
            out.push('(');
            write_items(out, items, hook)?;
            if items.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        Value::Dict(pairs) => {
            out.push('{');
            for (i, (key, item)) in sorted_entries(pairs)?.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, key, hook)?;
                out.push_str(": ");
                write_value(out, item, hook)?;
            }
            out.push('}');
        }
        Value::Module(_) | Value::Class(_) | Value::Function(_) | Value::Object(_) => {
            let token = opaque_token(value, hook)?;
            let _ = write!(out, "Hashed({:?})", token.as_str());
        }
    }
    Ok(())
}

fn write_items(out: &mut String, items: &[Value], hook: Option<&HashHook>) -> Result<(), HashingError> {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_value(out, item, hook)?;
    }
    Ok(())
}

/// Self-describing capability first, then the hook.
fn opaque_token(value: &Value, hook: Option<&HashHook>) -> Result<HashId, HashingError> {
    if let Value::Object(obj) = value {
        if let Some(describer) = obj.hash_identity() {
            return Ok(describer.identity());
        }
    }
    hook.and_then(|hook| hook(value))
        .ok_or_else(|| HashingError::UnknownObject(value.repr()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyClass {
    Numeric,
    Text,
    Bytes,
    Tuple,
}

fn key_class(key: &Value) -> Option<KeyClass> {
    match key {
        Value::Bool(_) | Value::Int(_) | Value::Float(_) => Some(KeyClass::Numeric),
        Value::Str(_) => Some(KeyClass::Text),
        Value::Bytes(_) => Some(KeyClass::Bytes),
        Value::Tuple(_) => Some(KeyClass::Tuple),
        _ => None,
    }
}

fn sorted_entries(pairs: &[(Value, Value)]) -> Result<Vec<&(Value, Value)>, HashingError> {
    let mut entries: Vec<&(Value, Value)> = pairs.iter().collect();
    if entries.len() < 2 {
        return Ok(entries);
    }

    let first = key_class(&entries[0].0);
    let comparable = first.is_some() && entries.iter().all(|(key, _)| key_class(key) == first);
    if !comparable {
        let keys: Vec<String> = entries.iter().map(|(key, _)| key.repr()).collect();
        return Err(HashingError::IncomparableKeys(keys.join(", ")));
    }

    entries.sort_by(|(a, _), (b, _)| compare_keys(a, b));
    Ok(entries)
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::None => 0,
        Value::Bool(_) => 1,
        Value::Int(_) => 2,
        Value::Float(_) => 3,
        Value::Str(_) => 4,
        Value::Bytes(_) => 5,
        Value::Tuple(_) => 6,
        _ => 7,
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Int(i) => Some(*i),
        _ => None,
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Float(x) => Some(*x),
        other => as_int(other).map(|i| i as f64),
    }
}

fn compare_keys(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::Bytes(x), Value::Bytes(y)) => x.cmp(y),
        (Value::Tuple(xs), Value::Tuple(ys)) => xs
            .iter()
            .zip(ys)
            .map(|(x, y)| compare_keys(x, y))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| xs.len().cmp(&ys.len())),
        _ => {
            let numeric = match (as_int(a), as_int(b)) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => match (as_float(a), as_float(b)) {
                    (Some(x), Some(y)) => Some(x.total_cmp(&y)),
                    _ => None,
                },
            };
            numeric
                .unwrap_or(Ordering::Equal)
                .then_with(|| rank(a).cmp(&rank(b)))
        }
    }
}
