//! Canonical JSON for usage outputs.
//!
//! Objects at known paths are written in a fixed key order; keys that are not
//! part of the known shape follow in lexicographic (UTF-16 code unit) order.
//! No whitespace is emitted and arrays keep their element order.

use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;

use crate::error::{CoreError, Result};
use crate::types::UsageOutputV1;

/// Fixed key order per object path. The root object has the empty path.
const KEY_ORDER: &[(&str, &[&str])] = &[
    (
        "",
        &[
            "protocol",
            "output_version",
            "wallet",
            "campaign_id",
            "window",
            "verified_usage",
            "usage_summary",
            "criteria",
            "proof",
        ],
    ),
    ("/window", &["type", "start", "end"]),
    ("/usage_summary", &["days_active", "tx_count", "unique_contracts"]),
    ("/criteria", &["criteria_set_id", "engine_version", "params"]),
    (
        "/criteria/params",
        &["min_days_active", "min_tx_count", "min_unique_contracts"],
    ),
    ("/proof", &["hash_algorithm", "canonical_hash"]),
];

/// Canonical string of a usage output.
pub fn canonicalize_usage_output(output: &UsageOutputV1) -> Result<String> {
    canonicalize(output)
}

/// Canonical string of any serializable value under the usage output key order.
pub fn canonicalize<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value).map_err(|e| CoreError::Serialization(e.to_string()))?;
    canonicalize_value(&value)
}

/// Canonical string of a JSON value.
pub fn canonicalize_value(value: &Value) -> Result<String> {
    let mut out = String::new();
    write_value(&mut out, value, "")?;
    Ok(out)
}

fn write_value(out: &mut String, value: &Value, path: &str) -> Result<()> {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_value(out, item, &format!("{path}[{index}]"))?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            order_keys(&mut keys, path);
            out.push('{');
            for (index, key) in keys.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_scalar(out, &Value::String(key.clone()))?;
                out.push(':');
                write_value(out, &map[key.as_str()], &format!("{path}/{key}"))?;
            }
            out.push('}');
        }
        scalar => write_scalar(out, scalar)?,
    }
    Ok(())
}

fn write_scalar(out: &mut String, value: &Value) -> Result<()> {
    let encoded =
        serde_json::to_string(value).map_err(|e| CoreError::Serialization(e.to_string()))?;
    out.push_str(&encoded);
    Ok(())
}

fn order_keys(keys: &mut [&String], path: &str) {
    let preferred = KEY_ORDER
        .iter()
        .find_map(|(p, order)| (*p == path).then_some(*order));

    let position = |key: &str| preferred.and_then(|order| order.iter().position(|k| *k == key));

    keys.sort_by(|left, right| match (position(left), position(right)) {
        (Some(l), Some(r)) => l.cmp(&r),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => utf16_cmp(left, right),
    });
}

fn utf16_cmp(left: &str, right: &str) -> Ordering {
    left.encode_utf16().cmp(right.encode_utf16())
}
