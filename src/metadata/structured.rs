//! Backend A: JSON emitted by `<tool> info --metadata <file>`.

use crate::model::{Metadata, MetadataSource, Vec3};
use serde_json::{Map, Value};

#[derive(Debug, PartialEq, Eq)]
pub struct Malformed(pub String);

/// Map the `metadata` object of a query response.
///
/// Any inconsistency rejects the whole response; nothing is half-trusted.
pub fn parse(stdout: &str) -> Result<Metadata, Malformed> {
    let doc: Value =
        serde_json::from_str(stdout).map_err(|e| Malformed(format!("invalid JSON: {e}")))?;
    let meta = doc
        .get("metadata")
        .and_then(Value::as_object)
        .ok_or_else(|| Malformed("no `metadata` object".into()))?;

    let point_count = match meta.get("count") {
        Some(v) => Some(
            count(v).ok_or_else(|| Malformed(format!("count is not a point count: {v}")))?,
        ),
        None => None,
    };

    let format_version = match (meta.get("major_version"), meta.get("minor_version")) {
        (Some(major), Some(minor)) => Some(format!("{}.{}", scalar(major)?, scalar(minor)?)),
        _ => None,
    };

    Ok(Metadata {
        point_count,
        format_version,
        bounds_min: triple(meta, ["minx", "miny", "minz"])?,
        bounds_max: triple(meta, ["maxx", "maxy", "maxz"])?,
        offset: triple(meta, ["offset_x", "offset_y", "offset_z"])?,
        scale: triple(meta, ["scale_x", "scale_y", "scale_z"])?,
        software: text(meta, "software_id"),
        system: text(meta, "system_id"),
        source: Some(MetadataSource::Structured),
    })
}

/// Numbers may arrive as JSON numbers or numeric strings.
fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Counts stay integral end to end; large values must not round through f64.
fn count(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn scalar(v: &Value) -> Result<String, Malformed> {
    match v {
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        other => Err(Malformed(format!("unexpected version component: {other}"))),
    }
}

/// All three axes or none; a partial vector is malformed.
fn triple(meta: &Map<String, Value>, keys: [&str; 3]) -> Result<Option<Vec3>, Malformed> {
    let present = keys.iter().filter(|k| meta.contains_key(**k)).count();
    if present == 0 {
        return Ok(None);
    }
    let mut axes = [0.0; 3];
    for (slot, key) in axes.iter_mut().zip(keys) {
        *slot = meta
            .get(key)
            .and_then(number)
            .ok_or_else(|| Malformed(format!("missing or non-numeric `{key}`")))?;
    }
    Ok(Some(Vec3 {
        x: axes[0],
        y: axes[1],
        z: axes[2],
    }))
}

fn text(meta: &Map<String, Value>, key: &str) -> Option<String> {
    meta.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
