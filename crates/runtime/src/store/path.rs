//! Dot-path addressing into JSON documents.
//!
//! Paths are rooted at `$`: `$` is the whole document, `$.exchange.m1`
//! walks two object levels. Segments are plain keys; there is no wildcard
//! or filter syntax.

use serde_json::{Map, Value};

use super::{StoreError, StoreResult};

/// Split a path into its object-key segments. `$` yields no segments.
pub fn segments(path: &str) -> StoreResult<Vec<&str>> {
    let rest = path
        .strip_prefix('$')
        .ok_or_else(|| StoreError::BadPath(path.to_string()))?;
    if rest.is_empty() {
        return Ok(vec![]);
    }
    let rest = rest
        .strip_prefix('.')
        .ok_or_else(|| StoreError::BadPath(path.to_string()))?;
    if rest.is_empty() || rest.split('.').any(str::is_empty) {
        return Err(StoreError::BadPath(path.to_string()));
    }
    Ok(rest.split('.').collect())
}

/// Immutable walk; `None` when any segment is missing.
pub fn resolve<'a>(doc: &'a Value, path: &str) -> StoreResult<Option<&'a Value>> {
    let mut current = doc;
    for segment in segments(path)? {
        match current.get(segment) {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Mutable walk creating intermediate objects, then set the leaf.
pub fn set(doc: &mut Value, path: &str, value: Value) -> StoreResult<()> {
    let segs = segments(path)?;
    if segs.is_empty() {
        *doc = value;
        return Ok(());
    }
    let mut current = doc;
    for segment in &segs[..segs.len() - 1] {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        current = current
            .as_object_mut()
            .expect("object ensured above")
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    current
        .as_object_mut()
        .expect("object ensured above")
        .insert(segs[segs.len() - 1].to_string(), value);
    Ok(())
}

/// Remove the leaf; `false` when the path did not exist.
pub fn del(doc: &mut Value, path: &str) -> StoreResult<bool> {
    let segs = segments(path)?;
    if segs.is_empty() {
        *doc = Value::Null;
        return Ok(true);
    }
    let mut current = doc;
    for segment in &segs[..segs.len() - 1] {
        match current.get_mut(*segment) {
            Some(next) => current = next,
            None => return Ok(false),
        }
    }
    Ok(current
        .as_object_mut()
        .map(|map| map.remove(segs[segs.len() - 1]).is_some())
        .unwrap_or(false))
}
