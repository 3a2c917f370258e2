//! Structural diffs between an object's snapshot and its live copy.
//!
//! Diffs are JSON merge patches (RFC 7396): changed or added keys carry the
//! new value, removed keys carry `null`, and arrays or scalars are replaced
//! wholesale. An object is split into its main body and its `status` aspect
//! before diffing so each aspect yields its own patch.

use serde_json::{Map, Value};
use similar::TextDiff;

use patchset_core::types::{Resource, STATUS_FIELD};

/// Per-aspect merge patches for one object. `None` means unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectDiff {
    pub main: Option<Value>,
    pub status: Option<Value>,
}

impl ObjectDiff {
    pub fn is_empty(&self) -> bool {
        self.main.is_none() && self.status.is_none()
    }
}

/// Merge patch turning `old` into `new`, or `None` when they are equal.
///
/// Inside objects a `null` member is the same as an absent one: a merge patch
/// cannot store `null`, so such a member never produces a patch on its own.
pub fn create_merge_patch(old: &Value, new: &Value) -> Option<Value> {
    if old == new {
        return None;
    }
    match (old, new) {
        (Value::Object(old), Value::Object(new)) => {
            let mut patch = Map::new();
            for (key, old_value) in present(old) {
                match new.get(key).filter(|v| !v.is_null()) {
                    None => {
                        patch.insert(key.clone(), Value::Null);
                    }
                    Some(new_value) => {
                        if let Some(nested) = create_merge_patch(old_value, new_value) {
                            patch.insert(key.clone(), nested);
                        }
                    }
                }
            }
            for (key, new_value) in present(new) {
                if old.get(key).map_or(true, Value::is_null) {
                    patch.insert(key.clone(), new_value.clone());
                }
            }
            (!patch.is_empty()).then_some(Value::Object(patch))
        }
        _ => Some(new.clone()),
    }
}

fn present(fields: &Map<String, Value>) -> impl Iterator<Item = (&String, &Value)> {
    fields.iter().filter(|(_, v)| !v.is_null())
}

/// Splits a serialized object into `(main body, status)`.
///
/// A missing `status` field is returned as `Value::Null`.
pub fn split_aspects(mut value: Value) -> (Value, Value) {
    let status = value
        .as_object_mut()
        .and_then(|fields| fields.remove(STATUS_FIELD))
        .unwrap_or(Value::Null);
    (value, status)
}

/// Diff both aspects of `live` against `snapshot`.
pub fn diff_object<T: Resource>(snapshot: &T, live: &T) -> Result<ObjectDiff, serde_json::Error> {
    let (old_main, old_status) = split_aspects(serde_json::to_value(snapshot)?);
    let (new_main, new_status) = split_aspects(serde_json::to_value(live)?);
    Ok(ObjectDiff {
        main: create_merge_patch(&old_main, &new_main),
        status: create_merge_patch(&old_status, &new_status),
    })
}

/// Unified YAML diff of `old` → `new`, or an empty string when equal.
pub fn render_unified(old: &Value, new: &Value, label: &str) -> Result<String, serde_yaml::Error> {
    if old == new {
        return Ok(String::new());
    }
    let old_yaml = to_yaml(old)?;
    let new_yaml = to_yaml(new)?;
    let old_header = format!("a/{label}");
    let new_header = format!("b/{label}");
    Ok(TextDiff::from_lines(&old_yaml, &new_yaml)
        .unified_diff()
        .context_radius(3)
        .header(&old_header, &new_header)
        .to_string())
}

fn to_yaml(value: &Value) -> Result<String, serde_yaml::Error> {
    if value.is_null() {
        return Ok(String::new());
    }
    serde_yaml::to_string(value)
}
