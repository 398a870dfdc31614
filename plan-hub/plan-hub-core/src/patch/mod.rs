//! Structural patches over node content.
//!
//! A patch carries three maps applied in order: `deleted`, `added`,
//! `updated`. Maps merge recursively. Lists are addressed with numeric-string
//! keys, so `{"items": {"2": {...}}}` reaches the third element of `items`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{HubError, Result};
use crate::node::Content;

#[cfg(test)]
mod tests;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Patch {
    #[serde(default)]
    pub added: Map<String, Value>,
    #[serde(default)]
    pub updated: Map<String, Value>,
    #[serde(default)]
    pub deleted: Map<String, Value>,
}

impl Patch {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

#[derive(Clone, Copy)]
enum Mode {
    Add,
    Update,
}

/// Apply `patch` to `content` in place. On error `content` may be partially
/// modified; callers patch a clone.
pub fn apply(content: &mut Content, patch: &Patch) -> Result<()> {
    delete_in_map(content, &patch.deleted, "")?;
    merge_into_map(content, &patch.added, Mode::Add, "")?;
    merge_into_map(content, &patch.updated, Mode::Update, "")?;
    Ok(())
}

/// Apply to a copy, leaving `content` untouched.
pub fn applied(content: &Content, patch: &Patch) -> Result<Content> {
    let mut out = content.clone();
    apply(&mut out, patch)?;
    Ok(out)
}

fn path_of(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn index_of(key: &str, path: &str) -> Result<usize> {
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HubError::InvalidPatch(format!(
            "list index expected at {path}, got {key:?}"
        )));
    }
    key.parse::<usize>()
        .map_err(|_| HubError::InvalidPatch(format!("list index out of range at {path}")))
}

fn is_container(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

fn merge_into_map(target: &mut Map<String, Value>, patch: &Map<String, Value>, mode: Mode, path: &str) -> Result<()> {
    for (key, value) in patch {
        let here = path_of(path, key);
        match value {
            Value::Object(nested) if target.get(key).is_some_and(is_container) => {
                if let Some(existing) = target.get_mut(key) {
                    merge_into_value(existing, nested, mode, &here)?;
                }
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(())
}

fn merge_into_list(target: &mut Vec<Value>, patch: &Map<String, Value>, mode: Mode, path: &str) -> Result<()> {
    let mut entries = patch
        .iter()
        .map(|(k, v)| Ok((index_of(k, &path_of(path, k))?, k, v)))
        .collect::<Result<Vec<_>>>()?;
    entries.sort_by_key(|(idx, _, _)| *idx);
    for (idx, key, value) in entries {
        let here = path_of(path, key);
        if idx < target.len() {
            let existing = &mut target[idx];
            match value {
                Value::Object(nested) if is_container(existing) => {
                    merge_into_value(existing, nested, mode, &here)?;
                }
                _ => *existing = value.clone(),
            }
            continue;
        }
        match mode {
            Mode::Add => target.push(value.clone()),
            Mode::Update => {
                return Err(HubError::InvalidPatch(format!(
                    "cannot update missing list element {here}"
                )))
            }
        }
    }
    Ok(())
}

fn merge_into_value(target: &mut Value, patch: &Map<String, Value>, mode: Mode, path: &str) -> Result<()> {
    match target {
        Value::Object(map) => merge_into_map(map, patch, mode, path),
        Value::Array(list) => merge_into_list(list, patch, mode, path),
        _ => Err(HubError::InvalidPatch(format!("{path} is not a container"))),
    }
}

fn delete_in_map(target: &mut Map<String, Value>, patch: &Map<String, Value>, path: &str) -> Result<()> {
    for (key, value) in patch {
        let here = path_of(path, key);
        match value {
            Value::Null => {
                target.remove(key);
            }
            Value::Object(nested) => match target.get_mut(key) {
                Some(existing) => delete_in_value(existing, nested, &here)?,
                None => {
                    return Err(HubError::InvalidPatch(format!(
                        "cannot delete inside missing key {here}"
                    )))
                }
            },
            _ => {
                return Err(HubError::InvalidPatch(format!(
                    "delete entries must be null or nested maps at {here}"
                )))
            }
        }
    }
    Ok(())
}

fn delete_in_list(target: &mut Vec<Value>, patch: &Map<String, Value>, path: &str) -> Result<()> {
    let mut removals = Vec::new();
    for (key, value) in patch {
        let here = path_of(path, key);
        let idx = index_of(key, &here)?;
        if idx >= target.len() {
            return Err(HubError::InvalidPatch(format!(
                "list index {idx} out of range at {here}"
            )));
        }
        match value {
            Value::Null => removals.push(idx),
            Value::Object(nested) => delete_in_value(&mut target[idx], nested, &here)?,
            _ => {
                return Err(HubError::InvalidPatch(format!(
                    "delete entries must be null or nested maps at {here}"
                )))
            }
        }
    }
    // Highest index first so earlier removals do not shift later ones.
    removals.sort_unstable_by(|a, b| b.cmp(a));
    removals.dedup();
    for idx in removals {
        target.remove(idx);
    }
    Ok(())
}

fn delete_in_value(target: &mut Value, patch: &Map<String, Value>, path: &str) -> Result<()> {
    match target {
        Value::Object(map) => delete_in_map(map, patch, path),
        Value::Array(list) => delete_in_list(list, patch, path),
        _ => Err(HubError::InvalidPatch(format!("{path} is not a container"))),
    }
}
