//! RFC 6902 JSON Patch

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::ValidationError;

/// A single patch operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Move { from: String, path: String },
    Copy { from: String, path: String },
    Test { path: String, value: Value },
}

/// An ordered list of patch operations, applied atomically
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonPatch(pub Vec<PatchOperation>);

impl JsonPatch {
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        serde_json::from_value(value).map_err(|e| ValidationError::InvalidPatch {
            message: e.to_string(),
        })
    }

    /// Apply every operation to `target`
    ///
    /// On failure `target` is left untouched.
    pub fn apply(&self, target: &mut Value) -> Result<(), ValidationError> {
        let mut working = target.clone();
        for operation in &self.0 {
            apply_operation(&mut working, operation)?;
        }
        *target = working;
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ValidationError {
    ValidationError::InvalidPatch {
        message: message.into(),
    }
}

/// Split a JSON pointer into unescaped reference tokens
fn tokens(pointer: &str) -> Result<Vec<String>, ValidationError> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let rest = pointer
        .strip_prefix('/')
        .ok_or_else(|| invalid(format!("path '{}' must start with '/'", pointer)))?;
    Ok(rest
        .split('/')
        .map(|t| t.replace("~1", "/").replace("~0", "~"))
        .collect())
}

fn parent_and_key(pointer: &str) -> Result<(String, String), ValidationError> {
    let mut parts = tokens(pointer)?;
    let key = parts
        .pop()
        .ok_or_else(|| invalid("operation cannot target the document root"))?;
    let parent = parts
        .iter()
        .map(|t| format!("/{}", t.replace('~', "~0").replace('/', "~1")))
        .collect();
    Ok((parent, key))
}

fn array_index(key: &str, len: usize, allow_end: bool) -> Result<usize, ValidationError> {
    if allow_end && key == "-" {
        return Ok(len);
    }
    let index: usize = key
        .parse()
        .map_err(|_| invalid(format!("'{}' is not an array index", key)))?;
    let limit = if allow_end { len } else { len.saturating_sub(1) };
    if index > limit || (!allow_end && len == 0) {
        return Err(invalid(format!("array index {} out of bounds", index)));
    }
    Ok(index)
}

fn add(target: &mut Value, path: &str, value: Value) -> Result<(), ValidationError> {
    if path.is_empty() {
        *target = value;
        return Ok(());
    }
    let (parent, key) = parent_and_key(path)?;
    match target.pointer_mut(&parent) {
        Some(Value::Object(map)) => {
            map.insert(key, value);
            Ok(())
        }
        Some(Value::Array(items)) => {
            let index = array_index(&key, items.len(), true)?;
            items.insert(index, value);
            Ok(())
        }
        _ => Err(invalid(format!("path '{}' does not exist", path))),
    }
}

fn remove(target: &mut Value, path: &str) -> Result<Value, ValidationError> {
    let (parent, key) = parent_and_key(path)?;
    match target.pointer_mut(&parent) {
        Some(Value::Object(map)) => map
            .remove(&key)
            .ok_or_else(|| invalid(format!("path '{}' does not exist", path))),
        Some(Value::Array(items)) => {
            let index = array_index(&key, items.len(), false)?;
            Ok(items.remove(index))
        }
        _ => Err(invalid(format!("path '{}' does not exist", path))),
    }
}

fn get(target: &Value, path: &str) -> Result<Value, ValidationError> {
    target
        .pointer(path)
        .cloned()
        .ok_or_else(|| invalid(format!("path '{}' does not exist", path)))
}

fn apply_operation(target: &mut Value, operation: &PatchOperation) -> Result<(), ValidationError> {
    match operation {
        PatchOperation::Add { path, value } => add(target, path, value.clone()),
        PatchOperation::Remove { path } => remove(target, path).map(|_| ()),
        PatchOperation::Replace { path, value } => {
            if path.is_empty() {
                *target = value.clone();
                return Ok(());
            }
            remove(target, path)?;
            add(target, path, value.clone())
        }
        PatchOperation::Move { from, path } => {
            if path.starts_with(&format!("{}/", from)) {
                return Err(invalid("cannot move a value into one of its children"));
            }
            let value = remove(target, from)?;
            add(target, path, value)
        }
        PatchOperation::Copy { from, path } => {
            let value = get(target, from)?;
            add(target, path, value)
        }
        PatchOperation::Test { path, value } => {
            if &get(target, path)? == value {
                Ok(())
            } else {
                Err(invalid(format!("test failed at '{}'", path)))
            }
        }
    }
}
