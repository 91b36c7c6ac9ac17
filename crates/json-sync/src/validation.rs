//! Boundary checks for user-supplied keys, paths, priorities and write data.
//!
//! Everything inside the engine assumes its input already passed these.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::SyncError;
use crate::path::Path;

/// Largest string leaf accepted in a write, in UTF-8 bytes.
pub const MAX_LEAF_SIZE: usize = 10 * 1024 * 1024;
/// Deepest location a write may touch, counting the write's own path.
pub const MAX_PATH_DEPTH: usize = 32;
/// Longest location a write may touch, in UTF-8 bytes.
pub const MAX_PATH_LENGTH_BYTES: usize = 768;

fn invalid_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\[\].#$/\x00-\x1F\x7F]").expect("static regex"))
}

fn invalid_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\[\].#$\x00-\x1F\x7F]").expect("static regex"))
}

fn info_prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/*\.info(/|$)").expect("static regex"))
}

pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && !invalid_key_regex().is_match(key)
}

pub fn validate_key(key: &str) -> Result<(), SyncError> {
    if is_valid_key(key) {
        Ok(())
    } else {
        Err(SyncError::InvalidKey { key: key.to_owned() })
    }
}

pub fn validate_path_string(path: &str) -> Result<(), SyncError> {
    if path.is_empty() {
        return Err(SyncError::invalid_path(path, "path must be a non-empty string"));
    }
    if invalid_path_regex().is_match(path) {
        return Err(SyncError::invalid_path(
            path,
            "paths cannot contain '.', '#', '$', '[', ']' or control characters",
        ));
    }
    Ok(())
}

/// Like [`validate_path_string`], but a leading `.info` segment is allowed.
pub fn validate_root_path_string(path: &str) -> Result<(), SyncError> {
    let stripped = info_prefix_regex().replace(path, "/");
    validate_path_string(&stripped).map_err(|err| match err {
        SyncError::InvalidPath { reason, .. } => SyncError::invalid_path(path, reason),
        other => other,
    })
}

/// Rejects writes under `/.info`.
pub fn validate_writable_path(path: &Path) -> Result<(), SyncError> {
    if path.is_info() {
        Err(SyncError::ReadOnlyPath(path.to_string()))
    } else {
        Ok(())
    }
}

/// A priority is null, a finite number or a string.
pub fn validate_priority(priority: &Value) -> Result<(), SyncError> {
    match priority {
        Value::Null | Value::String(_) => Ok(()),
        Value::Number(n) if n.as_f64().is_some_and(f64::is_finite) => Ok(()),
        other => Err(SyncError::InvalidPriority(format!(
            "priority must be a string, a finite number or null, got {other}"
        ))),
    }
}

/// Validates a value about to be written at `path`.
pub fn validate_data(path: &Path, data: &Value) -> Result<(), SyncError> {
    let mut trail: Vec<String> = path.segments().to_vec();
    check_trail(&trail)?;
    validate_data_at(&mut trail, data)
}

/// Validates a multi-location update rooted at `path`.
///
/// Keys are relative paths; none may be an ancestor of another.
pub fn validate_merge(path: &Path, children: &Map<String, Value>) -> Result<Vec<Path>, SyncError> {
    let mut relative = Vec::with_capacity(children.len());
    for (key, value) in children {
        validate_path_string(key)?;
        let rel = Path::new(key);
        if rel.is_empty() {
            return Err(SyncError::invalid_path(key.clone(), "update keys cannot be the root"));
        }
        if rel.back() == Some(".priority") {
            validate_priority(value)?;
        } else {
            validate_data(&path.join(&rel), value)?;
        }
        relative.push(rel);
    }
    let mut sorted = relative.clone();
    sorted.sort();
    for pair in sorted.windows(2) {
        if pair[0].contains(&pair[1]) {
            return Err(SyncError::invalid_data(
                path,
                format!("update path {} is an ancestor of {}", pair[0], pair[1]),
            ));
        }
    }
    Ok(relative)
}

fn trail_path(trail: &[String]) -> Path {
    Path::from_segments(trail.iter().cloned())
}

fn check_trail(trail: &[String]) -> Result<(), SyncError> {
    if trail.len() > MAX_PATH_DEPTH {
        return Err(SyncError::invalid_data(
            trail_path(trail),
            format!("path exceeds the maximum depth that can be written ({MAX_PATH_DEPTH})"),
        ));
    }
    let bytes = trail.iter().map(String::len).sum::<usize>() + trail.len().saturating_sub(1);
    if bytes > MAX_PATH_LENGTH_BYTES {
        return Err(SyncError::invalid_data(
            trail_path(trail),
            format!("path is longer than {MAX_PATH_LENGTH_BYTES} bytes"),
        ));
    }
    Ok(())
}

fn validate_data_at(trail: &mut Vec<String>, data: &Value) -> Result<(), SyncError> {
    match data {
        Value::String(s) if s.len() > MAX_LEAF_SIZE => Err(SyncError::invalid_data(
            trail_path(trail),
            format!("contains a string greater than {MAX_LEAF_SIZE} utf8 bytes"),
        )),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                trail.push(i.to_string());
                check_trail(trail)?;
                validate_data_at(trail, item)?;
                trail.pop();
            }
            Ok(())
        }
        Value::Object(map) => {
            let mut has_dot_value = false;
            let mut has_actual_child = false;
            for (key, value) in map {
                match key.as_str() {
                    ".value" => has_dot_value = true,
                    ".priority" => validate_priority(value)?,
                    _ => {
                        has_actual_child = true;
                        validate_key(key)?;
                    }
                }
                trail.push(key.clone());
                check_trail(trail)?;
                validate_data_at(trail, value)?;
                trail.pop();
            }
            if has_dot_value && has_actual_child {
                return Err(SyncError::invalid_data(
                    trail_path(trail),
                    "contains .value child as well as other children",
                ));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys() {
        assert!(is_valid_key("abc"));
        assert!(is_valid_key("-Nabc_12"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("a.b"));
        assert!(!is_valid_key("a/b"));
        assert!(!is_valid_key("a\u{7f}"));
    }

    #[test]
    fn data_rules() {
        let root = Path::new("x");
        assert!(validate_data(&root, &json!({"a": 1, ".priority": 2})).is_ok());
        assert!(validate_data(&root, &json!({".value": 1, ".priority": "p"})).is_ok());
        assert!(validate_data(&root, &json!({".value": 1, "a": 2})).is_err());
        assert!(validate_data(&root, &json!({"a.b": 1})).is_err());
        assert!(validate_data(&root, &json!({".priority": true})).is_err());
    }

    #[test]
    fn depth_limit() {
        let mut value = json!(1);
        for _ in 0..31 {
            value = json!({ "k": value });
        }
        assert!(validate_data(&Path::new("x"), &value).is_ok());
        assert!(validate_data(&Path::new("x/y"), &value).is_err());
    }

    #[test]
    fn merge_paths_cannot_nest() {
        let ok = json!({"a/b": 1, "a/c": 2});
        assert!(validate_merge(&Path::root(), ok.as_object().unwrap()).is_ok());
        let nested = json!({"a": 1, "a/c": 2});
        assert!(validate_merge(&Path::root(), nested.as_object().unwrap()).is_err());
    }

    #[test]
    fn info_is_read_only() {
        assert!(validate_writable_path(&Path::new(".info/connected")).is_err());
        assert!(validate_writable_path(&Path::new("info")).is_ok());
    }
}
