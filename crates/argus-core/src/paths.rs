//! Dot-path access into JSON payloads.
//!
//! Field mappings reference payload fields by dot-separated paths
//! (`user.id`, `context.page.url`). These helpers walk a
//! [`serde_json::Value`] along such a path.

use serde_json::Value;

/// Resolves a dot-separated path to a non-null value.
///
/// Returns `None` when any segment is missing, when a non-object is
/// traversed, or when the leaf is JSON `null`.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Checks whether a dot-separated path exists in a payload.
///
/// Unlike [`get_path`], a leaf holding JSON `null` still counts as present.
pub fn has_path(value: &Value, path: &str) -> bool {
    let mut current = value;
    for segment in path.split('.') {
        match current.as_object().and_then(|obj| obj.get(segment)) {
            Some(next) => current = next,
            None => return false,
        }
    }
    true
}
