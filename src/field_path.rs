//! Dotted-path resolution over the `{status, body}` response tree.
//!
//! Resolution is total: every miss — unknown key, out-of-range index, a
//! non-numeric segment against a sequence, indexing into a scalar — yields
//! *absent* rather than raising. Once absent, a path stays absent for the
//! rest of its segments.

use serde_json::Value;

/// Build the wrapper tree assertions resolve paths against.
pub fn response_tree(status: u16, body: Option<&Value>) -> Value {
    serde_json::json!({
        "status": status,
        "body": body.cloned().unwrap_or(Value::Null),
    })
}

/// Build the tree variable extraction resolves paths against — `body`
/// only; extraction never sees `status`.
pub fn extraction_tree(body: Option<&Value>) -> Value {
    serde_json::json!({ "body": body.cloned().unwrap_or(Value::Null) })
}

/// Resolve `path` against `root`, returning `None` (absent) on any miss.
///
/// The literal path `"status"` is special-cased to read the wrapper's
/// `status` field directly (or, if `root` is itself a bare integer, that
/// integer) — everything else is split on `.` and walked segment by
/// segment.
pub fn resolve<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path == "status" {
        if let Some(obj) = root.as_object() {
            return obj.get("status");
        }
        if root.is_number() {
            return Some(root);
        }
        return None;
    }

    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => {
                let idx: usize = segment.parse().ok()?;
                items.get(idx)?
            }
            _ => return None,
        };
    }
    Some(current)
}
