//! Small `serde_json::Value` coercions shared across operators. `Value`
//! stands in for this engine's dynamically-typed item; these
//! helpers are the seams where an item gets read as text or as a number.

use serde_json::Value;

/// Render `v` as text the way a template/prefix operator would: strings
/// pass through untouched, everything else (including `null`) renders as
/// its JSON text.
pub(crate) fn as_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A stable string key for equality/dedup comparisons (`distinct`,
/// `distinct_until_changed`). Both operators compare "by string-equality"
/// `2` and `"2"` are the same key, so `distinct` does not re-emit the
/// string `"2"` after the number `2` has already been seen.
pub(crate) fn dedup_key(v: &Value) -> String {
    as_text(v)
}
