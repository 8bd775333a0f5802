//! Reflection predicates: does a fresh snapshot contain the new attestation?

use serde_json::Value;

fn contains_uid(value: &Value, uid: &str) -> bool {
    match value {
        Value::String(s) => s.eq_ignore_ascii_case(uid),
        Value::Array(items) => items.iter().any(|v| contains_uid(v, uid)),
        Value::Object(map) => map.values().any(|v| contains_uid(v, uid)),
        _ => false,
    }
}

/// Predicate: the snapshot mentions `uid` anywhere (case-insensitive).
///
/// This is the shape nearly every call site uses: re-fetch the parent and
/// look for the freshly attested UID.
pub fn uid_present(uid: &str) -> impl FnMut(&Value) -> bool + Send {
    let uid = uid.to_string();
    move |snapshot| contains_uid(snapshot, &uid)
}

/// Predicate: the array at `pointer` (JSON pointer, e.g. `/milestones`) has
/// at least `n` elements. Used when a call site only knows the expected
/// collection size, not the new UID.
pub fn collection_len_at_least(pointer: &str, n: usize) -> impl FnMut(&Value) -> bool + Send {
    let pointer = pointer.to_string();
    move |snapshot| {
        snapshot
            .pointer(&pointer)
            .and_then(Value::as_array)
            .is_some_and(|items| items.len() >= n)
    }
}
