//! # Reroot
//!
//! Moves payloads between depths of the namespace.
//!
//! Payloads are JSON trees rooted at the node their key addresses. A list
//! element is an array of entry objects carrying their own key leaves; a
//! container element is an object.
//!
//! ```text
//! key  /colony[name=c1]/bundle-ether[name=be1]   payload {"name":"be1","mtu":9000}
//!                   │ reroot_up(.., depth = 1)
//!                   ▼
//! key  /colony[name=c1]   payload {"bundle-ether":[{"name":"be1","mtu":9000}]}
//! ```

use crate::domain::key::{leaf_text, Key, PathElement, PredicateValue};
use crate::error::RerootError;
use serde_json::{Map, Value};

/// Wrap `payload`, rooted at `key`, into the equivalent payload rooted at
/// `key.truncate(depth)`.
pub fn reroot_up(payload: &Value, key: &Key, depth: usize) -> Result<Value, RerootError> {
    if depth > key.depth() {
        return Err(RerootError::DepthOutOfRange {
            target: depth,
            depth: key.depth(),
        });
    }

    let mut value = payload.clone();
    for element in key.elements()[depth..].iter().rev() {
        value = wrap(value, element)?;
    }
    Ok(value)
}

fn wrap(value: Value, element: &PathElement) -> Result<Value, RerootError> {
    let mut outer = Map::new();
    if !element.is_list() {
        outer.insert(element.name.clone(), value);
        return Ok(Value::Object(outer));
    }

    let Value::Object(mut entry) = value else {
        return Err(RerootError::NotAnObject(element.to_string()));
    };
    for p in &element.predicates {
        match &p.value {
            PredicateValue::Exact(v) => {
                entry
                    .entry(p.name.clone())
                    .or_insert_with(|| Value::String(v.clone()));
            }
            PredicateValue::Wildcard => {
                return Err(RerootError::WildcardInPath(element.to_string()));
            }
        }
    }
    outer.insert(
        element.name.clone(),
        Value::Array(vec![Value::Object(entry)]),
    );
    Ok(Value::Object(outer))
}

/// Walk `payload`, rooted at `from`, down to every node `to` addresses.
///
/// Wildcards in `to` fan out across all matching list entries; each
/// returned key is concrete wherever the payload supplied the value.
/// Returns nothing when `to` is shallower than `from`, does not intersect
/// it, or the payload does not contain the addressed nodes.
pub fn reroot_down(payload: &Value, from: &Key, to: &Key) -> Vec<(Key, Value)> {
    let mut out = Vec::new();
    if to.depth() < from.depth() {
        return out;
    }
    let Some(start) = from.merge(&to.truncate(from.depth())) else {
        return out;
    };
    walk(payload, to, start, &mut out);
    out
}

fn walk(value: &Value, to: &Key, current: Key, out: &mut Vec<(Key, Value)>) {
    let idx = current.depth();
    let Some(element) = to.elements().get(idx) else {
        out.push((current, value.clone()));
        return;
    };
    let Some(child) = value.get(&element.name) else {
        return;
    };

    if !element.is_list() {
        walk(child, to, current.child(element.clone()), out);
        return;
    }

    match child {
        Value::Array(entries) => {
            for entry in entries.iter().filter(|e| element.matches_entry(e)) {
                walk(entry, to, current.child(element.concretize(entry)), out);
            }
        }
        // A single entry sent without its enclosing array.
        Value::Object(_) if element.matches_entry(child) => {
            walk(child, to, current.child(element.concretize(child)), out);
        }
        _ => {}
    }
}

/// Merge `source` into `target`.
///
/// Objects merge recursively. Array entries that agree on every scalar leaf
/// they share (at least one) are merged; the rest are appended. Anything
/// else is overwritten.
pub fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(t), Value::Object(s)) => {
            for (k, v) in s {
                match t.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        t.insert(k, v);
                    }
                }
            }
        }
        (Value::Array(t), Value::Array(s)) => {
            for item in s {
                match t.iter_mut().find(|e| same_entry(e, &item)) {
                    Some(existing) => deep_merge(existing, item),
                    None => t.push(item),
                }
            }
        }
        (t, s) => *t = s,
    }
}

fn same_entry(a: &Value, b: &Value) -> bool {
    let (Some(a), Some(b)) = (a.as_object(), b.as_object()) else {
        return false;
    };
    let mut shared = 0;
    for (k, va) in a {
        let Some(vb) = b.get(k) else { continue };
        if let (Some(ta), Some(tb)) = (leaf_text(va), leaf_text(vb)) {
            if ta != tb {
                return false;
            }
            shared += 1;
        }
    }
    shared > 0
}
