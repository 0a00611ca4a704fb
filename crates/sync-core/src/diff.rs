//! Minimal attribute deltas.
//!
//! Directories need an explicit list of changes rather than a full
//! overwrite, otherwise attributes not managed by a handler get clobbered.
//! Everything that writes to an existing entry goes through here:
//! fetch current attributes, compute the new set, emit only the difference.

use crate::directory::{attr_key, attr_values, AttrValues, Attributes, Modification};
use std::collections::BTreeSet;

/// Compute the delta turning `current` into `new`.
///
/// - absent (or empty) in `current`, non-empty in `new` → add
/// - non-empty in both but different values → replace
/// - non-empty in `current`, absent or empty in `new` → delete
///
/// Values are compared as sets; reordering alone is not a change. Attribute
/// names are compared case-insensitively.
pub fn modify_delta(current: &Attributes, new: &Attributes) -> Vec<Modification> {
    let mut delta = Vec::new();

    for (attr, new_values) in new {
        let current_values = attr_values(current, attr).filter(|values| !values.is_empty());
        match (current_values, new_values.is_empty()) {
            (None, true) => {}
            (None, false) => delta.push(Modification::add(attr.clone(), new_values.clone())),
            (Some(_), true) => delta.push(Modification::delete(attr.clone(), Vec::new())),
            (Some(old), false) => {
                if !same_values(old, new_values) {
                    delta.push(Modification::replace(attr.clone(), new_values.clone()));
                }
            }
        }
    }

    for (attr, values) in current {
        if !values.is_empty() && attr_key(new, attr).is_none() {
            delta.push(Modification::delete(attr.clone(), Vec::new()));
        }
    }

    delta
}

/// Delta for a single attribute going from `current` to `new` values.
pub fn attribute_delta(attr: &str, current: &[String], new: &[String]) -> Vec<Modification> {
    let mut before = Attributes::new();
    if !current.is_empty() {
        before.insert(attr.to_string(), current.to_vec());
    }
    let mut after = Attributes::new();
    after.insert(attr.to_string(), new.to_vec());
    modify_delta(&before, &after)
}

/// Apply `changed` on top of `current`.
///
/// Without `accumulate`, each changed key overrides the current values
/// (an empty sequence marks the attribute for removal). With `accumulate`,
/// changed values are appended when not already present. A changed key
/// lands on the current key with the same name regardless of case.
pub fn merge_changes(current: &Attributes, changed: &Attributes, accumulate: bool) -> Attributes {
    let mut merged = current.clone();
    for (attr, values) in changed {
        let key = attr_key(&merged, attr).cloned().unwrap_or_else(|| attr.clone());
        if accumulate {
            let slot = merged.entry(key).or_default();
            for value in values {
                push_unique(slot, value);
            }
        } else {
            merged.insert(key, values.clone());
        }
    }
    merged
}

/// Append `value` unless it is already present. Returns whether it was added.
pub fn push_unique(values: &mut AttrValues, value: &str) -> bool {
    if values.iter().any(|v| v == value) {
        false
    } else {
        values.push(value.to_string());
        true
    }
}

/// Remove duplicates keeping the first occurrence of each value.
pub fn dedup_values(values: &mut AttrValues) {
    let mut seen = BTreeSet::new();
    values.retain(|value| seen.insert(value.clone()));
}

fn same_values(a: &[String], b: &[String]) -> bool {
    let a: BTreeSet<&str> = a.iter().map(String::as_str).collect();
    let b: BTreeSet<&str> = b.iter().map(String::as_str).collect();
    a == b
}
