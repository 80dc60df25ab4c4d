//! Field-wise comparison of serialized resources.
//!
//! Update detection compares the desired resource against the resource
//! recorded in the current state by deep equality over their tagged JSON
//! forms, excluding the metadata keys (`.type`, `id`, `dependencies`)
//! which never count as attributes.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::codec::{DEPENDENCIES_KEY, ID_KEY, JsonMap, TYPE_KEY};

/// Keys excluded from attribute comparison.
pub const METADATA_KEYS: &[&str] = &[TYPE_KEY, ID_KEY, DEPENDENCIES_KEY];

/// A single attribute difference between current and desired.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff {
    /// Name of the differing field
    pub field: String,
    /// Value recorded in the current state (`null` when absent)
    pub current: Value,
    /// Value in the desired resource (`null` when absent)
    pub desired: Value,
}

impl fmt::Display for FieldDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.field, self.current, self.desired)
    }
}

/// Compute the attribute-level differences between two encoded resources.
///
/// Fields present on either side are compared; a field absent from one
/// side diffs against `null`. Metadata keys are skipped.
pub fn field_diffs(current: &JsonMap, desired: &JsonMap) -> Vec<FieldDiff> {
    let mut diffs = Vec::new();

    for (field, desired_value) in desired {
        if METADATA_KEYS.contains(&field.as_str()) {
            continue;
        }
        let current_value = current.get(field).cloned().unwrap_or(Value::Null);
        if current_value != *desired_value {
            diffs.push(FieldDiff {
                field: field.clone(),
                current: current_value,
                desired: desired_value.clone(),
            });
        }
    }

    for (field, current_value) in current {
        if METADATA_KEYS.contains(&field.as_str()) || desired.contains_key(field) {
            continue;
        }
        diffs.push(FieldDiff {
            field: field.clone(),
            current: current_value.clone(),
            desired: Value::Null,
        });
    }

    diffs
}

/// Whether two encoded resources have equal attributes.
pub fn attributes_equal(current: &JsonMap, desired: &JsonMap) -> bool {
    field_diffs(current, desired).is_empty()
}
