//! Structural diff between two content trees.
//!
//! The walk is a direct two-tree comparison of the branch heads, not a
//! three-way merge against a common ancestor. A key only one side ever
//! touched still shows up as a missing-key entry; callers surface every
//! entry for resolution rather than guessing which side diverged.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{stringify, MISSING};
use crate::models::{ConflictResolution, ConflictType};

/// One divergent path between two content trees.
///
/// Detection-time representation; the persisted form is [`crate::models::Conflict`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    /// Dotted path from the content root.
    pub path: String,
    /// Leaf segment of the path.
    pub field: String,
    pub conflict_type: ConflictType,
    /// Source-side value; [`MISSING`] if the key is absent there.
    pub source_value: String,
    /// Target-side value; [`MISSING`] if the key is absent there.
    pub target_value: String,
    pub resolution_options: Vec<ConflictResolution>,
}

/// Compare two content trees and return every divergent path.
///
/// Maps on both sides recurse; anything else that differs produces one
/// entry. Keys iterate in sorted union order so output is reproducible.
pub fn diff_trees(source: &Value, target: &Value) -> Vec<DiffEntry> {
    let mut entries = Vec::new();
    diff_at_path("", source, target, &mut entries);
    entries
}

fn diff_at_path(path: &str, source: &Value, target: &Value, entries: &mut Vec<DiffEntry>) {
    match (source, target) {
        (Value::Object(source_map), Value::Object(target_map)) => {
            let mut keys: Vec<&String> = source_map.keys().chain(target_map.keys()).collect();
            keys.sort();
            keys.dedup();

            for key in keys {
                let child_path = if path.is_empty() {
                    key.to_string()
                } else {
                    format!("{path}.{key}")
                };
                match (source_map.get(key.as_str()), target_map.get(key.as_str())) {
                    (Some(source_child), Some(target_child)) => {
                        diff_at_path(&child_path, source_child, target_child, entries);
                    }
                    (Some(source_child), None) => {
                        entries.push(DiffEntry {
                            field: leaf_field(&child_path),
                            path: child_path,
                            conflict_type: ConflictType::MissingInTarget,
                            source_value: stringify(source_child),
                            target_value: MISSING.to_string(),
                            resolution_options: missing_options(),
                        });
                    }
                    (None, Some(target_child)) => {
                        entries.push(DiffEntry {
                            field: leaf_field(&child_path),
                            path: child_path,
                            conflict_type: ConflictType::MissingInSource,
                            source_value: MISSING.to_string(),
                            target_value: stringify(target_child),
                            resolution_options: missing_options(),
                        });
                    }
                    (None, None) => {}
                }
            }
        }
        _ => {
            if source != target {
                entries.push(DiffEntry {
                    field: leaf_field(path),
                    path: path.to_string(),
                    conflict_type: ConflictType::ValueMismatch,
                    source_value: stringify(source),
                    target_value: stringify(target),
                    resolution_options: mismatch_options(),
                });
            }
        }
    }
}

fn leaf_field(path: &str) -> String {
    path.rsplit('.').next().unwrap_or("").to_string()
}

/// Options for a key present on both sides with different values.
fn mismatch_options() -> Vec<ConflictResolution> {
    vec![
        ConflictResolution::TakeSource,
        ConflictResolution::TakeTarget,
        ConflictResolution::Merge,
    ]
}

/// Options for a key absent on one side. `merge` is not offered — there is
/// nothing to merge with.
fn missing_options() -> Vec<ConflictResolution> {
    vec![ConflictResolution::TakeSource, ConflictResolution::TakeTarget]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identical_trees_no_entries() {
        let tree = json!({"title": "A", "chapters": {"one": {"text": "intro"}}});
        assert!(diff_trees(&tree, &tree).is_empty());
    }

    #[test]
    fn test_value_mismatch_offers_merge() {
        let entries = diff_trees(&json!({"a": 1}), &json!({"a": 2}));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "a");
        assert_eq!(entries[0].conflict_type, ConflictType::ValueMismatch);
        assert_eq!(entries[0].source_value, "1");
        assert_eq!(entries[0].target_value, "2");
        assert_eq!(
            entries[0].resolution_options,
            vec![
                ConflictResolution::TakeSource,
                ConflictResolution::TakeTarget,
                ConflictResolution::Merge,
            ]
        );
    }

    #[test]
    fn test_missing_key_omits_merge_option() {
        let entries = diff_trees(&json!({"a": 1}), &json!({}));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "a");
        assert_eq!(entries[0].conflict_type, ConflictType::MissingInTarget);
        assert_eq!(entries[0].source_value, "1");
        assert_eq!(entries[0].target_value, MISSING);
        assert_eq!(
            entries[0].resolution_options,
            vec![ConflictResolution::TakeSource, ConflictResolution::TakeTarget]
        );
    }

    #[test]
    fn test_missing_in_source_side() {
        let entries = diff_trees(&json!({}), &json!({"note": "x"}));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].conflict_type, ConflictType::MissingInSource);
        assert_eq!(entries[0].source_value, MISSING);
        assert_eq!(entries[0].target_value, "x");
    }

    #[test]
    fn test_nested_maps_recurse_with_dotted_paths() {
        let source = json!({"chapter": {"title": "Ambush", "scene": "road"}});
        let target = json!({"chapter": {"title": "Parley", "scene": "road"}});
        let entries = diff_trees(&source, &target);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "chapter.title");
        assert_eq!(entries[0].field, "title");
    }

    #[test]
    fn test_lists_compare_whole_not_recursed() {
        let entries = diff_trees(&json!({"tags": [1, 2]}), &json!({"tags": [1, 3]}));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "tags");
        assert_eq!(entries[0].source_value, "[1,2]");
        assert_eq!(entries[0].target_value, "[1,3]");
        assert_eq!(entries[0].resolution_options.len(), 3);
    }

    #[test]
    fn test_map_versus_scalar_is_value_mismatch() {
        let entries = diff_trees(&json!({"a": {"b": 1}}), &json!({"a": 5}));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].conflict_type, ConflictType::ValueMismatch);
        assert_eq!(entries[0].source_value, r#"{"b":1}"#);
        assert_eq!(entries[0].target_value, "5");
    }

    #[test]
    fn test_entries_come_out_in_sorted_path_order() {
        let source = json!({"zeta": 1, "alpha": 1, "mid": {"b": 1, "a": 1}});
        let target = json!({"zeta": 2, "alpha": 2, "mid": {"b": 2, "a": 2}});
        let paths: Vec<String> = diff_trees(&source, &target)
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert_eq!(paths, vec!["alpha", "mid.a", "mid.b", "zeta"]);
    }

    #[test]
    fn test_divergent_heads_report_both_touched_and_untouched_keys() {
        // One branch edited "title" and kept "note"; the other rewrote
        // "title" and never had "note". A two-tree diff reports both paths.
        let main_head = json!({"title": "A", "note": "x"});
        let alt_head = json!({"title": "B"});
        let entries = diff_trees(&main_head, &alt_head);
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].path, "note");
        assert_eq!(entries[0].conflict_type, ConflictType::MissingInTarget);
        assert_eq!(entries[0].source_value, "x");
        assert_eq!(entries[0].target_value, MISSING);

        assert_eq!(entries[1].path, "title");
        assert_eq!(entries[1].conflict_type, ConflictType::ValueMismatch);
        assert_eq!(entries[1].source_value, "A");
        assert_eq!(entries[1].target_value, "B");
    }
}
