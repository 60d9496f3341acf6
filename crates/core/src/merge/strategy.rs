//! Merged-content computation for each merge strategy.
//!
//! Everything here is pure: functions take two content trees (plus caller
//! resolution choices) and return the merged tree, never touching storage.

use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::MergeError;
use crate::models::{ConflictResolution, MergeStrategy, ResolutionData, ValueMergeStrategy};

/// Compute merged content for the given strategy.
///
/// `manual` and `cherry_pick` require resolution data and fail with
/// [`MergeError::MissingResolutionData`] without it.
pub fn compute_merged(
    strategy: MergeStrategy,
    source: &Value,
    target: &Value,
    resolution_data: Option<&ResolutionData>,
) -> Result<Value, MergeError> {
    match strategy {
        MergeStrategy::Manual => {
            let data = resolution_data.ok_or_else(|| {
                MergeError::MissingResolutionData(
                    "manual merge requires per-path resolution data".into(),
                )
            })?;
            Ok(apply_manual(source, target, data))
        }
        MergeStrategy::Auto => Ok(auto_merge(source, target)),
        MergeStrategy::CherryPick => {
            let data = resolution_data.ok_or_else(|| {
                MergeError::MissingResolutionData("cherry-pick requires a list of paths".into())
            })?;
            if data.paths.is_empty() {
                return Err(MergeError::MissingResolutionData(
                    "cherry-pick requires a non-empty list of paths".into(),
                ));
            }
            Ok(cherry_pick(source, target, &data.paths))
        }
    }
}

/// Recursive structural merge with the destination branch in charge: keys
/// only the source has are added, equal values are untouched, and on any
/// other disagreement the target's value wins.
pub fn auto_merge(source: &Value, target: &Value) -> Value {
    match (source, target) {
        (Value::Object(source_map), Value::Object(target_map)) => {
            let mut merged = target_map.clone();
            for (key, source_val) in source_map {
                match target_map.get(key) {
                    Some(target_val) if source_val != target_val => {
                        merged.insert(key.clone(), auto_merge(source_val, target_val));
                    }
                    Some(_) => {}
                    None => {
                        merged.insert(key.clone(), source_val.clone());
                    }
                }
            }
            Value::Object(merged)
        }
        _ => target.clone(),
    }
}

/// Start from the target tree and overlay the caller's per-path choices.
///
/// `take_source` copies the source's value to the path, or removes the key
/// when the source has none. `take_target` keeps the target's state.
/// `merge` combines both values via [`merge_values`].
pub fn apply_manual(source: &Value, target: &Value, data: &ResolutionData) -> Value {
    let mut merged = target.clone();
    for (path, choice) in &data.choices {
        match choice.choice {
            ConflictResolution::TakeTarget => {}
            ConflictResolution::TakeSource => match get_path(source, path) {
                Some(value) => set_path(&mut merged, path, value.clone()),
                None => remove_path(&mut merged, path),
            },
            ConflictResolution::Merge => {
                let source_val = get_path(source, path).cloned().unwrap_or(Value::Null);
                let target_val = get_path(target, path).cloned().unwrap_or(Value::Null);
                debug!(path, "combining values for merge choice");
                set_path(
                    &mut merged,
                    path,
                    merge_values(&source_val, &target_val, choice.merge_strategy),
                );
            }
        }
    }
    merged
}

/// Copy only the named paths from the source onto a copy of the target. A
/// named path the source lacks is removed, so deletions can be picked too.
pub fn cherry_pick(source: &Value, target: &Value, paths: &[String]) -> Value {
    let mut merged = target.clone();
    for path in paths {
        match get_path(source, path) {
            Some(value) => set_path(&mut merged, path, value.clone()),
            None => remove_path(&mut merged, path),
        }
    }
    merged
}

/// Combine two values for an explicit `merge` choice.
///
/// Without an override: strings join target-first with a blank line, lists
/// union target-first, maps union recursively, and any other pair takes the
/// source value (a merge choice pulls incoming content).
pub fn merge_values(
    source: &Value,
    target: &Value,
    strategy: Option<ValueMergeStrategy>,
) -> Value {
    match strategy {
        Some(ValueMergeStrategy::SourceWins) => source.clone(),
        Some(ValueMergeStrategy::TargetWins) => target.clone(),
        Some(ValueMergeStrategy::Concat) | Some(ValueMergeStrategy::Union) | None => {
            combine(source, target)
        }
    }
}

fn combine(source: &Value, target: &Value) -> Value {
    match (source, target) {
        (Value::String(source_text), Value::String(target_text)) => {
            Value::String(format!("{target_text}\n\n{source_text}"))
        }
        (Value::Array(source_items), Value::Array(target_items)) => {
            let mut merged = target_items.clone();
            for item in source_items {
                if !merged.contains(item) {
                    merged.push(item.clone());
                }
            }
            Value::Array(merged)
        }
        (Value::Object(source_map), Value::Object(target_map)) => {
            let mut merged = target_map.clone();
            for (key, source_val) in source_map {
                match target_map.get(key) {
                    Some(target_val) => {
                        merged.insert(key.clone(), combine(source_val, target_val));
                    }
                    None => {
                        merged.insert(key.clone(), source_val.clone());
                    }
                }
            }
            Value::Object(merged)
        }
        _ => source.clone(),
    }
}

// ---------------------------------------------------------------------------
// Dotted-path helpers
// ---------------------------------------------------------------------------

/// Resolve a dotted path against a tree.
pub fn get_path<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Write a value at a dotted path, creating intermediate maps as needed and
/// replacing non-map intermediates.
fn set_path(root: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let (last, parents) = match segments.split_last() {
        Some((last, parents)) => (*last, parents),
        None => return,
    };

    let mut current = root;
    for &segment in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        current = match current.as_object_mut() {
            Some(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            None => return,
        };
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Some(map) = current.as_object_mut() {
        map.insert(last.to_string(), value);
    }
}

/// Remove the key at a dotted path, if present.
fn remove_path(root: &mut Value, path: &str) {
    let segments: Vec<&str> = path.split('.').collect();
    let (last, parents) = match segments.split_last() {
        Some((last, parents)) => (*last, parents),
        None => return,
    };

    let mut current = root;
    for &segment in parents {
        current = match current.as_object_mut().and_then(|map| map.get_mut(segment)) {
            Some(next) => next,
            None => return,
        };
    }
    if let Some(map) = current.as_object_mut() {
        map.remove(last);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PathChoice;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn manual_data(
        choices: Vec<(&str, ConflictResolution, Option<ValueMergeStrategy>)>,
    ) -> ResolutionData {
        let mut map = BTreeMap::new();
        for (path, choice, merge_strategy) in choices {
            map.insert(
                path.to_string(),
                PathChoice {
                    choice,
                    merge_strategy,
                },
            );
        }
        ResolutionData {
            choices: map,
            paths: vec![],
        }
    }

    #[test]
    fn test_auto_merge_adds_source_only_keys() {
        let source = json!({"title": "A", "note": "x"});
        let target = json!({"title": "A"});
        assert_eq!(
            auto_merge(&source, &target),
            json!({"title": "A", "note": "x"})
        );
    }

    #[test]
    fn test_auto_merge_target_wins_scalar_conflicts() {
        let source = json!({"title": "B"});
        let target = json!({"title": "A"});
        assert_eq!(auto_merge(&source, &target), json!({"title": "A"}));
    }

    #[test]
    fn test_auto_merge_recurses_into_nested_maps() {
        let source = json!({"npc": {"name": "Niv", "hp": 12}});
        let target = json!({"npc": {"name": "Marglar"}});
        assert_eq!(
            auto_merge(&source, &target),
            json!({"npc": {"name": "Marglar", "hp": 12}})
        );
    }

    #[test]
    fn test_auto_merge_keeps_target_only_keys() {
        let source = json!({});
        let target = json!({"secret": "the lich lives"});
        assert_eq!(
            auto_merge(&source, &target),
            json!({"secret": "the lich lives"})
        );
    }

    #[test]
    fn test_manual_take_source_overlays_value() {
        let source = json!({"title": "B"});
        let target = json!({"title": "A"});
        let data = manual_data(vec![("title", ConflictResolution::TakeSource, None)]);
        assert_eq!(apply_manual(&source, &target, &data), json!({"title": "B"}));
    }

    #[test]
    fn test_manual_take_source_removes_missing_key() {
        let source = json!({"title": "A"});
        let target = json!({"title": "A", "note": "x"});
        let data = manual_data(vec![("note", ConflictResolution::TakeSource, None)]);
        assert_eq!(apply_manual(&source, &target, &data), json!({"title": "A"}));
    }

    #[test]
    fn test_manual_take_target_keeps_value() {
        let source = json!({"title": "B"});
        let target = json!({"title": "A"});
        let data = manual_data(vec![("title", ConflictResolution::TakeTarget, None)]);
        assert_eq!(apply_manual(&source, &target, &data), json!({"title": "A"}));
    }

    #[test]
    fn test_manual_merge_choice_concatenates_strings() {
        let source = json!({"story": "The dragon wins."});
        let target = json!({"story": "The party flees."});
        let data = manual_data(vec![("story", ConflictResolution::Merge, None)]);
        assert_eq!(
            apply_manual(&source, &target, &data),
            json!({"story": "The party flees.\n\nThe dragon wins."})
        );
    }

    #[test]
    fn test_manual_merge_choice_respects_override() {
        let source = json!({"story": "The dragon wins."});
        let target = json!({"story": "The party flees."});
        let data = manual_data(vec![(
            "story",
            ConflictResolution::Merge,
            Some(ValueMergeStrategy::SourceWins),
        )]);
        assert_eq!(
            apply_manual(&source, &target, &data),
            json!({"story": "The dragon wins."})
        );
    }

    #[test]
    fn test_manual_nested_path() {
        let source = json!({"npc": {"name": "Niv"}});
        let target = json!({"npc": {"name": "Marglar"}, "title": "A"});
        let data = manual_data(vec![("npc.name", ConflictResolution::TakeSource, None)]);
        assert_eq!(
            apply_manual(&source, &target, &data),
            json!({"npc": {"name": "Niv"}, "title": "A"})
        );
    }

    #[test]
    fn test_merge_values_list_union_is_target_first() {
        let source = json!(["goblin", "dragon"]);
        let target = json!(["dragon", "kobold"]);
        assert_eq!(
            merge_values(&source, &target, None),
            json!(["dragon", "kobold", "goblin"])
        );
    }

    #[test]
    fn test_merge_values_map_union_recurses() {
        let source = json!({"a": "1", "shared": {"x": "s"}});
        let target = json!({"b": "2", "shared": {"x": "t", "y": "t"}});
        assert_eq!(
            merge_values(&source, &target, None),
            json!({"a": "1", "b": "2", "shared": {"x": "t\n\ns", "y": "t"}})
        );
    }

    #[test]
    fn test_merge_values_scalar_pair_takes_source() {
        assert_eq!(merge_values(&json!(2), &json!(1), None), json!(2));
        assert_eq!(merge_values(&json!(true), &json!(false), None), json!(true));
    }

    #[test]
    fn test_cherry_pick_copies_named_paths_only() {
        let source = json!({"title": "B", "note": "x", "npc": {"name": "Niv"}});
        let target = json!({"title": "A", "secret": "kept"});
        let merged = cherry_pick(&source, &target, &["title".into(), "npc.name".into()]);
        assert_eq!(
            merged,
            json!({"title": "B", "secret": "kept", "npc": {"name": "Niv"}})
        );
    }

    #[test]
    fn test_cherry_pick_of_absent_path_removes_key() {
        let source = json!({"title": "A"});
        let target = json!({"title": "A", "note": "x"});
        let merged = cherry_pick(&source, &target, &["note".into()]);
        assert_eq!(merged, json!({"title": "A"}));
    }

    #[test]
    fn test_compute_merged_requires_resolution_data() {
        let content = json!({"title": "A"});
        let err = compute_merged(MergeStrategy::Manual, &content, &content, None).unwrap_err();
        assert!(matches!(err, MergeError::MissingResolutionData(_)));

        let err = compute_merged(MergeStrategy::CherryPick, &content, &content, None).unwrap_err();
        assert!(matches!(err, MergeError::MissingResolutionData(_)));

        let empty = ResolutionData::default();
        let err = compute_merged(MergeStrategy::CherryPick, &content, &content, Some(&empty))
            .unwrap_err();
        assert!(matches!(err, MergeError::MissingResolutionData(_)));
    }

    #[test]
    fn test_set_path_creates_intermediate_maps() {
        let mut root = json!({});
        set_path(&mut root, "npc.stats.hp", json!(12));
        assert_eq!(root, json!({"npc": {"stats": {"hp": 12}}}));
    }

    #[test]
    fn test_get_path_on_non_map_is_none() {
        let root = json!({"title": "A"});
        assert!(get_path(&root, "title.deeper").is_none());
        assert!(get_path(&root, "absent").is_none());
    }
}
