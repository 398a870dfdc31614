use super::*;
use proptest::prelude::*;
use serde_json::json;

fn map(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn patch(value: Value) -> Patch {
    serde_json::from_value(value).unwrap()
}

#[test]
fn add_then_delete_round_trips_to_empty() {
    let mut content = Content::new();
    apply(&mut content, &patch(json!({"added": {"a": 1}}))).unwrap();
    assert_eq!(content, map(json!({"a": 1})));
    apply(&mut content, &patch(json!({"deleted": {"a": null}}))).unwrap();
    assert!(content.is_empty());
}

#[test]
fn nested_maps_merge() {
    let mut content = map(json!({"settings": {"a": 1, "b": {"c": 2}}}));
    apply(
        &mut content,
        &patch(json!({
            "added": {"settings": {"b": {"d": 3}}},
            "updated": {"settings": {"a": 10}}
        })),
    )
    .unwrap();
    assert_eq!(content, map(json!({"settings": {"a": 10, "b": {"c": 2, "d": 3}}})));
}

#[test]
fn lists_are_indexed_by_numeric_keys() {
    let mut content = map(json!({"items": [{"v": 1}, {"v": 2}]}));
    apply(
        &mut content,
        &patch(json!({
            "added": {"items": {"5": {"v": 3}}},
            "updated": {"items": {"0": {"v": 100}}}
        })),
    )
    .unwrap();
    assert_eq!(content, map(json!({"items": [{"v": 100}, {"v": 2}, {"v": 3}]})));
}

#[test]
fn update_of_missing_list_index_fails() {
    let mut content = map(json!({"items": [1]}));
    let err = apply(&mut content, &patch(json!({"updated": {"items": {"3": 4}}}))).unwrap_err();
    assert!(matches!(err, HubError::InvalidPatch(_)));
}

#[test]
fn list_deletions_run_highest_index_first() {
    let mut content = map(json!({"items": ["a", "b", "c", "d"]}));
    apply(&mut content, &patch(json!({"deleted": {"items": {"0": null, "2": null}}}))).unwrap();
    assert_eq!(content, map(json!({"items": ["b", "d"]})));
}

#[test]
fn nested_list_deletes_recurse() {
    let mut content = map(json!({"ports": [{"id": "p1", "label": "x"}]}));
    apply(&mut content, &patch(json!({"deleted": {"ports": {"0": {"label": null}}}}))).unwrap();
    assert_eq!(content, map(json!({"ports": [{"id": "p1"}]})));
}

#[test]
fn bad_list_keys_surface_errors() {
    let mut content = map(json!({"items": [1, 2]}));
    for bad in [
        json!({"deleted": {"items": {"-1": null}}}),
        json!({"deleted": {"items": {"7": null}}}),
        json!({"added": {"items": {"x": 1}}}),
    ] {
        assert!(apply(&mut content.clone(), &patch(bad)).is_err());
    }
    assert!(apply(&mut content, &patch(json!({"deleted": {"items": 3}}))).is_err());
}

#[test]
fn delete_runs_before_add() {
    let mut content = map(json!({"a": {"old": true}}));
    apply(
        &mut content,
        &patch(json!({"deleted": {"a": null}, "added": {"a": {"new": true}}})),
    )
    .unwrap();
    assert_eq!(content, map(json!({"a": {"new": true}})));
}

#[test]
fn applied_leaves_input_untouched() {
    let content = map(json!({"a": 1}));
    let out = applied(&content, &patch(json!({"updated": {"a": 2}}))).unwrap();
    assert_eq!(content["a"], 1);
    assert_eq!(out["a"], 2);
}

proptest! {
    #[test]
    fn adding_then_deleting_fresh_keys_restores_content(keys in proptest::collection::btree_set("[a-z]{1,8}", 1..6)) {
        let original = map(json!({"fixed": [1, 2, 3]}));
        let keys: Vec<String> = keys.into_iter().filter(|k| k != "fixed").collect();
        let mut added = Map::new();
        let mut deleted = Map::new();
        for k in &keys {
            added.insert(k.clone(), json!({"nested": k}));
            deleted.insert(k.clone(), Value::Null);
        }
        let mut content = original.clone();
        apply(&mut content, &Patch { added, ..Patch::default() }).unwrap();
        apply(&mut content, &Patch { deleted, ..Patch::default() }).unwrap();
        prop_assert_eq!(content, original);
    }
}
