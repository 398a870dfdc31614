use super::*;
use crate::node::{new_node_id, AccessControl};
use serde_json::json;

fn content(value: Value) -> Content {
    value.as_object().cloned().unwrap()
}

fn model_referencing(target: &str, tracking: &str, release: Option<u64>) -> Content {
    let mut process = json!({"type": GRAPH_MODEL, "ref": target, "tracking": tracking});
    if let Some(r) = release {
        process["release"] = json!(r);
    }
    content(json!({ "processes": { "p1": process, "calc": {"type": "FORMULA"} } }))
}

#[test]
fn shallow_model_references() {
    let c = model_referencing("b", "FIXED", Some(2));
    let refs = shallow_references(NodeType::Model, &c);
    assert_eq!(
        refs,
        vec![Reference {
            node_id: "b".into(),
            tracking: TrackingMode::Fixed,
            release: Some(2)
        }]
    );
}

#[test]
fn shallow_simulation_references() {
    let c = content(json!({"ref": "m", "forecastSheets": ["s1", "s2", "s1"]}));
    assert_eq!(shallow_dependencies(NodeType::Simulation, &c), vec!["m", "s1", "s2"]);
}

#[test]
fn folders_have_no_references() {
    let c = model_referencing("b", "CURRENT_VERSION", None);
    assert!(shallow_references(NodeType::Folder, &c).is_empty());
}

#[test]
fn deep_dependencies_fold_nested_lists() {
    let c = model_referencing("b", "CURRENT_VERSION", None);
    let mut lookup = HashMap::new();
    lookup.insert(Reference::current("b"), vec!["c".to_string(), "d".to_string()]);
    let deps = deep_dependencies(NodeType::Model, &c, &lookup).unwrap();
    assert_eq!(deps, vec!["c", "d", "b"]);
}

#[test]
fn unresolved_reference_is_invalid() {
    let c = model_referencing("b", "LATEST_RELEASE", None);
    let lookup: HashMap<Reference, Vec<String>> = HashMap::new();
    let err = deep_dependencies(NodeType::Model, &c, &lookup).unwrap_err();
    assert!(matches!(err, HubError::InvalidDependency(_)));
}

#[test]
fn cycle_is_rejected() {
    let c = model_referencing("b", "CURRENT_VERSION", None);
    let mut lookup = HashMap::new();
    lookup.insert(Reference::current("b"), vec!["a".to_string()]);
    let deps = deep_dependencies(NodeType::Model, &c, &lookup).unwrap();
    assert!(matches!(check_acyclic("a", &deps), Err(HubError::CyclicDependency(_))));
    check_acyclic("z", &deps).unwrap();
}

#[test]
fn removed_ports_diff() {
    let old = content(json!({"inports": [{"id": "p1"}, {"id": "p2"}], "outports": [{"id": "o"}]}));
    let new = content(json!({"inports": [{"id": "p2"}], "outports": [{"id": "o"}]}));
    assert_eq!(removed_ports(&old, &new), vec!["p1"]);
    assert!(removed_ports(&new, &old).is_empty());
}

fn dependent(model_id: &str, tracking: &str) -> Node {
    let root = Node::root("admin", AccessControl::PublicReadWrite);
    let mut node = Node::new(new_node_id(), "user".into(), NodeType::Model, "u".into(), &root);
    node.content = content(json!({
        "processes": {"sub": {"type": GRAPH_MODEL, "ref": model_id, "tracking": tracking, "release": 1}},
        "connections": [
            {"from": {"port": "src"}, "to": {"process": "sub", "port": "p1"}},
            {"from": {"process": "sub", "port": "out"}, "to": {"port": "sink"}}
        ]
    }));
    node
}

#[test]
fn dangling_usage_detected_for_live_tracking() {
    let node = dependent("m", "CURRENT_VERSION");
    let usages = dangling_port_usages("m", &["p1".to_string()], &node);
    assert_eq!(usages.len(), 1);
    assert_eq!(usages[0].process_id, "sub");
    assert_eq!(usages[0].port, "p1");
    assert!(dangling_port_usages("m", &["unused".to_string()], &node).is_empty());
}

#[test]
fn fixed_tracking_is_not_affected_by_live_edits() {
    let node = dependent("m", "FIXED");
    assert!(dangling_port_usages("m", &["p1".to_string()], &node).is_empty());
}

#[test]
fn update_dependencies_remaps_refs() {
    let mut c = content(json!({
        "processes": {"p": {"type": GRAPH_MODEL, "ref": "old-b"}},
        "ref": "old-m",
        "forecastSheets": ["old-s", "external"]
    }));
    let mut deps = vec!["old-b".to_string(), "external".to_string()];
    let map: HashMap<String, String> = [("old-b", "new-b"), ("old-m", "new-m"), ("old-s", "new-s")]
        .into_iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect();
    update_dependencies(&mut c, &mut deps, &map);
    assert_eq!(c["processes"]["p"]["ref"], "new-b");
    assert_eq!(c["ref"], "new-m");
    assert_eq!(c["forecastSheets"], json!(["new-s", "external"]));
    assert_eq!(deps, vec!["new-b", "external"]);
}
