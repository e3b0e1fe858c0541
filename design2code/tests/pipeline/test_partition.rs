//! Partitioning Figma-shaped JSON

use design2code::partition::{collect_image_assets, node_ids, prune, Partitioner};
use design2code_sdk::DesignNode;
use serde_json::json;
use std::collections::BTreeSet;

fn child(id: &str, x: f64, y: f64, w: f64, h: f64) -> serde_json::Value {
    json!({
        "id": id, "name": id, "type": "FRAME", "cornerRadius": 8,
        "absoluteBoundingBox": {"x": x, "y": y, "width": w, "height": h}
    })
}

fn page(children: Vec<serde_json::Value>) -> DesignNode {
    serde_json::from_value(json!({
        "id": "0:1", "name": "Page", "type": "FRAME",
        "absoluteBoundingBox": {"x": 0.0, "y": 0.0, "width": 1000.0, "height": 2000.0},
        "children": children
    }))
    .unwrap()
}

#[test]
fn test_three_small_children_leave_an_empty_skeleton() {
    let root = page(vec![
        child("1:1", 0.0, 0.0, 250.0, 200.0),
        child("1:2", 0.0, 300.0, 250.0, 200.0),
        child("1:3", 0.0, 600.0, 250.0, 200.0),
    ]);
    let partition = Partitioner::default().partition(&prune(&root));

    assert_eq!(partition.ids(), vec!["1:1", "1:2", "1:3", "0:1"]);
    let skeleton = &partition.root().unwrap().node;
    assert!(skeleton.children.is_empty());
    assert_eq!(skeleton.fragment_refs, vec!["1:1", "1:2", "1:3"]);

    // Unknown Figma fields ride along
    assert_eq!(partition.get("1:2").unwrap().extra["cornerRadius"], json!(8));
}

#[test]
fn test_fragments_cover_the_pruned_tree() {
    let mut body = child("2:1", 0.0, 400.0, 1000.0, 1200.0);
    body["children"] = json!([
        child("3:1", 10.0, 410.0, 100.0, 100.0),
        child("3:2", 10.0, 600.0, 980.0, 900.0),
    ]);
    let root = page(vec![
        child("1:1", 0.0, 0.0, 1000.0, 80.0),
        body,
        child("9:9", 1200.0, 0.0, 100.0, 100.0),
    ]);
    let pruned = prune(&root);
    assert!(!node_ids(&pruned).contains("9:9"));

    let partition = Partitioner::default().partition(&pruned);
    let total = pruned.area();
    let mut covered = BTreeSet::new();
    for fragment in partition.iter() {
        assert!(fragment.node.area() <= total);
        for id in fragment.node.ids() {
            assert!(covered.insert(id.clone()), "{} appears twice", id);
        }
    }
    assert_eq!(covered, node_ids(&pruned));
    assert_eq!(partition.ids().last(), Some(&"0:1"));
    assert_eq!(partition.iter().filter(|f| f.id == "0:1").count(), 1);
}

#[test]
fn test_full_width_nodes_fill_the_parent() {
    let root = page(vec![child("1:1", 0.0, 0.0, 1000.0, 80.0)]);
    let partition = Partitioner::default().partition(&root);
    let header = partition.root().unwrap().node.find("1:1").unwrap();
    assert_eq!(header.layout.layout_sizing_horizontal.as_deref(), Some("FILL"));
    assert_eq!(header.layout.layout_align.as_deref(), Some("STRETCH"));
}

#[test]
fn test_image_fills_become_assets() {
    let mut photo = child("1:5", 0.0, 0.0, 100.0, 100.0);
    photo["fills"] = json!([{"type": "IMAGE", "imageRef": "f00d", "scaleMode": "FILL"}]);
    let root = page(vec![photo, child("1:6", 0.0, 200.0, 100.0, 100.0)]);

    let assets = collect_image_assets(&root);
    assert_eq!(assets.len(), 1);
    assert_eq!(assets["1:5"], "img_f00d");
}
