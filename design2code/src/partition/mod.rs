//! Design tree decomposition
//!
//! - **prune**: drop nodes that can never be rendered
//! - **split**: cut an oversized tree into area-bounded fragments
//! - asset helpers used when exporting bitmaps

mod arena;
pub mod prune;
pub mod split;

use design2code_sdk::DesignNode;
use std::collections::{BTreeMap, BTreeSet};

pub use prune::prune;
pub use split::{Fragment, Partition, Partitioner};

/// Nodes filled with a bitmap, mapped to the asset name they export as
pub fn collect_image_assets(root: &DesignNode) -> BTreeMap<String, String> {
    let mut assets = BTreeMap::new();
    walk_images(root, &mut assets);
    assets
}

fn walk_images(node: &DesignNode, assets: &mut BTreeMap<String, String>) {
    if let Some(image_ref) = node.image_ref() {
        assets.insert(node.id.clone(), format!("img_{}", image_ref));
    }
    for child in &node.children {
        walk_images(child, assets);
    }
}

pub fn node_ids(root: &DesignNode) -> BTreeSet<String> {
    root.ids().into_iter().collect()
}
