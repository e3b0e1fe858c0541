//! Removal of nodes that can never be rendered

use design2code_sdk::DesignNode;

/// Visible area of the root: nodes starting at or past these edges are dropped
#[derive(Debug, Clone, Copy)]
struct Viewport {
    right: f64,
    bottom: f64,
}

/// Copy of `root` without invisible, zero-sized or off-screen nodes
///
/// A removed node takes its whole subtree with it. The root itself is always
/// kept; nodes without a bounding box are only checked for visibility.
pub fn prune(root: &DesignNode) -> DesignNode {
    let viewport = root.absolute_bounding_box.map(|b| Viewport {
        right: b.right(),
        bottom: b.bottom(),
    });
    let mut pruned = shallow_copy(root);
    pruned.children = root
        .children
        .iter()
        .filter_map(|child| prune_node(child, viewport))
        .collect();
    pruned
}

fn prune_node(node: &DesignNode, viewport: Option<Viewport>) -> Option<DesignNode> {
    if !node.visible {
        tracing::debug!("Pruning invisible node {}", node.id);
        return None;
    }
    if let Some(bounds) = node.absolute_bounding_box {
        if bounds.width == 0.0 || bounds.height == 0.0 {
            tracing::debug!(
                "Pruning zero-sized node {} ({}x{})",
                node.id,
                bounds.width,
                bounds.height
            );
            return None;
        }
        if let Some(viewport) = viewport {
            if bounds.y >= viewport.bottom || bounds.x >= viewport.right {
                tracing::debug!("Pruning off-screen node {}", node.id);
                return None;
            }
        }
    }

    let mut kept = shallow_copy(node);
    kept.children = node
        .children
        .iter()
        .filter_map(|child| prune_node(child, viewport))
        .collect();
    Some(kept)
}

/// Clone a node's own attributes, leaving its children empty
pub(crate) fn shallow_copy(node: &DesignNode) -> DesignNode {
    DesignNode {
        id: node.id.clone(),
        name: node.name.clone(),
        node_type: node.node_type.clone(),
        visible: node.visible,
        absolute_bounding_box: node.absolute_bounding_box,
        fills: node.fills.clone(),
        layout: node.layout.clone(),
        children: Vec::new(),
        fragment_refs: node.fragment_refs.clone(),
        extra: node.extra.clone(),
    }
}
