use design2code_sdk::DesignNode;

use super::prune::shallow_copy;

/// Flat copy of a design tree with index-based parent/child links
pub(crate) struct Arena {
    slots: Vec<Slot>,
}

struct Slot {
    node: DesignNode,
    parent: Option<usize>,
    children: Vec<usize>,
}

impl Arena {
    pub const ROOT: usize = 0;

    pub fn build(root: &DesignNode) -> Self {
        let mut arena = Self {
            slots: Vec::with_capacity(root.node_count()),
        };
        arena.insert(root, None);
        arena
    }

    fn insert(&mut self, node: &DesignNode, parent: Option<usize>) -> usize {
        let idx = self.slots.len();
        self.slots.push(Slot {
            node: shallow_copy(node),
            parent,
            children: Vec::with_capacity(node.children.len()),
        });
        for child in &node.children {
            let child_idx = self.insert(child, Some(idx));
            self.slots[idx].children.push(child_idx);
        }
        idx
    }

    pub fn node(&self, idx: usize) -> &DesignNode {
        &self.slots[idx].node
    }

    pub fn children(&self, idx: usize) -> &[usize] {
        &self.slots[idx].children
    }

    /// Cut `idx` loose from its parent, leaving its id as a placeholder
    pub fn detach(&mut self, idx: usize) {
        let Some(parent) = self.slots[idx].parent.take() else {
            return;
        };
        let id = self.slots[idx].node.id.clone();
        let parent_slot = &mut self.slots[parent];
        parent_slot.children.retain(|&child| child != idx);
        parent_slot.node.fragment_refs.push(id);
    }

    /// Indices of the subtree under `idx`, children before parents
    pub fn post_order(&self, idx: usize) -> Vec<usize> {
        let mut order = Vec::new();
        self.collect_post_order(idx, &mut order);
        order
    }

    fn collect_post_order(&self, idx: usize, order: &mut Vec<usize>) {
        for &child in &self.slots[idx].children {
            self.collect_post_order(child, order);
        }
        order.push(idx);
    }

    /// Rebuild the owned subtree rooted at `idx`
    pub fn materialize(&self, idx: usize) -> DesignNode {
        let slot = &self.slots[idx];
        let mut node = slot.node.clone();
        node.children = slot
            .children
            .iter()
            .map(|&child| self.materialize(child))
            .collect();
        node
    }
}
