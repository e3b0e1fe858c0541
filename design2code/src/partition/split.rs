use design2code_sdk::DesignNode;
use serde::Serialize;

use super::arena::Arena;

/// One independently processable piece of a design tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fragment {
    pub id: String,
    pub node: DesignNode,
}

/// Ordered fragments of a tree; the reduced root is always the last entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Partition {
    entries: Vec<Fragment>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fragment> {
        self.entries.iter()
    }

    pub fn get(&self, id: &str) -> Option<&DesignNode> {
        self.entries.iter().find(|f| f.id == id).map(|f| &f.node)
    }

    /// The residual skeleton
    pub fn root(&self) -> Option<&Fragment> {
        self.entries.last()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|f| f.id.as_str()).collect()
    }

    pub fn into_entries(self) -> Vec<Fragment> {
        self.entries
    }
}

/// Splits a design tree into fragments bounded by a share of the root's area
#[derive(Debug, Clone, Copy)]
pub struct Partitioner {
    split_divisor: f64,
}

impl Default for Partitioner {
    fn default() -> Self {
        Self::new(10.0)
    }
}

impl Partitioner {
    pub fn new(split_divisor: f64) -> Self {
        Self { split_divisor }
    }

    pub fn partition(&self, root: &DesignNode) -> Partition {
        let root_width = root.width();
        let root_height = root.height();
        let total_area = root_width * root_height;
        if total_area <= 0.0 {
            return Partition {
                entries: vec![Fragment {
                    id: root.id.clone(),
                    node: root.clone(),
                }],
            };
        }

        let split_threshold = total_area / self.split_divisor;
        let mut arena = Arena::build(root);
        let mut extracted = Vec::new();

        // Pass 1: pull out small nodes, only descending into the ones kept
        let mut pending: Vec<usize> = arena.children(Arena::ROOT).iter().rev().copied().collect();
        while let Some(idx) = pending.pop() {
            let node = arena.node(idx);
            if node.area() < split_threshold
                && node.width() < root_width
                && node.height() < root_height
            {
                arena.detach(idx);
                extracted.push(idx);
            } else {
                pending.extend(arena.children(idx).iter().rev().copied());
            }
        }

        // Pass 2: cap what remains, children before parents
        let large_threshold = total_area / 3.0;
        for idx in arena.post_order(Arena::ROOT) {
            if idx != Arena::ROOT && arena.node(idx).area() >= large_threshold {
                arena.detach(idx);
                extracted.push(idx);
            }
        }

        tracing::debug!(
            "Partitioned {} into {} fragments plus skeleton",
            root.id,
            extracted.len()
        );

        let mut entries: Vec<Fragment> = extracted
            .into_iter()
            .chain(std::iter::once(Arena::ROOT))
            .map(|idx| {
                let mut node = arena.materialize(idx);
                apply_full_bleed(&mut node, root_width, root_height);
                Fragment {
                    id: node.id.clone(),
                    node,
                }
            })
            .collect();
        entries.shrink_to_fit();
        Partition { entries }
    }
}

/// Mark nodes spanning the root's width or height as filling their parent
fn apply_full_bleed(node: &mut DesignNode, root_width: f64, root_height: f64) {
    if node.absolute_bounding_box.is_some() {
        if node.width() >= root_width {
            node.layout.layout_sizing_horizontal = Some("FILL".to_string());
            node.layout.layout_align = Some("STRETCH".to_string());
        }
        if node.height() == root_height {
            node.layout.layout_sizing_vertical = Some("FILL".to_string());
        }
    }
    for child in &mut node.children {
        apply_full_bleed(child, root_width, root_height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn ids_of(partition: &Partition) -> BTreeSet<String> {
        partition.iter().flat_map(|f| f.node.ids()).collect()
    }

    #[test]
    fn test_three_small_children_become_fragments() {
        let root = DesignNode::new("0:1", "FRAME")
            .with_bounds(0.0, 0.0, 1000.0, 2000.0)
            .with_children(vec![
                DesignNode::new("1:1", "FRAME").with_bounds(0.0, 0.0, 100.0, 500.0),
                DesignNode::new("1:2", "FRAME").with_bounds(0.0, 500.0, 250.0, 200.0),
                DesignNode::new("1:3", "FRAME").with_bounds(0.0, 700.0, 500.0, 100.0),
            ]);

        let partition = Partitioner::default().partition(&root);
        assert_eq!(partition.ids(), vec!["1:1", "1:2", "1:3", "0:1"]);

        let skeleton = &partition.root().unwrap().node;
        assert!(skeleton.children.is_empty());
        assert_eq!(skeleton.fragment_refs, vec!["1:1", "1:2", "1:3"]);
    }

    #[test]
    fn test_degenerate_root_is_returned_unchanged() {
        let root = DesignNode::new("0:1", "FRAME")
            .with_bounds(0.0, 0.0, 0.0, 100.0)
            .with_children(vec![DesignNode::new("1:1", "TEXT").with_bounds(0.0, 0.0, 1.0, 1.0)]);
        let partition = Partitioner::default().partition(&root);
        assert_eq!(partition.len(), 1);
        assert_eq!(partition.get("0:1"), Some(&root));

        let no_bounds = DesignNode::new("0:2", "FRAME");
        assert_eq!(Partitioner::default().partition(&no_bounds).len(), 1);
    }

    #[test]
    fn test_same_size_wrapper_is_descended_not_extracted() {
        // 100x1000 screen wrapped in a full-size group
        let root = DesignNode::new("root", "FRAME")
            .with_bounds(0.0, 0.0, 100.0, 1000.0)
            .with_children(vec![DesignNode::new("wrap", "GROUP")
                .with_bounds(0.0, 0.0, 100.0, 1000.0)
                .with_children(vec![
                    DesignNode::new("icon", "VECTOR").with_bounds(0.0, 0.0, 10.0, 10.0),
                    DesignNode::new("hero", "FRAME").with_bounds(0.0, 10.0, 90.0, 500.0),
                ])]);

        let partition = Partitioner::default().partition(&root);
        // icon is small, hero is over a third of the root, wrap is full-size
        // and therefore over a third too
        assert_eq!(partition.ids(), vec!["icon", "hero", "wrap", "root"]);
        let wrap = partition.get("wrap").unwrap();
        assert!(wrap.children.is_empty());
        assert_eq!(wrap.fragment_refs, vec!["icon", "hero"]);
        assert_eq!(partition.get("root").unwrap().fragment_refs, vec!["wrap"]);
    }

    #[test]
    fn test_partition_covers_every_node_once() {
        let root = DesignNode::new("r", "FRAME")
            .with_bounds(0.0, 0.0, 400.0, 800.0)
            .with_children(vec![
                DesignNode::new("header", "FRAME")
                    .with_bounds(0.0, 0.0, 400.0, 100.0)
                    .with_children(vec![
                        DesignNode::new("logo", "VECTOR").with_bounds(10.0, 10.0, 40.0, 40.0),
                        DesignNode::new("title", "TEXT").with_bounds(60.0, 10.0, 200.0, 40.0),
                    ]),
                DesignNode::new("body", "FRAME")
                    .with_bounds(0.0, 100.0, 400.0, 600.0)
                    .with_children(vec![
                        DesignNode::new("card", "FRAME").with_bounds(0.0, 100.0, 300.0, 200.0),
                        DesignNode::new("list", "FRAME")
                            .with_bounds(0.0, 300.0, 400.0, 400.0)
                            .with_children(vec![DesignNode::new("row", "FRAME")
                                .with_bounds(0.0, 300.0, 400.0, 40.0)]),
                    ]),
            ]);

        let partition = Partitioner::default().partition(&root);
        let expected: BTreeSet<String> = root.ids().into_iter().collect();
        assert_eq!(ids_of(&partition), expected);

        let total: usize = partition.iter().map(|f| f.node.node_count()).sum();
        assert_eq!(total, root.node_count());

        let root_area = root.area();
        assert!(partition.iter().all(|f| f.node.area() <= root_area));
        let root_positions: Vec<usize> = partition
            .ids()
            .iter()
            .enumerate()
            .filter(|(_, id)| **id == "r")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(root_positions, vec![partition.len() - 1]);
    }

    #[test]
    fn test_full_bleed_hints_in_every_fragment() {
        let root = DesignNode::new("r", "FRAME")
            .with_bounds(0.0, 0.0, 400.0, 800.0)
            .with_children(vec![
                DesignNode::new("bar", "FRAME").with_bounds(0.0, 0.0, 400.0, 50.0),
                DesignNode::new("hero", "FRAME").with_bounds(0.0, 50.0, 400.0, 300.0),
                DesignNode::new("side", "FRAME")
                    .with_bounds(0.0, 0.0, 100.0, 800.0)
                    .with_children(vec![
                        DesignNode::new("strip", "FRAME").with_bounds(0.0, 0.0, 100.0, 800.0),
                    ]),
            ]);

        let partition = Partitioner::default().partition(&root);
        assert_eq!(partition.ids(), vec!["hero", "r"]);

        let hero = partition.get("hero").unwrap();
        assert_eq!(hero.layout.layout_sizing_horizontal.as_deref(), Some("FILL"));
        assert_eq!(hero.layout.layout_align.as_deref(), Some("STRETCH"));
        assert!(hero.layout.layout_sizing_vertical.is_none());

        let skeleton = &partition.root().unwrap().node;
        let bar = skeleton.find("bar").unwrap();
        assert_eq!(bar.layout.layout_sizing_horizontal.as_deref(), Some("FILL"));
        assert_eq!(skeleton.layout.layout_sizing_horizontal.as_deref(), Some("FILL"));
        assert_eq!(skeleton.layout.layout_sizing_vertical.as_deref(), Some("FILL"));

        for fragment in partition.iter() {
            if let Some(strip) = fragment.node.find("strip") {
                assert_eq!(strip.layout.layout_sizing_vertical.as_deref(), Some("FILL"));
                assert!(strip.layout.layout_sizing_horizontal.is_none());
            }
        }
    }

    #[test]
    fn test_input_is_not_mutated() {
        let root = DesignNode::new("r", "FRAME")
            .with_bounds(0.0, 0.0, 100.0, 100.0)
            .with_children(vec![DesignNode::new("c", "TEXT").with_bounds(0.0, 0.0, 10.0, 10.0)]);
        let copy = root.clone();
        let _ = Partitioner::default().partition(&root);
        assert_eq!(root, copy);
    }
}
