//! Content tree construction from the flat entry sequence.

use std::collections::HashMap;

use super::{
    ContainerFlags, ContainerHierarchy, ContainerKind, ContentRef, FLOAT_IMAGE_MARGIN_LH,
};

pub type NodeId = usize;

/// Wrapper-child leaf indices pack `(parent_index, child_index)` into one
/// integer; top-level entries use their position directly and stay below
/// this bit.
const CHILD_INDEX_SHIFT: u32 = 20;
const CHILD_INDEX_MASK: i64 = (1 << CHILD_INDEX_SHIFT) - 1;

/// Encode a wrapper child's leaf index.
pub fn encode_child_index(parent_index: i64, child_index: usize) -> i64 {
    ((parent_index + 1) << CHILD_INDEX_SHIFT) | child_index as i64
}

/// Decode a leaf index back to `(top-level index)` or
/// `(parent_index, child_index)`.
pub fn decode_index(index: i64) -> (i64, Option<usize>) {
    if index < (1 << CHILD_INDEX_SHIFT) {
        (index, None)
    } else {
        (
            (index >> CHILD_INDEX_SHIFT) - 1,
            Some((index & CHILD_INDEX_MASK) as usize),
        )
    }
}

#[derive(Debug)]
pub enum NodeData {
    Container {
        container_id: u64,
        kind: ContainerKind,
        flags: ContainerFlags,
        /// Index of the wrapper entry backing this container, if any.
        wrapper_index: Option<i64>,
    },
    Leaf {
        index: i64,
        element_id: u64,
        content_type: u64,
        style: String,
        has_break_after_avoid: bool,
        strip_margin_bottom: bool,
        empty_line_margin_top: Option<f64>,
        empty_line_margin_bottom: Option<f64>,
        is_float_image: bool,
        has_content: bool,
    },
}

/// One node of the content tree. Parent links are observational only; a
/// container owns its children exclusively through `children`.
#[derive(Debug)]
pub struct ContentNode {
    pub data: NodeData,
    pub entry_order: u64,
    pub margin_top: Option<f64>,
    pub margin_bottom: Option<f64>,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
}

impl ContentNode {
    pub fn is_container(&self) -> bool {
        matches!(self.data, NodeData::Container { .. })
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.data, NodeData::Leaf { .. })
    }

    pub fn is_float_image(&self) -> bool {
        matches!(
            self.data,
            NodeData::Leaf {
                is_float_image: true,
                ..
            }
        )
    }

    pub fn flags(&self) -> ContainerFlags {
        match &self.data {
            NodeData::Container { flags, .. } => *flags,
            NodeData::Leaf { .. } => ContainerFlags::NONE,
        }
    }

    pub fn kind(&self) -> ContainerKind {
        match &self.data {
            NodeData::Container { kind, .. } => *kind,
            NodeData::Leaf { .. } => ContainerKind::Root,
        }
    }

    pub fn wrapper_index(&self) -> Option<i64> {
        match &self.data {
            NodeData::Container { wrapper_index, .. } => *wrapper_index,
            NodeData::Leaf { .. } => None,
        }
    }

    pub fn leaf_index(&self) -> Option<i64> {
        match &self.data {
            NodeData::Leaf { index, .. } => Some(*index),
            NodeData::Container { .. } => None,
        }
    }

    pub fn leaf_style(&self) -> Option<&str> {
        match &self.data {
            NodeData::Leaf { style, .. } => Some(style),
            NodeData::Container { .. } => None,
        }
    }

    pub fn content_type(&self) -> u64 {
        match &self.data {
            NodeData::Leaf { content_type, .. } => *content_type,
            NodeData::Container { .. } => 0,
        }
    }
}

/// The content tree: an arena of nodes rooted at index 0.
#[derive(Debug)]
pub struct ContentTree {
    nodes: Vec<ContentNode>,
    /// container_id -> node
    containers: HashMap<u64, NodeId>,
    /// wrapper entry index -> container node
    wrappers: HashMap<i64, NodeId>,
}

pub const ROOT: NodeId = 0;

impl ContentTree {
    /// Build the tree from the flat entry sequence and the container
    /// hierarchy.
    pub fn build(content_refs: &[ContentRef], hierarchy: &ContainerHierarchy) -> Self {
        let mut tree = Self {
            nodes: vec![ContentNode {
                data: NodeData::Container {
                    container_id: 0,
                    kind: ContainerKind::Root,
                    flags: ContainerFlags::NONE,
                    wrapper_index: None,
                },
                entry_order: 0,
                margin_top: None,
                margin_bottom: None,
                children: Vec::new(),
                parent: None,
            }],
            containers: HashMap::new(),
            wrappers: HashMap::new(),
        };
        tree.containers.insert(0, ROOT);

        // Virtual container nodes, ascending by id: parents come first.
        for (&container_id, info) in hierarchy.iter() {
            let parent = tree.containers.get(&info.parent_id).copied().unwrap_or(ROOT);
            let node = tree.push_node(
                ContentNode {
                    data: NodeData::Container {
                        container_id,
                        kind: info.kind,
                        flags: info.flags,
                        wrapper_index: None,
                    },
                    entry_order: info.entry_order,
                    margin_top: info.margin_top,
                    margin_bottom: info.margin_bottom,
                    children: Vec::new(),
                    parent: Some(parent),
                },
                parent,
            );
            tree.containers.insert(container_id, node);
        }

        for (index, entry) in content_refs.iter().enumerate() {
            tree.attach_entry(entry, index as i64);
        }

        tree.sort_children_by_entry_order();
        tree
    }

    fn attach_entry(&mut self, entry: &ContentRef, index: i64) {
        if entry.is_wrapper() {
            // The wrapper stands for the virtual container holding its
            // children; its margins land there and the wrapper is recorded
            // for style write-back.
            let container_id = entry.child_refs[0].container_id;
            let Some(&node) = self.containers.get(&container_id) else {
                log::warn!("wrapper entry references unknown container {container_id}");
                return;
            };
            if entry.margin_top.is_some() {
                self.nodes[node].margin_top = entry.margin_top;
            }
            if entry.margin_bottom.is_some() {
                self.nodes[node].margin_bottom = entry.margin_bottom;
            }
            if let NodeData::Container { wrapper_index, .. } = &mut self.nodes[node].data {
                *wrapper_index = Some(index);
            }
            self.wrappers.insert(index, node);

            for (child_pos, child) in entry.child_refs.iter().enumerate() {
                self.attach_entry(child, encode_child_index(index, child_pos));
            }
            return;
        }

        let parent = self
            .containers
            .get(&entry.container_id)
            .copied()
            .unwrap_or(ROOT);
        let (margin_top, margin_bottom) = if entry.is_float_image {
            (Some(FLOAT_IMAGE_MARGIN_LH), Some(FLOAT_IMAGE_MARGIN_LH))
        } else {
            (entry.margin_top, entry.margin_bottom)
        };
        self.push_node(
            ContentNode {
                data: NodeData::Leaf {
                    index,
                    element_id: entry.element_id,
                    content_type: entry.content_type,
                    style: entry.style.clone(),
                    has_break_after_avoid: entry.has_break_after_avoid,
                    strip_margin_bottom: entry.strip_margin_bottom,
                    empty_line_margin_top: entry.empty_line_margin_top,
                    empty_line_margin_bottom: entry.empty_line_margin_bottom,
                    is_float_image: entry.is_float_image,
                    has_content: entry.has_content,
                },
                entry_order: entry.entry_order,
                margin_top,
                margin_bottom,
                children: Vec::new(),
                parent: Some(parent),
            },
            parent,
        );
    }

    fn push_node(&mut self, node: ContentNode, parent: NodeId) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(node);
        self.nodes[parent].children.push(id);
        id
    }

    /// Restore source order where containers and leaves interleave. The
    /// sort is stable: entry_order ties keep insertion order (containers
    /// were inserted in ascending id order, leaves in sequence order).
    fn sort_children_by_entry_order(&mut self) {
        for id in 0..self.nodes.len() {
            let mut children = std::mem::take(&mut self.nodes[id].children);
            children.sort_by_key(|&child| self.nodes[child].entry_order);
            self.nodes[id].children = children;
        }
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    pub fn node(&self, id: NodeId) -> &ContentNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut ContentNode {
        &mut self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Node for a container id.
    pub fn container_node(&self, container_id: u64) -> Option<NodeId> {
        self.containers.get(&container_id).copied()
    }

    /// Wrapper entry index -> container node map.
    pub fn wrappers(&self) -> &HashMap<i64, NodeId> {
        &self.wrappers
    }

    /// All leaf node ids, in tree order.
    pub fn leaves(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if node.is_leaf() {
                out.push(id);
            }
            for &child in node.children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContainerInfo;
    use crate::symbols::sym;

    fn leaf(container_id: u64, entry_order: u64, mt: Option<f64>, mb: Option<f64>) -> ContentRef {
        ContentRef {
            container_id,
            entry_order,
            content_type: sym::TEXT_BLOCK,
            style: "p".to_string(),
            margin_top: mt,
            margin_bottom: mb,
            has_content: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_index_encoding_unique_and_reversible() {
        assert_eq!(decode_index(5), (5, None));
        let encoded = encode_child_index(3, 7);
        assert_ne!(encoded, -1);
        assert_eq!(decode_index(encoded), (3, Some(7)));
        // Top-level zero vs child-of-entry-zero stay distinct.
        assert_ne!(encode_child_index(0, 0), 0);
    }

    #[test]
    fn test_build_simple_tree() {
        let mut hierarchy = ContainerHierarchy::new();
        hierarchy.insert(
            1,
            ContainerInfo {
                parent_id: 0,
                kind: ContainerKind::Section,
                flags: ContainerFlags::NONE,
                entry_order: 0,
                margin_top: None,
                margin_bottom: None,
            },
        );
        let refs = vec![leaf(1, 1, Some(1.0), None), leaf(1, 2, None, Some(0.5))];
        let tree = ContentTree::build(&refs, &hierarchy);

        let root = tree.node(tree.root());
        assert_eq!(root.children.len(), 1);
        let section = tree.node(root.children[0]);
        assert!(section.is_container());
        assert_eq!(section.children.len(), 2);
        assert_eq!(tree.leaves().len(), 2);
    }

    #[test]
    fn test_children_sorted_by_entry_order() {
        let mut hierarchy = ContainerHierarchy::new();
        hierarchy.insert(
            1,
            ContainerInfo {
                parent_id: 0,
                kind: ContainerKind::Section,
                flags: ContainerFlags::NONE,
                entry_order: 0,
                margin_top: None,
                margin_bottom: None,
            },
        );
        hierarchy.insert(
            2,
            ContainerInfo {
                parent_id: 1,
                kind: ContainerKind::Cite,
                flags: ContainerFlags::NONE,
                entry_order: 2,
                margin_top: None,
                margin_bottom: None,
            },
        );
        // Leaves at orders 1 and 3 straddle the cite container at order 2.
        let refs = vec![
            leaf(1, 1, None, None),
            leaf(2, 2, None, None),
            leaf(1, 3, None, None),
        ];
        let tree = ContentTree::build(&refs, &hierarchy);
        let section = tree.container_node(1).unwrap();
        let orders: Vec<u64> = tree.node(section)
            .children
            .iter()
            .map(|&c| tree.node(c).entry_order)
            .collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[test]
    fn test_wrapper_margins_move_to_container() {
        let mut hierarchy = ContainerHierarchy::new();
        hierarchy.insert(
            1,
            ContainerInfo {
                parent_id: 0,
                kind: ContainerKind::Stanza,
                flags: ContainerFlags::NONE,
                entry_order: 0,
                margin_top: None,
                margin_bottom: None,
            },
        );
        let wrapper = ContentRef {
            entry_order: 0,
            margin_top: Some(1.5),
            margin_bottom: Some(0.5),
            child_refs: vec![leaf(1, 1, None, None), leaf(1, 2, None, None)],
            ..Default::default()
        };
        let refs = vec![wrapper];
        let tree = ContentTree::build(&refs, &hierarchy);

        let container = tree.container_node(1).unwrap();
        let node = tree.node(container);
        assert_eq!(node.margin_top, Some(1.5));
        assert_eq!(node.margin_bottom, Some(0.5));
        assert_eq!(node.wrapper_index(), Some(0));
        assert_eq!(tree.wrappers().get(&0), Some(&container));

        // Children carry encoded indices.
        let first_leaf = tree.node(node.children[0]);
        assert_eq!(first_leaf.leaf_index(), Some(encode_child_index(0, 0)));
    }

    #[test]
    fn test_float_image_fixed_margins() {
        let hierarchy = ContainerHierarchy::new();
        let mut image = leaf(0, 0, Some(0.2), None);
        image.is_float_image = true;
        image.content_type = sym::IMAGE_CONTENT;
        let tree = ContentTree::build(&[image], &hierarchy);
        let node = tree.node(tree.node(tree.root()).children[0]);
        assert_eq!(node.margin_top, Some(FLOAT_IMAGE_MARGIN_LH));
        assert_eq!(node.margin_bottom, Some(FLOAT_IMAGE_MARGIN_LH));
    }
}
