//! Content tree construction and margin collapsing.
//!
//! The storyline assembler produces a flat sequence of [`ContentRef`]
//! entries plus a container hierarchy; this module rebuilds the tree of
//! content nodes, runs the reference reader's margin-collapse semantics
//! over it, and rewrites per-entry styles to materialize the results.

mod collapse;
mod tree;

pub use collapse::{apply_collapsed_margins, collapse, collapse_margins};
pub use tree::{ContentNode, ContentTree, NodeData, NodeId};

use std::collections::BTreeMap;

use crate::itf::ItfValue;

/// Fixed margin (in lh) that snap-block float images keep on both sides.
pub const FLOAT_IMAGE_MARGIN_LH: f64 = 2.6;

/// Margins below this magnitude are treated as absent.
pub const MARGIN_EPSILON: f64 = 1e-6;

/// Kind of a content container, chosen by the source walker per container
/// class in the source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainerKind {
    #[default]
    Root,
    Section,
    Poem,
    Stanza,
    Cite,
    Epigraph,
    Footnote,
    TitleBlock,
    Annotation,
}

/// Container behavior flags (a bitset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerFlags(u32);

impl ContainerFlags {
    pub const NONE: ContainerFlags = ContainerFlags(0);
    /// Top border or padding present: first-child margins never collapse
    /// through.
    pub const PREVENT_COLLAPSE_TOP: ContainerFlags = ContainerFlags(1);
    pub const PREVENT_COLLAPSE_BOTTOM: ContainerFlags = ContainerFlags(1 << 1);
    /// First child's top margin is removed outright.
    pub const TITLE_BLOCK_MODE: ContainerFlags = ContainerFlags(1 << 2);
    /// Remove bottom margins from every child but the last.
    pub const STRIP_MIDDLE_MARGIN_BOTTOM: ContainerFlags = ContainerFlags(1 << 3);
    /// Move the container's bottom margin onto its last child, unless the
    /// container is itself a last child (then it bubbles further up).
    pub const TRANSFER_MB_TO_LAST_CHILD: ContainerFlags = ContainerFlags(1 << 4);
    /// Move the container's bottom margin onto its last child always.
    pub const FORCE_TRANSFER_MB_TO_LAST_CHILD: ContainerFlags = ContainerFlags(1 << 5);

    pub fn contains(self, other: ContainerFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: ContainerFlags) -> ContainerFlags {
        ContainerFlags(self.0 | other.0)
    }
}

impl std::ops::BitOr for ContainerFlags {
    type Output = ContainerFlags;
    fn bitor(self, other: ContainerFlags) -> ContainerFlags {
        self.union(other)
    }
}

/// Hierarchy record for one container, written by `enter_container` and
/// read during tree construction.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub parent_id: u64,
    pub kind: ContainerKind,
    pub flags: ContainerFlags,
    pub entry_order: u64,
    /// Seed margins from the container's own style, when set.
    pub margin_top: Option<f64>,
    pub margin_bottom: Option<f64>,
}

/// The container hierarchy map: `container_id -> info`, with parent ids
/// strictly smaller than child ids so the tree builds bottom-up from a
/// simple ascending iteration.
#[derive(Debug, Default)]
pub struct ContainerHierarchy {
    containers: BTreeMap<u64, ContainerInfo>,
}

impl ContainerHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, container_id: u64, info: ContainerInfo) {
        debug_assert!(
            info.parent_id < container_id,
            "parent ids must be strictly smaller"
        );
        self.containers.insert(container_id, info);
    }

    pub fn get(&self, container_id: u64) -> Option<&ContainerInfo> {
        self.containers.get(&container_id)
    }

    /// Containers in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (&u64, &ContainerInfo)> {
        self.containers.iter()
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}

/// A leaf entry in the flat sequence produced by the source walk.
///
/// `container_id == 0` denotes the virtual root. An entry carrying
/// `child_refs` is a *wrapper*: it represents a container and holds its
/// children's entries.
#[derive(Debug, Clone, Default)]
pub struct ContentRef {
    pub container_id: u64,
    pub parent_container_id: u64,
    pub entry_order: u64,
    pub element_id: u64,
    pub content_type: u64,
    pub style: String,
    pub margin_top: Option<f64>,
    pub margin_bottom: Option<f64>,
    pub has_break_after_avoid: bool,
    pub strip_margin_bottom: bool,
    pub empty_line_margin_top: Option<f64>,
    pub empty_line_margin_bottom: Option<f64>,
    pub is_float_image: bool,
    /// False for placeholder leaves with nothing to render.
    pub has_content: bool,
    /// The serialized entry struct, updated in place when the style
    /// changes after collapsing.
    pub raw_entry: Option<ItfValue>,
    pub child_refs: Vec<ContentRef>,
}

impl ContentRef {
    pub fn is_wrapper(&self) -> bool {
        !self.child_refs.is_empty()
    }
}
