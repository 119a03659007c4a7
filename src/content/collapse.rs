//! The margin-collapse engine.
//!
//! Runs depth-first, post-order over the content tree, implementing the
//! reference reader's collapsing semantics: empty-node self-collapse,
//! first/last child with parent, adjacent siblings, and the
//! container-specific transfer modes. Afterwards, collapsed margins are
//! materialized by registering style variants through the registry.

use super::tree::{ContentTree, NodeData, NodeId, decode_index};
use super::{ContainerFlags, ContainerKind, ContentRef, MARGIN_EPSILON};
use crate::itf::ItfValue;
use crate::style::{StyleProps, StyleRegistry, StyleUsage, dimension, read_lh};
use crate::symbols::{SymbolTable, sym};

/// Collapse two adjoining margins.
///
/// Both non-negative: the larger wins. Both non-positive: the more
/// negative wins. Mixed signs: they sum. Near-zero results vanish so zero
/// margins are never emitted.
pub fn collapse(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    let combined = match (a, b) {
        (None, other) | (other, None) => other,
        (Some(a), Some(b)) => {
            if a >= 0.0 && b >= 0.0 {
                Some(a.max(b))
            } else if a <= 0.0 && b <= 0.0 {
                Some(a.min(b))
            } else {
                Some(a + b)
            }
        }
    };
    normalize(combined)
}

/// Near-zero margins normalize to absent.
pub fn normalize(margin: Option<f64>) -> Option<f64> {
    margin.filter(|v| v.abs() > MARGIN_EPSILON)
}

/// Run the collapse pass over the whole tree.
pub fn collapse_margins(tree: &mut ContentTree) {
    let root = tree.root();
    collapse_node(tree, root, true, true);
}

fn collapse_node(tree: &mut ContentTree, node: NodeId, is_last: bool, at_end: bool) {
    strip_marked_margin_bottom(tree, node);
    collapse_empty_nodes(tree, node);
    collapse_siblings(tree, node);
    collapse_first_child(tree, node);

    let children = tree.node(node).children.clone();
    let count = children.len();
    for (position, &child) in children.iter().enumerate() {
        if tree.node(child).is_container() {
            let child_is_last = position + 1 == count;
            collapse_node(tree, child, child_is_last, at_end && child_is_last);
        }
    }

    strip_middle_margin_bottom(tree, node);
    collapse_last_child(tree, node, is_last, at_end);
    collapse_siblings(tree, node);
}

/// Honor strip flags and empty-line margin hints on leaf children.
fn strip_marked_margin_bottom(tree: &mut ContentTree, node: NodeId) {
    let children = tree.node(node).children.clone();
    for (position, &child) in children.iter().enumerate() {
        let next = children.get(position + 1).copied();

        let NodeData::Leaf {
            strip_margin_bottom,
            empty_line_margin_top,
            empty_line_margin_bottom,
            ..
        } = tree.node(child).data
        else {
            continue;
        };

        // A preceding empty line raises the top margin.
        if let Some(empty_top) = empty_line_margin_top {
            let current = tree.node(child).margin_top.unwrap_or(0.0);
            tree.node_mut(child).margin_top = normalize(Some(current.max(empty_top)));
        }

        // A following empty line replaces the bottom margin outright when
        // the next element is an image.
        if let Some(empty_bottom) = empty_line_margin_bottom {
            if next.is_some_and(|n| is_image(tree.node(n).content_type())) {
                tree.node_mut(child).margin_bottom = normalize(Some(empty_bottom));
            }
        }

        if strip_margin_bottom {
            let stripped = tree.node_mut(child).margin_bottom.take();
            if let (Some(stripped), Some(next)) = (stripped, next) {
                let next_top = tree.node(next).margin_top.unwrap_or(0.0);
                if stripped > next_top {
                    tree.node_mut(next).margin_top = normalize(Some(stripped));
                }
            }
        }
    }
}

/// Leaves with no content self-collapse: the top margin folds into the
/// bottom and vanishes.
fn collapse_empty_nodes(tree: &mut ContentTree, node: NodeId) {
    let children = tree.node(node).children.clone();
    for &child in &children {
        let NodeData::Leaf {
            has_content,
            content_type,
            is_float_image,
            ..
        } = tree.node(child).data
        else {
            continue;
        };
        if has_content || is_float_image || is_image(content_type) {
            continue;
        }
        let node = tree.node_mut(child);
        node.margin_bottom = collapse(node.margin_top, node.margin_bottom);
        node.margin_top = None;
    }
}

/// Collapse margins between adjacent children of one container.
fn collapse_siblings(tree: &mut ContentTree, node: NodeId) {
    let children = tree.node(node).children.clone();
    for pair in children.windows(2) {
        let (curr, next) = (pair[0], pair[1]);

        // Float images are barriers in both directions.
        if tree.node(curr).is_float_image() || tree.node(next).is_float_image() {
            continue;
        }

        if tree.node(curr).is_leaf() {
            // A leaf before a leaf or a container: the bottom margin moves
            // into the follower's top (the container propagates it down
            // during its own first-child phase).
            let curr_mb = tree.node_mut(curr).margin_bottom.take();
            let next_node = tree.node_mut(next);
            next_node.margin_top = collapse(curr_mb, next_node.margin_top);
            continue;
        }

        match sibling_container_mode(tree.node(curr)) {
            SiblingMode::TitleBlock => {
                let target = descend_to_margin_target(tree, next);
                if tree.node(target).margin_top.is_some() {
                    let curr_mb = tree.node_mut(curr).margin_bottom.take();
                    let target_node = tree.node_mut(target);
                    target_node.margin_top = collapse(curr_mb, target_node.margin_top);
                }
                // Otherwise the margin stays on the wrapper.
            }
            SiblingMode::TransferToLast => {
                let curr_mb = tree.node(curr).margin_bottom;
                let next_mt = tree.node(next).margin_top;
                if let (Some(mb), Some(mt)) = (curr_mb, next_mt) {
                    if mt >= mb {
                        tree.node_mut(curr).margin_bottom = None;
                    }
                }
                // Through-the-container absorption against the last child.
                if let Some(&last_child) = tree.node(curr).children.last() {
                    let last_mb = tree.node(last_child).margin_bottom;
                    if let (Some(mb), Some(mt)) = (last_mb, tree.node(next).margin_top) {
                        if mt >= mb {
                            tree.node_mut(last_child).margin_bottom = None;
                        }
                    }
                }
            }
            SiblingMode::Plain => {
                let curr_mb = tree.node_mut(curr).margin_bottom.take();
                let next_node = tree.node_mut(next);
                next_node.margin_top = collapse(curr_mb, next_node.margin_top);
            }
        }
    }
}

enum SiblingMode {
    TitleBlock,
    TransferToLast,
    Plain,
}

fn sibling_container_mode(node: &super::ContentNode) -> SiblingMode {
    if node.kind() == ContainerKind::TitleBlock {
        SiblingMode::TitleBlock
    } else if node
        .flags()
        .contains(ContainerFlags::TRANSFER_MB_TO_LAST_CHILD)
    {
        SiblingMode::TransferToLast
    } else {
        SiblingMode::Plain
    }
}

/// For a TitleBlock's bottom margin: the target is the next sibling when
/// it is a leaf or a container with a top margin, else the first rendered
/// descendant found by depth-first descent.
fn descend_to_margin_target(tree: &ContentTree, node: NodeId) -> NodeId {
    let mut current = node;
    loop {
        let n = tree.node(current);
        if n.is_leaf() || n.margin_top.is_some() {
            return current;
        }
        match n.children.first() {
            Some(&first) => current = first,
            None => return current,
        }
    }
}

/// Collapse the first child's top margin with its container.
fn collapse_first_child(tree: &mut ContentTree, node: NodeId) {
    if !tree.node(node).is_container() {
        return;
    }
    // A margin accepted by the root would be invisible; leave it below.
    if tree.node(node).kind() == ContainerKind::Root {
        return;
    }
    let flags = tree.node(node).flags();
    if flags.contains(ContainerFlags::PREVENT_COLLAPSE_TOP) {
        return;
    }
    let Some(&first) = tree.node(node).children.first() else {
        return;
    };
    if tree.node(first).is_float_image() {
        return;
    }

    if flags.contains(ContainerFlags::TITLE_BLOCK_MODE) {
        tree.node_mut(first).margin_top = None;
        return;
    }

    let wrapper_backed = tree.node(node).wrapper_index().is_some();
    let kind = tree.node(node).kind();
    if wrapper_backed || kind == ContainerKind::Section {
        // The container retains the collapsed margin (a wrapper renders it;
        // a section boundary absorbs it).
        let first_mt = tree.node_mut(first).margin_top.take();
        let node_ref = tree.node_mut(node);
        node_ref.margin_top = collapse(node_ref.margin_top, first_mt);
    } else {
        // A purely virtual container cannot render a margin: transfer it
        // down to the first child.
        let node_mt = tree.node_mut(node).margin_top.take();
        let first_node = tree.node_mut(first);
        first_node.margin_top = collapse(node_mt, first_node.margin_top);
    }
}

/// Containers flagged for it drop every child bottom margin but the last.
fn strip_middle_margin_bottom(tree: &mut ContentTree, node: NodeId) {
    if !tree
        .node(node)
        .flags()
        .contains(ContainerFlags::STRIP_MIDDLE_MARGIN_BOTTOM)
    {
        return;
    }
    let children = tree.node(node).children.clone();
    let Some((_, rest)) = children.split_last() else {
        return;
    };
    for &child in rest {
        if tree.node(child).is_float_image() {
            continue;
        }
        tree.node_mut(child).margin_bottom = None;
    }
}

/// Collapse the last child's bottom margin with its container.
fn collapse_last_child(tree: &mut ContentTree, node: NodeId, is_last: bool, at_end: bool) {
    if !tree.node(node).is_container() {
        return;
    }
    let flags = tree.node(node).flags();
    if flags.contains(ContainerFlags::PREVENT_COLLAPSE_BOTTOM) {
        return;
    }
    let Some(&last) = tree.node(node).children.last() else {
        return;
    };
    if tree.node(last).is_float_image() {
        return;
    }

    if flags.contains(ContainerFlags::FORCE_TRANSFER_MB_TO_LAST_CHILD) {
        transfer_mb_down(tree, node, last);
        return;
    }
    if flags.contains(ContainerFlags::TRANSFER_MB_TO_LAST_CHILD) {
        if !is_last {
            transfer_mb_down(tree, node, last);
        }
        // As a last child the margin stays put and bubbles further up.
        return;
    }
    if tree.node(node).kind() == ContainerKind::Root {
        // A margin accepted by the root would be invisible.
        return;
    }
    if at_end && tree.node(node).wrapper_index().is_none() {
        // End of the storyline: trailing spacing must survive on the last
        // rendered child.
        transfer_mb_down(tree, node, last);
        return;
    }

    let last_mb = tree.node_mut(last).margin_bottom.take();
    let node_ref = tree.node_mut(node);
    node_ref.margin_bottom = collapse(node_ref.margin_bottom, last_mb);
}

fn transfer_mb_down(tree: &mut ContentTree, node: NodeId, child: NodeId) {
    let node_mb = tree.node_mut(node).margin_bottom.take();
    let child_node = tree.node_mut(child);
    child_node.margin_bottom = collapse(child_node.margin_bottom, node_mb);
}

fn is_image(content_type: u64) -> bool {
    content_type == sym::IMAGE_CONTENT
}

// --- applying collapsed margins ---

/// Rewrite entry styles so the collapsed margins materialize.
///
/// For every wrapper entry and leaf whose collapsed margins differ from
/// the margins of its current style, a new style variant is registered
/// (same usage tag) and the entry is repointed at it. Returns the number
/// of entries restyled.
pub fn apply_collapsed_margins(
    tree: &ContentTree,
    refs: &mut [ContentRef],
    registry: &mut StyleRegistry,
    symbols: &mut SymbolTable,
) -> usize {
    let mut variant_counter = 0usize;
    let mut changed = 0usize;

    let mut wrapper_entries: Vec<(i64, NodeId)> =
        tree.wrappers().iter().map(|(&i, &n)| (i, n)).collect();
    wrapper_entries.sort_by_key(|(index, _)| *index);

    for (entry_index, node_id) in wrapper_entries {
        let node = tree.node(node_id);
        if apply_to_entry(
            refs,
            entry_index,
            node.margin_top,
            node.margin_bottom,
            registry,
            symbols,
            &mut variant_counter,
        ) {
            changed += 1;
        }
    }

    for node_id in tree.leaves() {
        let node = tree.node(node_id);
        let Some(index) = node.leaf_index() else {
            continue;
        };
        if apply_to_entry(
            refs,
            index,
            node.margin_top,
            node.margin_bottom,
            registry,
            symbols,
            &mut variant_counter,
        ) {
            changed += 1;
        }
    }

    changed
}

fn apply_to_entry(
    refs: &mut [ContentRef],
    index: i64,
    collapsed_top: Option<f64>,
    collapsed_bottom: Option<f64>,
    registry: &mut StyleRegistry,
    symbols: &mut SymbolTable,
    variant_counter: &mut usize,
) -> bool {
    let Some(entry) = entry_mut(refs, index) else {
        return false;
    };
    let style_name = entry.style.clone();
    let resolved = registry
        .resolve_by_name(&style_name)
        .unwrap_or_default();

    let original_top = resolved.get(sym::MARGIN_TOP).and_then(read_lh);
    let original_bottom = resolved.get(sym::MARGIN_BOTTOM).and_then(read_lh);
    let new_top = normalize(collapsed_top);
    let new_bottom = normalize(collapsed_bottom);

    let entry = entry_mut(refs, index).expect("entry vanished");
    entry.margin_top = new_top;
    entry.margin_bottom = new_bottom;

    if margin_eq(original_top, new_top) && margin_eq(original_bottom, new_bottom) {
        return false;
    }

    let mut props = resolved;
    override_margin(&mut props, sym::MARGIN_TOP, new_top);
    override_margin(&mut props, sym::MARGIN_BOTTOM, new_bottom);

    let usage = registry
        .get(&style_name)
        .map(|def| def.usage)
        .unwrap_or(StyleUsage::Unknown);

    *variant_counter += 1;
    let base = if style_name.is_empty() {
        "mc"
    } else {
        style_name.as_str()
    };
    let variant = registry.register(&format!("{base}-mc{variant_counter}"), props, usage);
    registry.mark_usage(&variant, usage);

    let entry = entry_mut(refs, index).expect("entry vanished");
    entry.style = variant.clone();
    if let Some(ItfValue::Struct(fields)) = &mut entry.raw_entry {
        let id = symbols.get_or_intern(&variant);
        if let Some(slot) = fields.iter_mut().find(|(k, _)| *k == sym::STYLE) {
            slot.1 = ItfValue::Symbol(id);
        } else {
            fields.push((sym::STYLE, ItfValue::Symbol(id)));
        }
    }
    true
}

fn override_margin(props: &mut StyleProps, symbol: u64, value: Option<f64>) {
    match value {
        Some(v) => props.set(symbol, dimension(v, sym::UNIT_LH)),
        None => {
            props.remove(symbol);
        }
    }
}

fn margin_eq(a: Option<f64>, b: Option<f64>) -> bool {
    (a.unwrap_or(0.0) - b.unwrap_or(0.0)).abs() < MARGIN_EPSILON
}

fn entry_mut(refs: &mut [ContentRef], index: i64) -> Option<&mut ContentRef> {
    match decode_index(index) {
        (i, None) => refs.get_mut(i as usize),
        (parent, Some(child)) => refs.get_mut(parent as usize)?.child_refs.get_mut(child),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContainerHierarchy, ContainerInfo, FLOAT_IMAGE_MARGIN_LH};
    use proptest::prelude::*;

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

    fn section_hierarchy() -> ContainerHierarchy {
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
        hierarchy
    }

    fn leaf_margins(tree: &ContentTree) -> Vec<(Option<f64>, Option<f64>)> {
        tree.leaves()
            .into_iter()
            .map(|id| {
                let node = tree.node(id);
                (node.margin_top, node.margin_bottom)
            })
            .collect()
    }

    #[test]
    fn test_collapse_sign_rules() {
        assert_eq!(collapse(Some(1.0), Some(0.5)), Some(1.0));
        assert_eq!(collapse(Some(-1.0), Some(-0.5)), Some(-1.0));
        assert_eq!(collapse(Some(1.0), Some(-0.4)), Some(0.6));
        assert_eq!(collapse(None, Some(2.0)), Some(2.0));
        assert_eq!(collapse(Some(0.0), Some(0.0)), None);
    }

    proptest! {
        #[test]
        fn prop_collapse_commutative(a in -10.0f64..10.0, b in -10.0f64..10.0) {
            prop_assert_eq!(collapse(Some(a), Some(b)), collapse(Some(b), Some(a)));
        }

        #[test]
        fn prop_collapse_zero_identity(x in -10.0f64..10.0) {
            let expected = normalize(Some(x));
            prop_assert_eq!(collapse(Some(0.0), Some(x)), expected);
            prop_assert_eq!(collapse(Some(x), Some(0.0)), expected);
            prop_assert_eq!(collapse(None, Some(x)), expected);
        }
    }

    #[test]
    fn test_two_paragraph_sibling_collapse() {
        // First paragraph mb=1, second mt=0.5: the larger wins on the
        // second's top, the first's bottom clears.
        let refs = vec![
            leaf(1, 1, None, Some(1.0)),
            leaf(1, 2, Some(0.5), Some(1.0)),
        ];
        let mut tree = ContentTree::build(&refs, &section_hierarchy());
        collapse_margins(&mut tree);

        let margins = leaf_margins(&tree);
        assert_eq!(margins[0].1, None, "first paragraph mb cleared");
        assert_eq!(margins[1].0, Some(1.0), "second paragraph mt raised");
    }

    #[test]
    fn test_first_child_into_section() {
        let refs = vec![leaf(1, 1, Some(2.0), None)];
        let mut tree = ContentTree::build(&refs, &section_hierarchy());
        collapse_margins(&mut tree);

        // Section absorbs the first child's top margin.
        assert_eq!(leaf_margins(&tree)[0].0, None);
        let section = tree.container_node(1).unwrap();
        assert_eq!(tree.node(section).margin_top, Some(2.0));
    }

    #[test]
    fn test_empty_leaf_self_collapse() {
        let mut empty = leaf(1, 1, Some(1.0), Some(0.4));
        empty.has_content = false;
        let refs = vec![leaf(1, 0, None, None), empty, leaf(1, 2, None, None)];
        let mut tree = ContentTree::build(&refs, &section_hierarchy());
        collapse_margins(&mut tree);

        let margins = leaf_margins(&tree);
        assert_eq!(margins[1].0, None);
        // mt folded into mb (max), then transferred to the next sibling.
        assert_eq!(margins[2].0, Some(1.0));
    }

    #[test]
    fn test_float_image_barrier() {
        let mut image = leaf(1, 2, None, None);
        image.is_float_image = true;
        image.content_type = sym::IMAGE_CONTENT;
        let refs = vec![
            leaf(1, 1, None, Some(0.8)),
            image,
            leaf(1, 3, Some(0.3), None),
        ];
        let mut tree = ContentTree::build(&refs, &section_hierarchy());
        collapse_margins(&mut tree);

        let margins = leaf_margins(&tree);
        // Image keeps its fixed margins; neighbors keep theirs.
        assert_eq!(margins[0].1, Some(0.8));
        assert_eq!(
            margins[1],
            (Some(FLOAT_IMAGE_MARGIN_LH), Some(FLOAT_IMAGE_MARGIN_LH))
        );
        assert_eq!(margins[2].0, Some(0.3));
    }

    #[test]
    fn test_stanza_transfer() {
        // Stanza with TitleBlockMode | StripMiddleMarginBottom |
        // TransferMBToLastChild, three verses, stanza not last in parent.
        let mut hierarchy = section_hierarchy();
        hierarchy.insert(
            2,
            ContainerInfo {
                parent_id: 1,
                kind: ContainerKind::Stanza,
                flags: ContainerFlags::TITLE_BLOCK_MODE
                    | ContainerFlags::STRIP_MIDDLE_MARGIN_BOTTOM
                    | ContainerFlags::TRANSFER_MB_TO_LAST_CHILD,
                entry_order: 1,
                margin_top: None,
                margin_bottom: Some(1.5),
            },
        );
        let refs = vec![
            leaf(2, 2, Some(0.5), Some(0.3)),
            leaf(2, 3, None, Some(0.3)),
            leaf(2, 4, None, Some(0.3)),
            leaf(1, 5, None, None),
        ];
        let mut tree = ContentTree::build(&refs, &hierarchy);
        collapse_margins(&mut tree);

        let margins = leaf_margins(&tree);
        // First verse: TitleBlockMode removed its mt.
        assert_eq!(margins[0].0, None);
        // Middle verse mb stripped.
        assert_eq!(margins[1].1, None);
        // Last verse carries the stanza's mb.
        assert_eq!(margins[2].1, Some(1.5));
        let stanza = tree.container_node(2).unwrap();
        assert_eq!(tree.node(stanza).margin_bottom, None);
    }

    #[test]
    fn test_transfer_mb_stays_when_container_is_last() {
        let mut hierarchy = section_hierarchy();
        hierarchy.insert(
            2,
            ContainerInfo {
                parent_id: 1,
                kind: ContainerKind::Stanza,
                flags: ContainerFlags::TRANSFER_MB_TO_LAST_CHILD,
                entry_order: 1,
                margin_top: None,
                margin_bottom: Some(1.5),
            },
        );
        // The stanza is the only (hence last) child of its section.
        let refs = vec![leaf(2, 2, None, Some(0.3))];
        let mut tree = ContentTree::build(&refs, &hierarchy);
        collapse_margins(&mut tree);

        let stanza = tree.container_node(2).unwrap();
        assert_eq!(tree.node(stanza).margin_bottom, Some(1.5));
    }

    #[test]
    fn test_storyline_end_preservation() {
        // A purely virtual container at the very end of the storyline
        // pushes its own mb down to the last rendered leaf.
        let mut hierarchy = ContainerHierarchy::new();
        hierarchy.insert(
            1,
            ContainerInfo {
                parent_id: 0,
                kind: ContainerKind::Cite,
                flags: ContainerFlags::NONE,
                entry_order: 0,
                margin_top: None,
                margin_bottom: Some(2.0),
            },
        );
        let refs = vec![leaf(1, 1, None, Some(0.5))];
        let mut tree = ContentTree::build(&refs, &hierarchy);
        collapse_margins(&mut tree);

        assert_eq!(leaf_margins(&tree)[0].1, Some(2.0));
        let cite = tree.container_node(1).unwrap();
        assert_eq!(tree.node(cite).margin_bottom, None);
    }

    #[test]
    fn test_root_never_accepts_child_mb() {
        let refs = vec![leaf(0, 0, None, Some(1.0))];
        let hierarchy = ContainerHierarchy::new();
        let mut tree = ContentTree::build(&refs, &hierarchy);
        collapse_margins(&mut tree);
        assert_eq!(leaf_margins(&tree)[0].1, Some(1.0));
    }

    #[test]
    fn test_prevent_collapse_top() {
        let mut hierarchy = ContainerHierarchy::new();
        hierarchy.insert(
            1,
            ContainerInfo {
                parent_id: 0,
                kind: ContainerKind::Cite,
                flags: ContainerFlags::PREVENT_COLLAPSE_TOP,
                entry_order: 0,
                margin_top: Some(1.0),
                margin_bottom: None,
            },
        );
        let refs = vec![leaf(1, 1, Some(0.5), None)];
        let mut tree = ContentTree::build(&refs, &hierarchy);
        collapse_margins(&mut tree);

        // No transfer happened in either direction.
        assert_eq!(leaf_margins(&tree)[0].0, Some(0.5));
        let cite = tree.container_node(1).unwrap();
        assert_eq!(tree.node(cite).margin_top, Some(1.0));
    }

    #[test]
    fn test_strip_marked_margin_bottom_raises_next_top() {
        let mut stripped = leaf(1, 1, None, Some(2.0));
        stripped.strip_margin_bottom = true;
        let refs = vec![stripped, leaf(1, 2, Some(0.5), None)];
        let mut tree = ContentTree::build(&refs, &section_hierarchy());
        collapse_margins(&mut tree);

        let margins = leaf_margins(&tree);
        assert_eq!(margins[0].1, None);
        assert_eq!(margins[1].0, Some(2.0));
    }

    #[test]
    fn test_empty_line_margin_top_hint() {
        let mut hinted = leaf(1, 2, Some(0.5), None);
        hinted.empty_line_margin_top = Some(2.0);
        let refs = vec![leaf(1, 1, None, None), hinted];
        let mut tree = ContentTree::build(&refs, &section_hierarchy());
        collapse_margins(&mut tree);

        assert_eq!(leaf_margins(&tree)[1].0, Some(2.0));
    }

    #[test]
    fn test_empty_line_margin_bottom_before_image() {
        let mut hinted = leaf(1, 1, None, Some(0.5));
        hinted.empty_line_margin_bottom = Some(3.0);
        let mut image = leaf(1, 2, None, None);
        image.content_type = sym::IMAGE_CONTENT;
        let refs = vec![hinted, image];
        let mut tree = ContentTree::build(&refs, &section_hierarchy());

        // Before any collapsing, the hint must have replaced the mb.
        let section = tree.container_node(1).unwrap();
        strip_marked_margin_bottom(&mut tree, section);
        let margins = leaf_margins(&tree);
        assert_eq!(margins[0].1, Some(3.0));
    }

    #[test]
    fn test_collapse_idempotent() {
        let mut hierarchy = section_hierarchy();
        hierarchy.insert(
            2,
            ContainerInfo {
                parent_id: 1,
                kind: ContainerKind::Stanza,
                flags: ContainerFlags::TITLE_BLOCK_MODE
                    | ContainerFlags::STRIP_MIDDLE_MARGIN_BOTTOM
                    | ContainerFlags::TRANSFER_MB_TO_LAST_CHILD,
                entry_order: 2,
                margin_top: Some(1.0),
                margin_bottom: Some(1.5),
            },
        );
        let refs = vec![
            leaf(1, 1, Some(1.0), Some(1.0)),
            leaf(2, 3, Some(0.5), Some(0.3)),
            leaf(2, 4, None, Some(0.3)),
            leaf(1, 5, Some(0.7), Some(0.2)),
        ];
        let mut tree = ContentTree::build(&refs, &hierarchy);
        collapse_margins(&mut tree);
        let first_pass = leaf_margins(&tree);
        let containers: Vec<_> = (1..=2)
            .map(|id| {
                let n = tree.node(tree.container_node(id).unwrap());
                (n.margin_top, n.margin_bottom)
            })
            .collect();

        collapse_margins(&mut tree);
        assert_eq!(leaf_margins(&tree), first_pass);
        let containers_after: Vec<_> = (1..=2)
            .map(|id| {
                let n = tree.node(tree.container_node(id).unwrap());
                (n.margin_top, n.margin_bottom)
            })
            .collect();
        assert_eq!(containers, containers_after);
    }

    #[test]
    fn test_apply_updates_styles_and_raw_entries() {
        let mut registry = StyleRegistry::new();
        let mut symbols = SymbolTable::new();
        let style: StyleProps = [
            (sym::MARGIN_TOP, dimension(0.5, sym::UNIT_LH)),
            (sym::MARGIN_BOTTOM, dimension(1.0, sym::UNIT_LH)),
        ]
        .into_iter()
        .collect();
        let name = registry.register("p", style, StyleUsage::Text);
        let original_id = symbols.get_or_intern(&name);

        let mut refs = vec![
            ContentRef {
                container_id: 1,
                entry_order: 1,
                content_type: sym::TEXT_BLOCK,
                style: name.clone(),
                margin_top: Some(0.5),
                margin_bottom: Some(1.0),
                has_content: true,
                raw_entry: Some(ItfValue::Struct(vec![(
                    sym::STYLE,
                    ItfValue::Symbol(original_id),
                )])),
                ..Default::default()
            },
            ContentRef {
                container_id: 1,
                entry_order: 2,
                content_type: sym::TEXT_BLOCK,
                style: name.clone(),
                margin_top: Some(0.5),
                margin_bottom: Some(1.0),
                has_content: true,
                ..Default::default()
            },
        ];

        let mut tree = ContentTree::build(&refs, &section_hierarchy());
        collapse_margins(&mut tree);
        let changed = apply_collapsed_margins(&tree, &mut refs, &mut registry, &mut symbols);

        // Both paragraphs changed: first lost mt (section absorbed) and mb
        // (collapsed into second), second gained mt=1.0.
        assert_eq!(changed, 2);
        assert_ne!(refs[0].style, name);
        let first_def = registry.get(&refs[0].style).unwrap();
        assert!(!first_def.properties.contains(sym::MARGIN_TOP));
        assert!(!first_def.properties.contains(sym::MARGIN_BOTTOM));
        assert_eq!(first_def.usage, StyleUsage::Text);

        let second_def = registry.get(&refs[1].style).unwrap();
        assert_eq!(
            second_def.properties.get(sym::MARGIN_TOP).and_then(read_lh),
            Some(1.0)
        );

        // The raw entry's style field was repointed.
        let raw = refs[0].raw_entry.as_ref().unwrap();
        let style_field = raw.get(sym::STYLE).unwrap().as_symbol().unwrap();
        assert_ne!(style_field, original_id);
        assert_eq!(symbols.resolve(style_field).as_deref(), Some(refs[0].style.as_str()));

        // Re-applying after convergence changes nothing.
        let mut tree2 = ContentTree::build(&refs, &section_hierarchy());
        collapse_margins(&mut tree2);
        let changed2 = apply_collapsed_margins(&tree2, &mut refs, &mut registry, &mut symbols);
        assert_eq!(changed2, 0);
    }
}
