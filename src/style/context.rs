//! Cascaded inheritance context for the source-tree walk.
//!
//! A stack of frames mirrors the nesting of block containers. Each frame
//! carries the fully-cascaded property map inherited by its children;
//! resolving an element registers `inherited ⊕ element rules` with the
//! registry and returns the canonical style name.

use super::{BLOCK_ONLY_PROPERTIES, StyleProps, StyleRegistry, StyleUsage, map_rule_properties};
use crate::css::{PseudoElement, Selector, SimpleSelector, StyleWarning, Stylesheet};
use crate::style::read_lh;
use crate::symbols::sym;

struct MappedRule {
    selector: Selector,
    props: StyleProps,
}

struct Frame {
    tag: String,
    classes: Vec<String>,
    inherited: StyleProps,
    style_name: String,
}

/// The style context: mapped CSS rules, the registry, and the cascade
/// stack.
pub struct StyleContext {
    registry: StyleRegistry,
    rules: Vec<MappedRule>,
    frames: Vec<Frame>,
    warnings: Vec<StyleWarning>,
    pending_empty_lines: f64,
}

impl StyleContext {
    /// Build a context from a parsed stylesheet, mapping every rule's
    /// properties into the KFX model.
    pub fn from_stylesheet(sheet: &Stylesheet) -> Self {
        let mut warnings: Vec<StyleWarning> = sheet.warnings.clone();
        let mut rules = Vec::new();
        for rule in sheet.merged_rules() {
            let props = map_rule_properties(&rule.selector, &rule.properties, &mut warnings);
            if !props.is_empty() {
                rules.push(MappedRule {
                    selector: rule.selector,
                    props,
                });
            }
        }
        Self {
            registry: StyleRegistry::new(),
            rules,
            frames: Vec::new(),
            warnings,
            pending_empty_lines: 0.0,
        }
    }

    pub fn registry(&self) -> &StyleRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut StyleRegistry {
        &mut self.registry
    }

    /// All accumulated warnings: stylesheet, mapping, and registry.
    pub fn take_warnings(&mut self) -> Vec<StyleWarning> {
        let mut warnings = std::mem::take(&mut self.warnings);
        warnings.extend(self.registry.take_warnings());
        warnings
    }

    // --- cascade stack ---

    /// Enter a block container. The new frame inherits the parent's
    /// cascaded map plus this element's own rules; returns the registered
    /// style name for the container.
    pub fn push_block(&mut self, tag: &str, classes: &[String]) -> String {
        let cascaded = self.cascade(tag, classes);
        let name = self.register_cascaded(tag, classes, &cascaded, StyleUsage::Block);
        self.frames.push(Frame {
            tag: tag.to_string(),
            classes: classes.to_vec(),
            inherited: cascaded,
            style_name: name.clone(),
        });
        name
    }

    pub fn pop_block(&mut self) {
        self.frames.pop();
    }

    /// The registered style name of the innermost open block.
    pub fn current_block_style(&self) -> Option<&str> {
        self.frames.last().map(|f| f.style_name.as_str())
    }

    /// Resolve a leaf element (a paragraph, an image) against the current
    /// cascade without pushing a frame.
    pub fn resolve(&mut self, tag: &str, classes: &[String]) -> String {
        let cascaded = self.cascade(tag, classes);
        self.register_cascaded(tag, classes, &cascaded, StyleUsage::Text)
    }

    /// Register the style that differs from the containing block's resolved
    /// style by exactly the inline element's own properties. Block-level
    /// properties never participate. Returns `None` when the delta is
    /// empty.
    pub fn resolve_inline_delta(
        &mut self,
        block_style: &str,
        tag: &str,
        classes: &[String],
    ) -> Option<String> {
        let block_props = self.registry.resolve_by_name(block_style)?;
        let element_props = self.element_props(tag, classes);

        let mut delta = StyleProps::new();
        for (symbol, value) in element_props.iter() {
            if BLOCK_ONLY_PROPERTIES.contains(symbol) {
                continue;
            }
            if block_props.get(*symbol) != Some(value) {
                delta.set(*symbol, value.clone());
            }
        }
        if delta.is_empty() {
            return None;
        }

        let name = self
            .registry
            .register(&style_name(tag, classes), delta, StyleUsage::Inline);
        Some(name)
    }

    // --- empty-line hints ---

    /// Record an empty-line marker; its margin is consumed by the next
    /// content entry. Consecutive markers accumulate.
    pub fn push_empty_line(&mut self) {
        self.pending_empty_lines += 1.0;
    }

    /// Take the pending empty-line margin, in line-height units.
    pub fn take_empty_line_margin(&mut self) -> Option<f64> {
        if self.pending_empty_lines > 0.0 {
            let margin = self.pending_empty_lines;
            self.pending_empty_lines = 0.0;
            Some(margin)
        } else {
            None
        }
    }

    /// Top and bottom margins of a registered style, in lh.
    pub fn margins_of(&mut self, style: &str) -> (Option<f64>, Option<f64>) {
        let Some(props) = self.registry.resolve_by_name(style) else {
            return (None, None);
        };
        let top = props.get(sym::MARGIN_TOP).and_then(read_lh);
        let bottom = props.get(sym::MARGIN_BOTTOM).and_then(read_lh);
        (top, bottom)
    }

    // --- cascade computation ---

    /// Parent's inherited map plus this element's own rules, with tag
    /// default margins suppressed where a container margin is already
    /// inherited.
    fn cascade(&self, tag: &str, classes: &[String]) -> StyleProps {
        let inherited = self
            .frames
            .last()
            .map(|f| f.inherited.clone())
            .unwrap_or_default();

        let (tag_defaults, specific) = self.matching_rules(tag, classes);

        let mut cascaded = inherited;
        for (symbol, value) in tag_defaults.iter() {
            // A bare-element margin must not override indentation coming
            // from an enclosing container.
            if is_margin(*symbol) && has_nonzero_margin(&cascaded, *symbol) {
                continue;
            }
            cascaded.set(*symbol, value.clone());
        }
        cascaded.merge_from(&specific);
        cascaded
    }

    /// The element's own rule properties (tag defaults plus specific), with
    /// no inheritance applied.
    fn element_props(&self, tag: &str, classes: &[String]) -> StyleProps {
        let (tag_defaults, specific) = self.matching_rules(tag, classes);
        let mut props = tag_defaults;
        props.merge_from(&specific);
        props
    }

    /// Split matching rules into bare-tag defaults and everything else.
    /// Within each group, source order applies (later wins).
    fn matching_rules(&self, tag: &str, classes: &[String]) -> (StyleProps, StyleProps) {
        let mut tag_defaults = StyleProps::new();
        let mut specific = StyleProps::new();
        for rule in &self.rules {
            if rule.selector.target.pseudo != PseudoElement::None {
                continue;
            }
            if !self.selector_matches(&rule.selector, tag, classes) {
                continue;
            }
            let bare_tag = rule.selector.target.class.is_none()
                && rule.selector.ancestors.is_empty()
                && rule.selector.target.tag.is_some();
            if bare_tag {
                tag_defaults.merge_from(&rule.props);
            } else {
                specific.merge_from(&rule.props);
            }
        }
        (tag_defaults, specific)
    }

    fn selector_matches(&self, selector: &Selector, tag: &str, classes: &[String]) -> bool {
        if !simple_matches(&selector.target, tag, classes) {
            return false;
        }
        // Each ancestor must match an open frame, outermost first.
        let mut frame_index = 0;
        for ancestor in &selector.ancestors {
            let mut matched = false;
            while frame_index < self.frames.len() {
                let frame = &self.frames[frame_index];
                frame_index += 1;
                if simple_matches(ancestor, &frame.tag, &frame.classes) {
                    matched = true;
                    break;
                }
            }
            if !matched {
                return false;
            }
        }
        true
    }

    fn register_cascaded(
        &mut self,
        tag: &str,
        classes: &[String],
        cascaded: &StyleProps,
        usage: StyleUsage,
    ) -> String {
        let name = self
            .registry
            .register(&style_name(tag, classes), cascaded.clone(), usage);
        self.registry.mark_usage(&name, usage);
        name
    }
}

fn simple_matches(selector: &SimpleSelector, tag: &str, classes: &[String]) -> bool {
    if let Some(sel_tag) = &selector.tag {
        if sel_tag != tag {
            return false;
        }
    }
    if let Some(sel_class) = &selector.class {
        if !classes.iter().any(|c| c == sel_class) {
            return false;
        }
    }
    true
}

fn style_name(tag: &str, classes: &[String]) -> String {
    if classes.is_empty() {
        tag.to_string()
    } else {
        format!("{tag}.{}", classes.join("."))
    }
}

fn is_margin(symbol: u64) -> bool {
    matches!(
        symbol,
        sym::MARGIN_TOP | sym::MARGIN_BOTTOM | sym::MARGIN_LEFT | sym::MARGIN_RIGHT
    )
}

fn has_nonzero_margin(props: &StyleProps, symbol: u64) -> bool {
    props
        .get(symbol)
        .and_then(crate::style::read_dimension)
        .is_some_and(|(value, _)| value.abs() > f64::EPSILON)
}
