//! CSS parsing for the style pipeline.
//!
//! Produces a sequence of rules plus `@font-face` declarations from a
//! stylesheet byte string. `@media` blocks are evaluated at parse time
//! against reader capability flags; non-matching blocks are discarded.
//! Recoverable issues (unsupported selectors, malformed declarations)
//! become [`StyleWarning`]s on the stylesheet, never errors.

pub mod color;
pub mod media;
mod parse;
mod value;

pub use color::parse_color;
pub use media::Capabilities;
pub use parse::parse_stylesheet;
pub use value::{CssUnit, CssValue, EX_TO_EM_FACTOR, FontWeightClass, font_weight_class};

use std::fmt;

/// Kinds of recoverable stylesheet issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    UnsupportedSelector,
    UnsupportedProperty,
    UnsupportedValue,
    NegativeMargin,
    UnknownUnit,
    MalformedColor,
    InheritanceCycle,
    ParseError,
}

/// A recoverable CSS issue: collected and surfaced to the caller alongside
/// the successful result, never thrown.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleWarning {
    pub kind: WarningKind,
    pub detail: String,
}

impl StyleWarning {
    pub fn new(kind: WarningKind, detail: impl Into<String>) -> Self {
        let warning = Self {
            kind,
            detail: detail.into(),
        };
        log::warn!("{warning}");
        warning
    }
}

impl fmt::Display for StyleWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.detail)
    }
}

/// Pseudo-element of a simple selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PseudoElement {
    #[default]
    None,
    Before,
    After,
}

/// `tag`, `.class`, `tag.class`, optionally with `::before`/`::after`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SimpleSelector {
    pub tag: Option<String>,
    pub class: Option<String>,
    pub pseudo: PseudoElement,
}

impl fmt::Display for SimpleSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tag) = &self.tag {
            write!(f, "{tag}")?;
        }
        if let Some(class) = &self.class {
            write!(f, ".{class}")?;
        }
        match self.pseudo {
            PseudoElement::None => {}
            PseudoElement::Before => write!(f, "::before")?,
            PseudoElement::After => write!(f, "::after")?,
        }
        Ok(())
    }
}

/// A supported selector: a simple selector, possibly qualified by a chain
/// of descendant ancestors (leftmost is outermost).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selector {
    pub ancestors: Vec<SimpleSelector>,
    pub target: SimpleSelector,
}

impl Selector {
    pub fn simple(target: SimpleSelector) -> Self {
        Self {
            ancestors: Vec::new(),
            target,
        }
    }

    /// Whether the target names the given element tag.
    pub fn targets_tag(&self, tag: &str) -> bool {
        self.target.tag.as_deref() == Some(tag)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ancestor in &self.ancestors {
            write!(f, "{ancestor} ")?;
        }
        write!(f, "{}", self.target)
    }
}

/// One parsed rule: a selector and its declarations in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct CssRule {
    pub selector: Selector,
    pub properties: Vec<(String, CssValue)>,
}

/// An `@font-face` block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FontFace {
    pub declarations: Vec<(String, CssValue)>,
}

impl FontFace {
    pub fn family(&self) -> Option<&str> {
        self.get("font-family")
            .map(|v| v.raw.trim_matches(['"', '\'']))
    }

    pub fn src(&self) -> Option<&str> {
        self.get("src").map(|v| v.raw.as_str())
    }

    pub fn get(&self, property: &str) -> Option<&CssValue> {
        self.declarations
            .iter()
            .find(|(name, _)| name == property)
            .map(|(_, v)| v)
    }
}

/// A parsed stylesheet.
#[derive(Debug, Default)]
pub struct Stylesheet {
    pub rules: Vec<CssRule>,
    pub font_faces: Vec<FontFace>,
    pub warnings: Vec<StyleWarning>,
}

impl Stylesheet {
    /// Merge rules sharing a selector, later declarations winning, keeping
    /// first-occurrence order.
    pub fn merged_rules(&self) -> Vec<CssRule> {
        let mut merged: Vec<CssRule> = Vec::new();
        for rule in &self.rules {
            if let Some(existing) = merged.iter_mut().find(|r| r.selector == rule.selector) {
                for (name, value) in &rule.properties {
                    set_property(&mut existing.properties, name, value.clone());
                }
            } else {
                merged.push(rule.clone());
            }
        }
        merged
    }
}

/// Insert or replace a property, preserving first-set order.
pub(crate) fn set_property(properties: &mut Vec<(String, CssValue)>, name: &str, value: CssValue) {
    if let Some(slot) = properties.iter_mut().find(|(n, _)| n == name) {
        slot.1 = value;
    } else {
        properties.push((name.to_string(), value));
    }
}
