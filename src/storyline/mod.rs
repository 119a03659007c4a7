//! Storyline assembly: walking the source tree into KFX fragments.
//!
//! The assembler drives the style context over the semantic tree, emits
//! the flat [`crate::content::ContentRef`] sequence, runs the margin
//! collapser, and packages the results as a [`Container`].

mod assembler;

use std::collections::HashMap;

use crate::container::Container;
use crate::css::{Capabilities, StyleWarning, parse_stylesheet};
use crate::doctree::Document;
use crate::error::Result;
use crate::style::StyleContext;

/// An image known to the resource pipeline.
#[derive(Debug, Clone)]
pub struct ImageResource {
    /// Short resource name referenced from content (e.g. `e0`).
    pub resource_name: String,
    pub width_px: u32,
    pub height_px: u32,
}

/// `href -> resource` map supplied by the image extraction stage.
pub type ResourceMap = HashMap<String, ImageResource>;

/// Options for one assembly run.
#[derive(Debug, Clone, Default)]
pub struct AssembleOptions {
    /// Container id; generated when absent.
    pub container_id: Option<String>,
    /// Capability flags for `@media` evaluation.
    pub capabilities: Capabilities,
    pub generator_app: Option<String>,
    pub generator_pkg: Option<String>,
}

/// Convert a source tree plus CSS into a KFX container.
///
/// Stylesheet problems never fail the assembly; they come back in the
/// warning list beside the container.
pub fn assemble_kfx(
    document: &Document,
    css: &[u8],
    resources: &ResourceMap,
    options: &AssembleOptions,
) -> Result<(Container, Vec<StyleWarning>)> {
    let css_text = String::from_utf8_lossy(css);
    let sheet = parse_stylesheet(&css_text, options.capabilities);
    let context = StyleContext::from_stylesheet(&sheet);

    let mut assembler = assembler::Assembler::new(context, resources);
    assembler.walk_document(document);
    assembler.finish(document, options)
}
