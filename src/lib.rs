//! # kindling
//!
//! The core of a KFX e-book converter: turns a structured source document
//! (an FB2-like semantic tree plus a CSS stylesheet) into a valid Amazon
//! KFX container.
//!
//! ## Subsystems
//!
//! - [`container`] / [`itf`] — the versioned binary container and the
//!   self-describing tuple format its fragment payloads use, backed by the
//!   shared symbol catalog in [`symbols`].
//! - [`css`] / [`style`] — the stylesheet parser and the mapper, registry,
//!   and cascade context that rewrite CSS into KFX's symbol-keyed property
//!   model.
//! - [`content`] — the content tree and the margin-collapse engine that
//!   reproduces the reference reader's collapsing semantics.
//! - [`storyline`] — the assembler walking the [`doctree`] source model
//!   into fragments.
//!
//! ## Quick start
//!
//! ```
//! use kindling::doctree::{Block, Document, Paragraph, Section};
//! use kindling::storyline::{AssembleOptions, ResourceMap, assemble_kfx};
//!
//! let document = Document {
//!     title: "Example".to_string(),
//!     language: "en".to_string(),
//!     sections: vec![Section {
//!         blocks: vec![Block::Paragraph(Paragraph::text("Hello, world."))],
//!         ..Default::default()
//!     }],
//!     ..Default::default()
//! };
//!
//! let css = b"p { margin-bottom: 1.2em; text-indent: 1em }";
//! let (container, warnings) =
//!     assemble_kfx(&document, css, &ResourceMap::new(), &AssembleOptions::default())?;
//! let bytes = container.write()?;
//! assert!(bytes.starts_with(b"CONT"));
//! assert!(warnings.is_empty());
//! # Ok::<(), kindling::FormatError>(())
//! ```
//!
//! Reading a container back:
//!
//! ```no_run
//! let bytes: Vec<u8> = std::fs::read("book.kfx").unwrap();
//! let container = kindling::read_container(&bytes)?;
//! println!("{}", container.format_label());
//! # Ok::<(), kindling::FormatError>(())
//! ```

pub mod container;
pub mod content;
pub mod css;
pub mod doctree;
pub mod error;
pub mod itf;
pub mod storyline;
pub mod style;
pub mod symbols;

pub use container::{Container, ContainerFormat, Fragment};
pub use css::{Capabilities, StyleWarning};
pub use error::{FormatError, Result};
pub use storyline::{AssembleOptions, ResourceMap, assemble_kfx};
pub use style::StyleRegistry;

/// Parse a KFX container from bytes.
pub fn read_container(bytes: &[u8]) -> Result<Container> {
    Container::read(bytes)
}
