//! The source document model.
//!
//! An FB2-like semantic tree, supplied by the caller. The crate never
//! parses markup; producing this tree is the input parser's job. The
//! storyline assembler walks it with the style context to emit KFX
//! content.

/// A whole source document.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub title: String,
    pub language: String,
    pub authors: Vec<String>,
    pub sections: Vec<Section>,
    /// Footnote bodies, keyed by their anchor ids in the main flow.
    pub footnotes: Vec<Footnote>,
}

/// One top-level section of the body.
#[derive(Debug, Clone, Default)]
pub struct Section {
    pub id: Option<String>,
    /// Title paragraphs, rendered as a title block before the content.
    pub title: Vec<Paragraph>,
    pub epigraphs: Vec<Epigraph>,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone)]
pub enum Block {
    Paragraph(Paragraph),
    Image(Image),
    /// A blank-line marker. Never becomes a content entry; it turns into
    /// margin hints on its neighbors.
    EmptyLine,
    Subtitle(Paragraph),
    Poem(Poem),
    Cite(Cite),
    Table(Table),
}

/// A paragraph: a sequence of inline spans plus CSS classes.
#[derive(Debug, Clone, Default)]
pub struct Paragraph {
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub spans: Vec<Span>,
}

impl Paragraph {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            spans: vec![Span::plain(text)],
            ..Default::default()
        }
    }

    pub fn with_classes(mut self, classes: &[&str]) -> Self {
        self.classes = classes.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Concatenated plain text of all spans.
    pub fn plain_text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.iter().all(|s| s.text.trim().is_empty())
    }
}

/// An inline run. `tag` is the source markup element (`em`, `strong`,
/// `a`, …); `None` is plain text.
#[derive(Debug, Clone, Default)]
pub struct Span {
    pub text: String,
    pub tag: Option<String>,
    pub classes: Vec<String>,
    /// Link target for anchor spans.
    pub href: Option<String>,
}

impl Span {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn tagged(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tag: Some(tag.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Image {
    pub href: String,
    pub alt: String,
    /// Block images stand alone; inline images flow with text.
    pub is_block: bool,
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Poem {
    pub title: Vec<Paragraph>,
    pub stanzas: Vec<Stanza>,
}

/// A stanza: a run of verse lines.
#[derive(Debug, Clone, Default)]
pub struct Stanza {
    pub lines: Vec<Paragraph>,
}

#[derive(Debug, Clone, Default)]
pub struct Cite {
    pub blocks: Vec<Block>,
    pub author: Option<Paragraph>,
}

#[derive(Debug, Clone, Default)]
pub struct Epigraph {
    pub blocks: Vec<Block>,
    pub author: Option<Paragraph>,
}

/// A simple table; each cell renders as a paragraph.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub rows: Vec<Vec<Paragraph>>,
}

/// A footnote body, reached from the main flow by its id.
#[derive(Debug, Clone, Default)]
pub struct Footnote {
    pub id: String,
    pub title: Vec<Paragraph>,
    pub blocks: Vec<Block>,
}
