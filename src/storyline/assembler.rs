//! The source-tree walker and fragment packager.

use super::{AssembleOptions, ResourceMap};
use crate::container::{Container, Fragment, generate_container_id};
use crate::content::{
    ContainerFlags, ContainerHierarchy, ContainerInfo, ContainerKind, ContentRef, ContentTree,
    apply_collapsed_margins, collapse_margins,
};
use crate::css::StyleWarning;
use crate::doctree::{Block, Cite, Document, Epigraph, Image, Paragraph, Poem, Section, Table};
use crate::error::Result;
use crate::itf::ItfValue;
use crate::style::{StyleContext, StyleUsage};
use crate::symbols::{SymbolTable, sym};

/// One open container during the walk.
struct ContainerScope {
    id: u64,
    style: String,
    entry_order: u64,
    /// Wrapper containers collect their children into their own sink and
    /// close into a wrapper entry.
    wrapper: bool,
}

pub(super) struct Assembler<'a> {
    ctx: StyleContext,
    symbols: SymbolTable,
    resources: &'a ResourceMap,
    hierarchy: ContainerHierarchy,
    scopes: Vec<ContainerScope>,
    sinks: Vec<Vec<ContentRef>>,
    next_container_id: u64,
    next_entry_order: u64,
    next_eid: u64,
    /// Document text, indexed by content entries.
    texts: Vec<String>,
    content_name: u64,
    storyline_name: u64,
    section_names: Vec<u64>,
    /// (href, resource_name) pairs actually referenced by content.
    used_resources: Vec<String>,
}

impl<'a> Assembler<'a> {
    pub(super) fn new(ctx: StyleContext, resources: &'a ResourceMap) -> Self {
        let mut symbols = SymbolTable::new();
        let content_name = symbols.get_or_intern("content-0");
        let storyline_name = symbols.get_or_intern("storyline-0");
        Self {
            ctx,
            symbols,
            resources,
            hierarchy: ContainerHierarchy::new(),
            scopes: Vec::new(),
            sinks: vec![Vec::new()],
            next_container_id: 1,
            next_entry_order: 1,
            next_eid: 1,
            texts: Vec::new(),
            content_name,
            storyline_name,
            section_names: Vec::new(),
            used_resources: Vec::new(),
        }
    }

    // --- walking ---

    pub(super) fn walk_document(&mut self, document: &Document) {
        for (index, section) in document.sections.iter().enumerate() {
            self.walk_section(section, index);
        }
        for footnote in &document.footnotes {
            self.enter_container(
                ContainerKind::Footnote,
                ContainerFlags::NONE,
                "div",
                &classes(&["footnote"]),
            );
            for paragraph in &footnote.title {
                self.emit_paragraph(paragraph, "subtitle");
            }
            for block in &footnote.blocks {
                self.walk_block(block);
            }
            self.exit_container();
        }
    }

    fn walk_section(&mut self, section: &Section, index: usize) {
        let name = self.symbols.get_or_intern(&format!("section-{index}"));
        self.section_names.push(name);

        self.enter_container(ContainerKind::Section, ContainerFlags::NONE, "section", &[]);

        if !section.title.is_empty() {
            self.enter_wrapper(
                ContainerKind::TitleBlock,
                ContainerFlags::TITLE_BLOCK_MODE,
                "div",
                &classes(&["title"]),
            );
            for paragraph in &section.title {
                self.emit_paragraph(paragraph, "p");
            }
            self.exit_container();
        }

        for epigraph in &section.epigraphs {
            self.walk_epigraph(epigraph);
        }

        for block in &section.blocks {
            self.walk_block(block);
        }

        self.exit_container();
    }

    fn walk_block(&mut self, block: &Block) {
        match block {
            Block::Paragraph(paragraph) => self.emit_paragraph(paragraph, "p"),
            Block::Subtitle(paragraph) => self.emit_paragraph(paragraph, "subtitle"),
            Block::Image(image) => self.emit_image(image),
            Block::EmptyLine => self.handle_empty_line(),
            Block::Poem(poem) => self.walk_poem(poem),
            Block::Cite(cite) => self.walk_cite(cite),
            Block::Table(table) => self.walk_table(table),
        }
    }

    fn walk_poem(&mut self, poem: &Poem) {
        self.enter_container(
            ContainerKind::Poem,
            ContainerFlags::NONE,
            "div",
            &classes(&["poem"]),
        );
        if !poem.title.is_empty() {
            self.enter_wrapper(
                ContainerKind::TitleBlock,
                ContainerFlags::TITLE_BLOCK_MODE,
                "div",
                &classes(&["title"]),
            );
            for paragraph in &poem.title {
                self.emit_paragraph(paragraph, "p");
            }
            self.exit_container();
        }
        for stanza in &poem.stanzas {
            self.enter_wrapper(
                ContainerKind::Stanza,
                ContainerFlags::TITLE_BLOCK_MODE
                    | ContainerFlags::STRIP_MIDDLE_MARGIN_BOTTOM
                    | ContainerFlags::TRANSFER_MB_TO_LAST_CHILD,
                "div",
                &classes(&["stanza"]),
            );
            for line in &stanza.lines {
                self.emit_paragraph(line, "v");
            }
            self.exit_container();
        }
        self.exit_container();
    }

    fn walk_cite(&mut self, cite: &Cite) {
        self.enter_container(
            ContainerKind::Cite,
            ContainerFlags::NONE,
            "div",
            &classes(&["cite"]),
        );
        for block in &cite.blocks {
            self.walk_block(block);
        }
        if let Some(author) = &cite.author {
            self.emit_paragraph(author, "text-author");
        }
        self.exit_container();
    }

    fn walk_epigraph(&mut self, epigraph: &Epigraph) {
        self.enter_container(
            ContainerKind::Epigraph,
            ContainerFlags::TRANSFER_MB_TO_LAST_CHILD,
            "div",
            &classes(&["epigraph"]),
        );
        for block in &epigraph.blocks {
            self.walk_block(block);
        }
        if let Some(author) = &epigraph.author {
            self.emit_paragraph(author, "text-author");
        }
        self.exit_container();
    }

    /// Cells flatten into the current flow as `td`-styled paragraphs.
    fn walk_table(&mut self, table: &Table) {
        for row in &table.rows {
            for cell in row {
                self.emit_paragraph(cell, "td");
            }
        }
    }

    // --- container management ---

    fn current_container(&self) -> u64 {
        self.scopes.last().map(|s| s.id).unwrap_or(0)
    }

    fn next_order(&mut self) -> u64 {
        let order = self.next_entry_order;
        self.next_entry_order += 1;
        order
    }

    fn enter_container(
        &mut self,
        kind: ContainerKind,
        flags: ContainerFlags,
        tag: &str,
        class_list: &[String],
    ) {
        self.enter(kind, flags, tag, class_list, false);
    }

    fn enter_wrapper(
        &mut self,
        kind: ContainerKind,
        flags: ContainerFlags,
        tag: &str,
        class_list: &[String],
    ) {
        self.enter(kind, flags, tag, class_list, true);
    }

    fn enter(
        &mut self,
        kind: ContainerKind,
        mut flags: ContainerFlags,
        tag: &str,
        class_list: &[String],
        wrapper: bool,
    ) {
        let id = self.next_container_id;
        self.next_container_id += 1;
        let parent_id = self.current_container();
        let entry_order = self.next_order();

        let style = self.ctx.push_block(tag, class_list);
        let (margin_top, margin_bottom) = self.ctx.margins_of(&style);

        // Top or bottom decoration pins margins in place.
        if let Some(props) = self.ctx.registry_mut().resolve_by_name(&style) {
            if props.contains(sym::PADDING_TOP) || props.contains(sym::BORDER_TOP_WIDTH) {
                flags = flags | ContainerFlags::PREVENT_COLLAPSE_TOP;
            }
            if props.contains(sym::PADDING_BOTTOM) || props.contains(sym::BORDER_BOTTOM_WIDTH) {
                flags = flags | ContainerFlags::PREVENT_COLLAPSE_BOTTOM;
            }
        }

        self.hierarchy.insert(
            id,
            ContainerInfo {
                parent_id,
                kind,
                flags,
                entry_order,
                margin_top,
                margin_bottom,
            },
        );
        self.scopes.push(ContainerScope {
            id,
            style,
            entry_order,
            wrapper,
        });
        if wrapper {
            self.sinks.push(Vec::new());
        }
    }

    fn exit_container(&mut self) {
        let scope = self.scopes.pop().expect("exit without enter");
        self.ctx.pop_block();

        if !scope.wrapper {
            return;
        }
        let children = self.sinks.pop().expect("wrapper sink missing");
        if children.is_empty() {
            return;
        }

        let (margin_top, margin_bottom) = self.ctx.margins_of(&scope.style);
        let element_id = self.next_eid;
        self.next_eid += 1;

        let style_symbol = self.symbols.get_or_intern(&scope.style);
        let raw_entry = ItfValue::Struct(vec![
            (sym::CONTENT_TYPE, ItfValue::Symbol(sym::CONTAINER_CONTENT)),
            (sym::STYLE, ItfValue::Symbol(style_symbol)),
            (sym::POSITION, ItfValue::Int(element_id as i64)),
        ]);
        self.ctx
            .registry_mut()
            .mark_usage(&scope.style, StyleUsage::Block);

        let entry = ContentRef {
            container_id: self.current_container(),
            parent_container_id: self.parent_of(self.current_container()),
            entry_order: scope.entry_order,
            element_id,
            content_type: sym::CONTAINER_CONTENT,
            style: scope.style,
            margin_top,
            margin_bottom,
            has_content: true,
            raw_entry: Some(raw_entry),
            child_refs: children,
            ..Default::default()
        };
        self.sink().push(entry);
    }

    fn parent_of(&self, container_id: u64) -> u64 {
        self.hierarchy
            .get(container_id)
            .map(|info| info.parent_id)
            .unwrap_or(0)
    }

    fn sink(&mut self) -> &mut Vec<ContentRef> {
        self.sinks.last_mut().expect("no entry sink")
    }

    // --- entry emission ---

    fn handle_empty_line(&mut self) {
        self.ctx.push_empty_line();
        if let Some(last) = self.sink().last_mut() {
            last.strip_margin_bottom = true;
        }
    }

    /// Attach a pending empty-line margin to the entry being emitted: the
    /// next element's top margin, or the previous element's bottom margin
    /// when the next element is an image.
    fn apply_pending_empty_line(&mut self, entry: &mut ContentRef, is_image: bool) {
        let Some(margin) = self.ctx.take_empty_line_margin() else {
            return;
        };
        if is_image {
            if let Some(previous) = self.sink().last_mut() {
                previous.empty_line_margin_bottom = Some(margin);
                return;
            }
        }
        entry.empty_line_margin_top = Some(margin);
    }

    fn emit_paragraph(&mut self, paragraph: &Paragraph, tag: &str) {
        let style = self.ctx.resolve(tag, &paragraph.classes);
        let (margin_top, margin_bottom) = self.ctx.margins_of(&style);
        let has_break_after_avoid = self
            .ctx
            .registry_mut()
            .resolve_by_name(&style)
            .and_then(|props| props.get(sym::KEEP_LAST).cloned())
            == Some(ItfValue::Symbol(sym::VALUE_AVOID));

        let element_id = self.next_eid;
        self.next_eid += 1;
        let text = paragraph.plain_text();
        let text_index = self.texts.len();
        self.texts.push(text);

        let runs = self.inline_runs(&style, paragraph);
        let style_symbol = self.symbols.get_or_intern(&style);

        let mut fields = vec![
            (sym::CONTENT_TYPE, ItfValue::Symbol(sym::TEXT_BLOCK)),
            (sym::STYLE, ItfValue::Symbol(style_symbol)),
            (sym::POSITION, ItfValue::Int(element_id as i64)),
            (sym::CONTENT_NAME, ItfValue::Symbol(self.content_name)),
            (sym::OFFSET, ItfValue::Int(text_index as i64)),
        ];
        if !runs.is_empty() {
            fields.push((sym::INLINE_STYLE_RUNS, ItfValue::List(runs)));
        }

        let mut entry = ContentRef {
            container_id: self.current_container(),
            parent_container_id: self.parent_of(self.current_container()),
            entry_order: self.next_order(),
            element_id,
            content_type: sym::TEXT_BLOCK,
            style,
            margin_top,
            margin_bottom,
            has_break_after_avoid,
            has_content: !paragraph.is_empty(),
            raw_entry: Some(ItfValue::Struct(fields)),
            ..Default::default()
        };
        self.apply_pending_empty_line(&mut entry, false);
        self.sink().push(entry);
    }

    fn inline_runs(&mut self, block_style: &str, paragraph: &Paragraph) -> Vec<ItfValue> {
        let mut runs = Vec::new();
        let mut offset = 0usize;
        for span in &paragraph.spans {
            let length = span.text.len();
            if let Some(tag) = &span.tag {
                let delta = self.ctx.resolve_inline_delta(block_style, tag, &span.classes);
                let mut fields = vec![
                    (sym::OFFSET, ItfValue::Int(offset as i64)),
                    (sym::COUNT, ItfValue::Int(length as i64)),
                ];
                if let Some(delta) = &delta {
                    let id = self.symbols.get_or_intern(delta);
                    fields.push((sym::STYLE, ItfValue::Symbol(id)));
                }
                if let Some(href) = &span.href {
                    let id = self.symbols.get_or_intern(href);
                    fields.push((sym::LINK_TO, ItfValue::Symbol(id)));
                }
                if fields.len() > 2 {
                    runs.push(ItfValue::Struct(fields));
                }
            }
            offset += length;
        }
        runs
    }

    fn emit_image(&mut self, image: &Image) {
        let style = self.ctx.resolve("img", &image.classes);
        let is_float = self
            .ctx
            .registry_mut()
            .resolve_by_name(&style)
            .and_then(|props| props.get(sym::FLOAT).cloned())
            == Some(ItfValue::Symbol(sym::FLOAT_SNAP_BLOCK));
        let (margin_top, margin_bottom) = self.ctx.margins_of(&style);

        let element_id = self.next_eid;
        self.next_eid += 1;
        let style_symbol = self.symbols.get_or_intern(&style);

        let mut fields = vec![
            (sym::CONTENT_TYPE, ItfValue::Symbol(sym::IMAGE_CONTENT)),
            (sym::STYLE, ItfValue::Symbol(style_symbol)),
            (sym::POSITION, ItfValue::Int(element_id as i64)),
        ];
        match self.resources.get(&image.href) {
            Some(resource) => {
                let name = self.symbols.get_or_intern(&resource.resource_name);
                fields.push((sym::RESOURCE_NAME, ItfValue::Symbol(name)));
                fields.push((sym::WIDTH, ItfValue::Int(resource.width_px as i64)));
                fields.push((sym::HEIGHT, ItfValue::Int(resource.height_px as i64)));
                if !self.used_resources.contains(&image.href) {
                    self.used_resources.push(image.href.clone());
                }
            }
            None => {
                log::warn!("image `{}` has no extracted resource", image.href);
                fields.push((sym::LOCATION, ItfValue::String(image.href.clone())));
            }
        }
        if !image.alt.is_empty() {
            fields.push((sym::IMAGE_ALT_TEXT, ItfValue::String(image.alt.clone())));
        }

        let mut entry = ContentRef {
            container_id: self.current_container(),
            parent_container_id: self.parent_of(self.current_container()),
            entry_order: self.next_order(),
            element_id,
            content_type: sym::IMAGE_CONTENT,
            style,
            margin_top,
            margin_bottom,
            is_float_image: is_float,
            has_content: true,
            raw_entry: Some(ItfValue::Struct(fields)),
            ..Default::default()
        };
        self.apply_pending_empty_line(&mut entry, true);
        self.sink().push(entry);
    }

    // --- packaging ---

    pub(super) fn finish(
        mut self,
        document: &Document,
        options: &AssembleOptions,
    ) -> Result<(Container, Vec<StyleWarning>)> {
        debug_assert!(self.scopes.is_empty(), "unbalanced container walk");
        let mut refs = self.sinks.pop().expect("top-level sink");

        // Margin collapsing and style write-back.
        let mut tree = ContentTree::build(&refs, &self.hierarchy);
        collapse_margins(&mut tree);
        apply_collapsed_margins(
            &tree,
            &mut refs,
            self.ctx.registry_mut(),
            &mut self.symbols,
        );

        let mut fragments: Vec<Fragment> = Vec::new();

        // Text content.
        fragments.push(Fragment::new(
            sym::TEXT_CONTENT,
            self.content_name,
            ItfValue::Struct(vec![(
                sym::CONTENT_ARRAY,
                ItfValue::List(
                    self.texts
                        .iter()
                        .map(|t| ItfValue::String(t.clone()))
                        .collect(),
                ),
            )]),
        ));

        // Storyline with the nested entry structs.
        let entries: Vec<ItfValue> = refs.iter().map(entry_value).collect();
        fragments.push(Fragment::new(
            sym::STORYLINE,
            self.storyline_name,
            ItfValue::Struct(vec![
                (
                    sym::READING_ORDER_NAME,
                    ItfValue::Symbol(self.storyline_name),
                ),
                (sym::CONTENT_ARRAY, ItfValue::List(entries)),
            ]),
        ));

        // Sections.
        for &section_name in &self.section_names {
            fragments.push(Fragment::new(
                sym::SECTION,
                section_name,
                ItfValue::Struct(vec![
                    (sym::SECTION_NAME, ItfValue::Symbol(section_name)),
                    (
                        sym::SECTION_CONTENT,
                        ItfValue::List(vec![ItfValue::Symbol(self.storyline_name)]),
                    ),
                ]),
            ));
        }

        // Document data.
        fragments.push(Fragment::root(
            sym::DOCUMENT_DATA,
            ItfValue::Struct(vec![(
                sym::READING_ORDERS,
                ItfValue::List(vec![ItfValue::Struct(vec![
                    (
                        sym::READING_ORDER_NAME,
                        ItfValue::Symbol(self.storyline_name),
                    ),
                    (
                        sym::SECTIONS_LIST,
                        ItfValue::List(
                            self.section_names
                                .iter()
                                .map(|&s| ItfValue::Symbol(s))
                                .collect(),
                        ),
                    ),
                ])]),
            )]),
        ));

        // Book metadata.
        fragments.push(Fragment::root(
            sym::BOOK_METADATA,
            book_metadata(document),
        ));

        // Resource descriptions for referenced images.
        for href in &self.used_resources {
            let Some(resource) = self.resources.get(href) else {
                continue;
            };
            let name = self.symbols.get_or_intern(&resource.resource_name);
            let format = if href.to_ascii_lowercase().ends_with(".png") {
                sym::PNG_FORMAT
            } else {
                sym::JPG_FORMAT
            };
            fragments.push(Fragment::new(
                sym::RESOURCE,
                name,
                ItfValue::Struct(vec![
                    (sym::RESOURCE_NAME, ItfValue::Symbol(name)),
                    (sym::LOCATION, ItfValue::String(href.clone())),
                    (sym::FORMAT, ItfValue::Symbol(format)),
                    (sym::WIDTH, ItfValue::Int(resource.width_px as i64)),
                    (sym::HEIGHT, ItfValue::Int(resource.height_px as i64)),
                ]),
            ));
        }

        // Styles referenced by surviving content.
        self.ctx
            .registry_mut()
            .recompute_used_styles(&fragments, &self.symbols);
        let style_fragments = self
            .ctx
            .registry_mut()
            .build_fragments(&mut self.symbols);
        fragments.extend(style_fragments);

        let container_id = options
            .container_id
            .clone()
            .unwrap_or_else(generate_container_id);
        let mut container = Container::new(container_id);
        container.generator_app = options.generator_app.clone().unwrap_or_default();
        container.generator_pkg = options.generator_pkg.clone().unwrap_or_default();
        container.doc_symbols = self.symbols.local_symbols().to_vec();
        container.format_capabilities = Some(default_capabilities());
        for fragment in fragments {
            container.add_fragment(fragment)?;
        }

        Ok((container, self.ctx.take_warnings()))
    }
}

/// Compose the serialized entry struct, nesting wrapper children.
fn entry_value(entry: &ContentRef) -> ItfValue {
    let mut fields = match &entry.raw_entry {
        Some(ItfValue::Struct(fields)) => fields.clone(),
        _ => vec![(
            sym::CONTENT_TYPE,
            ItfValue::Symbol(entry.content_type),
        )],
    };
    if !entry.child_refs.is_empty() {
        fields.push((
            sym::CONTENT_ARRAY,
            ItfValue::List(entry.child_refs.iter().map(entry_value).collect()),
        ));
    }
    ItfValue::Struct(fields)
}

fn book_metadata(document: &Document) -> ItfValue {
    let mut entries = Vec::new();
    let mut push = |key: &str, value: &str| {
        if !value.is_empty() {
            entries.push(ItfValue::Struct(vec![
                (sym::METADATA_KEY, ItfValue::String(key.to_string())),
                (sym::VALUE, ItfValue::String(value.to_string())),
            ]));
        }
    };
    push("title", &document.title);
    push("language", &document.language);
    for author in &document.authors {
        push("author", author);
    }
    ItfValue::Struct(vec![(sym::METADATA_ENTRIES, ItfValue::List(entries))])
}

fn default_capabilities() -> ItfValue {
    ItfValue::Struct(vec![(
        sym::CAPABILITIES_LIST,
        ItfValue::List(vec![
            ItfValue::Struct(vec![
                (
                    sym::CAPABILITY_NAME,
                    ItfValue::String("kfxgen.textBlock".to_string()),
                ),
                (sym::VERSION, ItfValue::Int(1)),
            ]),
            ItfValue::Struct(vec![
                (
                    sym::CAPABILITY_NAME,
                    ItfValue::String("kfxgen.positionMaps".to_string()),
                ),
                (sym::VERSION, ItfValue::Int(2)),
            ]),
        ]),
    )])
}

fn classes(list: &[&str]) -> Vec<String> {
    list.iter().map(|c| c.to_string()).collect()
}
