//! Shared symbol catalog and local symbol table management.
//!
//! KFX names everything by numeric symbol ID. IDs up to [`MAX_SHARED_ID`]
//! belong to the shared `YJ_symbols` catalog that the reader ecosystem knows
//! by number; IDs past it are document-local and resolved through the
//! container's own symbol table.

use std::sync::OnceLock;

use crate::itf::{ItfValue, ItfWriter};

/// Symbol IDs from the YJ_symbols shared table (version 10).
/// These are the well-known symbols used in the KFX format.
#[allow(dead_code)]
pub mod sym {
    // Ion system symbols (IDs 1-9 precede the shared import)
    pub const ION: u64 = 1;
    pub const ION_1_0: u64 = 2;
    pub const ION_SYMBOL_TABLE: u64 = 3;
    pub const NAME: u64 = 4;
    pub const VERSION: u64 = 5;
    pub const IMPORTS: u64 = 6;
    pub const SYMBOLS: u64 = 7;
    pub const MAX_ID: u64 = 8;

    // ==========================================================================
    // STYLE PROPERTY SYMBOLS
    // ==========================================================================

    pub const LANGUAGE: u64 = 10; // $10 - language
    pub const FONT_FAMILY: u64 = 11; // $11 - font-family
    pub const FONT_STYLE: u64 = 12; // $12 - font-style
    pub const FONT_WEIGHT: u64 = 13; // $13 - font-weight
    pub const FONT_SIZE: u64 = 16; // $16 - font-size
    pub const COLOR: u64 = 19; // $19 - text color (packed ARGB integer)
    pub const FILL_COLOR: u64 = 21; // $21 - background / fill color
    pub const UNDERLINE: u64 = 23; // $23 - text-decoration: underline
    pub const STRIKETHROUGH: u64 = 27; // $27 - text-decoration: line-through
    pub const LETTER_SPACING: u64 = 32; // $32 - letter-spacing
    pub const WORD_SPACING: u64 = 33; // $33 - word-spacing
    pub const TEXT_ALIGN: u64 = 34; // $34 - text alignment
    pub const TEXT_INDENT: u64 = 36; // $36 - text indent
    pub const TEXT_TRANSFORM: u64 = 41; // $41 - text-transform
    pub const LINE_HEIGHT: u64 = 42; // $42 - line-height
    pub const VERTICAL_ALIGN: u64 = 44; // $44 - vertical-align

    // Margins emit in lh (line-height units); left/right in percent.
    pub const MARGIN_TOP: u64 = 47; // $47 - margin-top / space-before
    pub const MARGIN_LEFT: u64 = 48; // $48 - margin-left
    pub const MARGIN_BOTTOM: u64 = 49; // $49 - margin-bottom / space-after
    pub const MARGIN_RIGHT: u64 = 50; // $50 - margin-right
    pub const PADDING_TOP: u64 = 52; // $52 - padding-top
    pub const PADDING_BOTTOM: u64 = 54; // $54 - padding-bottom
    pub const PADDING_LEFT: u64 = 55; // $55 - padding-left
    pub const PADDING_RIGHT: u64 = 53; // $53 - padding-right

    pub const STYLE_WIDTH: u64 = 56; // $56 - width in style
    pub const STYLE_HEIGHT: u64 = 57; // $57 - height in style

    pub const BORDER_TOP_COLOR: u64 = 83; // $83
    pub const BORDER_TOP_PRESENT: u64 = 88; // $88 - border-top decoration present
    pub const BORDER_TOP_WIDTH: u64 = 93; // $93 - border-top-width
    pub const BORDER_BOTTOM_WIDTH: u64 = 95; // $95 - border-bottom-width

    pub const BREAK_INSIDE: u64 = 135; // $135 - break-inside property
    pub const STYLE_BLOCK_TYPE: u64 = 127; // $127 - display mode for styles

    // ==========================================================================
    // CONTENT STRUCTURE SYMBOLS
    // ==========================================================================

    pub const SECTION_CONTENT: u64 = 141; // $141 - section content list
    pub const INLINE_STYLE_RUNS: u64 = 142; // $142 - inline style runs array
    pub const OFFSET: u64 = 143; // $143 - offset within content
    pub const COUNT: u64 = 144; // $144 - count/length
    pub const TEXT_CONTENT: u64 = 145; // $145 - text content fragment type
    pub const CONTENT_ARRAY: u64 = 146; // $146 - array of content items
    pub const DESCRIPTION: u64 = 154; // $154 - description
    pub const POSITION: u64 = 155; // $155 - position / EID
    pub const STYLE: u64 = 157; // $157 - style fragment type & style field
    pub const CONTENT_TYPE: u64 = 159; // $159 - content type symbol
    pub const FORMAT: u64 = 161; // $161 - format
    pub const MIME_TYPE: u64 = 162; // $162 - MIME type string
    pub const RESOURCE: u64 = 164; // $164 - resource fragment type
    pub const LOCATION: u64 = 165; // $165 - resource location
    pub const READING_ORDERS: u64 = 169; // $169 - reading orders list
    pub const SECTIONS_LIST: u64 = 170; // $170 - list of sections
    pub const STYLE_NAME: u64 = 173; // $173 - style name/id
    pub const SECTION_NAME: u64 = 174; // $174 - section name/id
    pub const RESOURCE_NAME: u64 = 175; // $175 - external resource name
    pub const CONTENT_NAME: u64 = 176; // $176 - content block name/id
    pub const READING_ORDER_NAME: u64 = 178; // $178 - reading order name
    pub const LINK_TO: u64 = 179; // $179 - link target
    pub const ENTITY_LIST: u64 = 181; // $181 - list of entities

    pub const TEXT: u64 = 244; // $244 - text content field

    pub const STORYLINE: u64 = 259; // $259 - storyline fragment type
    pub const SECTION: u64 = 260; // $260 - section fragment type
    pub const METADATA: u64 = 258; // $258 - metadata fragment type
    pub const CONTAINER_FRAGMENT: u64 = 270; // $270 - container fragment type
    pub const IMAGE_CONTENT: u64 = 271; // $271 - image content type
    pub const TEXT_BLOCK: u64 = 269; // $269 - text block content type
    pub const CONTAINER_CONTENT: u64 = 276; // $276 - nested container content type
    pub const PNG_FORMAT: u64 = 284; // $284 - PNG image format
    pub const JPG_FORMAT: u64 = 285; // $285 - JPEG image format

    // ==========================================================================
    // DIMENSION STRUCTS { $306: unit, $307: value }
    // ==========================================================================

    pub const UNIT: u64 = 306; // $306 - unit field in value struct
    pub const VALUE: u64 = 307; // $307 - value field in value struct
    pub const UNIT_EM: u64 = 308; // $308 - em unit
    pub const UNIT_LH: u64 = 310; // $310 - line-height multiplier unit
    pub const UNIT_PERCENT: u64 = 314; // $314 - percent unit
    pub const UNIT_PX: u64 = 318; // $318 - px unit
    pub const UNIT_PT: u64 = 319; // $319 - points unit
    pub const UNIT_REM: u64 = 505; // $505 - rem (em-of-root) unit, font-size only

    // ==========================================================================
    // ENUMERATED VALUES
    // ==========================================================================

    pub const ALIGN_LEFT: u64 = 59; // $59 - text-align: left
    pub const ALIGN_RIGHT: u64 = 61; // $61 - text-align: right
    pub const ALIGN_CENTER: u64 = 320; // $320 - text-align: center
    pub const ALIGN_JUSTIFY: u64 = 321; // $321 - text-align: justify

    pub const VALUE_NONE: u64 = 349; // $349 - generic "none"/"normal"
    pub const FONT_WEIGHT_NORMAL: u64 = 350; // $350
    pub const VALUE_AVOID: u64 = 353; // $353 - avoid (break control)
    pub const FONT_WEIGHT_LIGHT: u64 = 357; // $357 - weights <= 300
    pub const FONT_WEIGHT_MEDIUM: u64 = 359; // $359 - weight 500
    pub const FONT_WEIGHT_SEMIBOLD: u64 = 360; // $360 - weight 600
    pub const FONT_WEIGHT_BOLD: u64 = 361; // $361 - weights >= 700
    pub const FONT_STYLE_ITALIC: u64 = 382; // $382 - font-style: italic
    pub const TEXT_TRANSFORM_UPPERCASE: u64 = 372; // $372
    pub const TEXT_TRANSFORM_LOWERCASE: u64 = 373; // $373
    pub const TEXT_TRANSFORM_CAPITALIZE: u64 = 374; // $374

    pub const VERTICAL_SUPER: u64 = 370; // $370 - vertical-align: super
    pub const VERTICAL_SUB: u64 = 371; // $371 - vertical-align: sub

    // ==========================================================================
    // RESOURCE / CONTAINER PLUMBING
    // ==========================================================================

    pub const CONTAINER_ID: u64 = 409; // $409 - container ID string
    pub const COMPRESSION_TYPE: u64 = 410; // $410 - compression type
    pub const DRM_SCHEME: u64 = 411; // $411 - DRM scheme
    pub const CHUNK_SIZE: u64 = 412; // $412 - chunk size
    pub const INDEX_TABLE_OFFSET: u64 = 413; // $413 - entity directory offset
    pub const INDEX_TABLE_LENGTH: u64 = 414; // $414 - entity directory length
    pub const SYMBOL_TABLE_OFFSET: u64 = 415; // $415 - doc symbol table offset
    pub const SYMBOL_TABLE_LENGTH: u64 = 416; // $416 - doc symbol table length
    pub const RAW_MEDIA: u64 = 417; // $417 - raw media fragment type
    pub const RAW_FONT: u64 = 418; // $418 - raw font fragment type
    pub const ENTITY_MAP: u64 = 419; // $419 - container entity map
    pub const WIDTH: u64 = 422; // $422 - image width in pixels
    pub const HEIGHT: u64 = 423; // $423 - image height in pixels

    pub const BORDER_RADIUS_TL: u64 = 459; // $459 - border-top-left-radius
    pub const BORDER_RADIUS_TR: u64 = 460; // $460
    pub const BORDER_RADIUS_BR: u64 = 461; // $461
    pub const BORDER_RADIUS_BL: u64 = 462; // $462
    pub const BORDER_RADIUS: u64 = 458; // $458 - uniform radius shorthand

    pub const BOOK_METADATA: u64 = 490; // $490 - book metadata fragment type
    pub const METADATA_ENTRIES: u64 = 491; // $491 - metadata entries list
    pub const METADATA_KEY: u64 = 492; // $492 - metadata key
    pub const METADATA_GROUP: u64 = 495; // $495 - metadata group name

    pub const DOCUMENT_DATA: u64 = 538; // $538 - document data fragment type
    pub const LOCATION_MAP: u64 = 550; // $550 - location map fragment type
    pub const IMAGE_ALT_TEXT: u64 = 584; // $584 - image alt text

    pub const CAPABILITY_NAME: u64 = 586; // $586 - capability provider name
    pub const MIN_VERSION: u64 = 587; // $587 - minimum version
    pub const CAPABILITY_VERSION: u64 = 589; // $589 - capability version struct
    pub const CAPABILITIES_LIST: u64 = 590; // $590 - capabilities list
    pub const FORMAT_CAPABILITIES: u64 = 593; // $593 - format capabilities type
    pub const FC_OFFSET: u64 = 594; // $594 - format capabilities offset
    pub const FC_LENGTH: u64 = 595; // $595 - format capabilities length

    // ==========================================================================
    // FLOAT / SHAPE / PAGE LAYOUT
    // ==========================================================================

    pub const FLOAT: u64 = 627; // $627 - float property
    pub const CLEAR: u64 = 628; // $628 - clear property
    pub const FLOAT_SNAP_BLOCK: u64 = 629; // $629 - float: snap-block value
    pub const BORDER_PATH: u64 = 761; // $761 - yj.border_path shape outline

    pub const EMPHASIS_SHAPE: u64 = 641; // $641 - text-emphasis shape
    pub const EMPHASIS_FILL: u64 = 642; // $642 - text-emphasis fill
    pub const EMPHASIS_FILLED: u64 = 643; // $643 - filled
    pub const EMPHASIS_OPEN: u64 = 644; // $644 - open
    pub const EMPHASIS_DOT: u64 = 645; // $645 - dot shape
    pub const EMPHASIS_CIRCLE: u64 = 646; // $646 - circle shape
    pub const EMPHASIS_DOUBLE_CIRCLE: u64 = 647; // $647 - double-circle shape
    pub const EMPHASIS_TRIANGLE: u64 = 648; // $648 - triangle shape
    pub const EMPHASIS_SESAME: u64 = 649; // $649 - sesame shape
    pub const EMPHASIS_POSITION_H: u64 = 655; // $655 - horizontal position
    pub const EMPHASIS_POSITION_V: u64 = 656; // $656 - vertical position
    pub const EMPHASIS_OVER: u64 = 657; // $657 - position: over
    pub const EMPHASIS_UNDER: u64 = 658; // $658 - position: under

    pub const USER_MARGIN_TOP_PERCENT: u64 = 651; // $651 - -amzn-page-align top
    pub const USER_MARGIN_BOTTOM_PERCENT: u64 = 652; // $652
    pub const USER_MARGIN_LEFT_PERCENT: u64 = 653; // $653
    pub const USER_MARGIN_RIGHT_PERCENT: u64 = 654; // $654

    // ==========================================================================
    // KEEP CONTROL (widows/orphans, page-break avoidance)
    // ==========================================================================

    pub const KEEP_LINES_TOGETHER: u64 = 786; // $786 - widows/orphans struct
    pub const KEEP_FIRST: u64 = 790; // $790 - keep with previous / orphan count
    pub const KEEP_LAST: u64 = 791; // $791 - keep with next / widow count
}

/// Highest symbol ID covered by the shared catalog. Anything above is a
/// document-local symbol.
pub const MAX_SHARED_ID: u64 = 860;

/// First document-local symbol ID.
pub const LOCAL_MIN_ID: u64 = MAX_SHARED_ID + 1;

/// Number of names the shared import declares (IDs 10..=860).
pub const SHARED_SYMBOL_COUNT: u64 = MAX_SHARED_ID - 9;

/// Canonical name of a shared symbol.
pub fn name(id: u64) -> String {
    format!("${id}")
}

/// Resolve a `$nnn` name (or a semantic alias) back to its shared ID.
pub fn id(name: &str) -> Option<u64> {
    if let Some(num) = name.strip_prefix('$') {
        let id: u64 = num.parse().ok()?;
        return (id <= MAX_SHARED_ID).then_some(id);
    }
    alias_id(name)
}

/// Semantic aliases for the subset of the catalog this crate manipulates.
fn alias_id(name: &str) -> Option<u64> {
    let id = match name {
        "language" => sym::LANGUAGE,
        "font_family" => sym::FONT_FAMILY,
        "font_style" => sym::FONT_STYLE,
        "font_weight" => sym::FONT_WEIGHT,
        "font_size" => sym::FONT_SIZE,
        "color" => sym::COLOR,
        "fill_color" => sym::FILL_COLOR,
        "text_align" => sym::TEXT_ALIGN,
        "text_indent" => sym::TEXT_INDENT,
        "line_height" => sym::LINE_HEIGHT,
        "margin_top" => sym::MARGIN_TOP,
        "margin_left" => sym::MARGIN_LEFT,
        "margin_bottom" => sym::MARGIN_BOTTOM,
        "margin_right" => sym::MARGIN_RIGHT,
        "style" => sym::STYLE,
        "style_name" => sym::STYLE_NAME,
        "resource_name" => sym::RESOURCE_NAME,
        "link_to" => sym::LINK_TO,
        "storyline" => sym::STORYLINE,
        "section" => sym::SECTION,
        "document_data" => sym::DOCUMENT_DATA,
        "metadata" => sym::METADATA,
        "book_metadata" => sym::BOOK_METADATA,
        "raw_media" => sym::RAW_MEDIA,
        "raw_font" => sym::RAW_FONT,
        _ => return None,
    };
    Some(id)
}

/// Serialized import declaration of the shared catalog: BVM plus a
/// `$ion_symbol_table`-annotated struct importing `YJ_symbols`.
///
/// Prepended to every ITF blob whose symbols resolve through the shared
/// table. Computed once per process.
pub fn shared_prolog() -> &'static [u8] {
    static PROLOG: OnceLock<Vec<u8>> = OnceLock::new();
    PROLOG.get_or_init(|| build_prolog(&[]))
}

/// Import declaration extended with document-local symbols. Local symbol
/// `i` resolves to ID `LOCAL_MIN_ID + i`.
pub fn prolog_with_locals(locals: &[String]) -> Vec<u8> {
    build_prolog(locals)
}

fn build_prolog(locals: &[String]) -> Vec<u8> {
    let import = ItfValue::Struct(vec![
        (sym::NAME, ItfValue::String("YJ_symbols".to_string())),
        (sym::VERSION, ItfValue::Int(10)),
        (sym::MAX_ID, ItfValue::Int(SHARED_SYMBOL_COUNT as i64)),
    ]);
    let mut fields = vec![(sym::IMPORTS, ItfValue::List(vec![import]))];
    if !locals.is_empty() {
        let symbols = locals
            .iter()
            .map(|s| ItfValue::String(s.clone()))
            .collect();
        fields.push((sym::SYMBOLS, ItfValue::List(symbols)));
    }
    let table = ItfValue::Annotated(
        vec![sym::ION_SYMBOL_TABLE],
        Box::new(ItfValue::Struct(fields)),
    );

    let mut writer = ItfWriter::new();
    writer.write_bvm();
    writer.write_value(&table);
    writer.into_bytes()
}

/// Document-local symbol table.
///
/// Maintains the mapping between strings and symbol IDs for one conversion.
/// Local symbols are numbered immediately after the shared catalog so their
/// IDs equal `LOCAL_MIN_ID + index`.
#[derive(Default)]
pub struct SymbolTable {
    local_symbols: Vec<String>,
    symbol_map: std::collections::HashMap<String, u64>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a symbol ID for a name.
    ///
    /// A name of the form `$nnn` within the shared range is treated as a
    /// shared symbol reference and the number is returned directly.
    pub fn get_or_intern(&mut self, name: &str) -> u64 {
        if let Some(id_str) = name.strip_prefix('$') {
            if let Ok(id) = id_str.parse::<u64>() {
                if id <= MAX_SHARED_ID {
                    return id;
                }
            }
        }

        if let Some(&id) = self.symbol_map.get(name) {
            return id;
        }

        let id = LOCAL_MIN_ID + self.local_symbols.len() as u64;
        self.local_symbols.push(name.to_string());
        self.symbol_map.insert(name.to_string(), id);
        id
    }

    /// Get a symbol ID without interning.
    pub fn get(&self, name: &str) -> Option<u64> {
        if let Some(id_str) = name.strip_prefix('$') {
            if let Ok(id) = id_str.parse::<u64>() {
                if id <= MAX_SHARED_ID {
                    return Some(id);
                }
            }
        }
        self.symbol_map.get(name).copied()
    }

    /// Resolve an ID back to its name (shared or local).
    pub fn resolve(&self, id: u64) -> Option<String> {
        if id <= MAX_SHARED_ID {
            return Some(name(id));
        }
        self.local_symbols
            .get((id - LOCAL_MIN_ID) as usize)
            .cloned()
    }

    /// The document-local symbols, in ID order.
    pub fn local_symbols(&self) -> &[String] {
        &self.local_symbols
    }

    pub fn len(&self) -> usize {
        self.local_symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local_symbols.is_empty()
    }
}
