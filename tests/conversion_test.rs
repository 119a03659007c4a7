//! End-to-end conversion tests: semantic tree + CSS in, KFX bytes out,
//! read back and checked.

use kindling::container::Container;
use kindling::css::{Capabilities, WarningKind};
use kindling::doctree::{Block, Cite, Document, Image, Paragraph, Poem, Section, Span, Stanza};
use kindling::storyline::{AssembleOptions, ImageResource, ResourceMap, assemble_kfx};
use kindling::symbols::sym;

fn book() -> Document {
    Document {
        title: "The Tempest Abridged".to_string(),
        language: "en".to_string(),
        authors: vec!["W. Shakespeare".to_string()],
        sections: vec![
            Section {
                id: Some("act1".to_string()),
                title: vec![Paragraph::text("Act One")],
                epigraphs: vec![],
                blocks: vec![
                    Block::Paragraph(Paragraph::text(
                        "A tempestuous noise of thunder and lightning heard.",
                    )),
                    Block::Paragraph(Paragraph {
                        spans: vec![
                            Span::plain("Boatswain: "),
                            Span::tagged("em", "Heigh, my hearts!"),
                        ],
                        ..Default::default()
                    }),
                    Block::EmptyLine,
                    Block::Cite(Cite {
                        blocks: vec![Block::Paragraph(
                            Paragraph::text("We split, we split!").with_classes(&["cry"]),
                        )],
                        author: Some(Paragraph::text("Mariners")),
                    }),
                ],
            },
            Section {
                id: Some("act2".to_string()),
                title: vec![Paragraph::text("Act Two")],
                epigraphs: vec![],
                blocks: vec![
                    Block::Poem(Poem {
                        title: vec![Paragraph::text("Ariel's Song")],
                        stanzas: vec![
                            Stanza {
                                lines: vec![
                                    Paragraph::text("Full fathom five thy father lies;"),
                                    Paragraph::text("Of his bones are coral made;"),
                                ],
                            },
                            Stanza {
                                lines: vec![
                                    Paragraph::text("Those are pearls that were his eyes:"),
                                    Paragraph::text("Nothing of him that doth fade,"),
                                ],
                            },
                        ],
                    }),
                    Block::Image(Image {
                        href: "island.png".to_string(),
                        alt: "The island".to_string(),
                        is_block: true,
                        classes: vec![],
                    }),
                ],
            },
        ],
        footnotes: vec![],
    }
}

const CSS: &str = r#"
p { margin-top: 0.6em; margin-bottom: 1.2em; text-indent: 1em; text-align: justify }
em { font-style: italic }
div.title p { font-weight: bold; text-align: center; text-indent: 0em }
div.cite { margin-left: 2em; margin-right: 2em }
v { margin-bottom: 0.6em; text-indent: 0em }
div.stanza { margin-bottom: 1.2em }
@media amzn-kf8 { p { letter-spacing: 0.01em } }
"#;

fn resources() -> ResourceMap {
    let mut map = ResourceMap::new();
    map.insert(
        "island.png".to_string(),
        ImageResource {
            resource_name: "e0".to_string(),
            width_px: 800,
            height_px: 600,
        },
    );
    map
}

#[test]
fn test_full_conversion_round_trip() {
    let options = AssembleOptions {
        container_id: Some("CR!FULLBOOK".to_string()),
        capabilities: Capabilities { kf8: true, et: false },
        generator_app: Some("fb2conv".to_string()),
        generator_pkg: Some("fb2conv-1.0".to_string()),
    };
    let (container, warnings) =
        assemble_kfx(&book(), CSS.as_bytes(), &resources(), &options).unwrap();
    assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");

    let bytes = container.write().unwrap();
    assert!(bytes.starts_with(b"CONT"));

    let parsed = Container::read(&bytes).unwrap();
    assert_eq!(parsed.container_id, "CR!FULLBOOK");
    assert_eq!(parsed.generator_app, "fb2conv");
    assert_eq!(parsed.generator_pkg, "fb2conv-1.0");
    assert_eq!(parsed.format_label(), "KFX main");
    assert_eq!(parsed.fragments().len(), container.fragments().len());
    for fragment in container.fragments() {
        let other = parsed.get(fragment.ftype, fragment.fid).unwrap();
        assert_eq!(other.value, fragment.value);
    }
}

#[test]
fn test_kf8_media_block_included_only_with_capability() {
    let with_kf8 = AssembleOptions {
        capabilities: Capabilities { kf8: true, et: false },
        ..Default::default()
    };
    let without = AssembleOptions::default();

    let (kf8_container, _) =
        assemble_kfx(&book(), CSS.as_bytes(), &resources(), &with_kf8).unwrap();
    let (plain_container, _) =
        assemble_kfx(&book(), CSS.as_bytes(), &resources(), &without).unwrap();

    let has_letter_spacing = |container: &Container| {
        container
            .fragments()
            .iter()
            .filter(|f| f.ftype == sym::STYLE)
            .any(|f| f.as_itf().unwrap().get(sym::LETTER_SPACING).is_some())
    };
    assert!(has_letter_spacing(&kf8_container));
    assert!(!has_letter_spacing(&plain_container));
}

#[test]
fn test_two_sections_listed_in_reading_order() {
    let (container, _) = assemble_kfx(
        &book(),
        CSS.as_bytes(),
        &resources(),
        &AssembleOptions::default(),
    )
    .unwrap();

    let doc_data = container
        .get(sym::DOCUMENT_DATA, sym::DOCUMENT_DATA)
        .expect("document data root fragment");
    let orders = doc_data
        .as_itf()
        .unwrap()
        .get(sym::READING_ORDERS)
        .unwrap()
        .as_list()
        .unwrap();
    assert_eq!(orders.len(), 1);
    let sections = orders[0]
        .get(sym::SECTIONS_LIST)
        .unwrap()
        .as_list()
        .unwrap();
    assert_eq!(sections.len(), 2);

    let section_count = container
        .fragments()
        .iter()
        .filter(|f| f.ftype == sym::SECTION)
        .count();
    assert_eq!(section_count, 2);
}

#[test]
fn test_emitted_styles_are_all_referenced() {
    let (container, _) = assemble_kfx(
        &book(),
        CSS.as_bytes(),
        &resources(),
        &AssembleOptions::default(),
    )
    .unwrap();

    // Collect style name symbols referenced from non-style fragments.
    fn collect_refs(value: &kindling::itf::ItfValue, out: &mut Vec<u64>) {
        match value {
            kindling::itf::ItfValue::Struct(fields) => {
                for (key, val) in fields {
                    if *key == sym::STYLE {
                        if let Some(id) = val.as_symbol() {
                            out.push(id);
                        }
                    }
                    collect_refs(val, out);
                }
            }
            kindling::itf::ItfValue::List(items) => {
                for item in items {
                    collect_refs(item, out);
                }
            }
            kindling::itf::ItfValue::Annotated(_, inner) => collect_refs(inner, out),
            _ => {}
        }
    }

    let mut referenced = Vec::new();
    for fragment in container.fragments() {
        if fragment.ftype != sym::STYLE {
            if let Some(value) = fragment.as_itf() {
                collect_refs(value, &mut referenced);
            }
        }
    }

    for fragment in container.fragments() {
        if fragment.ftype == sym::STYLE {
            assert!(
                referenced.contains(&fragment.fid),
                "style fragment {} is not referenced by any content",
                fragment.fid
            );
        }
    }
}

#[test]
fn test_stanza_margins_after_collapse() {
    // Verses carry mb 0.5 lh (0.6em), stanzas mb 1.0 lh (1.2em). After the
    // stanza transfer, the middle verses' margins are stripped and each
    // stanza's last verse carries the stanza margin, except at the
    // storyline end where it is preserved on the final leaf.
    let (container, _) = assemble_kfx(
        &book(),
        CSS.as_bytes(),
        &resources(),
        &AssembleOptions::default(),
    )
    .unwrap();

    // The first stanza is not the last child of the poem, so its last
    // verse must reference a style with margin-bottom = 1 lh.
    let styles: Vec<_> = container
        .fragments()
        .iter()
        .filter(|f| f.ftype == sym::STYLE)
        .collect();
    let has_one_lh_bottom = styles.iter().any(|f| {
        f.as_itf()
            .unwrap()
            .get(sym::MARGIN_BOTTOM)
            .and_then(kindling::style::read_lh)
            .is_some_and(|v| (v - 1.0).abs() < 1e-6)
    });
    assert!(has_one_lh_bottom);
}

#[test]
fn test_negative_margin_css_yields_warnings_not_failure() {
    let css = ".x { margin: -8pt -8pt -8pt -8pt }";
    let (container, warnings) = assemble_kfx(
        &book(),
        css.as_bytes(),
        &resources(),
        &AssembleOptions::default(),
    )
    .unwrap();
    assert_eq!(
        warnings
            .iter()
            .filter(|w| w.kind == WarningKind::NegativeMargin)
            .count(),
        4
    );
    assert_eq!(container.format_label(), "KFX main");
}
