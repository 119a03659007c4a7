//! Stylesheet tokenization and rule parsing.
//!
//! Uses the cssparser tokenizer directly; rule structure is hand-parsed so
//! unsupported constructs degrade to warnings instead of hard failures.

use cssparser::{Delimiter, ParseError, Parser, ParserInput, Token};

use super::{
    Capabilities, CssRule, CssValue, FontFace, PseudoElement, Selector, SimpleSelector,
    StyleWarning, Stylesheet, WarningKind, media, set_property,
};

/// Parse a stylesheet, evaluating `@media` blocks against the given
/// capability flags.
pub fn parse_stylesheet(css: &str, caps: Capabilities) -> Stylesheet {
    let mut sheet = Stylesheet::default();
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    parse_rule_list(&mut parser, caps, &mut sheet);
    sheet
}

/// Prelude token, simplified. Whitespace is kept because it separates
/// descendant selectors.
#[derive(Debug, Clone, PartialEq)]
enum Lexeme {
    Ident(String),
    Delim(char),
    Colon,
    Comma,
    Ws,
    Bracket,
    Other(String),
}

fn parse_rule_list<'i>(parser: &mut Parser<'i, '_>, caps: Capabilities, sheet: &mut Stylesheet) {
    loop {
        let mut at_rule: Option<String> = None;
        let mut lexemes: Vec<Lexeme> = Vec::new();

        // Collect the prelude up to the next block.
        let found_block = loop {
            let token = match parser.next_including_whitespace() {
                Ok(token) => token.clone(),
                Err(_) => break false,
            };
            match token {
                Token::CurlyBracketBlock => break true,
                Token::AtKeyword(name) if at_rule.is_none() && lexemes.is_empty() => {
                    at_rule = Some(name.to_ascii_lowercase());
                }
                Token::Semicolon => {
                    // Block-less at-rules (@charset, @import) are skipped.
                    at_rule = None;
                    lexemes.clear();
                }
                Token::WhiteSpace(_) | Token::Comment(_) => {
                    if !matches!(lexemes.last(), Some(Lexeme::Ws) | None) {
                        lexemes.push(Lexeme::Ws);
                    }
                }
                Token::Ident(name) => lexemes.push(Lexeme::Ident(name.to_string())),
                Token::Delim(c) => lexemes.push(Lexeme::Delim(c)),
                Token::Colon => lexemes.push(Lexeme::Colon),
                Token::Comma => lexemes.push(Lexeme::Comma),
                Token::SquareBracketBlock => lexemes.push(Lexeme::Bracket),
                Token::ParenthesisBlock => {
                    // Media feature parens: hoist the inner identifiers.
                    let inner = parser.parse_nested_block(
                        |p| -> Result<Vec<String>, ParseError<'i, ()>> {
                            let mut words = Vec::new();
                            while let Ok(t) = p.next() {
                                if let Token::Ident(word) = t {
                                    words.push(word.to_ascii_lowercase());
                                }
                            }
                            Ok(words)
                        },
                    );
                    if let Ok(words) = inner {
                        for word in words {
                            lexemes.push(Lexeme::Ident(word));
                        }
                    }
                }
                other => lexemes.push(Lexeme::Other(format!("{other:?}"))),
            }
        };

        if !found_block {
            if at_rule.is_some() || !lexemes.is_empty() {
                sheet.warnings.push(StyleWarning::new(
                    WarningKind::ParseError,
                    "stylesheet ends mid-rule",
                ));
            }
            return;
        }

        match at_rule.as_deref() {
            Some("media") => {
                let words = media_words(&lexemes);
                let matched = media::evaluate(&words, caps);
                let _ = parser.parse_nested_block(|p| -> Result<(), ParseError<'i, ()>> {
                    if matched {
                        parse_rule_list(p, caps, sheet);
                    }
                    Ok(())
                });
            }
            Some("font-face") => {
                let result =
                    parser.parse_nested_block(|p| -> Result<FontFace, ParseError<'i, ()>> {
                        let declarations = parse_declarations(p, &mut sheet.warnings);
                        Ok(FontFace { declarations })
                    });
                if let Ok(face) = result {
                    sheet.font_faces.push(face);
                }
            }
            Some(other) => {
                sheet.warnings.push(StyleWarning::new(
                    WarningKind::UnsupportedProperty,
                    format!("@{other} rule skipped"),
                ));
                let _ = parser.parse_nested_block(|_| -> Result<(), ParseError<'i, ()>> { Ok(()) });
            }
            None => match parse_selector_list(&lexemes) {
                Ok(selectors) => {
                    let result = parser.parse_nested_block(
                        |p| -> Result<Vec<(String, CssValue)>, ParseError<'i, ()>> {
                            Ok(parse_declarations(p, &mut sheet.warnings))
                        },
                    );
                    if let Ok(properties) = result {
                        for selector in selectors {
                            sheet.rules.push(CssRule {
                                selector,
                                properties: properties.clone(),
                            });
                        }
                    }
                }
                Err(reason) => {
                    sheet.warnings.push(StyleWarning::new(
                        WarningKind::UnsupportedSelector,
                        format!("{reason} in `{}`", render_lexemes(&lexemes)),
                    ));
                    let _ =
                        parser.parse_nested_block(|_| -> Result<(), ParseError<'i, ()>> { Ok(()) });
                }
            },
        }
    }
}

/// Declarations inside a rule or `@font-face` block.
fn parse_declarations<'i>(
    parser: &mut Parser<'i, '_>,
    warnings: &mut Vec<StyleWarning>,
) -> Vec<(String, CssValue)> {
    let mut properties = Vec::new();

    loop {
        let token = match parser.next() {
            Ok(token) => token.clone(),
            Err(_) => return properties,
        };
        let name = match token {
            Token::Ident(name) => name.to_ascii_lowercase(),
            Token::Semicolon => continue,
            other => {
                warnings.push(StyleWarning::new(
                    WarningKind::ParseError,
                    format!("unexpected token {other:?} in declaration block"),
                ));
                skip_to_semicolon(parser);
                continue;
            }
        };

        let colon_ok = matches!(parser.next(), Ok(Token::Colon));
        if !colon_ok {
            warnings.push(StyleWarning::new(
                WarningKind::ParseError,
                format!("missing ':' after `{name}`"),
            ));
            skip_to_semicolon(parser);
            continue;
        }

        let value_text = parser.parse_until_before(
            Delimiter::Semicolon,
            |p| -> Result<&'i str, ParseError<'i, ()>> {
                p.skip_whitespace();
                let start = p.position();
                while p.next_including_whitespace().is_ok() {}
                Ok(p.slice_from(start))
            },
        );
        if let Ok(text) = value_text {
            let text = text.trim();
            if !text.is_empty() {
                set_property(&mut properties, &name, CssValue::parse(text));
            }
        }
        // Consume the semicolon (or hit the end of the block).
        let _ = parser.next();
    }
}

fn skip_to_semicolon(parser: &mut Parser) {
    loop {
        match parser.next() {
            Err(_) => return,
            Ok(Token::Semicolon) => return,
            Ok(_) => {}
        }
    }
}

/// Identifier stream for media evaluation; commas survive as separators.
fn media_words(lexemes: &[Lexeme]) -> Vec<String> {
    let mut words = Vec::new();
    for lexeme in lexemes {
        match lexeme {
            Lexeme::Ident(word) => words.push(word.to_ascii_lowercase()),
            Lexeme::Comma => words.push(",".to_string()),
            Lexeme::Ws => {}
            // Anything unexpected poisons the query (evaluates false).
            _ => words.push("?".to_string()),
        }
    }
    words
}

fn render_lexemes(lexemes: &[Lexeme]) -> String {
    let mut out = String::new();
    for lexeme in lexemes {
        match lexeme {
            Lexeme::Ident(word) => out.push_str(word),
            Lexeme::Delim(c) => out.push(*c),
            Lexeme::Colon => out.push(':'),
            Lexeme::Comma => out.push(','),
            Lexeme::Ws => out.push(' '),
            Lexeme::Bracket => out.push_str("[..]"),
            Lexeme::Other(_) => out.push('?'),
        }
    }
    out.trim().to_string()
}

// --- selector parsing ---

fn parse_selector_list(lexemes: &[Lexeme]) -> Result<Vec<Selector>, String> {
    let groups: Vec<&[Lexeme]> = lexemes.split(|l| *l == Lexeme::Comma).collect();
    let mut selectors = Vec::with_capacity(groups.len());
    for group in groups {
        selectors.push(parse_selector(group)?);
    }
    Ok(selectors)
}

fn parse_selector(lexemes: &[Lexeme]) -> Result<Selector, String> {
    // Trim leading/trailing whitespace, then split into compound selectors
    // on the remaining whitespace (descendant combinator).
    let trimmed = trim_ws(lexemes);
    if trimmed.is_empty() {
        return Err("empty selector".to_string());
    }

    let mut compounds: Vec<SimpleSelector> = Vec::new();
    for part in trimmed.split(|l| *l == Lexeme::Ws) {
        if part.is_empty() {
            continue;
        }
        compounds.push(parse_simple_selector(part)?);
    }
    if compounds.is_empty() {
        return Err("empty selector".to_string());
    }

    let target = compounds.pop().unwrap();
    for ancestor in &compounds {
        if ancestor.pseudo != PseudoElement::None {
            return Err("pseudo-element on ancestor".to_string());
        }
    }
    Ok(Selector {
        ancestors: compounds,
        target,
    })
}

fn trim_ws(lexemes: &[Lexeme]) -> &[Lexeme] {
    let start = lexemes
        .iter()
        .position(|l| *l != Lexeme::Ws)
        .unwrap_or(lexemes.len());
    let end = lexemes
        .iter()
        .rposition(|l| *l != Lexeme::Ws)
        .map(|i| i + 1)
        .unwrap_or(start);
    &lexemes[start..end]
}

fn parse_simple_selector(lexemes: &[Lexeme]) -> Result<SimpleSelector, String> {
    let mut selector = SimpleSelector::default();
    let mut iter = lexemes.iter().peekable();

    // Optional element tag (or universal `*`).
    match iter.peek() {
        Some(Lexeme::Ident(tag)) => {
            selector.tag = Some(tag.to_ascii_lowercase());
            iter.next();
        }
        Some(Lexeme::Delim('*')) => {
            iter.next();
        }
        _ => {}
    }

    // Optional single class.
    if let Some(Lexeme::Delim('.')) = iter.peek() {
        iter.next();
        match iter.next() {
            Some(Lexeme::Ident(class)) => selector.class = Some(class.clone()),
            _ => return Err("malformed class selector".to_string()),
        }
    }

    // Optional pseudo-element, single- or double-colon.
    if let Some(Lexeme::Colon) = iter.peek() {
        iter.next();
        if let Some(Lexeme::Colon) = iter.peek() {
            iter.next();
        }
        match iter.next() {
            Some(Lexeme::Ident(name)) => match name.to_ascii_lowercase().as_str() {
                "before" => selector.pseudo = PseudoElement::Before,
                "after" => selector.pseudo = PseudoElement::After,
                other => return Err(format!("unsupported pseudo `{other}`")),
            },
            _ => return Err("malformed pseudo selector".to_string()),
        }
    }

    match iter.next() {
        None => {
            if selector.tag.is_none()
                && selector.class.is_none()
                && selector.pseudo == PseudoElement::None
            {
                Err("empty selector".to_string())
            } else {
                Ok(selector)
            }
        }
        Some(Lexeme::Delim(c @ ('+' | '~' | '>'))) => Err(format!("combinator `{c}`")),
        Some(Lexeme::Bracket) => Err("attribute selector".to_string()),
        Some(Lexeme::Delim('.')) => Err("multiple classes".to_string()),
        Some(other) => Err(format!("unsupported token {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::CssUnit;

    const NO_CAPS: Capabilities = Capabilities { kf8: false, et: false };
    const KF8: Capabilities = Capabilities { kf8: true, et: false };

    fn parse(css: &str) -> Stylesheet {
        parse_stylesheet(css, NO_CAPS)
    }

    #[test]
    fn test_basic_rule() {
        let sheet = parse("p { margin-top: 1em; color: red }");
        assert_eq!(sheet.rules.len(), 1);
        let rule = &sheet.rules[0];
        assert_eq!(rule.selector.to_string(), "p");
        assert_eq!(rule.properties.len(), 2);
        assert_eq!(rule.properties[0].0, "margin-top");
        assert_eq!(rule.properties[0].1.unit, Some(CssUnit::Em));
    }

    #[test]
    fn test_class_and_tag_class() {
        let sheet = parse(".quote { color: gray }\n p.note { color: blue }");
        assert_eq!(sheet.rules.len(), 2);
        assert_eq!(sheet.rules[0].selector.target.class.as_deref(), Some("quote"));
        assert!(sheet.rules[0].selector.target.tag.is_none());
        assert_eq!(sheet.rules[1].selector.target.tag.as_deref(), Some("p"));
        assert_eq!(sheet.rules[1].selector.target.class.as_deref(), Some("note"));
    }

    #[test]
    fn test_pseudo_elements() {
        let sheet = parse("p::before { content: x } p:after { content: y }");
        assert_eq!(sheet.rules.len(), 2);
        assert_eq!(sheet.rules[0].selector.target.pseudo, PseudoElement::Before);
        assert_eq!(sheet.rules[1].selector.target.pseudo, PseudoElement::After);
    }

    #[test]
    fn test_unsupported_pseudo_class_skipped() {
        let sheet = parse("p:first-child { color: red } p { color: blue }");
        assert_eq!(sheet.rules.len(), 1);
        assert_eq!(sheet.warnings.len(), 1);
        assert_eq!(sheet.warnings[0].kind, WarningKind::UnsupportedSelector);
    }

    #[test]
    fn test_descendant_chain() {
        let sheet = parse("div.cite p .x { color: red }");
        assert_eq!(sheet.rules.len(), 1);
        let selector = &sheet.rules[0].selector;
        assert_eq!(selector.ancestors.len(), 2);
        assert_eq!(selector.ancestors[0].tag.as_deref(), Some("div"));
        assert_eq!(selector.ancestors[0].class.as_deref(), Some("cite"));
        assert_eq!(selector.ancestors[1].tag.as_deref(), Some("p"));
        assert_eq!(selector.target.class.as_deref(), Some("x"));
    }

    #[test]
    fn test_combinators_rejected() {
        for css in [
            "p > em { color: red }",
            "p + p { color: red }",
            "p ~ span { color: red }",
            "a[href] { color: red }",
        ] {
            let sheet = parse(css);
            assert!(sheet.rules.is_empty(), "{css}");
            assert_eq!(sheet.warnings.len(), 1, "{css}");
        }
    }

    #[test]
    fn test_selector_list() {
        let sheet = parse("h1, h2.title { font-weight: bold }");
        assert_eq!(sheet.rules.len(), 2);
        assert_eq!(sheet.rules[0].selector.to_string(), "h1");
        assert_eq!(sheet.rules[1].selector.to_string(), "h2.title");
        assert_eq!(sheet.rules[0].properties, sheet.rules[1].properties);
    }

    #[test]
    fn test_media_matching_block_kept() {
        let css = "@media amzn-kf8 { p { color: red } } em { color: blue }";
        let sheet = parse_stylesheet(css, KF8);
        assert_eq!(sheet.rules.len(), 2);

        let sheet = parse_stylesheet(css, NO_CAPS);
        assert_eq!(sheet.rules.len(), 1);
        assert_eq!(sheet.rules[0].selector.to_string(), "em");
    }

    #[test]
    fn test_media_not_and_parens() {
        let css = "@media not amzn-et and (amzn-kf8) { p { color: red } }";
        let sheet = parse_stylesheet(css, KF8);
        assert_eq!(sheet.rules.len(), 1);
    }

    #[test]
    fn test_font_face() {
        let css = "@font-face { font-family: \"Gentium\"; src: url(fonts/g.ttf) }";
        let sheet = parse(css);
        assert_eq!(sheet.font_faces.len(), 1);
        assert_eq!(sheet.font_faces[0].family(), Some("Gentium"));
        assert!(sheet.font_faces[0].src().unwrap().contains("fonts/g.ttf"));
    }

    #[test]
    fn test_unknown_at_rule_skipped() {
        let sheet = parse("@page { margin: 1in } p { color: red }");
        assert_eq!(sheet.rules.len(), 1);
        assert_eq!(sheet.warnings.len(), 1);
    }

    #[test]
    fn test_declaration_recovery() {
        let sheet = parse("p { color red; margin-top: 1em }");
        assert_eq!(sheet.rules.len(), 1);
        // color declaration is malformed, margin survives
        assert_eq!(sheet.rules[0].properties.len(), 1);
        assert_eq!(sheet.rules[0].properties[0].0, "margin-top");
        assert!(!sheet.warnings.is_empty());
    }

    #[test]
    fn test_multi_component_value_raw() {
        let sheet = parse("p { margin: 1em 2em }");
        let value = &sheet.rules[0].properties[0].1;
        assert_eq!(value.raw, "1em 2em");
        let parts = value.components();
        assert_eq!(parts.len(), 2);
    }
}
