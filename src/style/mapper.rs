//! CSS property mapping into KFX symbol-keyed properties.
//!
//! Shorthands expand first, then each property runs through a named
//! transformer. Unsupported properties and unconvertible values are
//! recorded as warnings and dropped; mapping never aborts.

use super::{StyleProps, dimension};
use crate::css::{
    CssUnit, CssValue, Selector, StyleWarning, WarningKind, font_weight_class, parse_color,
    FontWeightClass,
};
use crate::itf::ItfValue;
use crate::symbols::sym;

/// Em-to-percent conversion for text-indent.
pub const EM_TO_PERCENT_TEXT_INDENT: f32 = 3.125;

/// Default line-height factor: the em-to-lh conversion for margins.
pub const LINE_HEIGHT_RATIO: f32 = 1.2;

/// Sentinel terminating a border path list (closePath op).
const PATH_CLOSE: i64 = 4;
const PATH_MOVE: i64 = 0;
const PATH_LINE: i64 = 1;

/// Map one rule's CSS properties to KFX properties.
pub fn map_rule_properties(
    selector: &Selector,
    properties: &[(String, CssValue)],
    warnings: &mut Vec<StyleWarning>,
) -> StyleProps {
    let mut out = StyleProps::new();
    for (name, value) in properties {
        apply_property(&mut out, selector, name, value, warnings);
    }
    out
}

fn apply_property(
    out: &mut StyleProps,
    selector: &Selector,
    name: &str,
    value: &CssValue,
    warnings: &mut Vec<StyleWarning>,
) {
    // Shorthands first.
    match name {
        "margin" | "padding" => {
            let Some(sides) = expand_box_shorthand(&value.components()) else {
                warnings.push(StyleWarning::new(
                    WarningKind::UnsupportedValue,
                    format!("{name}: {}", value.raw),
                ));
                return;
            };
            for (suffix, component) in sides {
                apply_property(out, selector, &format!("{name}-{suffix}"), &component, warnings);
            }
            return;
        }
        "border-width" => {
            let Some(sides) = expand_box_shorthand(&value.components()) else {
                warnings.push(StyleWarning::new(
                    WarningKind::UnsupportedValue,
                    format!("{name}: {}", value.raw),
                ));
                return;
            };
            for (suffix, component) in sides {
                apply_property(out, selector, &format!("border-{suffix}-width"), &component, warnings);
            }
            return;
        }
        "border" => {
            // Only the width component carries into the output model.
            if let Some(width) = value.components().into_iter().find(CssValue::is_numeric) {
                apply_property(out, selector, "border-width", &width, warnings);
            }
            return;
        }
        _ => {}
    }

    match name {
        "margin-top" => set_margin(out, sym::MARGIN_TOP, name, value, warnings),
        "margin-bottom" => set_margin(out, sym::MARGIN_BOTTOM, name, value, warnings),
        "margin-left" => set_side_margin(out, sym::MARGIN_LEFT, name, value, warnings),
        "margin-right" => set_side_margin(out, sym::MARGIN_RIGHT, name, value, warnings),

        "padding-top" => set_lh_dimension(out, sym::PADDING_TOP, name, value, warnings),
        "padding-bottom" => set_lh_dimension(out, sym::PADDING_BOTTOM, name, value, warnings),
        "padding-left" => set_percent_dimension(out, sym::PADDING_LEFT, name, value, warnings),
        "padding-right" => set_percent_dimension(out, sym::PADDING_RIGHT, name, value, warnings),

        "border-top-width" => set_lh_dimension(out, sym::BORDER_TOP_WIDTH, name, value, warnings),
        "border-bottom-width" => {
            set_lh_dimension(out, sym::BORDER_BOTTOM_WIDTH, name, value, warnings)
        }
        "border-left-width" | "border-right-width" => {
            // Horizontal borders do not affect vertical rhythm; skipped.
        }

        "text-indent" => {
            if let Some(percent) = to_percent(value) {
                out.set(
                    sym::TEXT_INDENT,
                    dimension(percent as f64, sym::UNIT_PERCENT),
                );
            } else {
                warn_unknown_unit(warnings, name, value);
            }
        }

        "line-height" => {
            if let Some(lh) = to_lh(value) {
                out.set(sym::LINE_HEIGHT, dimension(lh as f64, sym::UNIT_LH));
            } else {
                warn_unknown_unit(warnings, name, value);
            }
        }

        "font-size" => {
            if let Some(rem) = to_rem(value) {
                out.set(sym::FONT_SIZE, dimension(rem as f64, sym::UNIT_REM));
            } else {
                warn_unknown_unit(warnings, name, value);
            }
        }

        "font-family" => {
            out.set(
                sym::FONT_FAMILY,
                ItfValue::String(value.raw.trim_matches(['"', '\'']).to_string()),
            );
        }

        "font-weight" => match font_weight_class(value) {
            Some(class) => {
                let symbol = match class {
                    FontWeightClass::Light => sym::FONT_WEIGHT_LIGHT,
                    FontWeightClass::Normal => sym::FONT_WEIGHT_NORMAL,
                    FontWeightClass::Medium => sym::FONT_WEIGHT_MEDIUM,
                    FontWeightClass::Semibold => sym::FONT_WEIGHT_SEMIBOLD,
                    FontWeightClass::Bold => sym::FONT_WEIGHT_BOLD,
                };
                out.set(sym::FONT_WEIGHT, ItfValue::Symbol(symbol));
            }
            None => warn_value(warnings, name, value),
        },

        "font-style" => match value.keyword.as_deref() {
            Some("italic") | Some("oblique") => {
                out.set(sym::FONT_STYLE, ItfValue::Symbol(sym::FONT_STYLE_ITALIC));
            }
            Some("normal") => {
                out.set(sym::FONT_STYLE, ItfValue::Symbol(sym::FONT_WEIGHT_NORMAL));
            }
            _ => warn_value(warnings, name, value),
        },

        "text-align" => {
            let symbol = match value.keyword.as_deref() {
                Some("left") => sym::ALIGN_LEFT,
                Some("right") => sym::ALIGN_RIGHT,
                Some("center") => sym::ALIGN_CENTER,
                Some("justify") => sym::ALIGN_JUSTIFY,
                _ => {
                    warn_value(warnings, name, value);
                    return;
                }
            };
            out.set(sym::TEXT_ALIGN, ItfValue::Symbol(symbol));
        }

        "text-transform" => {
            let symbol = match value.keyword.as_deref() {
                Some("uppercase") => sym::TEXT_TRANSFORM_UPPERCASE,
                Some("lowercase") => sym::TEXT_TRANSFORM_LOWERCASE,
                Some("capitalize") => sym::TEXT_TRANSFORM_CAPITALIZE,
                Some("none") => sym::VALUE_NONE,
                _ => {
                    warn_value(warnings, name, value);
                    return;
                }
            };
            out.set(sym::TEXT_TRANSFORM, ItfValue::Symbol(symbol));
        }

        "vertical-align" => {
            let symbol = match value.keyword.as_deref() {
                Some("super") => sym::VERTICAL_SUPER,
                Some("sub") => sym::VERTICAL_SUB,
                _ => {
                    warn_value(warnings, name, value);
                    return;
                }
            };
            out.set(sym::VERTICAL_ALIGN, ItfValue::Symbol(symbol));
        }

        "letter-spacing" => set_em_dimension(out, sym::LETTER_SPACING, name, value, warnings),
        "word-spacing" => set_em_dimension(out, sym::WORD_SPACING, name, value, warnings),

        "color" => set_color(out, sym::COLOR, name, value, warnings),
        "background-color" | "background" | "bgcolor" => {
            set_color(out, sym::FILL_COLOR, name, value, warnings)
        }

        "width" => set_sizing(out, sym::STYLE_WIDTH, name, value, warnings),
        "height" => set_sizing(out, sym::STYLE_HEIGHT, name, value, warnings),

        "widows" => set_keep_lines(out, sym::KEEP_LAST, value, warnings),
        "orphans" => set_keep_lines(out, sym::KEEP_FIRST, value, warnings),

        "page-break-before" | "break-before" => {
            set_break_avoid(out, sym::KEEP_FIRST, name, value, warnings)
        }
        "page-break-after" | "break-after" => {
            set_break_avoid(out, sym::KEEP_LAST, name, value, warnings)
        }
        "page-break-inside" | "break-inside" => {
            set_break_avoid(out, sym::BREAK_INSIDE, name, value, warnings)
        }

        "float" => {
            // snap-block floats are only meaningful on images.
            if value.keyword_is("snap-block") {
                if selector.targets_tag("img") {
                    out.set(sym::FLOAT, ItfValue::Symbol(sym::FLOAT_SNAP_BLOCK));
                }
            } else {
                warn_value(warnings, name, value);
            }
        }

        "text-decoration" => apply_text_decoration(out, value, warnings),
        "text-emphasis-style" => apply_emphasis_style(out, value, warnings),
        "text-emphasis-position" => apply_emphasis_position(out, value, warnings),
        "border-radius" => apply_border_radius(out, value, warnings),
        "-amzn-shape-outside" => apply_shape_outside(out, value, warnings),
        "-amzn-page-align" => apply_page_align(out, value, warnings),

        // Passed through by the outer pipeline, not style properties.
        "content" | "display" | "src" => {}

        other => {
            warnings.push(StyleWarning::new(
                WarningKind::UnsupportedProperty,
                other.to_string(),
            ));
        }
    }
}

// --- unit conversions ---

/// Convert to line-height units. Unitless values read as lh directly.
fn to_lh(value: &CssValue) -> Option<f32> {
    let n = value.number?;
    let lh = match value.unit {
        None | Some(CssUnit::Lh) => n,
        Some(CssUnit::Em) | Some(CssUnit::Rem) => n / LINE_HEIGHT_RATIO,
        Some(CssUnit::Px) => n / 16.0 / LINE_HEIGHT_RATIO,
        Some(CssUnit::Pt) => pt_to_px(n) / 16.0 / LINE_HEIGHT_RATIO,
        Some(CssUnit::Cm) => cm_to_px(n) / 16.0 / LINE_HEIGHT_RATIO,
        Some(CssUnit::Mm) => cm_to_px(n / 10.0) / 16.0 / LINE_HEIGHT_RATIO,
        Some(CssUnit::In) => n * 96.0 / 16.0 / LINE_HEIGHT_RATIO,
        Some(CssUnit::Percent) => return None,
    };
    Some(lh)
}

fn to_em(value: &CssValue) -> Option<f32> {
    let n = value.number?;
    let em = match value.unit {
        Some(CssUnit::Em) | Some(CssUnit::Rem) => n,
        Some(CssUnit::Px) => n / 16.0,
        Some(CssUnit::Pt) => pt_to_px(n) / 16.0,
        Some(CssUnit::Cm) => cm_to_px(n) / 16.0,
        Some(CssUnit::Mm) => cm_to_px(n / 10.0) / 16.0,
        Some(CssUnit::In) => n * 96.0 / 16.0,
        Some(CssUnit::Lh) => n * LINE_HEIGHT_RATIO,
        None | Some(CssUnit::Percent) => return None,
    };
    Some(em)
}

fn to_percent(value: &CssValue) -> Option<f32> {
    if value.unit == Some(CssUnit::Percent) {
        return value.number;
    }
    Some(to_em(value)? * EM_TO_PERCENT_TEXT_INDENT)
}

fn to_rem(value: &CssValue) -> Option<f32> {
    if value.unit == Some(CssUnit::Percent) {
        return Some(value.number? / 100.0);
    }
    to_em(value)
}

fn pt_to_px(pt: f32) -> f32 {
    pt * 96.0 / 72.0
}

fn cm_to_px(cm: f32) -> f32 {
    cm * 96.0 / 2.54
}

// --- property setters ---

fn set_margin(
    out: &mut StyleProps,
    symbol: u64,
    name: &str,
    value: &CssValue,
    warnings: &mut Vec<StyleWarning>,
) {
    if let Some(n) = value.number {
        if n < 0.0 {
            warnings.push(StyleWarning::new(
                WarningKind::NegativeMargin,
                format!("{name}: {}", value.raw),
            ));
            return;
        }
    }
    set_lh_dimension(out, symbol, name, value, warnings);
}

fn set_side_margin(
    out: &mut StyleProps,
    symbol: u64,
    name: &str,
    value: &CssValue,
    warnings: &mut Vec<StyleWarning>,
) {
    if let Some(n) = value.number {
        if n < 0.0 {
            warnings.push(StyleWarning::new(
                WarningKind::NegativeMargin,
                format!("{name}: {}", value.raw),
            ));
            return;
        }
    }
    set_percent_dimension(out, symbol, name, value, warnings);
}

fn set_lh_dimension(
    out: &mut StyleProps,
    symbol: u64,
    name: &str,
    value: &CssValue,
    warnings: &mut Vec<StyleWarning>,
) {
    match to_lh(value) {
        Some(lh) => out.set(symbol, dimension(lh as f64, sym::UNIT_LH)),
        None => warn_unknown_unit(warnings, name, value),
    }
}

fn set_percent_dimension(
    out: &mut StyleProps,
    symbol: u64,
    name: &str,
    value: &CssValue,
    warnings: &mut Vec<StyleWarning>,
) {
    match to_percent(value) {
        Some(pct) => out.set(symbol, dimension(pct as f64, sym::UNIT_PERCENT)),
        None => warn_unknown_unit(warnings, name, value),
    }
}

fn set_em_dimension(
    out: &mut StyleProps,
    symbol: u64,
    name: &str,
    value: &CssValue,
    warnings: &mut Vec<StyleWarning>,
) {
    match to_em(value) {
        Some(em) => out.set(symbol, dimension(em as f64, sym::UNIT_EM)),
        None => warn_unknown_unit(warnings, name, value),
    }
}

fn set_sizing(
    out: &mut StyleProps,
    symbol: u64,
    name: &str,
    value: &CssValue,
    warnings: &mut Vec<StyleWarning>,
) {
    if value.unit == Some(CssUnit::Percent) {
        if let Some(n) = value.number {
            out.set(symbol, dimension(n as f64, sym::UNIT_PERCENT));
            return;
        }
    }
    match to_em(value) {
        Some(em) => out.set(symbol, dimension(em as f64, sym::UNIT_EM)),
        None => warn_unknown_unit(warnings, name, value),
    }
}

fn set_color(
    out: &mut StyleProps,
    symbol: u64,
    name: &str,
    value: &CssValue,
    warnings: &mut Vec<StyleWarning>,
) {
    match parse_color(&value.raw) {
        Some(argb) => out.set(symbol, ItfValue::Int(argb)),
        None => {
            warnings.push(StyleWarning::new(
                WarningKind::MalformedColor,
                format!("{name}: {}", value.raw),
            ));
        }
    }
}

/// widows/orphans accumulate into one `keep_lines_together` struct.
fn set_keep_lines(
    out: &mut StyleProps,
    component: u64,
    value: &CssValue,
    warnings: &mut Vec<StyleWarning>,
) {
    let Some(count) = value.number else {
        warn_value(warnings, "widows/orphans", value);
        return;
    };
    let mut fields = match out.remove(sym::KEEP_LINES_TOGETHER) {
        Some(ItfValue::Struct(fields)) => fields,
        _ => Vec::new(),
    };
    fields.retain(|(k, _)| *k != component);
    fields.push((component, ItfValue::Int(count as i64)));
    out.set(sym::KEEP_LINES_TOGETHER, ItfValue::Struct(fields));
}

fn set_break_avoid(
    out: &mut StyleProps,
    symbol: u64,
    name: &str,
    value: &CssValue,
    warnings: &mut Vec<StyleWarning>,
) {
    match value.keyword.as_deref() {
        Some("avoid") => out.set(symbol, ItfValue::Symbol(sym::VALUE_AVOID)),
        Some("auto") => {}
        _ => warn_value(warnings, name, value),
    }
}

fn apply_text_decoration(
    out: &mut StyleProps,
    value: &CssValue,
    warnings: &mut Vec<StyleWarning>,
) {
    for part in value.components() {
        match part.keyword.as_deref() {
            Some("underline") => out.set(sym::UNDERLINE, ItfValue::Bool(true)),
            Some("line-through") => out.set(sym::STRIKETHROUGH, ItfValue::Bool(true)),
            Some("none") => {
                out.remove(sym::UNDERLINE);
                out.remove(sym::STRIKETHROUGH);
            }
            _ => warn_value(warnings, "text-decoration", &part),
        }
    }
}

/// `text-emphasis-style` splits into a (fill, shape) enum pair.
fn apply_emphasis_style(out: &mut StyleProps, value: &CssValue, warnings: &mut Vec<StyleWarning>) {
    let mut fill = None;
    let mut shape = None;
    for part in value.components() {
        match part.keyword.as_deref() {
            Some("filled") => fill = Some(sym::EMPHASIS_FILLED),
            Some("open") => fill = Some(sym::EMPHASIS_OPEN),
            Some("dot") => shape = Some(sym::EMPHASIS_DOT),
            Some("circle") => shape = Some(sym::EMPHASIS_CIRCLE),
            Some("double-circle") => shape = Some(sym::EMPHASIS_DOUBLE_CIRCLE),
            Some("triangle") => shape = Some(sym::EMPHASIS_TRIANGLE),
            Some("sesame") => shape = Some(sym::EMPHASIS_SESAME),
            Some("none") => {
                out.remove(sym::EMPHASIS_FILL);
                out.remove(sym::EMPHASIS_SHAPE);
                return;
            }
            _ => {
                warn_value(warnings, "text-emphasis-style", &part);
                return;
            }
        }
    }
    // A bare fill keyword implies a dot; a bare shape implies filled.
    if fill.is_some() || shape.is_some() {
        out.set(
            sym::EMPHASIS_FILL,
            ItfValue::Symbol(fill.unwrap_or(sym::EMPHASIS_FILLED)),
        );
        out.set(
            sym::EMPHASIS_SHAPE,
            ItfValue::Symbol(shape.unwrap_or(sym::EMPHASIS_DOT)),
        );
    }
}

/// `text-emphasis-position` emits horizontal and vertical components.
fn apply_emphasis_position(
    out: &mut StyleProps,
    value: &CssValue,
    warnings: &mut Vec<StyleWarning>,
) {
    for part in value.components() {
        match part.keyword.as_deref() {
            Some("over") => out.set(
                sym::EMPHASIS_POSITION_V,
                ItfValue::Symbol(sym::EMPHASIS_OVER),
            ),
            Some("under") => out.set(
                sym::EMPHASIS_POSITION_V,
                ItfValue::Symbol(sym::EMPHASIS_UNDER),
            ),
            Some("left") => out.set(sym::EMPHASIS_POSITION_H, ItfValue::Symbol(sym::ALIGN_LEFT)),
            Some("right") => out.set(sym::EMPHASIS_POSITION_H, ItfValue::Symbol(sym::ALIGN_RIGHT)),
            _ => warn_value(warnings, "text-emphasis-position", &part),
        }
    }
}

/// `border-radius`: one value is a single dimension; two values collapse to
/// one when numerically equal with the same unit, else a two-dimension
/// list; more are rejected.
fn apply_border_radius(out: &mut StyleProps, value: &CssValue, warnings: &mut Vec<StyleWarning>) {
    let parts = value.components();
    let dims: Vec<(f32, u64)> = parts
        .iter()
        .filter_map(|part| {
            let n = part.number?;
            let unit = match part.unit {
                Some(CssUnit::Em) => sym::UNIT_EM,
                Some(CssUnit::Percent) => sym::UNIT_PERCENT,
                Some(CssUnit::Px) => sym::UNIT_PX,
                Some(CssUnit::Pt) => sym::UNIT_PT,
                _ => return None,
            };
            Some((n, unit))
        })
        .collect();

    if dims.len() != parts.len() || dims.is_empty() || dims.len() > 2 {
        warn_value(warnings, "border-radius", value);
        return;
    }

    let radius = if dims.len() == 1 || (dims[0] == dims[1]) {
        dimension(dims[0].0 as f64, dims[0].1)
    } else {
        ItfValue::List(
            dims.iter()
                .map(|(n, unit)| dimension(*n as f64, *unit))
                .collect(),
        )
    };
    out.set(sym::BORDER_RADIUS, radius);
}

/// `-amzn-shape-outside: polygon(...)` becomes a flat op list terminated by
/// the closePath sentinel. Only percent coordinates are accepted.
fn apply_shape_outside(out: &mut StyleProps, value: &CssValue, warnings: &mut Vec<StyleWarning>) {
    let raw = value.raw.trim();
    let lower = raw.to_ascii_lowercase();
    let Some(args) = lower
        .strip_prefix("polygon(")
        .and_then(|rest| rest.strip_suffix(')'))
    else {
        warnings.push(StyleWarning::new(
            WarningKind::UnsupportedValue,
            format!("-amzn-shape-outside: {raw}"),
        ));
        return;
    };

    let mut path: Vec<ItfValue> = Vec::new();
    for (index, point) in args.split(',').enumerate() {
        let coords: Vec<&str> = point.split_whitespace().collect();
        if coords.len() != 2 {
            warn_value(warnings, "-amzn-shape-outside", value);
            return;
        }
        let mut pair = [0.0f64; 2];
        for (slot, coord) in pair.iter_mut().zip(&coords) {
            let Some(percent) = coord.strip_suffix('%').and_then(|n| n.trim().parse::<f64>().ok())
            else {
                warn_value(warnings, "-amzn-shape-outside", value);
                return;
            };
            *slot = percent / 100.0;
        }
        let op = if index == 0 { PATH_MOVE } else { PATH_LINE };
        path.push(ItfValue::Int(op));
        path.push(ItfValue::Float(pair[0]));
        path.push(ItfValue::Float(pair[1]));
    }
    if path.is_empty() {
        warn_value(warnings, "-amzn-shape-outside", value);
        return;
    }
    path.push(ItfValue::Int(PATH_CLOSE));
    out.set(sym::BORDER_PATH, ItfValue::List(path));
}

/// `-amzn-page-align: <side-list>` pins content to page edges by emitting
/// -100% user margins for the named sides.
fn apply_page_align(out: &mut StyleProps, value: &CssValue, warnings: &mut Vec<StyleWarning>) {
    let full_bleed = dimension(-100.0, sym::UNIT_PERCENT);
    for part in value.components() {
        let symbols: &[u64] = match part.keyword.as_deref() {
            Some("top") => &[sym::USER_MARGIN_TOP_PERCENT],
            Some("bottom") => &[sym::USER_MARGIN_BOTTOM_PERCENT],
            Some("left") => &[sym::USER_MARGIN_LEFT_PERCENT],
            Some("right") => &[sym::USER_MARGIN_RIGHT_PERCENT],
            Some("all") => &[
                sym::USER_MARGIN_TOP_PERCENT,
                sym::USER_MARGIN_BOTTOM_PERCENT,
                sym::USER_MARGIN_LEFT_PERCENT,
                sym::USER_MARGIN_RIGHT_PERCENT,
            ],
            Some("none") => continue,
            _ => {
                warn_value(warnings, "-amzn-page-align", &part);
                continue;
            }
        };
        for &symbol in symbols {
            out.set(symbol, full_bleed.clone());
        }
    }
}

/// 1/2/3/4-value box shorthand expansion to (top, right, bottom, left).
fn expand_box_shorthand(parts: &[CssValue]) -> Option<[(&'static str, CssValue); 4]> {
    let (top, right, bottom, left) = match parts {
        [all] => (all, all, all, all),
        [tb, lr] => (tb, lr, tb, lr),
        [t, lr, b] => (t, lr, b, lr),
        [t, r, b, l] => (t, r, b, l),
        _ => return None,
    };
    Some([
        ("top", top.clone()),
        ("right", right.clone()),
        ("bottom", bottom.clone()),
        ("left", left.clone()),
    ])
}

fn warn_unknown_unit(warnings: &mut Vec<StyleWarning>, name: &str, value: &CssValue) {
    warnings.push(StyleWarning::new(
        WarningKind::UnknownUnit,
        format!("{name}: {}", value.raw),
    ));
}

fn warn_value(warnings: &mut Vec<StyleWarning>, name: &str, value: &CssValue) {
    warnings.push(StyleWarning::new(
        WarningKind::UnsupportedValue,
        format!("{name}: {}", value.raw),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::SimpleSelector;
    use crate::style::read_dimension;

    fn map_one(name: &str, value: &str) -> (StyleProps, Vec<StyleWarning>) {
        map_for_selector(&Selector::default(), name, value)
    }

    fn map_for_selector(
        selector: &Selector,
        name: &str,
        value: &str,
    ) -> (StyleProps, Vec<StyleWarning>) {
        let mut warnings = Vec::new();
        let props = map_rule_properties(
            selector,
            &[(name.to_string(), CssValue::parse(value))],
            &mut warnings,
        );
        (props, warnings)
    }

    #[test]
    fn test_margin_shorthand_expands() {
        let (props, warnings) = map_one("margin", "1.2em 2.4em");
        assert!(warnings.is_empty());
        assert!(props.contains(sym::MARGIN_TOP));
        assert!(props.contains(sym::MARGIN_BOTTOM));
        assert!(props.contains(sym::MARGIN_LEFT));
        assert!(props.contains(sym::MARGIN_RIGHT));
        // 1.2em at ratio 1.2 is exactly one line
        let (value, unit) = read_dimension(props.get(sym::MARGIN_TOP).unwrap()).unwrap();
        assert!((value - 1.0).abs() < 1e-6);
        assert_eq!(unit, sym::UNIT_LH);
    }

    #[test]
    fn test_negative_margins_rejected_with_warnings() {
        let (props, warnings) = map_one("margin", "-8pt -8pt -8pt -8pt");
        assert_eq!(warnings.len(), 4);
        assert!(warnings.iter().all(|w| w.kind == WarningKind::NegativeMargin));
        for symbol in [
            sym::MARGIN_TOP,
            sym::MARGIN_RIGHT,
            sym::MARGIN_BOTTOM,
            sym::MARGIN_LEFT,
        ] {
            assert!(!props.contains(symbol));
        }
    }

    #[test]
    fn test_text_indent_em_to_percent() {
        let (props, _) = map_one("text-indent", "2em");
        let (value, unit) = read_dimension(props.get(sym::TEXT_INDENT).unwrap()).unwrap();
        assert_eq!(unit, sym::UNIT_PERCENT);
        assert!((value - 2.0 * EM_TO_PERCENT_TEXT_INDENT as f64).abs() < 1e-6);
    }

    #[test]
    fn test_text_indent_ex_normalized() {
        // 2ex = 1em = 3.125%
        let (props, _) = map_one("text-indent", "2ex");
        let (value, _) = read_dimension(props.get(sym::TEXT_INDENT).unwrap()).unwrap();
        assert!((value - 3.125).abs() < 1e-6);
    }

    #[test]
    fn test_font_size_rem() {
        let (props, _) = map_one("font-size", "1.5em");
        let (value, unit) = read_dimension(props.get(sym::FONT_SIZE).unwrap()).unwrap();
        assert_eq!(unit, sym::UNIT_REM);
        assert!((value - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_unit_warns() {
        let (props, warnings) = map_one("font-size", "5vw");
        assert!(props.is_empty());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::UnknownUnit);
    }

    #[test]
    fn test_widows_orphans_combine() {
        let mut warnings = Vec::new();
        let props = map_rule_properties(
            &Selector::default(),
            &[
                ("widows".to_string(), CssValue::parse("2")),
                ("orphans".to_string(), CssValue::parse("3")),
            ],
            &mut warnings,
        );
        let keep = props.get(sym::KEEP_LINES_TOGETHER).unwrap();
        assert_eq!(keep.get(sym::KEEP_LAST), Some(&ItfValue::Int(2)));
        assert_eq!(keep.get(sym::KEEP_FIRST), Some(&ItfValue::Int(3)));
    }

    #[test]
    fn test_page_break_avoid() {
        let (props, _) = map_one("page-break-after", "avoid");
        assert_eq!(
            props.get(sym::KEEP_LAST),
            Some(&ItfValue::Symbol(sym::VALUE_AVOID))
        );

        let (props, _) = map_one("page-break-inside", "avoid");
        assert_eq!(
            props.get(sym::BREAK_INSIDE),
            Some(&ItfValue::Symbol(sym::VALUE_AVOID))
        );
    }

    #[test]
    fn test_float_snap_block_only_on_img() {
        let img = Selector::simple(SimpleSelector {
            tag: Some("img".to_string()),
            ..Default::default()
        });
        let (props, _) = map_for_selector(&img, "float", "snap-block");
        assert_eq!(
            props.get(sym::FLOAT),
            Some(&ItfValue::Symbol(sym::FLOAT_SNAP_BLOCK))
        );

        let (props, _) = map_one("float", "snap-block");
        assert!(!props.contains(sym::FLOAT));
    }

    #[test]
    fn test_border_radius_identical_pair_collapses() {
        let (props, _) = map_one("border-radius", "5em 5em");
        let radius = props.get(sym::BORDER_RADIUS).unwrap();
        let (value, unit) = read_dimension(radius).unwrap();
        assert!((value - 5.0).abs() < 1e-9);
        assert_eq!(unit, sym::UNIT_EM);
    }

    #[test]
    fn test_border_radius_mixed_pair_is_list() {
        let (props, _) = map_one("border-radius", "10px 50%");
        let radius = props.get(sym::BORDER_RADIUS).unwrap();
        let items = radius.as_list().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(read_dimension(&items[0]).unwrap(), (10.0, sym::UNIT_PX));
        assert_eq!(read_dimension(&items[1]).unwrap(), (50.0, sym::UNIT_PERCENT));
    }

    #[test]
    fn test_border_radius_three_values_rejected() {
        let (props, warnings) = map_one("border-radius", "1em 2em 3em");
        assert!(!props.contains(sym::BORDER_RADIUS));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_polygon_shape() {
        let (props, _) = map_one(
            "-amzn-shape-outside",
            "polygon(0% 0%, 100% 0%, 100% 100%, 0% 100%)",
        );
        let path = props.get(sym::BORDER_PATH).unwrap().as_list().unwrap();
        let expected: Vec<f64> = vec![
            0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 4.0,
        ];
        let actual: Vec<f64> = path
            .iter()
            .map(|v| v.to_f64().unwrap())
            .collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_circle_shape_rejected() {
        let (props, warnings) = map_one("-amzn-shape-outside", "circle(50%)");
        assert!(!props.contains(sym::BORDER_PATH));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_polygon_non_percent_rejected() {
        let (props, warnings) = map_one("-amzn-shape-outside", "polygon(0px 0px, 10px 10px)");
        assert!(!props.contains(sym::BORDER_PATH));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_page_align_sides() {
        let (props, _) = map_one("-amzn-page-align", "top left");
        let (value, unit) =
            read_dimension(props.get(sym::USER_MARGIN_TOP_PERCENT).unwrap()).unwrap();
        assert_eq!(unit, sym::UNIT_PERCENT);
        assert!((value + 100.0).abs() < 1e-9);
        assert!(props.contains(sym::USER_MARGIN_LEFT_PERCENT));
        assert!(!props.contains(sym::USER_MARGIN_BOTTOM_PERCENT));
    }

    #[test]
    fn test_text_decoration_tokens() {
        let (props, _) = map_one("text-decoration", "underline line-through");
        assert_eq!(props.get(sym::UNDERLINE), Some(&ItfValue::Bool(true)));
        assert_eq!(props.get(sym::STRIKETHROUGH), Some(&ItfValue::Bool(true)));

        let mut warnings = Vec::new();
        let props = map_rule_properties(
            &Selector::default(),
            &[
                ("text-decoration".to_string(), CssValue::parse("underline")),
                ("text-decoration".to_string(), CssValue::parse("none")),
            ],
            &mut warnings,
        );
        // Rule-level later-wins happens upstream, but `none` also clears.
        assert!(!props.contains(sym::UNDERLINE));
    }

    #[test]
    fn test_emphasis_style_pair() {
        let (props, _) = map_one("text-emphasis-style", "open circle");
        assert_eq!(
            props.get(sym::EMPHASIS_FILL),
            Some(&ItfValue::Symbol(sym::EMPHASIS_OPEN))
        );
        assert_eq!(
            props.get(sym::EMPHASIS_SHAPE),
            Some(&ItfValue::Symbol(sym::EMPHASIS_CIRCLE))
        );
    }

    #[test]
    fn test_emphasis_position_components() {
        let (props, _) = map_one("text-emphasis-position", "under right");
        assert_eq!(
            props.get(sym::EMPHASIS_POSITION_V),
            Some(&ItfValue::Symbol(sym::EMPHASIS_UNDER))
        );
        assert_eq!(
            props.get(sym::EMPHASIS_POSITION_H),
            Some(&ItfValue::Symbol(sym::ALIGN_RIGHT))
        );
    }

    #[test]
    fn test_bgcolor_maps_to_fill_color() {
        let (props, _) = map_one("bgcolor", "#336699");
        assert_eq!(props.get(sym::FILL_COLOR), Some(&ItfValue::Int(0xff336699u32 as i64)));
    }

    #[test]
    fn test_unsupported_property_warns() {
        let (props, warnings) = map_one("animation", "spin 2s");
        assert!(props.is_empty());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::UnsupportedProperty);
    }
}
