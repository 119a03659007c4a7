//! CSS value model.

/// Factor for normalizing `ex` units to `em` (one ex is about half an em).
pub const EX_TO_EM_FACTOR: f32 = 0.5;

/// Units the converter understands. Anything else fails conversion and the
/// property is dropped by the mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CssUnit {
    Em,
    Percent,
    Px,
    Pt,
    Cm,
    Mm,
    In,
    Rem,
    /// Line-height units; also the reading of a unitless line-height.
    Lh,
}

impl CssUnit {
    fn from_suffix(suffix: &str) -> Option<CssUnit> {
        let unit = match suffix {
            "em" => CssUnit::Em,
            // ex is normalized to em at parse time
            "ex" => CssUnit::Em,
            "%" => CssUnit::Percent,
            "px" => CssUnit::Px,
            "pt" => CssUnit::Pt,
            "cm" => CssUnit::Cm,
            "mm" => CssUnit::Mm,
            "in" => CssUnit::In,
            "rem" => CssUnit::Rem,
            "lh" => CssUnit::Lh,
            _ => return None,
        };
        Some(unit)
    }
}

/// A parsed CSS value.
///
/// `raw` always holds the source text. For a single numeric value the
/// number and unit are populated; for a single identifier the keyword is.
/// Multi-component values (shorthands, token lists) keep only `raw` and are
/// re-split by the mapper.
#[derive(Debug, Clone, PartialEq)]
pub struct CssValue {
    pub raw: String,
    pub number: Option<f32>,
    pub unit: Option<CssUnit>,
    pub keyword: Option<String>,
}

impl CssValue {
    /// Parse one component: a dimension, a bare number, or a keyword.
    pub fn parse(text: &str) -> CssValue {
        let raw = text.trim().to_string();

        if let Some((number, unit)) = split_dimension(&raw) {
            return CssValue {
                raw,
                number: Some(number),
                unit,
                keyword: None,
            };
        }

        let keyword = if !raw.is_empty()
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            Some(raw.to_ascii_lowercase())
        } else {
            None
        };

        CssValue {
            raw,
            number: None,
            unit: None,
            keyword,
        }
    }

    /// Split a multi-component value on whitespace, parsing each part.
    pub fn components(&self) -> Vec<CssValue> {
        self.raw.split_whitespace().map(CssValue::parse).collect()
    }

    /// Whether the value is a single parsed number (with or without unit).
    pub fn is_numeric(&self) -> bool {
        self.number.is_some()
    }

    pub fn keyword_is(&self, expected: &str) -> bool {
        self.keyword.as_deref() == Some(expected)
    }
}

/// Parse `<number><unit>` where the unit may be empty. `ex` values are
/// normalized to `em`. An unknown unit yields `(number: None)` upstream by
/// returning `None` here.
fn split_dimension(text: &str) -> Option<(f32, Option<CssUnit>)> {
    let split = text
        .char_indices()
        .find(|&(_, c)| !matches!(c, '0'..='9' | '.' | '-' | '+'))
        .map(|(i, _)| i)
        .unwrap_or(text.len());

    let (num_text, suffix) = text.split_at(split);
    if num_text.is_empty() {
        return None;
    }
    let mut number: f32 = num_text.parse().ok()?;

    if suffix.is_empty() {
        return Some((number, None));
    }
    let unit = CssUnit::from_suffix(&suffix.to_ascii_lowercase())?;
    if suffix.eq_ignore_ascii_case("ex") {
        number *= EX_TO_EM_FACTOR;
    }
    Some((number, Some(unit)))
}

/// Font weight classes the output format distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeightClass {
    Light,
    Normal,
    Medium,
    Semibold,
    Bold,
}

/// Map a font-weight value (keyword or numeric) to its class.
pub fn font_weight_class(value: &CssValue) -> Option<FontWeightClass> {
    if let Some(keyword) = &value.keyword {
        let class = match keyword.as_str() {
            "bold" | "bolder" => FontWeightClass::Bold,
            "lighter" => FontWeightClass::Light,
            "normal" => FontWeightClass::Normal,
            "medium" => FontWeightClass::Medium,
            _ => return None,
        };
        return Some(class);
    }
    let number = value.number?;
    let class = if number >= 700.0 {
        FontWeightClass::Bold
    } else if number >= 600.0 {
        FontWeightClass::Semibold
    } else if number >= 500.0 {
        FontWeightClass::Medium
    } else if number <= 300.0 {
        FontWeightClass::Light
    } else {
        FontWeightClass::Normal
    };
    Some(class)
}
