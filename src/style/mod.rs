//! The style pipeline: CSS-to-KFX property mapping, the style registry,
//! and the cascade context used while walking the source tree.

mod context;
mod mapper;
mod registry;

pub use context::StyleContext;
pub use mapper::{EM_TO_PERCENT_TEXT_INDENT, LINE_HEIGHT_RATIO, map_rule_properties};
pub use registry::{StyleDef, StyleRegistry, StyleUsage};

use crate::itf::{ItfValue, decode_decimal, encode_decimal};
use crate::symbols::sym;

/// Properties that only make sense on block boxes; excluded from inline
/// delta styles.
pub const BLOCK_ONLY_PROPERTIES: [u64; 9] = [
    sym::MARGIN_TOP,
    sym::MARGIN_BOTTOM,
    sym::MARGIN_LEFT,
    sym::MARGIN_RIGHT,
    sym::LINE_HEIGHT,
    sym::TEXT_INDENT,
    sym::KEEP_LINES_TOGETHER,
    sym::KEEP_FIRST,
    sym::KEEP_LAST,
];

/// An insertion-ordered `symbol -> value` property map.
///
/// Setting an existing symbol replaces its value in place; equality is
/// order-insensitive (two maps are equal when they hold the same entries).
#[derive(Debug, Clone, Default)]
pub struct StyleProps {
    entries: Vec<(u64, ItfValue)>,
}

impl StyleProps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, symbol: u64, value: ItfValue) {
        if let Some(slot) = self.entries.iter_mut().find(|(s, _)| *s == symbol) {
            slot.1 = value;
        } else {
            self.entries.push((symbol, value));
        }
    }

    pub fn get(&self, symbol: u64) -> Option<&ItfValue> {
        self.entries
            .iter()
            .find(|(s, _)| *s == symbol)
            .map(|(_, v)| v)
    }

    pub fn remove(&mut self, symbol: u64) -> Option<ItfValue> {
        let index = self.entries.iter().position(|(s, _)| *s == symbol)?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains(&self, symbol: u64) -> bool {
        self.entries.iter().any(|(s, _)| *s == symbol)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(u64, ItfValue)> {
        self.entries.iter()
    }

    /// Apply every entry of `other` over this map (later wins).
    pub fn merge_from(&mut self, other: &StyleProps) {
        for (symbol, value) in &other.entries {
            self.set(*symbol, value.clone());
        }
    }

    /// Entries sorted by symbol, for canonical byte output.
    pub fn sorted_entries(&self) -> Vec<(u64, ItfValue)> {
        let mut sorted = self.entries.clone();
        sorted.sort_by_key(|(s, _)| *s);
        sorted
    }
}

impl PartialEq for StyleProps {
    fn eq(&self, other: &Self) -> bool {
        if self.entries.len() != other.entries.len() {
            return false;
        }
        self.entries
            .iter()
            .all(|(symbol, value)| other.get(*symbol) == Some(value))
    }
}

impl FromIterator<(u64, ItfValue)> for StyleProps {
    fn from_iter<T: IntoIterator<Item = (u64, ItfValue)>>(iter: T) -> Self {
        let mut props = StyleProps::new();
        for (symbol, value) in iter {
            props.set(symbol, value);
        }
        props
    }
}

/// Build a dimension struct `{unit, value}` with a decimal value.
pub fn dimension(value: f64, unit_symbol: u64) -> ItfValue {
    ItfValue::Struct(vec![
        (sym::UNIT, ItfValue::Symbol(unit_symbol)),
        (sym::VALUE, ItfValue::Decimal(encode_decimal(value))),
    ])
}

/// Read a dimension struct back as `(value, unit symbol)`.
pub fn read_dimension(value: &ItfValue) -> Option<(f64, u64)> {
    let unit = value.get(sym::UNIT)?.as_symbol()?;
    let number = match value.get(sym::VALUE)? {
        ItfValue::Decimal(bytes) => decode_decimal(bytes)?,
        ItfValue::Int(n) => *n as f64,
        ItfValue::Float(f) => *f,
        _ => return None,
    };
    Some((number, unit))
}

/// Read a dimension in line-height units, if that is its unit.
pub fn read_lh(value: &ItfValue) -> Option<f64> {
    match read_dimension(value)? {
        (number, unit) if unit == sym::UNIT_LH => Some(number),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces() {
        let mut props = StyleProps::new();
        props.set(sym::MARGIN_TOP, ItfValue::Int(1));
        props.set(sym::MARGIN_TOP, ItfValue::Int(2));
        assert_eq!(props.len(), 1);
        assert_eq!(props.get(sym::MARGIN_TOP), Some(&ItfValue::Int(2)));
    }

    #[test]
    fn test_equality_ignores_order() {
        let a: StyleProps = [
            (sym::MARGIN_TOP, ItfValue::Int(1)),
            (sym::COLOR, ItfValue::Int(2)),
        ]
        .into_iter()
        .collect();
        let b: StyleProps = [
            (sym::COLOR, ItfValue::Int(2)),
            (sym::MARGIN_TOP, ItfValue::Int(1)),
        ]
        .into_iter()
        .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dimension_round_trip() {
        let dim = dimension(2.6, sym::UNIT_LH);
        assert_eq!(read_lh(&dim), Some(2.6));
        let (value, unit) = read_dimension(&dim).unwrap();
        assert!((value - 2.6).abs() < 1e-9);
        assert_eq!(unit, sym::UNIT_LH);
    }

    #[test]
    fn test_read_lh_rejects_other_units() {
        let dim = dimension(2.0, sym::UNIT_EM);
        assert_eq!(read_lh(&dim), None);
    }
}
