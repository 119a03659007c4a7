//! Canonical store of named style definitions.
//!
//! Styles deduplicate by their fully-resolved property map, not by name:
//! registering a definition equivalent to an existing one returns the
//! existing canonical name. Usage tags and liveness are tracked so that
//! only styles referenced by surviving content emit fragments.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use super::StyleProps;
use crate::container::Fragment;
use crate::css::{StyleWarning, WarningKind};
use crate::itf::ItfValue;
use crate::symbols::{SymbolTable, sym};

/// How a style is used by content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StyleUsage {
    Text,
    Block,
    Inline,
    #[default]
    Unknown,
}

/// A named style definition. Never mutated after admission; variants are
/// new definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleDef {
    pub name: String,
    pub properties: StyleProps,
    pub inherits: Option<String>,
    pub usage: StyleUsage,
}

/// The registry of style definitions for one conversion.
#[derive(Debug, Default)]
pub struct StyleRegistry {
    defs: HashMap<String, StyleDef>,
    /// Insertion order, for deterministic fragment emission.
    order: Vec<String>,
    /// Resolved-property-map hash -> candidate canonical names.
    by_resolved: HashMap<u64, Vec<String>>,
    /// Names referenced by surviving content.
    used: HashSet<String>,
    warnings: Vec<StyleWarning>,
}

impl StyleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition with no inheritance.
    ///
    /// Returns the canonical name: the given name if the definition is new,
    /// or the name of an existing definition with an equal resolved
    /// property map.
    pub fn register(&mut self, name: &str, properties: StyleProps, usage: StyleUsage) -> String {
        self.register_def(StyleDef {
            name: name.to_string(),
            properties,
            inherits: None,
            usage,
        })
    }

    /// Register a full definition (possibly inheriting).
    pub fn register_def(&mut self, mut def: StyleDef) -> String {
        let resolved = self.resolve_def(&def);
        let hash = props_hash(&resolved);

        if let Some(candidates) = self.by_resolved.get(&hash) {
            for candidate in candidates {
                if let Some(existing) = self.defs.get(candidate) {
                    if self.resolve_inheritance(existing) == resolved {
                        return candidate.clone();
                    }
                }
            }
        }

        // Disambiguate a reused name carrying different properties.
        if self.defs.contains_key(&def.name) {
            let base = def.name.clone();
            let mut counter = 2;
            while self.defs.contains_key(&format!("{base}-{counter}")) {
                counter += 1;
            }
            def.name = format!("{base}-{counter}");
        }

        let name = def.name.clone();
        self.by_resolved.entry(hash).or_default().push(name.clone());
        self.order.push(name.clone());
        self.defs.insert(name.clone(), def);
        name
    }

    pub fn get(&self, name: &str) -> Option<&StyleDef> {
        self.defs.get(name)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Flatten a definition's inheritance chain: child properties override
    /// parents. Cycles are broken and reported.
    pub fn resolve_inheritance(&self, def: &StyleDef) -> StyleProps {
        self.resolve_def(def)
    }

    fn resolve_def(&self, def: &StyleDef) -> StyleProps {
        let mut chain: Vec<&StyleDef> = vec![def];
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(def.name.as_str());

        let mut cursor = def;
        while let Some(parent_name) = cursor.inherits.as_deref() {
            if !visited.insert(parent_name) {
                log::warn!("style inheritance cycle through `{parent_name}`; broken");
                break;
            }
            match self.defs.get(parent_name) {
                Some(parent) => {
                    chain.push(parent);
                    cursor = parent;
                }
                None => break,
            }
        }

        let mut resolved = StyleProps::new();
        for def in chain.iter().rev() {
            resolved.merge_from(&def.properties);
        }
        resolved
    }

    /// Resolve by name; reports (and breaks) cycles into the warning list.
    pub fn resolve_by_name(&mut self, name: &str) -> Option<StyleProps> {
        let def = self.defs.get(name)?.clone();
        if self.has_cycle(&def) {
            self.warnings.push(StyleWarning::new(
                WarningKind::InheritanceCycle,
                format!("style `{name}` inherits through a cycle"),
            ));
        }
        Some(self.resolve_def(&def))
    }

    fn has_cycle(&self, def: &StyleDef) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(def.name.as_str());
        let mut cursor = def;
        while let Some(parent_name) = cursor.inherits.as_deref() {
            if !visited.insert(parent_name) {
                return true;
            }
            match self.defs.get(parent_name) {
                Some(parent) => cursor = parent,
                None => return false,
            }
        }
        false
    }

    /// Record how content uses a style. The first concrete kind sticks.
    pub fn mark_usage(&mut self, name: &str, usage: StyleUsage) {
        if let Some(def) = self.defs.get_mut(name) {
            if def.usage == StyleUsage::Unknown {
                def.usage = usage;
            }
        }
    }

    /// Recompute the live-style set by scanning fragment values for
    /// symbol-valued style references.
    pub fn recompute_used_styles(&mut self, fragments: &[Fragment], symbols: &SymbolTable) {
        const STYLE_FIELDS: [u64; 4] = [
            sym::STYLE,
            sym::STYLE_NAME,
            sym::LINK_TO,
            sym::RESOURCE_NAME,
        ];

        self.used.clear();
        let mut referenced: HashSet<u64> = HashSet::new();
        for fragment in fragments {
            if let Some(value) = fragment.as_itf() {
                scan_references(value, &STYLE_FIELDS, &mut referenced);
            }
        }
        for id in referenced {
            if let Some(name) = symbols.resolve(id) {
                if self.defs.contains_key(&name) {
                    self.used.insert(name);
                }
            }
        }
    }

    pub fn is_used(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    /// Emit one style fragment per live style, in registration order.
    /// Properties are flattened through inheritance and sorted by symbol.
    pub fn build_fragments(&self, symbols: &mut SymbolTable) -> Vec<Fragment> {
        let mut fragments = Vec::new();
        for name in &self.order {
            if !self.used.contains(name) {
                continue;
            }
            let Some(def) = self.defs.get(name) else {
                continue;
            };
            let resolved = self.resolve_def(def);
            let fid = symbols.get_or_intern(name);

            let mut fields = vec![(sym::STYLE_NAME, ItfValue::Symbol(fid))];
            fields.extend(resolved.sorted_entries());
            fragments.push(Fragment::new(sym::STYLE, fid, ItfValue::Struct(fields)));
        }
        fragments
    }

    pub fn take_warnings(&mut self) -> Vec<StyleWarning> {
        std::mem::take(&mut self.warnings)
    }
}

fn scan_references(value: &ItfValue, fields: &[u64], out: &mut HashSet<u64>) {
    match value {
        ItfValue::Struct(entries) => {
            for (key, val) in entries {
                if fields.contains(key) {
                    if let Some(id) = val.as_symbol() {
                        out.insert(id);
                    }
                }
                scan_references(val, fields, out);
            }
        }
        ItfValue::List(items) => {
            for item in items {
                scan_references(item, fields, out);
            }
        }
        ItfValue::Annotated(_, inner) => scan_references(inner, fields, out),
        _ => {}
    }
}

/// Hash of a resolved property map, order-insensitive via sorted entries.
fn props_hash(props: &StyleProps) -> u64 {
    let mut hasher = DefaultHasher::new();
    for (symbol, value) in props.sorted_entries() {
        symbol.hash(&mut hasher);
        hash_value(&value, &mut hasher);
    }
    hasher.finish()
}

fn hash_value<H: Hasher>(value: &ItfValue, hasher: &mut H) {
    std::mem::discriminant(value).hash(hasher);
    match value {
        ItfValue::Null => {}
        ItfValue::Bool(b) => b.hash(hasher),
        ItfValue::Int(n) => n.hash(hasher),
        ItfValue::Float(f) => f.to_bits().hash(hasher),
        ItfValue::Decimal(bytes) => bytes.hash(hasher),
        ItfValue::String(s) => s.hash(hasher),
        ItfValue::Symbol(id) => id.hash(hasher),
        ItfValue::Blob(bytes) => bytes.hash(hasher),
        ItfValue::List(items) => {
            for item in items {
                hash_value(item, hasher);
            }
        }
        ItfValue::Struct(entries) => {
            // Order-insensitive: combine per-entry hashes commutatively.
            let mut combined: u64 = 0;
            for (key, val) in entries {
                let mut entry_hasher = DefaultHasher::new();
                key.hash(&mut entry_hasher);
                hash_value(val, &mut entry_hasher);
                combined = combined.wrapping_add(entry_hasher.finish());
            }
            combined.hash(hasher);
        }
        ItfValue::Annotated(annotations, inner) => {
            annotations.hash(hasher);
            hash_value(inner, hasher);
        }
    }
}
