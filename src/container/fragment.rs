//! KFX fragment representation.
//!
//! A fragment is the unit of content inside a container: a `(type, id,
//! value)` triple. Most fragments carry ITF values; a small closed set of
//! types carries opaque bytes (images, fonts).

use crate::itf::ItfValue;
use crate::symbols::sym;

/// Fragment types whose payload is raw bytes rather than ITF.
pub const RAW_FRAGMENT_TYPES: [u64; 2] = [sym::RAW_MEDIA, sym::RAW_FONT];

/// Fragment types that describe the container itself and never appear as
/// entities in the directory.
pub const CONTAINER_ONLY_TYPES: [u64; 4] = [
    sym::CONTAINER_FRAGMENT,
    sym::ENTITY_MAP,
    sym::FORMAT_CAPABILITIES,
    sym::ION_SYMBOL_TABLE,
];

/// Fragment payload: ITF for structured content, raw bytes for media.
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentValue {
    Itf(ItfValue),
    Raw(Vec<u8>),
}

/// A KFX fragment.
///
/// Two fragments are duplicates when `(ftype, fid)` matches. A *root*
/// fragment has `fid == ftype`; its value is serialized without the type
/// annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// Fragment type symbol (e.g. `$259` for a storyline).
    pub ftype: u64,
    /// Fragment identifier symbol. Equal to `ftype` for root fragments.
    pub fid: u64,
    pub value: FragmentValue,
}

impl Fragment {
    /// Fragment with an ITF payload.
    pub fn new(ftype: u64, fid: u64, value: ItfValue) -> Self {
        Self {
            ftype,
            fid,
            value: FragmentValue::Itf(value),
        }
    }

    /// Fragment with a raw byte payload.
    pub fn raw(ftype: u64, fid: u64, bytes: Vec<u8>) -> Self {
        Self {
            ftype,
            fid,
            value: FragmentValue::Raw(bytes),
        }
    }

    /// Root fragment: `fid` equals `ftype`.
    pub fn root(ftype: u64, value: ItfValue) -> Self {
        Self {
            ftype,
            fid: ftype,
            value: FragmentValue::Itf(value),
        }
    }

    pub fn is_root(&self) -> bool {
        self.fid == self.ftype
    }

    pub fn is_raw(&self) -> bool {
        matches!(self.value, FragmentValue::Raw(_))
    }

    /// Whether this fragment's type requires a raw payload.
    pub fn is_raw_type(ftype: u64) -> bool {
        RAW_FRAGMENT_TYPES.contains(&ftype)
    }

    /// Whether the declared type permits this fragment's value kind.
    pub fn value_kind_permitted(&self) -> bool {
        Self::is_raw_type(self.ftype) == self.is_raw()
    }

    pub fn as_itf(&self) -> Option<&ItfValue> {
        match &self.value {
            FragmentValue::Itf(v) => Some(v),
            FragmentValue::Raw(_) => None,
        }
    }

    pub fn as_raw(&self) -> Option<&[u8]> {
        match &self.value {
            FragmentValue::Itf(_) => None,
            FragmentValue::Raw(bytes) => Some(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_fragment() {
        let frag = Fragment::root(sym::DOCUMENT_DATA, ItfValue::Null);
        assert!(frag.is_root());
        assert_eq!(frag.fid, sym::DOCUMENT_DATA);
    }

    #[test]
    fn test_raw_fragment() {
        let data = vec![0xff, 0xd8, 0xff, 0xe0]; // JPEG header
        let frag = Fragment::raw(sym::RAW_MEDIA, 900, data.clone());
        assert!(frag.is_raw());
        assert!(frag.value_kind_permitted());
        assert_eq!(frag.as_raw(), Some(data.as_slice()));
        assert!(frag.as_itf().is_none());
    }

    #[test]
    fn test_value_kind_mismatch_detected() {
        let frag = Fragment::new(sym::RAW_MEDIA, 900, ItfValue::Null);
        assert!(!frag.value_kind_permitted());

        let frag = Fragment::raw(sym::SECTION, 901, vec![1, 2]);
        assert!(!frag.value_kind_permitted());
    }
}
