//! ITF: the self-describing binary tuple format used for fragment payloads.
//!
//! Values carry their own type and length; structs key their fields by
//! symbol ID against the shared catalog (or a document-local table).
//! The format is Ion-binary-compatible on the wire.
//!
//! Reference: <https://amazon-ion.github.io/ion-docs/docs/binary.html>

mod reader;
mod value;
mod writer;

pub use reader::ItfReader;
pub use value::{ItfValue, decode_decimal, encode_decimal};
pub use writer::ItfWriter;

use crate::symbols;

/// Binary version marker: the 4-byte prolog of a self-describing stream.
pub const BVM: [u8; 4] = [0xe0, 0x01, 0x00, 0xea];

/// ITF type codes (high nibble of the type descriptor byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ItfType {
    Null = 0,
    Bool = 1,
    PosInt = 2,
    NegInt = 3,
    Float = 4,
    Decimal = 5,
    Timestamp = 6,
    Symbol = 7,
    String = 8,
    Clob = 9,
    Blob = 10,
    List = 11,
    Sexp = 12,
    Struct = 13,
    Annotation = 14,
    Reserved = 15,
}

impl From<u8> for ItfType {
    fn from(value: u8) -> Self {
        match value {
            0 => ItfType::Null,
            1 => ItfType::Bool,
            2 => ItfType::PosInt,
            3 => ItfType::NegInt,
            4 => ItfType::Float,
            5 => ItfType::Decimal,
            6 => ItfType::Timestamp,
            7 => ItfType::Symbol,
            8 => ItfType::String,
            9 => ItfType::Clob,
            10 => ItfType::Blob,
            11 => ItfType::List,
            12 => ItfType::Sexp,
            13 => ItfType::Struct,
            14 => ItfType::Annotation,
            _ => ItfType::Reserved,
        }
    }
}

/// Serialize a value in full form: shared-table prolog (extended with the
/// given local symbols), then BVM, then the payload.
pub fn to_full(value: &ItfValue, locals: &[String]) -> Vec<u8> {
    let mut out = if locals.is_empty() {
        symbols::shared_prolog().to_vec()
    } else {
        symbols::prolog_with_locals(locals)
    };
    let mut writer = ItfWriter::new();
    writer.write_bvm();
    writer.write_value(value);
    out.extend_from_slice(&writer.into_bytes());
    out
}

/// Serialize a value in BVM-only form: BVM then payload, no symbol-table
/// import. Used for container_info and format_capabilities blobs.
pub fn to_bvm_only(value: &ItfValue) -> Vec<u8> {
    let mut writer = ItfWriter::new();
    writer.write_bvm();
    writer.write_value(value);
    writer.into_bytes()
}

/// Serialize a value in raw form: payload bytes only. Used for entity
/// payloads.
pub fn to_raw(value: &ItfValue) -> Vec<u8> {
    let mut writer = ItfWriter::new();
    writer.write_value(value);
    writer.into_bytes()
}

/// Read a base-128 big-endian VarUInt; the final byte has its high bit set.
pub fn read_varuint(data: &[u8], pos: &mut usize) -> crate::error::Result<u64> {
    let mut result: u64 = 0;
    for _ in 0..10 {
        let byte = *data
            .get(*pos)
            .ok_or(crate::error::FormatError::Truncated { what: "VarUInt" })?;
        *pos += 1;
        result = (result << 7) | (byte & 0x7f) as u64;
        if byte & 0x80 != 0 {
            return Ok(result);
        }
    }
    Err(crate::error::FormatError::ItfDecode(
        "VarUInt too long".to_string(),
    ))
}

/// Append a VarUInt to a buffer.
pub fn write_varuint(buf: &mut Vec<u8>, value: u64) {
    if value == 0 {
        buf.push(0x80);
        return;
    }

    let mut groups = Vec::new();
    let mut temp = value;
    while temp > 0 {
        groups.push((temp & 0x7f) as u8);
        temp >>= 7;
    }

    for (i, &group) in groups.iter().rev().enumerate() {
        if i == groups.len() - 1 {
            buf.push(group | 0x80);
        } else {
            buf.push(group);
        }
    }
}
