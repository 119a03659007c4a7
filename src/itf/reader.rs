//! Cursor-style ITF reader.

use super::{BVM, ItfType, ItfValue, read_varuint};
use crate::error::{FormatError, Result};
use crate::symbols::{LOCAL_MIN_ID, MAX_SHARED_ID, sym};

struct Frame {
    end: usize,
    in_struct: bool,
}

/// A cursor over an ITF byte stream.
///
/// The cursor yields values at the current depth via [`next`](Self::next),
/// descends into containers with [`step_in`](Self::step_in) /
/// [`step_out`](Self::step_out), and materializes generic [`ItfValue`]s.
/// Symbol IDs beyond the shared catalog resolve against the document-local
/// symbol list; an ID outside both tables is a decode error.
pub struct ItfReader<'a> {
    data: &'a [u8],
    pos: usize,
    frames: Vec<Frame>,
    local_symbols: Vec<String>,
}

impl<'a> ItfReader<'a> {
    /// Reader for a full-form stream: prolog (BVM + symbol-table import),
    /// optionally a second BVM, then payload values. Local symbols declared
    /// inline in the prolog are collected.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut reader = Self::raw(data);
        reader.expect_bvm()?;
        reader.absorb_prolog()?;
        Ok(reader)
    }

    /// Reader for a raw payload: no BVM, no symbol table.
    pub fn raw(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            frames: Vec::new(),
            local_symbols: Vec::new(),
        }
    }

    /// Reader for a BVM-only stream (container_info, format_capabilities).
    pub fn bvm_only(data: &'a [u8]) -> Result<Self> {
        let mut reader = Self::raw(data);
        reader.expect_bvm()?;
        Ok(reader)
    }

    /// Provide the document-local symbol list for IDs past the shared
    /// catalog; local symbol `i` resolves as `LOCAL_MIN_ID + i`.
    pub fn set_local_symbols(&mut self, locals: Vec<String>) {
        self.local_symbols = locals;
    }

    /// Local symbols collected from the prolog (plus any set explicitly).
    pub fn local_symbols(&self) -> &[String] {
        &self.local_symbols
    }

    fn expect_bvm(&mut self) -> Result<()> {
        if self.remaining() < 4 {
            return Err(FormatError::Truncated { what: "BVM" });
        }
        if self.data[self.pos..self.pos + 4] != BVM {
            return Err(FormatError::ItfDecode("missing BVM".to_string()));
        }
        self.pos += 4;
        Ok(())
    }

    /// Consume symbol-table import declarations and interleaved BVMs at the
    /// head of the stream, collecting any inline local symbols.
    fn absorb_prolog(&mut self) -> Result<()> {
        loop {
            if self.remaining() >= 4 && self.data[self.pos..self.pos + 4] == BVM {
                self.pos += 4;
                continue;
            }

            let save = self.pos;
            if self.at_end() {
                return Ok(());
            }
            let type_byte = self.data[self.pos];
            if ItfType::from(type_byte >> 4) != ItfType::Annotation {
                return Ok(());
            }

            let value = self.parse_value()?;
            match &value {
                ItfValue::Annotated(annotations, inner)
                    if annotations.contains(&sym::ION_SYMBOL_TABLE) =>
                {
                    if let Some(ItfValue::List(items)) = inner.get(sym::SYMBOLS) {
                        for item in items {
                            if let ItfValue::String(s) = item {
                                self.local_symbols.push(s.clone());
                            }
                        }
                    }
                }
                _ => {
                    // Not a symbol table; rewind so next() yields it.
                    self.pos = save;
                    return Ok(());
                }
            }
        }
    }

    fn current_end(&self) -> usize {
        self.frames.last().map(|f| f.end).unwrap_or(self.data.len())
    }

    fn in_struct(&self) -> bool {
        self.frames.last().map(|f| f.in_struct).unwrap_or(false)
    }

    /// True when no more values remain at the current depth.
    pub fn at_end(&self) -> bool {
        self.pos >= self.current_end()
    }

    /// Materialize the next value at the current depth, or `None` at end.
    /// Inside a struct the field name is consumed and discarded; use
    /// [`next_field`](Self::next_field) to keep it.
    pub fn next(&mut self) -> Result<Option<ItfValue>> {
        if self.at_end() {
            return Ok(None);
        }
        if self.in_struct() {
            let id = read_varuint(self.data, &mut self.pos)?;
            self.check_symbol(id)?;
        }
        Ok(Some(self.parse_value()?))
    }

    /// Materialize the next `(field symbol, value)` pair of the current
    /// struct, or `None` at end. Errors when the cursor is not in a struct.
    pub fn next_field(&mut self) -> Result<Option<(u64, ItfValue)>> {
        if !self.in_struct() {
            return Err(FormatError::ItfDecode(
                "next_field outside a struct".to_string(),
            ));
        }
        if self.at_end() {
            return Ok(None);
        }
        let id = read_varuint(self.data, &mut self.pos)?;
        self.check_symbol(id)?;
        let value = self.parse_value()?;
        Ok(Some((id, value)))
    }

    /// Enter the container (list or struct) at the cursor. Inside a struct
    /// the field name is consumed first.
    pub fn step_in(&mut self) -> Result<()> {
        if self.at_end() {
            return Err(FormatError::Truncated { what: "container" });
        }
        if self.in_struct() {
            let id = read_varuint(self.data, &mut self.pos)?;
            self.check_symbol(id)?;
        }

        let type_byte = self.read_u8()?;
        let itype = ItfType::from(type_byte >> 4);
        let length = self.read_length(type_byte)?;
        let end = self.pos + length;
        if end > self.data.len() {
            return Err(FormatError::Truncated { what: "container" });
        }

        match itype {
            ItfType::List | ItfType::Sexp => self.frames.push(Frame {
                end,
                in_struct: false,
            }),
            ItfType::Struct => self.frames.push(Frame {
                end,
                in_struct: true,
            }),
            other => {
                return Err(FormatError::ItfDecode(format!(
                    "step_in on non-container {other:?}"
                )));
            }
        }
        Ok(())
    }

    /// Leave the current container, skipping any unread values.
    pub fn step_out(&mut self) -> Result<()> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| FormatError::ItfDecode("step_out at top level".to_string()))?;
        self.pos = frame.end;
        Ok(())
    }

    /// Typed getter: next value must be an int.
    pub fn next_int(&mut self) -> Result<i64> {
        match self.next()? {
            Some(ItfValue::Int(n)) => Ok(n),
            other => Err(type_mismatch("int", other)),
        }
    }

    /// Typed getter: next value must be a string.
    pub fn next_string(&mut self) -> Result<String> {
        match self.next()? {
            Some(ItfValue::String(s)) => Ok(s),
            other => Err(type_mismatch("string", other)),
        }
    }

    /// Typed getter: next value must be a symbol.
    pub fn next_symbol(&mut self) -> Result<u64> {
        match self.next()? {
            Some(ItfValue::Symbol(id)) => Ok(id),
            other => Err(type_mismatch("symbol", other)),
        }
    }

    /// Typed getter: next value must be a blob.
    pub fn next_blob(&mut self) -> Result<Vec<u8>> {
        match self.next()? {
            Some(ItfValue::Blob(b)) => Ok(b),
            other => Err(type_mismatch("blob", other)),
        }
    }

    fn check_symbol(&self, id: u64) -> Result<()> {
        if id <= MAX_SHARED_ID {
            return Ok(());
        }
        let local_index = (id - LOCAL_MIN_ID) as usize;
        if local_index < self.local_symbols.len() {
            return Ok(());
        }
        Err(FormatError::ItfDecode(format!("unknown symbol ID {id}")))
    }

    /// Resolve a symbol ID through the shared catalog then the local list.
    pub fn resolve_symbol(&self, id: u64) -> Option<String> {
        if id <= MAX_SHARED_ID {
            return Some(crate::symbols::name(id));
        }
        self.local_symbols
            .get((id - LOCAL_MIN_ID) as usize)
            .cloned()
    }

    // --- low-level parsing ---

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn read_u8(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or(FormatError::Truncated { what: "value" })?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.pos + len > self.data.len() {
            return Err(FormatError::Truncated { what: "value body" });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_uint(&mut self, len: usize) -> Result<u64> {
        if len == 0 {
            return Ok(0);
        }
        if len > 8 {
            return Err(FormatError::ItfDecode(format!("oversized uint ({len} bytes)")));
        }
        let bytes = self.read_bytes(len)?;
        let mut result: u64 = 0;
        for &b in bytes {
            result = (result << 8) | b as u64;
        }
        Ok(result)
    }

    /// Resolve the length field of a type descriptor byte.
    fn read_length(&mut self, type_byte: u8) -> Result<usize> {
        let length_code = type_byte & 0x0f;
        if length_code == 14 {
            Ok(read_varuint(self.data, &mut self.pos)? as usize)
        } else {
            Ok(length_code as usize)
        }
    }

    fn parse_value(&mut self) -> Result<ItfValue> {
        let type_byte = self.read_u8()?;
        let itype = ItfType::from(type_byte >> 4);
        let length_code = type_byte & 0x0f;

        // Length code 15 is a typed null for every type.
        if length_code == 15 {
            return Ok(ItfValue::Null);
        }

        if itype == ItfType::Bool {
            return Ok(ItfValue::Bool(length_code != 0));
        }

        let length = if length_code == 14 {
            read_varuint(self.data, &mut self.pos)? as usize
        } else {
            length_code as usize
        };

        match itype {
            ItfType::Null => Ok(ItfValue::Null),

            ItfType::PosInt => {
                let magnitude = self.read_uint(length)?;
                if magnitude > i64::MAX as u64 {
                    return Err(FormatError::ItfDecode(format!(
                        "integer {magnitude} out of range"
                    )));
                }
                Ok(ItfValue::Int(magnitude as i64))
            }

            ItfType::NegInt => {
                let magnitude = self.read_uint(length)?;
                if magnitude > i64::MIN.unsigned_abs() {
                    return Err(FormatError::ItfDecode(format!(
                        "integer -{magnitude} out of range"
                    )));
                }
                Ok(ItfValue::Int((magnitude as i64).wrapping_neg()))
            }

            ItfType::Float => {
                let value = if length == 4 {
                    let bytes: [u8; 4] = self.read_bytes(4)?.try_into().unwrap();
                    f32::from_be_bytes(bytes) as f64
                } else if length == 8 {
                    let bytes: [u8; 8] = self.read_bytes(8)?.try_into().unwrap();
                    f64::from_be_bytes(bytes)
                } else if length == 0 {
                    0.0
                } else {
                    return Err(FormatError::ItfDecode(format!(
                        "float of length {length}"
                    )));
                };
                Ok(ItfValue::Float(value))
            }

            ItfType::Decimal => Ok(ItfValue::Decimal(self.read_bytes(length)?.to_vec())),

            ItfType::Symbol => {
                let id = self.read_uint(length)?;
                self.check_symbol(id)?;
                Ok(ItfValue::Symbol(id))
            }

            ItfType::String => {
                let bytes = self.read_bytes(length)?;
                let s = std::str::from_utf8(bytes)
                    .map_err(|e| FormatError::ItfDecode(format!("bad UTF-8 string: {e}")))?;
                Ok(ItfValue::String(s.to_string()))
            }

            ItfType::Blob | ItfType::Clob => Ok(ItfValue::Blob(self.read_bytes(length)?.to_vec())),

            ItfType::List | ItfType::Sexp => {
                let end = self.pos + length;
                if end > self.data.len() {
                    return Err(FormatError::Truncated { what: "list body" });
                }
                let mut items = Vec::new();
                while self.pos < end {
                    items.push(self.parse_value()?);
                }
                if self.pos != end {
                    return Err(FormatError::ItfDecode("list overran its length".to_string()));
                }
                Ok(ItfValue::List(items))
            }

            ItfType::Struct => {
                let end = self.pos + length;
                if end > self.data.len() {
                    return Err(FormatError::Truncated { what: "struct body" });
                }
                let mut fields = Vec::new();
                while self.pos < end {
                    let field_name = read_varuint(self.data, &mut self.pos)?;
                    self.check_symbol(field_name)?;
                    let value = self.parse_value()?;
                    fields.push((field_name, value));
                }
                if self.pos != end {
                    return Err(FormatError::ItfDecode(
                        "struct overran its length".to_string(),
                    ));
                }
                Ok(ItfValue::Struct(fields))
            }

            ItfType::Annotation => {
                let end = self.pos + length;
                if end > self.data.len() {
                    return Err(FormatError::Truncated { what: "annotation" });
                }

                let ann_len = read_varuint(self.data, &mut self.pos)? as usize;
                let ann_end = self.pos + ann_len;
                if ann_end > end {
                    return Err(FormatError::Truncated { what: "annotation ids" });
                }

                let mut annotations = Vec::new();
                while self.pos < ann_end {
                    let id = read_varuint(self.data, &mut self.pos)?;
                    self.check_symbol(id)?;
                    annotations.push(id);
                }

                let inner = if self.pos < end {
                    self.parse_value()?
                } else {
                    ItfValue::Null
                };

                Ok(ItfValue::Annotated(annotations, Box::new(inner)))
            }

            ItfType::Timestamp | ItfType::Reserved | ItfType::Bool => Err(FormatError::ItfDecode(
                format!("unsupported type {itype:?}"),
            )),
        }
    }
}

fn type_mismatch(expected: &str, got: Option<ItfValue>) -> FormatError {
    match got {
        Some(v) => FormatError::ItfDecode(format!("expected {expected}, found {v:?}")),
        None => FormatError::ItfDecode(format!("expected {expected}, found end of stream")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::itf::{ItfWriter, to_bvm_only, to_full};

    #[test]
    fn test_scalar_round_trip() {
        let values = [
            ItfValue::Null,
            ItfValue::Bool(true),
            ItfValue::Bool(false),
            ItfValue::Int(0),
            ItfValue::Int(42),
            ItfValue::Int(-7),
            ItfValue::Float(1.5),
            ItfValue::String("hello world".to_string()),
            ItfValue::Symbol(260),
            ItfValue::Blob(vec![1, 2, 3]),
        ];
        for v in values {
            let bytes = to_bvm_only(&v);
            let mut reader = ItfReader::bvm_only(&bytes).unwrap();
            assert_eq!(reader.next().unwrap(), Some(v));
        }
    }

    #[test]
    fn test_nested_round_trip() {
        let v = ItfValue::Struct(vec![
            (sym::CONTENT_ARRAY, ItfValue::List(vec![
                ItfValue::String("a".to_string()),
                ItfValue::Int(1),
            ])),
            (sym::STYLE, ItfValue::Symbol(157)),
            (sym::POSITION, ItfValue::Struct(vec![(sym::VALUE, ItfValue::Int(9))])),
        ]);
        let bytes = to_bvm_only(&v);
        let mut reader = ItfReader::bvm_only(&bytes).unwrap();
        assert_eq!(reader.next().unwrap(), Some(v));
    }

    #[test]
    fn test_full_form_collects_locals() {
        let locals = vec!["my-style".to_string(), "my-section".to_string()];
        let v = ItfValue::Symbol(LOCAL_MIN_ID + 1);
        let bytes = to_full(&v, &locals);
        let mut reader = ItfReader::new(&bytes).unwrap();
        assert_eq!(reader.local_symbols(), locals.as_slice());
        assert_eq!(reader.next().unwrap(), Some(v));
    }

    #[test]
    fn test_unknown_symbol_rejected() {
        let mut writer = ItfWriter::new();
        writer.write_bvm();
        writer.write_symbol(LOCAL_MIN_ID + 5);
        let bytes = writer.into_bytes();
        let mut reader = ItfReader::bvm_only(&bytes).unwrap();
        assert!(matches!(
            reader.next(),
            Err(FormatError::ItfDecode(_))
        ));
    }

    #[test]
    fn test_cursor_step_in_out() {
        let v = ItfValue::List(vec![
            ItfValue::Int(1),
            ItfValue::Struct(vec![(sym::VALUE, ItfValue::Int(2))]),
            ItfValue::Int(3),
        ]);
        let bytes = to_bvm_only(&v);
        let mut reader = ItfReader::bvm_only(&bytes).unwrap();

        reader.step_in().unwrap();
        assert_eq!(reader.next_int().unwrap(), 1);
        reader.step_in().unwrap();
        assert_eq!(
            reader.next_field().unwrap(),
            Some((sym::VALUE, ItfValue::Int(2)))
        );
        assert!(reader.at_end());
        reader.step_out().unwrap();
        assert_eq!(reader.next_int().unwrap(), 3);
        assert!(reader.at_end());
        reader.step_out().unwrap();
        assert!(reader.at_end());
    }

    #[test]
    fn test_typed_getter_mismatch() {
        let bytes = to_bvm_only(&ItfValue::String("nope".to_string()));
        let mut reader = ItfReader::bvm_only(&bytes).unwrap();
        assert!(reader.next_int().is_err());
    }

    #[test]
    fn test_truncated_input() {
        let bytes = to_bvm_only(&ItfValue::String("hello".to_string()));
        let mut reader = ItfReader::bvm_only(&bytes[..bytes.len() - 2]).unwrap();
        assert!(reader.next().is_err());
    }
}
