//! Streaming ITF writer: a pushdown state machine over nested containers.

use super::{BVM, ItfValue, write_varuint};

enum FrameKind {
    List,
    Struct,
}

struct Frame {
    kind: FrameKind,
    buf: Vec<u8>,
    /// Field name of this container within its parent struct.
    field: Option<u64>,
    /// Annotations wrapping this container.
    annotations: Vec<u64>,
}

/// Streaming ITF writer.
///
/// Scalars are written directly; containers are opened with
/// `begin_struct`/`begin_list` and closed with the matching `end_*`, which
/// back-patches the container length into the parent. Struct fields are
/// named with [`field`](Self::field) before the value; annotations set via
/// [`annotation`](Self::annotation) wrap the next value written.
///
/// Field order in emitted structs is the caller's insertion order.
#[derive(Default)]
pub struct ItfWriter {
    buffer: Vec<u8>,
    stack: Vec<Frame>,
    pending_field: Option<u64>,
    pending_annotations: Vec<u64>,
}

impl ItfWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The written bytes. Panics in debug builds if containers are left
    /// open.
    pub fn into_bytes(self) -> Vec<u8> {
        debug_assert!(self.stack.is_empty(), "unclosed container");
        self.buffer
    }

    /// Write the binary version marker.
    pub fn write_bvm(&mut self) {
        self.sink().extend_from_slice(&BVM);
    }

    /// Name the next struct field.
    pub fn field(&mut self, symbol_id: u64) {
        self.pending_field = Some(symbol_id);
    }

    /// Annotate the next value written.
    pub fn annotation(&mut self, symbol_id: u64) {
        self.pending_annotations.push(symbol_id);
    }

    pub fn begin_struct(&mut self) {
        let field = self.pending_field.take();
        let annotations = std::mem::take(&mut self.pending_annotations);
        self.stack.push(Frame {
            kind: FrameKind::Struct,
            buf: Vec::new(),
            field,
            annotations,
        });
    }

    pub fn end_struct(&mut self) {
        self.close_container(FrameKind::Struct);
    }

    pub fn begin_list(&mut self) {
        let field = self.pending_field.take();
        let annotations = std::mem::take(&mut self.pending_annotations);
        self.stack.push(Frame {
            kind: FrameKind::List,
            buf: Vec::new(),
            field,
            annotations,
        });
    }

    pub fn end_list(&mut self) {
        self.close_container(FrameKind::List);
    }

    fn close_container(&mut self, expected: FrameKind) {
        let frame = self.stack.pop().expect("end without begin");
        debug_assert!(matches!(
            (&frame.kind, &expected),
            (FrameKind::List, FrameKind::List) | (FrameKind::Struct, FrameKind::Struct)
        ));

        let type_code = match frame.kind {
            FrameKind::List => 11,
            FrameKind::Struct => 13,
        };
        let mut encoded = Vec::with_capacity(frame.buf.len() + 4);
        write_type_descriptor(&mut encoded, type_code, frame.buf.len());
        encoded.extend_from_slice(&frame.buf);

        if !frame.annotations.is_empty() {
            encoded = wrap_annotations(&frame.annotations, &encoded);
        }

        if let Some(field) = frame.field {
            write_varuint(self.sink(), field);
        }
        let sink = self.sink();
        sink.extend_from_slice(&encoded);
    }

    pub fn write_null(&mut self) {
        self.emit(&[0x0f]);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.emit(&[if value { 0x11 } else { 0x10 }]);
    }

    pub fn write_int(&mut self, value: i64) {
        let mut bytes = Vec::new();
        if value == 0 {
            bytes.push(0x20);
        } else {
            let (type_code, magnitude) = if value >= 0 {
                (2u8, value as u64)
            } else {
                (3u8, value.unsigned_abs())
            };
            let mag = uint_bytes(magnitude);
            write_type_descriptor(&mut bytes, type_code, mag.len());
            bytes.extend_from_slice(&mag);
        }
        self.emit(&bytes);
    }

    /// Floats always serialize as 64-bit.
    pub fn write_float(&mut self, value: f64) {
        let mut bytes = vec![0x48];
        bytes.extend_from_slice(&value.to_be_bytes());
        self.emit(&bytes);
    }

    pub fn write_decimal(&mut self, decimal: &[u8]) {
        let mut bytes = Vec::with_capacity(decimal.len() + 2);
        write_type_descriptor(&mut bytes, 5, decimal.len());
        bytes.extend_from_slice(decimal);
        self.emit(&bytes);
    }

    pub fn write_symbol(&mut self, id: u64) {
        let mut bytes = Vec::new();
        if id == 0 {
            bytes.push(0x70);
        } else {
            let mag = uint_bytes(id);
            write_type_descriptor(&mut bytes, 7, mag.len());
            bytes.extend_from_slice(&mag);
        }
        self.emit(&bytes);
    }

    pub fn write_string(&mut self, s: &str) {
        let mut bytes = Vec::with_capacity(s.len() + 2);
        write_type_descriptor(&mut bytes, 8, s.len());
        bytes.extend_from_slice(s.as_bytes());
        self.emit(&bytes);
    }

    pub fn write_blob(&mut self, data: &[u8]) {
        let mut bytes = Vec::with_capacity(data.len() + 4);
        write_type_descriptor(&mut bytes, 10, data.len());
        bytes.extend_from_slice(data);
        self.emit(&bytes);
    }

    /// Recursively write a materialized value.
    pub fn write_value(&mut self, value: &ItfValue) {
        match value {
            ItfValue::Null => self.write_null(),
            ItfValue::Bool(b) => self.write_bool(*b),
            ItfValue::Int(n) => self.write_int(*n),
            ItfValue::Float(f) => self.write_float(*f),
            ItfValue::Decimal(bytes) => self.write_decimal(bytes),
            ItfValue::Symbol(id) => self.write_symbol(*id),
            ItfValue::String(s) => self.write_string(s),
            ItfValue::Blob(data) => self.write_blob(data),
            ItfValue::List(items) => {
                self.begin_list();
                for item in items {
                    self.write_value(item);
                }
                self.end_list();
            }
            ItfValue::Struct(fields) => {
                self.begin_struct();
                for (key, val) in fields {
                    self.field(*key);
                    self.write_value(val);
                }
                self.end_struct();
            }
            ItfValue::Annotated(annotations, inner) => {
                for &ann in annotations {
                    self.annotation(ann);
                }
                self.write_value(inner);
            }
        }
    }

    fn sink(&mut self) -> &mut Vec<u8> {
        match self.stack.last_mut() {
            Some(frame) => &mut frame.buf,
            None => &mut self.buffer,
        }
    }

    /// Emit encoded value bytes, applying any pending field name and
    /// annotation wrapper.
    fn emit(&mut self, encoded: &[u8]) {
        let annotations = std::mem::take(&mut self.pending_annotations);
        let field = self.pending_field.take();

        let wrapped;
        let body: &[u8] = if annotations.is_empty() {
            encoded
        } else {
            wrapped = wrap_annotations(&annotations, encoded);
            &wrapped
        };

        if let Some(field) = field {
            write_varuint(self.sink(), field);
        }
        let sink = self.sink();
        sink.extend_from_slice(body);
    }
}

/// Wrap already-encoded value bytes in an annotation container.
fn wrap_annotations(annotations: &[u64], inner: &[u8]) -> Vec<u8> {
    let mut ann_buf = Vec::new();
    for &ann in annotations {
        write_varuint(&mut ann_buf, ann);
    }

    let mut content = Vec::with_capacity(ann_buf.len() + inner.len() + 2);
    write_varuint(&mut content, ann_buf.len() as u64);
    content.extend_from_slice(&ann_buf);
    content.extend_from_slice(inner);

    let mut out = Vec::with_capacity(content.len() + 2);
    write_type_descriptor(&mut out, 14, content.len());
    out.extend_from_slice(&content);
    out
}

fn write_type_descriptor(buf: &mut Vec<u8>, type_code: u8, length: usize) {
    if length < 14 {
        buf.push((type_code << 4) | length as u8);
    } else {
        buf.push((type_code << 4) | 14);
        write_varuint(buf, length as u64);
    }
}

/// Minimal big-endian encoding of an unsigned int.
fn uint_bytes(value: u64) -> Vec<u8> {
    if value == 0 {
        return vec![];
    }
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    bytes[skip..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::itf::ItfReader;
    use crate::symbols::sym;

    #[test]
    fn test_streaming_struct_matches_materialized() {
        let mut streaming = ItfWriter::new();
        streaming.begin_struct();
        streaming.field(sym::CONTENT_TYPE);
        streaming.write_symbol(sym::TEXT_BLOCK);
        streaming.field(sym::VALUE);
        streaming.write_int(3);
        streaming.end_struct();

        let mut materialized = ItfWriter::new();
        materialized.write_value(&ItfValue::Struct(vec![
            (sym::CONTENT_TYPE, ItfValue::Symbol(sym::TEXT_BLOCK)),
            (sym::VALUE, ItfValue::Int(3)),
        ]));

        assert_eq!(streaming.into_bytes(), materialized.into_bytes());
    }

    #[test]
    fn test_field_order_is_insertion_order() {
        let mut w1 = ItfWriter::new();
        w1.write_value(&ItfValue::Struct(vec![
            (20, ItfValue::Int(1)),
            (10, ItfValue::Int(2)),
        ]));
        let mut w2 = ItfWriter::new();
        w2.write_value(&ItfValue::Struct(vec![
            (10, ItfValue::Int(2)),
            (20, ItfValue::Int(1)),
        ]));
        // Different insertion order, different bytes...
        assert_ne!(w1.into_bytes(), w2.into_bytes());
    }

    #[test]
    fn test_annotated_container_streaming() {
        let mut w = ItfWriter::new();
        w.write_bvm();
        w.annotation(sym::STORYLINE);
        w.begin_struct();
        w.field(sym::CONTENT_ARRAY);
        w.begin_list();
        w.write_string("text");
        w.end_list();
        w.end_struct();
        let bytes = w.into_bytes();

        let mut reader = ItfReader::bvm_only(&bytes).unwrap();
        let value = reader.next().unwrap().unwrap();
        match value {
            ItfValue::Annotated(anns, inner) => {
                assert_eq!(anns, vec![sym::STORYLINE]);
                assert!(inner.get(sym::CONTENT_ARRAY).is_some());
            }
            other => panic!("expected annotated struct, got {other:?}"),
        }
    }

    #[test]
    fn test_long_payload_uses_varuint_length() {
        let long = "x".repeat(300);
        let mut w = ItfWriter::new();
        w.write_bvm();
        w.write_string(&long);
        let bytes = w.into_bytes();
        // type descriptor 0x8E then VarUInt(300)
        assert_eq!(bytes[4], 0x8e);
        let mut reader = ItfReader::bvm_only(&bytes).unwrap();
        assert_eq!(reader.next_string().unwrap(), long);
    }
}
