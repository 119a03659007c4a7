//! Container parsing.
//!
//! Operates on a fully-buffered input slice; every span coming from the
//! header or directory is bounds-checked before slicing.

use super::{
    CONTAINER_MAGIC, Container, DEFAULT_CHUNK_SIZE, DIRECTORY_ENTRY_LEN, ENTITY_MAGIC,
    FIXED_HEADER_LEN, Fragment, MAX_CONTAINER_VERSION, MAX_ENTITY_VERSION, metadata, read_u16_le,
    read_u32_le, read_u64_le,
};
use crate::error::{FormatError, Result};
use crate::itf::{ItfReader, ItfValue};
use crate::symbols::sym;

struct DirectoryEntry {
    id: u64,
    ftype: u64,
    offset: usize,
    length: usize,
}

pub(super) fn read(data: &[u8]) -> Result<Container> {
    if data.len() < FIXED_HEADER_LEN {
        return Err(FormatError::Truncated {
            what: "container header",
        });
    }
    if &data[0..4] != CONTAINER_MAGIC {
        return Err(FormatError::Signature { expected: "CONT" });
    }

    let version = read_u16_le(data, 4);
    if version > MAX_CONTAINER_VERSION {
        return Err(FormatError::Version {
            found: version,
            max: MAX_CONTAINER_VERSION,
        });
    }

    let header_len = read_u32_le(data, 6) as usize;
    let info_offset = read_u32_le(data, 10) as usize;
    let info_length = read_u32_le(data, 14) as usize;

    if header_len > data.len() {
        return Err(FormatError::Truncated {
            what: "header window",
        });
    }

    let info_bytes = header_slice(data, header_len, info_offset, info_length, "container_info")?;
    let info = parse_container_info(info_bytes)?;

    if info.compression != 0 || info.drm != 0 {
        return Err(FormatError::UnsupportedEncoding {
            compression: info.compression,
            drm: info.drm,
        });
    }

    let mut container = Container::new(info.container_id.unwrap_or_default());
    container.version = version;
    container.chunk_size = info.chunk_size;

    // Document symbol table
    if let Some((offset, length)) = info.doc_symbols {
        let blob = header_slice(data, header_len, offset, length, "doc symbol table")?;
        let reader = ItfReader::new(blob)?;
        container.doc_symbols = reader.local_symbols().to_vec();
    }

    // Format capabilities (v2 field)
    if let Some((offset, length)) = info.format_capabilities {
        let blob = header_slice(data, header_len, offset, length, "format_capabilities")?;
        let mut reader = ItfReader::bvm_only(blob)?;
        container.format_capabilities = reader.next()?.map(|v| v.unwrap_annotated().clone());
    }

    // Generator metadata tail: from the end of container_info to the end of
    // the header window.
    let tail_start = info_offset + info_length;
    if tail_start < header_len {
        let generator = metadata::parse(&data[tail_start..header_len]);
        container.generator_app = generator.application_version.unwrap_or_default();
        container.generator_pkg = generator.package_version.unwrap_or_default();
        if container.container_id.is_empty() {
            if let Some(acr) = generator.acr {
                container.container_id = acr;
            }
        }
    }

    // Entity directory
    if let Some((offset, length)) = info.index_table {
        let directory = header_slice(data, header_len, offset, length, "entity directory")?;
        for entry in parse_directory(directory) {
            let fragment = read_entity(data, header_len, &entry, &container.doc_symbols)?;
            container.add_fragment_lossy(fragment);
        }
    }

    Ok(container)
}

/// Slice a span declared by the container info; it must lie inside the
/// header window.
fn header_slice<'a>(
    data: &'a [u8],
    header_len: usize,
    offset: usize,
    length: usize,
    what: &'static str,
) -> Result<&'a [u8]> {
    let end = offset.checked_add(length);
    match end {
        Some(end) if end <= header_len && end <= data.len() => Ok(&data[offset..end]),
        _ => Err(FormatError::Truncated { what }),
    }
}

#[derive(Default)]
struct ContainerInfo {
    container_id: Option<String>,
    compression: i64,
    drm: i64,
    chunk_size: i64,
    index_table: Option<(usize, usize)>,
    doc_symbols: Option<(usize, usize)>,
    format_capabilities: Option<(usize, usize)>,
}

fn parse_container_info(data: &[u8]) -> Result<ContainerInfo> {
    let mut reader = ItfReader::bvm_only(data)?;
    let value = reader
        .next()?
        .ok_or(FormatError::Truncated { what: "container_info" })?;
    if value.as_struct().is_none() {
        return Err(FormatError::ItfDecode(
            "container_info is not a struct".to_string(),
        ));
    }

    let mut info = ContainerInfo {
        chunk_size: DEFAULT_CHUNK_SIZE,
        ..Default::default()
    };

    let int_field = |id: u64| value.get(id).and_then(ItfValue::as_int);
    let span = |off_id: u64, len_id: u64| {
        match (int_field(off_id), int_field(len_id)) {
            (Some(off), Some(len)) if off >= 0 && len >= 0 => Some((off as usize, len as usize)),
            _ => None,
        }
    };

    info.container_id = value
        .get(sym::CONTAINER_ID)
        .and_then(ItfValue::as_string)
        .map(str::to_string);
    info.compression = int_field(sym::COMPRESSION_TYPE).unwrap_or(0);
    info.drm = int_field(sym::DRM_SCHEME).unwrap_or(0);
    if let Some(chunk) = int_field(sym::CHUNK_SIZE) {
        info.chunk_size = chunk;
    }
    info.index_table = span(sym::INDEX_TABLE_OFFSET, sym::INDEX_TABLE_LENGTH);
    info.doc_symbols = span(sym::SYMBOL_TABLE_OFFSET, sym::SYMBOL_TABLE_LENGTH);
    info.format_capabilities = span(sym::FC_OFFSET, sym::FC_LENGTH);

    Ok(info)
}

/// Each directory record is 24 bytes: id(4) + type(4) + offset(8) +
/// length(8), offsets relative to the end of the header window.
fn parse_directory(data: &[u8]) -> Vec<DirectoryEntry> {
    let count = data.len() / DIRECTORY_ENTRY_LEN;
    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let base = i * DIRECTORY_ENTRY_LEN;
        entries.push(DirectoryEntry {
            id: read_u32_le(data, base) as u64,
            ftype: read_u32_le(data, base + 4) as u64,
            offset: read_u64_le(data, base + 8) as usize,
            length: read_u64_le(data, base + 16) as usize,
        });
    }
    entries
}

fn read_entity(
    data: &[u8],
    header_len: usize,
    entry: &DirectoryEntry,
    doc_symbols: &[String],
) -> Result<Fragment> {
    let start = header_len
        .checked_add(entry.offset)
        .ok_or(FormatError::Truncated { what: "entity" })?;
    let end = start
        .checked_add(entry.length)
        .ok_or(FormatError::Truncated { what: "entity" })?;
    if end > data.len() {
        return Err(FormatError::Truncated { what: "entity" });
    }
    let record = &data[start..end];

    if record.len() < 10 {
        return Err(FormatError::Truncated { what: "entity header" });
    }
    if &record[0..4] != ENTITY_MAGIC {
        return Err(FormatError::Signature { expected: "ENTY" });
    }
    let version = read_u16_le(record, 4);
    if version > MAX_ENTITY_VERSION {
        return Err(FormatError::Version {
            found: version,
            max: MAX_ENTITY_VERSION,
        });
    }
    let record_header_len = read_u32_le(record, 6) as usize;
    if record_header_len < 10 || record_header_len > record.len() {
        return Err(FormatError::Truncated { what: "entity header" });
    }

    // entity_info: {compression_type, drm_scheme} in BVM-only form
    let mut info_reader = ItfReader::bvm_only(&record[10..record_header_len])?;
    if let Some(info) = info_reader.next()? {
        let compression = info
            .get(sym::COMPRESSION_TYPE)
            .and_then(ItfValue::as_int)
            .unwrap_or(0);
        let drm = info.get(sym::DRM_SCHEME).and_then(ItfValue::as_int).unwrap_or(0);
        if compression != 0 || drm != 0 {
            return Err(FormatError::UnsupportedEncoding { compression, drm });
        }
    }

    let payload = &record[record_header_len..];

    // The null id symbol marks a root fragment: its effective fid is its
    // type symbol.
    let fid = if entry.id == 0 { entry.ftype } else { entry.id };

    if Fragment::is_raw_type(entry.ftype) {
        return Ok(Fragment::raw(entry.ftype, fid, payload.to_vec()));
    }

    let mut reader = ItfReader::raw(payload);
    reader.set_local_symbols(doc_symbols.to_vec());
    let value = reader
        .next()?
        .ok_or(FormatError::Truncated { what: "entity payload" })?;

    // Strip the type annotation wrapper when present.
    let value = match value {
        ItfValue::Annotated(ref anns, ref inner) if anns.as_slice() == [entry.ftype] => {
            (**inner).clone()
        }
        other => other,
    };

    Ok(Fragment::new(entry.ftype, fid, value))
}
