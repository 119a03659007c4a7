//! Container serialization.
//!
//! Emits, in order: fixed header (patched with final offsets), entity
//! directory, document symbol table, format capabilities, container info,
//! generator metadata tail, then the concatenated ENTY records.

use super::{
    CONTAINER_MAGIC, CONTAINER_VERSION, Container, DIRECTORY_ENTRY_LEN, ENTITY_MAGIC,
    ENTITY_VERSION, FIXED_HEADER_LEN, Fragment, FragmentValue, metadata,
};
use crate::error::{FormatError, Result};
use crate::itf::{self, ItfValue};
use crate::symbols::{self, sym};

pub(super) fn write(container: &Container) -> Result<Vec<u8>> {
    if container.compression != 0 || container.drm != 0 {
        return Err(FormatError::UnsupportedEncoding {
            compression: container.compression,
            drm: container.drm,
        });
    }

    // Entity records, stably sorted by (type, id).
    let mut fragments: Vec<&Fragment> = container.fragments().iter().collect();
    fragments.sort_by_key(|f| (f.ftype, f.fid));

    let mut directory = Vec::with_capacity(fragments.len() * DIRECTORY_ENTRY_LEN);
    let mut payloads = Vec::new();
    for fragment in &fragments {
        if !fragment.value_kind_permitted() {
            return Err(FormatError::InvariantViolation(format!(
                "fragment type {} does not permit its value kind",
                symbols::name(fragment.ftype)
            )));
        }
        let record = entity_record(fragment);

        // Root fragments carry the reserved null id symbol in the directory.
        let dir_id: u32 = if fragment.is_root() { 0 } else { fragment.fid as u32 };
        directory.extend_from_slice(&dir_id.to_le_bytes());
        directory.extend_from_slice(&(fragment.ftype as u32).to_le_bytes());
        directory.extend_from_slice(&(payloads.len() as u64).to_le_bytes());
        directory.extend_from_slice(&(record.len() as u64).to_le_bytes());
        payloads.extend_from_slice(&record);
    }

    let payload_sha1 = sha1_smol::Sha1::from(&payloads).digest().to_string();

    // Document symbol table: the shared import extended with locals.
    let symtab = symbols::prolog_with_locals(&container.doc_symbols);

    let capabilities = match &container.format_capabilities {
        Some(value) => itf::to_bvm_only(&ItfValue::Annotated(
            vec![sym::FORMAT_CAPABILITIES],
            Box::new(value.clone()),
        )),
        None => Vec::new(),
    };

    // Offsets inside the header window.
    let directory_offset = FIXED_HEADER_LEN;
    let symtab_offset = directory_offset + directory.len();
    let capabilities_offset = symtab_offset + symtab.len();

    let mut info_fields = Vec::new();
    if !container.container_id.is_empty() {
        info_fields.push((
            sym::CONTAINER_ID,
            ItfValue::String(container.container_id.clone()),
        ));
    }
    info_fields.push((sym::COMPRESSION_TYPE, ItfValue::Int(0)));
    info_fields.push((sym::DRM_SCHEME, ItfValue::Int(0)));
    info_fields.push((sym::CHUNK_SIZE, ItfValue::Int(container.chunk_size)));
    info_fields.push((
        sym::INDEX_TABLE_OFFSET,
        ItfValue::Int(directory_offset as i64),
    ));
    info_fields.push((sym::INDEX_TABLE_LENGTH, ItfValue::Int(directory.len() as i64)));
    info_fields.push((sym::SYMBOL_TABLE_OFFSET, ItfValue::Int(symtab_offset as i64)));
    info_fields.push((sym::SYMBOL_TABLE_LENGTH, ItfValue::Int(symtab.len() as i64)));
    if !capabilities.is_empty() {
        info_fields.push((sym::FC_OFFSET, ItfValue::Int(capabilities_offset as i64)));
        info_fields.push((sym::FC_LENGTH, ItfValue::Int(capabilities.len() as i64)));
    }
    let info_bytes = itf::to_bvm_only(&ItfValue::Struct(info_fields));

    let info_offset = capabilities_offset + capabilities.len();

    let package_version = if container.generator_pkg.is_empty() {
        concat!("kindling-", env!("CARGO_PKG_VERSION")).to_string()
    } else {
        container.generator_pkg.clone()
    };
    let application_version = if container.generator_app.is_empty() {
        "kindling".to_string()
    } else {
        container.generator_app.clone()
    };
    let tail = metadata::emit(
        &package_version,
        &application_version,
        &payload_sha1,
        &container.container_id,
    );

    let header_len = info_offset + info_bytes.len() + tail.len();

    let mut output = Vec::with_capacity(header_len + payloads.len());
    output.extend_from_slice(CONTAINER_MAGIC);
    output.extend_from_slice(&CONTAINER_VERSION.to_le_bytes());
    output.extend_from_slice(&(header_len as u32).to_le_bytes());
    output.extend_from_slice(&(info_offset as u32).to_le_bytes());
    output.extend_from_slice(&(info_bytes.len() as u32).to_le_bytes());
    output.extend_from_slice(&directory);
    output.extend_from_slice(&symtab);
    output.extend_from_slice(&capabilities);
    output.extend_from_slice(&info_bytes);
    output.extend_from_slice(tail.as_bytes());
    output.extend_from_slice(&payloads);

    Ok(output)
}

/// One ENTY record: magic + version + record length + entity_info + payload.
fn entity_record(fragment: &Fragment) -> Vec<u8> {
    let info = ItfValue::Struct(vec![
        (sym::COMPRESSION_TYPE, ItfValue::Int(0)),
        (sym::DRM_SCHEME, ItfValue::Int(0)),
    ]);
    let info_bytes = itf::to_bvm_only(&info);

    let payload = match &fragment.value {
        FragmentValue::Raw(bytes) => bytes.clone(),
        FragmentValue::Itf(value) => {
            // Root fragments omit the type annotation.
            if fragment.is_root() {
                itf::to_raw(value)
            } else {
                itf::to_raw(&ItfValue::Annotated(
                    vec![fragment.ftype],
                    Box::new(value.clone()),
                ))
            }
        }
    };

    let header_len = 10 + info_bytes.len();
    let mut record = Vec::with_capacity(header_len + payload.len());
    record.extend_from_slice(ENTITY_MAGIC);
    record.extend_from_slice(&ENTITY_VERSION.to_le_bytes());
    record.extend_from_slice(&(header_len as u32).to_le_bytes());
    record.extend_from_slice(&info_bytes);
    record.extend_from_slice(&payload);
    record
}

/// Generate a container ID in the `CR!` convention.
pub fn generate_container_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let chars: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut state = seed;
    let mut id = String::from("CR!");
    for _ in 0..28 {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let idx = ((state >> 56) as usize) % chars.len();
        id.push(chars[idx] as char);
    }
    id
}
