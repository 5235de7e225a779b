//! Document output.
//!
//! Two modes:
//! - full rewrite: header, every live object, a traditional xref table,
//!   trailer, `%%EOF`. Object-stream members come out as direct objects,
//!   so containers and cross-reference streams are not carried over.
//! - incremental update: the original bytes untouched, followed by the
//!   replaced objects, a new xref section and a trailer whose `/Prev`
//!   points at the prior revision.
//!
//! When the source was encrypted, output objects are re-encrypted with
//! the same security handler, each under a freshly derived object key.

mod serializer;

pub use serializer::ObjectSerializer;

use crate::document::Document;
use crate::encryption::EncryptionHandler;
use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use crate::xref::ObjectLocation;
use std::io::Write;

/// Output mode selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMode {
    /// Rewrite the whole document (the default, simplest conformant form)
    #[default]
    FullRewrite,
    /// Append changed objects and a new xref section
    Incremental,
}

/// Serialize the whole document into a fresh PDF.
pub fn write_full(doc: &mut Document) -> Result<Vec<u8>> {
    let handler = writable_handler(doc)?;
    let serializer = ObjectSerializer;

    let mut ids: Vec<u32> = doc.xref().object_numbers().collect();
    ids.sort_unstable();

    let mut out = Vec::with_capacity(doc.bytes().len());
    let (major, minor) = doc.version();
    write!(out, "%PDF-{}.{}\n", major, minor)?;
    out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

    let mut offsets: Vec<(u32, u16, u64)> = Vec::with_capacity(ids.len());

    for id in ids {
        if id == 0 {
            continue;
        }
        let location = match doc.xref().get(id) {
            Some(location) => location,
            None => continue,
        };
        // Generations ride along from the slot; they are preserved, never
        // interpreted.
        let gen = match location {
            ObjectLocation::Direct { gen, .. } => gen,
            _ => 0,
        };
        let obj_ref = ObjectRef::new(id, gen);
        if location == ObjectLocation::Free && !doc.replacements().contains_key(&obj_ref) {
            continue;
        }

        let obj = match load_plain_object(doc, obj_ref) {
            Ok(obj) => obj,
            Err(e) => {
                log::warn!("object {} unreadable, dropping from rewrite: {}", obj_ref, e);
                continue;
            }
        };

        // Containers and xref streams are not carried into the rewrite:
        // members are written directly and a fresh table is emitted.
        if obj.has_type("ObjStm") || obj.has_type("XRef") {
            continue;
        }

        offsets.push((id, gen, out.len() as u64));
        let serialized = serialize_one(&serializer, doc, handler.as_ref(), obj_ref, &obj)?;
        out.extend_from_slice(&serialized);
    }

    if offsets.is_empty() {
        return Err(Error::InvalidPdf("no objects to write".to_string()));
    }

    let xref_offset = out.len() as u64;
    write_xref_table(&mut out, &offsets, true)?;

    let max_id = offsets.last().map(|(id, _, _)| *id).unwrap_or(0);
    let mut trailer = doc.trailer().clone();
    trailer.remove("Prev");
    trailer.remove("XRefStm");
    trailer.remove("Type");
    trailer.remove("W");
    trailer.remove("Index");
    trailer.remove("Filter");
    trailer.remove("DecodeParms");
    trailer.remove("Length");
    trailer.insert("Size".to_string(), Object::Integer(max_id as i64 + 1));

    write!(out, "trailer\n")?;
    out.extend_from_slice(&serializer.serialize(&Object::Dictionary(trailer))?);
    write!(out, "\nstartxref\n{}\n%%EOF\n", xref_offset)?;

    Ok(out)
}

/// Append the recorded replacements as an incremental update.
pub fn write_incremental(doc: &mut Document) -> Result<Vec<u8>> {
    if doc.replacements().is_empty() {
        return Ok(doc.bytes().to_vec());
    }

    let handler = writable_handler(doc)?;
    let serializer = ObjectSerializer;

    let mut out = doc.bytes().to_vec();
    if out.last() != Some(&b'\n') {
        out.push(b'\n');
    }

    let mut ids: Vec<ObjectRef> = doc.replacements().keys().copied().collect();
    ids.sort_unstable_by_key(|r| r.id);

    let mut offsets: Vec<(u32, u16, u64)> = Vec::with_capacity(ids.len());
    for obj_ref in ids {
        let obj = doc.replacements()[&obj_ref].clone();
        offsets.push((obj_ref.id, obj_ref.gen, out.len() as u64));
        let serialized = serialize_one(&serializer, doc, handler.as_ref(), obj_ref, &obj)?;
        out.extend_from_slice(&serialized);
    }

    let xref_offset = out.len() as u64;
    write_xref_table(&mut out, &offsets, false)?;

    let prev = doc
        .revisions()
        .last()
        .map(|s| s.start_offset)
        .expect("at least one revision");
    let old_size = doc
        .revisions()
        .last()
        .map(|s| s.size)
        .unwrap_or(0);
    let max_id = offsets.iter().map(|(id, _, _)| *id).max().unwrap_or(0);

    let mut trailer = doc.trailer().clone();
    trailer.remove("XRefStm");
    trailer.remove("Type");
    trailer.remove("W");
    trailer.remove("Index");
    trailer.remove("Filter");
    trailer.remove("DecodeParms");
    trailer.remove("Length");
    trailer.insert("Prev".to_string(), Object::Integer(prev as i64));
    trailer.insert(
        "Size".to_string(),
        Object::Integer(old_size.max(max_id + 1) as i64),
    );

    write!(out, "trailer\n")?;
    out.extend_from_slice(&serializer.serialize(&Object::Dictionary(trailer))?);
    write!(out, "\nstartxref\n{}\n%%EOF\n", xref_offset)?;

    Ok(out)
}

/// The handler to encrypt output with, or an error when the document is
/// encrypted but still locked.
fn writable_handler(doc: &Document) -> Result<Option<EncryptionHandler>> {
    match doc.encryption() {
        Some(handler) if handler.is_authenticated() => Ok(Some(handler.clone())),
        Some(_) => Err(Error::Decryption(
            "cannot rewrite a locked document; authenticate first".to_string(),
        )),
        None => Ok(None),
    }
}

/// Serialize one object, honoring the encryption exemptions.
fn serialize_one(
    serializer: &ObjectSerializer,
    doc: &Document,
    handler: Option<&EncryptionHandler>,
    obj_ref: ObjectRef,
    obj: &Object,
) -> Result<Vec<u8>> {
    let exempt = match obj {
        Object::Stream { dict, .. } => doc.is_decryption_exempt(dict, obj_ref),
        _ => Some(obj_ref.id) == doc.encrypt_obj_num(),
    };
    match handler {
        Some(handler) if !exempt => serializer.serialize_indirect_encrypted(obj_ref, obj, handler),
        _ => serializer.serialize_indirect(obj_ref, obj),
    }
}

/// Load an object with its stream payload decrypted (still filtered),
/// preferring a recorded replacement.
fn load_plain_object(doc: &mut Document, obj_ref: ObjectRef) -> Result<Object> {
    if let Some(replacement) = doc.replacements().get(&obj_ref) {
        return Ok(replacement.clone());
    }
    let obj = doc.load_object(obj_ref)?;
    if let Object::Stream { dict, data } = &obj {
        let dict = dict.clone();
        let data = data.clone();
        let plain = doc.stream_raw_plaintext(obj_ref, &dict, &data)?;
        return Ok(Object::Stream {
            dict,
            data: bytes::Bytes::from(plain),
        });
    }
    Ok(obj)
}

/// Emit a traditional xref table for the given (id, offset) pairs.
///
/// `with_free_head` adds the object-0 free entry, required for the table
/// of a full rewrite; incremental sections list only changed objects.
fn write_xref_table(
    out: &mut Vec<u8>,
    offsets: &[(u32, u16, u64)],
    with_free_head: bool,
) -> Result<()> {
    write!(out, "xref\n")?;

    let mut entries: Vec<(u32, String)> = Vec::with_capacity(offsets.len() + 1);
    if with_free_head {
        entries.push((0, "0000000000 65535 f \n".to_string()));
    }
    for (id, gen, offset) in offsets {
        entries.push((*id, format!("{:010} {:05} n \n", offset, gen)));
    }
    entries.sort_by_key(|(id, _)| *id);

    let mut i = 0;
    while i < entries.len() {
        let run_start = i;
        while i + 1 < entries.len() && entries[i + 1].0 == entries[i].0 + 1 {
            i += 1;
        }
        i += 1;
        let first = entries[run_start].0;
        write!(out, "{} {}\n", first, i - run_start)?;
        for (_, line) in &entries[run_start..i] {
            out.extend_from_slice(line.as_bytes());
        }
    }

    Ok(())
}
