//! Locating XFA packets in the document catalog.
//!
//! The catalog's `/AcroForm` dictionary carries an `/XFA` entry that is
//! either a single stream holding the whole XDP package or an alternating
//! `[name stream name stream ...]` array of named packets. Because the
//! merged cross-reference map resolves every reference to its newest
//! revision, the packets found here are the live ones.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::{stream_filters, Object, ObjectRef};

/// A named segment of the XFA package.
#[derive(Debug, Clone)]
pub struct XfaPacket {
    /// Packet name: "template", "datasets", "config", "localeSet", ...
    pub name: String,
    /// Decompressed packet XML
    pub data: Vec<u8>,
    /// The stream object the packet came from
    pub source_object: ObjectRef,
    /// Whether the source stream was filtered
    pub compressed: bool,
}

/// True when the catalog carries an `/AcroForm` with an `/XFA` entry.
pub fn has_xfa(doc: &mut Document) -> Result<bool> {
    match raw_xfa_entry(doc) {
        Ok(_) => Ok(true),
        Err(Error::Xfa { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

/// The catalog's `/XFA` entry, unresolved.
fn raw_xfa_entry(doc: &mut Document) -> Result<Object> {
    let catalog = doc.catalog()?;
    let catalog_dict = catalog
        .as_dict()
        .ok_or_else(|| Error::xfa("Located", "catalog is not a dictionary"))?;

    let acroform = catalog_dict
        .get("AcroForm")
        .cloned()
        .ok_or_else(|| Error::xfa("Located", "catalog has no /AcroForm"))?;
    let acroform = doc.resolve(&acroform)?;
    let acroform_dict = acroform
        .as_dict()
        .ok_or_else(|| Error::xfa("Located", "/AcroForm is not a dictionary"))?;

    acroform_dict
        .get("XFA")
        .cloned()
        .ok_or_else(|| Error::xfa("Located", "/AcroForm has no /XFA entry"))
}

/// Packet name and stream reference pairs, without decoding the streams.
pub(crate) fn packet_refs(doc: &mut Document) -> Result<Vec<(String, ObjectRef)>> {
    let xfa = raw_xfa_entry(doc)?;

    // An /XFA reference may point at the single XDP stream or at the
    // packet array; only a resolved stream means the single-stream form.
    let xfa = match xfa {
        Object::Reference(obj_ref) => match doc.load_object(obj_ref)? {
            Object::Stream { .. } => return Ok(vec![("xdp".to_string(), obj_ref)]),
            resolved => resolved,
        },
        other => other,
    };

    match xfa {
        Object::Array(items) => {
            let mut refs = Vec::new();
            let mut i = 0;
            while i + 1 < items.len() {
                let name = match &items[i] {
                    Object::Name(n) => n.clone(),
                    Object::String(s) => String::from_utf8_lossy(s).to_string(),
                    other => {
                        log::warn!("XFA array entry {} is {}, skipping pair", i, other.type_name());
                        i += 2;
                        continue;
                    }
                };
                match items[i + 1].as_reference() {
                    Some(obj_ref) => refs.push((name, obj_ref)),
                    None => {
                        return Err(Error::xfa(
                            "Located",
                            format!("packet '{}' stream is not an indirect reference", name),
                        ))
                    }
                }
                i += 2;
            }
            if refs.is_empty() {
                return Err(Error::xfa("Located", "/XFA array holds no packets"));
            }
            Ok(refs)
        }
        other => Err(Error::xfa(
            "Located",
            format!("/XFA is {} (expected stream reference or array)", other.type_name()),
        )),
    }
}

/// Locate and decompress every XFA packet.
pub fn locate_packets(doc: &mut Document) -> Result<Vec<XfaPacket>> {
    let refs = packet_refs(doc)?;
    let mut packets = Vec::with_capacity(refs.len());

    for (name, obj_ref) in refs {
        let obj = doc.load_object(obj_ref)?;
        let compressed = match &obj {
            Object::Stream { dict, .. } => !stream_filters(dict).is_empty(),
            other => {
                return Err(Error::xfa(
                    "Located",
                    format!("packet '{}' object {} is {}", name, obj_ref, other.type_name()),
                ))
            }
        };
        let data = doc
            .stream_data(obj_ref)
            .map_err(|e| Error::xfa("Decompressed", format!("packet '{}': {}", name, e)))?;
        packets.push(XfaPacket {
            name,
            data,
            source_object: obj_ref,
            compressed,
        });
    }

    Ok(packets)
}

/// Find one packet by name.
pub fn find_packet(doc: &mut Document, name: &str) -> Result<XfaPacket> {
    let packets = locate_packets(doc)?;
    packets
        .into_iter()
        .find(|p| p.name == name)
        .ok_or_else(|| Error::xfa("Located", format!("no '{}' packet in /XFA", name)))
}
