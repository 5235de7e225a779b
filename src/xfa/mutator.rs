//! Datasets mutation.
//!
//! The mutator runs a fixed pipeline: Located -> Decompressed -> Parsed ->
//! Mutated -> Reassembled -> Written. A failure at any stage aborts with
//! the stage name in the error.
//!
//! Inside the datasets XML, every `<field name="...">` element whose name
//! matches an input entry (case-sensitive, exact) gets the text content of
//! its child `<value>` replaced; a missing `<value>` child is inserted.
//! Field names with no match in the document are silently ignored.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::BTreeMap;
use std::io::Cursor;

use super::packets::{find_packet, locate_packets, XfaPacket};
use super::values::FieldValueMap;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::{stream_filters, Object};

/// Outcome of a datasets mutation.
#[derive(Debug, Clone, Default)]
pub struct MutationReport {
    /// Field name to number of occurrences updated
    pub updated: BTreeMap<String, usize>,
    /// Input names that matched nothing (not an error)
    pub ignored: Vec<String>,
}

impl MutationReport {
    /// Total number of element updates across all fields.
    pub fn total_updates(&self) -> usize {
        self.updated.values().sum()
    }
}

/// Apply a field-value map to the document's datasets packet.
///
/// The rewritten packet is recorded as a replacement object on the
/// document; call a save method to emit the new file.
pub fn apply_field_values(doc: &mut Document, values: &FieldValueMap) -> Result<MutationReport> {
    // Located
    let packet = find_datasets_packet(doc)?;

    // Decompressed happened while locating; Parsed + Mutated next
    let (new_xml, updated) = if packet.name == "xdp" {
        rewrite_within_envelope(&packet.data, values)?
    } else {
        rewrite_datasets(&packet.data, values)?
    };

    let mut report = MutationReport::default();
    for (name, _) in values.iter() {
        match updated.get(name) {
            Some(&count) if count > 0 => {
                report.updated.insert(name.clone(), count);
            }
            _ => {
                log::debug!("field '{}' not present in datasets, ignoring", name);
                report.ignored.push(name.clone());
            }
        }
    }

    // Reassembled: recompress with the source's filter chain
    let original = doc.load_object(packet.source_object)?;
    let (mut dict, filters) = match &original {
        Object::Stream { dict, .. } => (dict.clone(), stream_filters(dict)),
        other => {
            return Err(Error::xfa(
                "Reassembled",
                format!("source object became {}", other.type_name()),
            ))
        }
    };

    let payload = if filters.is_empty() {
        new_xml
    } else {
        crate::decoders::encode_stream(&new_xml, &filters)
            .map_err(|e| Error::xfa("Reassembled", e.to_string()))?
    };
    dict.insert("Length".to_string(), Object::Integer(payload.len() as i64));
    dict.remove("DecodeParms");

    // Written: record the replacement; encryption happens at write time
    // with a freshly derived key for this object id.
    doc.replace_object(
        packet.source_object,
        Object::Stream {
            dict,
            data: bytes::Bytes::from(payload),
        },
    );

    Ok(report)
}

/// The datasets packet, or the whole XDP envelope when the document keeps
/// its XFA in one stream.
fn find_datasets_packet(doc: &mut Document) -> Result<XfaPacket> {
    let packets = locate_packets(doc)?;
    if let Some(p) = packets.into_iter().find(|p| p.name == "datasets") {
        return Ok(p);
    }
    match find_packet(doc, "xdp") {
        Ok(p) => Ok(p),
        Err(_) => Err(Error::xfa("Located", "no 'datasets' packet in /XFA")),
    }
}

/// Mutate only the `<xfa:datasets>` section of a combined XDP stream,
/// leaving the template and other packets byte-for-byte untouched.
fn rewrite_within_envelope(
    xml: &[u8],
    values: &FieldValueMap,
) -> Result<(Vec<u8>, BTreeMap<String, usize>)> {
    let start = find_bytes(xml, b"<xfa:datasets")
        .ok_or_else(|| Error::xfa("Parsed", "XDP envelope has no <xfa:datasets> section"))?;
    let end_tag: &[u8] = b"</xfa:datasets>";
    let end = find_bytes(xml, end_tag)
        .ok_or_else(|| Error::xfa("Parsed", "<xfa:datasets> section is unterminated"))?
        + end_tag.len();

    let (section, counts) = rewrite_datasets(&xml[start..end], values)?;

    let mut out = Vec::with_capacity(xml.len());
    out.extend_from_slice(&xml[..start]);
    out.extend_from_slice(&section);
    out.extend_from_slice(&xml[end..]);
    Ok((out, counts))
}

/// Per-element frame tracked while rewriting.
struct Frame {
    /// Field name when this element is a `<field>` matching the map
    matched_field: Option<String>,
    /// Whether a `<value>` child was seen for a matched field
    had_value: bool,
}

/// Event-based rewrite of the datasets XML.
///
/// Everything outside matched `<value>` content is copied through
/// unchanged, so the source's indentation survives. Parsing is
/// error-tolerant: mismatched end tags are common in namespaced XFA and
/// do not abort the walk.
fn rewrite_datasets(
    xml: &[u8],
    values: &FieldValueMap,
) -> Result<(Vec<u8>, BTreeMap<String, usize>)> {
    let mut reader = Reader::from_reader(xml);
    reader.check_end_names(false);

    let mut writer = Writer::new(Cursor::new(Vec::with_capacity(xml.len())));
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::xfa("Parsed", format!("XML error at byte {}: {}", reader.buffer_position(), e)))?;

        match event {
            Event::Start(start) => {
                let start_name = start.name();
                let name = local_name(start_name.as_ref());
                let parent_matched = stack
                    .last()
                    .and_then(|f| f.matched_field.clone());

                if name == "value" {
                    if let Some(field_name) = parent_matched {
                        // Replace the value's entire content
                        if let Some(frame) = stack.last_mut() {
                            frame.had_value = true;
                        }
                        let replacement = values
                            .get(&field_name)
                            .map(|v| v.to_text())
                            .unwrap_or_default();
                        *counts.entry(field_name).or_insert(0) += 1;

                        writer.write_event(Event::Start(start.to_owned())).map_err(write_err)?;
                        writer
                            .write_event(Event::Text(BytesText::new(&replacement)))
                            .map_err(write_err)?;
                        skip_element(&mut reader, &start)?;
                        writer
                            .write_event(Event::End(BytesEnd::new(
                                String::from_utf8_lossy(start.name().as_ref()).to_string(),
                            )))
                            .map_err(write_err)?;
                        buf.clear();
                        continue;
                    }
                }

                let matched_field = if name == "field" {
                    attribute_value(&start, "name").filter(|n| values.get(n).is_some())
                } else {
                    None
                };
                stack.push(Frame {
                    matched_field,
                    had_value: false,
                });
                writer.write_event(Event::Start(start.to_owned())).map_err(write_err)?;
            }
            Event::Empty(start) => {
                let start_name = start.name();
                let name = local_name(start_name.as_ref());
                let parent_matched = stack.last().and_then(|f| f.matched_field.clone());

                if name == "value" {
                    if let Some(field_name) = parent_matched {
                        // <value/> expands to <value>new</value>
                        if let Some(frame) = stack.last_mut() {
                            frame.had_value = true;
                        }
                        let replacement = values
                            .get(&field_name)
                            .map(|v| v.to_text())
                            .unwrap_or_default();
                        *counts.entry(field_name).or_insert(0) += 1;

                        let tag = String::from_utf8_lossy(start.name().as_ref()).to_string();
                        writer.write_event(Event::Start(start.to_owned())).map_err(write_err)?;
                        writer
                            .write_event(Event::Text(BytesText::new(&replacement)))
                            .map_err(write_err)?;
                        writer.write_event(Event::End(BytesEnd::new(tag))).map_err(write_err)?;
                        buf.clear();
                        continue;
                    }
                }

                if name == "field" {
                    if let Some(field_name) =
                        attribute_value(&start, "name").filter(|n| values.get(n).is_some())
                    {
                        // <field name="x"/> gains a value child
                        let replacement = values
                            .get(&field_name)
                            .map(|v| v.to_text())
                            .unwrap_or_default();
                        *counts.entry(field_name).or_insert(0) += 1;

                        let tag = String::from_utf8_lossy(start.name().as_ref()).to_string();
                        writer.write_event(Event::Start(start.to_owned())).map_err(write_err)?;
                        writer
                            .write_event(Event::Start(BytesStart::new("value")))
                            .map_err(write_err)?;
                        writer
                            .write_event(Event::Text(BytesText::new(&replacement)))
                            .map_err(write_err)?;
                        writer
                            .write_event(Event::End(BytesEnd::new("value")))
                            .map_err(write_err)?;
                        writer.write_event(Event::End(BytesEnd::new(tag))).map_err(write_err)?;
                        buf.clear();
                        continue;
                    }
                }

                writer.write_event(Event::Empty(start.to_owned())).map_err(write_err)?;
            }
            Event::End(end) => {
                if let Some(frame) = stack.pop() {
                    if let Some(field_name) = frame.matched_field {
                        if !frame.had_value {
                            // No <value> child existed: insert one
                            let replacement = values
                                .get(&field_name)
                                .map(|v| v.to_text())
                                .unwrap_or_default();
                            *counts.entry(field_name).or_insert(0) += 1;

                            writer
                                .write_event(Event::Start(BytesStart::new("value")))
                                .map_err(write_err)?;
                            writer
                                .write_event(Event::Text(BytesText::new(&replacement)))
                                .map_err(write_err)?;
                            writer
                                .write_event(Event::End(BytesEnd::new("value")))
                                .map_err(write_err)?;
                        }
                    }
                }
                writer.write_event(Event::End(end.to_owned())).map_err(write_err)?;
            }
            Event::Eof => break,
            other => {
                writer.write_event(other.into_owned()).map_err(write_err)?;
            }
        }
        buf.clear();
    }

    Ok((writer.into_inner().into_inner(), counts))
}

/// Consume events up to and including the end tag matching `start`.
fn skip_element(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<()> {
    let mut depth = 1usize;
    let name = start.name().as_ref().to_vec();
    let mut buf = Vec::new();

    while depth > 0 {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::xfa("Parsed", format!("XML error: {}", e)))?
        {
            Event::Start(s) if s.name().as_ref() == name.as_slice() => depth += 1,
            Event::End(e) if e.name().as_ref() == name.as_slice() => depth -= 1,
            Event::Eof => {
                return Err(Error::xfa("Parsed", "element is unterminated"));
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn attribute_value(start: &BytesStart, name: &str) -> Option<String> {
    start.attributes().flatten().find_map(|attr| {
        if attr.key.as_ref() == name.as_bytes() {
            Some(String::from_utf8_lossy(&attr.value).to_string())
        } else {
            None
        }
    })
}

/// Strip a namespace prefix from an element name.
fn local_name(name: &[u8]) -> &str {
    let bare = name
        .iter()
        .rposition(|&c| c == b':')
        .map(|pos| &name[pos + 1..])
        .unwrap_or(name);
    std::str::from_utf8(bare).unwrap_or("")
}

fn write_err<E: std::fmt::Display>(e: E) -> Error {
    Error::xfa("Mutated", format!("XML write failed: {}", e))
}
