//! PDF object serialization.
//!
//! Writes objects back out in PDF syntax: sorted dictionary keys for
//! deterministic output, literal strings for printable payloads and hex
//! strings otherwise, `#XX` escapes in names, and stream `/Length`
//! fix-ups. The encrypting variant runs strings and stream payloads
//! through the security handler with each object's freshly derived key.

use crate::encryption::EncryptionHandler;
use crate::error::Result;
use crate::object::{Object, ObjectRef};
use std::collections::HashMap;
use std::io::Write;

/// Serializer for PDF objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectSerializer;

impl ObjectSerializer {
    /// Serialize an indirect object definition:
    /// `{id} {gen} obj\n{object}\nendobj\n`.
    pub fn serialize_indirect(&self, obj_ref: ObjectRef, obj: &Object) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        writeln!(buf, "{} {} obj", obj_ref.id, obj_ref.gen)?;
        self.write_object(&mut buf, obj, None, obj_ref)?;
        write!(buf, "\nendobj\n")?;
        Ok(buf)
    }

    /// Serialize an indirect object, encrypting strings and stream data.
    pub fn serialize_indirect_encrypted(
        &self,
        obj_ref: ObjectRef,
        obj: &Object,
        handler: &EncryptionHandler,
    ) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        writeln!(buf, "{} {} obj", obj_ref.id, obj_ref.gen)?;
        self.write_object(&mut buf, obj, Some(handler), obj_ref)?;
        write!(buf, "\nendobj\n")?;
        Ok(buf)
    }

    /// Serialize a bare object (trailer dictionaries and the like).
    pub fn serialize(&self, obj: &Object) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_object(&mut buf, obj, None, ObjectRef::new(0, 0))?;
        Ok(buf)
    }

    fn write_object<W: Write>(
        &self,
        w: &mut W,
        obj: &Object,
        handler: Option<&EncryptionHandler>,
        obj_ref: ObjectRef,
    ) -> Result<()> {
        match obj {
            Object::Null => write!(w, "null")?,
            Object::Boolean(b) => write!(w, "{}", if *b { "true" } else { "false" })?,
            Object::Integer(i) => write!(w, "{}", i)?,
            Object::Real(r) => self.write_real(w, *r)?,
            Object::String(s) => match handler {
                Some(handler) => {
                    let encrypted = handler.encrypt_object_bytes(s, obj_ref.id, obj_ref.gen)?;
                    self.write_string(w, &encrypted)?;
                }
                None => self.write_string(w, s)?,
            },
            Object::Name(n) => self.write_name(w, n)?,
            Object::Array(arr) => {
                write!(w, "[")?;
                for (i, item) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(w, " ")?;
                    }
                    self.write_object(w, item, handler, obj_ref)?;
                }
                write!(w, "]")?;
            }
            Object::Dictionary(dict) => self.write_dictionary(w, dict, handler, obj_ref)?,
            Object::Stream { dict, data } => {
                let payload: Vec<u8> = match handler {
                    Some(handler) => handler.encrypt_object_bytes(data, obj_ref.id, obj_ref.gen)?,
                    None => data.to_vec(),
                };
                let mut dict = dict.clone();
                dict.insert("Length".to_string(), Object::Integer(payload.len() as i64));
                self.write_dictionary(w, &dict, handler, obj_ref)?;
                write!(w, "\nstream\n")?;
                w.write_all(&payload)?;
                write!(w, "\nendstream")?;
            }
            Object::Reference(r) => write!(w, "{} {} R", r.id, r.gen)?,
        }
        Ok(())
    }

    fn write_real<W: Write>(&self, w: &mut W, value: f64) -> Result<()> {
        // Round to the five decimal places the format carries and let the
        // shortest display form do the rest: 2.0 prints as "2", 0.5 as
        // "0.5". NaN and infinity have no PDF syntax; emit 0.
        let rounded = (value * 1e5).round() / 1e5;
        if rounded.is_finite() {
            write!(w, "{}", rounded)?;
        } else {
            w.write_all(b"0")?;
        }
        Ok(())
    }

    /// Literal syntax when every byte has a literal form, hex otherwise.
    fn write_string<W: Write>(&self, w: &mut W, data: &[u8]) -> Result<()> {
        // Bytes needing a backslash escape, paired with their escape
        // letter at the same index.
        const ESCAPED: &[u8] = b"()\\\n\r\t";
        const ESCAPE_AS: &[u8] = b"()\\nrt";

        let has_literal_form =
            |b: u8| (0x20..=0x7E).contains(&b) || ESCAPED.contains(&b);
        if !data.iter().copied().all(has_literal_form) {
            w.write_all(b"<")?;
            for byte in data {
                write!(w, "{:02X}", byte)?;
            }
            w.write_all(b">")?;
            return Ok(());
        }

        w.write_all(b"(")?;
        for &byte in data {
            match ESCAPED.iter().position(|&e| e == byte) {
                Some(idx) => w.write_all(&[b'\\', ESCAPE_AS[idx]])?,
                None => w.write_all(&[byte])?,
            }
        }
        w.write_all(b")")?;
        Ok(())
    }

    fn write_name<W: Write>(&self, w: &mut W, name: &str) -> Result<()> {
        write!(w, "/")?;
        for byte in name.bytes() {
            let plain = byte.is_ascii_graphic()
                && !matches!(byte, b'#' | b'/' | b'%' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}');
            if plain {
                w.write_all(&[byte])?;
            } else {
                write!(w, "#{:02X}", byte)?;
            }
        }
        Ok(())
    }

    fn write_dictionary<W: Write>(
        &self,
        w: &mut W,
        dict: &HashMap<String, Object>,
        handler: Option<&EncryptionHandler>,
        obj_ref: ObjectRef,
    ) -> Result<()> {
        write!(w, "<<")?;
        // Emission order is lexicographic so repeated runs produce
        // identical bytes.
        let ordered: std::collections::BTreeMap<&String, &Object> = dict.iter().collect();
        for (key, value) in ordered {
            write!(w, " ")?;
            self.write_name(w, key)?;
            write!(w, " ")?;
            self.write_object(w, value, handler, obj_ref)?;
        }
        write!(w, " >>")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string(obj: &Object) -> String {
        String::from_utf8(ObjectSerializer.serialize(obj).unwrap()).unwrap()
    }

    #[test]
    fn test_serialize_primitives() {
        assert_eq!(to_string(&Object::Null), "null");
        assert_eq!(to_string(&Object::Boolean(true)), "true");
        assert_eq!(to_string(&Object::Integer(-42)), "-42");
        assert_eq!(to_string(&Object::Real(1.0)), "1");
        assert_eq!(to_string(&Object::Real(0.5)), "0.5");
        assert_eq!(to_string(&Object::Name("Type".into())), "/Type");
    }

    #[test]
    fn test_serialize_real_rounds_to_five_places() {
        assert_eq!(to_string(&Object::Real(3.14159)), "3.14159");
        assert_eq!(to_string(&Object::Real(1.0000004)), "1");
        assert_eq!(to_string(&Object::Real(-0.002)), "-0.002");
        assert_eq!(to_string(&Object::Real(f64::NAN)), "0");
    }

    #[test]
    fn test_serialize_string_forms() {
        assert_eq!(to_string(&Object::String(b"Hello".to_vec())), "(Hello)");
        assert_eq!(to_string(&Object::String(b"a(b)c\\".to_vec())), "(a\\(b\\)c\\\\)");
        assert_eq!(to_string(&Object::String(vec![0x00, 0xFF, 0x80])), "<00FF80>");
    }

    #[test]
    fn test_serialize_name_escapes() {
        assert_eq!(to_string(&Object::Name("A B".into())), "/A#20B");
        assert_eq!(to_string(&Object::Name("A#B".into())), "/A#23B");
    }

    #[test]
    fn test_serialize_array_and_dict() {
        let arr = Object::Array(vec![Object::Integer(1), Object::Name("N".into())]);
        assert_eq!(to_string(&arr), "[1 /N]");

        let mut dict = HashMap::new();
        dict.insert("B".to_string(), Object::Integer(2));
        dict.insert("A".to_string(), Object::Integer(1));
        // Keys come out sorted
        assert_eq!(to_string(&Object::Dictionary(dict)), "<< /A 1 /B 2 >>");
    }

    #[test]
    fn test_serialize_stream_sets_length() {
        let mut dict = HashMap::new();
        dict.insert("Length".to_string(), Object::Integer(999));
        let stream = Object::Stream {
            dict,
            data: bytes::Bytes::from_static(b"payload"),
        };
        let out = to_string(&stream);
        assert!(out.contains("/Length 7"));
        assert!(out.contains("stream\npayload\nendstream"));
    }

    #[test]
    fn test_serialize_indirect() {
        let out = ObjectSerializer
            .serialize_indirect(ObjectRef::new(5, 0), &Object::Integer(9))
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "5 0 obj\n9\nendobj\n");
    }

    #[test]
    fn test_round_trip_through_parser() {
        let mut dict = HashMap::new();
        dict.insert("Kids".to_string(), Object::Array(vec![Object::Reference(ObjectRef::new(3, 0))]));
        dict.insert("Count".to_string(), Object::Integer(1));
        let original = Object::Dictionary(dict);

        let bytes = ObjectSerializer.serialize(&original).unwrap();
        let (_, reparsed) = crate::parser::parse_object(&bytes).unwrap();
        assert_eq!(reparsed, original);
    }
}
