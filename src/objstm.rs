//! Object-stream containers (`/Type /ObjStm`).
//!
//! A container stream starts with `/N` pairs of integers (object number,
//! offset relative to `/First`), followed by the member objects
//! concatenated. Type-2 cross-reference entries point into these.

use crate::error::{Error, Result};
use crate::object::Object;
use crate::parser::parse_object;
use std::collections::HashMap;

/// Parse every member of an object-stream container.
///
/// Takes the container's already decrypted and decoded payload plus the
/// `/N` and `/First` values from its dictionary. Members that fail to
/// parse are skipped with a warning; an unreadable pair table is fatal.
pub fn parse_container(n: i64, first: i64, decoded: &[u8]) -> Result<HashMap<u32, Object>> {
    if !(0..=1_000_000).contains(&n) {
        return Err(Error::InvalidPdf(format!("object stream /N {} out of range", n)));
    }
    if !(0..=10_000_000).contains(&first) {
        return Err(Error::InvalidPdf(format!("object stream /First {} out of range", first)));
    }
    let n = n as usize;
    let first = first as usize;

    if decoded.len() < first {
        return Err(Error::InvalidPdf(format!(
            "object stream data shorter ({}) than /First ({})",
            decoded.len(),
            first
        )));
    }

    let pairs = parse_pair_table(&decoded[..first], n)?;
    let body = &decoded[first..];
    let mut members = HashMap::with_capacity(n);

    for (obj_num, offset) in pairs {
        if offset >= body.len() {
            log::warn!(
                "object {} offset {} beyond container body ({} bytes)",
                obj_num,
                offset,
                body.len()
            );
            continue;
        }
        match parse_object(&body[offset..]) {
            Ok((_, obj)) => {
                members.insert(obj_num, obj);
            }
            Err(e) => {
                log::warn!("object {} in container unparsable at {}: {:?}", obj_num, offset, e);
            }
        }
    }

    Ok(members)
}

/// Parse the `(object number, offset)` pair table that precedes `/First`.
fn parse_pair_table(data: &[u8], count: usize) -> Result<Vec<(u32, usize)>> {
    let mut pairs = Vec::with_capacity(count);
    let mut rest = data;

    for i in 0..count {
        let (r, obj_num) = read_uint(rest).ok_or_else(|| {
            Error::InvalidPdf(format!("object stream pair {} missing object number", i))
        })?;
        let (r, offset) = read_uint(r).ok_or_else(|| {
            Error::InvalidPdf(format!("object stream pair {} missing offset", i))
        })?;
        pairs.push((obj_num as u32, offset as usize));
        rest = r;
    }

    Ok(pairs)
}

fn read_uint(data: &[u8]) -> Option<(&[u8], u64)> {
    let mut i = 0;
    while i < data.len() && crate::lexer::is_pdf_whitespace(data[i]) {
        i += 1;
    }
    let start = i;
    while i < data.len() && data[i].is_ascii_digit() {
        i += 1;
    }
    if i == start {
        return None;
    }
    let value: u64 = std::str::from_utf8(&data[start..i]).ok()?.parse().ok()?;
    Some((&data[i..], value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_container_basic() {
        // Object 10 at offset 0 (integer 42), object 11 at offset 3 (/Test)
        let payload = b"10 0 11 3 42 /Test";
        let members = parse_container(2, 10, payload).unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[&10].as_integer(), Some(42));
        assert_eq!(members[&11].as_name(), Some("Test"));
    }

    #[test]
    fn test_parse_container_dict_member() {
        let payload = b"5 0 << /Kind /Inner >>";
        let members = parse_container(1, 4, payload).unwrap();
        assert!(members[&5].as_dict().is_some());
    }

    #[test]
    fn test_parse_container_bad_offset_skipped() {
        let payload = b"10 0 11 900 42";
        let members = parse_container(2, 11, payload).unwrap();
        assert_eq!(members.len(), 1);
        assert!(members.contains_key(&10));
    }

    #[test]
    fn test_parse_container_invalid_params() {
        assert!(parse_container(-1, 5, b"x").is_err());
        assert!(parse_container(1, 500, b"short").is_err());
    }

    #[test]
    fn test_pair_table_whitespace() {
        let pairs = parse_pair_table(b"  10   0   11  15 ", 2).unwrap();
        assert_eq!(pairs, vec![(10, 0), (11, 15)]);
    }
}
