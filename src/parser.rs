//! PDF object parser.
//!
//! Combines tokens from the lexer into complete objects using recursive
//! descent: primitives, arrays, dictionaries, indirect references and
//! streams. Stream payloads are captured using the dictionary's `/Length`
//! entry, with an `endstream` scan as fallback for files whose length is
//! wrong or indirect.

use crate::lexer::{token, Token};
use crate::object::{Object, ObjectRef};
use nom::IResult;
use std::collections::HashMap;

/// Decode escape sequences in a PDF literal string.
///
/// Handles `\n \r \t \b \f \( \) \\`, octal `\ddd` (1-3 digits), and
/// line continuations (`\` before EOL). Unknown escapes keep the
/// backslash literally.
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] != b'\\' || i + 1 >= raw.len() {
            result.push(raw[i]);
            i += 1;
            continue;
        }
        match raw[i + 1] {
            b'n' => {
                result.push(b'\n');
                i += 2;
            }
            b'r' => {
                result.push(b'\r');
                i += 2;
            }
            b't' => {
                result.push(b'\t');
                i += 2;
            }
            b'b' => {
                result.push(0x08);
                i += 2;
            }
            b'f' => {
                result.push(0x0C);
                i += 2;
            }
            b'(' | b')' | b'\\' => {
                result.push(raw[i + 1]);
                i += 2;
            }
            b'\n' => i += 2,
            b'\r' => {
                i += 2;
                if i < raw.len() && raw[i] == b'\n' {
                    i += 1;
                }
            }
            c if (b'0'..b'8').contains(&c) => {
                let mut value = 0u32;
                let mut len = 0;
                while len < 3 && i + 1 + len < raw.len() && (b'0'..b'8').contains(&raw[i + 1 + len])
                {
                    value = value * 8 + (raw[i + 1 + len] - b'0') as u32;
                    len += 1;
                }
                result.push((value & 0xFF) as u8);
                i += 1 + len;
            }
            _ => {
                result.push(b'\\');
                i += 1;
            }
        }
    }

    result
}

/// Decode a hex string body (whitespace ignored, odd digit padded with 0).
pub fn decode_hex(input: &[u8]) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(input.len() / 2);
    let mut high: Option<u8> = None;

    for &c in input {
        if c.is_ascii_whitespace() {
            continue;
        }
        let nibble = match c {
            b'0'..=b'9' => c - b'0',
            b'A'..=b'F' => c - b'A' + 10,
            b'a'..=b'f' => c - b'a' + 10,
            _ => return Err(format!("invalid hex digit '{}'", c as char)),
        };
        match high.take() {
            None => high = Some(nibble),
            Some(h) => out.push((h << 4) | nibble),
        }
    }
    if let Some(h) = high {
        out.push(h << 4);
    }
    Ok(out)
}

/// Parse one PDF object from input bytes.
///
/// Handles every object type, including the `N G R` indirect-reference
/// lookahead and stream payloads following a dictionary.
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    let (rest, tok) = token(input)?;

    match tok {
        Token::Null => Ok((rest, Object::Null)),
        Token::True => Ok((rest, Object::Boolean(true))),
        Token::False => Ok((rest, Object::Boolean(false))),
        Token::Real(r) => Ok((rest, Object::Real(r))),
        Token::Name(name) => Ok((rest, Object::Name(name))),

        Token::Integer(i) => {
            // Lookahead for "gen R" making this an indirect reference
            if i >= 0 {
                if let Ok((rest2, Token::Integer(gen))) = token(rest) {
                    if (0..=u16::MAX as i64).contains(&gen) {
                        if let Ok((rest3, Token::R)) = token(rest2) {
                            return Ok((
                                rest3,
                                Object::Reference(ObjectRef::new(i as u32, gen as u16)),
                            ));
                        }
                    }
                }
            }
            Ok((rest, Object::Integer(i)))
        }

        Token::LiteralString(bytes) => {
            Ok((rest, Object::String(decode_literal_string_escapes(bytes))))
        }

        Token::HexString(hex) => match decode_hex(hex) {
            Ok(decoded) => Ok((rest, Object::String(decoded))),
            Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Fail,
            ))),
        },

        Token::ArrayStart => parse_array(rest),

        Token::DictStart => {
            let (rest, dict_obj) = parse_dictionary(rest)?;

            // A dictionary followed by `stream` is a stream object
            if let Ok((stream_body, Token::StreamStart)) = token(rest) {
                let dict = match dict_obj {
                    Object::Dictionary(d) => d,
                    _ => unreachable!("parse_dictionary returns Dictionary"),
                };
                let (rest, data) = parse_stream_data(stream_body, &dict)?;
                return Ok((
                    rest,
                    Object::Stream {
                        dict,
                        data: bytes::Bytes::from(data),
                    },
                ));
            }

            Ok((rest, dict_obj))
        }

        _ => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))),
    }
}

/// Parse an indirect object: `N G obj <object> endobj`.
///
/// The trailing `endobj` is consumed when present; missing terminators are
/// tolerated since the payload has already been captured.
pub fn parse_indirect_object(input: &[u8]) -> IResult<&[u8], (ObjectRef, Object)> {
    let (rest, num_tok) = token(input)?;
    let (rest, gen_tok) = token(rest)?;
    let (rest, obj_tok) = token(rest)?;

    let (num, gen) = match (num_tok, gen_tok, obj_tok) {
        (Token::Integer(n), Token::Integer(g), Token::ObjStart)
            if n >= 0 && (0..=u16::MAX as i64).contains(&g) =>
        {
            (n as u32, g as u16)
        }
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )))
        }
    };

    let (rest, obj) = parse_object(rest)?;
    let rest = match token(rest) {
        Ok((r, Token::ObjEnd)) => r,
        _ => rest,
    };

    Ok((rest, (ObjectRef::new(num, gen), obj)))
}

/// Capture stream data after the `stream` keyword.
fn parse_stream_data<'a>(
    input: &'a [u8],
    dict: &HashMap<String, Object>,
) -> IResult<&'a [u8], Vec<u8>> {
    // The keyword must be followed by CRLF or LF; CR alone and nothing at
    // all occur in the wild and are tolerated.
    let input = if let Some(rest) = input.strip_prefix(b"\r\n") {
        rest
    } else if let Some(rest) = input.strip_prefix(b"\n") {
        rest
    } else if let Some(rest) = input.strip_prefix(b"\r") {
        rest
    } else {
        input
    };

    if let Some(length) = dict.get("Length").and_then(|o| o.as_integer()) {
        let length = length as usize;
        if input.len() >= length {
            let data = input[..length].to_vec();
            let rest = &input[length..];
            // Consume the endstream keyword when it follows as expected;
            // otherwise fall through to scanning.
            if let Ok((rest, Token::StreamEnd)) = token(rest) {
                return Ok((rest, data));
            }
        }
        log::warn!("stream /Length {} unusable, scanning for endstream", length);
    }

    // /Length missing, indirect, or wrong: scan for the endstream keyword
    if let Some(pos) = find_keyword(input, b"endstream") {
        let mut end = pos;
        // Strip the EOL that precedes endstream, not stream content
        if end > 0 && input[end - 1] == b'\n' {
            end -= 1;
        }
        if end > 0 && input[end - 1] == b'\r' {
            end -= 1;
        }
        let data = input[..end].to_vec();
        let (rest, _) = token(&input[pos..])?;
        return Ok((rest, data));
    }

    Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Eof)))
}

fn find_keyword(input: &[u8], keyword: &[u8]) -> Option<usize> {
    input.windows(keyword.len()).position(|w| w == keyword)
}

fn parse_array(input: &[u8]) -> IResult<&[u8], Object> {
    let mut items = Vec::new();
    let mut remaining = input;

    loop {
        match token(remaining) {
            Ok((rest, Token::ArrayEnd)) => return Ok((rest, Object::Array(items))),
            Ok(_) => {
                let (rest, obj) = parse_object(remaining)?;
                items.push(obj);
                remaining = rest;
            }
            Err(_) if remaining.is_empty() => {
                // Unterminated array at EOF; keep what was parsed
                return Ok((remaining, Object::Array(items)));
            }
            Err(e) => return Err(e),
        }
    }
}

fn parse_dictionary(input: &[u8]) -> IResult<&[u8], Object> {
    let mut dict = HashMap::new();
    let mut remaining = input;

    loop {
        match token(remaining) {
            Ok((rest, Token::DictEnd)) => return Ok((rest, Object::Dictionary(dict))),
            Ok((rest, Token::Name(key))) => {
                let (rest, value) = parse_object(rest)?;
                dict.insert(key, value);
                remaining = rest;
            }
            Ok(_) => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    remaining,
                    nom::error::ErrorKind::Tag,
                )))
            }
            Err(_) if remaining.is_empty() => {
                return Ok((remaining, Object::Dictionary(dict)));
            }
            Err(e) => return Err(e),
        }
    }
}
