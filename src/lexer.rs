//! Low-level tokenizer for PDF byte streams.
//!
//! Recognizes the atomic units of PDF syntax: numbers, literal and hex
//! strings, names (with `#XX` escapes), keywords and delimiters. Whitespace
//! and `%` comments are skipped between tokens. The object parser combines
//! these tokens into full objects.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while},
    character::complete::{char, digit1, one_of},
    combinator::{map, opt, value},
    sequence::preceded,
    IResult,
};

/// Token types recognized by the tokenizer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number (e.g. 42, -123)
    Integer(i64),
    /// Real number (e.g. 3.14, -.5)
    Real(f64),
    /// Literal string bytes; escape sequences are decoded by the parser
    LiteralString(&'a [u8]),
    /// Hex string bytes between `<` and `>`; pairs decoded by the parser
    HexString(&'a [u8]),
    /// Name with `#XX` escapes already decoded
    Name(String),
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `[`
    ArrayStart,
    /// `]`
    ArrayEnd,
    /// `<<`
    DictStart,
    /// `>>`
    DictEnd,
    /// `obj`
    ObjStart,
    /// `endobj`
    ObjEnd,
    /// `stream`
    StreamStart,
    /// `endstream`
    StreamEnd,
    /// `R` reference marker
    R,
}

/// PDF whitespace: NUL, TAB, LF, FF, CR, SPACE.
#[inline]
pub(crate) fn is_pdf_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

/// PDF delimiter characters.
#[inline]
pub(crate) fn is_pdf_delimiter(c: u8) -> bool {
    matches!(c, b'/' | b'%' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}')
}

fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    value((), preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip whitespace and comments before a token.
fn skip_ws(input: &[u8]) -> IResult<&[u8], ()> {
    let mut remaining = input;
    loop {
        let (rest, ws) = take_while(is_pdf_whitespace)(remaining)?;
        remaining = rest;
        match comment(remaining) {
            Ok((rest, _)) => remaining = rest,
            Err(_) if ws.is_empty() => break,
            Err(_) => continue,
        }
    }
    Ok((remaining, ()))
}

/// Parse an integer or real number.
///
/// Accepts leading `+`/`-` and numbers starting or ending with a decimal
/// point (`.5`, `5.`).
fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, sign) = opt(one_of("+-"))(input)?;
    let (rest, int_part) = opt(digit1)(rest)?;
    let (rest, frac_part) = opt(preceded(char('.'), opt(digit1)))(rest)?;

    if int_part.is_none() && frac_part.is_none() {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit)));
    }

    let negative = sign == Some('-');
    match frac_part {
        None => {
            // int_part is present here by the check above
            let digits: &[u8] = int_part.ok_or_else(|| {
                nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
            })?;
            let text = std::str::from_utf8(digits).map_err(|_| {
                nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
            })?;
            let mut n: i64 = text.parse().map_err(|_| {
                nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
            })?;
            if negative {
                n = -n;
            }
            Ok((rest, Token::Integer(n)))
        }
        Some(frac) => {
            let mut text = String::new();
            if negative {
                text.push('-');
            }
            match int_part {
                Some(d) => text.push_str(std::str::from_utf8(d).unwrap_or("0")),
                None => text.push('0'),
            }
            text.push('.');
            match frac {
                Some(d) => text.push_str(std::str::from_utf8(d).unwrap_or("0")),
                None => text.push('0'),
            }
            let n: f64 = text.parse().map_err(|_| {
                nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Float))
            })?;
            Ok((rest, Token::Real(n)))
        }
    }
}

/// Parse a literal string enclosed in parentheses.
///
/// Tracks balanced nested parentheses and skips over escape sequences so a
/// `\)` does not terminate the string. The raw bytes between the outer
/// parentheses are returned; escape decoding happens in the parser.
fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (body, _) = char('(')(input)?;
    let mut depth = 1usize;
    let mut pos = 0usize;

    while depth > 0 && pos < body.len() {
        match body[pos] {
            b'\\' => {
                // Skip the escaped character; octal escapes are 1-3 digits
                pos += 1;
                if pos < body.len() && body[pos].is_ascii_digit() {
                    let mut digits = 0;
                    while digits < 3 && pos < body.len() && body[pos].is_ascii_digit() {
                        pos += 1;
                        digits += 1;
                    }
                } else {
                    pos += 1;
                }
            }
            b'(' => {
                depth += 1;
                pos += 1;
            }
            b')' => {
                depth -= 1;
                pos += 1;
            }
            _ => pos += 1,
        }
    }

    if depth != 0 {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }

    Ok((&body[pos..], Token::LiteralString(&body[..pos - 1])))
}

/// Parse a hex string enclosed in `<` and `>`.
fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    // A << is a dictionary, not a hex string
    if input.starts_with(b"<<") {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }
    let (rest, _) = char('<')(input)?;
    let (rest, digits) =
        take_while(|c: u8| c.is_ascii_hexdigit() || is_pdf_whitespace(c))(rest)?;
    let (rest, _) = char('>')(rest)?;
    Ok((rest, Token::HexString(digits)))
}

/// Decode `#XX` escape sequences in a PDF name.
///
/// Invalid sequences (`#` at end, non-hex digits) are kept literally.
pub fn decode_name_escapes(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let bytes = name.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'#' {
            if let Some(hex) = name.get(i + 1..i + 3) {
                if let Ok(byte) = u8::from_str_radix(hex, 16) {
                    result.push(byte as char);
                    i += 3;
                    continue;
                }
            }
        }
        // char boundaries: names are ASCII outside escapes, but stay safe
        let ch_len = name[i..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
        result.push_str(&name[i..i + ch_len]);
        i += ch_len;
    }

    result
}

/// Parse a name starting with `/`.
fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    preceded(
        char('/'),
        map(
            take_while(|c: u8| !is_pdf_whitespace(c) && !is_pdf_delimiter(c)),
            |bytes: &[u8]| {
                let raw = std::str::from_utf8(bytes).unwrap_or("");
                Token::Name(decode_name_escapes(raw))
            },
        ),
    )(input)
}

/// Parse keywords and delimiters.
///
/// Multi-character keywords come first; `endstream` before `stream`, `<<`
/// before a hex string, `>>` before `>`.
fn parse_keyword(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        value(Token::False, tag(b"false")),
        value(Token::True, tag(b"true")),
        value(Token::Null, tag(b"null")),
        value(Token::ObjEnd, tag(b"endobj")),
        value(Token::ObjStart, tag(b"obj")),
        value(Token::StreamEnd, tag(b"endstream")),
        value(Token::StreamStart, tag(b"stream")),
        value(Token::DictStart, tag(b"<<")),
        value(Token::DictEnd, tag(b">>")),
        value(Token::ArrayStart, tag(b"[")),
        value(Token::ArrayEnd, tag(b"]")),
        value(Token::R, tag(b"R")),
    ))(input)
}

/// Parse one token, skipping any leading whitespace and comments.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (input, _) = skip_ws(input)?;
    alt((
        parse_keyword,
        parse_name,
        parse_number,
        parse_literal_string,
        parse_hex_string,
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers() {
        assert_eq!(token(b"42"), Ok((&b""[..], Token::Integer(42))));
        assert_eq!(token(b"-123"), Ok((&b""[..], Token::Integer(-123))));
        assert_eq!(token(b"+7"), Ok((&b""[..], Token::Integer(7))));
    }

    #[test]
    fn test_reals() {
        assert_eq!(token(b"-2.5"), Ok((&b""[..], Token::Real(-2.5))));
        assert_eq!(token(b".5"), Ok((&b""[..], Token::Real(0.5))));
        assert_eq!(token(b"5."), Ok((&b""[..], Token::Real(5.0))));
    }

    #[test]
    fn test_literal_string_nested_parens() {
        assert_eq!(
            token(b"(Hello (nested) World)"),
            Ok((&b""[..], Token::LiteralString(b"Hello (nested) World")))
        );
    }

    #[test]
    fn test_literal_string_escaped_paren() {
        assert_eq!(
            token(b"(Open \\( Close \\))"),
            Ok((&b""[..], Token::LiteralString(b"Open \\( Close \\)")))
        );
    }

    #[test]
    fn test_hex_string_vs_dict() {
        assert_eq!(token(b"<<"), Ok((&b""[..], Token::DictStart)));
        assert_eq!(token(b"<48656C6C6F>"), Ok((&b""[..], Token::HexString(b"48656C6C6F"))));
        assert_eq!(token(b"<>"), Ok((&b""[..], Token::HexString(b""))));
    }

    #[test]
    fn test_names() {
        assert_eq!(token(b"/Type"), Ok((&b""[..], Token::Name("Type".to_string()))));
        assert_eq!(token(b"/A#20B"), Ok((&b""[..], Token::Name("A B".to_string()))));
        assert_eq!(token(b"/A#ZZ"), Ok((&b""[..], Token::Name("A#ZZ".to_string()))));
    }

    #[test]
    fn test_keywords() {
        assert_eq!(token(b"true"), Ok((&b""[..], Token::True)));
        assert_eq!(token(b"endstream"), Ok((&b""[..], Token::StreamEnd)));
        assert_eq!(token(b"stream"), Ok((&b""[..], Token::StreamStart)));
        assert_eq!(token(b"R"), Ok((&b""[..], Token::R)));
    }

    #[test]
    fn test_skips_whitespace_and_comments() {
        assert_eq!(token(b"  % note\n  42"), Ok((&b""[..], Token::Integer(42))));
    }

    #[test]
    fn test_decode_name_escapes() {
        assert_eq!(decode_name_escapes("Type"), "Type");
        assert_eq!(decode_name_escapes("A#20B#23C"), "A B#C");
        assert_eq!(decode_name_escapes("A#"), "A#");
        assert_eq!(decode_name_escapes("A#2"), "A#2");
    }

    #[test]
    fn test_token_sequence() {
        let input = b"1 0 obj << /Type /Catalog >> endobj";
        let (rest, t) = token(input).unwrap();
        assert_eq!(t, Token::Integer(1));
        let (rest, t) = token(rest).unwrap();
        assert_eq!(t, Token::Integer(0));
        let (rest, t) = token(rest).unwrap();
        assert_eq!(t, Token::ObjStart);
        let (rest, t) = token(rest).unwrap();
        assert_eq!(t, Token::DictStart);
        let (rest, t) = token(rest).unwrap();
        assert_eq!(t, Token::Name("Type".to_string()));
        let (rest, t) = token(rest).unwrap();
        assert_eq!(t, Token::Name("Catalog".to_string()));
        let (rest, t) = token(rest).unwrap();
        assert_eq!(t, Token::DictEnd);
        let (_, t) = token(rest).unwrap();
        assert_eq!(t, Token::ObjEnd);
    }
}
