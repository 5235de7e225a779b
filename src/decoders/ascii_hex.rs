//! ASCIIHexDecode: pairs of hex digits, whitespace ignored, `>` terminates.

use crate::decoders::StreamCodec;
use crate::error::{Error, Result};

/// ASCIIHexDecode codec.
pub struct AsciiHexCodec;

impl StreamCodec for AsciiHexCodec {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(input.len() / 2);
        let mut high: Option<u8> = None;

        for &c in input {
            if c == b'>' {
                break;
            }
            if c.is_ascii_whitespace() {
                continue;
            }
            let nibble = hex_value(c).ok_or_else(|| {
                Error::Decode(format!("ASCIIHexDecode: invalid hex digit '{}'", c as char))
            })?;
            match high.take() {
                None => high = Some(nibble),
                Some(h) => output.push((h << 4) | nibble),
            }
        }

        // Trailing odd digit is padded with 0
        if let Some(h) = high {
            output.push(h << 4);
        }

        Ok(output)
    }

    fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(input.len() * 2 + 1);
        for byte in input {
            output.extend_from_slice(format!("{:02X}", byte).as_bytes());
        }
        output.push(b'>');
        Ok(output)
    }

    fn name(&self) -> &'static str {
        "ASCIIHexDecode"
    }
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_decode_simple() {
        let codec = AsciiHexCodec;
        assert_eq!(codec.decode(b"48656C6C6F").unwrap(), b"Hello");
        assert_eq!(codec.decode(b"48 65 6c 6C 6F").unwrap(), b"Hello");
        assert_eq!(codec.decode(b"48656C6C6F>garbage").unwrap(), b"Hello");
    }

    #[test]
    fn test_hex_decode_odd_length_pads() {
        let codec = AsciiHexCodec;
        assert_eq!(codec.decode(b"486").unwrap(), vec![0x48, 0x60]);
    }

    #[test]
    fn test_hex_decode_invalid_digit() {
        let codec = AsciiHexCodec;
        assert!(codec.decode(b"4G").is_err());
    }

    #[test]
    fn test_hex_round_trip() {
        let codec = AsciiHexCodec;
        let data: Vec<u8> = (0u16..=255).map(|b| b as u8).collect();
        let encoded = codec.encode(&data).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), data);
    }

    #[test]
    fn test_hex_empty() {
        let codec = AsciiHexCodec;
        assert_eq!(codec.decode(b"").unwrap(), b"");
        assert_eq!(codec.decode(b">").unwrap(), b"");
    }
}
