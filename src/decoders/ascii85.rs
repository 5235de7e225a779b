//! ASCII85Decode: five base-85 digits per 32-bit big-endian word.

use crate::decoders::StreamCodec;
use crate::error::{Error, Result};

/// ASCII85Decode codec.
///
/// Decoding strips an optional `<~` prefix and stops at the `~>`
/// terminator. `z` is shorthand for four zero bytes and is only valid at a
/// tuple boundary. A trailing partial tuple of n digits decodes to n-1
/// bytes after padding with `u`.
pub struct Ascii85Codec;

impl StreamCodec for Ascii85Codec {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let input = input.strip_prefix(b"<~").unwrap_or(input);

        let mut output = Vec::new();
        let mut acc: u32 = 0;
        let mut count = 0usize;

        for &byte in input {
            match byte {
                b'~' => break,
                b'z' if count == 0 => output.extend_from_slice(&[0, 0, 0, 0]),
                b'z' => {
                    return Err(Error::Decode(
                        "ASCII85Decode: 'z' inside a tuple".to_string(),
                    ))
                }
                b'!'..=b'u' => {
                    acc = acc
                        .checked_mul(85)
                        .and_then(|v| v.checked_add((byte - b'!') as u32))
                        .ok_or_else(|| {
                            Error::Decode("ASCII85Decode: tuple overflow".to_string())
                        })?;
                    count += 1;
                    if count == 5 {
                        output.extend_from_slice(&acc.to_be_bytes());
                        acc = 0;
                        count = 0;
                    }
                }
                _ if byte.is_ascii_whitespace() => {}
                _ => {
                    return Err(Error::Decode(format!(
                        "ASCII85Decode: invalid character 0x{:02x}",
                        byte
                    )))
                }
            }
        }

        if count == 1 {
            return Err(Error::Decode(
                "ASCII85Decode: single trailing digit".to_string(),
            ));
        }
        if count > 1 {
            for _ in count..5 {
                acc = acc
                    .checked_mul(85)
                    .and_then(|v| v.checked_add(84))
                    .ok_or_else(|| Error::Decode("ASCII85Decode: tuple overflow".to_string()))?;
            }
            output.extend_from_slice(&acc.to_be_bytes()[..count - 1]);
        }

        Ok(output)
    }

    fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(input.len() * 5 / 4 + 2);

        for chunk in input.chunks(4) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            let mut acc = u32::from_be_bytes(word);

            if acc == 0 && chunk.len() == 4 {
                output.push(b'z');
                continue;
            }

            let mut digits = [0u8; 5];
            for d in digits.iter_mut().rev() {
                *d = (acc % 85) as u8 + b'!';
                acc /= 85;
            }
            output.extend_from_slice(&digits[..chunk.len() + 1]);
        }

        output.extend_from_slice(b"~>");
        Ok(output)
    }

    fn name(&self) -> &'static str {
        "ASCII85Decode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii85_decode_simple() {
        let codec = Ascii85Codec;
        assert_eq!(codec.decode(b"<+U,m").unwrap(), b"Test");
        assert_eq!(codec.decode(b"<+U,m~>").unwrap(), b"Test");
        assert_eq!(codec.decode(b"<~<+U,m~>").unwrap(), b"Test");
    }

    #[test]
    fn test_ascii85_z_expansion() {
        let codec = Ascii85Codec;
        assert_eq!(codec.decode(b"z").unwrap(), vec![0u8; 4]);
        assert_eq!(codec.decode(b"zz").unwrap(), vec![0u8; 8]);
        assert!(codec.decode(b"!z").is_err());
    }

    #[test]
    fn test_ascii85_partial_tuple() {
        let codec = Ascii85Codec;
        // 2 digits decode to 1 byte
        assert_eq!(codec.decode(b"5l").unwrap().len(), 1);
        assert!(codec.decode(b"!").is_err());
    }

    #[test]
    fn test_ascii85_whitespace_skipped() {
        let codec = Ascii85Codec;
        assert_eq!(codec.decode(b"<+U ,m").unwrap(), b"Test");
    }

    #[test]
    fn test_ascii85_round_trip() {
        let codec = Ascii85Codec;
        let data = b"arbitrary payload with zeros \x00\x00\x00\x00 inside".to_vec();
        let encoded = codec.encode(&data).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), data);
    }

    #[test]
    fn test_ascii85_round_trip_partial() {
        let codec = Ascii85Codec;
        for len in 0..9 {
            let data: Vec<u8> = (0..len).map(|i| (i * 37 + 5) as u8).collect();
            let encoded = codec.encode(&data).unwrap();
            assert_eq!(codec.decode(&encoded).unwrap(), data, "length {}", len);
        }
    }
}
