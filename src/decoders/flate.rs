//! FlateDecode (zlib/deflate), the dominant PDF compression filter.

use crate::decoders::StreamCodec;
use crate::error::{Error, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// FlateDecode codec.
///
/// Decoding tries the zlib container first and falls back to raw deflate;
/// a fair number of producers omit the zlib wrapper. Encoding always emits
/// the zlib container.
pub struct FlateCodec;

impl StreamCodec for FlateCodec {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        match ZlibDecoder::new(input).read_to_end(&mut output) {
            Ok(_) => Ok(output),
            Err(zlib_err) => {
                output.clear();
                match DeflateDecoder::new(input).read_to_end(&mut output) {
                    Ok(_) => {
                        log::debug!("zlib wrapper missing, raw deflate succeeded");
                        Ok(output)
                    }
                    Err(deflate_err) => Err(Error::Decode(format!(
                        "FlateDecode failed (zlib: {}, raw deflate: {})",
                        zlib_err, deflate_err
                    ))),
                }
            }
        }
    }

    fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(input)?;
        Ok(encoder.finish()?)
    }

    fn name(&self) -> &'static str {
        "FlateDecode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flate_round_trip() {
        let codec = FlateCodec;
        let original = b"Hello, FlateDecode! ".repeat(50);
        let compressed = codec.encode(&original).unwrap();
        assert!(compressed.len() < original.len());
        assert_eq!(codec.decode(&compressed).unwrap(), original);
    }

    #[test]
    fn test_flate_raw_deflate_fallback() {
        use flate2::write::DeflateEncoder;

        let original = b"raw deflate without zlib wrapper";
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(original).unwrap();
        let compressed = encoder.finish().unwrap();

        let codec = FlateCodec;
        assert_eq!(codec.decode(&compressed).unwrap(), original);
    }

    #[test]
    fn test_flate_empty() {
        let codec = FlateCodec;
        let compressed = codec.encode(b"").unwrap();
        assert_eq!(codec.decode(&compressed).unwrap(), b"");
    }

    #[test]
    fn test_flate_invalid_data() {
        let codec = FlateCodec;
        assert!(codec.decode(b"\xff\xfe definitely not deflate \x00\x01").is_err());
    }
}
