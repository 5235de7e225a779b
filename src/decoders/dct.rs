//! DCTDecode: JPEG data stays compressed; only the SOI marker is checked.

use crate::decoders::StreamCodec;
use crate::error::{Error, Result};

/// DCTDecode codec (validated pass-through).
pub struct DctCodec;

impl StreamCodec for DctCodec {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        if input.len() < 2 || input[0] != 0xFF || input[1] != 0xD8 {
            return Err(Error::Decode(
                "DCTDecode: missing JPEG SOI marker".to_string(),
            ));
        }
        Ok(input.to_vec())
    }

    fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(input.to_vec())
    }

    fn name(&self) -> &'static str {
        "DCTDecode"
    }
}
