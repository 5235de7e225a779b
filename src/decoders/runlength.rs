//! RunLengthDecode: byte-oriented run-length encoding.
//!
//! Length byte 0-127 copies the next n+1 bytes literally, 129-255 repeats
//! the next byte 257-n times, 128 terminates.

use crate::decoders::StreamCodec;
use crate::error::{Error, Result};

/// RunLengthDecode codec.
pub struct RunLengthCodec;

impl StreamCodec for RunLengthCodec {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut i = 0;

        while i < input.len() {
            let length = input[i];
            i += 1;

            match length {
                0..=127 => {
                    let count = length as usize + 1;
                    if i + count > input.len() {
                        return Err(Error::Decode(format!(
                            "RunLengthDecode: literal run needs {} bytes, {} left",
                            count,
                            input.len() - i
                        )));
                    }
                    output.extend_from_slice(&input[i..i + count]);
                    i += count;
                }
                128 => break,
                129..=255 => {
                    let count = 257 - length as usize;
                    let byte = *input.get(i).ok_or_else(|| {
                        Error::Decode("RunLengthDecode: missing byte for run".to_string())
                    })?;
                    i += 1;
                    output.resize(output.len() + count, byte);
                }
            }
        }

        Ok(output)
    }

    fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut i = 0;

        while i < input.len() {
            // Measure the run of identical bytes starting here
            let byte = input[i];
            let mut run = 1;
            while run < 128 && i + run < input.len() && input[i + run] == byte {
                run += 1;
            }

            if run >= 2 {
                output.push((257 - run) as u8);
                output.push(byte);
                i += run;
            } else {
                // Collect a literal stretch up to the next run of >= 3
                let start = i;
                let mut len = 0;
                while len < 128 && i < input.len() {
                    let b = input[i];
                    let mut ahead = 1;
                    while ahead < 3 && i + ahead < input.len() && input[i + ahead] == b {
                        ahead += 1;
                    }
                    if ahead >= 3 {
                        break;
                    }
                    i += 1;
                    len += 1;
                }
                output.push((len - 1) as u8);
                output.extend_from_slice(&input[start..start + len]);
            }
        }

        output.push(128);
        Ok(output)
    }

    fn name(&self) -> &'static str {
        "RunLengthDecode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runlength_decode_literal() {
        let codec = RunLengthCodec;
        assert_eq!(codec.decode(&[4, b'H', b'e', b'l', b'l', b'o']).unwrap(), b"Hello");
    }

    #[test]
    fn test_runlength_decode_run() {
        let codec = RunLengthCodec;
        assert_eq!(codec.decode(&[252, b'A']).unwrap(), b"AAAAA");
    }

    #[test]
    fn test_runlength_decode_eod_stops() {
        let codec = RunLengthCodec;
        assert_eq!(codec.decode(&[1, b'H', b'i', 128, 99, 99]).unwrap(), b"Hi");
    }

    #[test]
    fn test_runlength_decode_overrun() {
        let codec = RunLengthCodec;
        assert!(codec.decode(&[4, b'A', b'B']).is_err());
        assert!(codec.decode(&[252]).is_err());
    }

    #[test]
    fn test_runlength_round_trip() {
        let codec = RunLengthCodec;
        let cases: Vec<Vec<u8>> = vec![
            b"".to_vec(),
            b"a".to_vec(),
            b"abcdef".to_vec(),
            vec![b'X'; 300],
            b"mixed aaaa bbbb c d eeeeeeee".to_vec(),
            (0..=255u8).collect(),
        ];
        for data in cases {
            let encoded = codec.encode(&data).unwrap();
            assert_eq!(codec.decode(&encoded).unwrap(), data);
        }
    }
}
