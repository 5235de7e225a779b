//! PNG predictor reversal for FlateDecode streams.
//!
//! Cross-reference streams in particular are commonly written with
//! `/DecodeParms << /Predictor 12 /Columns n >>`. Only PNG predictors
//! (10-15) are handled; TIFF predictor 2 is not seen on xref streams.

use crate::error::{Error, Result};

/// Decode parameters from a `/DecodeParms` dictionary.
#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 10-15 = PNG)
    pub predictor: i64,
    /// Samples per row
    pub columns: usize,
    /// Color components per sample
    pub colors: usize,
    /// Bits per component
    pub bits_per_component: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
        }
    }
}

/// Reverse PNG row predictors in place over the decompressed data.
pub fn apply_png_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let bytes_per_pixel = (params.colors * params.bits_per_component).div_ceil(8).max(1);
    let row_len = (params.columns * params.colors * params.bits_per_component).div_ceil(8);
    let stride = row_len + 1; // leading filter-type byte per row

    if row_len == 0 || !data.len().is_multiple_of(stride) {
        return Err(Error::Decode(format!(
            "predictor: data length {} does not fit rows of {}",
            data.len(),
            stride
        )));
    }

    let mut output = Vec::with_capacity(data.len() / stride * row_len);
    let mut previous = vec![0u8; row_len];

    for row in data.chunks_exact(stride) {
        let filter = row[0];
        let mut current = row[1..].to_vec();

        match filter {
            0 => {}
            1 => {
                for i in bytes_per_pixel..row_len {
                    current[i] = current[i].wrapping_add(current[i - bytes_per_pixel]);
                }
            }
            2 => {
                for i in 0..row_len {
                    current[i] = current[i].wrapping_add(previous[i]);
                }
            }
            3 => {
                for i in 0..row_len {
                    let left = if i >= bytes_per_pixel {
                        current[i - bytes_per_pixel] as u16
                    } else {
                        0
                    };
                    let up = previous[i] as u16;
                    current[i] = current[i].wrapping_add(((left + up) / 2) as u8);
                }
            }
            4 => {
                for i in 0..row_len {
                    let left = if i >= bytes_per_pixel {
                        current[i - bytes_per_pixel] as i16
                    } else {
                        0
                    };
                    let up = previous[i] as i16;
                    let up_left = if i >= bytes_per_pixel {
                        previous[i - bytes_per_pixel] as i16
                    } else {
                        0
                    };
                    current[i] = current[i].wrapping_add(paeth(left, up, up_left));
                }
            }
            other => {
                return Err(Error::Decode(format!(
                    "predictor: unknown PNG filter type {}",
                    other
                )))
            }
        }

        output.extend_from_slice(&current);
        previous = current;
    }

    Ok(output)
}

fn paeth(a: i16, b: i16, c: i16) -> u8 {
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();
    if pa <= pb && pa <= pc {
        a as u8
    } else if pb <= pc {
        b as u8
    } else {
        c as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predictor_none_rows() {
        let params = DecodeParams {
            predictor: 12,
            columns: 4,
            colors: 1,
            bits_per_component: 8,
        };
        // Two rows, filter type 0 (None)
        let data = [0, 1, 2, 3, 4, 0, 5, 6, 7, 8];
        let out = apply_png_predictor(&data, &params).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_predictor_up_rows() {
        let params = DecodeParams {
            predictor: 12,
            columns: 3,
            colors: 1,
            bits_per_component: 8,
        };
        // Row 1: [1 2 3]; row 2 stored as deltas against row 1
        let data = [0, 1, 2, 3, 2, 1, 1, 1];
        let out = apply_png_predictor(&data, &params).unwrap();
        assert_eq!(out, vec![1, 2, 3, 2, 3, 4]);
    }

    #[test]
    fn test_predictor_sub_row() {
        let params = DecodeParams {
            predictor: 11,
            columns: 4,
            colors: 1,
            bits_per_component: 8,
        };
        let data = [1, 10, 1, 1, 1];
        let out = apply_png_predictor(&data, &params).unwrap();
        assert_eq!(out, vec![10, 11, 12, 13]);
    }

    #[test]
    fn test_predictor_bad_length() {
        let params = DecodeParams {
            predictor: 12,
            columns: 4,
            colors: 1,
            bits_per_component: 8,
        };
        assert!(apply_png_predictor(&[0, 1, 2], &params).is_err());
    }
}
