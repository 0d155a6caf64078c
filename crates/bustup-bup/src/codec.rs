//! Payload decompression.
//!
//! Compressed chunks use a small LZSS scheme: a flag byte, read least
//! significant bit first, selects for each of the next eight tokens either a
//! literal byte or a two-byte back-reference into the output produced so far.

use thiserror::Error;

use crate::FormatVariant;

/// Errors reported by a [`Codec`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A back-reference points before the start of the output.
    #[error("back-reference at input byte {position} reaches {distance} bytes back with only {produced} produced")]
    BadReference {
        position: usize,
        distance: usize,
        produced: usize,
    },

    /// The input ends in the middle of a back-reference.
    #[error("input truncated inside a back-reference at byte {position}")]
    Truncated { position: usize },

    /// The output would grow past the caller's limit.
    #[error("output exceeds the limit of {max_len} bytes")]
    Overflow { max_len: usize },
}

/// Decompresses a chunk payload.
pub trait Codec: Send + Sync {
    /// Decompress `input`, producing at most `max_len` bytes.
    fn decompress(&self, input: &[u8], max_len: usize) -> Result<Vec<u8>, CodecError>;
}

/// The LZSS codec used by bup containers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LzssCodec {
    /// The extended variant stores the length/distance nibbles swapped.
    pub swap_nibbles: bool,
}

impl LzssCodec {
    /// Codec configured for a format variant.
    pub const fn for_variant(variant: FormatVariant) -> Self {
        Self {
            swap_nibbles: variant.is_extended(),
        }
    }
}

impl Codec for LzssCodec {
    fn decompress(&self, input: &[u8], max_len: usize) -> Result<Vec<u8>, CodecError> {
        let mut output = Vec::with_capacity(max_len.min(input.len().saturating_mul(4)));
        let mut flags: u32 = 1;
        let mut p = 0;

        while p < input.len() {
            if flags == 1 {
                flags = 0x100 | input[p] as u32;
                p += 1;
                if p >= input.len() {
                    break;
                }
            }

            if flags & 1 != 0 {
                if p + 2 > input.len() {
                    return Err(CodecError::Truncated { position: p });
                }
                let mut b1 = input[p];
                let b2 = input[p + 1];
                if self.swap_nibbles {
                    b1 = b1.rotate_left(4);
                }

                let count = (b1 & 0x0F) as usize + 3;
                let distance = ((((b1 & 0xF0) as usize) << 4) | b2 as usize) + 1;
                if distance > output.len() {
                    return Err(CodecError::BadReference {
                        position: p,
                        distance,
                        produced: output.len(),
                    });
                }
                if output.len() + count > max_len {
                    return Err(CodecError::Overflow { max_len });
                }
                p += 2;

                // Source and destination may overlap, so copy byte by byte.
                for _ in 0..count {
                    let byte = output[output.len() - distance];
                    output.push(byte);
                }
            } else {
                if output.len() >= max_len {
                    return Err(CodecError::Overflow { max_len });
                }
                output.push(input[p]);
                p += 1;
            }

            flags >>= 1;
        }

        Ok(output)
    }
}

/// Encode `data` as a literal-only stream the codec accepts.
///
/// Useful for building synthetic containers.
pub fn store_literals(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len().div_ceil(8));
    for block in data.chunks(8) {
        out.push(0);
        out.extend_from_slice(block);
    }
    out
}
