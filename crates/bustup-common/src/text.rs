//! Pluggable decoding of legacy text fields.

use encoding_rs::{Encoding, SHIFT_JIS};

use crate::{Error, Result};

/// Turns raw text bytes from a file into a Rust string.
pub trait TextDecoder: Send + Sync {
    /// Decode `bytes`, which contain no padding.
    fn decode(&self, bytes: &[u8]) -> Result<String>;

    /// Decode a fixed-size, zero-padded field, stopping at the first NUL.
    fn decode_padded(&self, field: &[u8]) -> Result<String> {
        let end = memchr::memchr(0, field).unwrap_or(field.len());
        self.decode(&field[..end])
    }
}

/// Decoder backed by an `encoding_rs` encoding table.
#[derive(Debug, Clone, Copy)]
pub struct EncodingDecoder {
    encoding: &'static Encoding,
}

impl EncodingDecoder {
    /// Create a decoder for an arbitrary encoding.
    pub const fn new(encoding: &'static Encoding) -> Self {
        Self { encoding }
    }

    /// Code page 932 (Shift-JIS with the Microsoft extensions).
    pub const fn cp932() -> Self {
        Self::new(SHIFT_JIS)
    }
}

impl Default for EncodingDecoder {
    fn default() -> Self {
        Self::cp932()
    }
}

impl TextDecoder for EncodingDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<String> {
        let (text, _, had_errors) = self.encoding.decode(bytes);
        if had_errors {
            return Err(Error::Text {
                encoding: self.encoding.name(),
                bytes: bytes.to_vec(),
            });
        }
        Ok(text.into_owned())
    }
}
