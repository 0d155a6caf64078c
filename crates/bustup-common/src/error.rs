//! Error types for bustup-common.

use thiserror::Error;

/// Common error type for cursor and decoding helpers.
#[derive(Debug, Error)]
pub enum Error {
    /// A read or seek went past the end of the buffer.
    #[error("out of bounds at byte {position}: needed {needed} bytes but only {available} available")]
    OutOfBounds {
        position: usize,
        needed: usize,
        available: usize,
    },

    /// A byte-granular read was attempted while the cursor sat between bytes.
    #[error("cursor is not byte aligned (bit position {bit_position})")]
    Misaligned { bit_position: usize },

    /// A text field could not be decoded with the configured encoding.
    #[error("could not decode {encoding} text: {bytes:02x?}")]
    Text {
        encoding: &'static str,
        bytes: Vec<u8>,
    },
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
