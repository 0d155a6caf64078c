//! Error types for bup decoding.

use thiserror::Error;

use crate::codec::CodecError;

/// Errors that can occur when decoding bup containers.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cursor or text decoding error.
    #[error("{0}")]
    Common(#[from] bustup_common::Error),

    /// The file does not start with the bup signature.
    #[error("malformed header: expected magic 'BUP4', got {actual:?}")]
    MalformedHeader { actual: [u8; 4] },

    /// Neither size field matches the file length, so the variant is unknown.
    #[error("unsupported variant: file is {file_len} bytes, header fields read {field_a:#x} and {field_b:#x}")]
    UnsupportedVariant {
        file_len: usize,
        field_a: u32,
        field_b: u32,
    },

    /// The codec rejected a compressed payload on every attempt.
    #[error("codec failure for chunk at {offset:#x} after {attempts} attempt(s): {source}")]
    CodecFailure {
        offset: usize,
        attempts: u32,
        #[source]
        source: CodecError,
    },

    /// A filler run did not terminate within the configured bound.
    #[error("filler run at {position:#x} not terminated after {blocks} blocks")]
    UnterminatedFiller { position: usize, blocks: usize },

    /// A payload holds fewer bytes than its geometry requires.
    #[error("truncated payload: needed {needed} bytes, have {available}")]
    TruncatedPayload { needed: usize, available: usize },

    /// PNG encoding error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Parts manifest serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error means a read ran past the end of the input.
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(
            self,
            Error::Common(bustup_common::Error::OutOfBounds { .. })
        )
    }
}

/// Result type for bup operations.
pub type Result<T> = std::result::Result<T, Error>;
