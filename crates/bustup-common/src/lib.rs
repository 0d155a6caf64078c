//! Common utilities for bustup.
//!
//! This crate provides the foundational pieces shared by the format crates:
//!
//! - [`BinaryReader`] - Bit-addressed cursor with scoped seeks
//! - [`CoverageMap`] - Per-byte coverage bitmap for spotting unparsed regions
//! - [`TextDecoder`] - Pluggable decoding of legacy (CP932) text fields

mod coverage;
mod error;
mod reader;
mod text;

pub use coverage::{ByteRange, CoverageMap};
pub use error::{Error, Result};
pub use reader::BinaryReader;
pub use text::{EncodingDecoder, TextDecoder};

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};
