//! Bustup - decoder for layered "bup" character sprite containers.
//!
//! This crate provides a unified interface to the bustup library crates.
//!
//! # Crates
//!
//! - [`bustup_common`] - Common utilities (bit cursor, coverage map, text decoding)
//! - [`bustup_bup`] - Container parsing, payload decoding, compositing and output
//!
//! # Example
//!
//! ```no_run
//! use bustup::prelude::*;
//!
//! let data = std::fs::read("chr.bup")?;
//! let container = BupDecoder::default().decode(&data)?;
//!
//! println!("Layout: {}", container.variant());
//! for composite in &container.composites {
//!     composite.bitmap.save_png(format!("chr_{}.png", composite.name))?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export all sub-crates
pub use bustup_bup as bup;
pub use bustup_common as common;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use bustup_bup::{
        Bitmap, BupDecoder, ChunkOutcome, ChunkRole, DecodeOptions, DecodedContainer,
        FormatVariant, OutputMode, RepairPolicy,
    };
    pub use bustup_common::{BinaryReader, CoverageMap, EncodingDecoder, TextDecoder};
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
