//! Decoder for layered "bup" character sprite containers.
//!
//! A bup file holds one character pose as a set of base chunks plus a table
//! of facial expressions, each made of a face overlay and up to three mouth
//! overlays. Decoding composites the base chunks onto a canvas, then derives
//! one image per expression and mouth.
//!
//! # Modules
//!
//! - [`header`] - Prologue, skip table, base-chunk and expression tables
//! - [`chunk`] - 32-byte chunk descriptors
//! - [`payload`] - Raw and compressed palettised payloads, delta-filtered RGBA
//! - [`codec`] - The LZSS payload codec
//! - [`compositor`] - Per-variant blit rules
//! - [`repair`] - Flood-fill transparency repair
//! - [`decoder`] - Whole-container decoding with per-chunk reports
//! - [`output`] / [`parts`] - PNG and manifest writers
//!
//! # Example
//!
//! ```no_run
//! use bustup_bup::{BupDecoder, DecodeOptions, OutputMode, RepairPolicy};
//!
//! let data = std::fs::read("chr.bup")?;
//! let options = DecodeOptions {
//!     repair: RepairPolicy::BorderPurity,
//!     ..Default::default()
//! };
//! let container = BupDecoder::new(options).decode(&data)?;
//! OutputMode::Composited.write(&container, "out".as_ref(), "chr")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bitmap;
pub mod chunk;
pub mod codec;
pub mod compositor;
pub mod decoder;
mod error;
pub mod header;
pub mod output;
pub mod parts;
pub mod payload;
pub mod repair;
mod variant;

pub use bitmap::{Bitmap, BLACK, MARKER, SENTINEL};
pub use chunk::{ChunkDescriptor, PixelFormat};
pub use codec::{Codec, CodecError, LzssCodec};
pub use compositor::BlitRule;
pub use decoder::{
    BupDecoder, ChunkOutcome, ChunkReport, ChunkRole, Composite, DecodeOptions, DecodeReport,
    DecodedContainer, Layer,
};
pub use error::{Error, Result};
pub use header::{ChunkRef, ContainerHeader, ExpressionEntry};
pub use output::{write_composited, write_layers, OutputMode};
pub use parts::{Blend, PartsManifest};
pub use payload::DecodedImage;
pub use repair::{RepairPolicy, RepairStats};
pub use variant::{ChannelOrder, FormatVariant};
