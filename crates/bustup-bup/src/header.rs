//! Container prologue and table entries.

use bustup_common::{BinaryReader, TextDecoder};
use log::{debug, warn};
use serde::Serialize;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{Error, FormatVariant, Result};

/// Signature at the start of every bup container.
pub const BUP_MAGIC: &[u8; 4] = b"BUP4";

/// Number of mouth slots per expression.
pub const MOUTH_SLOTS: usize = 3;

/// Legacy prologue (28 bytes).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct RawProloguePs3 {
    pub magic: [u8; 4],
    pub size: u32,
    pub expr_width: u16,
    pub expr_height: u16,
    pub width: u16,
    pub height: u16,
    pub skip_count: u32,
    pub base_chunks: u32,
    pub expression_chunks: u32,
}

/// Extended prologue (36 bytes).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct RawPrologueSwitch {
    pub magic: [u8; 4],
    pub version: u32,
    pub size: u32,
    pub expr_width: u16,
    pub expr_height: u16,
    pub width: u16,
    pub height: u16,
    pub skip_count: u32,
    pub base_chunks: u32,
    pub expression_chunks: u32,
    pub trailer: u32,
}

/// Fail with [`Error::MalformedHeader`] unless `data` starts with
/// [`BUP_MAGIC`]. Missing bytes of a short input read as zero.
pub fn check_magic(data: &[u8]) -> Result<()> {
    let mut actual = [0u8; 4];
    let len = data.len().min(actual.len());
    actual[..len].copy_from_slice(&data[..len]);
    if &actual != BUP_MAGIC {
        return Err(Error::MalformedHeader { actual });
    }
    Ok(())
}

/// Global parameters of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerHeader {
    pub variant: FormatVariant,
    /// Variant field A (extended layout only); looks like a format version.
    pub version: Option<u32>,
    /// Overall size as recorded in the file.
    pub size: u32,
    /// Expression canvas size. Informational only.
    pub expr_width: u16,
    pub expr_height: u16,
    /// Canvas size every layer is composited onto.
    pub width: u16,
    pub height: u16,
    /// Number of uninterpreted skip-table entries.
    pub skip_count: u32,
    pub base_chunk_count: u32,
    pub expression_count: u32,
    /// Variant field B (extended layout only).
    pub trailer: Option<u32>,
}

impl ContainerHeader {
    /// Parse the prologue and skip over the skip table.
    ///
    /// On return the cursor sits on the first base-chunk table entry.
    pub fn parse(reader: &mut BinaryReader<'_>, variant: FormatVariant) -> Result<Self> {
        check_magic(reader.peek_bytes(reader.remaining().min(BUP_MAGIC.len()))?)?;

        let header = match variant {
            FormatVariant::Ps3 => {
                let raw: RawProloguePs3 = reader.read_struct()?;
                Self {
                    variant,
                    version: None,
                    size: u32::from_le(raw.size),
                    expr_width: u16::from_le(raw.expr_width),
                    expr_height: u16::from_le(raw.expr_height),
                    width: u16::from_le(raw.width),
                    height: u16::from_le(raw.height),
                    skip_count: u32::from_le(raw.skip_count),
                    base_chunk_count: u32::from_le(raw.base_chunks),
                    expression_count: u32::from_le(raw.expression_chunks),
                    trailer: None,
                }
            }
            FormatVariant::Switch => {
                let raw: RawPrologueSwitch = reader.read_struct()?;
                Self {
                    variant,
                    version: Some(u32::from_le(raw.version)),
                    size: u32::from_le(raw.size),
                    expr_width: u16::from_le(raw.expr_width),
                    expr_height: u16::from_le(raw.expr_height),
                    width: u16::from_le(raw.width),
                    height: u16::from_le(raw.height),
                    skip_count: u32::from_le(raw.skip_count),
                    base_chunk_count: u32::from_le(raw.base_chunks),
                    expression_count: u32::from_le(raw.expression_chunks),
                    trailer: Some(u32::from_le(raw.trailer)),
                }
            }
        };

        debug!("{:?}", header);

        // Never interpreted, only stepped over to stay aligned.
        let skip_bits = (header.skip_count as usize)
            .saturating_mul(variant.skip_entry_len())
            .saturating_mul(8);
        reader.skip_bits(skip_bits)?;

        Ok(header)
    }

    /// Size of the prologue in bytes for a variant.
    pub const fn prologue_len(variant: FormatVariant) -> usize {
        match variant {
            FormatVariant::Ps3 => std::mem::size_of::<RawProloguePs3>(),
            FormatVariant::Switch => std::mem::size_of::<RawPrologueSwitch>(),
        }
    }
}

/// Reference to a chunk: its offset, plus its size in the extended layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChunkRef {
    pub offset: u32,
    pub size: Option<u32>,
}

impl ChunkRef {
    /// Read one table entry.
    pub fn read(reader: &mut BinaryReader<'_>, variant: FormatVariant) -> Result<Self> {
        let offset = reader.read_u32()?;
        let size = if variant.is_extended() {
            Some(reader.read_u32()?)
        } else {
            None
        };
        Ok(Self { offset, size })
    }

    /// A zero offset means the slot is unused.
    pub fn is_present(&self) -> bool {
        self.offset != 0
    }
}

/// One record of the expression table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpressionEntry {
    pub index: usize,
    pub name: String,
    pub face: ChunkRef,
    /// Words between the face and mouth references. Three unknown values in
    /// the legacy layout; six words of expected zero padding in the extended one.
    pub unknown: Vec<u32>,
    pub mouths: [ChunkRef; MOUTH_SLOTS],
}

impl ExpressionEntry {
    /// Read one expression record.
    pub fn read(
        reader: &mut BinaryReader<'_>,
        variant: FormatVariant,
        index: usize,
        text: &dyn TextDecoder,
    ) -> Result<Self> {
        let name_field = reader.read_bytes(variant.name_len())?;
        let face = ChunkRef::read(reader, variant)?;

        let unknown_words = if variant.is_extended() { 6 } else { 3 };
        let mut unknown = Vec::with_capacity(unknown_words);
        for _ in 0..unknown_words {
            unknown.push(reader.read_u32()?);
        }

        let mut mouths = [ChunkRef::default(); MOUTH_SLOTS];
        for mouth in &mut mouths {
            *mouth = ChunkRef::read(reader, variant)?;
        }

        let name = match text.decode_padded(name_field) {
            Ok(name) if !name.is_empty() => name,
            Ok(_) => format!("expression{}", index),
            Err(e) => {
                warn!("expression {}: {}", index, e);
                format!("expression{}", index)
            }
        };

        let entry = Self {
            index,
            name,
            face,
            unknown,
            mouths,
        };

        if variant.is_extended() && !entry.padding_is_zero() {
            warn!(
                "expression {}, {}, had unexpected nonzero values in its padding: {:?}",
                index, entry.name, entry.unknown
            );
        }

        Ok(entry)
    }

    /// Whether the padding words are all zero.
    pub fn padding_is_zero(&self) -> bool {
        self.unknown.iter().all(|&w| w == 0)
    }

    /// Indices and references of the mouth slots that are in use.
    pub fn present_mouths(&self) -> impl Iterator<Item = (usize, ChunkRef)> + '_ {
        self.mouths
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, m)| m.is_present())
    }
}
