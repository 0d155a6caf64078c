//! Chunk descriptors.

use bustup_common::BinaryReader;
use serde::Serialize;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::Result;

/// Size of the descriptor preceding every chunk payload.
pub const DESCRIPTOR_LEN: usize = 32;

/// Raw on-disk chunk descriptor.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct RawChunkDescriptor {
    pub chunk_type: u16,
    pub unk0: u16,
    pub unk1a: u16,
    pub unk1b: u16,
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub size: u32,
    pub unk3a: u16,
    pub unk3b: u16,
    pub unk4a: u16,
    pub unk4b: u16,
    pub unk5a: u16,
    pub unk5b: u16,
}

const _: () = assert!(std::mem::size_of::<RawChunkDescriptor>() == DESCRIPTOR_LEN);

/// How a chunk's pixels are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 256-entry palette plus one index byte per pixel, with an optional
    /// per-pixel alpha mask.
    Indexed,
    /// Four bytes per pixel, delta-filtered against the previous scanline.
    Rgba,
}

/// Decoded chunk descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkDescriptor {
    pub chunk_type: u16,
    pub unk0: u16,
    pub unk1: [u16; 2],
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    /// Compressed payload size; zero means the payload is stored raw.
    pub size: u32,
    pub unk3: [u16; 2],
    pub unk4: [u16; 2],
    pub unk5: [u16; 2],
}

impl ChunkDescriptor {
    /// Read a descriptor, leaving the cursor on the first payload byte.
    pub fn read(reader: &mut BinaryReader<'_>) -> Result<Self> {
        let raw: RawChunkDescriptor = reader.read_struct()?;
        Ok(Self::from(raw))
    }

    /// Types 2 and 3 carry palettised pixels; every other type is RGBA.
    pub fn pixel_format(&self) -> PixelFormat {
        match self.chunk_type {
            2 | 3 => PixelFormat::Indexed,
            _ => PixelFormat::Rgba,
        }
    }

    /// Whether the payload is compressed.
    pub fn is_compressed(&self) -> bool {
        self.size != 0
    }

    /// Whether filler blocks precede the payload.
    pub fn needs_filler_skip(&self) -> bool {
        let trailer_set = self.unk5 != [0, 0];
        match self.chunk_type {
            0 | 2 => self.unk0 > 0 || trailer_set,
            1 | 3 => self.unk0 > 0 && trailer_set,
            _ => false,
        }
    }

    /// Whether a raw payload can be decoded at all.
    ///
    /// Only palettised chunks are ever stored uncompressed; any other type
    /// with a zero size is treated as an absent chunk.
    pub fn has_payload(&self) -> bool {
        self.is_compressed() || self.pixel_format() == PixelFormat::Indexed
    }

    /// Whether a raw type-2 payload may be followed by an alpha mask.
    pub fn may_carry_mask(&self) -> bool {
        self.chunk_type == 2
    }
}

impl From<RawChunkDescriptor> for ChunkDescriptor {
    fn from(raw: RawChunkDescriptor) -> Self {
        Self {
            chunk_type: u16::from_le(raw.chunk_type),
            unk0: u16::from_le(raw.unk0),
            unk1: [u16::from_le(raw.unk1a), u16::from_le(raw.unk1b)],
            x: u16::from_le(raw.x),
            y: u16::from_le(raw.y),
            width: u16::from_le(raw.width),
            height: u16::from_le(raw.height),
            size: u32::from_le(raw.size),
            unk3: [u16::from_le(raw.unk3a), u16::from_le(raw.unk3b)],
            unk4: [u16::from_le(raw.unk4a), u16::from_le(raw.unk4b)],
            unk5: [u16::from_le(raw.unk5a), u16::from_le(raw.unk5b)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(chunk_type: u16, unk0: u16, unk5: [u16; 2]) -> ChunkDescriptor {
        ChunkDescriptor {
            chunk_type,
            unk0,
            unk1: [0, 0],
            x: 0,
            y: 0,
            width: 4,
            height: 4,
            size: 0,
            unk3: [0, 0],
            unk4: [0, 0],
            unk5,
        }
    }

    #[test]
    fn test_read_descriptor() {
        let mut data = Vec::new();
        for word in [2u16, 1, 0xA, 0xB, 10, 20, 30, 40] {
            data.extend_from_slice(&word.to_le_bytes());
        }
        data.extend_from_slice(&0x1234u32.to_le_bytes());
        for word in [1u16, 2, 3, 4, 5, 6] {
            data.extend_from_slice(&word.to_le_bytes());
        }
        data.push(0x99);
        assert_eq!(data.len(), DESCRIPTOR_LEN + 1);

        let mut reader = BinaryReader::new(&data);
        let desc = ChunkDescriptor::read(&mut reader).unwrap();

        assert_eq!(reader.position(), DESCRIPTOR_LEN);
        assert_eq!(desc.chunk_type, 2);
        assert_eq!(desc.unk1, [0xA, 0xB]);
        assert_eq!((desc.x, desc.y, desc.width, desc.height), (10, 20, 30, 40));
        assert_eq!(desc.size, 0x1234);
        assert_eq!(desc.unk3, [1, 2]);
        assert_eq!(desc.unk5, [5, 6]);
        assert!(desc.is_compressed());
        assert_eq!(desc.pixel_format(), PixelFormat::Indexed);
    }

    #[test]
    fn test_filler_condition() {
        assert!(!descriptor(0, 0, [0, 0]).needs_filler_skip());
        assert!(descriptor(0, 1, [0, 0]).needs_filler_skip());
        assert!(descriptor(2, 0, [0, 7]).needs_filler_skip());

        assert!(!descriptor(1, 1, [0, 0]).needs_filler_skip());
        assert!(!descriptor(3, 0, [1, 0]).needs_filler_skip());
        assert!(descriptor(3, 1, [1, 0]).needs_filler_skip());

        assert!(!descriptor(4, 1, [1, 1]).needs_filler_skip());
    }

    #[test]
    fn test_raw_payload_only_for_indexed() {
        assert!(descriptor(2, 0, [0, 0]).has_payload());
        assert!(descriptor(3, 0, [0, 0]).has_payload());
        assert!(!descriptor(0, 0, [0, 0]).has_payload());
        assert!(!descriptor(1, 0, [0, 0]).has_payload());
        assert!(descriptor(2, 0, [0, 0]).may_carry_mask());
        assert!(!descriptor(3, 0, [0, 0]).may_carry_mask());
    }
}
