//! On-disk format variants.
//!
//! Two revisions of the container exist. The older one (first seen on PS3)
//! has a 28-byte prologue and bare offsets in its tables; the newer one
//! (Switch) adds a version word, per-entry sizes and extra padding, and keys
//! overlay transparency on pure black.

use std::fmt;
use std::str::FromStr;

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use serde::Serialize;

use crate::{Error, Result};

/// Which on-disk layout a container uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatVariant {
    /// 28-byte prologue, 4-byte skip entries, offsets without sizes.
    Ps3,
    /// 36-byte prologue with version/trailer words, 12-byte skip entries,
    /// offsets paired with sizes.
    Switch,
}

impl FormatVariant {
    /// Guess the variant from the size fields of the prologue.
    ///
    /// The extended layout stores the file length at byte 8 (after the
    /// version word); the legacy layout stores it at byte 4.
    pub fn detect(data: &[u8]) -> Result<Self> {
        if data.len() < 12 {
            return Err(bustup_common::Error::OutOfBounds {
                position: 0,
                needed: 12,
                available: data.len(),
            }
            .into());
        }

        let field_a = LittleEndian::read_u32(&data[4..8]);
        let field_b = LittleEndian::read_u32(&data[8..12]);
        let len = data.len() as u64;

        if u64::from(field_b) == len {
            debug!("detected switch layout, version {}", field_a);
            Ok(Self::Switch)
        } else if u64::from(field_a) == len {
            debug!("detected ps3 layout");
            Ok(Self::Ps3)
        } else {
            Err(Error::UnsupportedVariant {
                file_len: data.len(),
                field_a,
                field_b,
            })
        }
    }

    /// Whether the layout carries the extra version/trailer words and sizes.
    pub const fn is_extended(self) -> bool {
        matches!(self, Self::Switch)
    }

    /// Size in bytes of each uninterpreted skip-table entry.
    pub const fn skip_entry_len(self) -> usize {
        match self {
            Self::Ps3 => 4,
            Self::Switch => 12,
        }
    }

    /// Padding between the base-chunk table and the expression table.
    pub const fn expression_table_padding(self) -> usize {
        match self {
            Self::Ps3 => 0,
            Self::Switch => 12,
        }
    }

    /// Length of the zero-padded expression name field.
    pub const fn name_len(self) -> usize {
        match self {
            Self::Ps3 => 16,
            Self::Switch => 20,
        }
    }

    /// Byte order of the four channels of a stored pixel.
    pub const fn channel_order(self) -> ChannelOrder {
        match self {
            Self::Ps3 => ChannelOrder::Bgra,
            Self::Switch => ChannelOrder::Rgba,
        }
    }
}

impl fmt::Display for FormatVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ps3 => f.write_str("ps3"),
            Self::Switch => f.write_str("switch"),
        }
    }
}

impl FromStr for FormatVariant {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ps3" | "legacy" => Ok(Self::Ps3),
            "switch" | "extended" => Ok(Self::Switch),
            other => Err(format!("unknown format variant '{}'", other)),
        }
    }
}

/// Order of the colour channels in stored pixels and palette entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    /// Blue, green, red, alpha.
    Bgra,
    /// Red, green, blue, alpha.
    Rgba,
}

impl ChannelOrder {
    /// Convert four stored bytes into an ARGB32 value.
    #[inline]
    pub const fn to_argb(self, px: [u8; 4]) -> u32 {
        let (r, g, b, a) = match self {
            Self::Bgra => (px[2], px[1], px[0], px[3]),
            Self::Rgba => (px[0], px[1], px[2], px[3]),
        };
        (a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32
    }

    /// Convert an ARGB32 value into four stored bytes.
    #[inline]
    pub const fn from_argb(self, argb: u32) -> [u8; 4] {
        let [b, g, r, a] = argb.to_le_bytes();
        match self {
            Self::Bgra => [b, g, r, a],
            Self::Rgba => [r, g, b, a],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prologue(field_a: u32, field_b: u32, len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        data[..4].copy_from_slice(b"BUP4");
        data[4..8].copy_from_slice(&field_a.to_le_bytes());
        data[8..12].copy_from_slice(&field_b.to_le_bytes());
        data
    }

    #[test]
    fn test_detect_switch() {
        let data = prologue(3, 64, 64);
        assert_eq!(FormatVariant::detect(&data).unwrap(), FormatVariant::Switch);
    }

    #[test]
    fn test_detect_ps3() {
        let data = prologue(64, 0x0010_0020, 64);
        assert_eq!(FormatVariant::detect(&data).unwrap(), FormatVariant::Ps3);
    }

    #[test]
    fn test_detect_unknown() {
        let data = prologue(1, 2, 64);
        assert!(matches!(
            FormatVariant::detect(&data),
            Err(Error::UnsupportedVariant { file_len: 64, .. })
        ));
        assert!(FormatVariant::detect(b"BUP4").is_err());
    }

    #[test]
    fn test_channel_order() {
        assert_eq!(ChannelOrder::Bgra.to_argb([0x10, 0x20, 0x30, 0xFF]), 0xFF302010);
        assert_eq!(ChannelOrder::Rgba.to_argb([0x10, 0x20, 0x30, 0xFF]), 0xFF102030);
        assert_eq!(ChannelOrder::Rgba.from_argb(0x80FF0000), [0xFF, 0, 0, 0x80]);
        assert_eq!(ChannelOrder::Bgra.from_argb(0x80FF0000), [0, 0, 0xFF, 0x80]);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("PS3".parse::<FormatVariant>().unwrap(), FormatVariant::Ps3);
        assert_eq!("switch".parse::<FormatVariant>().unwrap(), FormatVariant::Switch);
        assert!("xbox".parse::<FormatVariant>().is_err());
    }
}
