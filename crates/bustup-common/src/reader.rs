//! Bit-addressed cursor over an immutable byte buffer.
//!
//! This module provides [`BinaryReader`], a cursor-like type that reads
//! little-endian integers, fixed-length byte strings and packed structs from
//! a byte slice without copying, and can skip an arbitrary number of bits.

use byteorder::{ByteOrder, LittleEndian};
use zerocopy::FromBytes;

use crate::{Error, Result};

/// A binary reader over a byte slice with a bit-granular position.
///
/// Byte-granular reads require the cursor to sit on a byte boundary; only
/// [`skip_bits`](Self::skip_bits) can leave it between bytes.
///
/// # Example
///
/// ```
/// use bustup_common::BinaryReader;
///
/// let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
/// let mut reader = BinaryReader::new(&data);
///
/// assert_eq!(reader.read_u32().unwrap(), 0x04030201);
/// let peeked = reader.with_position(0, |r| r.read_u16()).unwrap();
/// assert_eq!(peeked, 0x0201);
/// assert_eq!(reader.read_u16().unwrap(), 0x0605);
/// assert!(reader.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    bit_position: usize,
}

impl<'a> BinaryReader<'a> {
    /// Create a new reader from a byte slice.
    #[inline]
    pub const fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_position: 0,
        }
    }

    /// Get the current byte position (rounded down when between bytes).
    #[inline]
    pub const fn position(&self) -> usize {
        self.bit_position / 8
    }

    /// Get the current position in bits.
    #[inline]
    pub const fn bit_position(&self) -> usize {
        self.bit_position
    }

    /// Get the total length of the underlying buffer.
    #[inline]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Get the number of whole bytes remaining to read.
    #[inline]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position())
    }

    /// Check if there are no more bytes to read.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.position() >= self.data.len()
    }

    /// Seek to an absolute byte position.
    ///
    /// Seeking past the end is allowed; the next read fails with
    /// [`Error::OutOfBounds`].
    #[inline]
    pub fn seek(&mut self, position: usize) {
        self.bit_position = position.saturating_mul(8);
    }

    /// Skip an arbitrary number of bits.
    pub fn skip_bits(&mut self, bits: usize) -> Result<()> {
        let target = self.bit_position.saturating_add(bits);
        if target > self.data.len() * 8 {
            return Err(Error::OutOfBounds {
                position: self.position(),
                needed: bits.div_ceil(8),
                available: self.remaining(),
            });
        }
        self.bit_position = target;
        Ok(())
    }

    /// Run `f` with the cursor moved to `position`, then restore the prior
    /// position whatever `f` returned.
    ///
    /// Nested calls each restore their own saved position, so a chunk read
    /// inside a table loop cannot disturb the loop's cursor.
    pub fn with_position<T>(&mut self, position: usize, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = self.bit_position;
        self.seek(position);
        let result = f(self);
        self.bit_position = saved;
        result
    }

    #[inline]
    fn byte_aligned(&self) -> Result<usize> {
        if self.bit_position % 8 != 0 {
            return Err(Error::Misaligned {
                bit_position: self.bit_position,
            });
        }
        Ok(self.bit_position / 8)
    }

    /// Peek at bytes without advancing the position.
    #[inline]
    pub fn peek_bytes(&self, count: usize) -> Result<&'a [u8]> {
        let start = self.byte_aligned()?;
        if self.remaining() < count {
            return Err(Error::OutOfBounds {
                position: start,
                needed: count,
                available: self.remaining(),
            });
        }
        Ok(&self.data[start..start + count])
    }

    /// Read bytes and advance the position.
    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let bytes = self.peek_bytes(count)?;
        self.bit_position += count * 8;
        Ok(bytes)
    }

    /// Read a little-endian u16.
    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_bytes(2).map(LittleEndian::read_u16)
    }

    /// Read a little-endian u32.
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_bytes(4).map(LittleEndian::read_u32)
    }

    /// Read a packed struct using zerocopy.
    #[inline]
    pub fn read_struct<T: FromBytes>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let position = self.position();
        let bytes = self.read_bytes(size)?;
        T::read_from_bytes(bytes).map_err(|_| Error::OutOfBounds {
            position,
            needed: size,
            available: bytes.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_primitives() {
        let data = [
            0x01u8, 0x02, 0x03, 0x04, // u32: 0x04030201
            0xFF, 0xFF, // u16: 0xFFFF
        ];
        let mut reader = BinaryReader::new(&data);

        assert_eq!(reader.read_u32().unwrap(), 0x04030201);
        assert_eq!(reader.read_u16().unwrap(), 0xFFFF);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_read_past_end_is_out_of_bounds() {
        let data = [0x01, 0x02];
        let mut reader = BinaryReader::new(&data);

        match reader.read_u32() {
            Err(Error::OutOfBounds {
                position,
                needed,
                available,
            }) => {
                assert_eq!(position, 0);
                assert_eq!(needed, 4);
                assert_eq!(available, 2);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_skip_bits() {
        let data = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE];
        let mut reader = BinaryReader::new(&data);

        reader.skip_bits(4).unwrap();
        assert_eq!(reader.bit_position(), 4);
        assert!(matches!(reader.read_u16(), Err(Error::Misaligned { .. })));

        reader.skip_bits(4 + 3 * 8).unwrap();
        assert_eq!(reader.position(), 4);
        assert_eq!(reader.read_bytes(1).unwrap(), &[0xEEu8]);
        assert!(reader.skip_bits(1).is_err());
    }

    #[test]
    fn test_with_position_restores_cursor() {
        let data = [0x10, 0x00, 0x20, 0x00, 0x30, 0x00];
        let mut reader = BinaryReader::new(&data);
        reader.seek(2);

        let (outer, inner) = reader.with_position(4, |r| {
            let outer = r.read_u16().unwrap();
            let inner = r.with_position(0, |r| r.read_u16().unwrap());
            assert_eq!(r.position(), 6);
            (outer, inner)
        });

        assert_eq!(outer, 0x30);
        assert_eq!(inner, 0x10);
        assert_eq!(reader.position(), 2);
        assert_eq!(reader.read_u16().unwrap(), 0x20);
    }

    #[test]
    fn test_with_position_restores_on_error() {
        let data = [0x01, 0x02, 0x03];
        let mut reader = BinaryReader::new(&data);
        reader.seek(1);

        let result = reader.with_position(2, |r| r.read_u32());
        assert!(result.is_err());
        assert_eq!(reader.position(), 1);
    }

    #[test]
    fn test_peek_bytes_does_not_advance() {
        let mut reader = BinaryReader::new(b"BUP4rest");
        assert_eq!(reader.peek_bytes(4).unwrap(), b"BUP4");
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.read_bytes(4).unwrap(), b"BUP4");
        assert_eq!(reader.remaining(), 4);
        assert!(reader.peek_bytes(5).is_err());
    }
}
