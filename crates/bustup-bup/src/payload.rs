//! Chunk payload decoding.
//!
//! A chunk is a [`ChunkDescriptor`] followed by one of three payload shapes:
//!
//! - raw palettised pixels (size 0, types 2 and 3), optionally behind a run
//!   of filler blocks and optionally followed by an alpha mask
//! - compressed palettised pixels (types 2 and 3)
//! - compressed RGBA pixels, delta-filtered against the previous scanline
//!
//! Every shape is stored with its width rounded up to a multiple of four and
//! decodes to an image two pixels narrower and shorter than that.

use bustup_common::{BinaryReader, ByteRange};
use log::{debug, warn};

use crate::bitmap::{with_alpha, Bitmap, BLACK};
use crate::chunk::{ChunkDescriptor, PixelFormat, DESCRIPTOR_LEN};
use crate::codec::Codec;
use crate::variant::ChannelOrder;
use crate::{Error, FormatVariant, Result};

/// Entries in a chunk palette.
pub const PALETTE_ENTRIES: usize = 256;

/// Size of a chunk palette in bytes.
pub const PALETTE_LEN: usize = PALETTE_ENTRIES * 4;

/// Size of one filler block, not counting its trailing flag word.
pub const FILLER_BLOCK_LEN: usize = 12;

/// Bytes skipped ahead of a compressed payload when filler is flagged.
pub const COMPRESSED_FILLER_SKIP: usize = 16;

/// Stored width of a chunk: `width` rounded up to a multiple of four.
pub const fn adjusted_width(width: u16) -> u32 {
    (width as u32 + 3) & !3
}

/// Bytes per stored scanline of an RGBA chunk.
pub const fn scanline_len(width: u16) -> usize {
    4 * adjusted_width(width) as usize
}

/// Undo the scanline delta filter in place.
///
/// Each byte past the first scanline is stored as the difference from the
/// byte one scanline above it.
pub fn apply_scanline_delta(data: &mut [u8], scanline: usize) {
    if scanline == 0 {
        return;
    }
    for i in scanline..data.len() {
        data[i] = data[i].wrapping_add(data[i - scanline]);
    }
}

/// Apply the scanline delta filter in place; the inverse of
/// [`apply_scanline_delta`].
pub fn encode_scanline_delta(data: &mut [u8], scanline: usize) {
    if scanline == 0 {
        return;
    }
    for i in (scanline..data.len()).rev() {
        data[i] = data[i].wrapping_sub(data[i - scanline]);
    }
}

/// A chunk decoded to pixels, positioned on the canvas.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub x: u32,
    pub y: u32,
    pub bitmap: Bitmap,
    /// Whether the image carries its own alpha and should replace the
    /// destination alpha when composited.
    pub masked: bool,
    pub descriptor: ChunkDescriptor,
}

/// Build a bitmap from a palette, one index byte per pixel and an optional
/// alpha mask.
///
/// `data` holds the palette followed by `width * height` indices and then
/// the mask, if any. Mask bytes override the palette alpha. A buffer too
/// short for the full palette leaves the missing entries opaque black; a
/// buffer too short for the indices pads them with index 0. Returns the
/// bitmap and whether a mask was present.
pub fn decode_indexed(data: &[u8], width: u32, height: u32, order: ChannelOrder) -> (Bitmap, bool) {
    let area = width as usize * height as usize;

    let mut palette = [BLACK; PALETTE_ENTRIES];
    for (entry, bytes) in palette.iter_mut().zip(data.chunks_exact(4)) {
        *entry = order.to_argb([bytes[0], bytes[1], bytes[2], bytes[3]]);
    }

    let indices = data.get(PALETTE_LEN..).unwrap_or(&[]);
    if indices.len() < area {
        warn!(
            "indexed payload short: have {} index bytes for {} pixels",
            indices.len(),
            area
        );
    }
    let (indices, mask) = indices.split_at(indices.len().min(area));

    let mut pixels: Vec<u32> = indices.iter().map(|&i| palette[i as usize]).collect();
    pixels.resize(area, palette[0]);

    let mask = &mask[..mask.len().min(area)];
    for (pixel, &a) in pixels.iter_mut().zip(mask) {
        *pixel = with_alpha(*pixel, a);
    }

    (Bitmap::from_pixels(width, height, pixels), !mask.is_empty())
}

/// Build a bitmap from delta-filtered RGBA bytes.
///
/// The buffer is truncated or zero-padded to `width * height * 4` first.
pub fn decode_rgba(mut data: Vec<u8>, width: u32, height: u32, order: ChannelOrder) -> Bitmap {
    let expected = width as usize * height as usize * 4;
    if data.len() != expected {
        warn!(
            "rgba payload decoded to {} bytes, expected {}",
            data.len(),
            expected
        );
        data.resize(expected, 0);
    }

    apply_scanline_delta(&mut data, width as usize * 4);

    let pixels = data
        .chunks_exact(4)
        .map(|px| order.to_argb([px[0], px[1], px[2], px[3]]))
        .collect();
    Bitmap::from_pixels(width, height, pixels)
}

/// Decodes chunks for one container.
pub struct PayloadDecoder<'c> {
    variant: FormatVariant,
    codec: &'c dyn Codec,
    max_filler_blocks: usize,
    max_codec_retries: u32,
}

impl<'c> PayloadDecoder<'c> {
    /// Create a chunk decoder.
    pub fn new(
        variant: FormatVariant,
        codec: &'c dyn Codec,
        max_filler_blocks: usize,
        max_codec_retries: u32,
    ) -> Self {
        Self {
            variant,
            codec,
            max_filler_blocks,
            max_codec_retries,
        }
    }

    /// Decode the chunk at `offset`.
    ///
    /// `size` is the chunk length from the container table, when the layout
    /// stores one. A raw palettised chunk only has an alpha mask if the mask
    /// fits inside that length.
    ///
    /// Returns `Ok(None)` for an absent chunk: an offset outside the input or
    /// a zero-size chunk of a type that cannot be stored raw. Every byte range
    /// the decoder reads or skips is appended to `spans`, including on
    /// failure. The reader's position is left unchanged.
    pub fn decode_chunk(
        &self,
        reader: &mut BinaryReader<'_>,
        offset: usize,
        size: Option<u32>,
        spans: &mut Vec<ByteRange>,
    ) -> Result<Option<DecodedImage>> {
        if offset >= reader.len() {
            debug!("chunk offset {:#x} is past the end of the input", offset);
            return Ok(None);
        }
        let end = size.map(|size| offset.saturating_add(size as usize));
        reader.with_position(offset, |r| self.decode_at(r, offset, end, spans))
    }

    fn decode_at(
        &self,
        reader: &mut BinaryReader<'_>,
        offset: usize,
        end: Option<usize>,
        spans: &mut Vec<ByteRange>,
    ) -> Result<Option<DecodedImage>> {
        let descriptor = ChunkDescriptor::read(reader)?;
        spans.push(ByteRange::span(offset, offset + DESCRIPTOR_LEN));
        debug!("chunk at {:#x}: {:?}", offset, descriptor);

        if !descriptor.has_payload() {
            debug!(
                "chunk at {:#x} has type {} and no payload, skipping",
                offset, descriptor.chunk_type
            );
            return Ok(None);
        }

        let width = adjusted_width(descriptor.width);
        let height = descriptor.height as u32;
        let area = width as usize * height as usize;
        let order = self.variant.channel_order();

        let (bitmap, masked) = if descriptor.is_compressed() {
            if descriptor.needs_filler_skip() {
                let start = reader.position();
                reader.skip_bits(COMPRESSED_FILLER_SKIP * 8)?;
                spans.push(ByteRange::span(start, reader.position()));
            }

            match descriptor.pixel_format() {
                PixelFormat::Indexed => {
                    let data = self.decompress(reader, offset, &descriptor, PALETTE_LEN + 2 * area, spans)?;
                    decode_indexed(&data, width, height, order)
                }
                PixelFormat::Rgba => {
                    let data = self.decompress(reader, offset, &descriptor, 2 * 4 * area, spans)?;
                    (decode_rgba(data, width, height, order), true)
                }
            }
        } else {
            if descriptor.needs_filler_skip() {
                self.skip_filler_run(reader, spans)?;
            }

            let start = reader.position();
            let needed = PALETTE_LEN + area;
            if reader.remaining() < needed {
                return Err(Error::TruncatedPayload {
                    needed,
                    available: reader.remaining(),
                });
            }
            let mut len = needed;
            let with_mask = start + needed + area;
            if descriptor.may_carry_mask()
                && end.is_some_and(|end| with_mask <= end)
                && with_mask <= reader.len()
            {
                len += area;
            }
            let data = reader.read_bytes(len)?;
            spans.push(ByteRange::span(start, reader.position()));
            decode_indexed(data, width, height, order)
        };

        let bitmap = bitmap.crop(width.saturating_sub(2), height.saturating_sub(2));

        Ok(Some(DecodedImage {
            x: descriptor.x as u32,
            y: descriptor.y as u32,
            bitmap,
            masked,
            descriptor,
        }))
    }

    /// Skip one filler run: 12-byte blocks, each followed by a u32, ending at
    /// the first zero u32. Returns the number of blocks skipped.
    pub fn skip_filler_run(
        &self,
        reader: &mut BinaryReader<'_>,
        spans: &mut Vec<ByteRange>,
    ) -> Result<usize> {
        let start = reader.position();
        for block in 1..=self.max_filler_blocks {
            reader.skip_bits(FILLER_BLOCK_LEN * 8)?;
            let flag = reader.read_u32()?;
            if flag == 0 {
                spans.push(ByteRange::span(start, reader.position()));
                return Ok(block);
            }
        }
        spans.push(ByteRange::span(start, reader.position()));
        Err(Error::UnterminatedFiller {
            position: start,
            blocks: self.max_filler_blocks,
        })
    }

    /// Hand `descriptor.size` bytes to the codec, skipping a filler run and
    /// retrying from there when it rejects them.
    fn decompress(
        &self,
        reader: &mut BinaryReader<'_>,
        offset: usize,
        descriptor: &ChunkDescriptor,
        max_len: usize,
        spans: &mut Vec<ByteRange>,
    ) -> Result<Vec<u8>> {
        let size = descriptor.size as usize;
        let mut attempts = 0;
        loop {
            let start = reader.position();
            let input = reader.read_bytes(size)?;
            attempts += 1;

            match self.codec.decompress(input, max_len) {
                Ok(data) => {
                    spans.push(ByteRange::span(start, reader.position()));
                    debug!("chunk at {:#x} decompressed to {} bytes", offset, data.len());
                    return Ok(data);
                }
                Err(e) if attempts <= self.max_codec_retries => {
                    warn!(
                        "chunk at {:#x}: decompression at {:#x} failed ({}), retrying after filler",
                        offset, start, e
                    );
                    reader.seek(start);
                    self.skip_filler_run(reader, spans)?;
                }
                Err(source) => {
                    return Err(Error::CodecFailure {
                        offset,
                        attempts,
                        source,
                    });
                }
            }
        }
    }
}
