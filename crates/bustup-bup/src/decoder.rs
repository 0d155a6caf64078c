//! Whole-container decoding.

use std::fmt;

use bustup_common::{BinaryReader, ByteRange, CoverageMap, EncodingDecoder, TextDecoder};
use log::{debug, info, warn};
use serde::Serialize;

use crate::bitmap::{Bitmap, SENTINEL};
use crate::codec::{Codec, LzssCodec};
use crate::compositor::BlitRule;
use crate::header::{check_magic, ChunkRef, ContainerHeader, ExpressionEntry};
use crate::payload::{DecodedImage, PayloadDecoder};
use crate::repair::{RepairPolicy, RepairStats};
use crate::{FormatVariant, Result};

/// Default bound on the blocks of one filler run.
pub const DEFAULT_MAX_FILLER_BLOCKS: usize = 4096;

/// Default number of filler-skip retries after a codec failure.
pub const DEFAULT_MAX_CODEC_RETRIES: u32 = 1;

/// Decoder configuration.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Force a layout instead of detecting it from the size fields.
    pub variant: Option<FormatVariant>,
    /// Repair pass applied to every expression composite.
    pub repair: RepairPolicy,
    pub max_filler_blocks: usize,
    pub max_codec_retries: u32,
    /// Record which input bytes the decoder consumed.
    pub track_coverage: bool,
    /// Keep every decoded chunk in [`DecodedContainer::layers`].
    pub keep_layers: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            variant: None,
            repair: RepairPolicy::None,
            max_filler_blocks: DEFAULT_MAX_FILLER_BLOCKS,
            max_codec_retries: DEFAULT_MAX_CODEC_RETRIES,
            track_coverage: false,
            keep_layers: false,
        }
    }
}

/// Where a chunk sits in the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkRole {
    Base { index: usize },
    Face { expression: usize },
    Mouth { expression: usize, slot: usize },
}

impl fmt::Display for ChunkRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base { index } => write!(f, "base chunk {}", index),
            Self::Face { expression } => write!(f, "face of expression {}", expression),
            Self::Mouth { expression, slot } => {
                write!(f, "mouth {} of expression {}", slot, expression)
            }
        }
    }
}

/// What happened to one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChunkOutcome {
    /// Decoded and composited.
    Drawn,
    /// No payload at that offset.
    Absent,
    /// Decoding failed; the chunk was skipped.
    Failed { message: String },
}

/// Outcome of one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkReport {
    pub role: ChunkRole,
    pub offset: u32,
    #[serde(flatten)]
    pub outcome: ChunkOutcome,
}

/// Per-chunk outcomes of one container, in decode order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DecodeReport {
    pub chunks: Vec<ChunkReport>,
}

impl DecodeReport {
    /// Chunks that failed to decode.
    pub fn failures(&self) -> impl Iterator<Item = &ChunkReport> {
        self.chunks
            .iter()
            .filter(|c| matches!(c.outcome, ChunkOutcome::Failed { .. }))
    }

    /// Number of chunks that were drawn.
    pub fn drawn(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.outcome == ChunkOutcome::Drawn)
            .count()
    }

    /// Report for the chunk in `role`, if it was visited.
    pub fn get(&self, role: ChunkRole) -> Option<&ChunkReport> {
        self.chunks.iter().find(|c| c.role == role)
    }
}

/// One finished output image.
#[derive(Debug, Clone)]
pub struct Composite {
    /// Output name without the file stem: `<expression>` or
    /// `<expression>_<mouth slot>`.
    pub name: String,
    pub expression: usize,
    pub mouth: Option<usize>,
    pub bitmap: Bitmap,
    pub repair: RepairStats,
}

/// A decoded chunk kept for inspection.
#[derive(Debug, Clone)]
pub struct Layer {
    pub role: ChunkRole,
    pub image: DecodedImage,
}

/// Everything decoded from one container.
#[derive(Debug, Clone)]
pub struct DecodedContainer {
    pub header: ContainerHeader,
    /// All base chunks composited onto the canvas.
    pub base: Bitmap,
    pub expressions: Vec<ExpressionEntry>,
    pub composites: Vec<Composite>,
    /// Decoded chunks, when [`DecodeOptions::keep_layers`] is set.
    pub layers: Vec<Layer>,
    pub report: DecodeReport,
    /// Consumed bytes, when [`DecodeOptions::track_coverage`] is set.
    pub coverage: Option<CoverageMap>,
}

impl DecodedContainer {
    /// The layout the container was decoded with.
    pub fn variant(&self) -> FormatVariant {
        self.header.variant
    }

    /// Blit rule matching the container's layout.
    pub fn blit_rule(&self) -> BlitRule {
        BlitRule::for_variant(self.header.variant)
    }

    /// Kept layer for a chunk role.
    pub fn layer(&self, role: ChunkRole) -> Option<&DecodedImage> {
        self.layers
            .iter()
            .find(|l| l.role == role)
            .map(|l| &l.image)
    }

    /// Unconsumed byte ranges, when coverage was tracked.
    pub fn gaps(&self) -> Option<Vec<ByteRange>> {
        self.coverage.as_ref().map(CoverageMap::gaps)
    }
}

/// Decoder for bup containers.
///
/// # Example
///
/// ```no_run
/// use bustup_bup::{BupDecoder, DecodeOptions};
///
/// let data = std::fs::read("sprite.bup")?;
/// let container = BupDecoder::new(DecodeOptions::default()).decode(&data)?;
/// for composite in &container.composites {
///     composite.bitmap.save_png(format!("sprite_{}.png", composite.name))?;
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct BupDecoder {
    options: DecodeOptions,
    codec: Option<Box<dyn Codec>>,
    text: Box<dyn TextDecoder>,
}

impl Default for BupDecoder {
    fn default() -> Self {
        Self::new(DecodeOptions::default())
    }
}

impl BupDecoder {
    /// Create a decoder with the built-in codec and CP932 names.
    pub fn new(options: DecodeOptions) -> Self {
        Self {
            options,
            codec: None,
            text: Box::new(EncodingDecoder::cp932()),
        }
    }

    /// Replace the payload codec for every variant.
    pub fn with_codec(mut self, codec: Box<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Replace the expression-name decoder.
    pub fn with_text_decoder(mut self, text: Box<dyn TextDecoder>) -> Self {
        self.text = text;
        self
    }

    /// Decoder configuration.
    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Decode a whole container.
    ///
    /// Fails only when the prologue or the tables cannot be read; problems
    /// with individual chunks are recorded in [`DecodedContainer::report`].
    pub fn decode(&self, data: &[u8]) -> Result<DecodedContainer> {
        check_magic(data)?;
        let variant = match self.options.variant {
            Some(variant) => variant,
            None => FormatVariant::detect(data)?,
        };

        let mut reader = BinaryReader::new(data);
        let header = ContainerHeader::parse(&mut reader, variant)?;

        let lzss = LzssCodec::for_variant(variant);
        let codec: &dyn Codec = match &self.codec {
            Some(codec) => codec.as_ref(),
            None => &lzss,
        };

        let mut pass = Pass {
            payload: PayloadDecoder::new(
                variant,
                codec,
                self.options.max_filler_blocks,
                self.options.max_codec_retries,
            ),
            coverage: self
                .options
                .track_coverage
                .then(|| CoverageMap::new(data.len())),
            keep_layers: self.options.keep_layers,
            report: DecodeReport::default(),
            layers: Vec::new(),
        };
        pass.mark(0, reader.position());

        let rule = BlitRule::for_variant(variant);
        let mut base = Bitmap::new(header.width as u32, header.height as u32, SENTINEL);

        for index in 0..header.base_chunk_count as usize {
            let entry_start = reader.position();
            let chunk = ChunkRef::read(&mut reader, variant)?;
            pass.mark(entry_start, reader.position());

            if let Some(image) = pass.layer(&mut reader, chunk, ChunkRole::Base { index }) {
                base = rule.blit(&image, &base, false);
                pass.keep(ChunkRole::Base { index }, image);
            }
        }

        let padding_start = reader.position();
        reader.skip_bits(variant.expression_table_padding() * 8)?;
        pass.mark(padding_start, reader.position());

        let mut expressions = Vec::with_capacity(header.expression_count as usize);
        let mut composites = Vec::new();

        for index in 0..header.expression_count as usize {
            let entry_start = reader.position();
            let entry = ExpressionEntry::read(&mut reader, variant, index, self.text.as_ref())?;
            pass.mark(entry_start, reader.position());
            debug!("expression {}: {:?}", index, entry);

            if !entry.face.is_present() {
                composites.push(Composite {
                    name: entry.name.clone(),
                    expression: index,
                    mouth: None,
                    bitmap: base.clone(),
                    repair: RepairStats::default(),
                });
                expressions.push(entry);
                continue;
            }

            let face_role = ChunkRole::Face { expression: index };
            let with_face = match pass.layer(&mut reader, entry.face, face_role) {
                Some(face) => {
                    let with_face = rule.blit(&face, &base, true);
                    pass.keep(face_role, face);
                    with_face
                }
                None => base.clone(),
            };

            let mut any_mouth = false;
            for (slot, mouth) in entry.present_mouths() {
                any_mouth = true;
                let role = ChunkRole::Mouth {
                    expression: index,
                    slot,
                };
                let Some(image) = pass.layer(&mut reader, mouth, role) else {
                    continue;
                };
                let mut bitmap = rule.blit(&image, &with_face, true);
                pass.keep(role, image);
                let repair = self.options.repair.apply(&mut bitmap);
                composites.push(Composite {
                    name: format!("{}_{}", entry.name, slot),
                    expression: index,
                    mouth: Some(slot),
                    bitmap,
                    repair,
                });
            }

            if !any_mouth {
                let mut bitmap = with_face;
                let repair = self.options.repair.apply(&mut bitmap);
                composites.push(Composite {
                    name: entry.name.clone(),
                    expression: index,
                    mouth: None,
                    bitmap,
                    repair,
                });
            }

            expressions.push(entry);
        }

        let failures = pass.report.failures().count();
        info!(
            "decoded {} layout: {} chunks drawn, {} failed, {} outputs",
            variant,
            pass.report.drawn(),
            failures,
            composites.len()
        );

        Ok(DecodedContainer {
            header,
            base,
            expressions,
            composites,
            layers: pass.layers,
            report: pass.report,
            coverage: pass.coverage,
        })
    }
}

/// Mutable state of one decode.
struct Pass<'c> {
    payload: PayloadDecoder<'c>,
    coverage: Option<CoverageMap>,
    keep_layers: bool,
    report: DecodeReport,
    layers: Vec<Layer>,
}

impl Pass<'_> {
    fn mark(&mut self, start: usize, end: usize) {
        if let Some(coverage) = &mut self.coverage {
            coverage.mark_span(start, end);
        }
    }

    /// Decode one chunk and record its outcome. Only drawable images are
    /// returned.
    fn layer(
        &mut self,
        reader: &mut BinaryReader<'_>,
        chunk: ChunkRef,
        role: ChunkRole,
    ) -> Option<DecodedImage> {
        let (outcome, image) = if !chunk.is_present() {
            (ChunkOutcome::Absent, None)
        } else {
            let mut spans = Vec::new();
            let result = self
                .payload
                .decode_chunk(reader, chunk.offset as usize, chunk.size, &mut spans);
            for span in spans {
                self.mark(span.offset, span.end());
            }
            match result {
                Ok(Some(image)) => (ChunkOutcome::Drawn, Some(image)),
                Ok(None) => (ChunkOutcome::Absent, None),
                Err(e) => {
                    warn!("{} at {:#x}: {}", role, chunk.offset, e);
                    (
                        ChunkOutcome::Failed {
                            message: e.to_string(),
                        },
                        None,
                    )
                }
            }
        };

        self.report.chunks.push(ChunkReport {
            role,
            offset: chunk.offset,
            outcome,
        });
        image
    }

    fn keep(&mut self, role: ChunkRole, image: DecodedImage) {
        if self.keep_layers {
            self.layers.push(Layer { role, image });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::BLACK;
    use crate::codec::store_literals;
    use crate::header::BUP_MAGIC;
    use crate::variant::ChannelOrder;
    use crate::Error;
    use byteorder::{LittleEndian, WriteBytesExt};

    const RED: u32 = 0xFFFF_0000;
    const GREEN: u32 = 0xFF00_FF00;
    const BLUE: u32 = 0xFF00_00FF;

    /// Raw palettised chunk whose every pixel is palette entry 0.
    fn solid_chunk(order: ChannelOrder, x: u16, y: u16, w: u16, h: u16, argb: u32) -> Vec<u8> {
        raw_chunk(3, order, x, y, w, h, argb)
    }

    /// As [`solid_chunk`], with an explicit chunk type and no mask.
    fn raw_chunk(
        chunk_type: u16,
        order: ChannelOrder,
        x: u16,
        y: u16,
        w: u16,
        h: u16,
        argb: u32,
    ) -> Vec<u8> {
        let mut out = Vec::new();
        for word in [chunk_type, 0, 0, 0, x, y, w, h] {
            out.write_u16::<LittleEndian>(word).unwrap();
        }
        out.write_u32::<LittleEndian>(0).unwrap();
        out.extend_from_slice(&[0; 12]);
        out.extend_from_slice(&order.from_argb(argb));
        out.extend_from_slice(&[0; 1020]);
        let area = ((w as usize + 3) & !3) * h as usize;
        out.extend(std::iter::repeat(0u8).take(area));
        out
    }

    /// Compressed palettised chunk whose every pixel is palette entry 0.
    fn compressed_chunk(order: ChannelOrder, x: u16, y: u16, w: u16, h: u16, argb: u32) -> Vec<u8> {
        let mut payload = order.from_argb(argb).to_vec();
        payload.extend_from_slice(&[0; 1020]);
        let area = ((w as usize + 3) & !3) * h as usize;
        payload.extend(std::iter::repeat(0u8).take(area));
        let stream = store_literals(&payload);

        let mut out = Vec::new();
        for word in [2u16, 0, 0, 0, x, y, w, h] {
            out.write_u16::<LittleEndian>(word).unwrap();
        }
        out.write_u32::<LittleEndian>(stream.len() as u32).unwrap();
        out.extend_from_slice(&[0; 12]);
        out.extend_from_slice(&stream);
        out
    }

    struct Expression<'a> {
        name: &'a str,
        face: Option<Vec<u8>>,
        mouths: [Option<Vec<u8>>; 3],
    }

    /// Assemble an extended-layout container.
    fn switch_container(width: u16, height: u16, bases: &[Vec<u8>], expressions: &[Expression<'_>]) -> Vec<u8> {
        let table_len = 36 + bases.len() * 8 + 12 + expressions.len() * 76;
        let mut chunks = Vec::new();
        let place = |chunk: &Vec<u8>, chunks: &mut Vec<u8>| -> (u32, u32) {
            let offset = (table_len + chunks.len()) as u32;
            chunks.extend_from_slice(chunk);
            (offset, chunk.len() as u32)
        };

        let mut tables = Vec::new();
        for base in bases {
            let (offset, size) = place(base, &mut chunks);
            tables.write_u32::<LittleEndian>(offset).unwrap();
            tables.write_u32::<LittleEndian>(size).unwrap();
        }
        tables.extend_from_slice(&[0; 12]);
        for exp in expressions {
            let mut name = [0u8; 20];
            name[..exp.name.len()].copy_from_slice(exp.name.as_bytes());
            tables.extend_from_slice(&name);
            let (offset, size) = exp.face.as_ref().map_or((0, 0), |c| place(c, &mut chunks));
            tables.write_u32::<LittleEndian>(offset).unwrap();
            tables.write_u32::<LittleEndian>(size).unwrap();
            tables.extend_from_slice(&[0; 24]);
            for mouth in &exp.mouths {
                let (offset, size) = mouth.as_ref().map_or((0, 0), |c| place(c, &mut chunks));
                tables.write_u32::<LittleEndian>(offset).unwrap();
                tables.write_u32::<LittleEndian>(size).unwrap();
            }
        }

        let total = (table_len + chunks.len()) as u32;
        let mut out = Vec::new();
        out.extend_from_slice(BUP_MAGIC);
        out.write_u32::<LittleEndian>(3).unwrap();
        out.write_u32::<LittleEndian>(total).unwrap();
        out.write_u16::<LittleEndian>(width).unwrap();
        out.write_u16::<LittleEndian>(height).unwrap();
        out.write_u16::<LittleEndian>(width).unwrap();
        out.write_u16::<LittleEndian>(height).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(bases.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(expressions.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.extend_from_slice(&tables);
        out.extend_from_slice(&chunks);
        assert_eq!(out.len(), total as usize);
        out
    }

    /// Assemble a legacy-layout container with one base chunk.
    fn ps3_container(width: u16, height: u16, base: &[u8]) -> Vec<u8> {
        let offset = 28 + 4;
        let total = (offset + base.len()) as u32;
        let mut out = Vec::new();
        out.extend_from_slice(BUP_MAGIC);
        out.write_u32::<LittleEndian>(total).unwrap();
        out.write_u16::<LittleEndian>(width).unwrap();
        out.write_u16::<LittleEndian>(height).unwrap();
        out.write_u16::<LittleEndian>(width).unwrap();
        out.write_u16::<LittleEndian>(height).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(1).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(offset as u32).unwrap();
        out.extend_from_slice(base);
        out
    }

    #[test]
    fn test_minimal_container_end_to_end() {
        let chunk = solid_chunk(ChannelOrder::Bgra, 0, 0, 1, 4, RED);
        let data = ps3_container(4, 4, &chunk);

        let options = DecodeOptions {
            track_coverage: true,
            ..Default::default()
        };
        let container = BupDecoder::new(options).decode(&data).unwrap();

        assert_eq!(container.variant(), FormatVariant::Ps3);
        assert!(container.composites.is_empty());
        assert_eq!(container.base.width(), 4);
        assert_eq!(container.base.height(), 4);
        for y in 0..4 {
            for x in 0..4 {
                let expected = if x < 2 && y < 2 { RED } else { SENTINEL };
                assert_eq!(container.base.pixel(x, y), expected, "pixel ({x}, {y})");
            }
        }
        assert_eq!(container.report.drawn(), 1);
        assert_eq!(container.gaps(), Some(vec![]));
    }

    #[test]
    fn test_full_coverage_leaves_no_sentinel() {
        // Two 6x4 chunks (4x2 after cropping) tile a 4x4 canvas.
        let top = solid_chunk(ChannelOrder::Rgba, 0, 0, 6, 4, RED);
        let bottom = compressed_chunk(ChannelOrder::Rgba, 0, 2, 6, 4, BLUE);
        let data = switch_container(4, 4, &[top, bottom], &[]);

        let container = BupDecoder::default().decode(&data).unwrap();
        assert_eq!(container.variant(), FormatVariant::Switch);
        assert_eq!(container.base.count(SENTINEL), 0);
        assert_eq!(container.base.count(RED), 8);
        assert_eq!(container.base.count(BLUE), 8);
    }

    #[test]
    fn test_unmasked_type2_chunk_keeps_palette_alpha() {
        let order = ChannelOrder::Rgba;
        let top = raw_chunk(2, order, 0, 0, 6, 4, RED);
        let bottom = raw_chunk(2, order, 0, 2, 6, 4, BLUE);
        let data = switch_container(4, 4, &[top, bottom], &[]);

        let options = DecodeOptions {
            keep_layers: true,
            ..Default::default()
        };
        let container = BupDecoder::new(options).decode(&data).unwrap();
        for index in 0..2 {
            let layer = container.layer(ChunkRole::Base { index }).unwrap();
            assert!(!layer.masked, "base chunk {index}");
        }
        assert_eq!(container.base.count(RED), 8);
        assert_eq!(container.base.count(BLUE), 8);
    }

    #[test]
    fn test_expressions_and_mouths() {
        let order = ChannelOrder::Rgba;
        let base = solid_chunk(order, 0, 0, 6, 6, RED);
        let expressions = [
            Expression {
                name: "Def",
                face: None,
                mouths: [Some(solid_chunk(order, 0, 0, 3, 3, BLUE)), None, None],
            },
            Expression {
                name: "Smile",
                face: Some(solid_chunk(order, 0, 0, 4, 4, GREEN)),
                mouths: [None, Some(solid_chunk(order, 1, 1, 3, 3, BLUE)), None],
            },
            Expression {
                name: "Wink",
                face: Some(solid_chunk(order, 2, 2, 4, 4, GREEN)),
                mouths: [None, None, None],
            },
        ];
        let data = switch_container(4, 4, &[base], &expressions);

        let options = DecodeOptions {
            keep_layers: true,
            ..Default::default()
        };
        let container = BupDecoder::new(options).decode(&data).unwrap();
        let names: Vec<_> = container.composites.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Def", "Smile_1", "Wink"]);

        let def = &container.composites[0];
        assert_eq!(def.bitmap, container.base);
        assert_eq!(def.bitmap.count(RED), 16);

        let smile = &container.composites[1];
        assert_eq!(smile.mouth, Some(1));
        assert_eq!(smile.bitmap.pixel(0, 0), GREEN);
        assert_eq!(smile.bitmap.pixel(1, 1), BLUE);
        assert_eq!(smile.bitmap.pixel(3, 3), RED);

        let wink = &container.composites[2];
        assert_eq!(wink.bitmap.pixel(2, 2), GREEN);
        assert_eq!(wink.bitmap.pixel(1, 1), RED);

        // Mouths of an expression without a face are never visited.
        assert!(container
            .report
            .get(ChunkRole::Mouth { expression: 0, slot: 0 })
            .is_none());
        assert!(container.layer(ChunkRole::Face { expression: 1 }).is_some());
        assert!(container.layer(ChunkRole::Base { index: 0 }).is_some());
        assert_eq!(container.expressions.len(), 3);
    }

    #[test]
    fn test_black_keyed_face() {
        let order = ChannelOrder::Rgba;
        let base = solid_chunk(order, 0, 0, 6, 6, RED);
        let expressions = [Expression {
            name: "Keyed",
            face: Some(solid_chunk(order, 0, 0, 4, 4, BLACK)),
            mouths: [None, None, None],
        }];
        let data = switch_container(4, 4, &[base], &expressions);

        let container = BupDecoder::default().decode(&data).unwrap();
        assert_eq!(container.composites[0].bitmap.count(RED), 16);
    }

    #[test]
    fn test_failed_mouth_is_reported_and_skipped() {
        let order = ChannelOrder::Rgba;
        let base = solid_chunk(order, 0, 0, 6, 6, RED);
        let mut broken = compressed_chunk(order, 0, 0, 3, 3, BLUE);
        // Turn the first flag byte into a back-reference with no output yet.
        broken[32] = 0x01;
        let expressions = [Expression {
            name: "Broken",
            face: Some(solid_chunk(order, 0, 0, 4, 4, GREEN)),
            mouths: [Some(broken), Some(solid_chunk(order, 0, 0, 3, 3, BLUE)), None],
        }];
        let data = switch_container(4, 4, &[base], &expressions);

        let options = DecodeOptions {
            max_codec_retries: 0,
            ..Default::default()
        };
        let container = BupDecoder::new(options).decode(&data).unwrap();

        let names: Vec<_> = container.composites.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Broken_1"]);
        let failed: Vec<_> = container.report.failures().map(|c| c.role).collect();
        assert_eq!(failed, vec![ChunkRole::Mouth { expression: 0, slot: 0 }]);
    }

    #[test]
    fn test_repair_runs_on_expression_outputs_only() {
        let order = ChannelOrder::Rgba;
        let base = solid_chunk(order, 0, 0, 6, 6, BLACK);
        let expressions = [
            Expression {
                name: "Plain",
                face: None,
                mouths: [None, None, None],
            },
            Expression {
                name: "Face",
                face: Some(solid_chunk(order, 0, 0, 3, 3, GREEN)),
                mouths: [None, None, None],
            },
        ];
        let data = switch_container(4, 4, &[base], &expressions);

        let options = DecodeOptions {
            repair: RepairPolicy::BorderPurity,
            ..Default::default()
        };
        let container = BupDecoder::new(options).decode(&data).unwrap();

        assert_eq!(container.composites[0].bitmap.count(BLACK), 16);
        let face = &container.composites[1];
        assert_eq!(face.bitmap.pixel(0, 0), GREEN);
        // The black surround touches the opaque green face, so it is flagged.
        assert_eq!(face.repair.flagged, 1);
        assert_eq!(face.bitmap.count(crate::bitmap::MARKER), 14);
    }

    #[test]
    fn test_bad_magic_and_variant() {
        let chunk = solid_chunk(ChannelOrder::Bgra, 0, 0, 1, 4, RED);
        let mut data = ps3_container(4, 4, &chunk);

        let mut wrong_len = data.clone();
        wrong_len.push(0);
        assert!(matches!(
            BupDecoder::default().decode(&wrong_len),
            Err(Error::UnsupportedVariant { .. })
        ));

        data[0] = b'X';
        assert!(matches!(
            BupDecoder::default().decode(&data),
            Err(Error::MalformedHeader { .. })
        ));
    }

    #[test]
    fn test_foreign_file_is_malformed_before_detection() {
        // A PNG signature: neither size field matches the length either.
        let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        png.extend_from_slice(&[0x11; 56]);
        assert!(matches!(
            BupDecoder::default().decode(&png),
            Err(Error::MalformedHeader { actual }) if &actual == b"\x89PNG"
        ));

        for short in [&b""[..], &b"GIF"[..], &b"GIF89a"[..]] {
            assert!(matches!(
                BupDecoder::default().decode(short),
                Err(Error::MalformedHeader { .. })
            ));
        }

        let forced = BupDecoder::new(DecodeOptions {
            variant: Some(FormatVariant::Switch),
            ..Default::default()
        });
        assert!(matches!(forced.decode(&png), Err(Error::MalformedHeader { .. })));
    }

    #[test]
    fn test_forced_variant() {
        let chunk = solid_chunk(ChannelOrder::Bgra, 0, 0, 1, 4, RED);
        let mut data = ps3_container(4, 4, &chunk);
        data.extend_from_slice(&[0; 8]);

        let options = DecodeOptions {
            variant: Some(FormatVariant::Ps3),
            track_coverage: true,
            ..Default::default()
        };
        let container = BupDecoder::new(options).decode(&data).unwrap();
        assert_eq!(container.base.pixel(0, 0), RED);
        let gaps = container.gaps().unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].length, 8);
    }
}
