//! Layered ("parts") output.
//!
//! Instead of flattening every expression, the base, face and mouth layers
//! are written once each and a `<stem>.json` manifest lists, for every
//! output, which parts to stack and at what offset. Each output also carries
//! a [`Blend`] class telling consumers whether plain alpha blending
//! reproduces the composite.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use log::warn;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::bitmap::{alpha, Bitmap, BLACK};
use crate::compositor::BlitRule;
use crate::decoder::{ChunkRole, DecodedContainer};
use crate::output::{expression_name, sanitize_name};
use crate::payload::DecodedImage;
use crate::Result;

/// How the parts of one output must be combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Blend {
    /// Normal alpha blending reproduces the composite.
    #[default]
    AlphaBlend,
    /// Needs a blend that copies a pixel whenever its alpha is non-zero.
    CustomBlend,
    /// Fully transparent part pixels replace visible pixels beneath them; no
    /// blend function recreates the composite.
    NotPossible,
}

/// One image placed on the canvas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartRef {
    /// Path relative to the manifest.
    pub path: String,
    pub x: u32,
    pub y: u32,
}

/// One output of an expression: the parts to stack, bottom first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartsImage {
    pub blend: Blend,
    pub parts: Vec<PartRef>,
}

/// All outputs of one expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartsExpression {
    pub name: String,
    pub images: Vec<PartsImage>,
}

/// The `<stem>.json` manifest: expression name to outputs, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartsManifest {
    pub expressions: Vec<PartsExpression>,
}

impl PartsManifest {
    /// Manifest keys, one per expression. A name already used by an earlier
    /// expression gets its table index appended (`Def`, `Def_3`).
    pub fn keys(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut keys = Vec::with_capacity(self.expressions.len());
        for (index, expression) in self.expressions.iter().enumerate() {
            let mut key = expression.name.clone();
            let mut suffix = index;
            while !seen.insert(key.clone()) {
                key = format!("{}_{}", expression.name, suffix);
                suffix += 1;
            }
            keys.push(key);
        }
        keys
    }
}

impl Serialize for PartsManifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.expressions.len()))?;
        for (key, expression) in self.keys().iter().zip(&self.expressions) {
            map.serialize_entry(key, &expression.images)?;
        }
        map.end()
    }
}

/// A layer as it should be stored on its own.
///
/// Under [`BlitRule::BlackKeyed`] opaque black marks pixels that show the
/// layer beneath, so it becomes fully transparent.
pub fn part_bitmap(layer: &DecodedImage, rule: BlitRule) -> Bitmap {
    let mut bitmap = layer.bitmap.clone();
    if rule == BlitRule::BlackKeyed {
        for y in 0..bitmap.height() {
            for x in 0..bitmap.width() {
                if bitmap.pixel(x, y) == BLACK {
                    bitmap.set(x, y, 0);
                }
            }
        }
    }
    bitmap
}

/// Classify how `part` (derived from `layer`) must be blended onto `target`.
///
/// Only pixels over visible target pixels matter. A transparent part pixel
/// that nonetheless changes the composite makes blending impossible; a
/// partially transparent one needs the custom blend.
pub fn classify_blend(layer: &DecodedImage, part: &Bitmap, target: &Bitmap, rule: BlitRule) -> Blend {
    let mut blend = Blend::AlphaBlend;

    for j in 0..part.height() {
        for i in 0..part.width() {
            let (Some(x), Some(y)) = (layer.x.checked_add(i), layer.y.checked_add(j)) else {
                continue;
            };
            let Some(dst) = target.get(x, y) else {
                continue;
            };
            if alpha(dst) == 0 {
                continue;
            }

            let a = alpha(part.pixel(i, j));
            if a == 0 {
                let composed = rule.combine(layer.bitmap.pixel(i, j), dst, layer.masked, true);
                if composed != dst {
                    return Blend::NotPossible;
                }
            } else if a < 0xFF {
                blend = Blend::CustomBlend;
            }
        }
    }

    blend
}

/// Build the manifest and the part images for a container.
///
/// Returns the manifest and `(relative path, bitmap)` pairs for every part.
/// Face and mouth parts are only available when layers were kept.
pub fn build_parts(container: &DecodedContainer, stem: &str) -> (PartsManifest, Vec<(String, Bitmap)>) {
    let rule = container.blit_rule();
    let path = |name: &str| format!("{}/{}.png", stem, name);

    let base_path = path(stem);
    let mut files = vec![(base_path.clone(), container.base.clone())];
    let mut manifest = PartsManifest::default();

    for (index, entry) in container.expressions.iter().enumerate() {
        let name = expression_name(container, index);
        let mut images = Vec::new();

        let face = container.layer(ChunkRole::Face { expression: index });
        let mut face_part = None;
        let with_face = match face {
            Some(face) => {
                let bitmap = part_bitmap(face, rule);
                let blend = classify_blend(face, &bitmap, &container.base, rule);
                let face_path = path(&format!("{}_{}", stem, name));
                files.push((face_path.clone(), bitmap));
                face_part = Some((
                    PartRef {
                        path: face_path,
                        x: face.x,
                        y: face.y,
                    },
                    blend,
                ));
                rule.blit(face, &container.base, true)
            }
            None => container.base.clone(),
        };

        let outputs = container.composites.iter().filter(|c| c.expression == index);
        for composite in outputs {
            let mut parts = vec![PartRef {
                path: base_path.clone(),
                x: 0,
                y: 0,
            }];
            let mut blend = Blend::AlphaBlend;

            if let Some((part, face_blend)) = &face_part {
                parts.push(part.clone());
                blend = blend.max(*face_blend);
            }

            if let Some(slot) = composite.mouth {
                let role = ChunkRole::Mouth {
                    expression: index,
                    slot,
                };
                if let Some(mouth) = container.layer(role) {
                    let bitmap = part_bitmap(mouth, rule);
                    blend = blend.max(classify_blend(mouth, &bitmap, &with_face, rule));
                    let mouth_path = path(&format!("{}_{}_{}", stem, name, slot));
                    files.push((mouth_path.clone(), bitmap));
                    parts.push(PartRef {
                        path: mouth_path,
                        x: mouth.x,
                        y: mouth.y,
                    });
                }
            }

            if blend == Blend::NotPossible {
                warn!(
                    "{}_{} has fully transparent overriding pixels and may not be renderable from parts",
                    stem, composite.name
                );
            }
            images.push(PartsImage { blend, parts });
        }

        manifest.expressions.push(PartsExpression {
            name: entry.name.clone(),
            images,
        });
    }

    (manifest, files)
}

/// Write the parts under `dir/<stem>/` and the manifest as `dir/<stem>.json`.
pub fn write_parts(container: &DecodedContainer, dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
    let stem = sanitize_name(stem);
    let (manifest, files) = build_parts(container, &stem);

    fs::create_dir_all(dir.join(&stem))?;
    let mut written = Vec::with_capacity(files.len() + 1);
    for (relative, bitmap) in files {
        let path = dir.join(relative);
        bitmap.save_png(&path)?;
        written.push(path);
    }

    let manifest_path = dir.join(format!("{}.json", stem));
    let writer = BufWriter::new(File::create(&manifest_path)?);
    serde_json::to_writer_pretty(writer, &manifest)?;
    written.push(manifest_path);

    Ok(written)
}
