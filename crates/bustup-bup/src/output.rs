//! Writing decoded containers to disk.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::debug;

use crate::decoder::{ChunkRole, DecodedContainer};
use crate::{parts, Result};

/// How a container's images are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// One flattened PNG per expression and mouth.
    #[default]
    Composited,
    /// Separate base, face and mouth PNGs plus a JSON manifest describing how
    /// to stack them.
    Parts,
}

impl OutputMode {
    /// Whether the mode needs [`DecodeOptions::keep_layers`](crate::DecodeOptions::keep_layers).
    pub const fn requires_layers(self) -> bool {
        matches!(self, Self::Parts)
    }

    /// Write `container` into `dir` using `stem` as the file-name prefix.
    /// Returns the paths written.
    pub fn write(self, container: &DecodedContainer, dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
        match self {
            Self::Composited => write_composited(container, dir, stem, false),
            Self::Parts => parts::write_parts(container, dir, stem),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Composited => f.write_str("composited"),
            Self::Parts => f.write_str("parts"),
        }
    }
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "composited" | "composite" | "flat" => Ok(Self::Composited),
            "parts" => Ok(Self::Parts),
            other => Err(format!("unknown output mode '{}'", other)),
        }
    }
}

/// Make an expression name safe to use in a file name.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Write one PNG per composite as `<stem>_<name>.png`, plus `<stem>_base.png`
/// when `include_base` is set.
pub fn write_composited(
    container: &DecodedContainer,
    dir: &Path,
    stem: &str,
    include_base: bool,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(container.composites.len() + 1);

    if include_base {
        let path = dir.join(format!("{}_base.png", stem));
        container.base.save_png(&path)?;
        written.push(path);
    }

    for composite in &container.composites {
        let path = dir.join(format!("{}_{}.png", stem, sanitize_name(&composite.name)));
        debug!("writing {}", path.display());
        composite.bitmap.save_png(&path)?;
        written.push(path);
    }

    Ok(written)
}

/// Write every kept layer as its own PNG for debugging.
///
/// Files are named `<stem>_BaseChunk<i>.png`, `<stem>_<expression>_Face.png`
/// and `<stem>_<expression>_Mouth<slot>.png`.
pub fn write_layers(container: &DecodedContainer, dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(container.layers.len());

    for layer in &container.layers {
        let name = match layer.role {
            ChunkRole::Base { index } => format!("{}_BaseChunk{}", stem, index),
            ChunkRole::Face { expression } => {
                format!("{}_{}_Face", stem, expression_name(container, expression))
            }
            ChunkRole::Mouth { expression, slot } => format!(
                "{}_{}_Mouth{}",
                stem,
                expression_name(container, expression),
                slot
            ),
        };
        let path = dir.join(format!("{}.png", name));
        layer.image.bitmap.save_png(&path)?;
        written.push(path);
    }

    Ok(written)
}

pub(crate) fn expression_name(container: &DecodedContainer, index: usize) -> String {
    container
        .expressions
        .get(index)
        .map(|e| sanitize_name(&e.name))
        .unwrap_or_else(|| format!("expression{}", index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Def1"), "Def1");
        assert_eq!(sanitize_name("a/b\\c:d"), "a_b_c_d");
        assert_eq!(sanitize_name("笑顔\0"), "笑顔_");
    }

    #[test]
    fn test_output_mode_from_str() {
        assert_eq!("parts".parse::<OutputMode>().unwrap(), OutputMode::Parts);
        assert_eq!("Composited".parse::<OutputMode>().unwrap(), OutputMode::Composited);
        assert!("layers".parse::<OutputMode>().is_err());
        assert!(OutputMode::Parts.requires_layers());
        assert!(!OutputMode::Composited.requires_layers());
    }
}
