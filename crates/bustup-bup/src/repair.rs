//! Transparency repair.
//!
//! Overlay layers of some containers leave opaque black where the finished
//! sprite should be transparent. These passes find such regions with a
//! scanline flood fill and clear them. Both are heuristics and can erase
//! genuinely black artwork.

use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::Serialize;

use crate::bitmap::{alpha, Bitmap, BLACK, MARKER, SENTINEL};

/// Components blacker than this fraction are cleared by
/// [`RepairPolicy::BlacknessRatio`].
pub const BLACKNESS_THRESHOLD: f64 = 0.9;

/// Which repair pass to run on finished composites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepairPolicy {
    /// Leave composites untouched.
    #[default]
    None,
    /// Clear opaque-black regions bordered only by transparency or the image
    /// edge; flag any other opaque-black region with [`MARKER`].
    BorderPurity,
    /// Clear non-transparent regions that are more than 90% opaque black.
    BlacknessRatio,
}

/// What a repair pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepairStats {
    /// Regions examined.
    pub regions: usize,
    /// Regions recoloured to [`SENTINEL`].
    pub cleared: usize,
    /// Regions recoloured to [`MARKER`].
    pub flagged: usize,
}

impl RepairPolicy {
    /// Run the pass over `bitmap` in place.
    pub fn apply(self, bitmap: &mut Bitmap) -> RepairStats {
        let stats = match self {
            Self::None => RepairStats::default(),
            Self::BorderPurity => border_purity(bitmap),
            Self::BlacknessRatio => blackness_ratio(bitmap),
        };
        if self != Self::None {
            debug!("{} repair: {:?}", self, stats);
        }
        stats
    }
}

impl fmt::Display for RepairPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::BorderPurity => f.write_str("border-purity"),
            Self::BlacknessRatio => f.write_str("blackness-ratio"),
        }
    }
}

impl FromStr for RepairPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "border-purity" | "border" => Ok(Self::BorderPurity),
            "blackness-ratio" | "ratio" => Ok(Self::BlacknessRatio),
            other => Err(format!("unknown repair policy '{}'", other)),
        }
    }
}

/// 4-connected components of the pixels selected by a predicate.
struct Regions {
    width: u32,
    height: u32,
    /// Component id per pixel, 1-based; 0 for pixels outside every component.
    labels: Vec<u32>,
    count: u32,
}

impl Regions {
    fn label(bitmap: &Bitmap, member: impl Fn(u32) -> bool) -> Self {
        let (width, height) = (bitmap.width(), bitmap.height());
        let mut regions = Self {
            width,
            height,
            labels: vec![0; width as usize * height as usize],
            count: 0,
        };
        let open: Vec<bool> = bitmap.pixels().iter().map(|&p| member(p)).collect();

        for y in 0..height {
            for x in 0..width {
                let i = regions.index(x, y);
                if open[i] && regions.labels[i] == 0 {
                    regions.count += 1;
                    regions.fill(&open, x, y, regions.count);
                }
            }
        }
        regions
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    fn is_open(&self, open: &[bool], x: u32, y: u32) -> bool {
        let i = self.index(x, y);
        open[i] && self.labels[i] == 0
    }

    /// Scanline flood fill from `(x, y)` with an explicit stack.
    fn fill(&mut self, open: &[bool], x: u32, y: u32, id: u32) {
        let mut stack = vec![(x, y)];

        while let Some((mut x, y)) = stack.pop() {
            if !self.is_open(open, x, y) {
                continue;
            }
            while x > 0 && self.is_open(open, x - 1, y) {
                x -= 1;
            }

            let mut span_above = false;
            let mut span_below = false;
            while x < self.width && self.is_open(open, x, y) {
                let i = self.index(x, y);
                self.labels[i] = id;

                if y > 0 {
                    let above = self.is_open(open, x, y - 1);
                    if above && !span_above {
                        stack.push((x, y - 1));
                    }
                    span_above = above;
                }
                if y + 1 < self.height {
                    let below = self.is_open(open, x, y + 1);
                    if below && !span_below {
                        stack.push((x, y + 1));
                    }
                    span_below = below;
                }
                x += 1;
            }
        }
    }

    /// `(x, y)` moved by `(dx, dy)`, or `None` off the image.
    fn neighbour(&self, x: u32, y: u32, dx: i64, dy: i64) -> Option<(u32, u32)> {
        let nx = x as i64 + dx;
        let ny = y as i64 + dy;
        (nx >= 0 && ny >= 0 && nx < self.width as i64 && ny < self.height as i64)
            .then_some((nx as u32, ny as u32))
    }

    fn recolour(&self, bitmap: &mut Bitmap, targets: &[Option<u32>]) {
        for y in 0..self.height {
            for x in 0..self.width {
                let id = self.labels[self.index(x, y)];
                if id == 0 {
                    continue;
                }
                if let Some(colour) = targets[id as usize] {
                    bitmap.set(x, y, colour);
                }
            }
        }
    }
}

fn border_purity(bitmap: &mut Bitmap) -> RepairStats {
    let regions = Regions::label(bitmap, |p| p == BLACK);
    let mut pure = vec![true; regions.count as usize + 1];

    for y in 0..regions.height {
        for x in 0..regions.width {
            let id = regions.labels[regions.index(x, y)];
            if id == 0 || !pure[id as usize] {
                continue;
            }
            for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
                let Some((nx, ny)) = regions.neighbour(x, y, dx, dy) else {
                    continue;
                };
                let same = regions.labels[regions.index(nx, ny)] == id;
                if !same && alpha(bitmap.pixel(nx, ny)) != 0 {
                    pure[id as usize] = false;
                    break;
                }
            }
        }
    }

    let mut stats = RepairStats {
        regions: regions.count as usize,
        ..Default::default()
    };
    let targets: Vec<Option<u32>> = pure
        .iter()
        .enumerate()
        .map(|(id, &is_pure)| {
            if id == 0 {
                None
            } else if is_pure {
                stats.cleared += 1;
                Some(SENTINEL)
            } else {
                stats.flagged += 1;
                Some(MARKER)
            }
        })
        .collect();

    regions.recolour(bitmap, &targets);
    stats
}

fn blackness_ratio(bitmap: &mut Bitmap) -> RepairStats {
    let regions = Regions::label(bitmap, |p| alpha(p) != 0);
    let mut black = vec![0usize; regions.count as usize + 1];
    let mut total = vec![0usize; regions.count as usize + 1];

    for (&id, &pixel) in regions.labels.iter().zip(bitmap.pixels()) {
        if id == 0 {
            continue;
        }
        total[id as usize] += 1;
        if pixel == BLACK {
            black[id as usize] += 1;
        }
    }

    let mut stats = RepairStats {
        regions: regions.count as usize,
        ..Default::default()
    };
    let targets: Vec<Option<u32>> = (0..total.len())
        .map(|id| {
            let ratio = black[id] as f64 / total[id].max(1) as f64;
            if id != 0 && ratio > BLACKNESS_THRESHOLD {
                stats.cleared += 1;
                Some(SENTINEL)
            } else {
                None
            }
        })
        .collect();

    regions.recolour(bitmap, &targets);
    stats
}
