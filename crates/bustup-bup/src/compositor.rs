//! Layer compositing.

use serde::Serialize;

use crate::bitmap::{alpha, with_alpha, Bitmap, BLACK, SENTINEL};
use crate::payload::DecodedImage;
use crate::FormatVariant;

/// How a decoded layer is combined with the canvas beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlitRule {
    /// The source replaces the destination when it is masked or the
    /// destination is still unwritten; otherwise the source colour takes the
    /// destination alpha.
    KeepAlpha,
    /// As [`BlitRule::KeepAlpha`], but opaque black source pixels of overlay
    /// layers let the destination show through.
    BlackKeyed,
}

impl BlitRule {
    /// The rule a format variant composites with.
    pub const fn for_variant(variant: FormatVariant) -> Self {
        match variant {
            FormatVariant::Ps3 => Self::KeepAlpha,
            FormatVariant::Switch => Self::BlackKeyed,
        }
    }

    /// Combine one source pixel with one destination pixel.
    ///
    /// An unwritten ([`SENTINEL`]) source pixel never changes the destination.
    #[inline]
    pub fn combine(self, src: u32, dst: u32, masked: bool, black_is_transparent: bool) -> u32 {
        let keyed = self == Self::BlackKeyed && black_is_transparent && src == BLACK;
        if src == SENTINEL || keyed {
            dst
        } else if masked || dst == SENTINEL {
            src
        } else {
            with_alpha(src, alpha(dst))
        }
    }

    /// Draw `layer` onto a copy of `canvas`.
    ///
    /// `black_is_transparent` only has an effect under
    /// [`BlitRule::BlackKeyed`]; pass it for face and mouth layers. Pixels
    /// that fall outside the canvas are dropped.
    pub fn blit(self, layer: &DecodedImage, canvas: &Bitmap, black_is_transparent: bool) -> Bitmap {
        let mut out = canvas.clone();
        let src = &layer.bitmap;

        for j in 0..src.height() {
            let Some(y) = layer.y.checked_add(j).filter(|&y| y < canvas.height()) else {
                break;
            };
            for i in 0..src.width() {
                let Some(x) = layer.x.checked_add(i).filter(|&x| x < canvas.width()) else {
                    break;
                };
                let pixel = self.combine(
                    src.pixel(i, j),
                    canvas.pixel(x, y),
                    layer.masked,
                    black_is_transparent,
                );
                out.set(x, y, pixel);
            }
        }

        out
    }
}
