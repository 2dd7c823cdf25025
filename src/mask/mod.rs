//! Per-pixel algebra over single-channel masks.
//!
//! Masks are `GrayImage`s where 255 means "inside". All binary operations
//! require equal dimensions and return a new mask of the same size.

use crate::error::{ensure_same_size, CompositeError, Result};
use image::{GrayImage, Luma, RgbaImage};

/// Largest share of a mask's nonzero pixels allowed to be fractional
/// (antialiasing) before the mask is rejected.
pub const FRACTIONAL_TOLERANCE: f64 = 0.01;

/// Saturating per-pixel sum of two masks.
///
/// Overlapping regions clamp at 255 rather than wrapping.
pub fn union(a: &GrayImage, b: &GrayImage) -> Result<GrayImage> {
    zip_with(a, b, "mask union", |x, y| x.saturating_add(y))
}

/// Per-pixel product of two masks normalised to the 0..=255 scale.
///
/// Used for intersection and, paired with [`invert`], for cutting an
/// occluder's area out of a mask.
pub fn intersect_or_cut(a: &GrayImage, b: &GrayImage) -> Result<GrayImage> {
    zip_with(a, b, "mask intersection", |x, y| {
        ((x as u16 * y as u16) / 255) as u8
    })
}

pub fn invert(mask: &GrayImage) -> GrayImage {
    let mut out = mask.clone();
    for px in out.pixels_mut() {
        px[0] = 255 - px[0];
    }
    out
}

/// Union of any number of equally sized masks.
pub fn union_all<'a, I>(width: u32, height: u32, masks: I) -> Result<GrayImage>
where
    I: IntoIterator<Item = &'a GrayImage>,
{
    let mut acc = GrayImage::new(width, height);
    for mask in masks {
        acc = union(&acc, mask)?;
    }
    Ok(acc)
}

/// Alpha channel of an RGBA image as an 8-bit mask.
pub fn alpha_of(image: &RgbaImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([image.get_pixel(x, y)[3]])
    })
}

/// Reject masks whose nonzero pixels are more than 1% fractional.
pub fn validate_binary(name: &str, mask: &GrayImage) -> Result<()> {
    let mut nonzero = 0usize;
    let mut fractional = 0usize;
    for px in mask.pixels() {
        match px[0] {
            0 => {}
            255 => nonzero += 1,
            _ => {
                nonzero += 1;
                fractional += 1;
            }
        }
    }

    if nonzero > 0 && fractional as f64 > nonzero as f64 * FRACTIONAL_TOLERANCE {
        return Err(CompositeError::NonBinaryMask {
            name: name.to_string(),
            fractional,
            nonzero,
        });
    }

    tracing::debug!(name, nonzero, fractional, "mask binarity ok");
    Ok(())
}

/// Number of nonzero pixels in a mask.
pub fn coverage(mask: &GrayImage) -> usize {
    mask.pixels().filter(|p| p[0] > 0).count()
}

fn zip_with(
    a: &GrayImage,
    b: &GrayImage,
    what: &str,
    op: impl Fn(u8, u8) -> u8,
) -> Result<GrayImage> {
    ensure_same_size(what, a.dimensions(), b.dimensions())?;
    let mut out = a.clone();
    for (dst, src) in out.pixels_mut().zip(b.pixels()) {
        dst[0] = op(dst[0], src[0]);
    }
    Ok(out)
}
