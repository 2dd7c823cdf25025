//! Pixel blending primitives over straight (non-premultiplied) RGBA.

use crate::error::{ensure_same_size, CompositeError, Result};
use image::{GrayImage, Rgba, RgbaImage};

/// Porter-Duff "over": `top` composited onto `bottom`.
pub fn alpha_composite(bottom: &RgbaImage, top: &RgbaImage) -> Result<RgbaImage> {
    ensure_same_size("alpha composite", bottom.dimensions(), top.dimensions())?;
    let mut out = bottom.clone();
    for (dst, src) in out.pixels_mut().zip(top.pixels()) {
        *dst = over(*dst, *src);
    }
    Ok(out)
}

fn over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = src[3] as f32 / 255.0;
    if sa >= 1.0 {
        return src;
    }
    let da = dst[3] as f32 / 255.0;
    let oa = sa + da * (1.0 - sa);
    if oa <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let v = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / oa;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (oa * 255.0).round() as u8;
    Rgba(out)
}

/// Channel-wise multiply of two images, alpha included.
pub fn multiply(a: &RgbaImage, b: &RgbaImage) -> Result<RgbaImage> {
    ensure_same_size("multiply", a.dimensions(), b.dimensions())?;
    let mut out = a.clone();
    for (dst, src) in out.pixels_mut().zip(b.pixels()) {
        for c in 0..4 {
            dst[c] = ((dst[c] as u16 * src[c] as u16) / 255) as u8;
        }
    }
    Ok(out)
}

/// Copy of `image` whose alpha channel is replaced by `alpha`.
pub fn with_alpha(image: &RgbaImage, alpha: &GrayImage) -> Result<RgbaImage> {
    ensure_same_size("alpha replacement", image.dimensions(), alpha.dimensions())?;
    let mut out = image.clone();
    for (px, a) in out.pixels_mut().zip(alpha.pixels()) {
        px[3] = a[0];
    }
    Ok(out)
}

/// Multiply a render by a color (or texture) block and keep only the area
/// under `mask`.
pub fn combine_with_color(
    render: &RgbaImage,
    mask: &GrayImage,
    color: &RgbaImage,
) -> Result<RgbaImage> {
    with_alpha(&multiply(render, color)?, mask)
}

/// Overlay-style blend used to lay ambient occlusion over the colored
/// person at partial opacity.
///
/// Per pixel, with all values scaled to `[0, 1]`:
///
/// ```text
/// comp_alpha = min(base.a, overlay.a) * opacity
/// new_alpha  = base.a + (1 - base.a) * comp_alpha
/// ratio      = comp_alpha / new_alpha            (0 when undefined)
/// blended    = base * (base + 2 * overlay * (1 - base))
/// out.rgb    = blended * ratio + base * (1 - ratio)
/// out.a      = base.a
/// ```
pub fn blend_overlay(base: &RgbaImage, overlay: &RgbaImage, opacity: f32) -> Result<RgbaImage> {
    ensure_same_size("overlay blend", base.dimensions(), overlay.dimensions())?;
    if !(0.0..=1.0).contains(&opacity) {
        return Err(CompositeError::invalid(format!(
            "overlay opacity {opacity} outside [0, 1]"
        )));
    }

    let mut out = base.clone();
    for (px, ov) in out.pixels_mut().zip(overlay.pixels()) {
        let base_a = px[3] as f32 / 255.0;
        let over_a = ov[3] as f32 / 255.0;
        let comp_alpha = base_a.min(over_a) * opacity;
        let new_alpha = base_a + (1.0 - base_a) * comp_alpha;
        let ratio = comp_alpha / new_alpha;
        let ratio = if ratio.is_finite() { ratio } else { 0.0 };

        for c in 0..3 {
            let b = px[c] as f32 / 255.0;
            let o = ov[c] as f32 / 255.0;
            let blended = b * (b + 2.0 * o * (1.0 - b));
            let v = blended * ratio + b * (1.0 - ratio);
            let v = if v.is_finite() { v } else { 0.0 };
            px[c] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_top_replaces_bottom() {
        let bottom = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255]));
        let top = RgbaImage::from_pixel(2, 2, Rgba([200, 100, 50, 255]));
        let out = alpha_composite(&bottom, &top).unwrap();
        assert_eq!(*out.get_pixel(1, 1), Rgba([200, 100, 50, 255]));
    }

    #[test]
    fn transparent_top_keeps_bottom() {
        let bottom = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255]));
        let top = RgbaImage::from_pixel(2, 2, Rgba([200, 100, 50, 0]));
        let out = alpha_composite(&bottom, &top).unwrap();
        assert_eq!(*out.get_pixel(0, 0), Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn half_alpha_over_opaque_mixes() {
        let bottom = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255]));
        let top = RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 128]));
        let out = alpha_composite(&bottom, &top).unwrap();
        let p = out.get_pixel(0, 0);
        assert_eq!(p[3], 255);
        assert!((p[0] as i32 - 128).abs() <= 1);
    }

    #[test]
    fn both_transparent_stays_transparent() {
        let empty = RgbaImage::new(1, 1);
        let out = alpha_composite(&empty, &empty).unwrap();
        assert_eq!(*out.get_pixel(0, 0), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn multiply_by_white_is_identity() {
        let a = RgbaImage::from_pixel(2, 1, Rgba([12, 130, 250, 255]));
        let white = RgbaImage::from_pixel(2, 1, Rgba([255, 255, 255, 255]));
        assert_eq!(multiply(&a, &white).unwrap(), a);
    }

    #[test]
    fn overlay_with_transparent_base_is_untouched_and_finite() {
        let base = RgbaImage::from_pixel(2, 2, Rgba([90, 40, 10, 0]));
        let ao = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        let out = blend_overlay(&base, &ao, 0.85).unwrap();
        assert_eq!(*out.get_pixel(0, 0), Rgba([90, 40, 10, 0]));
    }

    #[test]
    fn overlay_darkens_with_black_occlusion() {
        let base = RgbaImage::from_pixel(1, 1, Rgba([200, 200, 200, 255]));
        let ao = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255]));
        let out = blend_overlay(&base, &ao, 0.85).unwrap();
        assert!(out.get_pixel(0, 0)[0] < 200);
        assert_eq!(out.get_pixel(0, 0)[3], 255);
    }

    #[test]
    fn overlay_rejects_bad_opacity() {
        let img = RgbaImage::new(1, 1);
        assert!(blend_overlay(&img, &img, 1.5).is_err());
    }
}
