//! Randomised colors for skin, hair and clothing regions.

use super::space::{hsv_to_rgb, rgb_to_hsv};
use image::{GrayImage, Rgba, RgbaImage};
use rand::Rng;

/// Skin tone anchors, one per emoji skin-tone group.
pub const SKIN_TONES: [[u8; 3]; 5] = [
    [254, 215, 196],
    [223, 175, 145],
    [225, 164, 111],
    [148, 70, 32],
    [72, 33, 6],
];

/// Maximum hue shift applied to a skin tone anchor.
pub const SKIN_HUE_JITTER: f32 = 0.1;

/// Shift the hue of a skin tone by a uniform offset in `[-0.1, 0.1]`.
pub fn jitter_skin<R: Rng + ?Sized>(tone: [u8; 3], rng: &mut R) -> [u8; 3] {
    let [h, s, v] = rgb_to_hsv(tone.map(|c| c as f32 / 255.0));
    let shifted = h + rng.gen_range(-SKIN_HUE_JITTER..=SKIN_HUE_JITTER);
    to_u8(hsv_to_rgb([shifted, s, v]))
}

/// Random HSV color with value drawn from `[min_v, max_v]`.
pub fn random_hsv_color<R: Rng + ?Sized>(min_v: f32, max_v: f32, rng: &mut R) -> [u8; 3] {
    let h = rng.gen_range(0.0..=1.0);
    let s = rng.gen_range(0.0..=1.0);
    let v = if max_v > min_v {
        rng.gen_range(min_v..=max_v)
    } else {
        min_v
    };
    to_u8(hsv_to_rgb([h, s, v]))
}

/// Flat opaque block of one color.
pub fn flat_block(width: u32, height: u32, rgb: [u8; 3]) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba([rgb[0], rgb[1], rgb[2], 255]))
}

/// Flat block of a randomly chosen, hue-jittered skin tone.
pub fn skin_block<R: Rng + ?Sized>(width: u32, height: u32, rng: &mut R) -> RgbaImage {
    let anchor = SKIN_TONES[rng.gen_range(0..SKIN_TONES.len())];
    let tone = jitter_skin(anchor, rng);
    tracing::debug!(?anchor, ?tone, "skin tone");
    flat_block(width, height, tone)
}

/// Flat block of a uniformly random HSV color.
pub fn color_block<R: Rng + ?Sized>(width: u32, height: u32, rng: &mut R) -> RgbaImage {
    flat_block(width, height, random_hsv_color(0.0, 1.0, rng))
}

/// Shade hair with a random dark-to-light gradient following the render's
/// luminance. The returned image's alpha is the hair mask.
pub fn colorize_hair<R: Rng + ?Sized>(
    render: &RgbaImage,
    hair_mask: &GrayImage,
    rng: &mut R,
) -> RgbaImage {
    let luma = autocontrast_ignoring_zero(&luminance(render));

    let mid = rng.gen_range(0.0..=1.0);
    let dark = random_hsv_color(0.0, mid, rng);
    let light = random_hsv_color(mid, 1.0, rng);
    let ramp = gradient_lut(dark, light);

    RgbaImage::from_fn(render.width(), render.height(), |x, y| {
        let [r, g, b] = ramp[luma.get_pixel(x, y)[0] as usize];
        Rgba([r, g, b, hair_mask.get_pixel(x, y)[0]])
    })
}

/// ITU-R 601-2 luma of an RGBA image.
pub fn luminance(image: &RgbaImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y);
        let l = (p[0] as u32 * 19595 + p[1] as u32 * 38470 + p[2] as u32 * 7471 + 0x8000) >> 16;
        image::Luma([l.min(255) as u8])
    })
}

/// Stretch the histogram so its darkest non-zero level maps to 0 and its
/// brightest to 255. Zero-valued (background) pixels do not count.
pub fn autocontrast_ignoring_zero(image: &GrayImage) -> GrayImage {
    let mut histogram = [0usize; 256];
    for p in image.pixels() {
        histogram[p[0] as usize] += 1;
    }
    histogram[0] = 0;

    let lo = histogram.iter().position(|&c| c > 0);
    let hi = histogram.iter().rposition(|&c| c > 0);
    let (lo, hi) = match (lo, hi) {
        (Some(lo), Some(hi)) if hi > lo => (lo as f32, hi as f32),
        _ => return image.clone(),
    };

    let scale = 255.0 / (hi - lo);
    let offset = -lo * scale;
    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        *v = (i as f32 * scale + offset).clamp(0.0, 255.0) as u8;
    }

    let mut out = image.clone();
    for p in out.pixels_mut() {
        p[0] = lut[p[0] as usize];
    }
    out
}

fn gradient_lut(dark: [u8; 3], light: [u8; 3]) -> [[u8; 3]; 256] {
    let mut lut = [[0u8; 3]; 256];
    for (i, entry) in lut.iter_mut().enumerate().take(255) {
        for c in 0..3 {
            let span = light[c] as i32 - dark[c] as i32;
            entry[c] = (dark[c] as i32 + (i as i32 * span).div_euclid(255)) as u8;
        }
    }
    lut[255] = light;
    lut
}

fn to_u8(rgb: [f32; 3]) -> [u8; 3] {
    rgb.map(|c| (c * 255.0).clamp(0.0, 255.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn skin_jitter_stays_near_anchor() {
        let mut rng = StdRng::seed_from_u64(7);
        for tone in SKIN_TONES {
            let jittered = jitter_skin(tone, &mut rng);
            let [_, s0, v0] = rgb_to_hsv(tone.map(|c| c as f32 / 255.0));
            let [_, s1, v1] = rgb_to_hsv(jittered.map(|c| c as f32 / 255.0));
            assert!((v0 - v1).abs() < 0.02, "{tone:?} -> {jittered:?}");
            assert!((s0 - s1).abs() < 0.05, "{tone:?} -> {jittered:?}");
        }
    }

    #[test]
    fn value_range_is_respected() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let rgb = random_hsv_color(0.0, 0.25, &mut rng);
            assert!(rgb.iter().all(|&c| c <= 64), "{rgb:?}");
        }
    }

    #[test]
    fn blocks_are_opaque_and_sized() {
        let mut rng = StdRng::seed_from_u64(1);
        let block = skin_block(6, 4, &mut rng);
        assert_eq!(block.dimensions(), (6, 4));
        assert!(block.pixels().all(|p| p[3] == 255));
        let first = *block.get_pixel(0, 0);
        assert!(block.pixels().all(|p| *p == first));
    }

    #[test]
    fn autocontrast_stretches_nonzero_range() {
        let mut img = GrayImage::new(4, 1);
        img.put_pixel(1, 0, image::Luma([100]));
        img.put_pixel(2, 0, image::Luma([150]));
        img.put_pixel(3, 0, image::Luma([200]));
        let out = autocontrast_ignoring_zero(&img);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(1, 0)[0], 0);
        assert_eq!(out.get_pixel(3, 0)[0], 255);
        assert!((out.get_pixel(2, 0)[0] as i32 - 127).abs() <= 1);
    }

    #[test]
    fn hair_takes_mask_as_alpha() {
        let mut rng = StdRng::seed_from_u64(11);
        let render = RgbaImage::from_fn(8, 8, |x, _| Rgba([x as u8 * 30, 80, 40, 255]));
        let mut mask = GrayImage::new(8, 8);
        mask.put_pixel(3, 3, image::Luma([255]));
        let hair = colorize_hair(&render, &mask, &mut rng);
        assert_eq!(hair.get_pixel(3, 3)[3], 255);
        assert_eq!(hair.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn gradient_endpoints() {
        let lut = gradient_lut([10, 20, 30], [200, 100, 0]);
        assert_eq!(lut[0], [10, 20, 30]);
        assert_eq!(lut[255], [200, 100, 0]);
    }
}
