use super::check_stddev;
use crate::error::{ensure_same_size, CompositeError, Result};
use image::{imageops, ImageBuffer, Pixel};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;

/// A crop window shared by every output of one composite so the image,
/// masks and depth stay aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Size of the images this box was sampled for.
    #[serde(skip)]
    pub source: (u32, u32),
}

impl CropBox {
    /// Sample a `factor`-sized window whose offset is a clipped Gaussian
    /// around the center (simulated handheld jitter).
    ///
    /// Every entry of `sizes` must be identical.
    pub fn sample<R: Rng + ?Sized>(
        sizes: &[(&str, (u32, u32))],
        factor: f32,
        stddev: f32,
        rng: &mut R,
    ) -> Result<Self> {
        let Some(&(_, source)) = sizes.first() else {
            return Err(CompositeError::invalid("nothing to crop"));
        };
        for &(name, size) in &sizes[1..] {
            ensure_same_size(&format!("crop input '{name}'"), source, size)?;
        }
        if !(factor > 0.0 && factor <= 1.0) {
            return Err(CompositeError::invalid(format!(
                "crop factor {factor} outside (0, 1]"
            )));
        }

        let (width, height) = source;
        let crop_w = (factor * width as f32) as u32;
        let crop_h = (factor * height as f32) as u32;
        if crop_w == 0 || crop_h == 0 {
            return Err(CompositeError::EmptyCrop {
                factor,
                width,
                height,
            });
        }

        check_stddev("crop offset", stddev)?;
        let jitter = Normal::new(0.5f32, stddev)
            .map_err(|e| CompositeError::invalid(format!("crop jitter: {e}")))?;
        // rows first, then columns
        let fy = jitter.sample(rng).clamp(0.0, 1.0);
        let fx = jitter.sample(rng).clamp(0.0, 1.0);
        let x = (fx * (width - crop_w) as f32).round() as u32;
        let y = (fy * (height - crop_h) as f32).round() as u32;

        let crop = Self {
            x,
            y,
            width: crop_w,
            height: crop_h,
            source,
        };
        tracing::debug!(x, y, width = crop_w, height = crop_h, "crop box sampled");
        Ok(crop)
    }

    /// Cut this window out of an image of the size it was sampled for.
    pub fn apply<P>(&self, image: &ImageBuffer<P, Vec<P::Subpixel>>) -> Result<ImageBuffer<P, Vec<P::Subpixel>>>
    where
        P: Pixel + 'static,
    {
        ensure_same_size("cropped image", self.source, image.dimensions())?;
        Ok(imageops::crop_imm(image, self.x, self.y, self.width, self.height).to_image())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::FloatMap;
    use image::{GrayImage, RgbaImage};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn every_output_gets_the_same_smaller_size() {
        let mut rng = StdRng::seed_from_u64(11);
        let rgba = RgbaImage::new(1024, 768);
        let mask = GrayImage::new(1024, 768);
        let depth = FloatMap::new(1024, 768);
        let crop = CropBox::sample(
            &[
                ("image", rgba.dimensions()),
                ("mask", mask.dimensions()),
                ("depth", depth.dimensions()),
            ],
            0.99,
            0.14,
            &mut rng,
        )
        .unwrap();

        let a = crop.apply(&rgba).unwrap();
        let b = crop.apply(&mask).unwrap();
        let c = crop.apply(&depth).unwrap();
        assert_eq!(a.dimensions(), (1013, 760));
        assert_eq!(a.dimensions(), b.dimensions());
        assert_eq!(b.dimensions(), c.dimensions());
        assert!(crop.x + crop.width <= 1024 && crop.y + crop.height <= 768);
    }

    #[test]
    fn mismatched_inputs_are_fatal() {
        let mut rng = StdRng::seed_from_u64(0);
        let err = CropBox::sample(&[("image", (10, 10)), ("mask", (10, 9))], 0.99, 0.14, &mut rng)
            .unwrap_err();
        assert!(matches!(err, CompositeError::DimensionMismatch { .. }));
    }

    #[test]
    fn tiny_images_yield_empty_crop_error() {
        let mut rng = StdRng::seed_from_u64(0);
        let err = CropBox::sample(&[("image", (1, 1))], 0.99, 0.14, &mut rng).unwrap_err();
        assert!(matches!(err, CompositeError::EmptyCrop { .. }));
    }

    #[test]
    fn negative_jitter_is_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let err = CropBox::sample(&[("image", (100, 100))], 0.99, -0.5, &mut rng).unwrap_err();
        assert!(matches!(err, CompositeError::InvalidParameter(_)));
    }

    #[test]
    fn crop_keeps_pixel_alignment() {
        let mut rng = StdRng::seed_from_u64(3);
        let image = GrayImage::from_fn(50, 40, |x, y| image::Luma([(x + y) as u8]));
        let crop = CropBox::sample(&[("image", (50, 40))], 0.9, 0.14, &mut rng).unwrap();
        let out = crop.apply(&image).unwrap();
        assert_eq!(out.get_pixel(0, 0)[0], (crop.x + crop.y) as u8);
    }
}
