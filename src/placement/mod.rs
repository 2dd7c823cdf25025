//! Random size, position and rotation of the person on a background.
//!
//! One [`PlacementTransform`] is sampled per composite and applied to every
//! layer that must stay aligned: color, each mask and depth.

mod warp;

pub use warp::{resize, rotate, Interpolation, Rotatable};

use crate::compose::ClothedPerson;
use crate::error::{CompositeError, Result};
use crate::layers::{FloatMap, FAR_DEPTH};
use image::imageops;
use image::{GrayImage, Luma, RgbaImage};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Share of the person's size allowed to hang off each background edge.
pub const EDGE_OVERHANG: f32 = 0.25;

/// How placement parameters are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementMode {
    /// Independently sampled size, offset and rotation.
    #[default]
    #[serde(alias = "")]
    Random,
    /// Centered square covering the shorter background edge, unrotated.
    /// Keeps frames of one sequence spatially coherent.
    #[serde(alias = "video")]
    Fixed,
}

impl FromStr for PlacementMode {
    type Err = CompositeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "" | "random" => Ok(Self::Random),
            "video" | "fixed" => Ok(Self::Fixed),
            _ => Err(CompositeError::UnknownName {
                kind: "placement type",
                name: s.to_string(),
                expected: "'' (random), video",
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementConfig {
    /// Smallest side, as a fraction of the shorter background edge.
    pub scale_min: f32,
    /// Largest side, as a fraction of the longer background edge.
    pub scale_max: f32,
    pub rotate_min: f32,
    pub rotate_max: f32,
    pub mode: PlacementMode,
    /// Resampling for the color layer. Masks and depth are always nearest.
    pub color_interpolation: Interpolation,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            scale_min: 0.15,
            scale_max: 2.0,
            rotate_min: -180.0,
            rotate_max: 180.0,
            mode: PlacementMode::Random,
            color_interpolation: Interpolation::Nearest,
        }
    }
}

impl PlacementConfig {
    /// Narrower scale range and smoother color used when compositing
    /// behind real-world occluders.
    pub fn occlusion() -> Self {
        Self {
            scale_min: 0.1,
            scale_max: 1.1,
            color_interpolation: Interpolation::Bilinear,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.scale_min > 0.0 && self.scale_min <= self.scale_max) {
            return Err(CompositeError::invalid(format!(
                "scale range [{}, {}] is empty or non-positive",
                self.scale_min, self.scale_max
            )));
        }
        if self.rotate_min > self.rotate_max {
            return Err(CompositeError::invalid(format!(
                "rotation range [{}, {}] is empty",
                self.rotate_min, self.rotate_max
            )));
        }
        Ok(())
    }
}

/// Where and how the person layer lands on the background.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlacementTransform {
    /// Side of the resized (square) person.
    pub size: u32,
    /// Counter-clockwise rotation in degrees.
    pub rotation: f32,
    /// Upper-left corner of the resized person; may be negative.
    pub offset: (i64, i64),
    pub background: (u32, u32),
}

impl PlacementTransform {
    pub fn sample<R: Rng + ?Sized>(
        person: (u32, u32),
        background: (u32, u32),
        config: &PlacementConfig,
        rng: &mut R,
    ) -> Result<Self> {
        if person.0 != person.1 {
            return Err(CompositeError::NonSquarePerson {
                width: person.0,
                height: person.1,
            });
        }
        let (bg_w, bg_h) = background;
        if bg_w == 0 || bg_h == 0 {
            return Err(CompositeError::invalid("background has no pixels"));
        }
        config.validate()?;

        let transform = match config.mode {
            PlacementMode::Fixed => {
                let size = bg_w.min(bg_h);
                Self {
                    size,
                    rotation: 0.0,
                    offset: centered_offset(size, background),
                    background,
                }
            }
            PlacementMode::Random => {
                let lo = config.scale_min * bg_w.min(bg_h) as f32;
                let hi = config.scale_max * bg_w.max(bg_h) as f32;
                let size = (uniform(rng, lo, hi) as u32).max(1);
                let s = size as f32;
                let x = uniform(rng, -s * EDGE_OVERHANG, bg_w as f32 - s * (1.0 - EDGE_OVERHANG));
                let y = uniform(rng, -s * EDGE_OVERHANG, bg_h as f32 - s * (1.0 - EDGE_OVERHANG));
                Self {
                    size,
                    rotation: uniform(rng, config.rotate_min, config.rotate_max),
                    offset: (x as i64, y as i64),
                    background,
                }
            }
        };

        tracing::debug!(
            size = transform.size,
            rotation = transform.rotation,
            x = transform.offset.0,
            y = transform.offset.1,
            "placement sampled"
        );
        Ok(transform)
    }

    /// Resize, rotate and paste a color layer onto a transparent canvas.
    pub fn place_rgba(&self, image: &RgbaImage, interpolation: Interpolation) -> RgbaImage {
        let moved = rotate(
            &resize(image, self.size, self.size, interpolation),
            self.rotation,
            interpolation,
        );
        let mut canvas = RgbaImage::new(self.background.0, self.background.1);
        imageops::replace(&mut canvas, &moved, self.offset.0, self.offset.1);
        canvas
    }

    /// Place a mask with nearest-neighbour sampling so labels stay exact.
    pub fn place_mask(&self, mask: &GrayImage) -> GrayImage {
        let moved = rotate(
            &resize(mask, self.size, self.size, Interpolation::Nearest),
            self.rotation,
            Interpolation::Nearest,
        );
        let mut canvas = GrayImage::new(self.background.0, self.background.1);
        imageops::replace(&mut canvas, &moved, self.offset.0, self.offset.1);
        canvas
    }

    /// Place a depth map. Pixels exposed by rotation and everything outside
    /// the person read as [`FAR_DEPTH`].
    pub fn place_depth(&self, depth: &FloatMap) -> FloatMap {
        let mut moved = rotate(
            &resize(depth, self.size, self.size, Interpolation::Nearest),
            self.rotation,
            Interpolation::Nearest,
        );
        for px in moved.pixels_mut() {
            if px[0] == 0.0 {
                px[0] = FAR_DEPTH;
            }
        }
        let mut canvas = FloatMap::from_pixel(self.background.0, self.background.1, Luma([FAR_DEPTH]));
        imageops::replace(&mut canvas, &moved, self.offset.0, self.offset.1);
        canvas
    }
}

/// The person and every side channel, placed on a background-sized canvas.
#[derive(Debug, Clone)]
pub struct PlacedPerson {
    pub image: RgbaImage,
    pub clothes: GrayImage,
    pub head: GrayImage,
    pub body: GrayImage,
    pub depth: Option<FloatMap>,
    pub transform: PlacementTransform,
}

/// Sample one transform and apply it to the person, its masks and depth.
pub fn place_person<R: Rng + ?Sized>(
    person: &ClothedPerson,
    depth: Option<&FloatMap>,
    background: (u32, u32),
    config: &PlacementConfig,
    rng: &mut R,
) -> Result<PlacedPerson> {
    let _span = tracing::debug_span!("place_person").entered();
    let transform = PlacementTransform::sample(person.image.dimensions(), background, config, rng)?;

    Ok(PlacedPerson {
        image: transform.place_rgba(&person.image, config.color_interpolation),
        clothes: transform.place_mask(&person.clothes),
        head: transform.place_mask(&person.head),
        body: transform.place_mask(&person.body),
        depth: depth.map(|d| transform.place_depth(d)),
        transform,
    })
}

fn centered_offset(size: u32, (bg_w, bg_h): (u32, u32)) -> (i64, i64) {
    let x = bg_w.saturating_sub(size) / 2;
    let y = bg_h.saturating_sub(size) / 2;
    (x as i64, y as i64)
}

/// Uniform draw between two bounds given in either order.
fn uniform<R: Rng + ?Sized>(rng: &mut R, a: f32, b: f32) -> f32 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if lo == hi {
        lo
    } else {
        rng.gen_range(lo..hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn fixed_mode_ignores_the_seed() {
        let config = PlacementConfig {
            mode: PlacementMode::Fixed,
            ..PlacementConfig::default()
        };
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let t = PlacementTransform::sample((512, 512), (1024, 768), &config, &mut rng).unwrap();
            assert_eq!(t.size, 768);
            assert_eq!(t.rotation, 0.0);
            assert_eq!(t.offset, (128, 0));
        }
    }

    #[test]
    fn random_mode_respects_ranges() {
        let config = PlacementConfig::default();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let t = PlacementTransform::sample((64, 64), (400, 300), &config, &mut rng).unwrap();
            assert!(t.size as f32 >= 0.15 * 300.0 - 1.0 && t.size as f32 <= 800.0);
            assert!((-180.0..=180.0).contains(&t.rotation));

            // the person box always overlaps the canvas
            let s = t.size as i64;
            assert!(t.offset.0 < 400 && t.offset.0 + s > 0);
            assert!(t.offset.1 < 300 && t.offset.1 + s > 0);
        }
    }

    #[test]
    fn non_square_person_is_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let err = PlacementTransform::sample((64, 32), (100, 100), &PlacementConfig::default(), &mut rng)
            .unwrap_err();
        assert!(matches!(err, CompositeError::NonSquarePerson { .. }));
    }

    #[test]
    fn mask_lands_at_offset() {
        let t = PlacementTransform {
            size: 4,
            rotation: 0.0,
            offset: (3, 2),
            background: (10, 8),
        };
        let mut mask = GrayImage::new(4, 4);
        mask.put_pixel(1, 1, Luma([255]));
        let placed = t.place_mask(&mask);
        assert_eq!(placed.dimensions(), (10, 8));
        assert_eq!(placed.get_pixel(4, 3)[0], 255);
        assert_eq!(placed.pixels().filter(|p| p[0] > 0).count(), 1);
    }

    #[test]
    fn partially_off_canvas_paste_is_clipped() {
        let t = PlacementTransform {
            size: 4,
            rotation: 0.0,
            offset: (-2, -1),
            background: (6, 6),
        };
        let placed = t.place_mask(&GrayImage::from_pixel(4, 4, Luma([255])));
        assert_eq!(placed.pixels().filter(|p| p[0] > 0).count(), 2 * 3);
        assert_eq!(placed.get_pixel(0, 0)[0], 255);
        assert_eq!(placed.get_pixel(2, 0)[0], 0);
    }

    #[test]
    fn rotated_depth_has_no_zero_holes() {
        let t = PlacementTransform {
            size: 8,
            rotation: 30.0,
            offset: (1, 1),
            background: (12, 12),
        };
        let placed = t.place_depth(&FloatMap::from_pixel(8, 8, Luma([3.5])));
        assert!(placed.pixels().all(|p| p[0] == 3.5 || p[0] == FAR_DEPTH));
        assert_eq!(placed.get_pixel(0, 0)[0], FAR_DEPTH);
        assert_eq!(placed.get_pixel(5, 5)[0], 3.5);
    }

    #[test]
    fn video_type_parses() {
        assert_eq!("video".parse::<PlacementMode>().unwrap(), PlacementMode::Fixed);
        assert_eq!("".parse::<PlacementMode>().unwrap(), PlacementMode::Random);
        assert!("panorama".parse::<PlacementMode>().is_err());
    }
}
