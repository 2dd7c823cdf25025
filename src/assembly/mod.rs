//! Final assembly: foreground over background, noise, crop, and the
//! outputs of one composite.

mod crop;
mod seed;
mod sink;

pub use crop::CropBox;
pub use seed::{rng_from_seed, seed_value};
pub use sink::{CompositeResult, CompositeSink, DirectorySink, PartOutputs};

use crate::compose::{alpha_composite, make_clothed_person, ClothingStyle};
use crate::error::{CompositeError, Result};
use crate::layers::{FloatMap, LayerSet, FAR_DEPTH};
use crate::mask;
use crate::matching::{match_background, MatchingMethod};
use crate::placement::{place_person, PlacedPerson, PlacementConfig, PlacementTransform};
use image::{DynamicImage, GrayImage, RgbaImage};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Where multiplicative noise is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseTarget {
    #[default]
    #[serde(alias = "")]
    None,
    /// The matched foreground only.
    Foreground,
    /// The whole composite.
    All,
}

impl FromStr for NoiseTarget {
    type Err = CompositeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "" | "none" => Ok(Self::None),
            "foreground" => Ok(Self::Foreground),
            "all" => Ok(Self::All),
            _ => Err(CompositeError::UnknownName {
                kind: "noise type",
                name: s.to_string(),
                expected: "'', foreground, all",
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssemblyConfig {
    pub crop_factor: f32,
    /// Standard deviation of the crop offset, as a share of the slack.
    pub crop_stddev: f32,
    pub noise: NoiseTarget,
    pub noise_mean: f32,
    pub noise_stddev: f32,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            crop_factor: 0.99,
            crop_stddev: 0.14,
            noise: NoiseTarget::None,
            noise_mean: 0.9,
            noise_stddev: 0.1,
        }
    }
}

impl AssemblyConfig {
    pub fn validate(&self) -> Result<()> {
        check_stddev("crop offset", self.crop_stddev)?;
        check_stddev("noise", self.noise_stddev)?;
        if !(self.crop_factor > 0.0 && self.crop_factor <= 1.0) {
            return Err(CompositeError::invalid(format!(
                "crop factor {} outside (0, 1]",
                self.crop_factor
            )));
        }
        Ok(())
    }
}

/// `Normal::new` accepts negative deviations; NaN slips through comparisons.
pub(crate) fn check_stddev(what: &str, stddev: f32) -> Result<()> {
    if stddev >= 0.0 && stddev.is_finite() {
        Ok(())
    } else {
        Err(CompositeError::invalid(format!(
            "{what} standard deviation {stddev} must be finite and non-negative"
        )))
    }
}

/// Multiply every color channel of every pixel by its own Gaussian draw.
/// Alpha is left alone.
pub fn mult_by_noise<R: Rng + ?Sized>(
    image: &RgbaImage,
    mean: f32,
    stddev: f32,
    rng: &mut R,
) -> Result<RgbaImage> {
    check_stddev("noise", stddev)?;
    let noise = Normal::new(mean, stddev)
        .map_err(|e| CompositeError::invalid(format!("noise distribution: {e}")))?;
    let mut out = image.clone();
    for px in out.pixels_mut() {
        for c in 0..3 {
            let v = px[c] as f32 * noise.sample(rng);
            px[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(out)
}

/// Default id: `simulant_` and the local time down to the microsecond.
pub fn composite_id() -> String {
    format!("simulant_{}", chrono::Local::now().format("%Y%m%d%H%M%S%6f"))
}

/// Mean depth under `mask`, ignoring background and empty pixels.
pub fn person_distance(depth: &FloatMap, mask: &GrayImage) -> Option<f32> {
    let (sum, count) = depth
        .pixels()
        .zip(mask.pixels())
        .filter(|(d, m)| m[0] > 0 && d[0] > 0.0 && d[0] < FAR_DEPTH)
        .fold((0f64, 0usize), |(sum, n), (d, _)| (sum + d[0] as f64, n + 1));
    (count > 0).then(|| (sum / count as f64) as f32)
}

/// What was done to produce one composite, stored next to it as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct CompositeMeta {
    pub comp_id: String,
    pub matching_method: MatchingMethod,
    pub noise: NoiseTarget,
    pub placement: PlacementTransform,
    pub crop: Option<CropBox>,
    pub person_distance: Option<f32>,
    pub occluded: bool,
}

/// Inputs for one synthetic composite.
#[derive(Debug, Clone)]
pub struct CompositeRequest<'a> {
    pub layers: &'a LayerSet,
    pub background: &'a RgbaImage,
    pub style: &'a ClothingStyle,
    pub placement: PlacementConfig,
    pub matching: MatchingMethod,
    pub assembly: AssemblyConfig,
    /// Also produce head, clothing and skin masks.
    pub save_parts: bool,
    /// Output name; a timestamped id when absent.
    pub id: Option<String>,
}

/// Clothe, place and color-match the person for `background`.
pub fn build_foreground<R: Rng + ?Sized>(
    layers: &LayerSet,
    background: &RgbaImage,
    style: &ClothingStyle,
    placement: &PlacementConfig,
    matching: MatchingMethod,
    rng: &mut R,
) -> Result<PlacedPerson> {
    let person = make_clothed_person(layers, style, rng)?;
    let mut placed = place_person(
        &person,
        layers.depth.as_ref(),
        background.dimensions(),
        placement,
        rng,
    )?;
    let bg_rgb = DynamicImage::ImageRgba8(background.clone()).to_rgb8();
    placed.image = match_background(&placed.image, &bg_rgb, matching)?;
    Ok(placed)
}

/// Run the whole compositing pipeline for one request.
pub fn run_composite<R: Rng + ?Sized>(
    request: &CompositeRequest<'_>,
    rng: &mut R,
) -> Result<CompositeResult> {
    let config = &request.assembly;
    config.validate()?;
    let comp_id = request.id.clone().unwrap_or_else(composite_id);
    let _span = tracing::debug_span!("composite", id = %comp_id).entered();

    let placed = build_foreground(
        request.layers,
        request.background,
        request.style,
        &request.placement,
        request.matching,
        rng,
    )?;

    let mut foreground = placed.image;
    if config.noise == NoiseTarget::Foreground {
        foreground = mult_by_noise(&foreground, config.noise_mean, config.noise_stddev, rng)?;
    }
    let mut image = alpha_composite(request.background, &foreground)?;
    if config.noise == NoiseTarget::All {
        image = mult_by_noise(&image, config.noise_mean, config.noise_stddev, rng)?;
    }
    let mask = mask::alpha_of(&foreground);

    let mut sizes = vec![("image", image.dimensions()), ("mask", mask.dimensions())];
    if request.save_parts {
        sizes.extend([
            ("head", placed.head.dimensions()),
            ("clothes", placed.clothes.dimensions()),
            ("body", placed.body.dimensions()),
        ]);
    }
    if let Some(depth) = &placed.depth {
        sizes.push(("depth", depth.dimensions()));
    }
    let crop = {
        let _span = tracing::debug_span!("crop").entered();
        CropBox::sample(&sizes, config.crop_factor, config.crop_stddev, rng)?
    };

    let image = crop.apply(&image)?;
    let mask = crop.apply(&mask)?;
    let parts = if request.save_parts {
        Some(PartOutputs {
            head: crop.apply(&placed.head)?,
            clothes: crop.apply(&placed.clothes)?,
            body: crop.apply(&placed.body)?,
        })
    } else {
        None
    };
    let depth = placed.depth.as_ref().map(|d| crop.apply(d)).transpose()?;
    let distance = depth.as_ref().and_then(|d| person_distance(d, &mask));

    tracing::info!(
        id = %comp_id,
        method = %request.matching,
        coverage = mask::coverage(&mask),
        distance = ?distance,
        "composite assembled"
    );

    Ok(CompositeResult {
        image,
        mask,
        parts,
        depth,
        occlusion: None,
        meta: CompositeMeta {
            comp_id,
            matching_method: request.matching,
            noise: config.noise,
            placement: placed.transform,
            crop: Some(crop),
            person_distance: distance,
            occluded: false,
        },
    })
}
