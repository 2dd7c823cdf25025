//! Compositing a synthetic person behind real objects of the background.
//!
//! An occluder is a mask of things on the background image that should sit
//! in front of the person. The background cut out by that mask is laid back
//! over the person, and every ground-truth mask loses the hidden area.

use crate::assembly::{
    build_foreground, composite_id, person_distance, CompositeMeta, CompositeResult, NoiseTarget,
    PartOutputs,
};
use crate::compose::{alpha_composite, ClothingStyle};
use crate::error::{ensure_same_size, CompositeError, Result};
use crate::layers::{list_files, load_mask, FloatMap, LayerSet, LayerSource};
use crate::mask;
use crate::matching::MatchingMethod;
use crate::placement::PlacementConfig;
use image::{GrayImage, Luma, RgbaImage};
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::{Path, PathBuf};

/// Real-world objects in front of the person.
#[derive(Debug, Clone)]
pub struct Occluder {
    /// 0/255 coverage of the occluding objects.
    pub mask: GrayImage,
    /// The background visible through `mask`, transparent elsewhere.
    pub layer: RgbaImage,
}

impl Occluder {
    pub fn new(background: &RgbaImage, objects: &GrayImage) -> Result<Self> {
        ensure_same_size("occluder mask", background.dimensions(), objects.dimensions())?;
        let mut layer = background.clone();
        for (px, m) in layer.pixels_mut().zip(objects.pixels()) {
            let m = m[0] as u16;
            for c in px.0.iter_mut() {
                *c = ((*c as u16 * m + 127) / 255) as u8;
            }
        }
        let mask = mask::alpha_of(&layer);
        Ok(Self { mask, layer })
    }

    /// Occluder from an instance mask file whose values are object labels
    /// or counts; anything nonzero occludes.
    pub fn from_file(background: &RgbaImage, path: &Path) -> Result<Self> {
        Self::new(background, &instance_mask(&load_mask(path)?))
    }
}

/// Collapse a sum of instance masks to a 0/255 mask (`min(1, v) * 255`).
pub fn instance_mask(values: &GrayImage) -> GrayImage {
    GrayImage::from_fn(values.width(), values.height(), |x, y| {
        Luma([values.get_pixel(x, y)[0].min(1) * 255])
    })
}

/// Remove the occluded area from a part mask.
pub fn cut_occluded(part: &GrayImage, occluder: &GrayImage) -> Result<GrayImage> {
    mask::intersect_or_cut(&mask::invert(occluder), part)
}

/// Zero depth wherever the occluder covers the person.
pub fn masked_depth(depth: &FloatMap, occluder: &GrayImage) -> Result<FloatMap> {
    ensure_same_size("occluded depth", depth.dimensions(), occluder.dimensions())?;
    let mut out = depth.clone();
    for (d, m) in out.pixels_mut().zip(occluder.pixels()) {
        if m[0] > 0 {
            d[0] = 0.0;
        }
    }
    Ok(out)
}

/// Background, then the person, then the occluding objects on top.
pub fn composite_occluded(
    background: &RgbaImage,
    person: &RgbaImage,
    occluder: &Occluder,
) -> Result<RgbaImage> {
    let top_two = alpha_composite(person, &occluder.layer)?;
    alpha_composite(background, &top_two)
}

/// Inputs for one occlusion-aware composite.
#[derive(Debug, Clone)]
pub struct OcclusionRequest<'a> {
    pub layers: &'a LayerSet,
    pub background: &'a RgbaImage,
    pub occluder: &'a Occluder,
    pub style: &'a ClothingStyle,
    pub placement: PlacementConfig,
    pub matching: MatchingMethod,
    pub id: Option<String>,
}

/// Composite a person behind the occluder. No crop and no noise; the part
/// masks and depth only keep what stays visible.
pub fn run_occlusion<R: Rng + ?Sized>(
    request: &OcclusionRequest<'_>,
    rng: &mut R,
) -> Result<CompositeResult> {
    let comp_id = request.id.clone().unwrap_or_else(composite_id);
    let _span = tracing::debug_span!("occlusion", id = %comp_id).entered();
    let occ = &request.occluder.mask;
    ensure_same_size(
        "occluder",
        request.background.dimensions(),
        occ.dimensions(),
    )?;

    let placed = build_foreground(
        request.layers,
        request.background,
        request.style,
        &request.placement,
        request.matching,
        rng,
    )?;

    let person_mask = cut_occluded(&mask::alpha_of(&placed.image), occ)?;
    let parts = PartOutputs {
        head: cut_occluded(&placed.head, occ)?,
        clothes: cut_occluded(&placed.clothes, occ)?,
        body: cut_occluded(&placed.body, occ)?,
    };
    let depth = placed
        .depth
        .as_ref()
        .map(|d| masked_depth(d, occ))
        .transpose()?;
    let image = composite_occluded(request.background, &placed.image, request.occluder)?;
    let distance = depth.as_ref().and_then(|d| person_distance(d, &person_mask));

    tracing::info!(
        id = %comp_id,
        visible = mask::coverage(&person_mask),
        occluder = mask::coverage(occ),
        "occluded composite assembled"
    );

    Ok(CompositeResult {
        image,
        mask: person_mask,
        parts: Some(parts),
        depth,
        occlusion: Some(request.occluder.layer.clone()),
        meta: CompositeMeta {
            comp_id,
            matching_method: request.matching,
            noise: NoiseTarget::None,
            placement: placed.transform,
            crop: None,
            person_distance: distance,
            occluded: true,
        },
    })
}

/// Uniformly pick one element.
pub fn pick<'a, T, R: Rng + ?Sized>(items: &'a [T], what: &str, rng: &mut R) -> Result<&'a T> {
    items
        .choose(rng)
        .ok_or_else(|| CompositeError::invalid(format!("no {what} to choose from")))
}

/// A random render id from a layer source.
pub fn random_render_id<S, R>(source: &S, rng: &mut R) -> Result<String>
where
    S: LayerSource + ?Sized,
    R: Rng + ?Sized,
{
    let ids = source.ids()?;
    pick(&ids, "renders", rng).cloned()
}

/// A random file with the given extension from `dir`.
pub fn random_file<R: Rng + ?Sized>(dir: &Path, extension: &str, rng: &mut R) -> Result<PathBuf> {
    let files = list_files(dir, extension)?;
    pick(&files, &format!("*.{extension} files in {}", dir.display()), rng).cloned()
}
