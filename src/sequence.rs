//! Frame sequences: a background panned into frames, and a rendered layer
//! sequence composited over those frames with one shared seed.

use crate::assembly::{rng_from_seed, run_composite, AssemblyConfig, CompositeRequest, CompositeSink};
use crate::compose::ClothingStyle;
use crate::error::{CompositeError, Result};
use crate::layers::{load_rgba, LayerSource};
use crate::matching::MatchingMethod;
use crate::placement::{resize, Interpolation, PlacementConfig, PlacementMode};
use image::{imageops, RgbaImage};
use rand::Rng;
use std::path::{Path, PathBuf};

/// Window side as a share of the background's shorter side.
pub const PAN_WINDOW: f32 = 0.9;

/// Side of every written pan frame.
pub const PAN_FRAME_SIZE: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanDirection {
    Horizontal,
    Vertical,
    Diagonal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanMotion {
    Forward,
    /// Frames are numbered in reverse, so the sequence plays the other way.
    Backward,
}

/// A square window sliding across a background.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanPlan {
    pub window: u32,
    pub frames: usize,
    pub direction: PanDirection,
    pub motion: PanMotion,
    /// Per-frame displacement, `(dx, dy)`.
    step: (f64, f64),
}

impl PanPlan {
    pub fn new(
        (width, height): (u32, u32),
        frames: usize,
        direction: PanDirection,
        motion: PanMotion,
    ) -> Result<Self> {
        if frames == 0 {
            return Err(CompositeError::invalid("a pan needs at least one frame"));
        }
        let window = (width.min(height) as f32 * PAN_WINDOW) as u32;
        if window == 0 {
            return Err(CompositeError::invalid(format!(
                "background {width}x{height} too small to pan"
            )));
        }
        let dx = (width - window) as f64;
        let dy = (height - window) as f64;
        let (dx, dy) = match direction {
            PanDirection::Horizontal => (dx, 0.0),
            PanDirection::Vertical => (0.0, dy),
            PanDirection::Diagonal => (dx, dy),
        };
        Ok(Self {
            window,
            frames,
            direction,
            motion,
            step: (dx / frames as f64, dy / frames as f64),
        })
    }

    /// Plan with a uniformly chosen direction and motion.
    pub fn random<R: Rng + ?Sized>(size: (u32, u32), frames: usize, rng: &mut R) -> Result<Self> {
        let direction = match rng.gen_range(0..3) {
            0 => PanDirection::Horizontal,
            1 => PanDirection::Vertical,
            _ => PanDirection::Diagonal,
        };
        let motion = if rng.gen_bool(0.5) {
            PanMotion::Forward
        } else {
            PanMotion::Backward
        };
        Self::new(size, frames, direction, motion)
    }

    /// Upper-left corner of the window for the `frame`-th step.
    pub fn origin(&self, frame: usize) -> (u32, u32) {
        let x = (self.step.0 * frame as f64).round() as u32;
        let y = (self.step.1 * frame as f64).round() as u32;
        (x, y)
    }

    /// Number a step is saved under.
    pub fn output_index(&self, frame: usize) -> usize {
        match self.motion {
            PanMotion::Forward => frame,
            PanMotion::Backward => self.frames - frame - 1,
        }
    }
}

pub fn frame_name(name: &str, index: usize) -> String {
    format!("{name}_{index:04}.png")
}

/// Every frame of the pan as `(output_index, image)`, each resized
/// bicubically to `frame_size` square.
pub fn pan_frames(background: &RgbaImage, plan: &PanPlan, frame_size: u32) -> Vec<(usize, RgbaImage)> {
    (0..plan.frames)
        .map(|frame| {
            let (x, y) = plan.origin(frame);
            let window = imageops::crop_imm(background, x, y, plan.window, plan.window).to_image();
            let resized = resize(&window, frame_size, frame_size, Interpolation::Bicubic);
            (plan.output_index(frame), resized)
        })
        .collect()
}

/// Pan the image at `input` and write its frames to `out_dir`.
pub fn write_pan<R: Rng + ?Sized>(
    input: &Path,
    out_dir: &Path,
    frames: usize,
    rng: &mut R,
) -> Result<Vec<PathBuf>> {
    let background = load_rgba(input)?;
    let plan = PanPlan::random(background.dimensions(), frames, rng)?;
    let name = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "pan".to_string());
    tracing::info!(
        input = %input.display(),
        frames,
        direction = ?plan.direction,
        motion = ?plan.motion,
        "panning background"
    );

    std::fs::create_dir_all(out_dir)?;
    let mut written = Vec::with_capacity(frames);
    for (index, frame) in pan_frames(&background, &plan, PAN_FRAME_SIZE) {
        let path = out_dir.join(frame_name(&name, index));
        frame.save(&path)?;
        written.push(path);
    }
    Ok(written)
}

/// Settings shared by every frame of a video composite.
#[derive(Debug, Clone)]
pub struct VideoSettings {
    pub seed: String,
    pub matching: MatchingMethod,
    pub assembly: AssemblyConfig,
    pub style: ClothingStyle,
    pub save_parts: bool,
}

/// Composite render `ids[i]` over `backgrounds[i]` in fixed placement.
///
/// Every frame restarts the generator from the same seed, so skin, hair
/// and clothing colors stay constant across the sequence.
pub fn composite_sequence<S, K>(
    source: &S,
    ids: &[String],
    backgrounds: &[PathBuf],
    settings: &VideoSettings,
    sink: &K,
) -> Result<usize>
where
    S: LayerSource + ?Sized,
    K: CompositeSink + ?Sized,
{
    if ids.len() != backgrounds.len() {
        tracing::warn!(
            renders = ids.len(),
            backgrounds = backgrounds.len(),
            "sequence lengths differ, compositing the shorter"
        );
    }
    let placement = PlacementConfig {
        mode: PlacementMode::Fixed,
        ..PlacementConfig::default()
    };

    let mut count = 0;
    for (id, bg_path) in ids.iter().zip(backgrounds) {
        let layers = source.load(id)?;
        let background = load_rgba(bg_path)?;
        let mut rng = rng_from_seed(Some(&settings.seed));
        let request = CompositeRequest {
            layers: &layers,
            background: &background,
            style: &settings.style,
            placement,
            matching: settings.matching,
            assembly: settings.assembly,
            save_parts: settings.save_parts,
            id: Some(id.clone()),
        };
        let result = run_composite(&request, &mut rng)?;
        sink.write(&result)?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn horizontal_pan_ends_short_of_the_edge() {
        let plan = PanPlan::new((200, 100), 10, PanDirection::Horizontal, PanMotion::Forward).unwrap();
        assert_eq!(plan.window, 90);
        assert_eq!(plan.origin(0), (0, 0));
        assert_eq!(plan.origin(9), (99, 0));
        assert!(plan.origin(9).0 + plan.window <= 200);
    }

    #[test]
    fn backward_motion_reverses_numbering() {
        let plan = PanPlan::new((100, 100), 4, PanDirection::Diagonal, PanMotion::Backward).unwrap();
        let order: Vec<usize> = (0..4).map(|f| plan.output_index(f)).collect();
        assert_eq!(order, vec![3, 2, 1, 0]);
    }

    #[test]
    fn frames_are_square_and_resized() {
        let bg = RgbaImage::from_fn(40, 30, |x, _| Rgba([x as u8, 0, 0, 255]));
        let plan = PanPlan::new(bg.dimensions(), 3, PanDirection::Vertical, PanMotion::Forward).unwrap();
        let frames = pan_frames(&bg, &plan, 16);
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|(_, f)| f.dimensions() == (16, 16)));
    }

    #[test]
    fn zero_frames_is_invalid() {
        assert!(PanPlan::new((10, 10), 0, PanDirection::Vertical, PanMotion::Forward).is_err());
    }

    #[test]
    fn frame_names_are_zero_padded() {
        assert_eq!(frame_name("street", 7), "street_0007.png");
    }
}
