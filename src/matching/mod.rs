//! Background matching: pull the foreground's color statistics toward the
//! background's so the synthetic person sits in the scene.

mod histogram;

pub use histogram::{interp, match_channel, Histogram, N_BINS};

use crate::color::{hsv_to_rgb, lab_to_rgb, rgb_to_hsv, rgb_to_lab};
use crate::error::{CompositeError, Result};
use image::{Rgba, RgbImage, RgbaImage};
use ndarray::{Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Color space and channel selection used for histogram matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchingMethod {
    /// Match R, G and B directly.
    #[default]
    #[serde(rename = "RGB")]
    Rgb,
    #[serde(rename = "LAB")]
    Lab,
    #[serde(rename = "HSV")]
    Hsv,
    /// Saturation only; hue and value are kept.
    #[serde(rename = "SAT")]
    Sat,
    /// Saturation and value; hue is kept.
    #[serde(rename = "SATVAL")]
    SatVal,
    /// Leave the foreground as it is.
    #[serde(rename = "NONE")]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Space {
    Rgb,
    Lab,
    Hsv,
}

impl MatchingMethod {
    pub const ALL: [Self; 6] = [
        Self::Rgb,
        Self::Lab,
        Self::Hsv,
        Self::Sat,
        Self::SatVal,
        Self::None,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Rgb => "RGB",
            Self::Lab => "LAB",
            Self::Hsv => "HSV",
            Self::Sat => "SAT",
            Self::SatVal => "SATVAL",
            Self::None => "NONE",
        }
    }

    fn space(self) -> Space {
        match self {
            Self::Rgb | Self::None => Space::Rgb,
            Self::Lab => Space::Lab,
            Self::Hsv | Self::Sat | Self::SatVal => Space::Hsv,
        }
    }

    /// Channel indices (in the method's color space) that get matched.
    fn channels(self) -> &'static [usize] {
        match self {
            Self::Rgb | Self::Lab | Self::Hsv => &[0, 1, 2],
            Self::Sat => &[1],
            Self::SatVal => &[1, 2],
            Self::None => &[],
        }
    }
}

impl fmt::Display for MatchingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MatchingMethod {
    type Err = CompositeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|m| m.name() == upper)
            .ok_or_else(|| CompositeError::UnknownName {
                kind: "matching method",
                name: s.to_string(),
                expected: "RGB, LAB, HSV, SAT, SATVAL, NONE",
            })
    }
}

impl Space {
    fn forward(self, rgb: [u8; 3]) -> [f32; 3] {
        let unit = rgb.map(|c| c as f32 / 255.0);
        match self {
            Self::Rgb => rgb.map(|c| c as f32),
            Self::Lab => rgb_to_lab(unit),
            Self::Hsv => rgb_to_hsv(unit),
        }
    }

    fn back(self, values: [f32; 3]) -> [u8; 3] {
        let rgb = match self {
            Self::Rgb => values,
            Self::Lab => lab_to_rgb(values).map(|c| c * 255.0),
            Self::Hsv => hsv_to_rgb(values).map(|c| c * 255.0),
        };
        rgb.map(|c| if c.is_finite() { c.round().clamp(0.0, 255.0) as u8 } else { 0 })
    }
}

/// `(height, width, 3)` planes of an image converted into `space`.
fn planes<I>(width: u32, height: u32, pixels: I, space: Space) -> Array3<f32>
where
    I: Iterator<Item = (u32, u32, [u8; 3])>,
{
    let mut out = Array3::zeros((height as usize, width as usize, 3));
    for (x, y, rgb) in pixels {
        let converted = space.forward(rgb);
        for (c, v) in converted.into_iter().enumerate() {
            out[[y as usize, x as usize, c]] = v;
        }
    }
    out
}

/// Match the planes of a foreground (with alpha weights) to a background's,
/// returning new foreground planes in the same color space.
pub fn match_planes(
    foreground: &Array3<f32>,
    alpha: &Array2<f32>,
    background: &Array3<f32>,
    channels: &[usize],
) -> Array3<f32> {
    let mut matched = foreground.clone();
    for &c in channels {
        let channel = match_channel(
            foreground.index_axis(Axis(2), c),
            alpha.view(),
            background.index_axis(Axis(2), c),
            N_BINS,
        );
        matched.index_axis_mut(Axis(2), c).assign(&channel);
    }
    matched
}

/// Histogram-match the foreground's color to the background using `method`.
///
/// The foreground's alpha channel is carried over untouched and weights the
/// foreground histogram. The background may be any size.
pub fn match_background(
    foreground: &RgbaImage,
    background: &RgbImage,
    method: MatchingMethod,
) -> Result<RgbaImage> {
    if background.width() == 0 || background.height() == 0 {
        return Err(CompositeError::invalid("background has no pixels"));
    }
    if method == MatchingMethod::None {
        return Ok(foreground.clone());
    }
    let _span = tracing::debug_span!("match_background", %method).entered();

    let space = method.space();
    let (width, height) = foreground.dimensions();
    let fg = planes(
        width,
        height,
        foreground
            .enumerate_pixels()
            .map(|(x, y, p)| (x, y, [p[0], p[1], p[2]])),
        space,
    );
    let bg = planes(
        background.width(),
        background.height(),
        background.enumerate_pixels().map(|(x, y, p)| (x, y, p.0)),
        space,
    );
    let alpha = Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        foreground.get_pixel(x as u32, y as u32)[3] as f32
    });

    let matched = match_planes(&fg, &alpha, &bg, method.channels());

    let mut out = foreground.clone();
    for (x, y, px) in out.enumerate_pixels_mut() {
        let (row, col) = (y as usize, x as usize);
        let values = [
            matched[[row, col, 0]],
            matched[[row, col, 1]],
            matched[[row, col, 2]],
        ];
        let [r, g, b] = space.back(values);
        *px = Rgba([r, g, b, px[3]]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 8) as u8, (y * 8) as u8, ((x + y) * 4) as u8, 255])
        })
    }

    #[test]
    fn parses_method_names() {
        assert_eq!("SATVAL".parse::<MatchingMethod>().unwrap(), MatchingMethod::SatVal);
        assert_eq!("lab".parse::<MatchingMethod>().unwrap(), MatchingMethod::Lab);
        assert!(matches!(
            "XYZ".parse::<MatchingMethod>(),
            Err(CompositeError::UnknownName { .. })
        ));
        for m in MatchingMethod::ALL {
            assert_eq!(m.to_string().parse::<MatchingMethod>().unwrap(), m);
        }
    }

    #[test]
    fn alpha_is_preserved() {
        let mut fg = gradient(16, 16);
        fg.put_pixel(3, 3, Rgba([10, 10, 10, 0]));
        let bg = RgbImage::from_fn(20, 10, |x, _| Rgb([x as u8 * 10, 50, 90]));
        for method in MatchingMethod::ALL {
            let out = match_background(&fg, &bg, method).unwrap();
            assert_eq!(out.get_pixel(3, 3)[3], 0);
            assert_eq!(out.get_pixel(5, 5)[3], 255);
        }
    }

    #[test]
    fn rgb_self_match_is_close() {
        // every channel is a permutation of 0..=255
        let fg = RgbaImage::from_fn(16, 16, |x, y| {
            let v = (y * 16 + x) as u8;
            Rgba([v, 255 - v, (x * 16 + y) as u8, 255])
        });
        let bg = RgbImage::from_fn(16, 16, |x, y| {
            let p = fg.get_pixel(x, y);
            Rgb([p[0], p[1], p[2]])
        });
        let out = match_background(&fg, &bg, MatchingMethod::Rgb).unwrap();
        let total: u32 = out
            .pixels()
            .zip(fg.pixels())
            .map(|(a, b)| (0..3).map(|c| (a[c] as i32 - b[c] as i32).unsigned_abs()).sum::<u32>())
            .sum();
        let mean = total as f32 / (16.0 * 16.0 * 3.0);
        assert!(mean < 2.0, "mean channel error {mean}");
    }

    #[test]
    fn sat_keeps_hue_and_value_planes() {
        let fg = gradient(16, 16);
        let bg = RgbImage::from_fn(16, 16, |x, y| Rgb([200, (x * 12) as u8, (y * 3) as u8]));
        let fg_hsv = planes(
            16,
            16,
            fg.enumerate_pixels().map(|(x, y, p)| (x, y, [p[0], p[1], p[2]])),
            Space::Hsv,
        );
        let bg_hsv = planes(16, 16, bg.enumerate_pixels().map(|(x, y, p)| (x, y, p.0)), Space::Hsv);
        let alpha = Array2::from_elem((16, 16), 255.0);

        let matched = match_planes(&fg_hsv, &alpha, &bg_hsv, MatchingMethod::Sat.channels());
        assert_eq!(matched.index_axis(Axis(2), 0), fg_hsv.index_axis(Axis(2), 0));
        assert_eq!(matched.index_axis(Axis(2), 2), fg_hsv.index_axis(Axis(2), 2));
        assert_ne!(matched.index_axis(Axis(2), 1), fg_hsv.index_axis(Axis(2), 1));
    }

    #[test]
    fn none_is_passthrough() {
        let fg = gradient(4, 4);
        let bg = RgbImage::new(2, 2);
        assert_eq!(match_background(&fg, &bg, MatchingMethod::None).unwrap(), fg);
    }
}
