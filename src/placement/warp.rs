//! Resize and rotate that treat every layer type the same way, so color,
//! masks and depth stay pixel-aligned after placement.

use crate::error::CompositeError;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Pixel, Rgba};
use imageproc::geometric_transformations as geo;
use std::str::FromStr;

/// Resampling used when resizing and rotating a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Exact source values; the only choice for label data and depth.
    #[default]
    Nearest,
    Bilinear,
    Bicubic,
}

impl Interpolation {
    pub fn filter(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Bilinear => FilterType::Triangle,
            Self::Bicubic => FilterType::CatmullRom,
        }
    }

    fn to_geo(self) -> geo::Interpolation {
        match self {
            Self::Nearest => geo::Interpolation::Nearest,
            Self::Bilinear => geo::Interpolation::Bilinear,
            Self::Bicubic => geo::Interpolation::Bicubic,
        }
    }
}

impl FromStr for Interpolation {
    type Err = CompositeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NEAREST" => Ok(Self::Nearest),
            "BILINEAR" => Ok(Self::Bilinear),
            "BICUBIC" => Ok(Self::Bicubic),
            _ => Err(CompositeError::UnknownName {
                kind: "interpolation",
                name: s.to_string(),
                expected: "NEAREST, BILINEAR, BICUBIC",
            }),
        }
    }
}

type Buffer<P> = ImageBuffer<P, Vec<<P as Pixel>::Subpixel>>;

/// Layer pixel types placement can rotate, and the value rotation exposes.
pub trait Rotatable: Pixel + 'static {
    /// Transparent for color, unlabelled for masks, "no data" for depth.
    const EMPTY: Self;

    fn rotate_about_center(image: &Buffer<Self>, theta: f32, interpolation: geo::Interpolation) -> Buffer<Self>;
}

impl Rotatable for Rgba<u8> {
    const EMPTY: Self = Rgba([0, 0, 0, 0]);

    fn rotate_about_center(image: &Buffer<Self>, theta: f32, interpolation: geo::Interpolation) -> Buffer<Self> {
        geo::rotate_about_center(image, theta, interpolation, Self::EMPTY)
    }
}

impl Rotatable for Luma<u8> {
    const EMPTY: Self = Luma([0]);

    fn rotate_about_center(image: &Buffer<Self>, theta: f32, interpolation: geo::Interpolation) -> Buffer<Self> {
        geo::rotate_about_center(image, theta, interpolation, Self::EMPTY)
    }
}

impl Rotatable for Luma<f32> {
    const EMPTY: Self = Luma([0.0]);

    fn rotate_about_center(image: &Buffer<Self>, theta: f32, interpolation: geo::Interpolation) -> Buffer<Self> {
        geo::rotate_about_center(image, theta, interpolation, Self::EMPTY)
    }
}

pub fn resize<P>(image: &Buffer<P>, width: u32, height: u32, interpolation: Interpolation) -> Buffer<P>
where
    P: Pixel + 'static,
{
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    imageops::resize(image, width, height, interpolation.filter())
}

/// Rotate counter-clockwise by `degrees` about the image center, keeping the
/// canvas size. Uncovered pixels are [`Rotatable::EMPTY`].
pub fn rotate<P: Rotatable>(image: &Buffer<P>, degrees: f32, interpolation: Interpolation) -> Buffer<P> {
    if degrees.rem_euclid(360.0) == 0.0 {
        return image.clone();
    }
    // imageproc turns clockwise in image coordinates
    P::rotate_about_center(image, -degrees.to_radians(), interpolation.to_geo())
}
