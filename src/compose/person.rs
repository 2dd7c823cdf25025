use super::blend::{alpha_composite, blend_overlay, combine_with_color, with_alpha};
use crate::color::{color_block, colorize_hair, map_texture, skin_block};
use crate::error::{CompositeError, Result};
use crate::layers::LayerSet;
use crate::mask;
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use rand::Rng;

/// Opacity of the ambient occlusion overlay.
pub const AO_OPACITY: f32 = 0.85;

/// How shirt and pants get their color.
#[derive(Debug, Clone, Default)]
pub enum ClothingStyle {
    /// A uniformly random flat color per garment.
    #[default]
    Flat,
    /// Textures remapped through the render's UV pass.
    Textured { shirt: RgbImage, pants: RgbImage },
}

impl ClothingStyle {
    pub fn textured(shirt: &DynamicImage, pants: &DynamicImage) -> Self {
        Self::Textured {
            shirt: shirt.to_rgb8(),
            pants: pants.to_rgb8(),
        }
    }
}

/// A colorised, shaded person and the masks derived from its parts.
#[derive(Debug, Clone)]
pub struct ClothedPerson {
    /// Full color with alpha equal to the union of every part mask.
    pub image: RgbaImage,
    /// Shirt and pants.
    pub clothes: GrayImage,
    /// Hair and head skin.
    pub head: GrayImage,
    /// Non-head skin.
    pub body: GrayImage,
}

/// Build a clothed person from its render passes.
///
/// Parts are layered back to front (skin, hair, shirt, pants, etc) so
/// clothing sits on top at mask boundaries, then shaded with the ambient
/// occlusion pass.
pub fn make_clothed_person<R: Rng + ?Sized>(
    layers: &LayerSet,
    style: &ClothingStyle,
    rng: &mut R,
) -> Result<ClothedPerson> {
    let _span = tracing::debug_span!("make_clothed_person").entered();
    let (width, height) = layers.dimensions();
    let render = &layers.person;
    let parts = &layers.parts;

    let skin_mask = mask::union(&parts.head, &parts.body)?;
    let colored_skin = combine_with_color(render, &skin_mask, &skin_block(width, height, rng))?;
    let colored_hair = colorize_hair(render, &parts.hair, rng);

    let (colored_shirt, colored_pants) = match style {
        ClothingStyle::Flat => (
            combine_with_color(render, &parts.shirt, &color_block(width, height, rng))?,
            combine_with_color(render, &parts.pants, &color_block(width, height, rng))?,
        ),
        ClothingStyle::Textured { shirt, pants } => {
            let uv = layers.uv.as_ref().ok_or_else(|| {
                CompositeError::invalid("textured clothing needs a UV pass")
            })?;
            let shirt_tex = DynamicImage::ImageRgb8(map_texture(shirt, uv)).to_rgba8();
            let pants_tex = DynamicImage::ImageRgb8(map_texture(pants, uv)).to_rgba8();
            (
                combine_with_color(render, &parts.shirt, &shirt_tex)?,
                combine_with_color(render, &parts.pants, &pants_tex)?,
            )
        }
    };

    let mut colored = alpha_composite(&colored_skin, &colored_hair)?;
    colored = alpha_composite(&colored, &colored_shirt)?;
    colored = alpha_composite(&colored, &colored_pants)?;
    if let Some(etc) = &layers.etc {
        colored = alpha_composite(&colored, &with_alpha(render, etc)?)?;
    }

    let shaded = blend_overlay(&colored, &layers.ambient_occlusion, AO_OPACITY)?;

    let clothes = mask::union(&parts.shirt, &parts.pants)?;
    let head = mask::union(&parts.hair, &parts.head)?;
    let mut silhouette = mask::union(&skin_mask, &parts.hair)?;
    silhouette = mask::union(&silhouette, &clothes)?;
    if let Some(etc) = &layers.etc {
        silhouette = mask::union(&silhouette, etc)?;
    }

    tracing::debug!(
        coverage = mask::coverage(&silhouette),
        clothes = mask::coverage(&clothes),
        "person composited"
    );

    Ok(ClothedPerson {
        image: with_alpha(&shaded, &silhouette)?,
        clothes,
        head,
        body: parts.body.clone(),
    })
}
