use crate::layers::UvMap;
use image::{Rgb, RgbImage};

/// Remap a flat texture onto rendered geometry through a UV pass.
///
/// Normalised coordinates are scaled by the texture resolution and sampled
/// nearest-neighbour. Coordinates outside the texture clamp to its edge.
pub fn map_texture(texture: &RgbImage, uv: &UvMap) -> RgbImage {
    let (tex_w, tex_h) = texture.dimensions();
    let (width, height) = uv.dimensions();
    let _span = tracing::debug_span!("map_texture", tex_w, tex_h).entered();

    RgbImage::from_fn(width, height, |x, y| {
        let (u, v) = uv.get(x, y);
        let col = nearest_index(u * tex_w as f32, tex_w);
        let row = nearest_index(v * tex_h as f32, tex_h);
        let texel: Rgb<u8> = *texture.get_pixel(col, row);
        texel
    })
}

fn nearest_index(coord: f32, len: u32) -> u32 {
    if !coord.is_finite() || coord <= 0.0 {
        return 0;
    }
    (coord.round() as u32).min(len.saturating_sub(1))
}
