pub mod space;
pub mod synth;
mod texture;

pub use space::{hsv_to_rgb, lab_to_rgb, rgb_to_hsv, rgb_to_lab};
pub use synth::{color_block, colorize_hair, random_hsv_color, skin_block, SKIN_TONES};
pub use texture::map_texture;
