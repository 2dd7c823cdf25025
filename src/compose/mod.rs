pub mod blend;
mod person;

pub use blend::{alpha_composite, blend_overlay, combine_with_color, multiply, with_alpha};
pub use person::{make_clothed_person, ClothedPerson, ClothingStyle, AO_OPACITY};
