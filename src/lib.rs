//! Synthetic person compositing for segmentation training data.
//!
//! Rendered character passes (color, part masks, ambient occlusion, UV,
//! depth) are colorised, shaded, placed on a real background, color-matched
//! to it and written out with aligned masks, depth and annotations.

pub mod annotation;
pub mod assembly;
pub mod batch;
pub mod color;
pub mod compose;
pub mod error;
pub mod layers;
pub mod mask;
pub mod matching;
pub mod occlusion;
pub mod placement;
pub mod sequence;

pub use assembly::{run_composite, CompositeRequest, CompositeResult, CompositeSink, DirectorySink};
pub use error::{CompositeError, Result};
pub use layers::{LayerSet, LayerSource, RenderDirectory};
pub use matching::MatchingMethod;
