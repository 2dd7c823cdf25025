use std::path::PathBuf;

/// Convenience result type used by the compositing library.
pub type Result<T> = std::result::Result<T, CompositeError>;

/// Errors raised by the compositing pipeline.
///
/// Precondition variants indicate corrupt upstream data and are never
/// retried; the batch driver marks the job failed and moves on.
#[derive(thiserror::Error, Debug)]
pub enum CompositeError {
    /// Raw renders are expected to be square.
    #[error("person render must be square, got {width}x{height}")]
    NonSquarePerson { width: u32, height: u32 },

    /// Images that must align pixel-for-pixel do not.
    #[error("{what}: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        what: String,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// More than the tolerated share of a mask's nonzero pixels are fractional.
    #[error("mask '{name}' is not binary: {fractional} of {nonzero} nonzero pixels are fractional")]
    NonBinaryMask {
        name: String,
        fractional: usize,
        nonzero: usize,
    },

    /// An image with the wrong number of channels was supplied.
    #[error("{what} must have {expected} channel(s), got {actual}")]
    ChannelCount {
        what: String,
        expected: u8,
        actual: u8,
    },

    /// A crop would produce an empty image.
    #[error("crop factor {factor} leaves nothing of a {width}x{height} image")]
    EmptyCrop { factor: f32, width: u32, height: u32 },

    /// A numeric parameter is outside its valid range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A strategy or mode name that is not recognised.
    #[error("unknown {kind} '{name}' (expected one of: {expected})")]
    UnknownName {
        kind: &'static str,
        name: String,
        expected: &'static str,
    },

    /// A required layer or input file does not exist.
    #[error("missing input file {}", .0.display())]
    MissingFile(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Exr(#[from] exr::error::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CompositeError {
    pub fn dimension_mismatch(
        what: impl Into<String>,
        expected: (u32, u32),
        actual: (u32, u32),
    ) -> Self {
        Self::DimensionMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}

/// Fail with [`CompositeError::DimensionMismatch`] unless `actual == expected`.
pub(crate) fn ensure_same_size(
    what: &str,
    expected: (u32, u32),
    actual: (u32, u32),
) -> Result<()> {
    if expected != actual {
        return Err(CompositeError::dimension_mismatch(what, expected, actual));
    }
    Ok(())
}
