//! The per-character bundle of rendered passes and where it lives on disk.

mod exr_io;

pub use exr_io::{read_depth, read_uv, write_depth};

use crate::error::{ensure_same_size, CompositeError, Result};
use crate::mask;
use image::{GrayImage, ImageBuffer, Luma, RgbaImage};
use std::path::{Path, PathBuf};

/// Single-channel 32-bit float image (depth, one UV component).
pub type FloatMap = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Depth value meaning "no surface": the renderer's background distance.
pub const FAR_DEPTH: f32 = 1.0e10;

/// Per-pixel normalised texture coordinates.
#[derive(Debug, Clone)]
pub struct UvMap {
    u: FloatMap,
    v: FloatMap,
}

impl UvMap {
    pub fn new(u: FloatMap, v: FloatMap) -> Result<Self> {
        ensure_same_size("uv components", u.dimensions(), v.dimensions())?;
        Ok(Self { u, v })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.u.dimensions()
    }

    pub fn get(&self, x: u32, y: u32) -> (f32, f32) {
        (self.u.get_pixel(x, y)[0], self.v.get_pixel(x, y)[0])
    }
}

/// Part masks of one render. Each is single-channel and nominally binary.
#[derive(Debug, Clone)]
pub struct PartMasks {
    /// Non-head skin.
    pub body: GrayImage,
    /// Head skin.
    pub head: GrayImage,
    pub shirt: GrayImage,
    pub pants: GrayImage,
    pub hair: GrayImage,
}

/// Immutable input bundle for one rendered character instance.
///
/// All passes share the person render's dimensions; masks are checked for
/// binarity once, here, rather than by each consumer.
#[derive(Debug, Clone)]
pub struct LayerSet {
    pub person: RgbaImage,
    pub parts: PartMasks,
    /// Eyes, teeth and other small extras.
    pub etc: Option<GrayImage>,
    pub ambient_occlusion: RgbaImage,
    pub uv: Option<UvMap>,
    pub depth: Option<FloatMap>,
}

impl LayerSet {
    pub fn new(person: RgbaImage, parts: PartMasks, ambient_occlusion: RgbaImage) -> Result<Self> {
        let size = person.dimensions();
        let named = [
            ("body", &parts.body),
            ("head", &parts.head),
            ("shirt", &parts.shirt),
            ("pants", &parts.pants),
            ("hair", &parts.hair),
        ];
        for (name, part) in named {
            ensure_same_size(&format!("{name} mask"), size, part.dimensions())?;
            mask::validate_binary(name, part)?;
        }
        ensure_same_size("ambient occlusion", size, ambient_occlusion.dimensions())?;

        Ok(Self {
            person,
            parts,
            etc: None,
            ambient_occlusion,
            uv: None,
            depth: None,
        })
    }

    pub fn with_etc(mut self, etc: GrayImage) -> Result<Self> {
        ensure_same_size("etc mask", self.dimensions(), etc.dimensions())?;
        mask::validate_binary("etc", &etc)?;
        self.etc = Some(etc);
        Ok(self)
    }

    pub fn with_uv(mut self, uv: UvMap) -> Result<Self> {
        ensure_same_size("uv map", self.dimensions(), uv.dimensions())?;
        self.uv = Some(uv);
        Ok(self)
    }

    pub fn with_depth(mut self, depth: FloatMap) -> Result<Self> {
        ensure_same_size("depth map", self.dimensions(), depth.dimensions())?;
        self.depth = Some(depth);
        Ok(self)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.person.dimensions()
    }
}

/// File locations of one render following the renderer's directory layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerPaths {
    pub person: PathBuf,
    pub body: PathBuf,
    pub head: PathBuf,
    pub shirt: PathBuf,
    pub pants: PathBuf,
    pub hair: PathBuf,
    pub etc: PathBuf,
    pub ambient_occlusion: PathBuf,
    pub uv: PathBuf,
    pub depth: PathBuf,
}

impl LayerPaths {
    pub fn new(base: &Path, id: &str) -> Self {
        let png = |dir: &str| base.join(dir).join(format!("{id}.png"));
        let exr = |dir: &str| base.join(dir).join(format!("{id}.exr"));
        Self {
            person: png("image_combined"),
            body: png("body_material_index"),
            head: png("head_material_index"),
            shirt: png("shirt_material_index"),
            pants: png("pants_material_index"),
            hair: png("hair_material_index"),
            etc: png("etc_material_index"),
            ambient_occlusion: png("ambient_occlusion"),
            uv: exr("uv"),
            depth: exr("z"),
        }
    }

    /// Load and validate every pass. Only the `etc` mask may be absent.
    pub fn load(&self) -> Result<LayerSet> {
        let parts = PartMasks {
            body: load_mask(&self.body)?,
            head: load_mask(&self.head)?,
            shirt: load_mask(&self.shirt)?,
            pants: load_mask(&self.pants)?,
            hair: load_mask(&self.hair)?,
        };
        let mut layers = LayerSet::new(
            load_rgba(&self.person)?,
            parts,
            load_rgba(&self.ambient_occlusion)?,
        )?;

        if self.etc.exists() {
            layers = layers.with_etc(load_mask(&self.etc)?)?;
        } else {
            tracing::warn!(path = %self.etc.display(), "no etc layer, skipping");
        }

        layers = layers
            .with_uv(read_uv(&self.uv)?)?
            .with_depth(read_depth(&self.depth)?)?;

        let (width, height) = layers.dimensions();
        tracing::info!(person = %self.person.display(), width, height, "layers loaded");
        Ok(layers)
    }
}

/// Somewhere render passes can be loaded from by id.
pub trait LayerSource {
    /// Load the full layer set of one render.
    fn load(&self, id: &str) -> Result<LayerSet>;

    /// Ids of every render available, sorted.
    fn ids(&self) -> Result<Vec<String>>;
}

/// A renderer output directory (`image_combined/`, `*_material_index/`, ...).
#[derive(Debug, Clone)]
pub struct RenderDirectory {
    base: PathBuf,
}

impl RenderDirectory {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn paths(&self, id: &str) -> LayerPaths {
        LayerPaths::new(&self.base, id)
    }
}

impl LayerSource for RenderDirectory {
    fn load(&self, id: &str) -> Result<LayerSet> {
        self.paths(id).load()
    }

    fn ids(&self) -> Result<Vec<String>> {
        Ok(list_files(&self.base.join("image_combined"), "png")?
            .iter()
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect())
    }
}

/// Files in `dir` with the given extension, sorted by path.
pub fn list_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn load_rgba(path: &Path) -> Result<RgbaImage> {
    Ok(open(path)?.to_rgba8())
}

pub fn load_mask(path: &Path) -> Result<GrayImage> {
    Ok(open(path)?.to_luma8())
}

fn open(path: &Path) -> Result<image::DynamicImage> {
    if !path.exists() {
        return Err(CompositeError::MissingFile(path.to_path_buf()));
    }
    Ok(image::open(path)?)
}
