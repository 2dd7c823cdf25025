use super::CompositeMeta;
use crate::error::Result;
use crate::layers::{write_depth, FloatMap};
use image::{GrayImage, RgbaImage};
use std::fs;
use std::path::{Path, PathBuf};

/// Head, clothing and skin masks written next to the composite.
#[derive(Debug, Clone)]
pub struct PartOutputs {
    pub head: GrayImage,
    pub clothes: GrayImage,
    pub body: GrayImage,
}

/// Everything produced for one composite id.
#[derive(Debug, Clone)]
pub struct CompositeResult {
    pub image: RgbaImage,
    /// Alpha of the placed, matched foreground.
    pub mask: GrayImage,
    pub parts: Option<PartOutputs>,
    pub depth: Option<FloatMap>,
    /// The background cut out by an external occluder, when one was used.
    pub occlusion: Option<RgbaImage>,
    pub meta: CompositeMeta,
}

impl CompositeResult {
    pub fn id(&self) -> &str {
        &self.meta.comp_id
    }
}

/// Destination for finished composites.
pub trait CompositeSink {
    /// Persist every output of one composite.
    fn write(&self, result: &CompositeResult) -> Result<()>;

    /// Whether a composite with this id was already written.
    fn exists(&self, id: &str) -> bool;
}

/// Writes each output kind into its own sub-directory of `root`, every
/// file named after the composite id. Composites and masks can be sent to
/// directories outside `root`.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
    images: Option<PathBuf>,
    masks: Option<PathBuf>,
}

impl DirectorySink {
    pub const IMAGES: &'static str = "images";
    pub const MASKS: &'static str = "masks";
    pub const HEADS: &'static str = "heads";
    pub const CLOTH: &'static str = "cloth";
    pub const BODY: &'static str = "body";
    pub const DEPTH: &'static str = "depth";
    pub const OCCLUSION: &'static str = "occlusion";
    pub const META: &'static str = "meta";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            images: None,
            masks: None,
        }
    }

    /// Write composites to `dir` instead of `{root}/images`.
    pub fn with_image_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.images = dir;
        self
    }

    /// Write person masks to `dir` instead of `{root}/masks`.
    pub fn with_mask_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.masks = dir;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir(&self, kind: &str) -> PathBuf {
        let custom = match kind {
            Self::IMAGES => self.images.as_ref(),
            Self::MASKS => self.masks.as_ref(),
            _ => None,
        };
        custom.cloned().unwrap_or_else(|| self.root.join(kind))
    }

    /// `{dir}/{id}.{ext}` for the directory of `kind`, creating it.
    fn target(&self, kind: &str, id: &str, ext: &str) -> Result<PathBuf> {
        let dir = self.dir(kind);
        fs::create_dir_all(&dir)?;
        Ok(dir.join(format!("{id}.{ext}")))
    }

    pub fn image_path(&self, id: &str) -> PathBuf {
        self.dir(Self::IMAGES).join(format!("{id}.png"))
    }

    pub fn mask_path(&self, id: &str) -> PathBuf {
        self.dir(Self::MASKS).join(format!("{id}.png"))
    }
}

impl CompositeSink for DirectorySink {
    fn write(&self, result: &CompositeResult) -> Result<()> {
        let id = result.id();

        result.image.save(self.target(Self::IMAGES, id, "png")?)?;
        result.mask.save(self.target(Self::MASKS, id, "png")?)?;

        if let Some(parts) = &result.parts {
            parts.head.save(self.target(Self::HEADS, id, "png")?)?;
            parts.clothes.save(self.target(Self::CLOTH, id, "png")?)?;
            parts.body.save(self.target(Self::BODY, id, "png")?)?;
        }
        if let Some(depth) = &result.depth {
            write_depth(&self.target(Self::DEPTH, id, "exr")?, depth)?;
        }
        if let Some(occlusion) = &result.occlusion {
            occlusion.save(self.target(Self::OCCLUSION, id, "png")?)?;
        }

        let meta = serde_json::to_string_pretty(&result.meta)?;
        fs::write(self.target(Self::META, id, "json")?, meta)?;

        tracing::info!(id, root = %self.root.display(), "composite written");
        Ok(())
    }

    fn exists(&self, id: &str) -> bool {
        self.image_path(id).exists()
    }
}
