//! Bounding-box annotations and dataset lists derived from person masks.

use crate::error::{CompositeError, Result};
use crate::layers::list_files;
use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Scan budget of [`min_max`] before it settles for a best-effort answer.
pub const MAX_SCAN_STEPS: usize = 10_000;

/// Name of the valid-mask list written by [`write_valid_list`].
pub const TRAIN_LIST: &str = "trainlist.txt";

/// Box normalised by `(width - 1, height - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub filename: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
    pub person: BoundingBox,
}

/// One mask's annotation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub file_info: FileInfo,
    pub annotations: Annotations,
}

/// Row sums and column sums of a mask.
pub fn histograms(mask: &GrayImage) -> (Vec<u64>, Vec<u64>) {
    let (width, height) = mask.dimensions();
    let mut rows = vec![0u64; height as usize];
    let mut cols = vec![0u64; width as usize];
    for (x, y, px) in mask.enumerate_pixels() {
        rows[y as usize] += px[0] as u64;
        cols[x as usize] += px[0] as u64;
    }
    (rows, cols)
}

/// First and last nonzero index, walking in from both ends.
///
/// All-zero input gives `(0, 0)`. Inputs too long to settle within
/// [`MAX_SCAN_STEPS`] return wherever the scan stopped.
pub fn min_max(values: &[u64]) -> (usize, usize) {
    if values.is_empty() {
        tracing::warn!("empty projection, degenerate box");
        return (0, 0);
    }
    let last = values.len() - 1;
    let (mut lo, mut hi) = (0usize, last);
    let (mut done_lo, mut done_hi) = (false, false);

    for _ in 0..=MAX_SCAN_STEPS {
        if !done_lo && values[lo] == 0 && lo < last {
            lo += 1;
        } else {
            done_lo = true;
        }
        if !done_hi && values[hi] == 0 && hi > 0 {
            hi -= 1;
        } else {
            done_hi = true;
        }
        if done_lo && done_hi {
            return (lo, hi);
        }
        if lo > hi {
            tracing::warn!("mask projection has no nonzero elements, degenerate box");
            return (0, 0);
        }
    }

    tracing::warn!(
        steps = MAX_SCAN_STEPS,
        lo,
        hi,
        "projection scan budget exhausted, best-effort box"
    );
    (lo, hi)
}

/// Normalise `(x_min, x_max, y_min, y_max)` for a `(width, height)` image.
pub fn normalize_bbox(bbox: (usize, usize, usize, usize), (width, height): (u32, u32)) -> BoundingBox {
    let (x_min, x_max, y_min, y_max) = bbox;
    let w = width.saturating_sub(1).max(1) as f64;
    let h = height.saturating_sub(1).max(1) as f64;
    BoundingBox {
        x: x_min as f64 / w,
        y: y_min as f64 / h,
        width: x_max.saturating_sub(x_min) as f64 / w,
        height: y_max.saturating_sub(y_min) as f64 / h,
    }
}

/// Normalised box around the nonzero pixels of a mask.
pub fn bounding_box(mask: &GrayImage) -> BoundingBox {
    let (rows, cols) = histograms(mask);
    let (x_min, x_max) = min_max(&cols);
    let (y_min, y_max) = min_max(&rows);
    normalize_bbox((x_min, x_max, y_min, y_max), mask.dimensions())
}

pub fn annotate(filename: &str, mask: &GrayImage) -> Annotation {
    let (width, height) = mask.dimensions();
    Annotation {
        file_info: FileInfo {
            filename: filename.to_string(),
            width,
            height,
        },
        annotations: Annotations {
            person: bounding_box(mask),
        },
    }
}

/// Load a single-channel mask, mapping every nonzero value to 255.
pub fn read_mask(path: &Path) -> Result<GrayImage> {
    if !path.exists() {
        return Err(CompositeError::MissingFile(path.to_path_buf()));
    }
    let image = image::open(path)?;
    let channels = image.color().channel_count();
    if channels != 1 {
        return Err(CompositeError::ChannelCount {
            what: format!("mask {}", path.display()),
            expected: 1,
            actual: channels,
        });
    }
    let wide = image.to_luma16();
    Ok(GrayImage::from_fn(wide.width(), wide.height(), |x, y| {
        Luma([if wide.get_pixel(x, y)[0] > 0 { 255 } else { 0 }])
    }))
}

/// Annotation for one mask file.
pub fn generate_annotation(path: &Path) -> Result<Annotation> {
    let mask = read_mask(path)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(annotate(&filename, &mask))
}

/// Write `{out_dir}/{id}.json` for every PNG mask in `mask_dir`.
/// Returns how many were written.
pub fn write_annotations(mask_dir: &Path, out_dir: &Path) -> Result<usize> {
    fs::create_dir_all(out_dir)?;
    let masks = list_files(mask_dir, "png")?;
    for path in &masks {
        let id = file_id(path);
        tracing::debug!(%id, "annotating");
        let annotation = generate_annotation(path)?;
        let json = serde_json::to_string_pretty(&annotation)?;
        fs::write(out_dir.join(format!("{id}.json")), json)?;
    }
    tracing::info!(count = masks.len(), out = %out_dir.display(), "annotations written");
    Ok(masks.len())
}

/// Ids of PNG masks in `mask_dir` with at least one nonzero pixel.
pub fn valid_masks(mask_dir: &Path) -> Result<Vec<String>> {
    let mut valid = Vec::new();
    for path in list_files(mask_dir, "png")? {
        let mask = image::open(&path)?.to_luma8();
        if mask.pixels().any(|p| p[0] > 0) {
            valid.push(file_id(&path));
        } else {
            tracing::debug!(path = %path.display(), "empty mask skipped");
        }
    }
    Ok(valid)
}

/// Write the valid-mask ids, one per line, to `{out_dir}/trainlist.txt`.
pub fn write_valid_list(mask_dir: &Path, out_dir: &Path) -> Result<PathBuf> {
    let valid = valid_masks(mask_dir)?;
    fs::create_dir_all(out_dir)?;
    let target = out_dir.join(TRAIN_LIST);
    let body: String = valid.iter().map(|id| format!("{id}\n")).collect();
    fs::write(&target, body)?;
    tracing::info!(valid = valid.len(), path = %target.display(), "valid mask list written");
    Ok(target)
}

fn file_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
