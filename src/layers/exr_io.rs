use super::{FloatMap, UvMap};
use crate::error::{CompositeError, Result};
use exr::prelude::*;
use image::Luma;
use std::path::Path;

/// Float channels of the first valid layer of an EXR file, keyed by name.
struct FloatChannels {
    width: u32,
    height: u32,
    channels: Vec<(String, Vec<f32>)>,
}

impl FloatChannels {
    fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CompositeError::MissingFile(path.to_path_buf()));
        }

        let image = read()
            .no_deep_data()
            .largest_resolution_level()
            .all_channels()
            .first_valid_layer()
            .all_attributes()
            .from_file(path)?;

        let layer = image.layer_data;
        let width = layer.size.0 as u32;
        let height = layer.size.1 as u32;
        let channels = layer
            .channel_data
            .list
            .iter()
            .map(|channel| {
                (
                    channel.name.to_string(),
                    channel.sample_data.values_as_f32().collect(),
                )
            })
            .collect();

        tracing::debug!(path = %path.display(), width, height, "read exr");
        Ok(Self {
            width,
            height,
            channels,
        })
    }

    /// Channel by name, falling back to the `fallback`-th channel for files
    /// written with non-RGB channel names (`Y`, `Z`, `U`/`V`).
    fn take(&mut self, name: &str, fallback: usize, path: &Path) -> Result<FloatMap> {
        let index = self
            .channels
            .iter()
            .position(|(n, _)| n == name)
            .or_else(|| (fallback < self.channels.len()).then_some(fallback))
            .ok_or_else(|| CompositeError::ChannelCount {
                what: format!("float map {}", path.display()),
                expected: fallback as u8 + 1,
                actual: self.channels.len() as u8,
            })?;

        let samples = std::mem::take(&mut self.channels[index].1);
        FloatMap::from_raw(self.width, self.height, samples).ok_or_else(|| {
            CompositeError::invalid(format!(
                "channel {name} of {} does not cover its data window",
                path.display()
            ))
        })
    }
}

/// Read a single-channel depth pass (first of `R`, else the first channel).
pub fn read_depth(path: &Path) -> Result<FloatMap> {
    FloatChannels::read(path)?.take("R", 0, path)
}

/// Read a two-channel UV pass (`R` = u, `G` = v).
pub fn read_uv(path: &Path) -> Result<UvMap> {
    let mut channels = FloatChannels::read(path)?;
    let u = channels.take("R", 0, path)?;
    let v = channels.take("G", 1, path)?;
    UvMap::new(u, v)
}

/// Write a depth map as 32-bit float EXR with the value replicated across
/// R, G and B so ordinary viewers display it.
pub fn write_depth(path: &Path, depth: &FloatMap) -> Result<()> {
    let (width, height) = depth.dimensions();
    write_rgb_file(path, width as usize, height as usize, |x, y| {
        let Luma([d]) = *depth.get_pixel(x as u32, y as u32);
        (d, d, d)
    })?;
    tracing::debug!(path = %path.display(), width, height, "wrote depth exr");
    Ok(())
}
