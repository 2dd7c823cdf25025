//! Running many independent composites on a bounded worker pool.

use crate::assembly::{
    rng_from_seed, run_composite, seed_value, AssemblyConfig, CompositeRequest, CompositeSink,
    DirectorySink, NoiseTarget,
};
use crate::compose::ClothingStyle;
use crate::layers::{load_rgba, LayerSource, RenderDirectory};
use crate::matching::MatchingMethod;
use crate::placement::{PlacementConfig, PlacementMode};
use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// One composite, as described in a job list or on the command line.
#[derive(Debug, Clone, Deserialize)]
pub struct CompositeJob {
    /// Renderer output directory holding the layer passes.
    pub renders: PathBuf,
    /// Render id within `renders`.
    pub id: String,
    pub background: PathBuf,
    /// Root of the output tree.
    pub out: PathBuf,
    /// Composite directory, overriding `{out}/images`.
    #[serde(default)]
    pub composite: Option<PathBuf>,
    /// Mask directory, overriding `{out}/masks`.
    #[serde(default)]
    pub mask: Option<PathBuf>,
    #[serde(default)]
    pub out_name: Option<String>,
    #[serde(default)]
    pub matching_method: MatchingMethod,
    #[serde(default)]
    pub noise_type: NoiseTarget,
    #[serde(default, rename = "type")]
    pub placement_type: PlacementMode,
    #[serde(default)]
    pub seed: Option<String>,
    /// Also write head, clothing and skin masks.
    #[serde(default)]
    pub parts: bool,
    #[serde(default)]
    pub shirt_texture: Option<PathBuf>,
    #[serde(default)]
    pub pants_texture: Option<PathBuf>,
}

/// Clothing style from optional shirt and pants texture files.
pub fn clothing_style(shirt: Option<&Path>, pants: Option<&Path>) -> Result<ClothingStyle> {
    match (shirt, pants) {
        (None, None) => Ok(ClothingStyle::Flat),
        (Some(shirt), Some(pants)) => {
            let shirt = image::open(shirt)
                .with_context(|| format!("Failed to open shirt texture {}", shirt.display()))?;
            let pants = image::open(pants)
                .with_context(|| format!("Failed to open pants texture {}", pants.display()))?;
            Ok(ClothingStyle::textured(&shirt, &pants))
        }
        _ => anyhow::bail!("shirt and pants textures must be given together"),
    }
}

impl CompositeJob {
    /// Output name used when the job list does not set one.
    pub fn batch_id(&self) -> String {
        self.out_name.clone().unwrap_or_else(|| {
            let bg = self
                .background
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("{}_{}", self.id, bg)
        })
    }

    pub fn sink(&self) -> DirectorySink {
        DirectorySink::new(&self.out)
            .with_image_dir(self.composite.clone())
            .with_mask_dir(self.mask.clone())
    }

    /// Composite and write this job. `seed` overrides the job's own seed.
    /// Returns the composite id.
    pub fn run(&self, id: Option<String>, seed: Option<&str>) -> Result<String> {
        let style = clothing_style(self.shirt_texture.as_deref(), self.pants_texture.as_deref())?;

        let layers = RenderDirectory::new(&self.renders)
            .load(&self.id)
            .with_context(|| format!("Failed to load layers of render {}", self.id))?;
        let background = load_rgba(&self.background)
            .with_context(|| format!("Failed to load background {}", self.background.display()))?;

        let request = CompositeRequest {
            layers: &layers,
            background: &background,
            style: &style,
            placement: PlacementConfig {
                mode: self.placement_type,
                ..PlacementConfig::default()
            },
            matching: self.matching_method,
            assembly: AssemblyConfig {
                noise: self.noise_type,
                ..AssemblyConfig::default()
            },
            save_parts: self.parts,
            id: id.or_else(|| self.out_name.clone()),
        };

        let mut rng = rng_from_seed(seed.or(self.seed.as_deref()));
        let result = run_composite(&request, &mut rng)
            .with_context(|| format!("Failed to composite render {}", self.id))?;
        self.sink()
            .write(&result)
            .with_context(|| format!("Failed to write outputs under {}", self.out.display()))?;
        Ok(result.meta.comp_id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub done: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum Outcome {
    Done,
    Skipped,
    Failed,
}

pub fn read_jobs(path: &Path) -> Result<Vec<CompositeJob>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job list {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse job list {}", path.display()))
}

fn build_thread_pool(workers: usize) -> Result<rayon::ThreadPool> {
    if workers == 0 {
        anyhow::bail!("batch needs at least one worker");
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .context("Failed to build worker pool")
}

/// Seed of the `index`-th job: its own, else the batch seed offset by index.
fn job_seed(job: &CompositeJob, batch_seed: Option<&str>, index: usize) -> Option<String> {
    job.seed.clone().or_else(|| {
        batch_seed.map(|s| seed_value(s).wrapping_add(index as u64).to_string())
    })
}

/// Run every job on `workers` threads. A failing job is logged and does not
/// stop the others; the batch as a whole fails if any job did.
pub fn run_batch(jobs: &[CompositeJob], workers: usize, batch_seed: Option<&str>) -> Result<BatchSummary> {
    let pool = build_thread_pool(workers)?;
    tracing::info!(jobs = jobs.len(), workers, "starting batch");

    let outcomes: Vec<Outcome> = pool.install(|| {
        jobs.par_iter()
            .enumerate()
            .map(|(index, job)| {
                let id = job.batch_id();
                if job.sink().exists(&id) {
                    tracing::debug!(%id, "already composited, skipping");
                    return Outcome::Skipped;
                }
                let seed = job_seed(job, batch_seed, index);
                match job.run(Some(id.clone()), seed.as_deref()) {
                    Ok(_) => Outcome::Done,
                    Err(e) => {
                        tracing::error!(job = %id, error = %format!("{e:#}"), "job failed");
                        Outcome::Failed
                    }
                }
            })
            .collect()
    });

    let mut summary = BatchSummary::default();
    for outcome in outcomes {
        match outcome {
            Outcome::Done => summary.done += 1,
            Outcome::Skipped => summary.skipped += 1,
            Outcome::Failed => summary.failed += 1,
        }
    }
    tracing::info!(
        done = summary.done,
        skipped = summary.skipped,
        failed = summary.failed,
        "batch finished"
    );

    if summary.failed > 0 {
        anyhow::bail!("{} of {} jobs failed", summary.failed, jobs.len());
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(json: &str) -> CompositeJob {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn job_defaults() {
        let j = job(r#"{"renders": "/r", "id": "0001", "background": "/bg/street.jpg", "out": "/o"}"#);
        assert_eq!(j.matching_method, MatchingMethod::Rgb);
        assert_eq!(j.noise_type, NoiseTarget::None);
        assert_eq!(j.placement_type, PlacementMode::Random);
        assert!(!j.parts);
        assert_eq!(j.batch_id(), "0001_street");
    }

    #[test]
    fn job_names_match_the_command_line() {
        let j = job(
            r#"{"renders": "/r", "id": "1", "background": "/b.png", "out": "/o",
                "type": "video", "noise_type": "", "matching_method": "SATVAL"}"#,
        );
        assert_eq!(j.placement_type, PlacementMode::Fixed);
        assert_eq!(j.noise_type, NoiseTarget::None);
        assert_eq!(j.matching_method, MatchingMethod::SatVal);
        assert!(serde_json::from_str::<CompositeJob>(
            r#"{"renders": "/r", "id": "1", "background": "/b.png", "out": "/o", "type": "spin"}"#
        )
        .is_err());
    }

    #[test]
    fn output_directories_can_be_overridden() {
        let j = job(
            r#"{"renders": "/r", "id": "1", "background": "/b.png", "out": "/o",
                "composite": "/c", "mask": "/m"}"#,
        );
        assert_eq!(j.sink().image_path("x"), PathBuf::from("/c/x.png"));
        assert_eq!(j.sink().mask_path("x"), PathBuf::from("/m/x.png"));

        let plain = job(r#"{"renders": "/r", "id": "1", "background": "/b.png", "out": "/o"}"#);
        assert_eq!(plain.sink().image_path("x"), PathBuf::from("/o/images/x.png"));
        assert_eq!(plain.sink().mask_path("x"), PathBuf::from("/o/masks/x.png"));
    }

    #[test]
    fn seeds_fall_back_to_batch_seed_plus_index() {
        let j = job(r#"{"renders": "/r", "id": "1", "background": "/b.png", "out": "/o"}"#);
        assert_eq!(job_seed(&j, Some("10"), 3).as_deref(), Some("13"));
        assert_eq!(job_seed(&j, None, 3), None);
        let own = job(r#"{"renders": "/r", "id": "1", "background": "/b.png", "out": "/o", "seed": "x"}"#);
        assert_eq!(job_seed(&own, Some("10"), 3).as_deref(), Some("x"));
    }

    #[test]
    fn missing_inputs_fail_without_stopping_the_batch() {
        let dir = std::env::temp_dir().join(format!("simulant_batch_{}", std::process::id()));
        let jobs = vec![
            job(&format!(
                r#"{{"renders": "/nonexistent", "id": "a", "background": "/nonexistent/bg.png", "out": "{}"}}"#,
                dir.display()
            )),
            job(&format!(
                r#"{{"renders": "/nonexistent", "id": "b", "background": "/nonexistent/bg.png", "out": "{}"}}"#,
                dir.display()
            )),
        ];
        let err = run_batch(&jobs, 2, Some("1")).unwrap_err();
        assert!(err.to_string().contains("2 of 2 jobs failed"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(run_batch(&[], 0, None).is_err());
    }

    #[test]
    fn half_textured_style_is_rejected() {
        assert!(clothing_style(Some(Path::new("/a.png")), None).is_err());
    }
}
