use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use simulant_compositor::annotation;
use simulant_compositor::assembly::{
    rng_from_seed, AssemblyConfig, CompositeSink, DirectorySink, NoiseTarget,
};
use simulant_compositor::batch::{clothing_style, read_jobs, run_batch, CompositeJob};
use simulant_compositor::layers::{list_files, load_rgba, LayerSource, RenderDirectory};
use simulant_compositor::matching::MatchingMethod;
use simulant_compositor::occlusion::{pick, random_file, random_render_id, run_occlusion, Occluder, OcclusionRequest};
use simulant_compositor::placement::{PlacementConfig, PlacementMode};
use simulant_compositor::sequence::{composite_sequence, write_pan, VideoSettings};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Composite one rendered person onto a background
    Composite(CompositeArgs),
    /// Composite a person behind real objects of the background
    Occlude(OccludeArgs),
    /// Write a bounding-box annotation for every mask in a directory
    Bboxes(MaskDirArgs),
    /// List masks that contain at least one person pixel
    ValidMasks(MaskDirArgs),
    /// Pan a background image into a sequence of frames
    Pan(PanArgs),
    /// Composite a rendered sequence over background frames
    Video(VideoArgs),
    /// Run a JSON list of composite jobs in parallel
    Batch(BatchArgs),
}

#[derive(Args, Debug)]
struct CompositeArgs {
    /// Renderer output directory (image_combined/, *_material_index/, uv/, z/)
    #[arg(long)]
    renders: PathBuf,

    /// Render id of the person within the renders directory
    #[arg(long)]
    person: String,

    /// Background image
    #[arg(long)]
    background: PathBuf,

    /// Root directory for images/, masks/ and the other outputs
    #[arg(long)]
    out: PathBuf,

    /// Composite directory (default: <out>/images)
    #[arg(long)]
    composite: Option<PathBuf>,

    /// Mask directory (default: <out>/masks)
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Use this name instead of a timestamped id
    #[arg(long = "out_name")]
    out_name: Option<String>,

    /// Foreground/background matching: RGB, LAB, HSV, SAT, SATVAL or NONE
    #[arg(long = "matching_method", default_value = "RGB", value_parser = parse_matching)]
    matching_method: MatchingMethod,

    /// Multiplicative noise: '', foreground or all
    #[arg(long = "noise_type", default_value = "", value_parser = parse_noise)]
    noise_type: NoiseTarget,

    /// Placement type: '' for random, video for a fixed centered person
    #[arg(long = "type", default_value = "", value_parser = parse_placement)]
    placement_type: PlacementMode,

    /// Seed (integer or any string)
    #[arg(long)]
    seed: Option<String>,

    /// Also write head, cloth and body masks
    #[arg(long)]
    parts: bool,

    /// Shirt texture (requires --pants_texture)
    #[arg(long = "shirt_texture")]
    shirt_texture: Option<PathBuf>,

    /// Pants texture (requires --shirt_texture)
    #[arg(long = "pants_texture")]
    pants_texture: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct OccludeArgs {
    /// Renderer output directory to pick people from
    #[arg(long = "simulant_dir")]
    simulant_dir: PathBuf,

    /// Directory of clothing texture patterns (PNG); flat colors if absent
    #[arg(long)]
    patterns: Option<PathBuf>,

    /// Directory of background images
    #[arg(long)]
    backgrounds: PathBuf,

    /// Extension of the background images
    #[arg(long = "background_ext", default_value = "jpg")]
    background_ext: String,

    /// Directory of occluder masks, one PNG per background with the same stem
    #[arg(long)]
    occluders: PathBuf,

    /// Root directory for outputs
    #[arg(long)]
    out: PathBuf,

    #[arg(long, default_value = "SAT", value_parser = parse_matching)]
    matching: MatchingMethod,

    /// Number of composites to generate
    #[arg(long, default_value_t = 1)]
    number: usize,

    #[arg(long)]
    seed: Option<String>,
}

#[derive(Args, Debug)]
struct MaskDirArgs {
    /// Directory of mask images
    #[arg(long = "mask_path")]
    mask_path: PathBuf,

    /// Output directory
    #[arg(long = "out_path")]
    out_path: PathBuf,
}

#[derive(Args, Debug)]
struct PanArgs {
    /// Background image to pan across
    #[arg(long)]
    input: PathBuf,

    /// Output directory for frames
    #[arg(long)]
    output: PathBuf,

    #[arg(long = "number_frames")]
    number_frames: usize,

    #[arg(long)]
    seed: Option<String>,
}

#[derive(Args, Debug)]
struct VideoArgs {
    /// Renderer output directory holding one render per frame
    #[arg(long)]
    renders: PathBuf,

    /// Directory of background frames (PNG), paired with renders in order
    #[arg(long)]
    backgrounds: PathBuf,

    #[arg(long)]
    out: PathBuf,

    /// Seed shared by every frame
    #[arg(long)]
    seed: String,

    #[arg(long = "matching_method", default_value = "RGB", value_parser = parse_matching)]
    matching_method: MatchingMethod,

    #[arg(long = "noise_type", default_value = "", value_parser = parse_noise)]
    noise_type: NoiseTarget,

    #[arg(long)]
    parts: bool,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// JSON array of composite jobs
    #[arg(long)]
    jobs: PathBuf,

    /// Concurrent workers
    #[arg(long, default_value_t = 2)]
    workers: usize,

    /// Batch seed; each job without its own seed gets this plus its index
    #[arg(long)]
    seed: Option<String>,
}

fn parse_matching(s: &str) -> Result<MatchingMethod, String> {
    s.parse().map_err(|e| format!("{e}"))
}

fn parse_noise(s: &str) -> Result<NoiseTarget, String> {
    s.parse().map_err(|e| format!("{e}"))
}

fn parse_placement(s: &str) -> Result<PlacementMode, String> {
    s.parse().map_err(|e| format!("{e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match cli.command {
        Command::Composite(args) => composite(args),
        Command::Occlude(args) => occlude(args),
        Command::Bboxes(args) => {
            annotation::write_annotations(&args.mask_path, &args.out_path)
                .context("Failed to write annotations")?;
            Ok(())
        }
        Command::ValidMasks(args) => {
            annotation::write_valid_list(&args.mask_path, &args.out_path)
                .context("Failed to write valid mask list")?;
            Ok(())
        }
        Command::Pan(args) => {
            let mut rng = rng_from_seed(args.seed.as_deref());
            let frames = write_pan(&args.input, &args.output, args.number_frames, &mut rng)
                .with_context(|| format!("Failed to pan {}", args.input.display()))?;
            tracing::info!("Wrote {} frames to {}", frames.len(), args.output.display());
            Ok(())
        }
        Command::Video(args) => video(args),
        Command::Batch(args) => {
            let jobs = read_jobs(&args.jobs)?;
            let summary = run_batch(&jobs, args.workers, args.seed.as_deref())?;
            tracing::info!(
                "Batch complete: {} done, {} skipped",
                summary.done,
                summary.skipped
            );
            Ok(())
        }
    }
}

fn composite(args: CompositeArgs) -> Result<()> {
    let job = CompositeJob {
        renders: args.renders,
        id: args.person,
        background: args.background,
        out: args.out,
        composite: args.composite,
        mask: args.mask,
        out_name: args.out_name,
        matching_method: args.matching_method,
        noise_type: args.noise_type,
        placement_type: args.placement_type,
        seed: args.seed,
        parts: args.parts,
        shirt_texture: args.shirt_texture,
        pants_texture: args.pants_texture,
    };
    let id = job.run(None, None)?;
    tracing::info!("Composite {} written to {}", id, job.out.display());
    Ok(())
}

fn occlude(args: OccludeArgs) -> Result<()> {
    let mut rng = rng_from_seed(args.seed.as_deref());
    let source = RenderDirectory::new(&args.simulant_dir);
    let sink = DirectorySink::new(&args.out);
    let occluders = list_files(&args.occluders, "png")
        .with_context(|| format!("Failed to list occluders in {}", args.occluders.display()))?;

    for i in 0..args.number {
        let occluder_path = pick(&occluders, "occluder masks", &mut rng)?;
        let stem = occluder_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let background_path = args.backgrounds.join(format!("{stem}.{}", args.background_ext));
        let background = load_rgba(&background_path)
            .with_context(|| format!("Failed to load background {}", background_path.display()))?;
        let occluder = Occluder::from_file(&background, occluder_path)
            .with_context(|| format!("Failed to load occluder {}", occluder_path.display()))?;

        let sim_id = random_render_id(&source, &mut rng)?;
        let layers = source
            .load(&sim_id)
            .with_context(|| format!("Failed to load layers of render {sim_id}"))?;
        let style = match &args.patterns {
            Some(dir) => {
                let shirt = random_file(dir, "png", &mut rng)?;
                let pants = random_file(dir, "png", &mut rng)?;
                clothing_style(Some(&shirt), Some(&pants))?
            }
            None => clothing_style(None, None)?,
        };

        let request = OcclusionRequest {
            layers: &layers,
            background: &background,
            occluder: &occluder,
            style: &style,
            placement: PlacementConfig::occlusion(),
            matching: args.matching,
            id: Some(format!("{stem}_{sim_id}")),
        };
        let result = run_occlusion(&request, &mut rng)
            .with_context(|| format!("Failed to composite {sim_id} behind {stem}"))?;
        sink.write(&result)?;
        tracing::info!("[{}/{}] {}", i + 1, args.number, result.id());
    }
    Ok(())
}

fn video(args: VideoArgs) -> Result<()> {
    let source = RenderDirectory::new(&args.renders);
    let ids = source
        .ids()
        .with_context(|| format!("Failed to list renders in {}", args.renders.display()))?;
    let backgrounds = list_files(&args.backgrounds, "png")
        .with_context(|| format!("Failed to list frames in {}", args.backgrounds.display()))?;

    let settings = VideoSettings {
        seed: args.seed,
        matching: args.matching_method,
        assembly: AssemblyConfig {
            noise: args.noise_type,
            ..AssemblyConfig::default()
        },
        style: clothing_style(None, None)?,
        save_parts: args.parts,
    };
    let sink = DirectorySink::new(&args.out);
    let count = composite_sequence(&source, &ids, &backgrounds, &settings, &sink)
        .context("Failed to composite sequence")?;
    tracing::info!("Composited {} frames into {}", count, args.out.display());
    Ok(())
}
