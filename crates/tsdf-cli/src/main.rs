// crates/tsdf-cli/src/main.rs

#![forbid(unsafe_code)]
#![deny(
    rust_2018_idioms,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo
)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tsdf_core::{
    io::{read_snapshot_auto, write_snapshot_auto},
    Scene, SceneSnapshot, VolumeConfig,
};
use tsdf_exec::{Executor, ParallelExecutor, SerialExecutor};
use tsdf_fusion::{
    io::{read_frame_set_auto, write_frame_set_auto},
    ActiveSet, FrameSet, FusionEngine,
};

mod synth;

#[derive(Parser, Debug)]
#[command(
    name = "tsdf-cli",
    about = "Sparse TSDF fusion reference CLI",
    long_about = "Sparse TSDF fusion reference CLI.\n\nUse this tool to generate synthetic RGB-D frame sets, fuse them into a sparse TSDF scene, and inspect scene snapshots.",
    version = env!("CARGO_PKG_VERSION"),
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Render a synthetic RGB-D frame set (plane or sphere sweep).
    Simulate {
        /// Image width in pixels
        #[arg(long, default_value_t = 64, value_parser = clap::value_parser!(u32).range(4..))]
        width: u32,

        /// Image height in pixels
        #[arg(long, default_value_t = 64, value_parser = clap::value_parser!(u32).range(4..))]
        height: u32,

        /// Number of frames (>0)
        #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u32).range(1..))]
        frames: u32,

        /// Analytic surface to render
        #[arg(value_enum, long, default_value_t = SurfaceOpt::Plane)]
        surface: SurfaceOpt,

        /// Distance from the first camera to the surface (world units)
        #[arg(long, default_value_t = 1.0)]
        distance: f32,

        /// Half-width of uniform depth noise (0 disables)
        #[arg(long, default_value_t = 0.0)]
        noise: f32,

        /// Sideways camera motion per frame (world units)
        #[arg(long, default_value_t = 0.01)]
        baseline: f32,

        /// Skip the color ramp images (depth-only set)
        #[arg(long, default_value_t = false)]
        no_color: bool,

        /// Generator seed
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Output path for the frame set (JSON/CBOR)
        #[arg(long, default_value = "frames.cbor")]
        out: PathBuf,
    },

    /// Fuse a frame set into a scene snapshot.
    Fuse {
        /// Input frame set (JSON/CBOR)
        #[arg(long)]
        frames: PathBuf,

        /// Optional snapshot to resume from (JSON/CBOR/BIN)
        #[arg(long)]
        resume: Option<PathBuf>,

        /// Output snapshot path (JSON/CBOR/BIN)
        #[arg(long, default_value = "scene.bin")]
        out: PathBuf,

        /// Pass executor
        #[arg(value_enum, long, default_value_t = ExecOpt::Serial)]
        executor: ExecOpt,

        /// Worker threads for the parallel executor (0 = rayon default)
        #[arg(long, default_value_t = 0)]
        threads: usize,

        /// Voxel block pool capacity
        #[arg(long, default_value_t = VolumeConfig::default().n_blocks)]
        blocks: u32,

        /// Hash bucket count per level
        #[arg(long, default_value_t = VolumeConfig::default().n_buckets)]
        buckets: u32,

        /// Excess (overflow) entries per level
        #[arg(long, default_value_t = VolumeConfig::default().n_excess)]
        excess: u32,

        /// Index levels (1 = flat)
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..))]
        levels: u8,

        /// Voxel edge length at the finest level (world units)
        #[arg(long, default_value_t = VolumeConfig::default().voxel_size)]
        voxel_size: f32,

        /// Truncation band half-width (world units)
        #[arg(long, default_value_t = VolumeConfig::default().mu)]
        mu: f32,

        /// Observation weight ceiling
        #[arg(long, default_value_t = VolumeConfig::default().max_weight)]
        max_weight: u8,

        /// Skip color fusion even when frames carry color
        #[arg(long, default_value_t = false)]
        no_color: bool,
    },

    /// Print a snapshot's parameters and occupancy.
    Info {
        /// Input snapshot (JSON/CBOR/BIN)
        #[arg(long)]
        snapshot: PathBuf,
    },
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
enum SurfaceOpt {
    Plane,
    Sphere,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
enum ExecOpt {
    /// Deterministic single-threaded reference
    Serial,
    /// Rayon worker pool
    Parallel,
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Simulate {
            width,
            height,
            frames,
            surface,
            distance,
            noise,
            baseline,
            no_color,
            seed,
            out,
        } => simulate(
            width, height, frames, surface, distance, noise, baseline, no_color, seed, out,
        ),

        Cmd::Fuse {
            frames,
            resume,
            out,
            executor,
            threads,
            blocks,
            buckets,
            excess,
            levels,
            voxel_size,
            mu,
            max_weight,
            no_color,
        } => {
            let config = VolumeConfig {
                n_blocks: blocks,
                n_buckets: buckets,
                n_excess: excess,
                levels,
                voxel_size,
                mu,
                max_weight,
                color: !no_color,
                ..VolumeConfig::default()
            };
            fuse(&frames, resume.as_deref(), &out, executor, threads, config)
        }

        Cmd::Info { snapshot } => info_cmd(&snapshot),
    }
}

/// Initialize tracing with an env-driven filter (default INFO).
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(false).with_level(true).compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

#[allow(clippy::too_many_arguments)]
fn simulate(
    width: u32,
    height: u32,
    frames: u32,
    surface: SurfaceOpt,
    distance: f32,
    noise: f32,
    baseline: f32,
    no_color: bool,
    seed: u64,
    out: PathBuf,
) -> Result<()> {
    let params = synth::SynthParams {
        width,
        height,
        n_frames: frames,
        surface: match surface {
            SurfaceOpt::Plane => synth::Surface::Plane,
            SurfaceOpt::Sphere => synth::Surface::Sphere,
        },
        distance,
        noise,
        baseline,
        with_color: !no_color,
        seed,
    };

    info!(width, height, frames, ?surface, "rendering synthetic frame set");
    let set = synth::generate_frames(&params)?;
    write_frame_set_auto(&out, &set)
        .with_context(|| format!("writing frame set to {}", out.display()))?;

    println!(
        "Simulated {} {}x{} frames ({:?}) → {}",
        frames,
        width,
        height,
        surface,
        out.display()
    );
    Ok(())
}

fn fuse(
    frames_path: &Path,
    resume: Option<&Path>,
    out: &Path,
    executor: ExecOpt,
    threads: usize,
    config: VolumeConfig,
) -> Result<()> {
    info!(frames=%frames_path.display(), out=%out.display(), ?executor, "fusing");
    let set = read_frame_set_auto(frames_path)
        .with_context(|| format!("reading frame set from {}", frames_path.display()))?;

    let mut scene = match resume {
        Some(path) => {
            let snap =
                read_snapshot_auto(path).with_context(|| format!("reading snapshot {}", path.display()))?;
            println!("Resuming from {}", path.display());
            snap.restore().context("restoring snapshot")?
        }
        None => Scene::new(config).context("building scene")?,
    };

    match executor {
        ExecOpt::Serial => run_fusion(&FusionEngine::new(SerialExecutor), &mut scene, &set)?,
        ExecOpt::Parallel => {
            let exec = if threads > 0 {
                ParallelExecutor::with_threads(threads)?
            } else {
                ParallelExecutor::new()
            };
            run_fusion(&FusionEngine::new(exec), &mut scene, &set)?;
        }
    }

    let counters = scene.counters.snapshot();
    let snap = SceneSnapshot::capture(&scene);
    write_snapshot_auto(out, &snap).with_context(|| format!("writing snapshot to {}", out.display()))?;

    println!(
        "Fused {} frames → {} ({} of {} blocks bound, {} alloc / {} excess drops, {} pixels rejected)",
        set.frames.len(),
        out.display(),
        scene.allocated_blocks(),
        scene.config.n_blocks,
        counters.alloc_failures,
        counters.excess_failures,
        counters.pixels_rejected
    );
    Ok(())
}

fn run_fusion<E: Executor>(engine: &FusionEngine<E>, scene: &mut Scene, set: &FrameSet) -> Result<()> {
    let mut active = ActiveSet::new(scene.config.levels);
    for (i, view) in set.frames.iter().enumerate() {
        let summary = engine
            .integrate(scene, &mut active, view)
            .with_context(|| format!("integrating frame {i}"))?;
        info!(
            frame = i,
            bound = summary.blocks_bound,
            visible = summary.visible_entries,
            "frame done"
        );
    }
    Ok(())
}

fn info_cmd(snapshot: &Path) -> Result<()> {
    let snap = read_snapshot_auto(snapshot)
        .with_context(|| format!("reading snapshot from {}", snapshot.display()))?;

    let h = &snap.header;
    println!("Snapshot {}", snapshot.display());
    println!(
        "  volume: {} blocks x {}^3 voxels, voxel {} m, mu {} m, maxW {}",
        h.n_blocks, h.block_side, h.voxel_size, h.mu, h.max_weight
    );
    println!(
        "  index: {} level(s), {} buckets x {} + {} excess",
        h.levels, h.n_buckets, h.entries_per_bucket, h.n_excess
    );

    let bound = i64::from(h.n_blocks) - (i64::from(snap.last_free_block_id) + 1);
    println!("  blocks bound: {bound} / {}", h.n_blocks);
    for (l, dump) in snap.hash_levels.iter().enumerate() {
        let live = dump.entries.iter().filter(|e| e.ptr >= -1).count();
        println!(
            "  level {l}: {live} live entries, {} / {} excess slots used",
            dump.excess_used, h.n_excess
        );
    }
    let observed = snap.voxels.iter().filter(|v| !v.is_uninitialized()).count();
    println!("  observed voxels: {observed} / {}", snap.voxels.len());
    Ok(())
}
