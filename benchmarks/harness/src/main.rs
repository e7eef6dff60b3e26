//! tsdf-bench-harness
//!
//! Run small end-to-end benchmarks (generate -> allocate -> fuse -> report)
//! and append CSV rows into `benchmarks/reports/bench-<unix>.csv`.
//!
//! Usage examples:
//!   cargo run -p tsdf-bench-harness -- --profile configs/profiles/small.toml --executor serial
//!   cargo run -p tsdf-bench-harness -- --profile configs/profiles/medium.toml --executor parallel

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use glam::Mat4;
use serde::Deserialize;

use tsdf_core::{ProjParams, Scene, VolumeConfig};
use tsdf_exec::{Executor, ParallelExecutor, SerialExecutor};
use tsdf_fusion::{ActiveSet, DepthImage, FrameView, FusionEngine};

#[derive(Debug, Deserialize)]
struct Profile {
    /// Depth image width in pixels
    width: u32,
    /// Depth image height in pixels
    height: u32,
    /// Frames fused per repetition
    frames: u32,
    /// Voxel block pool capacity
    n_blocks: u32,
    /// Hash bucket count
    n_buckets: u32,
    /// Excess entries
    n_excess: u32,
    /// Repetitions of the whole pipeline
    repeats: u32,
}

#[derive(Clone, Copy, Debug)]
enum ExecutorSel {
    Serial,
    Parallel,
}

fn parse_flag(name: &str, default: &str) -> String {
    let mut it = std::env::args().skip(1);
    while let Some(k) = it.next() {
        if k == format!("--{name}") {
            return it.next().unwrap_or_else(|| default.to_string());
        }
    }
    default.to_string()
}

fn dur_ms(d: Duration) -> u128 {
    d.as_millis()
}

/// Deterministic wavy-plane frame at a slightly different phase per index.
fn bench_frame(width: u32, height: u32, phase: u32) -> Result<FrameView> {
    let mut data = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            let ripple = ((x + phase) as f32 * 0.11).sin() * 0.01 + (y as f32 * 0.07).cos() * 0.01;
            data.push(1.0 + ripple);
        }
    }
    let proj = ProjParams::new(
        width as f32 * 0.8,
        width as f32 * 0.8,
        width as f32 / 2.0 - 0.5,
        height as f32 / 2.0 - 0.5,
    );
    FrameView::depth_only(DepthImage::new(width, height, data)?, Mat4::IDENTITY, proj)
}

fn fuse_all<E: Executor>(
    engine: &FusionEngine<E>,
    scene: &mut Scene,
    views: &[FrameView],
) -> Result<u32> {
    let mut active = ActiveSet::new(scene.config.levels);
    let mut bound = 0;
    for view in views {
        bound += engine.integrate(scene, &mut active, view)?.blocks_bound;
    }
    Ok(bound)
}

fn main() -> Result<()> {
    let profile_path = PathBuf::from(parse_flag("profile", "configs/profiles/small.toml"));
    let executor_str = parse_flag("executor", "serial");
    let executor = match executor_str.as_str() {
        "serial" => ExecutorSel::Serial,
        "parallel" => ExecutorSel::Parallel,
        other => anyhow::bail!("unknown --executor {other} (use serial|parallel)"),
    };

    let profile_src = fs::read_to_string(&profile_path)
        .with_context(|| format!("read profile {:?}", profile_path))?;
    let profile: Profile = toml::from_str(&profile_src).context("parse profile toml")?;
    println!(
        "Profile: {}x{}, frames={}, blocks={}, repeats={}, executor={executor_str}",
        profile.width, profile.height, profile.frames, profile.n_blocks, profile.repeats
    );

    fs::create_dir_all("benchmarks/reports").ok();

    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let csv_path = PathBuf::from(format!("benchmarks/reports/bench-{ts}.csv"));
    let mut csv = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&csv_path)?;
    writeln!(csv, "timestamp,executor,width,height,frames,repeat,stage,ms,extra")?;

    for rep in 0..profile.repeats {
        // 1) generate the frame sequence
        let t0 = Instant::now();
        let views: Vec<FrameView> = (0..profile.frames)
            .map(|i| bench_frame(profile.width, profile.height, i))
            .collect::<Result<_>>()?;
        let t_gen = t0.elapsed();
        writeln!(
            csv,
            "{ts},{executor_str},{},{},{},{},gen,{},",
            profile.width,
            profile.height,
            profile.frames,
            rep,
            dur_ms(t_gen)
        )?;

        // 2) fuse into a fresh scene
        let config = VolumeConfig {
            n_blocks: profile.n_blocks,
            n_buckets: profile.n_buckets,
            n_excess: profile.n_excess,
            voxel_size: 0.01,
            mu: 0.04,
            z_min: 0.1,
            z_max: 4.0,
            color: false,
            ..VolumeConfig::default()
        };
        let mut scene = Scene::new(config).context("building scene")?;

        let t0 = Instant::now();
        let bound = match executor {
            ExecutorSel::Serial => fuse_all(&FusionEngine::new(SerialExecutor), &mut scene, &views)?,
            ExecutorSel::Parallel => {
                fuse_all(&FusionEngine::new(ParallelExecutor::new()), &mut scene, &views)?
            }
        };
        let t_fuse = t0.elapsed();
        writeln!(
            csv,
            "{ts},{executor_str},{},{},{},{},fuse,{},blocks_bound={bound}",
            profile.width,
            profile.height,
            profile.frames,
            rep,
            dur_ms(t_fuse)
        )?;

        // 3) occupancy + degradation snapshot for the row
        let counters = scene.counters.snapshot();
        writeln!(
            csv,
            "{ts},{executor_str},{},{},{},{},report,0,allocated={} alloc_drops={} excess_drops={}",
            profile.width,
            profile.height,
            profile.frames,
            rep,
            scene.allocated_blocks(),
            counters.alloc_failures,
            counters.excess_failures
        )?;
    }

    println!("Wrote report → {}", csv_path.display());
    Ok(())
}
