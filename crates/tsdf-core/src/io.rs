// crates/tsdf-core/src/io.rs

//! Scene snapshot serialization.
//!
//! JSON, CBOR and dense binary read/write utilities with extension-based
//! auto-detection. Unknown/missing extensions are rejected for reads and
//! default to JSON for writes.
//!
//! The snapshot is the persisted-state layout: a header with the volume
//! parameters, then per-level hash dumps (sentinel-encoded entries), the
//! allocation free list with its top-of-stack index, the per-block op
//! states, and the voxel slab. Visible-entry lists are transient and are
//! rebuilt by the first frame after a reload.

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Cursor};
use std::path::Path;

use crate::allocator::VoxelBlockArray;
use crate::block::BLOCK_SIDE;
use crate::config::VolumeConfig;
use crate::hash::{HashEntry, RawHashEntry, VoxelHash};
use crate::index::{IndexLevel, SceneIndex};
use crate::scene::Scene;
use crate::staging::AllocationStaging;
use crate::voxel::Voxel;

/// Snapshot header: the volume parameters plus the compiled block edge, so a
/// reader can reject a snapshot taken with an incompatible build.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SnapshotHeader {
    pub n_blocks: u32,
    pub n_buckets: u32,
    pub entries_per_bucket: u32,
    pub n_excess: u32,
    pub block_side: u8,
    pub levels: u8,
    pub mu: f32,
    pub max_weight: u8,
    pub voxel_size: f32,
    pub z_min: f32,
    pub z_max: f32,
    pub color: bool,
}

/// Dense dump of one index level.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LevelDump {
    pub entries: Vec<RawHashEntry>,
    pub excess_used: u32,
}

/// Everything needed to rebuild a [`Scene`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SceneSnapshot {
    pub header: SnapshotHeader,
    pub hash_levels: Vec<LevelDump>,
    pub allocation_list: Vec<i32>,
    pub last_free_block_id: i32,
    pub op_states: Vec<u8>,
    pub voxels: Vec<Voxel>,
}

impl SceneSnapshot {
    /// Capture a scene's persistent state.
    #[must_use]
    pub fn capture(scene: &Scene) -> Self {
        let cfg = &scene.config;
        let header = SnapshotHeader {
            n_blocks: cfg.n_blocks,
            n_buckets: cfg.n_buckets,
            entries_per_bucket: cfg.entries_per_bucket,
            n_excess: cfg.n_excess,
            block_side: BLOCK_SIDE as u8,
            levels: cfg.levels,
            mu: cfg.mu,
            max_weight: cfg.max_weight,
            voxel_size: cfg.voxel_size,
            z_min: cfg.z_min,
            z_max: cfg.z_max,
            color: cfg.color,
        };
        let hash_levels = scene
            .index
            .levels()
            .iter()
            .map(|level| LevelDump {
                entries: level.hash.entries().iter().copied().map(RawHashEntry::from).collect(),
                excess_used: level.hash.excess_used(),
            })
            .collect();
        Self {
            header,
            hash_levels,
            allocation_list: scene.blocks.allocation_list().to_vec(),
            last_free_block_id: scene.blocks.last_free_block_id(),
            op_states: scene.blocks.op_states().to_vec(),
            voxels: scene.blocks.voxels().to_vec(),
        }
    }

    /// Rebuild a scene. Counters start fresh; visibility is transient.
    ///
    /// # Errors
    /// Returns an error when the dump is internally inconsistent or was
    /// taken with a different block edge.
    pub fn restore(self) -> Result<Scene> {
        let h = &self.header;
        if h.block_side as usize != BLOCK_SIDE {
            bail!(
                "snapshot block edge {} does not match this build ({})",
                h.block_side,
                BLOCK_SIDE
            );
        }
        if self.hash_levels.len() != h.levels as usize {
            bail!(
                "snapshot has {} hash levels, header says {}",
                self.hash_levels.len(),
                h.levels
            );
        }
        if self.allocation_list.len() != h.n_blocks as usize {
            bail!(
                "allocation list length {} does not match {} blocks",
                self.allocation_list.len(),
                h.n_blocks
            );
        }

        let config = VolumeConfig {
            n_blocks: h.n_blocks,
            n_buckets: h.n_buckets,
            entries_per_bucket: h.entries_per_bucket,
            n_excess: h.n_excess,
            voxel_size: h.voxel_size,
            mu: h.mu,
            max_weight: h.max_weight,
            z_min: h.z_min,
            z_max: h.z_max,
            levels: h.levels,
            color: h.color,
        };
        config.validate().context("snapshot carries invalid parameters")?;

        let mut levels = Vec::with_capacity(self.hash_levels.len());
        for (l, dump) in self.hash_levels.into_iter().enumerate() {
            let entries: Vec<HashEntry> = dump.entries.into_iter().map(HashEntry::from).collect();
            let hash = VoxelHash::from_parts(
                config.n_buckets,
                config.entries_per_bucket,
                config.n_excess,
                entries,
                dump.excess_used,
            )
            .with_context(|| format!("restoring hash level {l}"))?;
            let staging = AllocationStaging::new(hash.total_len() as usize);
            levels.push(IndexLevel { hash, staging });
        }

        let blocks = VoxelBlockArray::from_parts(
            self.voxels,
            self.allocation_list,
            self.last_free_block_id,
            self.op_states,
        )
        .context("restoring voxel block array")?;

        Ok(Scene::from_parts(config, SceneIndex::from_levels(levels), blocks))
    }
}

/// Ensure the parent directory for a file exists (no-op if none).
fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating parent directory {}", display(path)))?;
        }
    }
    Ok(())
}

/// Write a snapshot as **JSON** (pretty; debugging-sized volumes only).
pub fn write_snapshot_json<P: AsRef<Path>>(path: P, snap: &SceneSnapshot) -> Result<()> {
    let path_ref = path.as_ref();
    ensure_parent_dir(path_ref)?;
    let f = File::create(path_ref).with_context(|| format!("create {}", display(path_ref)))?;
    let w = BufWriter::new(f);
    serde_json::to_writer_pretty(w, snap).with_context(|| "serialize JSON snapshot")?;
    Ok(())
}

/// Read a snapshot from **JSON**.
pub fn read_snapshot_json<P: AsRef<Path>>(path: P) -> Result<SceneSnapshot> {
    let path_ref = path.as_ref();
    let f = File::open(path_ref).with_context(|| format!("open {}", display(path_ref)))?;
    let rdr = BufReader::new(f);
    let v = serde_json::from_reader(rdr).with_context(|| "deserialize JSON snapshot")?;
    Ok(v)
}

/// Write a snapshot as **CBOR**.
pub fn write_snapshot_cbor<P: AsRef<Path>>(path: P, snap: &SceneSnapshot) -> Result<()> {
    let path_ref = path.as_ref();
    ensure_parent_dir(path_ref)?;
    let f = File::create(path_ref).with_context(|| format!("create {}", display(path_ref)))?;
    let mut w = BufWriter::new(f);
    ciborium::ser::into_writer(snap, &mut w).with_context(|| "serialize CBOR snapshot")?;
    Ok(())
}

/// Read a snapshot from **CBOR**.
pub fn read_snapshot_cbor<P: AsRef<Path>>(path: P) -> Result<SceneSnapshot> {
    let path_ref = path.as_ref();
    let f = File::open(path_ref).with_context(|| format!("open {}", display(path_ref)))?;
    let mut rdr = BufReader::new(f);
    let v = ciborium::de::from_reader(&mut rdr).with_context(|| "deserialize CBOR snapshot")?;
    Ok(v)
}

/// Write a snapshot as a **dense binary** dump (little-endian, fixed-width;
/// the right choice for full-size volumes).
pub fn write_snapshot_bin<P: AsRef<Path>>(path: P, snap: &SceneSnapshot) -> Result<()> {
    let path_ref = path.as_ref();
    ensure_parent_dir(path_ref)?;
    let f = File::create(path_ref).with_context(|| format!("create {}", display(path_ref)))?;
    let w = BufWriter::new(f);
    bincode::serialize_into(w, snap).with_context(|| "serialize binary snapshot")?;
    Ok(())
}

/// Read a snapshot from the dense binary format.
pub fn read_snapshot_bin<P: AsRef<Path>>(path: P) -> Result<SceneSnapshot> {
    let path_ref = path.as_ref();
    let f = File::open(path_ref).with_context(|| format!("open {}", display(path_ref)))?;
    let rdr = BufReader::new(f);
    let v = bincode::deserialize_from(rdr).with_context(|| "deserialize binary snapshot")?;
    Ok(v)
}

/// Auto-detect read by extension `.json` / `.cbor` / `.bin` (case-insensitive).
pub fn read_snapshot_auto<P: AsRef<Path>>(path: P) -> Result<SceneSnapshot> {
    match ext_lower(path.as_ref()).as_deref() {
        Some("json") => read_snapshot_json(path),
        Some("cbor") => read_snapshot_cbor(path),
        Some("bin") => read_snapshot_bin(path),
        Some(other) => Err(anyhow!(
            "unsupported snapshot extension: {} (supported: .json, .cbor, .bin)",
            other
        )),
        None => Err(anyhow!("path has no extension (expected .json, .cbor or .bin)")),
    }
}

/// Auto-detect write (defaults to **JSON** if unknown or missing).
pub fn write_snapshot_auto<P: AsRef<Path>>(path: P, snap: &SceneSnapshot) -> Result<()> {
    match ext_lower(path.as_ref()).as_deref() {
        Some("cbor") => write_snapshot_cbor(path, snap),
        Some("bin") => write_snapshot_bin(path, snap),
        _ => write_snapshot_json(path, snap),
    }
}

/// Serialize any `T: Serialize` to **CBOR bytes** using `ciborium`.
pub fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf).with_context(|| "serialize CBOR (to_cbor)")?;
    Ok(buf)
}

/// Deserialize any `T: DeserializeOwned` from **CBOR bytes** using `ciborium`.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut cur = Cursor::new(bytes);
    let v = ciborium::de::from_reader(&mut cur).with_context(|| "deserialize CBOR (from_cbor)")?;
    Ok(v)
}

/// Return the lowercase extension (without dot) if present.
fn ext_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_ascii_lowercase())
}

/// Human-friendly path display for error messages.
fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
