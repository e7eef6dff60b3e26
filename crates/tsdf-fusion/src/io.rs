// crates/tsdf-fusion/src/io.rs

//! Frame-set serialization for offline runs.
//!
//! A frame set is just the ordered list of [`FrameView`]s a capture session
//! produced; JSON and CBOR with extension-based auto-detection, mirroring the
//! scene snapshot helpers in the core.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::view::FrameView;

/// An ordered sequence of frames to integrate.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FrameSet {
    pub frames: Vec<FrameView>,
}

/// Write a frame set as **JSON** (pretty).
pub fn write_frame_set_json<P: AsRef<Path>>(path: P, set: &FrameSet) -> Result<()> {
    let path_ref = path.as_ref();
    ensure_parent_dir(path_ref)?;
    let f = File::create(path_ref).with_context(|| format!("create {}", path_ref.display()))?;
    let w = BufWriter::new(f);
    serde_json::to_writer_pretty(w, set).with_context(|| "serialize JSON frame set")?;
    Ok(())
}

/// Read a frame set from **JSON**.
pub fn read_frame_set_json<P: AsRef<Path>>(path: P) -> Result<FrameSet> {
    let path_ref = path.as_ref();
    let f = File::open(path_ref).with_context(|| format!("open {}", path_ref.display()))?;
    let rdr = BufReader::new(f);
    let v = serde_json::from_reader(rdr).with_context(|| "deserialize JSON frame set")?;
    Ok(v)
}

/// Write a frame set as **CBOR**.
pub fn write_frame_set_cbor<P: AsRef<Path>>(path: P, set: &FrameSet) -> Result<()> {
    let path_ref = path.as_ref();
    ensure_parent_dir(path_ref)?;
    let f = File::create(path_ref).with_context(|| format!("create {}", path_ref.display()))?;
    let mut w = BufWriter::new(f);
    ciborium::ser::into_writer(set, &mut w).with_context(|| "serialize CBOR frame set")?;
    Ok(())
}

/// Read a frame set from **CBOR**.
pub fn read_frame_set_cbor<P: AsRef<Path>>(path: P) -> Result<FrameSet> {
    let path_ref = path.as_ref();
    let f = File::open(path_ref).with_context(|| format!("open {}", path_ref.display()))?;
    let mut rdr = BufReader::new(f);
    let v = ciborium::de::from_reader(&mut rdr).with_context(|| "deserialize CBOR frame set")?;
    Ok(v)
}

/// Auto-detect read by extension `.json` / `.cbor` (case-insensitive).
pub fn read_frame_set_auto<P: AsRef<Path>>(path: P) -> Result<FrameSet> {
    match ext_lower(path.as_ref()).as_deref() {
        Some("json") => read_frame_set_json(path),
        Some("cbor") => read_frame_set_cbor(path),
        Some(other) => Err(anyhow!(
            "unsupported frame-set extension: {} (supported: .json, .cbor)",
            other
        )),
        None => Err(anyhow!("path has no extension (expected .json or .cbor)")),
    }
}

/// Auto-detect write (defaults to **JSON** if unknown or missing).
pub fn write_frame_set_auto<P: AsRef<Path>>(path: P, set: &FrameSet) -> Result<()> {
    match ext_lower(path.as_ref()).as_deref() {
        Some("cbor") => write_frame_set_cbor(path, set),
        _ => write_frame_set_json(path, set),
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating parent directory {}", dir.display()))?;
        }
    }
    Ok(())
}

fn ext_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_ascii_lowercase())
}
