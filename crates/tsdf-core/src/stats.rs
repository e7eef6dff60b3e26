// crates/tsdf-core/src/stats.rs

//! Degradation counters exposed by the core.
//!
//! Capacity exhaustion and per-pixel rejection never fail a frame; they are
//! counted here so callers can watch coverage degrade.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomically updated counters, one set per scene.
#[derive(Debug, Default)]
pub struct FusionCounters {
    alloc_failures: AtomicU64,
    excess_failures: AtomicU64,
    pixels_rejected: AtomicU64,
}

impl FusionCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block pool exhausted; one staged allocation was dropped.
    #[inline]
    pub fn count_alloc_failure(&self) {
        self.alloc_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Excess region exhausted; one staged chain extension was dropped.
    #[inline]
    pub fn count_excess_failure(&self) {
        self.excess_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A pixel with a measurement failed the band/frustum/finiteness checks.
    #[inline]
    pub fn count_pixel_rejected(&self) {
        self.pixels_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            alloc_failures: self.alloc_failures.load(Ordering::Relaxed),
            excess_failures: self.excess_failures.load(Ordering::Relaxed),
            pixels_rejected: self.pixels_rejected.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.alloc_failures.store(0, Ordering::Relaxed);
        self.excess_failures.store(0, Ordering::Relaxed);
        self.pixels_rejected.store(0, Ordering::Relaxed);
    }
}

/// Plain copy of the counters for reporting.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub alloc_failures: u64,
    pub excess_failures: u64,
    pub pixels_rejected: u64,
}
