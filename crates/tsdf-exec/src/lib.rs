// crates/tsdf-exec/src/lib.rs

//! Data-parallel pass execution behind one small capability.
//!
//! Every per-frame pass of the fusion pipeline is either "run a task for
//! each index in `0..n`" (pixels, hash entries — shared state written
//! through atomics) or "run a task for each fixed-size chunk of a slice"
//! (voxel blocks — each task owns its chunk exclusively). An [`Executor`]
//! provides exactly those two shapes.
//!
//! [`SerialExecutor`] is the deterministic reference; [`ParallelExecutor`]
//! fans out over a rayon pool. Task order within a pass is unobservable by
//! construction, so both produce the same result wherever the kernels are
//! race-free.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]

use anyhow::{Context, Result};
use rayon::prelude::*;

/// Execute closures over integer ranges or disjoint chunks of a slice.
pub trait Executor: Send + Sync {
    /// Run `task(i)` for every `i` in `0..n`.
    ///
    /// Tasks may run concurrently; shared writes inside `task` must go
    /// through atomics.
    fn for_each_index<F>(&self, n: usize, task: F)
    where
        F: Fn(usize) + Send + Sync;

    /// Split `data` into consecutive chunks of `chunk_len` elements and run
    /// `task(chunk_index, chunk)` on each.
    ///
    /// Chunks are disjoint, so each task has exclusive mutable access to its
    /// elements. A trailing partial chunk (if any) is passed through as-is.
    fn for_each_chunk<T, F>(&self, data: &mut [T], chunk_len: usize, task: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Send + Sync;
}

/// Single-threaded executor: plain loops, in index order.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialExecutor;

impl Executor for SerialExecutor {
    fn for_each_index<F>(&self, n: usize, task: F)
    where
        F: Fn(usize) + Send + Sync,
    {
        for i in 0..n {
            task(i);
        }
    }

    fn for_each_chunk<T, F>(&self, data: &mut [T], chunk_len: usize, task: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Send + Sync,
    {
        for (i, chunk) in data.chunks_mut(chunk_len).enumerate() {
            task(i, chunk);
        }
    }
}

/// Worker-pool executor backed by rayon.
///
/// Uses the global pool by default; [`ParallelExecutor::with_threads`] pins
/// a dedicated pool when the caller wants isolation from other rayon users.
#[derive(Debug, Default)]
pub struct ParallelExecutor {
    pool: Option<rayon::ThreadPool>,
}

impl ParallelExecutor {
    /// Executor on the global rayon pool.
    #[must_use]
    pub const fn new() -> Self {
        Self { pool: None }
    }

    /// Executor with its own pool of `threads` workers.
    ///
    /// # Errors
    /// Returns an error if the pool cannot be spawned.
    pub fn with_threads(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .with_context(|| format!("spawning executor pool with {threads} threads"))?;
        Ok(Self { pool: Some(pool) })
    }

    fn run<R: Send>(&self, job: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(job),
            None => job(),
        }
    }
}

impl Executor for ParallelExecutor {
    fn for_each_index<F>(&self, n: usize, task: F)
    where
        F: Fn(usize) + Send + Sync,
    {
        self.run(|| (0..n).into_par_iter().for_each(|i| task(i)));
    }

    fn for_each_chunk<T, F>(&self, data: &mut [T], chunk_len: usize, task: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Send + Sync,
    {
        self.run(|| {
            data.par_chunks_mut(chunk_len)
                .enumerate()
                .for_each(|(i, chunk)| task(i, chunk));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sum_of_indices<E: Executor>(exec: &E, n: usize) -> usize {
        let acc = AtomicUsize::new(0);
        exec.for_each_index(n, |i| {
            acc.fetch_add(i, Ordering::Relaxed);
        });
        acc.into_inner()
    }

    #[test]
    fn serial_visits_every_index() {
        assert_eq!(sum_of_indices(&SerialExecutor, 100), 99 * 100 / 2);
    }

    #[test]
    fn parallel_visits_every_index() {
        assert_eq!(sum_of_indices(&ParallelExecutor::new(), 100), 99 * 100 / 2);
    }

    #[test]
    fn chunks_are_disjoint_and_complete() {
        let mut data = vec![0u32; 37]; // deliberately not a multiple of 8
        let exec = ParallelExecutor::with_threads(4).unwrap();
        exec.for_each_chunk(&mut data, 8, |i, chunk| {
            for v in chunk.iter_mut() {
                *v += 1 + i as u32;
            }
        });
        // Chunk 0 -> 1, chunk 1 -> 2, ..., trailing chunk of 5 -> 5.
        assert_eq!(data[0], 1);
        assert_eq!(data[8], 2);
        assert_eq!(data[32], 5);
        assert!(data.iter().all(|&v| v != 0));
    }

    #[test]
    fn serial_chunk_order_is_deterministic() {
        let mut data = vec![0usize; 16];
        SerialExecutor.for_each_chunk(&mut data, 4, |i, chunk| {
            for v in chunk.iter_mut() {
                *v = i;
            }
        });
        assert_eq!(&data[..5], &[0, 0, 0, 0, 1]);
    }
}
