//! Worker partitioning and per-worker seeding.
//!
//! Sample-path indices are split into contiguous, near-equal shares; the remainder goes to the
//! earliest workers. A worker's RNG is seeded from a fixed high-order component and the index of
//! its first path, so a given `n_workers` reproduces its draws exactly. A different `n_workers`
//! moves share boundaries and therefore changes the random draws; this is expected.

use std::ops::Range;

use rand::SeedableRng;

use crate::core::EvalRng;

/// Contiguous shares of `0..n_paths`, at most `n_workers` of them, none empty.
pub fn allocate_jobs(n_paths: usize, n_workers: usize) -> Vec<Range<usize>> {
    let workers = n_workers.max(1);
    let base = n_paths / workers;
    let rem = n_paths % workers;
    let mut start = 0;
    (0..workers)
        .map(|i| if i < rem { base + 1 } else { base })
        .filter(|&n| n > 0)
        .map(|n| {
            let share = start..start + n;
            start += n;
            share
        })
        .collect()
}

#[inline]
pub fn worker_seed(high: u32, first_path: usize) -> u64 {
    (u64::from(high) << 32) | (first_path as u64 & 0xFFFF_FFFF)
}

pub fn worker_rng(high: u32, first_path: usize) -> EvalRng {
    EvalRng::seed_from_u64(worker_seed(high, first_path))
}
