//! Bounded worker pool
//!
//! Every bulk elliptic-curve job runs on a fixed-size rayon pool. Results are
//! written back by task index, so output order never depends on completion order.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::PoolError;

#[derive(Debug)]
pub struct WorkerPool {
    pool: ThreadPool,
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self, PoolError> {
        if workers == 0 {
            return Err(PoolError::NoWorkers);
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("blindset-worker-{}", i))
            .build()?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Apply `f` to every job in parallel; output `i` belongs to job `i`
    pub fn map<J, T, F>(&self, jobs: &[J], f: F) -> Vec<T>
    where
        J: Sync,
        T: Send,
        F: Fn(&J) -> T + Sync + Send,
    {
        self.pool.install(|| jobs.par_iter().map(&f).collect())
    }

    /// Fallible variant of [`map`](Self::map); the first error in job order wins
    pub fn try_map<J, T, E, F>(&self, jobs: &[J], f: F) -> Result<Vec<T>, E>
    where
        J: Sync,
        T: Send,
        E: Send,
        F: Fn(&J) -> Result<T, E> + Sync + Send,
    {
        self.map(jobs, f).into_iter().collect()
    }

    /// Run tagged jobs in any order and scatter `(index, output)` into place
    pub fn scatter<J, T, F>(&self, len: usize, jobs: &[J], f: F) -> Result<Vec<T>, PoolError>
    where
        J: Sync,
        T: Send,
        F: Fn(&J) -> (usize, T) + Sync + Send,
    {
        let outputs = self.map(jobs, f);
        place_by_index(len, outputs)
    }
}

/// Place `(index, value)` pairs into a vector of length `len`.
///
/// Every index must appear exactly once.
pub fn place_by_index<T>(len: usize, items: Vec<(usize, T)>) -> Result<Vec<T>, PoolError> {
    let mut slots: Vec<Option<T>> = Vec::with_capacity(len);
    slots.resize_with(len, || None);

    for (index, value) in items {
        let slot = slots
            .get_mut(index)
            .ok_or(PoolError::IndexOutOfRange { index, len })?;
        if slot.is_some() {
            return Err(PoolError::DuplicateIndex(index));
        }
        *slot = Some(value);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| slot.ok_or(PoolError::MissingIndex(index)))
        .collect()
}
