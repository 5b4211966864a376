//! Explicit parallel executor.
//!
//! Drivers own an `Executor` value instead of reaching for a process-global
//! pool, so tests can inject a single-threaded one and concurrency degrees
//! stay a caller decision. A body error cancels the sweep and propagates.

use rayon::prelude::*;

use crate::error::ValidationError;

pub struct Executor {
    pool: rayon::ThreadPool,
}

impl Executor {
    pub fn new(threads: usize) -> Result<Self, ValidationError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .build()
            .map_err(|e| ValidationError::ThreadPool(e.to_string()))?;
        Ok(Executor { pool })
    }

    fn hardware_threads() -> usize {
        std::thread::available_parallelism().map_or(2, |n| n.get())
    }

    /// Full hardware concurrency, for the inner per-permutation sweeps.
    pub fn masters_default() -> Result<Self, ValidationError> {
        Self::new(Self::hardware_threads())
    }

    /// Modest pool for the outer per-strategy loops.
    pub fn outer_default() -> Result<Self, ValidationError> {
        Self::new((Self::hardware_threads() / 2).clamp(2, 4))
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `body` for every index in `0..count` with per-worker scratch
    /// state, blocking until all complete. The first error wins.
    pub fn parallel_for_init<S, I, B>(&self, count: u32, init: I, body: B) -> Result<(), ValidationError>
    where
        S: Send,
        I: Fn() -> S + Send + Sync,
        B: Fn(&mut S, u32) -> Result<(), ValidationError> + Send + Sync,
    {
        self.pool.install(|| {
            (0..count)
                .into_par_iter()
                .try_for_each_init(&init, |state, index| body(state, index))
        })
    }

    /// Stateless variant.
    pub fn parallel_for<B>(&self, count: u32, body: B) -> Result<(), ValidationError>
    where
        B: Fn(u32) -> Result<(), ValidationError> + Send + Sync,
    {
        self.parallel_for_init(count, || (), |(), index| body(index))
    }
}
