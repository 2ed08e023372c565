//! Utilities for data-parallel work on a fixed-size `rayon` pool.

use anyhow::{Context, Result};
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};
use std::{num::NonZeroUsize, sync::Arc};

/// A fixed-size pool of worker threads used for data parallelism inside a
/// single simulation step.
///
/// The pool is meant to be shared (usually through an [`Arc`]) between the
/// components that fan out work, so that they all draw from the same set of
/// workers rather than each spinning up their own.
#[derive(Debug)]
pub struct RayonThreadPool {
    pool: ThreadPool,
    num_threads: NonZeroUsize,
}

impl RayonThreadPool {
    /// Creates a pool with the given number of worker threads.
    ///
    /// # Errors
    /// Returns an error if the operating system refuses to spawn the
    /// worker threads.
    pub fn new(num_threads: NonZeroUsize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads.get())
            .thread_name(|idx| format!("isolevel-worker-{idx}"))
            .build()
            .with_context(|| format!("Could not create pool with {num_threads} worker threads"))?;

        Ok(Self { pool, num_threads })
    }

    /// Creates a pool with one worker per available hardware thread.
    pub fn with_available_parallelism() -> Result<Self> {
        Self::new(available_parallelism())
    }

    /// Creates a shared pool with the given number of worker threads, or
    /// one per hardware thread if `num_threads` is [`None`].
    pub fn shared(num_threads: Option<NonZeroUsize>) -> Result<Arc<Self>> {
        Self::new(num_threads.unwrap_or_else(available_parallelism)).map(Arc::new)
    }

    pub fn pool(&self) -> &ThreadPool {
        &self.pool
    }

    pub fn num_threads(&self) -> NonZeroUsize {
        self.num_threads
    }

    /// Splits `data` into consecutive chunks of `chunk_size` elements (the
    /// last one may be shorter) and calls the given closure with the index
    /// and contents of each chunk on the workers.
    ///
    /// With `chunk_size` set to the number of samples in one slice of a 3D
    /// array, this is a parallel loop over the outermost axis.
    ///
    /// # Panics
    /// If `chunk_size` is zero.
    pub fn for_each_chunk_mut<T: Send>(
        &self,
        data: &mut [T],
        chunk_size: usize,
        f: impl Fn(usize, &mut [T]) + Sync + Send,
    ) {
        self.pool.install(|| {
            data.par_chunks_mut(chunk_size)
                .enumerate()
                .for_each(|(chunk_idx, chunk)| f(chunk_idx, chunk));
        });
    }

    /// Maps every item through the given closure on the workers and collects
    /// the results in item order.
    pub fn map_collect<T: Sync, R: Send>(
        &self,
        items: &[T],
        f: impl Fn(&T) -> R + Sync + Send,
    ) -> Vec<R> {
        self.pool.install(|| items.par_iter().map(f).collect())
    }

    /// Calls the given closure for every element of `data` together with its
    /// index, spreading the elements over the workers.
    pub fn for_each_mut<T: Send>(&self, data: &mut [T], f: impl Fn(usize, &mut T) + Sync + Send) {
        self.pool.install(|| {
            data.par_iter_mut()
                .enumerate()
                .for_each(|(idx, item)| f(idx, item));
        });
    }
}

const FALLBACK_NUM_THREADS: NonZeroUsize = NonZeroUsize::new(4).unwrap();

/// Returns the number of hardware threads, falling back to four if it can
/// not be determined.
pub fn available_parallelism() -> NonZeroUsize {
    std::thread::available_parallelism().unwrap_or(FALLBACK_NUM_THREADS)
}
