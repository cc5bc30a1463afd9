use std::{num::NonZeroUsize, thread};

/// Tuning for [`decrypt_parallel`](crate::parallel::decrypt_parallel).
///
/// Protocol constants such as the chunk size and keys are not configurable.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Config {
    /// Number of threads decrypting chunks.
    pub workers: NonZeroUsize,

    /// Number of read chunks that may wait for a worker.
    pub queue_depth: NonZeroUsize,
}

impl Config {
    /// Chunks queued per worker by default.
    const QUEUE_DEPTH_PER_WORKER: usize = 4;

    #[must_use]
    pub fn with_workers(workers: NonZeroUsize) -> Self {
        let queue_depth = workers.saturating_mul(
            NonZeroUsize::new(Self::QUEUE_DEPTH_PER_WORKER).unwrap_or(NonZeroUsize::MIN),
        );

        Self {
            workers,
            queue_depth,
        }
    }
}

impl Default for Config {
    /// Uses one worker per available CPU.
    fn default() -> Self {
        let workers = match thread::available_parallelism() {
            Ok(workers) => workers,
            Err(e) => {
                warn!("could not get available parallelism, using one worker: {e}");
                NonZeroUsize::MIN
            }
        };

        let config = Self::with_workers(workers);
        trace!(
            "decrypting with {} workers and queue depth {}",
            config.workers,
            config.queue_depth
        );
        config
    }
}
