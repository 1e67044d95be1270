use tracing::debug;

use super::ThreadPool;
use crate::{KvsError, Result};

/// A work stealing pool backed by [`rayon`](https://docs.rs/rayon)
pub struct RayonThreadPool {
    pool: rayon::ThreadPool,
}

impl ThreadPool for RayonThreadPool {
    fn new(threads: u32) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads as usize)
            .thread_name(|i| format!("kvs-rayon-{}", i))
            .build()
            .map_err(|e| KvsError::StringErr(format!("could not build thread pool: {}", e)))?;
        debug!("started a rayon pool with {} threads", threads);
        Ok(RayonThreadPool { pool })
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(job);
    }
}
