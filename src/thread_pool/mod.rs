//! Thread pools used by [`KvsServer`](crate::KvsServer) to serve client connections.
//!
//! Request handlers block until their op commits (or times out), so every connection is served
//! on a pool thread rather than on the accept loop.
use crate::Result;

mod rayon_pool;
mod shared_queue;

pub use self::rayon_pool::RayonThreadPool;
pub use self::shared_queue::SharedQueueThreadPool;

/// A pool of threads that runs jobs
pub trait ThreadPool {
    /// creates a pool running `threads` threads
    ///
    /// # Errors
    /// returns an error if the threads could not be started
    fn new(threads: u32) -> Result<Self>
    where
        Self: Sized;

    /// runs `job` on one of the pool's threads
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static;
}
