use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, error, warn};

use super::ThreadPool;
use crate::Result;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A thread pool whose workers pull jobs off a shared crossbeam channel.
///
/// The pool is the only producer and every worker is a consumer. A worker whose job panics is
/// replaced by a fresh thread, so one bad connection can't shrink the pool.
pub struct SharedQueueThreadPool {
    tx: Sender<Job>,
}

impl ThreadPool for SharedQueueThreadPool {
    fn new(threads: u32) -> Result<Self> {
        let (tx, rx) = channel::unbounded::<Job>();
        for id in 0..threads {
            let worker = Worker { id, rx: rx.clone() };
            thread::Builder::new()
                .name(format!("kvs-worker-{}", id))
                .spawn(move || worker.run())?;
        }
        debug!("started a shared queue pool with {} threads", threads);
        Ok(SharedQueueThreadPool { tx })
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tx.send(Box::new(job)).is_err() {
            error!("no worker left to run the job");
        }
    }
}

/// the receiving end of the pool, owned by one worker thread
#[derive(Clone)]
struct Worker {
    id: u32,
    rx: Receiver<Job>,
}

impl Worker {
    fn run(self) {
        // `self` is dropped when the thread unwinds, which respawns the worker
        while let Ok(job) = self.rx.recv() {
            job();
        }
        debug!("worker {} exiting, the pool was dropped", self.id);
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if !thread::panicking() {
            return;
        }
        warn!("worker {} panicked, starting a replacement", self.id);
        let worker = self.clone();
        if let Err(e) = thread::Builder::new()
            .name(format!("kvs-worker-{}", worker.id))
            .spawn(move || worker.run())
        {
            error!("failed to respawn worker {}: {}", self.id, e);
        }
    }
}
