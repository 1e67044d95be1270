//! Storage for the consensus state (the log) and the kv service's snapshots.
//!
//! The two blobs are kept side by side so that a snapshot and the truncated log that goes with
//! it can be saved together.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::Result;

const RAFT_STATE_FILE: &str = "raft.state";
const SNAPSHOT_FILE: &str = "snapshot";

/// Durable storage for consensus state and snapshots.
///
/// An empty blob means nothing was saved yet.
pub trait Persister: Send + Sync + 'static {
    /// the last saved consensus state
    fn raft_state(&self) -> Vec<u8>;
    /// saves the consensus state, keeping the current snapshot
    fn save_raft_state(&self, state: Vec<u8>) -> Result<()>;
    /// saves the consensus state and a snapshot together
    fn save_state_and_snapshot(&self, state: Vec<u8>, snapshot: Vec<u8>) -> Result<()>;
    /// the last saved snapshot
    fn snapshot(&self) -> Vec<u8>;
    /// the size of the saved consensus state, in bytes
    fn raft_state_size(&self) -> usize {
        self.raft_state().len()
    }
}

impl<T: ?Sized + Persister> Persister for Box<T> {
    fn raft_state(&self) -> Vec<u8> {
        (**self).raft_state()
    }
    fn save_raft_state(&self, state: Vec<u8>) -> Result<()> {
        (**self).save_raft_state(state)
    }
    fn save_state_and_snapshot(&self, state: Vec<u8>, snapshot: Vec<u8>) -> Result<()> {
        (**self).save_state_and_snapshot(state, snapshot)
    }
    fn snapshot(&self) -> Vec<u8> {
        (**self).snapshot()
    }
    fn raft_state_size(&self) -> usize {
        (**self).raft_state_size()
    }
}

impl<T: ?Sized + Persister> Persister for Arc<T> {
    fn raft_state(&self) -> Vec<u8> {
        (**self).raft_state()
    }
    fn save_raft_state(&self, state: Vec<u8>) -> Result<()> {
        (**self).save_raft_state(state)
    }
    fn save_state_and_snapshot(&self, state: Vec<u8>, snapshot: Vec<u8>) -> Result<()> {
        (**self).save_state_and_snapshot(state, snapshot)
    }
    fn snapshot(&self) -> Vec<u8> {
        (**self).snapshot()
    }
    fn raft_state_size(&self) -> usize {
        (**self).raft_state_size()
    }
}

/// An in-memory [`Persister`]. Clones share the same storage, which lets a test "restart"
/// a replica on top of whatever the previous instance saved.
#[derive(Debug, Default, Clone)]
pub struct MemoryPersister {
    // (raft state, snapshot)
    states: Arc<Mutex<(Vec<u8>, Vec<u8>)>>,
}

impl MemoryPersister {
    /// creates an empty persister
    pub fn new() -> Self {
        MemoryPersister::default()
    }

    fn states(&self) -> std::sync::MutexGuard<'_, (Vec<u8>, Vec<u8>)> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Persister for MemoryPersister {
    fn raft_state(&self) -> Vec<u8> {
        self.states().0.clone()
    }

    fn save_raft_state(&self, state: Vec<u8>) -> Result<()> {
        self.states().0 = state;
        Ok(())
    }

    fn save_state_and_snapshot(&self, state: Vec<u8>, snapshot: Vec<u8>) -> Result<()> {
        let mut states = self.states();
        states.0 = state;
        states.1 = snapshot;
        Ok(())
    }

    fn snapshot(&self) -> Vec<u8> {
        self.states().1.clone()
    }

    fn raft_state_size(&self) -> usize {
        self.states().0.len()
    }
}

/// A [`Persister`] that keeps its blobs as files in a directory.
///
/// Every file is written to a temporary path first and then renamed into place, so a crash
/// never leaves a half written blob behind.
#[derive(Debug)]
pub struct FilePersister {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FilePersister {
    /// opens (and creates, if needed) the persistence directory at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(FilePersister { dir, lock: Mutex::new(()) })
    }

    fn read(&self, name: &str) -> Vec<u8> {
        fs::read(self.dir.join(name)).unwrap_or_default()
    }

    fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        write_atomic(&self.dir, name, data)?;
        debug!("persisted {} bytes to {:?}", data.len(), self.dir.join(name));
        Ok(())
    }
}

fn write_atomic(dir: &Path, name: &str, data: &[u8]) -> Result<()> {
    let tmp = dir.join(format!("{}.tmp", name));
    fs::write(&tmp, data)?;
    fs::rename(&tmp, dir.join(name))?;
    Ok(())
}

impl Persister for FilePersister {
    fn raft_state(&self) -> Vec<u8> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.read(RAFT_STATE_FILE)
    }

    fn save_raft_state(&self, state: Vec<u8>) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.write(RAFT_STATE_FILE, &state)
    }

    fn save_state_and_snapshot(&self, state: Vec<u8>, snapshot: Vec<u8>) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        // the snapshot must land before the log that was truncated against it
        self.write(SNAPSHOT_FILE, &snapshot)?;
        self.write(RAFT_STATE_FILE, &state)
    }

    fn snapshot(&self) -> Vec<u8> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.read(SNAPSHOT_FILE)
    }

    fn raft_state_size(&self) -> usize {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        fs::metadata(self.dir.join(RAFT_STATE_FILE))
            .map(|m| m.len() as usize)
            .unwrap_or(0)
    }
}
