use std::time::Duration;

use crate::{KvsError, Result};

/// how long a request handler waits for its log position to be applied
pub const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_millis(500);

/// how often blocked request handlers are woken up even if nothing was applied
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Settings of a [`KvService`](crate::KvService)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// take a snapshot once the consensus log grows past this many bytes.
    /// `None` disables snapshotting
    pub max_raft_state: Option<usize>,
    /// upper bound on the time a Get/Put/Append waits for its entry to commit
    pub commit_timeout: Duration,
    /// period of the liveness tick that wakes every blocked handler
    pub tick_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_raft_state: None,
            commit_timeout: DEFAULT_COMMIT_TIMEOUT,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

impl Config {
    /// builds a default config with the given snapshot threshold, where `-1` disables snapshots.
    ///
    /// # Errors
    /// returns [`KvsError::Parsing`] for any other negative threshold
    pub fn with_max_raft_state(max_raft_state: i64) -> Result<Self> {
        let max_raft_state = match max_raft_state {
            -1 => None,
            n if n >= 0 => Some(n as usize),
            n => {
                return Err(KvsError::Parsing(format!(
                    "snapshot threshold must be -1 or a byte count, got {}",
                    n
                )))
            }
        };
        Ok(Config { max_raft_state, ..Config::default() })
    }

    /// sets the commit timeout
    pub fn commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout = timeout;
        self
    }

    /// sets the liveness tick interval
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }
}
