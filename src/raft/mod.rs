//! The boundary between the kv service and the consensus (log replication) module.
//!
//! The kv service only needs a handful of things from consensus: a way to propose an [`Op`],
//! an ordered stream of [`ApplyMsg`]s describing what was committed, and a place to hand off
//! snapshots so the log can be truncated. Anything implementing [`Consensus`] can back a
//! [`KvService`](crate::KvService). [`LocalRaft`] is a single-replica implementation.
use crate::command::Op;

mod local;
pub mod persister;

pub use self::local::LocalRaft;

/// A message on the commit stream, delivered to the kv service in log order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyMsg {
    /// `op` has been committed at log position `index`
    Command {
        /// the committed operation
        op: Op,
        /// its log position
        index: u64,
    },
    /// an out-of-band snapshot covering the log up to `index`, e.g. sent by a leader that has
    /// already compacted past this replica's log
    Snapshot {
        /// an encoded snapshot, opaque to consensus
        data: Vec<u8>,
        /// term of the last entry covered by the snapshot
        term: u64,
        /// log position of the last entry covered by the snapshot
        index: u64,
    },
}

/// The answer of [`Consensus::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proposal {
    /// the log position the op will occupy if it commits
    pub index: u64,
    /// the current term of this peer
    pub term: u64,
    /// whether this peer believes it is the leader. If not, the op was not appended
    pub is_leader: bool,
}

/// A consensus module that replicates [`Op`]s.
pub trait Consensus: Send + Sync + 'static {
    /// tries to append `op` to the replicated log. Must not block waiting for the commit,
    /// nor on a full commit stream: the kv service calls it while holding its own lock
    fn start(&self, op: &Op) -> Proposal;

    /// the current term of this peer
    fn term(&self) -> u64;

    /// whether this peer believes it is the leader
    fn is_leader(&self) -> bool;

    /// durably stores `snapshot`, which covers the log up to and including `index`,
    /// and allows the log to be truncated up to that position
    fn snapshot(&self, index: u64, snapshot: Vec<u8>);

    /// asks whether a snapshot received on the commit stream should be installed now.
    /// Returns false for snapshots that are outdated or superseded
    fn cond_install_snapshot(&self, term: u64, index: u64, snapshot: &[u8]) -> bool;

    /// the size in bytes of the persisted consensus state
    fn log_size(&self) -> usize;

    /// the last persisted snapshot, empty if there is none
    fn read_snapshot(&self) -> Vec<u8>;

    /// stops this peer
    fn kill(&self);
}
