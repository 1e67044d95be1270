use std::sync::{Mutex, MutexGuard};

use crossbeam::channel::Sender;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::persister::Persister;
use super::{ApplyMsg, Consensus, Proposal};
use crate::command::Op;
use crate::{KvsError, Result};

/// A log entry, tagged with the term it was proposed in
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    term: u64,
    op: Op,
}

/// The part of the log that survives a restart
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistentState {
    term: u64,
    snapshot_index: u64,
    snapshot_term: u64,
    entries: Vec<Entry>,
}

#[derive(Debug)]
struct LogState {
    term: u64,
    is_leader: bool,
    stalled: bool,
    dead: bool,
    // last log position covered by the latest snapshot
    snapshot_index: u64,
    snapshot_term: u64,
    // entries after `snapshot_index`
    entries: Vec<Entry>,
    // highest position sent on the commit stream
    delivered: u64,
}

impl LogState {
    fn last_index(&self) -> u64 {
        self.snapshot_index + self.entries.len() as u64
    }

    fn offset(&self, index: u64) -> usize {
        (index - self.snapshot_index - 1) as usize
    }

    fn entry(&self, index: u64) -> Option<&Entry> {
        if index <= self.snapshot_index {
            return None;
        }
        self.entries.get(self.offset(index))
    }

    // drops every entry up to and including `index`
    fn compact(&mut self, index: u64, term: u64) {
        let covered = (index - self.snapshot_index) as usize;
        if covered >= self.entries.len() {
            self.entries.clear();
        } else {
            self.entries.drain(..covered);
        }
        self.snapshot_index = index;
        self.snapshot_term = term;
    }

    fn to_persistent(&self) -> PersistentState {
        PersistentState {
            term: self.term,
            snapshot_index: self.snapshot_index,
            snapshot_term: self.snapshot_term,
            entries: self.entries.clone(),
        }
    }
}

/// A single-replica consensus log that lives in the same process as the kv service.
///
/// Every op proposed while this peer is leader is committed immediately and delivered on the
/// commit stream in log order. A handful of knobs let a caller simulate what a real cluster
/// would do to a replica: losing leadership ([`set_leader`](LocalRaft::set_leader)),
/// a new election ([`bump_term`](LocalRaft::bump_term)), a leader that never commits
/// ([`stall`](LocalRaft::stall)), a different leader's entry winning a log position
/// ([`overwrite`](LocalRaft::overwrite)) and a snapshot pushed by a leader
/// ([`offer_snapshot`](LocalRaft::offer_snapshot)).
pub struct LocalRaft {
    state: Mutex<LogState>,
    persister: Box<dyn Persister>,
    apply_tx: Sender<ApplyMsg>,
}

impl LocalRaft {
    /// creates a log on top of `persister`, re-delivering any entries that were persisted
    /// after the last snapshot.
    ///
    /// `apply_tx` must be unbounded: entries are sent while proposals are in flight, and a
    /// full channel would block the proposer against the applier.
    ///
    /// # Errors
    /// returns [`KvsError::Serde`](crate::KvsError::Serde) if the persisted log is corrupted,
    /// or [`KvsError::StringErr`](crate::KvsError::StringErr) if `apply_tx` is bounded
    pub fn new(persister: impl Persister, apply_tx: Sender<ApplyMsg>) -> Result<LocalRaft> {
        if let Some(cap) = apply_tx.capacity() {
            return Err(KvsError::StringErr(format!(
                "the commit stream must be unbounded, got a capacity of {}",
                cap
            )));
        }
        let raw = persister.raft_state();
        let persisted = if raw.is_empty() {
            PersistentState { term: 1, ..PersistentState::default() }
        } else {
            serde_json::from_slice::<PersistentState>(&raw)?
        };

        let state = LogState {
            term: persisted.term,
            is_leader: true,
            stalled: false,
            dead: false,
            snapshot_index: persisted.snapshot_index,
            snapshot_term: persisted.snapshot_term,
            entries: persisted.entries,
            delivered: persisted.snapshot_index,
        };
        info!(
            "local raft starting at term {}, snapshot index {}, last index {}",
            state.term,
            state.snapshot_index,
            state.last_index()
        );

        let raft = LocalRaft { state: Mutex::new(state), persister: Box::new(persister), apply_tx };
        {
            let mut state = raft.lock();
            raft.deliver_committed(&mut state);
        }
        Ok(raft)
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, state: &LogState) {
        let result = serde_json::to_vec(&state.to_persistent())
            .map_err(KvsError::from)
            .and_then(|raw| self.persister.save_raft_state(raw));
        if let Err(e) = result {
            error!("could not persist the log: {}", e);
        }
    }

    // sends every entry after `delivered`, unless stalled
    fn deliver_committed(&self, state: &mut LogState) {
        if state.stalled || state.dead {
            return;
        }
        while state.delivered < state.last_index() {
            let index = state.delivered + 1;
            let op = match state.entry(index) {
                Some(entry) => entry.op.clone(),
                None => break,
            };
            if self.apply_tx.send(ApplyMsg::Command { op, index }).is_err() {
                warn!("commit stream closed, dropping entry {}", index);
                return;
            }
            state.delivered = index;
        }
    }

    /// the position of the last entry in the log
    pub fn last_index(&self) -> u64 {
        self.lock().last_index()
    }

    /// the position of the last entry covered by a snapshot
    pub fn snapshot_index(&self) -> u64 {
        self.lock().snapshot_index
    }

    /// makes this peer believe it is (or is not) the leader
    pub fn set_leader(&self, is_leader: bool) {
        self.lock().is_leader = is_leader;
    }

    /// starts a new term, as if an election took place. Returns the new term
    pub fn bump_term(&self) -> u64 {
        let mut state = self.lock();
        state.term += 1;
        self.persist(&state);
        state.term
    }

    /// while stalled, proposals are still appended to the log but never delivered.
    /// Un-stalling delivers everything that piled up
    pub fn stall(&self, stalled: bool) {
        let mut state = self.lock();
        state.stalled = stalled;
        self.deliver_committed(&mut state);
    }

    /// replaces the not yet delivered entry at `index` with `op`, as if another leader's entry
    /// won that position, then commits the log up to `index`.
    ///
    /// Returns false if `index` was already delivered or is not in the log
    pub fn overwrite(&self, index: u64, op: Op) -> bool {
        let mut state = self.lock();
        if index <= state.delivered || index > state.last_index() {
            return false;
        }
        let offset = state.offset(index);
        let term = state.term;
        state.entries[offset] = Entry { term, op };
        state.entries.truncate(offset + 1);
        self.persist(&state);

        while state.delivered < index {
            let next = state.delivered + 1;
            let op = match state.entry(next) {
                Some(entry) => entry.op.clone(),
                None => break,
            };
            if self.apply_tx.send(ApplyMsg::Command { op, index: next }).is_err() {
                return false;
            }
            state.delivered = next;
        }
        true
    }

    /// pushes an install-snapshot message onto the commit stream
    pub fn offer_snapshot(&self, term: u64, index: u64, data: Vec<u8>) {
        debug!("offering snapshot at index {} (term {})", index, term);
        if self.apply_tx.send(ApplyMsg::Snapshot { data, term, index }).is_err() {
            warn!("commit stream closed, dropping snapshot at {}", index);
        }
    }
}

impl Consensus for LocalRaft {
    fn start(&self, op: &Op) -> Proposal {
        let mut state = self.lock();
        if !state.is_leader || state.dead {
            return Proposal { index: state.last_index() + 1, term: state.term, is_leader: false };
        }

        let term = state.term;
        state.entries.push(Entry { term, op: op.clone() });
        let index = state.last_index();
        self.persist(&state);
        self.deliver_committed(&mut state);
        Proposal { index, term, is_leader: true }
    }

    fn term(&self) -> u64 {
        self.lock().term
    }

    fn is_leader(&self) -> bool {
        let state = self.lock();
        state.is_leader && !state.dead
    }

    fn snapshot(&self, index: u64, snapshot: Vec<u8>) {
        let mut state = self.lock();
        if index <= state.snapshot_index || index > state.last_index() {
            return;
        }
        let term = state.entry(index).map(|e| e.term).unwrap_or(state.term);
        state.compact(index, term);

        let result = serde_json::to_vec(&state.to_persistent())
            .map_err(KvsError::from)
            .and_then(|raw| self.persister.save_state_and_snapshot(raw, snapshot));
        match result {
            Ok(()) => info!("log compacted through index {}", index),
            Err(e) => error!("could not persist snapshot at {}: {}", index, e),
        }
    }

    fn cond_install_snapshot(&self, term: u64, index: u64, snapshot: &[u8]) -> bool {
        let mut state = self.lock();
        if index <= state.snapshot_index {
            warn!(
                "rejecting snapshot at {}, already have one at {}",
                index, state.snapshot_index
            );
            return false;
        }
        if index > state.last_index() {
            state.entries.clear();
            state.snapshot_index = index;
            state.snapshot_term = term;
        } else {
            state.compact(index, term);
        }
        state.delivered = state.delivered.max(index);

        let result = serde_json::to_vec(&state.to_persistent())
            .map_err(KvsError::from)
            .and_then(|raw| self.persister.save_state_and_snapshot(raw, snapshot.to_vec()));
        if let Err(e) = result {
            error!("could not persist installed snapshot at {}: {}", index, e);
        }
        true
    }

    fn log_size(&self) -> usize {
        self.persister.raft_state_size()
    }

    fn read_snapshot(&self) -> Vec<u8> {
        self.persister.snapshot()
    }

    fn kill(&self) {
        self.lock().dead = true;
    }
}
