use std::sync::atomic::{AtomicBool, Ordering};
use std::process;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError};
use tracing::{debug, error, info, warn};

use super::snapshot;
use super::store::Store;
use crate::command::{GetArgs, GetReply, Op, PutAppendArgs, PutAppendReply, Status};
use crate::config::Config;
use crate::raft::{ApplyMsg, Consensus};
use crate::Result;

/// A linearizable key/value service layered on top of a [`Consensus`] module.
///
/// Every Get, Put and Append is proposed to consensus and only answered once the applier has
/// seen the op committed at the position it was proposed at. A background applier thread
/// drains the commit stream and is the only writer of the [`Store`]; a ticker thread wakes
/// blocked handlers periodically so none of them sleeps past its deadline.
///
/// `KvService` is a cheap handle, clones share the same replica. The background threads only
/// hold weak references, so dropping the last handle stops them and the consensus module
/// just like [`kill`](KvService::kill) does.
pub struct KvService<R: Consensus> {
    shared: Arc<Shared<R>>,
}

impl<R: Consensus> Clone for KvService<R> {
    fn clone(&self) -> Self {
        KvService { shared: Arc::clone(&self.shared) }
    }
}

struct Shared<R> {
    me: usize,
    raft: R,
    config: Config,
    inner: Mutex<Inner>,
    // signalled after every applied entry and on every tick
    applied: Condvar,
    dead: AtomicBool,
}

struct Inner {
    store: Store,
    // the latest term seen by a request handler
    term: u64,
}

impl<R: Consensus> KvService<R> {
    /// Starts the replica numbered `me`, consuming the commit stream `apply_ch` of `raft`.
    ///
    /// The store is restored from the snapshot persisted by `raft`, if any.
    ///
    /// # Errors
    /// returns [`KvsError::Codec`](crate::KvsError::Codec) if the persisted snapshot is
    /// corrupted, or an IO error if the background threads could not be spawned
    pub fn new(raft: R, apply_ch: Receiver<ApplyMsg>, me: usize, config: Config) -> Result<Self> {
        let persisted = raft.read_snapshot();
        let store = if persisted.is_empty() {
            Store::new()
        } else {
            let (store, last_index) = snapshot::decode(&persisted)?;
            info!("[{}] restored {} keys from snapshot at {}", me, store.len(), last_index);
            store
        };

        let shared = Arc::new(Shared {
            me,
            raft,
            config,
            inner: Mutex::new(Inner { store, term: 1 }),
            applied: Condvar::new(),
            dead: AtomicBool::new(false),
        });

        let applier = Arc::downgrade(&shared);
        thread::Builder::new()
            .name(format!("kv-applier-{}", me))
            .spawn(move || apply_loop(me, applier, apply_ch, config.tick_interval))?;

        let ticker = Arc::downgrade(&shared);
        thread::Builder::new()
            .name(format!("kv-ticker-{}", me))
            .spawn(move || tick_loop(me, ticker, config.tick_interval))?;

        info!("[{}] kv service started", me);
        Ok(KvService { shared })
    }

    /// Reads `args.key`.
    ///
    /// The reply is `Ok` with the value, `NoKey` if the key holds nothing, or `WrongLeader`
    /// if this replica could not get the read committed
    pub fn get(&self, args: GetArgs) -> GetReply {
        let op = Op::get(args.id, args.key);
        match self.shared.commit(&op) {
            Some(inner) => match inner.store.get(&op.key) {
                Some(value) => GetReply { status: Status::Ok, value: value.to_owned() },
                None => GetReply { status: Status::NoKey, value: String::new() },
            },
            None => GetReply::wrong_leader(),
        }
    }

    /// Puts or appends `args.value` at `args.key`.
    ///
    /// The reply is `Ok` once the write is committed, `WrongLeader` otherwise. A write whose
    /// id was already applied is committed again but not re-applied
    pub fn put_append(&self, args: PutAppendArgs) -> PutAppendReply {
        let op = Op { id: args.id, key: args.key, value: args.value, kind: args.op.into() };
        let status = match self.shared.commit(&op) {
            Some(_) => Status::Ok,
            None => Status::WrongLeader,
        };
        PutAppendReply { status }
    }

    /// Stops the applier and ticker threads and the underlying consensus module.
    /// In-flight requests still run into their own timeout
    pub fn kill(&self) {
        self.shared.dead.store(true, Ordering::SeqCst);
        self.shared.raft.kill();
        self.shared.applied.notify_all();
        info!("[{}] kv service killed", self.shared.me);
    }

    /// whether [`kill`](KvService::kill) was called
    pub fn is_killed(&self) -> bool {
        self.shared.killed()
    }

    /// the index of this replica
    pub fn me(&self) -> usize {
        self.shared.me
    }

    /// the current term of the underlying consensus module
    pub fn term(&self) -> u64 {
        self.shared.raft.term()
    }

    /// whether the underlying consensus module believes it is the leader
    pub fn is_leader(&self) -> bool {
        self.shared.raft.is_leader()
    }

    /// the highest log position applied so far
    pub fn last_applied(&self) -> u64 {
        self.shared.lock().store.last_applied()
    }

    /// the consensus module backing this service
    pub fn raft(&self) -> &R {
        &self.shared.raft
    }
}

impl<R: Consensus> Shared<R> {
    fn killed(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Proposes `op` and waits until its log position is applied.
    ///
    /// Returns the locked state if `op` itself was committed there, `None` if this replica is
    /// not the leader, a newer term was observed, another op took the position or the wait
    /// timed out.
    fn commit(&self, op: &Op) -> Option<MutexGuard<'_, Inner>> {
        let mut inner = self.lock();
        let proposal = self.raft.start(op);
        if !proposal.is_leader || proposal.term > inner.term {
            debug!(
                "[{}] request {} rejected: leader {}, term {} (last seen {})",
                self.me, op.id, proposal.is_leader, proposal.term, inner.term
            );
            inner.term = proposal.term;
            return None;
        }
        debug!("[{}] request {} {:?} {:?} proposed at {}", self.me, op.id, op.kind, op.key, proposal.index);

        let deadline = Instant::now() + self.config.commit_timeout;
        loop {
            if let Some(id) = inner.store.committed_at(proposal.index) {
                if id != op.id {
                    debug!(
                        "[{}] request {} lost position {} to request {}",
                        self.me, op.id, proposal.index, id
                    );
                    return None;
                }
                debug!("[{}] request {} committed at {}", self.me, op.id, proposal.index);
                return Some(inner);
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("[{}] request {} timed out waiting for {}", self.me, op.id, proposal.index);
                return None;
            }
            let (guard, _) = self
                .applied
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            inner = guard;
        }
    }

    fn handle(&self, msg: ApplyMsg) {
        let mut inner = self.lock();
        match msg {
            ApplyMsg::Command { op, index } => {
                let mutated = inner.store.apply(index, &op);
                debug!(
                    "[{}] applied {:?} {:?} of request {} at {} (mutated: {})",
                    self.me, op.kind, op.key, op.id, index, mutated
                );
                self.applied.notify_all();
                self.maybe_snapshot(&inner.store, index);
            }
            ApplyMsg::Snapshot { data, term, index } => {
                if !self.raft.cond_install_snapshot(term, index, &data) {
                    warn!("[{}] snapshot at {} (term {}) not installed", self.me, index, term);
                    return;
                }
                match snapshot::decode(&data) {
                    Ok((store, _)) => {
                        info!("[{}] installed snapshot at {} with {} keys", self.me, index, store.len());
                        inner.store = store;
                        self.applied.notify_all();
                    }
                    Err(e) => {
                        // the log prefix is already gone, this replica cannot recover its state
                        error!("[{}] received a corrupted snapshot at {}: {}, aborting", self.me, index, e);
                        process::abort();
                    }
                }
            }
        }
    }

    fn maybe_snapshot(&self, store: &Store, index: u64) {
        let max = match self.config.max_raft_state {
            Some(max) => max,
            None => return,
        };
        let size = self.raft.log_size();
        if size <= max {
            return;
        }
        match snapshot::encode(store, index) {
            Ok(data) => {
                info!("[{}] log is {} bytes, snapshotting at {}", self.me, size, index);
                self.raft.snapshot(index, data);
            }
            Err(e) => error!("[{}] could not encode snapshot at {}: {}", self.me, index, e),
        }
    }
}

// drains the commit stream until the service is killed, every handle is dropped or the
// stream is closed
fn apply_loop<R: Consensus>(
    me: usize,
    weak: Weak<Shared<R>>,
    apply_ch: Receiver<ApplyMsg>,
    tick: Duration,
) {
    loop {
        let msg = match apply_ch.recv_timeout(tick) {
            Ok(msg) => Some(msg),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                info!("[{}] commit stream closed", me);
                break;
            }
        };
        let shared = match weak.upgrade() {
            Some(shared) if !shared.killed() => shared,
            _ => break,
        };
        if let Some(msg) = msg {
            shared.handle(msg);
        }
    }
    info!("[{}] applier stopped", me);
}

fn tick_loop<R: Consensus>(me: usize, weak: Weak<Shared<R>>, tick: Duration) {
    loop {
        thread::sleep(tick);
        match weak.upgrade() {
            Some(shared) if !shared.killed() => shared.applied.notify_all(),
            _ => break,
        }
    }
    debug!("[{}] ticker stopped", me);
}
