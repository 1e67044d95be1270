use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::command::{Op, OpKind, RequestId};

/// All of the state owned by a kv replica: the key/value data itself, the id of the op applied
/// at every log position, and the set of request ids that were already applied.
///
/// Only the applier mutates a `Store`, one committed entry at a time and in log order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Store {
    // key -> value
    pub(crate) data: BTreeMap<String, String>,
    // log position -> id of the op applied there. Never overwritten
    pub(crate) index: BTreeMap<u64, RequestId>,
    // ids of the requests that were already applied
    pub(crate) applied: BTreeSet<RequestId>,
}

impl Store {
    /// creates an empty store
    pub fn new() -> Self {
        Store::default()
    }

    /// Applies the op committed at log position `index`.
    ///
    /// An op whose id was already applied leaves the data untouched, but its position is
    /// still recorded so whoever waits on `index` can resolve.
    /// Returns true if the data was mutated.
    pub fn apply(&mut self, index: u64, op: &Op) -> bool {
        let mut mutated = false;
        if self.applied.insert(op.id) {
            match op.kind {
                OpKind::Put => {
                    self.data.insert(op.key.clone(), op.value.clone());
                    mutated = true;
                }
                OpKind::Append => {
                    self.data.entry(op.key.clone()).or_default().push_str(&op.value);
                    mutated = true;
                }
                OpKind::Get => (),
            }
        } else {
            debug!("request {} already applied, skipping {:?} at {}", op.id, op.kind, index);
        }

        if let Some(prev) = self.index.get(&index) {
            if *prev != op.id {
                warn!("position {} already holds request {}, ignoring {}", index, prev, op.id);
            }
        } else {
            self.index.insert(index, op.id);
        }
        mutated
    }

    /// the id of the op applied at log position `index`, if that position was applied
    pub fn committed_at(&self, index: u64) -> Option<RequestId> {
        self.index.get(&index).copied()
    }

    /// the current value of `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// whether the request `id` was applied
    pub fn is_applied(&self, id: RequestId) -> bool {
        self.applied.contains(&id)
    }

    /// the highest log position applied so far, 0 if nothing was applied
    pub fn last_applied(&self) -> u64 {
        self.index.keys().next_back().copied().unwrap_or(0)
    }

    /// the number of keys holding a value
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// true if no key holds a value
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
