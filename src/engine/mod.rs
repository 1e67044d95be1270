//! The replicated key/value engine.
//!
//! [`KvService`] is the replica itself: it proposes client requests to consensus, applies the
//! committed log to a [`Store`] and answers clients once their request is known to be committed.
//! [`snapshot`] encodes a [`Store`] so the consensus log can be compacted.
use crate::command::{GetArgs, GetReply, PutAppendArgs, PutAppendReply};
use crate::raft::Consensus;

mod service;
pub mod snapshot;
mod store;

pub use self::service::KvService;
pub use self::store::Store;

/// The operations a key/value engine offers to the network front end
pub trait KvsEngine: Clone + Send + 'static {
    /// reads a key
    ///
    /// The reply carries [`Status::NoKey`](crate::Status::NoKey) if the key holds no value.
    fn get(&self, args: GetArgs) -> GetReply;

    /// puts or appends a value
    fn put_append(&self, args: PutAppendArgs) -> PutAppendReply;
}

impl<R: Consensus> KvsEngine for KvService<R> {
    fn get(&self, args: GetArgs) -> GetReply {
        KvService::get(self, args)
    }

    fn put_append(&self, args: PutAppendArgs) -> PutAppendReply {
        KvService::put_append(self, args)
    }
}
