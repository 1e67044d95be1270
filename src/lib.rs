#![deny(missing_docs)]
//! A linearizable, replicated key-value service that maps [`String`] keys to [`String`] values.
//!
//! The service sits on top of a consensus (log replication) module, see the [`Consensus`]
//! trait. Consensus provides an agreed, totally ordered log of operations; this crate turns that
//! log into a key/value store that clients can `Get`, `Put` and `Append` against, while
//! tolerating leader changes, retried requests and unbounded log growth.
//!
//! ## Supported Operations
//! - `Get` a value associated with a key
//! - `Put` a value at a key, replacing what was there
//! - `Append` a value onto the value at a key (a missing key behaves as the empty string)
//!
//! Every request carries an id that stays the same when a client retries it. A request is
//! answered with a [`Status`]: `Ok`, `NoKey` (for a read of a key without value) or
//! `WrongLeader`, which tells the client to retry, likely against another replica.
//!
//! ## KvService
//! [`KvService`] is the replica. It is responsible for:
//! - proposing each client request to consensus and waiting (with a timeout) until the entry at
//! the proposed log position is applied
//! - detecting that a *different* request was committed at that position after a leadership
//! change, and answering `WrongLeader` instead of a result that isn't its own
//! - applying the committed log, exactly once per request id, on a single applier thread
//! - snapshotting its [`Store`] once the consensus log grows past
//! [`Config::max_raft_state`] bytes, and installing snapshots handed over by consensus
//!
//! ## Snapshots
//! A snapshot bundles the key/value data, the id applied at every log position and the set of
//! applied ids into a single versioned JSON blob, see the [`snapshot`](engine::snapshot) module.
//! A snapshot that can't be decoded means the replica's state is lost: it is reported as
//! [`KvsError::Codec`] at start-up and brings the applier down when received at run time.
//!
//! ## Client / Server
//! [`KvsServer`] exposes any [`KvsEngine`] over TCP, exchanging JSON encoded [`Request`]s and
//! [`Response`]s, and [`KvsClient`] is the matching client. The `kvs-server` executable runs a
//! single replica backed by [`LocalRaft`] and a [`FilePersister`](raft::persister::FilePersister);
//! `kvs-client` sends one request to it.
//!
//! [`String`]: https://doc.rust-lang.org/std/string/struct.String.html

pub use client::KvsClient;
pub use command::{
    GetArgs, GetReply, Op, OpKind, PutAppendArgs, PutAppendOp, PutAppendReply, Request,
    RequestId, Response, Status,
};
pub use config::Config;
pub use engine::{KvService, KvsEngine, Store};
pub use error::{KvsError, Result};
pub use raft::{ApplyMsg, Consensus, LocalRaft, Proposal};
pub use server::KvsServer;

mod client;
mod command;
mod config;
pub mod engine;
mod error;
pub mod raft;
mod server;
pub mod thread_pool;
