use serde::{Deserialize, Serialize};

/// Identifies one logical client request. Retries of the same request must reuse the same id.
pub type RequestId = u64;

/// The kind of operation carried by an [`Op`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    /// read a key, never mutates the store
    Get,
    /// replace the value of a key
    Put,
    /// concatenate onto the value of a key (an absent key behaves as "")
    Append,
}

/// A single client command, as it is placed into the replicated log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Op {
    /// unique per logical client request, stable across retries
    pub id: RequestId,
    /// the key being read or written
    pub key: String,
    /// the operand of a write, empty for reads
    pub value: String,
    /// what to do with `key` and `value`
    pub kind: OpKind,
}

impl Op {
    /// builds a read of `key`
    pub fn get(id: RequestId, key: impl Into<String>) -> Self {
        Op { id, key: key.into(), value: String::new(), kind: OpKind::Get }
    }

    /// builds a `Put` of `value` at `key`
    pub fn put(id: RequestId, key: impl Into<String>, value: impl Into<String>) -> Self {
        Op { id, key: key.into(), value: value.into(), kind: OpKind::Put }
    }

    /// builds an `Append` of `value` onto `key`
    pub fn append(id: RequestId, key: impl Into<String>, value: impl Into<String>) -> Self {
        Op { id, key: key.into(), value: value.into(), kind: OpKind::Append }
    }
}

/// The outcome reported to a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// the request was committed and applied
    Ok,
    /// a committed read found no value for its key
    NoKey,
    /// this replica could not confirm the request, the client should retry (likely elsewhere)
    WrongLeader,
}

/// Put or Append
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PutAppendOp {
    /// replace the value
    Put,
    /// concatenate onto the value
    Append,
}

impl From<PutAppendOp> for OpKind {
    fn from(op: PutAppendOp) -> Self {
        match op {
            PutAppendOp::Put => OpKind::Put,
            PutAppendOp::Append => OpKind::Append,
        }
    }
}

/// arguments of a Get call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetArgs {
    /// the request id
    pub id: RequestId,
    /// the key to read
    pub key: String,
}

/// reply of a Get call. `value` is empty unless `status` is [`Status::Ok`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetReply {
    /// outcome of the call
    pub status: Status,
    /// the value read
    pub value: String,
}

impl GetReply {
    pub(crate) fn wrong_leader() -> Self {
        GetReply { status: Status::WrongLeader, value: String::new() }
    }
}

/// arguments of a PutAppend call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutAppendArgs {
    /// the request id
    pub id: RequestId,
    /// the key to write
    pub key: String,
    /// the value to put or append
    pub value: String,
    /// which write to perform
    pub op: PutAppendOp,
}

/// reply of a PutAppend call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutAppendReply {
    /// outcome of the call, never [`Status::NoKey`]
    pub status: Status,
}

/// These are the request "commands" that can be sent to a [`KvsServer`](crate::KvsServer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// read a key
    Get(GetArgs),
    /// put or append a value
    PutAppend(PutAppendArgs),
}

/// The response types returned for a [`Request`], one variant per request variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    /// answer to [`Request::Get`]
    Get(GetReply),
    /// answer to [`Request::PutAppend`]
    PutAppend(PutAppendReply),
}
