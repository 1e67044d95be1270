use thiserror::Error;

/// type alias for all operations in this crate that could fail with a [`KvsError`]
pub type Result<T> = std::result::Result<T, KvsError>;

/// The Error variants used by the kv service, its persistence layer and the network front end.
///
/// Note that `WrongLeader` and `NoKey` are *not* errors, they are reported to clients through
/// the [`Status`](crate::Status) of a reply.
#[derive(Error, Debug)]
pub enum KvsError {
    /// variant for errors caused from file or socket IO
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// a request, response or persisted log could not be (de)serialized
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// a snapshot blob is corrupted or was written in an unsupported format.
    /// There is no way to recover from this, the replica's state can not be trusted
    #[error("corrupted snapshot: {0}")]
    Codec(String),

    /// invalid command line or configuration input
    #[error("parsing error: {0}")]
    Parsing(String),

    /// an error message received from a remote server
    #[error("{0}")]
    StringErr(String),
}
