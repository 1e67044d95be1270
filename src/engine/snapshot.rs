//! Encoding of a [`Store`] into a single snapshot blob, and back.
//!
//! A snapshot is a JSON object carrying a format `version`, the last log position it covers and
//! the three maps owned by the store. Ordered maps keep the encoding deterministic, so the same
//! store always encodes to the same bytes.
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::store::Store;
use crate::command::RequestId;
use crate::{KvsError, Result};

/// the only snapshot format understood by this crate
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    last_index: u64,
    data: BTreeMap<String, String>,
    index: BTreeMap<u64, RequestId>,
    applied: BTreeSet<RequestId>,
}

/// encodes `store` as a snapshot covering the log up to `last_index`
pub fn encode(store: &Store, last_index: u64) -> Result<Vec<u8>> {
    let envelope = Envelope {
        version: SNAPSHOT_VERSION,
        last_index,
        data: store.data.clone(),
        index: store.index.clone(),
        applied: store.applied.clone(),
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Decodes a snapshot, returning the store and the last log position it covers.
///
/// # Errors
/// returns [`KvsError::Codec`] if the bytes are not a snapshot or were written with an
/// unknown format version. Nothing of a bad snapshot is ever returned
pub fn decode(bytes: &[u8]) -> Result<(Store, u64)> {
    let envelope: Envelope = serde_json::from_slice(bytes)
        .map_err(|e| KvsError::Codec(format!("could not decode snapshot: {}", e)))?;
    if envelope.version != SNAPSHOT_VERSION {
        return Err(KvsError::Codec(format!(
            "unsupported snapshot version {}, expected {}",
            envelope.version, SNAPSHOT_VERSION
        )));
    }

    let store = Store { data: envelope.data, index: envelope.index, applied: envelope.applied };
    Ok((store, envelope.last_index))
}
