//! Ledger wire records: blocks (one per line) and seal proofs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::digest::Digest32;

/// One hash-chained, MAC-authenticated ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerBlock {
    pub index: u64,
    /// Ratchet generation of the key that authenticated this block.
    pub key_index: u64,
    /// RFC 3339, UTC, microsecond precision. MAC'd as raw UTF-8.
    pub timestamp: String,
    pub prev_hash: Digest32,
    pub payload: serde_json::Value,
    pub mac: Digest32,
}

/// Proof artifact emitted by `seal()`.
///
/// An external verifier replays the segment file and checks that its block
/// count and last MAC match `entry_count` and `head_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SealProof {
    pub run_id: Uuid,
    pub segment: u32,
    pub entry_count: u64,
    /// Global index of the segment's first block.
    pub first_index: u64,
    /// MAC of the last block, or `anchor_hash` for an empty segment.
    pub head_hash: Digest32,
    /// `prev_hash` of the segment's first block.
    pub anchor_hash: Digest32,
    pub timestamp: String,
}
