//! Block framing, MAC computation and chain replay.
//!
//! MAC input is length-prefixed so no two distinct blocks share a frame:
//!
//! ```text
//! "arbiter.ledger.block.v1"
//! index            u64 BE
//! len(timestamp)   u64 BE | timestamp (UTF-8)
//! prev_hash        32 bytes
//! len(payload)     u64 BE | canonical JSON payload
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::value::RawValue;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use arbiter_core::canonical::{canonicalize, to_canonical_vec};
use arbiter_core::error::{ArbiterError, Result};
use arbiter_core::model::{Digest32, LedgerBlock};

use super::ratchet::LedgerKey;

type HmacSha256 = Hmac<Sha256>;

const BLOCK_DOMAIN: &[u8] = b"arbiter.ledger.block.v1";

/// Why a stored chain failed to verify.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainFault {
    #[error("unparseable block: {0}")]
    Malformed(String),
    #[error("index gap: expected {expected}, found {found}")]
    IndexGap { expected: u64, found: u64 },
    #[error("key index {key_index} does not match block index")]
    KeyIndex { key_index: u64 },
    #[error("prev_hash does not link to the previous block")]
    BrokenLink,
    #[error("mac mismatch")]
    MacMismatch,
    #[error("no key available for this block")]
    KeyUnavailable,
    #[error("block missing from storage")]
    Missing,
    #[error("torn trailing write")]
    TornWrite,
    #[error("seal does not match chain: {0}")]
    SealMismatch(String),
}

pub(crate) fn frame(index: u64, timestamp: &str, prev_hash: &Digest32, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(
        BLOCK_DOMAIN.len() + 8 + 8 + timestamp.len() + 32 + 8 + payload.len(),
    );
    buf.put_slice(BLOCK_DOMAIN);
    buf.put_u64(index);
    buf.put_u64(timestamp.len() as u64);
    buf.put_slice(timestamp.as_bytes());
    buf.put_slice(prev_hash.as_bytes());
    buf.put_u64(payload.len() as u64);
    buf.put_slice(payload);
    buf.freeze()
}

pub(crate) fn compute_mac(
    key: &LedgerKey,
    index: u64,
    timestamp: &str,
    prev_hash: &Digest32,
    payload: &[u8],
) -> Result<Digest32> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| ArbiterError::Internal(format!("hmac key: {e}")))?;
    mac.update(&frame(index, timestamp, prev_hash, payload));
    Ok(Digest32(mac.finalize().into_bytes().into()))
}

/// Build a signed block.
pub(crate) fn seal_block(
    key: &LedgerKey,
    index: u64,
    timestamp: String,
    prev_hash: Digest32,
    payload: serde_json::Value,
) -> Result<LedgerBlock> {
    let payload_bytes = canonicalize(&payload)?;
    let mac = compute_mac(key, index, &timestamp, &prev_hash, &payload_bytes)?;
    Ok(LedgerBlock {
        index,
        key_index: index,
        timestamp,
        prev_hash,
        payload,
        mac,
    })
}

/// One storage line (canonical JSON plus trailing newline).
pub(crate) fn encode_line(block: &LedgerBlock) -> Result<Vec<u8>> {
    let mut line = to_canonical_vec(block)?;
    line.push(b'\n');
    Ok(line)
}

/// A stored line viewed with its payload left as the exact bytes on disk.
///
/// The MAC covers those bytes, so verification never depends on re-rendering
/// a parsed payload (floats in particular).
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StoredBlock<'a> {
    index: u64,
    key_index: u64,
    timestamp: String,
    prev_hash: Digest32,
    #[serde(borrow)]
    payload: &'a RawValue,
    mac: Digest32,
}

impl StoredBlock<'_> {
    /// Recompute and compare in constant time.
    fn mac_matches(&self, key: &LedgerKey) -> bool {
        let Ok(expected) = compute_mac(
            key,
            self.index,
            &self.timestamp,
            &self.prev_hash,
            self.payload.get().as_bytes(),
        ) else {
            return false;
        };
        expected.as_bytes().ct_eq(self.mac.as_bytes()).into()
    }

    fn into_block(self) -> std::result::Result<LedgerBlock, ChainFault> {
        let payload = serde_json::from_str(self.payload.get())
            .map_err(|e| ChainFault::Malformed(e.to_string()))?;
        Ok(LedgerBlock {
            index: self.index,
            key_index: self.key_index,
            timestamp: self.timestamp,
            prev_hash: self.prev_hash,
            payload,
            mac: self.mac,
        })
    }
}

/// Result of walking a sequence of stored lines.
#[derive(Debug)]
pub(crate) struct Replay {
    pub blocks: Vec<LedgerBlock>,
    pub head: Digest32,
    pub fault: Option<(u64, ChainFault)>,
}

/// Walk `lines` as a chain starting at `first_index` linked to `anchor`.
///
/// `key` must be the key for `key_index`. Blocks before `key_index` cannot be
/// checked and fail with `KeyUnavailable`. Stops at the first fault.
pub(crate) fn replay<'a, I>(
    lines: I,
    first_index: u64,
    anchor: Digest32,
    key: LedgerKey,
    key_index: u64,
) -> Replay
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut blocks = Vec::new();
    let mut head = anchor;
    let mut key = key;
    let mut key_at = key_index;
    let mut expected = first_index;

    for line in lines {
        let fault = match serde_json::from_slice::<StoredBlock<'_>>(line) {
            Err(e) => Some(ChainFault::Malformed(e.to_string())),
            Ok(block) => {
                if block.index != expected {
                    Some(ChainFault::IndexGap {
                        expected,
                        found: block.index,
                    })
                } else if block.key_index != block.index {
                    Some(ChainFault::KeyIndex {
                        key_index: block.key_index,
                    })
                } else if block.prev_hash != head {
                    Some(ChainFault::BrokenLink)
                } else if block.index < key_at {
                    Some(ChainFault::KeyUnavailable)
                } else {
                    while key_at < block.index {
                        key = key.next();
                        key_at += 1;
                    }
                    if !block.mac_matches(&key) {
                        Some(ChainFault::MacMismatch)
                    } else {
                        match block.into_block() {
                            Ok(b) => {
                                head = b.mac;
                                blocks.push(b);
                                None
                            }
                            Err(f) => Some(f),
                        }
                    }
                }
            }
        };
        if let Some(f) = fault {
            return Replay {
                blocks,
                head,
                fault: Some((expected, f)),
            };
        }
        expected += 1;
    }

    Replay {
        blocks,
        head,
        fault: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key() -> LedgerKey {
        LedgerKey::from_bytes([3u8; 32])
    }

    #[test]
    fn frame_is_length_prefixed() {
        let a = frame(1, "ab", &Digest32::ZERO, b"c");
        let b = frame(1, "a", &Digest32::ZERO, b"bc");
        assert_ne!(a, b);
    }

    fn verifies(k: &LedgerKey, block: &LedgerBlock) -> bool {
        let line = encode_line(block).unwrap();
        let stored: StoredBlock<'_> = serde_json::from_slice(&line).unwrap();
        stored.mac_matches(k)
    }

    #[test]
    fn mac_depends_on_every_field() {
        let k = key();
        let base = seal_block(&k, 0, "t".into(), Digest32::ZERO, json!({"a":1})).unwrap();
        assert!(verifies(&k, &base));

        let mut tampered = base.clone();
        tampered.payload = json!({"a":2});
        assert!(!verifies(&k, &tampered));

        let mut tampered = base.clone();
        tampered.timestamp = "u".into();
        assert!(!verifies(&k, &tampered));

        let mut tampered = base.clone();
        tampered.index = 1;
        assert!(!verifies(&k, &tampered));

        assert!(!verifies(&k.next(), &base));
    }

    #[test]
    fn fractional_scores_replay_exactly() {
        let k0 = key();
        let mut key = k0.clone();
        let mut prev = Digest32::ZERO;
        let mut lines = Vec::new();
        let mut index = 0u64;
        for w in 1..=20u32 {
            for d in 0..=2u32 {
                for len in 3..=12u32 {
                    let score = f64::from(w) * 0.05 * (1.0 - f64::from(d) / (f64::from(len) + 1.0));
                    let b = seal_block(&key, index, "t".into(), prev, json!({ "score": score })).unwrap();
                    prev = b.mac;
                    lines.push(encode_line(&b).unwrap());
                    key = key.next();
                    index += 1;
                }
            }
        }
        let r = replay(lines.iter().map(|l| l.as_slice()), 0, Digest32::ZERO, k0, 0);
        assert_eq!(r.fault, None);
        assert_eq!(r.blocks.len() as u64, index);
        assert_eq!(r.head, prev);
    }

    #[test]
    fn replay_detects_broken_link() {
        let k0 = key();
        let b0 = seal_block(&k0, 0, "t0".into(), Digest32::ZERO, json!(0)).unwrap();
        let b1 = seal_block(&k0.next(), 1, "t1".into(), Digest32([9u8; 32]), json!(1)).unwrap();
        let lines = [encode_line(&b0).unwrap(), encode_line(&b1).unwrap()];
        let r = replay(
            lines.iter().map(|l| l.as_slice()),
            0,
            Digest32::ZERO,
            k0,
            0,
        );
        assert_eq!(r.blocks.len(), 1);
        assert_eq!(r.fault, Some((1, ChainFault::BrokenLink)));
    }
}
