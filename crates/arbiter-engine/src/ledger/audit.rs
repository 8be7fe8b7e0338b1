//! Append-only, hash-chained, MAC-authenticated decision ledger.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use arbiter_core::canonical::{canonicalize, to_canonical_vec};
use arbiter_core::error::{ArbiterError, Result};
use arbiter_core::model::{Digest32, LedgerBlock, SealProof};

use super::block::{encode_line, replay, seal_block, ChainFault, Replay};
use super::ratchet::{KeyRatchet, LedgerKey};
use super::store::SegmentStore;

#[derive(Debug, Clone, Copy)]
pub struct LedgerOptions {
    /// Canonical payload size limit per block.
    pub max_payload_bytes: usize,
    /// Automatic checkpoint after this many blocks in a segment (0 = never).
    pub checkpoint_every: u64,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            max_payload_bytes: 1 << 20,
            checkpoint_every: 0,
        }
    }
}

/// Outcome of a chain verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub ok: bool,
    /// Blocks verified before the first fault (all of them when `ok`).
    pub entries: u64,
    pub first_bad_index: Option<u64>,
    pub reason: Option<String>,
}

impl VerifyReport {
    pub(crate) fn from_replay(r: &Replay) -> Self {
        match &r.fault {
            None => Self::passed(r.blocks.len() as u64),
            Some((index, fault)) => Self::failed(r.blocks.len() as u64, *index, fault),
        }
    }

    pub(crate) fn passed(entries: u64) -> Self {
        Self {
            ok: true,
            entries,
            first_bad_index: None,
            reason: None,
        }
    }

    pub(crate) fn failed(entries: u64, index: u64, fault: &ChainFault) -> Self {
        Self {
            ok: false,
            entries,
            first_bad_index: Some(index),
            reason: Some(fault.to_string()),
        }
    }
}

/// Where a block landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockReceipt {
    pub index: u64,
    pub block_hash: Digest32,
}

#[derive(Debug, Clone)]
struct Corruption {
    index: u64,
    reason: String,
}

struct LedgerState {
    segment: u32,
    first_index: u64,
    anchor: Digest32,
    head: Digest32,
    blocks: Vec<LedgerBlock>,
    /// `current()` signs the next block.
    ratchet: KeyRatchet,
    file: File,
    corruption: Option<Corruption>,
}

impl LedgerState {
    fn next_index(&self) -> u64 {
        self.first_index + self.blocks.len() as u64
    }
}

/// The audit ledger.
///
/// One writer at a time (appends serialize on an internal mutex). Once
/// corrupted, every further append is refused until an operator intervenes.
pub struct AuditLedger {
    store: SegmentStore,
    options: LedgerOptions,
    run_id: Uuid,
    corrupted: AtomicBool,
    state: Mutex<LedgerState>,
}

impl std::fmt::Debug for AuditLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLedger")
            .field("dir", &self.store.dir())
            .field("run_id", &self.run_id)
            .field("corrupted", &self.is_corrupted())
            .finish()
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// `SHA-256(canonical JSON of the proof)`; anchors the next segment.
pub fn checkpoint_hash(proof: &SealProof) -> Result<Digest32> {
    let bytes = to_canonical_vec(proof)?;
    Ok(Digest32(Sha256::digest(&bytes).into()))
}

/// Check a seal against a replayed segment. `complete` requires the seal to
/// cover every block (rotated segments); otherwise a prefix is enough.
pub(crate) fn check_seal(
    proof: &SealProof,
    first_index: u64,
    anchor: Digest32,
    r: &Replay,
    complete: bool,
) -> Option<ChainFault> {
    if proof.first_index != first_index {
        return Some(ChainFault::SealMismatch(format!(
            "first_index {} != {first_index}",
            proof.first_index
        )));
    }
    if proof.anchor_hash != anchor {
        return Some(ChainFault::SealMismatch("anchor_hash".into()));
    }
    let have = r.blocks.len() as u64;
    if proof.entry_count > have || (complete && proof.entry_count != have) {
        return Some(ChainFault::SealMismatch(format!(
            "entry_count {} but segment holds {have}",
            proof.entry_count
        )));
    }
    let head = match usize::try_from(proof.entry_count) {
        Ok(0) => anchor,
        Ok(n) => r.blocks[n - 1].mac,
        Err(_) => return Some(ChainFault::SealMismatch("entry_count".into())),
    };
    if proof.head_hash != head {
        return Some(ChainFault::SealMismatch("head_hash".into()));
    }
    None
}

impl AuditLedger {
    /// Open (or create) the ledger under `dir`, replaying every segment with
    /// keys derived from `k0`.
    ///
    /// A trailing partial line on the newest segment is an unacknowledged
    /// write and is truncated. Any other inconsistency opens the ledger in a
    /// corrupted state: reads and verification work, appends are refused.
    pub fn open(dir: impl Into<PathBuf>, k0: LedgerKey, options: LedgerOptions) -> Result<Self> {
        let store = SegmentStore::new(dir)?;
        let mut segments = store.list_segments()?;
        if segments.is_empty() {
            segments.push(0);
        }

        let mut ratchet = KeyRatchet::from_seed(k0);
        let mut anchor = Digest32::ZERO;
        let mut first_index = 0u64;
        let mut corruption: Option<Corruption> = None;
        let mut live: Option<(u32, Replay)> = None;

        for (pos, &segment) in segments.iter().enumerate() {
            let last = pos + 1 == segments.len();
            if segment as usize != pos {
                corruption = Some(Corruption {
                    index: first_index,
                    reason: format!("segment {pos} missing"),
                });
                live = Some((
                    segment,
                    Replay {
                        blocks: Vec::new(),
                        head: anchor,
                        fault: None,
                    },
                ));
                break;
            }

            let contents = store.read_segment(segment)?;
            let r = replay(
                contents.lines(),
                first_index,
                anchor,
                ratchet.current().clone(),
                first_index,
            );
            let verified_end = first_index + r.blocks.len() as u64;

            let mut fault = r.fault.clone();
            if fault.is_none() && contents.has_torn_tail() {
                if last {
                    tracing::warn!(
                        segment,
                        keep_bytes = contents.complete_len(),
                        "truncating torn ledger write"
                    );
                    store.truncate(segment, contents.complete_len())?;
                } else {
                    fault = Some((verified_end, ChainFault::TornWrite));
                }
            }

            let seal = store.read_seal(segment)?;
            if fault.is_none() {
                fault = match (&seal, last) {
                    (None, false) => Some((
                        verified_end,
                        ChainFault::SealMismatch("rotated segment has no seal".into()),
                    )),
                    (Some(p), is_last) => check_seal(p, first_index, anchor, &r, !is_last)
                        .map(|f| (first_index, f)),
                    (None, true) => None,
                };
            }

            ratchet.advance_to(verified_end);

            if let Some((index, f)) = fault {
                tracing::error!(segment, index, fault = %f, "ledger failed verification on open");
                corruption = Some(Corruption {
                    index,
                    reason: f.to_string(),
                });
                live = Some((segment, r));
                break;
            }

            if last {
                live = Some((segment, r));
            } else if let Some(p) = seal {
                anchor = checkpoint_hash(&p)?;
                first_index = verified_end;
                ratchet.forget_before(first_index);
            }
        }

        let Some((segment, r)) = live else {
            return Err(ArbiterError::Internal("ledger open produced no segment".into()));
        };
        let file = store.open_append(segment)?;
        let state = LedgerState {
            segment,
            first_index,
            anchor,
            head: r.head,
            blocks: r.blocks,
            ratchet,
            file,
            corruption: corruption.clone(),
        };

        tracing::info!(
            dir = %store.dir().display(),
            segment,
            next_index = state.next_index(),
            corrupted = corruption.is_some(),
            "audit ledger opened"
        );

        Ok(Self {
            store,
            options,
            run_id: Uuid::new_v4(),
            corrupted: AtomicBool::new(corruption.is_some()),
            state: Mutex::new(state),
        })
    }

    pub fn dir(&self) -> &Path {
        self.store.dir()
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn is_corrupted(&self) -> bool {
        self.corrupted.load(Ordering::Acquire)
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>> {
        self.state
            .lock()
            .map_err(|_| ArbiterError::Internal("ledger lock poisoned".into()))
    }

    fn mark_corrupted(&self, st: &mut LedgerState, index: u64, reason: String) {
        tracing::error!(index, %reason, "audit ledger marked corrupted");
        if st.corruption.is_none() {
            st.corruption = Some(Corruption { index, reason });
        }
        self.corrupted.store(true, Ordering::Release);
    }

    /// Number of blocks ever appended (next index to be assigned).
    pub fn len(&self) -> Result<u64> {
        Ok(self.lock()?.next_index())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// MAC of the newest block, or the segment anchor when the segment is empty.
    pub fn head(&self) -> Result<Digest32> {
        Ok(self.lock()?.head)
    }

    pub fn segment(&self) -> Result<u32> {
        Ok(self.lock()?.segment)
    }

    /// Blocks of the live segment held in memory.
    pub fn blocks(&self) -> Result<Vec<LedgerBlock>> {
        Ok(self.lock()?.blocks.clone())
    }

    /// The key that will sign the next block, with its index.
    ///
    /// This is exactly what an attacker gains by compromising the running
    /// process; it cannot authenticate any block already written.
    pub fn current_key(&self) -> Result<(LedgerKey, u64)> {
        let st = self.lock()?;
        Ok((st.ratchet.current().clone(), st.ratchet.current_index()))
    }

    /// Serialize `record` canonically, MAC it with the current key, persist it
    /// (fsync) and ratchet the key.
    pub fn append<T: Serialize>(&self, record: &T) -> Result<BlockReceipt> {
        let payload = serde_json::to_value(record)
            .map_err(|e| ArbiterError::Internal(format!("ledger payload encode: {e}")))?;
        let size = canonicalize(&payload)?.len();
        if size > self.options.max_payload_bytes {
            return Err(ArbiterError::PayloadTooLarge {
                size,
                limit: self.options.max_payload_bytes,
            });
        }

        let mut guard = self.lock()?;
        let st = &mut *guard;
        if let Some(c) = &st.corruption {
            return Err(ArbiterError::LedgerCorrupted {
                index: c.index,
                reason: c.reason.clone(),
            });
        }

        let index = st.next_index();
        let block = seal_block(st.ratchet.current(), index, now_timestamp(), st.head, payload)?;
        let line = encode_line(&block)?;

        if let Err(e) = st.file.write_all(&line).and_then(|()| st.file.sync_data()) {
            self.mark_corrupted(st, index, format!("append failed: {e}"));
            return Err(ArbiterError::LedgerIo(e.to_string()));
        }

        st.ratchet.advance();
        st.head = block.mac;
        let receipt = BlockReceipt {
            index,
            block_hash: block.mac,
        };
        st.blocks.push(block);
        tracing::debug!(index, segment = st.segment, "ledger block appended");

        let every = self.options.checkpoint_every;
        if every > 0 && st.blocks.len() as u64 >= every {
            if let Err(e) = self.checkpoint_locked(st) {
                tracing::warn!(error = %e, "automatic checkpoint failed");
            }
        }
        Ok(receipt)
    }

    /// Async wrapper for [`append`](Self::append) that uses `spawn_blocking`,
    /// so the write and fsync never stall a runtime worker.
    pub async fn append_async<T: Serialize>(self: &Arc<Self>, record: &T) -> Result<BlockReceipt> {
        let payload = serde_json::to_value(record)
            .map_err(|e| ArbiterError::Internal(format!("ledger payload encode: {e}")))?;
        let ledger = Arc::clone(self);
        tokio::task::spawn_blocking(move || ledger.append(&payload))
            .await
            .map_err(|e| ArbiterError::Internal(format!("spawn_blocking failed: {e}")))?
    }

    /// Re-read the live segment from disk and verify every block appended so
    /// far. Sets the corrupted flag on failure.
    ///
    /// Covers the live segment only; sealed segments are checked on open and
    /// by [`verify_ledger_dir`](super::verify_ledger_dir).
    pub fn verify_all(&self) -> Result<VerifyReport> {
        let (segment, first_index, anchor, key, count, head) = {
            let st = self.lock()?;
            let key = st
                .ratchet
                .key_at(st.first_index)
                .cloned()
                .ok_or_else(|| ArbiterError::Internal("segment key not retained".into()))?;
            (st.segment, st.first_index, st.anchor, key, st.blocks.len(), st.head)
        };

        let contents = self.store.read_segment(segment)?;
        let r = replay(contents.lines().take(count), first_index, anchor, key, first_index);
        let mut report = VerifyReport::from_replay(&r);
        if report.ok {
            let verified = r.blocks.len() as u64;
            if r.blocks.len() < count {
                report = VerifyReport::failed(verified, first_index + verified, &ChainFault::Missing);
            } else if r.head != head {
                report = VerifyReport::failed(
                    verified,
                    first_index + verified.saturating_sub(1),
                    &ChainFault::BrokenLink,
                );
            }
        }

        if let (false, Some(index)) = (report.ok, report.first_bad_index) {
            let reason = report.reason.clone().unwrap_or_default();
            let mut st = self.lock()?;
            self.mark_corrupted(&mut st, index, reason);
        }
        Ok(report)
    }

    /// Async wrapper for [`verify_all`](Self::verify_all) that uses
    /// `spawn_blocking`.
    pub async fn verify_all_async(self: &Arc<Self>) -> Result<VerifyReport> {
        let ledger = Arc::clone(self);
        tokio::task::spawn_blocking(move || ledger.verify_all())
            .await
            .map_err(|e| ArbiterError::Internal(format!("spawn_blocking failed: {e}")))?
    }

    /// Verify the live segment treating `key` as `k_{key_index}`.
    ///
    /// Blocks older than `key_index` cannot be authenticated from a later key,
    /// so any such block makes the report fail. Does not touch the corrupted
    /// flag.
    pub fn verify_with_key(&self, key: &LedgerKey, key_index: u64) -> Result<VerifyReport> {
        let (segment, first_index, anchor, count) = {
            let st = self.lock()?;
            (st.segment, st.first_index, st.anchor, st.blocks.len())
        };
        let contents = self.store.read_segment(segment)?;
        let r = replay(
            contents.lines().take(count),
            first_index,
            anchor,
            key.clone(),
            key_index,
        );
        Ok(VerifyReport::from_replay(&r))
    }

    /// Write a seal proof for the live segment and return its checkpoint hash.
    pub fn seal(&self) -> Result<Digest32> {
        let st = self.lock()?;
        self.seal_locked(&st).map(|(_, hash)| hash)
    }

    /// Async wrapper for [`seal`](Self::seal) that uses `spawn_blocking`.
    pub async fn seal_async(self: &Arc<Self>) -> Result<Digest32> {
        let ledger = Arc::clone(self);
        tokio::task::spawn_blocking(move || ledger.seal())
            .await
            .map_err(|e| ArbiterError::Internal(format!("spawn_blocking failed: {e}")))?
    }

    fn seal_locked(&self, st: &LedgerState) -> Result<(SealProof, Digest32)> {
        if let Some(c) = &st.corruption {
            return Err(ArbiterError::LedgerCorrupted {
                index: c.index,
                reason: c.reason.clone(),
            });
        }
        let proof = SealProof {
            run_id: self.run_id,
            segment: st.segment,
            entry_count: st.blocks.len() as u64,
            first_index: st.first_index,
            head_hash: st.head,
            anchor_hash: st.anchor,
            timestamp: now_timestamp(),
        };
        self.store.write_seal(&proof)?;
        let hash = checkpoint_hash(&proof)?;
        tracing::info!(
            segment = proof.segment,
            entries = proof.entry_count,
            checkpoint = %hash,
            "ledger segment sealed"
        );
        Ok((proof, hash))
    }

    /// Seal the live segment and rotate to a new one anchored to the seal.
    /// In-memory blocks and keys of the sealed segment are dropped.
    pub fn checkpoint(&self) -> Result<Digest32> {
        let mut st = self.lock()?;
        self.checkpoint_locked(&mut st)
    }

    fn checkpoint_locked(&self, st: &mut LedgerState) -> Result<Digest32> {
        let (_, hash) = self.seal_locked(st)?;
        let next_segment = st
            .segment
            .checked_add(1)
            .ok_or_else(|| ArbiterError::Internal("segment counter exhausted".into()))?;
        let file = self.store.open_append(next_segment)?;
        st.file = file;
        st.first_index = st.next_index();
        st.segment = next_segment;
        st.anchor = hash;
        st.head = hash;
        st.blocks.clear();
        st.ratchet.forget_before(st.first_index);
        Ok(hash)
    }
}
