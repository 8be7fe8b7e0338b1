//! Offline verification of segment files and whole ledger directories.

use std::path::Path;

use arbiter_core::error::Result;
use arbiter_core::model::{Digest32, SealProof};

use super::audit::{check_seal, checkpoint_hash, VerifyReport};
use super::block::{replay, ChainFault};
use super::ratchet::{KeyRatchet, LedgerKey};
use super::store::{read_segment_file, SegmentStore};

/// Replay `path` with keys derived from `k0`.
///
/// Without a seal the segment is assumed to be the genesis segment (first
/// index 0, zero anchor). With a seal, its `first_index` and `anchor_hash`
/// position the segment and its `entry_count`/`head_hash` must match the
/// replayed chain exactly.
pub fn verify_segment_file(
    path: &Path,
    k0: &LedgerKey,
    seal: Option<&SealProof>,
) -> Result<VerifyReport> {
    let contents = read_segment_file(path)?;
    let (first_index, anchor) = seal.map_or((0, Digest32::ZERO), |p| (p.first_index, p.anchor_hash));

    let r = replay(contents.lines(), first_index, anchor, k0.clone(), 0);
    let mut report = VerifyReport::from_replay(&r);
    if !report.ok {
        return Ok(report);
    }

    let verified = r.blocks.len() as u64;
    if contents.has_torn_tail() {
        report = VerifyReport::failed(verified, first_index + verified, &ChainFault::TornWrite);
    } else if let Some(fault) = seal.and_then(|p| check_seal(p, first_index, anchor, &r, true)) {
        report = VerifyReport::failed(verified, first_index, &fault);
    }
    Ok(report)
}

/// Verify every segment under `dir` in order, the way [`AuditLedger::open`]
/// replays them, without creating, truncating or writing anything.
///
/// Rotated segments must carry a seal covering all of their blocks, and each
/// segment must be anchored to the checkpoint hash of the one before. The
/// newest segment may be unsealed or sealed over a prefix; a torn trailing
/// line there is an unacknowledged write and is not counted. `entries` counts
/// blocks across all segments.
///
/// [`AuditLedger::open`]: super::AuditLedger::open
pub fn verify_ledger_dir(dir: &Path, k0: &LedgerKey) -> Result<VerifyReport> {
    let store = SegmentStore::existing(dir);
    let segments = store.list_segments()?;

    let mut ratchet = KeyRatchet::from_seed(k0.clone());
    let mut anchor = Digest32::ZERO;
    let mut first_index = 0u64;

    for (pos, &segment) in segments.iter().enumerate() {
        if segment as usize != pos {
            return Ok(VerifyReport::failed(first_index, first_index, &ChainFault::Missing));
        }
        let last = pos + 1 == segments.len();

        let contents = store.read_segment(segment)?;
        let r = replay(
            contents.lines(),
            first_index,
            anchor,
            ratchet.current().clone(),
            first_index,
        );
        let verified_end = first_index + r.blocks.len() as u64;
        if let Some((index, fault)) = &r.fault {
            return Ok(VerifyReport::failed(verified_end, *index, fault));
        }
        if !last && contents.has_torn_tail() {
            return Ok(VerifyReport::failed(verified_end, verified_end, &ChainFault::TornWrite));
        }

        let seal = store.read_seal(segment)?;
        let fault = match &seal {
            None if last => None,
            None => Some(ChainFault::SealMismatch("rotated segment has no seal".into())),
            Some(p) => check_seal(p, first_index, anchor, &r, !last),
        };
        if let Some(f) = fault {
            return Ok(VerifyReport::failed(verified_end, first_index, &f));
        }

        if last {
            return Ok(VerifyReport::passed(verified_end));
        }
        if let Some(p) = seal {
            anchor = checkpoint_hash(&p)?;
        }
        first_index = verified_end;
        ratchet.advance_to(first_index);
        ratchet.forget_before(first_index);
    }

    Ok(VerifyReport::passed(0))
}
