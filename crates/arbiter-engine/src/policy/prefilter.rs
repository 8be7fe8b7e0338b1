//! Fast "cannot possibly match" check ahead of full scoring.
//!
//! Every keyword skeleton with edit budget `e` is cut into `e + 1` pieces;
//! any substring within `e` edits keeps one piece intact, so a text whose
//! skeleton contains no piece cannot fuzzily match. Literal patterns add
//! their whole skeleton as a piece (an exact hit on normalized text implies
//! the skeleton contains it). The same check runs on the ROT13 view, and any
//! base64/hex candidate disables skipping outright because decoded content is
//! unknown until decoded.
//!
//! A pack with any non-literal regex rule leaves the prefilter disarmed: it
//! then never skips.

use std::collections::{BTreeMap, HashSet};

use super::decode::has_decode_candidates;
use super::normalize::{normalize, rot13, skeleton};

#[derive(Debug, Default, Clone)]
pub struct Prefilter {
    armed: bool,
    /// piece length (in chars) -> pieces of that length
    pieces: BTreeMap<usize, HashSet<Vec<char>>>,
}

impl Prefilter {
    pub(crate) fn disarmed() -> Self {
        Self::default()
    }

    pub(crate) fn armed() -> Self {
        Self {
            armed: true,
            pieces: BTreeMap::new(),
        }
    }

    pub(crate) fn insert_piece(&mut self, piece: Vec<char>) {
        if piece.is_empty() {
            return;
        }
        self.pieces.entry(piece.len()).or_default().insert(piece);
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.values().map(HashSet::len).sum()
    }

    /// `false` only when no rule of the pack can match `raw`.
    pub fn may_match(&self, raw: &str, normalized: &str) -> bool {
        if !self.armed {
            return true;
        }
        if self.skeleton_hits(&skeleton(normalized)) {
            return true;
        }

        let rotated = rot13(raw);
        if has_decode_candidates(raw) || has_decode_candidates(&rotated) {
            return true;
        }
        self.skeleton_hits(&skeleton(&normalize(&rotated)))
    }

    fn skeleton_hits(&self, skel: &[char]) -> bool {
        self.pieces.iter().any(|(&len, set)| {
            len <= skel.len() && skel.windows(len).any(|w| set.contains(w))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_pieces(pieces: &[&str]) -> Prefilter {
        let mut p = Prefilter::armed();
        for s in pieces {
            p.insert_piece(s.chars().collect());
        }
        p
    }

    #[test]
    fn disarmed_never_skips() {
        let p = Prefilter::disarmed();
        assert!(p.may_match("hello", "hello"));
    }

    #[test]
    fn skips_only_without_pieces() {
        let p = with_pieces(&["bomb"]);
        assert!(!p.may_match("nice day", "nice day"));
        assert!(p.may_match("b o m b", "b o m b"));
        // rot13("bomb") == "obzo"
        assert!(p.may_match("obzo", "obzo"));
    }

    #[test]
    fn encoded_runs_block_skipping() {
        let p = with_pieces(&["bomb"]);
        assert!(p.may_match("aGVsbG8gd29ybGQ=", "agvsbg8gd29ybgq="));
    }
}
