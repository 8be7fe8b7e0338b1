//! Forward-secure key ratchet.
//!
//! `k_{n+1} = SHA-256("arbiter.ledger.ratchet.v1" || k_n)`. Block `n` is
//! authenticated with `k_n`. Holding `k_n` lets one derive every later key but
//! no earlier one, so only the holder of `k0` can re-verify the whole chain.

use std::fmt;

use sha2::{Digest, Sha256};

const RATCHET_DOMAIN: &[u8] = b"arbiter.ledger.ratchet.v1";

/// A 32-byte ledger secret.
#[derive(Clone, PartialEq, Eq)]
pub struct LedgerKey([u8; 32]);

impl LedgerKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse 64 hex characters (surrounding whitespace ignored).
    pub fn from_hex(s: &str) -> Option<Self> {
        let raw = hex::decode(s.trim()).ok()?;
        let arr: [u8; 32] = raw.try_into().ok()?;
        Some(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// One ratchet step.
    pub fn next(&self) -> LedgerKey {
        let mut h = Sha256::new();
        h.update(RATCHET_DOMAIN);
        h.update(self.0);
        LedgerKey(h.finalize().into())
    }
}

impl fmt::Debug for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LedgerKey(<redacted>)")
    }
}

/// Key history indexed by global block number.
///
/// `history[i]` is the key for block `base + i`; the last entry is the key
/// that will sign the next block.
#[derive(Debug, Clone)]
pub struct KeyRatchet {
    base: u64,
    history: Vec<LedgerKey>,
}

impl KeyRatchet {
    /// Start from `k0` (block 0).
    pub fn from_seed(k0: LedgerKey) -> Self {
        Self::starting_at(k0, 0)
    }

    /// Start from a key already known to be `k_index`.
    pub fn starting_at(key: LedgerKey, index: u64) -> Self {
        Self {
            base: index,
            history: vec![key],
        }
    }

    /// Index whose key is `current()`.
    pub fn current_index(&self) -> u64 {
        self.base + self.history.len() as u64 - 1
    }

    pub fn current(&self) -> &LedgerKey {
        // history is never empty: constructors push one key and truncation keeps the tail.
        &self.history[self.history.len() - 1]
    }

    /// Derive the next key and make it current.
    pub fn advance(&mut self) {
        let next = self.current().next();
        self.history.push(next);
    }

    /// Advance until `current_index() == index`. No-op if already past it.
    pub fn advance_to(&mut self, index: u64) {
        while self.current_index() < index {
            self.advance();
        }
    }

    /// Key for block `index`, if it is still retained.
    pub fn key_at(&self, index: u64) -> Option<&LedgerKey> {
        let offset = index.checked_sub(self.base)?;
        self.history.get(usize::try_from(offset).ok()?)
    }

    /// Drop keys for blocks before `index` (segment rotation).
    pub fn forget_before(&mut self, index: u64) {
        let Some(offset) = index.checked_sub(self.base) else { return };
        let offset = usize::try_from(offset).unwrap_or(usize::MAX).min(self.history.len() - 1);
        self.history.drain(..offset);
        self.base += offset as u64;
    }

    pub fn retained(&self) -> usize {
        self.history.len()
    }
}
