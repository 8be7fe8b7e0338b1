//! Tamper-evident audit ledger.
//!
//! Blocks are chained by `prev_hash`, authenticated by HMAC-SHA256 under a
//! forward-ratcheted key, and persisted one canonical JSON line per block in
//! rotating segment files.

pub mod audit;
pub mod block;
pub mod ratchet;
mod store;
pub mod verify;

pub use audit::{checkpoint_hash, AuditLedger, BlockReceipt, LedgerOptions, VerifyReport};
pub use block::ChainFault;
pub use ratchet::{KeyRatchet, LedgerKey};
pub use store::read_seal_file;
pub use verify::{verify_ledger_dir, verify_segment_file};
