//! arbiter core: data model, canonical encoding, and error types.
//!
//! This crate defines the values exchanged between the policy engine, the
//! bounded executor, the arbitration engine and the audit ledger, plus the
//! canonical JSON form in which ledger records are authenticated. It carries
//! no runtime dependencies so external verifiers can replay a ledger with it
//! alone.
//!
//! # Panic policy
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths surface as `ArbiterError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod canonical;
pub mod error;
pub mod model;

/// Shared result type.
pub use error::{ArbiterError, FaultCode, Result};
