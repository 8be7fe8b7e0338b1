//! Top-level facade crate for the arbiter.
//!
//! Re-exports the data model and the engine so users can depend on a single crate.

pub mod core {
    pub use arbiter_core::*;
}

pub mod engine {
    pub use arbiter_engine::*;
}

pub use arbiter_core::error::{ArbiterError, FaultCode, Result};
pub use arbiter_core::model::{ArbitrationDecision, Outcome, VetDecision};
pub use arbiter_engine::{producer_fn, Arbiter, AuditLedger, LedgerKey, PolicyPack, RequestCtx};
