//! Data model shared by the engine, the ledger, and external verifiers.
//!
//! Every type here is a plain value: created once, never mutated after it
//! leaves the component that built it. Types that reach the ledger derive
//! `Serialize`/`Deserialize` and are written through [`crate::canonical`].

pub mod decision;
pub mod digest;
pub mod exec;
pub mod ledger;
pub mod vet;

pub use decision::{
    ArbitrationDecision, DecisionRecord, Outcome, PolicyRef, RequestRecord, SlotRecord,
};
pub use digest::Digest32;
pub use exec::{ExecErrorCode, ExecResult, ExecStatus, ProducerError, ProducerErrorKind};
pub use ledger::{LedgerBlock, SealProof};
pub use vet::{RoleLabel, VetDecision, VetResult};
