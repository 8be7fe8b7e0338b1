//! Arbiter engine library entry.
//!
//! Wires the policy engine, bounded executor, blind panel and audit ledger
//! into the arbitration pipeline. Consumed by the binary (`main.rs`), the
//! facade crate and integration tests.

pub mod app_state;
pub mod arbiter;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod executor;
pub mod ledger;
pub mod obs;
pub mod ops;
pub mod policy;
pub mod router;

pub use arbiter::Arbiter;
pub use context::RequestCtx;
pub use dispatch::{producer_fn, Producer, ProducerRegistry};
pub use executor::{BoundedExecutor, RetryPolicy};
pub use ledger::{AuditLedger, LedgerKey, LedgerOptions, VerifyReport};
pub use policy::{EvalSettings, PolicyEngine, PolicyPack, Rule};
