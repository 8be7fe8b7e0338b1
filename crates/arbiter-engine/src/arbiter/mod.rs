//! Arbitration: primary/fallback orchestration over the blind panel, with
//! every terminal decision persisted to the audit ledger.

pub mod engine;
pub mod panel;
pub mod state;

pub use engine::Arbiter;
pub use panel::{BlindPanel, PanelRound, Slot};
pub use state::ArbitrationState;
