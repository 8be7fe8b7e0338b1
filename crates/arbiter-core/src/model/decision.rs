//! Arbitration outcomes and the record appended to the audit ledger.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::digest::Digest32;
use super::exec::{ExecErrorCode, ExecResult, ExecStatus};
use super::vet::VetResult;

/// Final outcome of one arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Approved,
    Failed,
    Error,
    Timeout,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Approved => "APPROVED",
            Outcome::Failed => "FAILED",
            Outcome::Error => "ERROR",
            Outcome::Timeout => "TIMEOUT",
        }
    }
}

/// `(name, version)` identity of a policy pack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyRef {
    pub name: String,
    pub version: String,
}

/// Decision returned to the caller once its record is durable.
#[derive(Debug, Clone, PartialEq)]
pub struct ArbitrationDecision {
    pub decision: Outcome,
    pub chosen_output: Option<String>,
    /// Absent only when the primary produced no output to vet.
    pub primary_vet: Option<VetResult>,
    pub fallback_vet: Option<VetResult>,
    pub primary_exec: ExecResult,
    pub fallback_exec: Option<ExecResult>,
    pub policy: PolicyRef,
    pub correlation_id: Uuid,
    /// MAC of the ledger block holding this decision.
    pub block_hash: Digest32,
    pub block_index: u64,
}

impl ArbitrationDecision {
    /// True when the fallback producer was invoked.
    pub fn fallback_invoked(&self) -> bool {
        self.fallback_exec.is_some()
    }
}

/// Per-slot provenance stored in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlotRecord {
    pub status: ExecStatus,
    pub error_code: Option<ExecErrorCode>,
    pub attempts: u32,
    /// SHA-256 of the produced text, when there was one.
    pub output_sha256: Option<Digest32>,
    pub vet: Option<VetResult>,
}

/// Request metadata carried into the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestRecord {
    pub request_id: Option<String>,
    pub tenant: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Ledger payload describing one terminal decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionRecord {
    pub correlation_id: Uuid,
    pub decision: Outcome,
    pub policy: PolicyRef,
    pub primary: SlotRecord,
    pub fallback: Option<SlotRecord>,
    pub chosen_output: Option<String>,
    pub request: RequestRecord,
}
