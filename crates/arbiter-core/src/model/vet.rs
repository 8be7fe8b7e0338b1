//! Policy evaluation outcome.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Policy verdict for one candidate text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VetDecision {
    Allow,
    Veto,
}

impl VetDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            VetDecision::Allow => "allow",
            VetDecision::Veto => "veto",
        }
    }

    pub fn is_allow(self) -> bool {
        matches!(self, VetDecision::Allow)
    }
}

/// Opaque token standing in for the producer identity during vetting.
///
/// Never "primary"/"fallback": the engine mints a random value per submission.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleLabel(String);

impl RoleLabel {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RoleLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoleLabel({})", self.0)
    }
}

impl fmt::Display for RoleLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of evaluating one text against one policy pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VetResult {
    pub role_label: RoleLabel,
    pub policy_name: String,
    pub policy_version: String,
    /// Risk score in `[0, 1]`.
    pub score: f64,
    pub decision: VetDecision,
    /// Sorted, de-duplicated rule codes that contributed to `score`.
    pub matched_rule_codes: Vec<String>,
    /// Decode attempts spent on encoded-payload rescoring.
    pub decode_attempts: u32,
    /// True when the prefilter proved no rule could match and scoring was skipped.
    pub prefiltered: bool,
    pub timestamp: DateTime<Utc>,
}
