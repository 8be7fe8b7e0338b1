//! Arbitration lifecycle.
//!
//! ```text
//! IDLE -> EVALUATING_PRIMARY -> APPROVED
//!                            -> EVALUATING_FALLBACK -> APPROVED | FAILED
//! EVALUATING_* -> ERROR | TIMEOUT
//! ```

use arbiter_core::error::{ArbiterError, Result};
use arbiter_core::model::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbitrationState {
    Idle,
    EvaluatingPrimary,
    EvaluatingFallback,
    Approved,
    Failed,
    Error,
    Timeout,
}

impl ArbitrationState {
    pub fn as_str(self) -> &'static str {
        match self {
            ArbitrationState::Idle => "IDLE",
            ArbitrationState::EvaluatingPrimary => "EVALUATING_PRIMARY",
            ArbitrationState::EvaluatingFallback => "EVALUATING_FALLBACK",
            ArbitrationState::Approved => "APPROVED",
            ArbitrationState::Failed => "FAILED",
            ArbitrationState::Error => "ERROR",
            ArbitrationState::Timeout => "TIMEOUT",
        }
    }

    pub fn is_terminal(self) -> bool {
        self.outcome().is_some()
    }

    pub fn outcome(self) -> Option<Outcome> {
        match self {
            ArbitrationState::Approved => Some(Outcome::Approved),
            ArbitrationState::Failed => Some(Outcome::Failed),
            ArbitrationState::Error => Some(Outcome::Error),
            ArbitrationState::Timeout => Some(Outcome::Timeout),
            _ => None,
        }
    }

    /// Move to `next`, or fail with an internal error on an illegal edge.
    pub fn transition(self, next: ArbitrationState) -> Result<ArbitrationState> {
        use ArbitrationState::*;
        let legal = matches!(
            (self, next),
            (Idle, EvaluatingPrimary)
                | (EvaluatingPrimary, Approved | EvaluatingFallback | Error | Timeout)
                | (EvaluatingFallback, Approved | Failed | Error | Timeout)
        );
        if legal {
            Ok(next)
        } else {
            Err(ArbiterError::Internal(format!(
                "illegal arbitration transition {} -> {}",
                self.as_str(),
                next.as_str()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ArbitrationState::*;

    #[test]
    fn legal_paths() {
        let s = Idle.transition(EvaluatingPrimary).unwrap();
        assert_eq!(s.transition(Approved).unwrap(), Approved);
        let s = s.transition(EvaluatingFallback).unwrap();
        assert_eq!(s.transition(Failed).unwrap(), Failed);
        assert_eq!(s.transition(Timeout).unwrap(), Timeout);
    }

    #[test]
    fn illegal_edges_are_errors() {
        assert!(Idle.transition(Approved).is_err());
        assert!(EvaluatingPrimary.transition(Failed).is_err());
        assert!(Approved.transition(EvaluatingFallback).is_err());
        assert!(Failed.transition(Approved).is_err());
        assert!(!EvaluatingFallback.is_terminal());
        assert!(Timeout.is_terminal());
    }
}
