//! Doubly-blind review panel.
//!
//! The policy engine only ever sees a text and a random 128-bit label. Which
//! slot a label belongs to stays inside the [`PanelRound`] until the caller
//! unmasks it after the decision is final. Submissions within a round are
//! shuffled, so neither slot is systematically evaluated first.

use rand::seq::SliceRandom;
use rand::{CryptoRng, RngCore};

use arbiter_core::model::{RoleLabel, VetResult};

use crate::policy::{PolicyEngine, PolicyPack};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Primary,
    Fallback,
}

impl Slot {
    pub fn as_str(self) -> &'static str {
        match self {
            Slot::Primary => "primary",
            Slot::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone)]
struct Reviewed {
    slot: Slot,
    vet: VetResult,
}

/// Verdicts of one round, in evaluation order.
#[derive(Debug, Clone)]
pub struct PanelRound {
    reviewed: Vec<Reviewed>,
}

impl PanelRound {
    pub fn verdict(&self, slot: Slot) -> Option<&VetResult> {
        self.reviewed.iter().find(|r| r.slot == slot).map(|r| &r.vet)
    }

    /// Slots in the order the engine evaluated them.
    pub fn order(&self) -> Vec<Slot> {
        self.reviewed.iter().map(|r| r.slot).collect()
    }

    /// Label-to-slot mapping; only for use once the decision is final.
    pub fn unmask(&self) -> impl Iterator<Item = (Slot, &RoleLabel)> {
        self.reviewed.iter().map(|r| (r.slot, &r.vet.role_label))
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlindPanel {
    engine: PolicyEngine,
}

impl BlindPanel {
    pub fn new(engine: PolicyEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &PolicyEngine {
        &self.engine
    }

    pub fn review(&self, pack: &PolicyPack, submissions: &[(Slot, &str)]) -> PanelRound {
        self.review_with(&mut rand::thread_rng(), pack, submissions)
    }

    pub fn review_with<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        pack: &PolicyPack,
        submissions: &[(Slot, &str)],
    ) -> PanelRound {
        let mut queue: Vec<(Slot, &str, RoleLabel)> = submissions
            .iter()
            .map(|(slot, text)| (*slot, *text, fresh_label(&mut *rng)))
            .collect();
        queue.shuffle(rng);

        let reviewed = queue
            .into_iter()
            .map(|(slot, text, label)| Reviewed {
                slot,
                vet: self.engine.evaluate(text, pack, label),
            })
            .collect();
        PanelRound { reviewed }
    }
}

fn fresh_label<R: RngCore + CryptoRng>(rng: &mut R) -> RoleLabel {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    RoleLabel::new(hex::encode(bytes))
}
