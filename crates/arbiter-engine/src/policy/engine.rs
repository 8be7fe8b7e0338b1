//! Policy evaluation runtime.
//!
//! Scoring combines three additive signals, each rule counted once: exact
//! pattern hits on normalized text, fuzzy keyword hits on the skeleton, and
//! the same two signals over decoded views of encoded substrings.

use chrono::Utc;

use arbiter_core::model::{RoleLabel, VetDecision, VetResult};

use super::decode::{DecodeQueue, MAX_DECODE_ATTEMPTS};
use super::fuzzy::best_match;
use super::normalize::{normalize, skeleton};
use super::pack::{CompiledRule, PolicyPack};

/// Engine-wide evaluation limits (independent of any pack).
#[derive(Debug, Clone, Copy)]
pub struct EvalSettings {
    /// Decode attempts per evaluation, capped at `MAX_DECODE_ATTEMPTS`.
    pub max_decode_attempts: u32,
    /// Longer inputs are scored on this prefix only.
    pub max_input_bytes: usize,
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self {
            max_decode_attempts: MAX_DECODE_ATTEMPTS,
            max_input_bytes: 1 << 20,
        }
    }
}

/// Score and matches for one text, before a role label is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub score: f64,
    pub decision: VetDecision,
    pub matched_rule_codes: Vec<String>,
    pub decode_attempts: u32,
    pub prefiltered: bool,
}

/// Deterministic content policy evaluator.
///
/// Holds no per-request state; the pack is passed on every call so two
/// evaluations under the same pack can never observe different rules.
#[derive(Debug, Clone, Default)]
pub struct PolicyEngine {
    settings: EvalSettings,
}

impl PolicyEngine {
    pub fn new(settings: EvalSettings) -> Self {
        Self {
            settings: EvalSettings {
                max_decode_attempts: settings.max_decode_attempts.min(MAX_DECODE_ATTEMPTS),
                ..settings
            },
        }
    }

    pub fn settings(&self) -> EvalSettings {
        self.settings
    }

    /// Evaluate `text` under `pack`, tagging the result with an opaque label.
    pub fn evaluate(&self, text: &str, pack: &PolicyPack, role_label: RoleLabel) -> VetResult {
        let a = self.assess(text, pack);
        VetResult {
            role_label,
            policy_name: pack.name().to_string(),
            policy_version: pack.version().to_string(),
            score: a.score,
            decision: a.decision,
            matched_rule_codes: a.matched_rule_codes,
            decode_attempts: a.decode_attempts,
            prefiltered: a.prefiltered,
            timestamp: Utc::now(),
        }
    }

    pub fn assess(&self, text: &str, pack: &PolicyPack) -> Assessment {
        let raw = truncate_on_char_boundary(text, self.settings.max_input_bytes);
        if raw.len() < text.len() {
            tracing::debug!(
                len = text.len(),
                limit = self.settings.max_input_bytes,
                "policy input truncated"
            );
        }

        let threshold = pack.effective_threshold();
        let normalized = normalize(raw);

        if !pack.prefilter().may_match(raw, &normalized) {
            return Assessment {
                score: 0.0,
                decision: decide(0.0, threshold),
                matched_rule_codes: Vec::new(),
                decode_attempts: 0,
                prefiltered: true,
            };
        }

        let rules = pack.compiled();
        let mut tally = Tally::new(rules.len());
        tally.score_view(rules, &normalized);

        let mut queue = DecodeQueue::new(raw, self.settings.max_decode_attempts);
        // Decoding stops as soon as the verdict can no longer change.
        while tally.total() < threshold {
            let Some(view) = queue.next_attempt() else { break };
            tally.score_view(rules, &normalize(&view.text));
        }

        let score = tally.total();
        let mut codes: Vec<String> = rules
            .iter()
            .zip(&tally.matched)
            .filter(|(_, hit)| **hit)
            .map(|(r, _)| r.code.clone())
            .collect();
        codes.sort();
        codes.dedup();

        Assessment {
            score,
            decision: decide(score, threshold),
            matched_rule_codes: codes,
            decode_attempts: queue.attempts(),
            prefiltered: false,
        }
    }
}

fn decide(score: f64, threshold: f64) -> VetDecision {
    if score >= threshold {
        VetDecision::Veto
    } else {
        VetDecision::Allow
    }
}

fn truncate_on_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Per-rule accumulation; each rule contributes at most once.
struct Tally {
    matched: Vec<bool>,
    sum: f64,
}

impl Tally {
    fn new(n: usize) -> Self {
        Self {
            matched: vec![false; n],
            sum: 0.0,
        }
    }

    fn total(&self) -> f64 {
        self.sum.clamp(0.0, 1.0)
    }

    fn score_view(&mut self, rules: &[CompiledRule], normalized: &str) {
        let skel = skeleton(normalized);
        for (i, rule) in rules.iter().enumerate() {
            if self.matched[i] {
                continue;
            }
            if rule.regex.is_match(normalized) {
                self.matched[i] = true;
                self.sum += rule.weight;
                continue;
            }
            let fuzzy = rule
                .keywords
                .iter()
                .filter_map(|kw| {
                    best_match(&kw.skeleton, &skel, kw.max_edits)
                        .map(|d| 1.0 - d as f64 / (kw.skeleton.len() as f64 + 1.0))
                })
                .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.max(c))));
            if let Some(closeness) = fuzzy {
                self.matched[i] = true;
                self.sum += rule.weight * closeness;
            }
        }
    }
}
