use std::sync::Arc;
use std::time::Instant;

use sha2::{Digest, Sha256};
use tracing::Instrument;

use arbiter_core::error::{ArbiterError, Result};
use arbiter_core::model::{
    ArbitrationDecision, DecisionRecord, Digest32, ExecResult, ExecStatus, SlotRecord, VetResult,
};

use crate::context::RequestCtx;
use crate::dispatch::{Producer, ProducerRegistry};
use crate::executor::{BoundedExecutor, RetryPolicy};
use crate::ledger::AuditLedger;
use crate::obs::ArbiterMetrics;
use crate::policy::{EvalSettings, PolicyEngine, PolicyPack};

use super::panel::{BlindPanel, PanelRound, Slot};
use super::state::ArbitrationState;

/// Everything observed during one arbitration, in the order it happened.
#[derive(Default)]
struct Trail {
    primary_exec: Option<ExecResult>,
    primary_vet: Option<VetResult>,
    fallback_exec: Option<ExecResult>,
    fallback_vet: Option<VetResult>,
    chosen: Option<String>,
    rounds: Vec<PanelRound>,
}

fn allowed(vet: Option<&VetResult>) -> bool {
    vet.is_some_and(|v| v.decision.is_allow())
}

fn output_digest(exec: &ExecResult) -> Option<Digest32> {
    exec.output
        .as_ref()
        .map(|o| Digest32(Sha256::digest(o.as_bytes()).into()))
}

fn slot_record(exec: &ExecResult, vet: Option<VetResult>) -> SlotRecord {
    SlotRecord {
        status: exec.status,
        error_code: exec.error_code,
        attempts: exec.attempts,
        output_sha256: output_digest(exec),
        vet,
    }
}

/// Runs primary/fallback arbitrations and records every decision in the
/// audit ledger before returning it.
pub struct Arbiter {
    executor: BoundedExecutor,
    retry: RetryPolicy,
    panel: BlindPanel,
    ledger: Arc<AuditLedger>,
    registry: Arc<ProducerRegistry>,
    metrics: Arc<ArbiterMetrics>,
}

impl Arbiter {
    pub fn new(ledger: Arc<AuditLedger>, retry: RetryPolicy, settings: EvalSettings) -> Self {
        Self {
            executor: BoundedExecutor::new(),
            retry,
            panel: BlindPanel::new(PolicyEngine::new(settings)),
            ledger,
            registry: Arc::new(ProducerRegistry::new()),
            metrics: Arc::new(ArbiterMetrics::default()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ArbiterMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_registry(mut self, registry: Arc<ProducerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &ProducerRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &Arc<AuditLedger> {
        &self.ledger
    }

    pub fn metrics(&self) -> &Arc<ArbiterMetrics> {
        &self.metrics
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Cancel in-flight producers; later runs settle as `CANCELLED`.
    pub fn shutdown(&self) {
        self.executor.shutdown();
    }

    /// Arbitrate between two registered producers.
    pub async fn arbitrate_named(
        &self,
        primary: &str,
        fallback: &str,
        ctx: RequestCtx,
        pack: &Arc<PolicyPack>,
    ) -> Result<ArbitrationDecision> {
        let p = self.registry.get(primary)?;
        let f = self.registry.get(fallback)?;
        self.arbitrate(p, f, ctx, pack).await
    }

    /// Run `primary`, vet it, fall back if needed, persist the decision.
    ///
    /// Returns `Err` only for internal and ledger faults; producer failures and
    /// vetoes are decisions.
    pub async fn arbitrate(
        &self,
        primary: Arc<dyn Producer>,
        fallback: Arc<dyn Producer>,
        ctx: RequestCtx,
        pack: &Arc<PolicyPack>,
    ) -> Result<ArbitrationDecision> {
        let span = tracing::info_span!(
            "arbitrate",
            correlation_id = %ctx.correlation_id,
            policy = pack.name(),
            policy_version = pack.version(),
        );
        async move {
            let started = Instant::now();
            self.metrics.arbitrations_active.inc(&[]);
            let result = self.run(primary, fallback, &ctx, pack).await;
            self.metrics.arbitrations_active.dec(&[]);

            match &result {
                Ok(d) => {
                    let decision = d.decision.as_str();
                    self.metrics.arbitrations.inc(&[("decision", decision)]);
                    self.metrics
                        .arbitration_duration
                        .observe(&[("decision", decision)], started.elapsed());
                    tracing::info!(
                        decision,
                        fallback_invoked = d.fallback_invoked(),
                        block_index = d.block_index,
                        "arbitration decided"
                    );
                }
                Err(e) => {
                    tracing::error!(code = e.fault_code().as_str(), error = %e, "arbitration aborted");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        primary: Arc<dyn Producer>,
        fallback: Arc<dyn Producer>,
        ctx: &RequestCtx,
        pack: &PolicyPack,
    ) -> Result<ArbitrationDecision> {
        let mut trail = Trail::default();
        let mut state = ArbitrationState::Idle.transition(ArbitrationState::EvaluatingPrimary)?;

        let primary_exec = self.execute("primary", primary).await;

        if let Some(text) = primary_exec.success_output() {
            let round = self.panel.review(pack, &[(Slot::Primary, text)]);
            self.observe_round("primary", &round);
            trail.primary_vet = round.verdict(Slot::Primary).cloned();
            trail.rounds.push(round);

            if allowed(trail.primary_vet.as_ref()) {
                trail.chosen = Some(text.to_string());
                trail.primary_exec = Some(primary_exec);
                state = state.transition(ArbitrationState::Approved)?;
                return self.finish(state, ctx, pack, trail).await;
            }
        } else if primary_exec.status == ExecStatus::Cancelled {
            trail.primary_exec = Some(primary_exec);
            state = state.transition(ArbitrationState::Error)?;
            return self.finish(state, ctx, pack, trail).await;
        }

        state = state.transition(ArbitrationState::EvaluatingFallback)?;
        let fallback_exec = self.execute("fallback", fallback).await;

        let next = if let Some(text) = fallback_exec.success_output() {
            let mut submissions = vec![(Slot::Fallback, text)];
            if let Some(p) = primary_exec.success_output() {
                submissions.push((Slot::Primary, p));
            }
            let round = self.panel.review(pack, &submissions);
            self.observe_round("joint", &round);
            trail.fallback_vet = round.verdict(Slot::Fallback).cloned();
            trail.rounds.push(round);

            if allowed(trail.fallback_vet.as_ref()) {
                trail.chosen = Some(text.to_string());
                ArbitrationState::Approved
            } else {
                ArbitrationState::Failed
            }
        } else if fallback_exec.status == ExecStatus::Timeout {
            ArbitrationState::Timeout
        } else {
            ArbitrationState::Error
        };

        trail.primary_exec = Some(primary_exec);
        trail.fallback_exec = Some(fallback_exec);
        state = state.transition(next)?;
        self.finish(state, ctx, pack, trail).await
    }

    async fn execute(&self, role: &'static str, producer: Arc<dyn Producer>) -> ExecResult {
        let exec = self.executor.run_with_retry(producer, &self.retry).await;
        self.metrics.exec_attempts.add(
            &[("role", role), ("status", exec.status.as_str())],
            u64::from(exec.attempts),
        );
        exec
    }

    fn observe_round(&self, stage: &'static str, round: &PanelRound) {
        for slot in round.order() {
            let Some(vet) = round.verdict(slot) else { continue };
            self.metrics
                .vet_decisions
                .inc(&[("stage", stage), ("decision", vet.decision.as_str())]);
            if vet.prefiltered {
                self.metrics.prefilter_skips.inc(&[]);
            }
            if vet.decode_attempts > 0 {
                self.metrics.decode_attempts.add(&[], u64::from(vet.decode_attempts));
            }
        }
    }

    async fn finish(
        &self,
        state: ArbitrationState,
        ctx: &RequestCtx,
        pack: &PolicyPack,
        trail: Trail,
    ) -> Result<ArbitrationDecision> {
        let outcome = state.outcome().ok_or_else(|| {
            ArbiterError::Internal(format!("arbitration ended in {}", state.as_str()))
        })?;
        let primary_exec = trail
            .primary_exec
            .ok_or_else(|| ArbiterError::Internal("primary never executed".into()))?;

        // APPROVED must rest on an allow verdict for the very output chosen.
        if state == ArbitrationState::Approved {
            let backing = if trail.fallback_exec.is_some() {
                trail.fallback_vet.as_ref()
            } else {
                trail.primary_vet.as_ref()
            };
            if trail.chosen.is_none() || !allowed(backing) {
                return Err(ArbiterError::Internal(
                    "approval without an allow verdict".into(),
                ));
            }
        }

        let record = DecisionRecord {
            correlation_id: ctx.correlation_id,
            decision: outcome,
            policy: pack.policy_ref(),
            primary: slot_record(&primary_exec, trail.primary_vet.clone()),
            fallback: trail
                .fallback_exec
                .as_ref()
                .map(|e| slot_record(e, trail.fallback_vet.clone())),
            chosen_output: trail.chosen.clone(),
            request: ctx.to_record(),
        };

        let receipt = match self.ledger.append_async(&record).await {
            Ok(r) => r,
            Err(e) => {
                self.metrics
                    .ledger_faults
                    .inc(&[("code", e.fault_code().as_str())]);
                return Err(e);
            }
        };
        self.metrics.ledger_appends.inc(&[]);

        for round in &trail.rounds {
            for (slot, label) in round.unmask() {
                tracing::info!(slot = slot.as_str(), label = label.as_str(), "panel label unmasked");
            }
        }

        Ok(ArbitrationDecision {
            decision: outcome,
            chosen_output: trail.chosen,
            primary_vet: trail.primary_vet,
            fallback_vet: trail.fallback_vet,
            primary_exec,
            fallback_exec: trail.fallback_exec,
            policy: pack.policy_ref(),
            correlation_id: ctx.correlation_id,
            block_hash: receipt.block_hash,
            block_index: receipt.index,
        })
    }
}
