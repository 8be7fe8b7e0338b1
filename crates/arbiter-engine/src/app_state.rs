//! Shared application state for the arbiter binary and its ops endpoints.
//!
//! Startup errors are returned, never panicked: a bad pack, a missing key or
//! an unreadable ledger stop the process with a fault code.

use std::sync::Arc;
use std::time::Duration;

use arbiter_core::error::{ArbiterError, Result};
use arbiter_core::model::Digest32;

use crate::arbiter::Arbiter;
use crate::config::ArbiterConfig;
use crate::ledger::{AuditLedger, LedgerKey, VerifyReport};
use crate::obs::ArbiterMetrics;
use crate::policy::{load_pack_from_file, PolicyPack};

const DRAIN_POLL: Duration = Duration::from_millis(50);
const DRAIN_LIMIT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: ArbiterConfig,
    pack: Arc<PolicyPack>,
    arbiter: Arc<Arbiter>,
    metrics: Arc<ArbiterMetrics>,
}

/// Read `k0` (64 hex chars) from the environment variable `name`.
pub fn ledger_key_from_env(name: &str) -> Result<LedgerKey> {
    let raw = std::env::var(name)
        .map_err(|_| ArbiterError::InvalidConfig(format!("ledger key variable {name} is not set")))?;
    LedgerKey::from_hex(&raw).ok_or_else(|| {
        ArbiterError::InvalidConfig(format!("ledger key variable {name} must hold 64 hex chars"))
    })
}

impl AppState {
    /// Load the pack and ledger key named by `cfg`, then build the state.
    pub fn from_config(cfg: ArbiterConfig) -> Result<Self> {
        let pack = load_pack_from_file(&cfg.policy.pack_path, cfg.policy.eval_settings())?;
        let k0 = ledger_key_from_env(&cfg.ledger.key_env)?;
        Self::new(cfg, pack, k0)
    }

    /// Open and verify the ledger, then wire the arbiter.
    pub fn new(cfg: ArbiterConfig, pack: PolicyPack, k0: LedgerKey) -> Result<Self> {
        let ledger = Arc::new(AuditLedger::open(&cfg.ledger.dir, k0, cfg.ledger.options())?);
        let report = ledger.verify_all()?;
        if !report.ok {
            tracing::error!(
                first_bad_index = report.first_bad_index,
                reason = report.reason.as_deref(),
                "ledger verification failed; appends disabled"
            );
        }

        let metrics = Arc::new(ArbiterMetrics::default());
        let arbiter = Arbiter::new(
            ledger,
            cfg.executor.retry_policy(),
            cfg.policy.eval_settings(),
        )
        .with_metrics(Arc::clone(&metrics));

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                pack: Arc::new(pack),
                arbiter: Arc::new(arbiter),
                metrics,
            }),
        })
    }

    pub fn cfg(&self) -> &ArbiterConfig {
        &self.inner.cfg
    }

    pub fn pack(&self) -> Arc<PolicyPack> {
        Arc::clone(&self.inner.pack)
    }

    pub fn arbiter(&self) -> Arc<Arbiter> {
        Arc::clone(&self.inner.arbiter)
    }

    pub fn metrics(&self) -> &ArbiterMetrics {
        &self.inner.metrics
    }

    pub fn ledger(&self) -> &AuditLedger {
        self.inner.arbiter.ledger()
    }

    pub fn is_draining(&self) -> bool {
        self.inner.metrics.is_draining()
    }

    /// Ready unless draining or the ledger refuses appends.
    pub fn is_ready(&self) -> bool {
        !self.is_draining() && !self.ledger().is_corrupted()
    }

    pub async fn verify_ledger(&self) -> Result<VerifyReport> {
        self.inner.arbiter.ledger().verify_all_async().await
    }

    /// Gauges computed at scrape time.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        let ledger = self.ledger();
        vec![
            ("arbiter_ledger_entries", ledger.len().unwrap_or(0)),
            ("arbiter_ledger_corrupted", u64::from(ledger.is_corrupted())),
        ]
    }

    /// Stop taking work, cancel in-flight producers, wait (bounded) for
    /// running arbitrations to record their decisions, then seal the ledger.
    pub async fn drain(&self) -> Result<Digest32> {
        self.inner.metrics.set_draining();
        self.inner.arbiter.shutdown();

        let deadline = tokio::time::Instant::now() + DRAIN_LIMIT;
        while self.inner.metrics.arbitrations_active.get(&[]) > 0 {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!("drain deadline reached with arbitrations still running");
                break;
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }

        let checkpoint = self.inner.arbiter.ledger().seal_async().await?;
        tracing::info!(%checkpoint, "ledger sealed on shutdown");
        Ok(checkpoint)
    }
}
