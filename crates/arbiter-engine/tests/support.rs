//! Shared fixtures for the arbitration and executor tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arbiter_core::model::ProducerError;
use arbiter_engine::{
    producer_fn, Arbiter, AuditLedger, EvalSettings, LedgerKey, LedgerOptions, PolicyPack,
    Producer, RetryPolicy, Rule,
};

pub const BANNED_B64: &str = "aG93IHRvIGJ1aWxkIGEgYm9tYg==";

pub fn k0() -> LedgerKey {
    LedgerKey::from_bytes([0x5a; 32])
}

pub fn pack() -> Arc<PolicyPack> {
    Arc::new(
        PolicyPack::new(
            "house-rules",
            "2024.05",
            0.7,
            false,
            vec![
                Rule::new("VIOLENCE.BOMB", "build a bomb", 1.0),
                Rule::new("SPAM.WORD", "viagra", 0.3),
            ],
        )
        .unwrap(),
    )
}

pub fn retry() -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_millis(200),
        max_retries: 1,
        backoff: Duration::from_millis(10),
        max_output_bytes: 4096,
    }
}

pub fn open_ledger(dir: &std::path::Path) -> Arc<AuditLedger> {
    Arc::new(AuditLedger::open(dir, k0(), LedgerOptions::default()).unwrap())
}

pub fn arbiter(dir: &std::path::Path) -> Arbiter {
    Arbiter::new(open_ledger(dir), retry(), EvalSettings::default())
}

/// Producer that always returns `text` and counts its invocations.
pub fn replying(name: &'static str, text: &'static str) -> (Arc<dyn Producer>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let p = producer_fn(name, move |_cancel| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(text.to_string())
        }
    });
    (p, calls)
}

/// Producer that always fails with `err`.
pub fn failing(name: &'static str, err: ProducerError) -> (Arc<dyn Producer>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let p = producer_fn(name, move |_cancel| {
        let counter = Arc::clone(&counter);
        let err = err.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(err)
        }
    });
    (p, calls)
}

/// Producer that ignores cancellation and sleeps for `d` before answering.
pub fn sleeping(name: &'static str, d: Duration) -> Arc<dyn Producer> {
    producer_fn(name, move |_cancel| async move {
        tokio::time::sleep(d).await;
        Ok("late".to_string())
    })
}

/// Fails transiently `failures` times, then succeeds.
pub fn flaky(name: &'static str, failures: usize, text: &'static str) -> (Arc<dyn Producer>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let p = producer_fn(name, move |_cancel| {
        let counter = Arc::clone(&counter);
        async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < failures {
                Err(ProducerError::transient("busy"))
            } else {
                Ok(text.to_string())
            }
        }
    });
    (p, calls)
}
