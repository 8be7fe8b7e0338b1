#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod support;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use arbiter_core::model::{ExecErrorCode, ExecStatus, ProducerError};
use arbiter_engine::{producer_fn, BoundedExecutor, RetryPolicy};

use support::*;

fn policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_millis(100),
        max_retries,
        backoff: Duration::from_millis(50),
        max_output_bytes: 16,
    }
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_until_success() {
    let (p, calls) = flaky("p", 2, "done");
    let r = BoundedExecutor::new().run_with_retry(p, &policy(3)).await;
    assert_eq!(r.status, ExecStatus::Success);
    assert_eq!(r.output.as_deref(), Some("done"));
    assert_eq!(r.attempts, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn retries_are_bounded() {
    let (p, calls) = failing("p", ProducerError::transient("busy"));
    let r = BoundedExecutor::new().run_with_retry(p, &policy(2)).await;
    assert_eq!(r.status, ExecStatus::Error);
    assert_eq!(r.error_code, Some(ExecErrorCode::Transient));
    assert!(r.retryable);
    assert_eq!(r.attempts, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn terminal_errors_stop_immediately() {
    for (err, code) in [
        (ProducerError::malformed("x"), ExecErrorCode::MalformedInput),
        (ProducerError::permanent("x"), ExecErrorCode::Permanent),
    ] {
        let (p, calls) = failing("p", err);
        let r = BoundedExecutor::new().run_with_retry(p, &policy(5)).await;
        assert_eq!(r.error_code, Some(code));
        assert!(!r.retryable);
        assert_eq!(r.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn timeout_cancels_the_attempt() {
    let saw_cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&saw_cancel);
    let p = producer_fn("slow", move |cancel| {
        let flag = Arc::clone(&flag);
        async move {
            cancel.cancelled().await;
            flag.store(true, Ordering::SeqCst);
            Err(ProducerError::transient("cancelled"))
        }
    });

    let r = BoundedExecutor::new().run_with_retry(p, &policy(0)).await;
    assert_eq!(r.status, ExecStatus::Timeout);
    assert_eq!(r.error_code, Some(ExecErrorCode::Timeout));
    assert!(r.output.is_none());

    for _ in 0..10 {
        if saw_cancel.load(Ordering::SeqCst) {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(saw_cancel.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn oversized_output_is_terminal() {
    let (p, calls) = replying("p", "this output is far longer than sixteen bytes");
    let r = BoundedExecutor::new().run_with_retry(p, &policy(3)).await;
    assert_eq!(r.status, ExecStatus::Error);
    assert_eq!(r.error_code, Some(ExecErrorCode::PayloadTooLarge));
    assert!(r.output.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn panicking_producer_is_contained() {
    let p = producer_fn("boom", |_cancel| async {
        if true {
            panic!("producer bug");
        }
        Ok(String::new())
    });
    let r = BoundedExecutor::new().run_with_retry(p, &policy(3)).await;
    assert_eq!(r.status, ExecStatus::Error);
    assert_eq!(r.error_code, Some(ExecErrorCode::Panicked));
    assert_eq!(r.attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_in_flight_runs() {
    let exec = BoundedExecutor::new();
    let p = sleeping("slow", Duration::from_secs(60));
    let pol = RetryPolicy {
        timeout: Duration::from_secs(120),
        ..policy(0)
    };

    let runner = {
        let exec = exec.clone();
        tokio::spawn(async move { exec.run_with_retry(p, &pol).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    exec.shutdown();

    let r = runner.await.unwrap();
    assert_eq!(r.status, ExecStatus::Cancelled);
    assert!(!r.retryable);
    assert!(exec.is_shut_down());
}

#[tokio::test(start_paused = true)]
async fn every_run_is_held_to_the_envelope() {
    let pol = policy(2);
    let floor = pol.envelope() - pol.backoff.mul_f64(0.2);

    let (fast_ok, _) = replying("ok", "done");
    let (fast_err, _) = failing("err", ProducerError::permanent("no"));
    let (retried, _) = flaky("flaky", 2, "done");

    for p in [fast_ok, fast_err, retried] {
        let start = Instant::now();
        BoundedExecutor::new().run_with_retry(p, &pol).await;
        let took = start.elapsed();
        assert!(took >= floor, "released after {took:?}, floor {floor:?}");
        assert!(took <= pol.envelope() + pol.backoff.mul_f64(0.2) + Duration::from_millis(1));
    }
}
