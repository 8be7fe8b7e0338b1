use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;

use arbiter_core::model::{ExecErrorCode, ExecResult, ExecStatus};

use crate::dispatch::Producer;

/// Upper bound on `max_retries`, whatever the configuration says.
pub const MAX_RETRIES_CAP: u32 = 8;

/// Release jitter as a fraction of one backoff slot.
const JITTER_FRACTION: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Hard deadline per attempt.
    pub timeout: Duration,
    pub max_retries: u32,
    /// Slot length: attempt `i` starts no earlier than `i * backoff`.
    pub backoff: Duration,
    /// Longer outputs fail with `PAYLOAD_TOO_LARGE`.
    pub max_output_bytes: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 2,
            backoff: Duration::from_millis(250),
            max_output_bytes: 256 * 1024,
        }
    }
}

impl RetryPolicy {
    pub fn retries(&self) -> u32 {
        self.max_retries.min(MAX_RETRIES_CAP)
    }

    /// Nominal release time of every run, measured from its start.
    pub fn envelope(&self) -> Duration {
        self.backoff * (self.retries() + 1)
    }
}

/// Runs producers under a [`RetryPolicy`].
///
/// Every run, whatever its outcome, is held until the policy's envelope (plus
/// jitter) has elapsed, so a caller cannot tell from latency alone how many
/// attempts were made or whether the first one failed fast.
#[derive(Debug, Clone, Default)]
pub struct BoundedExecutor {
    shutdown: CancellationToken,
}

impl BoundedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels in-flight attempts and makes every run return `CANCELLED`.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub async fn run_with_retry(&self, producer: Arc<dyn Producer>, policy: &RetryPolicy) -> ExecResult {
        let start = Instant::now();
        let release = release_at(start, policy);
        let retries = policy.retries();
        let mut attempt: u32 = 0;

        loop {
            if !self.hold_until(start + policy.backoff * attempt).await {
                return cancelled(attempt, 0);
            }
            attempt += 1;

            let mut result = self.attempt(&producer, policy).await;
            result.attempts = attempt;
            if result.status == ExecStatus::Cancelled {
                return result;
            }

            if result.is_success() || !result.retryable || attempt > retries {
                // Shutdown during the hold releases the settled result early.
                self.hold_until(release).await;
                tracing::debug!(
                    producer = producer.name(),
                    status = result.status.as_str(),
                    attempts = attempt,
                    "producer run settled"
                );
                return result;
            }

            tracing::debug!(
                producer = producer.name(),
                attempt,
                code = result.error_code.map(ExecErrorCode::as_str),
                "producer attempt failed; retrying"
            );
        }
    }

    /// Sleep until `deadline`; false if shutdown fired first.
    async fn hold_until(&self, deadline: Instant) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            _ = sleep_until(deadline) => true,
        }
    }

    async fn attempt(&self, producer: &Arc<dyn Producer>, policy: &RetryPolicy) -> ExecResult {
        let cancel = self.shutdown.child_token();
        let started = Instant::now();
        let task = {
            let producer = Arc::clone(producer);
            let cancel = cancel.clone();
            tokio::spawn(async move { producer.produce(cancel).await })
        };

        // Dropping the JoinHandle detaches the task; its late result is lost.
        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            r = timeout(policy.timeout, task) => Some(r),
        };
        let ms = elapsed_ms(started);

        match outcome {
            None => cancelled(0, ms),
            Some(Err(_elapsed)) => {
                cancel.cancel();
                failure(ExecStatus::Timeout, ExecErrorCode::Timeout, ms)
            }
            Some(Ok(Err(join))) if join.is_panic() => {
                tracing::warn!(producer = producer.name(), "producer panicked");
                failure(ExecStatus::Error, ExecErrorCode::Panicked, ms)
            }
            Some(Ok(Err(_))) => cancelled(0, ms),
            Some(Ok(Ok(Err(e)))) => {
                tracing::debug!(producer = producer.name(), error = %e, "producer error");
                failure(ExecStatus::Error, e.kind.code(), ms)
            }
            Some(Ok(Ok(Ok(text)))) if text.len() > policy.max_output_bytes => {
                tracing::debug!(
                    producer = producer.name(),
                    len = text.len(),
                    limit = policy.max_output_bytes,
                    "producer output too large"
                );
                failure(ExecStatus::Error, ExecErrorCode::PayloadTooLarge, ms)
            }
            Some(Ok(Ok(Ok(text)))) => ExecResult {
                status: ExecStatus::Success,
                output: Some(text),
                error_code: None,
                duration_ms: ms,
                attempts: 0,
                retryable: false,
            },
        }
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn failure(status: ExecStatus, code: ExecErrorCode, duration_ms: u64) -> ExecResult {
    ExecResult {
        status,
        output: None,
        error_code: Some(code),
        duration_ms,
        attempts: 0,
        retryable: code.is_retryable(),
    }
}

fn cancelled(attempts: u32, duration_ms: u64) -> ExecResult {
    ExecResult {
        attempts,
        ..failure(ExecStatus::Cancelled, ExecErrorCode::Cancelled, duration_ms)
    }
}

/// `start + envelope ± jitter`, jitter uniform within `JITTER_FRACTION` of a slot.
fn release_at(start: Instant, policy: &RetryPolicy) -> Instant {
    let nominal = start + policy.envelope();
    let span = policy.backoff.mul_f64(JITTER_FRACTION);
    if span.is_zero() {
        return nominal;
    }
    let mut rng = rand::thread_rng();
    let offset = span.mul_f64(rng.gen::<f64>());
    if rng.gen::<bool>() {
        nominal + offset
    } else {
        nominal - offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_are_capped() {
        let p = RetryPolicy {
            max_retries: 50,
            ..RetryPolicy::default()
        };
        assert_eq!(p.retries(), MAX_RETRIES_CAP);
        assert_eq!(p.envelope(), p.backoff * (MAX_RETRIES_CAP + 1));
    }

    #[test]
    fn release_stays_within_jitter_band() {
        let p = RetryPolicy {
            max_retries: 2,
            backoff: Duration::from_millis(100),
            ..RetryPolicy::default()
        };
        let start = Instant::now();
        for _ in 0..200 {
            let r = release_at(start, &p) - start;
            assert!(r >= Duration::from_millis(280) && r <= Duration::from_millis(320), "{r:?}");
        }
    }
}
