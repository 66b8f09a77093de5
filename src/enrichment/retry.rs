use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::time::sleep;
use tracing::warn;

/// Outcome of a single HTTP attempt.
#[derive(Debug)]
pub enum Attempt {
    Done(String),
    /// 429; carries the server's `Retry-After` if it sent one.
    RateLimited(Option<Duration>),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts allowed for transport errors and non-200 answers.
    pub max_attempts: u32,
    /// Sleeps allowed for 429 answers, counted separately.
    pub max_rate_limit_waits: u32,
    /// Used when a 429 carries no `Retry-After`.
    pub rate_limit_wait: Duration,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_rate_limit_waits: 5,
            rate_limit_wait: Duration::from_secs(10),
            backoff_base: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Exponential delay after the `failures`-th failed attempt (1-based).
    pub fn backoff(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1u32 << exp)
    }
}

/// Drive `op` until it yields a body or the policy is exhausted.
pub async fn run_with_retry<F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt>,
{
    let mut failures = 0u32;
    let mut waits = 0u32;
    loop {
        match op().await {
            Attempt::Done(body) => return Ok(body),
            Attempt::RateLimited(retry_after) => {
                if waits >= policy.max_rate_limit_waits {
                    bail!("{label}: still rate limited after {waits} waits");
                }
                waits += 1;
                let delay = retry_after.unwrap_or(policy.rate_limit_wait);
                warn!(
                    label,
                    wait_secs = delay.as_secs(),
                    waits,
                    "rate limited; sleeping before retry"
                );
                sleep(delay).await;
            }
            Attempt::Failed(reason) => {
                failures += 1;
                if failures >= policy.max_attempts {
                    bail!("{label}: giving up after {failures} attempts: {reason}");
                }
                let delay = policy.backoff(failures);
                warn!(
                    label,
                    attempt = failures,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "request failed; backing off"
                );
                sleep(delay).await;
            }
        }
    }
}
