// Retry strategies and the retrying job wrapper
//
// Jobs that must survive transient failures are registered wrapped in
// [`RetryingHandler`], which re-runs the inner job up to a bounded number
// of attempts with a delay between them. Retry settings come from job
// data, so a trigger's jobData can override the job-level defaults.

use crate::engine::{JobContext, JobHandler};
use crate::errors::JobError;
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Job-data key holding the maximum number of retries.
pub const MAX_RETRIES_KEY: &str = "maxRetries";
/// Job-data key holding the delay between attempts, in seconds.
pub const RETRY_DELAY_KEY: &str = "retryDelaySeconds";
/// Job-data key selecting the strategy: `fixed` (default) or `exponential`.
pub const RETRY_BACKOFF_KEY: &str = "retryBackoff";

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_SECS: u64 = 2;

/// Strategy for calculating retry delays.
pub trait RetryStrategy: Send + Sync {
    /// Delay before the next attempt, or `None` when retries are exhausted.
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

/// Fixed delay between attempts, with jitter to avoid thundering herds.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay_secs: u64,
    max_retries: u32,
    jitter_factor: f64,
}

impl FixedDelay {
    pub fn new(delay_secs: u64, max_retries: u32) -> Self {
        Self {
            delay_secs,
            max_retries,
            jitter_factor: 0.1,
        }
    }
}

impl RetryStrategy for FixedDelay {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        Some(add_jitter(self.delay_secs, self.jitter_factor))
    }
}

/// Exponential backoff: base * 3^attempt seconds, capped.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay_secs: u64,
    max_delay_secs: u64,
    max_retries: u32,
    jitter_factor: f64,
}

impl ExponentialBackoff {
    pub fn new(base_delay_secs: u64, max_retries: u32) -> Self {
        Self {
            base_delay_secs,
            max_delay_secs: 1800,
            max_retries,
            jitter_factor: 0.1,
        }
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        let delay = self
            .base_delay_secs
            .saturating_mul(3_u64.saturating_pow(attempt))
            .min(self.max_delay_secs);
        Some(add_jitter(delay, self.jitter_factor))
    }
}

fn add_jitter(delay_secs: u64, jitter_factor: f64) -> Duration {
    let base_ms = delay_secs * 1000;
    let jitter_range_ms = (base_ms as f64 * jitter_factor) as u64;
    let jitter_ms = if jitter_range_ms > 0 {
        rand::thread_rng().gen_range(0..=jitter_range_ms)
    } else {
        0
    };
    Duration::from_millis(base_ms + jitter_ms)
}

/// Pick a strategy from fire-time job data.
fn strategy_from_data(data: &HashMap<String, String>) -> Box<dyn RetryStrategy> {
    let max_retries = data
        .get(MAX_RETRIES_KEY)
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_RETRIES);
    let delay_secs = data
        .get(RETRY_DELAY_KEY)
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_RETRY_DELAY_SECS);

    match data.get(RETRY_BACKOFF_KEY).map(String::as_str) {
        Some("exponential") => Box::new(ExponentialBackoff::new(delay_secs, max_retries)),
        _ => Box::new(FixedDelay::new(delay_secs, max_retries)),
    }
}

/// Wrapper re-running a failed job up to a bounded number of attempts.
pub struct RetryingHandler {
    inner: Arc<dyn JobHandler>,
}

impl RetryingHandler {
    pub fn new(inner: Arc<dyn JobHandler>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl JobHandler for RetryingHandler {
    async fn execute(&self, ctx: JobContext) -> Result<(), JobError> {
        let strategy = strategy_from_data(&ctx.data);
        let mut attempt = 0u32;

        loop {
            let mut attempt_ctx = ctx.clone();
            attempt_ctx.retry_attempt = attempt;

            match self.inner.execute(attempt_ctx).await {
                Ok(()) => {
                    if attempt > 0 {
                        info!(job = %ctx.job_key, attempt, "job recovered after retry");
                    }
                    return Ok(());
                }
                Err(e) => match strategy.next_delay(attempt) {
                    Some(delay) => {
                        warn!(
                            job = %ctx.job_key,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "job failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        error!(
                            job = %ctx.job_key,
                            attempts = attempt + 1,
                            error = %e,
                            "job failed, retries exhausted"
                        );
                        return Err(JobError::new(format!(
                            "failed after {} attempts: {}",
                            attempt + 1,
                            e
                        )));
                    }
                },
            }
        }
    }
}
