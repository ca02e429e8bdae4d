// Demonstration system jobs
//
// These are the actions the scheduler can refer to whether or not a
// trigger currently points at them; operators can invoke them ad hoc or
// bind them to cron schedules in the schedule file.

use crate::engine::{JobContext, JobHandler};
use crate::errors::JobError;
use crate::key::Key;
use crate::models::JobSpec;
use crate::retry::{RetryingHandler, MAX_RETRIES_KEY, RETRY_DELAY_KEY};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use tracing::{debug, info};

/// Prints a hello-world line on each fire.
pub struct HelloWorldJob;

#[async_trait]
impl JobHandler for HelloWorldJob {
    async fn execute(&self, ctx: JobContext) -> Result<(), JobError> {
        let greeting = ctx
            .data
            .get("greeting")
            .map(String::as_str)
            .unwrap_or("Hello World");
        info!(trigger = %ctx.trigger_key, "{greeting} - executing");
        Ok(())
    }
}

/// Logs current process memory usage.
pub struct PrintMemoryJob;

#[async_trait]
impl JobHandler for PrintMemoryJob {
    async fn execute(&self, _ctx: JobContext) -> Result<(), JobError> {
        match read_memory_usage() {
            Some((rss_kb, vm_kb)) => {
                info!(
                    "current memory: {:.1}M resident of {:.1}M virtual",
                    rss_kb as f64 / 1024.0,
                    vm_kb as f64 / 1024.0
                );
            }
            None => info!("memory statistics unavailable on this platform"),
        }
        Ok(())
    }
}

/// (resident, virtual) memory in kilobytes, when the platform exposes it.
fn read_memory_usage() -> Option<(u64, u64)> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let field = |name: &str| -> Option<u64> {
        status
            .lines()
            .find(|line| line.starts_with(name))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    };
    Some((field("VmRSS:")?, field("VmSize:")?))
}

/// Logs scheduled vs. actual fire time, which is where misfire recovery
/// becomes visible in the logs.
pub struct FireLagJob;

#[async_trait]
impl JobHandler for FireLagJob {
    async fn execute(&self, ctx: JobContext) -> Result<(), JobError> {
        let lag = ctx.fired_at - ctx.scheduled_for;
        info!(
            trigger = %ctx.trigger_key,
            scheduled_for = %ctx.scheduled_for.format("%H:%M:%S%.3f"),
            "executing, delayed {}",
            format_age(lag)
        );
        debug!(ctx = ?ctx, "fire context");
        Ok(())
    }
}

/// User-printable description of how long ago a time was.
fn format_age(age: ChronoDuration) -> String {
    let total_ms = age.num_milliseconds().max(0);
    let days = total_ms / 86_400_000;
    let hours = (total_ms % 86_400_000) / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1000;
    let ms = total_ms % 1000;

    let mut out = String::new();
    if total_ms == 0 {
        out.push_str("0.");
    } else {
        if days > 0 {
            out.push_str(&format!("{days}d"));
        }
        if hours > 0 {
            out.push_str(&format!("{hours}h"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}m"));
        }
        out.push_str(&format!("{seconds}."));
    }
    out.push_str(&format!("{ms:03}s"));
    out
}

/// Fails on every fire, demonstrating error handling and retry.
pub struct ExceptionJob;

#[async_trait]
impl JobHandler for ExceptionJob {
    async fn execute(&self, ctx: JobContext) -> Result<(), JobError> {
        info!(
            trigger = %ctx.trigger_key,
            attempt = ctx.retry_attempt,
            "Exception - executing"
        );
        Err(JobError::new("error occurred in running the job"))
    }
}

/// The system job set registered at every startup.
pub fn system_jobs() -> Vec<JobSpec> {
    vec![
        JobSpec::new(
            Key::new("demoJob", "hello"),
            "Demonstration job to print hello world.",
            Arc::new(HelloWorldJob),
        ),
        JobSpec::new(
            Key::with_default_group("printMemory"),
            "Demonstration job to dump current memory usage.",
            Arc::new(PrintMemoryJob),
        ),
        JobSpec::new(
            Key::new("demoJob", "lag"),
            "Demonstration job to log trigger fire lag.",
            Arc::new(FireLagJob),
        ),
        JobSpec::new(
            Key::new("demoJob", "exception"),
            "An important job that fails with an exception and is retried.",
            Arc::new(RetryingHandler::new(Arc::new(ExceptionJob))),
        )
        // Defaults, overridable per trigger in the schedule file.
        .with_data(MAX_RETRIES_KEY, "3")
        .with_data(RETRY_DELAY_KEY, "2"),
    ]
}
