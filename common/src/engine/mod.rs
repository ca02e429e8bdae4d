// Live scheduling engine boundary
//
// The core constructs job and trigger specifications and hands them to the
// engine through this narrow interface; everything behind it (firing
// threads, stores, timing) is the engine's concern.

pub mod memory;

pub use memory::{EngineConfig, InMemoryEngine};

use crate::errors::{EngineError, JobError};
use crate::key::Key;
use crate::models::{JobSpec, TriggerSpec};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Context passed to a job body at fire time.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_key: Key,
    pub trigger_key: Key,
    /// When the trigger was scheduled to fire.
    pub scheduled_for: DateTime<Utc>,
    /// When the fire actually happened.
    pub fired_at: DateTime<Utc>,
    /// Job default data merged with trigger data; trigger entries win.
    pub data: HashMap<String, String>,
    /// 0 on the first execution, incremented by retrying wrappers.
    pub retry_attempt: u32,
}

/// A unit of executable work, addressed by a key, independent of any
/// particular trigger.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(&self, ctx: JobContext) -> Result<(), JobError>;
}

/// Read-only view of a registered trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerView {
    pub key: Key,
    pub description: String,
    pub job_key: Key,
    /// Absent for non-cron triggers.
    pub cron_expression: Option<String>,
    pub priority: i32,
    pub previous_fire_time: Option<DateTime<Utc>>,
    pub next_fire_time: Option<DateTime<Utc>>,
}

/// Narrow interface the core consumes from the live scheduling engine.
#[async_trait]
pub trait SchedulerEngine: Send + Sync {
    /// Register a job definition, replacing any previous definition with
    /// the same key.
    async fn add_or_replace_job(&self, job: JobSpec) -> Result<(), EngineError>;

    /// Whether a trigger with the given identity currently exists.
    async fn trigger_exists(&self, key: &Key) -> Result<bool, EngineError>;

    /// Submit a trigger for scheduling. Returns the trigger's identity,
    /// generated by the engine when the specification left it unset.
    async fn submit_trigger(&self, spec: TriggerSpec) -> Result<Key, EngineError>;

    /// Keys of all currently registered jobs.
    async fn job_keys(&self) -> Result<Vec<Key>, EngineError>;

    /// Keys of all currently active triggers.
    async fn trigger_keys(&self) -> Result<Vec<Key>, EngineError>;

    /// View of one trigger, or `None` when no trigger has that identity.
    async fn get_trigger(&self, key: &Key) -> Result<Option<TriggerView>, EngineError>;
}
