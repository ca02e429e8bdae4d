// Schedule declaration model and compiled trigger forms

use crate::engine::JobHandler;
use crate::key::{InvalidKeyError, Key};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Priority assigned to triggers that do not declare one.
pub const DEFAULT_PRIORITY: i32 = 5;

// ============================================================================
// Misfire policy
// ============================================================================

/// Instruction to the engine on how to handle a cron trigger misfire.
///
/// A misfire occurs when, for some reason, a trigger isn't allowed to run
/// when it is scheduled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MisfirePolicy {
    /// Do not fire; wait for the next regularly scheduled occurrence.
    DoNothing,
    /// Fire once immediately to catch up, then resume the normal schedule.
    FireAndProceed,
    /// Fire every missed occurrence as soon as possible.
    IgnoreMisfires,
}

/// Misfire handling for one-shot delayed triggers.
///
/// Delayed single-fire triggers only support firing immediately once the
/// delay window has passed, or dropping the fire entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OneShotMisfirePolicy {
    /// Fire immediately upon recovery regardless of how late.
    FireOnceNow,
    /// If the fire window is missed, drop it, carrying forward the
    /// remaining repeat count.
    SkipIfMissed,
}

/// Lenient `onMisfire` reader: absent and unrecognized values both leave
/// the engine's built-in default untouched. Omission is not an error.
fn misfire_policy_lenient<'de, D>(deserializer: D) -> Result<Option<MisfirePolicy>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(|value| match value {
        "DO_NOTHING" => Some(MisfirePolicy::DoNothing),
        "FIRE_AND_PROCEED" => Some(MisfirePolicy::FireAndProceed),
        "IGNORE_MISFIRES" => Some(MisfirePolicy::IgnoreMisfires),
        other => {
            tracing::warn!(
                value = %other,
                "unrecognized onMisfire value, using engine default"
            );
            None
        }
    }))
}

// ============================================================================
// Schedule declaration
// ============================================================================

/// One schedule item from the declaration file.
///
/// Constructed by parsing the declaration source once at startup and
/// immutable thereafter. Missing optional fields simply read as absent;
/// malformed content is rejected at the compiler layer, never here.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScheduleItem {
    /// Optional name of the trigger, `[<group>.]<name>`.
    #[serde(default)]
    pub trigger: Option<String>,

    /// Cron expression for running the job.
    pub cron: String,

    /// Job name, `[<group>.]<name>`.
    pub job: String,

    /// Fire-time parameters passed to the job.
    #[serde(default)]
    pub job_data: Option<HashMap<String, String>>,

    /// Optional comment or description for the trigger.
    #[serde(default)]
    pub comment: Option<String>,

    /// Priority for the trigger.
    #[serde(default)]
    pub priority: Option<i32>,

    /// Instruction to the engine on how to handle misfires.
    #[serde(default, deserialize_with = "misfire_policy_lenient")]
    pub on_misfire: Option<MisfirePolicy>,
}

impl ScheduleItem {
    /// Decompose the job reference into a key.
    pub fn job_key(&self) -> Result<Key, InvalidKeyError> {
        Key::parse(&self.job)
    }

    /// Decompose the trigger reference into a key, if one was declared.
    pub fn trigger_key(&self) -> Result<Option<Key>, InvalidKeyError> {
        self.trigger.as_deref().map(Key::parse).transpose()
    }
}

// ============================================================================
// Compiled trigger and job specifications
// ============================================================================

/// Schedule carried by a compiled trigger specification.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerSchedule {
    /// Recurring cron schedule. `on_misfire: None` leaves the engine's
    /// built-in default misfire behavior untouched.
    Cron {
        expression: String,
        on_misfire: Option<MisfirePolicy>,
    },
    /// Single fire at `start_at`, repeat count exactly one.
    OneShot {
        start_at: DateTime<Utc>,
        on_misfire: OneShotMisfirePolicy,
    },
}

impl TriggerSchedule {
    /// The cron expression, absent for non-cron schedules.
    pub fn cron_expression(&self) -> Option<&str> {
        match self {
            TriggerSchedule::Cron { expression, .. } => Some(expression),
            TriggerSchedule::OneShot { .. } => None,
        }
    }
}

/// Engine-ready trigger specification.
///
/// Constructed by the schedule compiler or by a management operation and
/// consumed exactly once by submission to the live engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerSpec {
    /// Trigger identity; `None` leaves the identity to be engine-generated.
    pub key: Option<Key>,
    /// Job the trigger fires.
    pub job_key: Key,
    /// Human-readable description.
    pub description: String,
    /// Priority used to order competing fires.
    pub priority: i32,
    /// When and how the trigger fires.
    pub schedule: TriggerSchedule,
    /// Fire-time parameters, merged over the job's default data.
    pub data: HashMap<String, String>,
}

/// Job definition registered with the engine: an addressable unit of work
/// bound to an async handler.
#[derive(Clone)]
pub struct JobSpec {
    pub key: Key,
    pub description: String,
    /// Default parameters, overridden per-fire by trigger data.
    pub data: HashMap<String, String>,
    pub handler: Arc<dyn JobHandler>,
}

impl JobSpec {
    pub fn new(key: Key, description: impl Into<String>, handler: Arc<dyn JobHandler>) -> Self {
        Self {
            key,
            description: description.into(),
            data: HashMap::new(),
            handler,
        }
    }

    /// Attach a default job-data entry.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

impl fmt::Debug for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSpec")
            .field("key", &self.key)
            .field("description", &self.description)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

/// One row of the `list_schedule` management listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleRow {
    /// Trigger identity in `group.name` form.
    pub trigger: String,
    /// Trigger description.
    pub description: String,
    /// Bound job identity in `group.name` form.
    pub job: String,
    /// Cron expression; absent for non-cron triggers.
    pub cron: Option<String>,
    /// Last time the trigger fired; absent if never fired.
    pub last_fire: Option<DateTime<Utc>>,
}
