// Trigger assembly shared by the schedule compiler and the management
// operations

use crate::errors::TriggerBuildError;
use crate::key::Key;
use crate::models::{
    MisfirePolicy, OneShotMisfirePolicy, TriggerSchedule, TriggerSpec, DEFAULT_PRIORITY,
};
use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use std::collections::HashMap;
use std::str::FromStr;

/// Parse and validate a cron expression (Quartz-style, seconds first).
///
/// Quartz schedules write `?` for "no specific value"; the underlying
/// parser spells that `*`.
pub fn parse_cron_expression(expression: &str) -> Result<CronSchedule, TriggerBuildError> {
    let normalized = expression.replace('?', "*");
    CronSchedule::from_str(&normalized).map_err(|e| TriggerBuildError::InvalidCron {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

/// Builder for engine-ready trigger specifications.
///
/// Both the compiler and the ad-hoc management operations assemble triggers
/// through this one type, so identity, priority, description, and misfire
/// handling follow a single set of rules regardless of where the trigger
/// came from.
#[derive(Debug, Default)]
pub struct TriggerBuilder {
    key: Option<Key>,
    job_key: Option<Key>,
    description: Option<String>,
    priority: Option<i32>,
    schedule: Option<TriggerSchedule>,
    data: HashMap<String, String>,
}

impl TriggerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target job; required.
    pub fn for_job(mut self, job_key: Key) -> Self {
        self.job_key = Some(job_key);
        self
    }

    /// Explicit trigger identity. When never called, the identity is left
    /// for the engine to generate.
    pub fn with_identity(mut self, key: Key) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Explicit priority. When never called, [`DEFAULT_PRIORITY`] applies.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Recurring cron schedule. `on_misfire: None` leaves the engine's
    /// built-in default misfire behavior untouched.
    pub fn with_cron_schedule(
        mut self,
        expression: impl Into<String>,
        on_misfire: Option<MisfirePolicy>,
    ) -> Self {
        self.schedule = Some(TriggerSchedule::Cron {
            expression: expression.into(),
            on_misfire,
        });
        self
    }

    /// One-shot schedule firing once at `start_at`.
    pub fn with_one_shot(
        mut self,
        start_at: DateTime<Utc>,
        on_misfire: OneShotMisfirePolicy,
    ) -> Self {
        self.schedule = Some(TriggerSchedule::OneShot {
            start_at,
            on_misfire,
        });
        self
    }

    /// Attach fire-time parameters verbatim.
    pub fn using_job_data(mut self, data: HashMap<String, String>) -> Self {
        self.data = data;
        self
    }

    /// Validate and produce the specification. Cron syntax is checked here,
    /// so a bad expression fails the build rather than the eventual fire.
    pub fn build(self) -> Result<TriggerSpec, TriggerBuildError> {
        let job_key = self.job_key.ok_or(TriggerBuildError::MissingJob)?;
        let schedule = self.schedule.ok_or(TriggerBuildError::MissingSchedule)?;

        if let TriggerSchedule::Cron { expression, .. } = &schedule {
            parse_cron_expression(expression)?;
        }

        Ok(TriggerSpec {
            key: self.key,
            job_key,
            description: self.description.unwrap_or_default(),
            priority: self.priority.unwrap_or(DEFAULT_PRIORITY),
            schedule,
            data: self.data,
        })
    }
}
