// Runtime management operations
//
// Stateless requests against the live engine: fire a job now or after a
// delay, and inspect registered jobs and active triggers. Each call either
// hands a complete trigger to the engine or fails with no partial state.

use crate::engine::SchedulerEngine;
use crate::errors::ManagementError;
use crate::key::Key;
use crate::models::{OneShotMisfirePolicy, ScheduleRow, DEFAULT_PRIORITY};
use crate::trigger::TriggerBuilder;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tracing::{info, instrument};

/// Description attached to triggers created by management operations.
const AD_HOC_DESCRIPTION: &str = "ad-hoc invocation";

/// Management facade over the live scheduling engine.
#[derive(Clone)]
pub struct SchedulerAdmin {
    engine: Arc<dyn SchedulerEngine>,
}

impl SchedulerAdmin {
    pub fn new(engine: Arc<dyn SchedulerEngine>) -> Self {
        Self { engine }
    }

    /// Schedule the specified job for immediate execution.
    ///
    /// The trigger starts now with priority one above the engine default,
    /// so ad-hoc invocations win over routine scheduling when both compete.
    #[instrument(skip(self))]
    pub async fn run_immediately(&self, job_key: &str) -> Result<Key, ManagementError> {
        let job_key = Key::parse(job_key)?;
        info!(job = %job_key, "scheduling job to run immediately");

        let spec = TriggerBuilder::new()
            .for_job(job_key)
            .with_description(AD_HOC_DESCRIPTION)
            .with_priority(DEFAULT_PRIORITY + 1)
            .with_one_shot(Utc::now(), OneShotMisfirePolicy::FireOnceNow)
            .build()?;

        self.engine
            .submit_trigger(spec)
            .await
            .map_err(ManagementError::Submission)
    }

    /// Schedule the specified job to run once after a delay.
    ///
    /// With `persistent_retry` false a missed fire window drops the fire,
    /// which is the safe choice for non-idempotent jobs. With it true the
    /// job fires immediately upon recovery regardless of how late, for jobs
    /// that absolutely must run once.
    #[instrument(skip(self))]
    pub async fn run_after_delay(
        &self,
        job_key: &str,
        delay_seconds: u64,
        persistent_retry: bool,
    ) -> Result<Key, ManagementError> {
        let job_key = Key::parse(job_key)?;
        info!(
            job = %job_key,
            delay_seconds,
            persistent_retry,
            "scheduling job to run after delay"
        );

        let on_misfire = if persistent_retry {
            OneShotMisfirePolicy::FireOnceNow
        } else {
            OneShotMisfirePolicy::SkipIfMissed
        };

        let spec = TriggerBuilder::new()
            .for_job(job_key)
            .with_description(AD_HOC_DESCRIPTION)
            .with_priority(DEFAULT_PRIORITY + 1)
            .with_one_shot(
                Utc::now() + ChronoDuration::seconds(delay_seconds as i64),
                on_misfire,
            )
            .build()?;

        self.engine
            .submit_trigger(spec)
            .await
            .map_err(ManagementError::Submission)
    }

    /// All currently registered job identities in `group.name` form.
    #[instrument(skip(self))]
    pub async fn list_jobs(&self) -> Result<Vec<String>, ManagementError> {
        let keys = self
            .engine
            .job_keys()
            .await
            .map_err(ManagementError::Query)?;
        Ok(keys.iter().map(Key::to_string).collect())
    }

    /// One row per currently active trigger.
    ///
    /// Either the full snapshot succeeds or the call fails; a trigger that
    /// completes while the snapshot is being assembled is simply no longer
    /// active and is omitted.
    #[instrument(skip(self))]
    pub async fn list_schedule(&self) -> Result<Vec<ScheduleRow>, ManagementError> {
        let keys = self
            .engine
            .trigger_keys()
            .await
            .map_err(ManagementError::Query)?;

        let mut rows = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(view) = self
                .engine
                .get_trigger(&key)
                .await
                .map_err(ManagementError::Query)?
            else {
                continue;
            };
            rows.push(ScheduleRow {
                trigger: view.key.to_string(),
                description: view.description,
                job: view.job_key.to_string(),
                cron: view.cron_expression,
                last_fire: view.previous_fire_time,
            });
        }

        Ok(rows)
    }
}
