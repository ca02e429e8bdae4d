// In-memory scheduling engine
//
// Ephemeral trigger/job store with a tokio run loop. Nothing survives a
// restart, so startup reconciliation re-adds every declared trigger on
// every boot.

use super::{JobContext, JobHandler, SchedulerEngine, TriggerView};
use crate::errors::EngineError;
use crate::key::Key;
use crate::models::{
    JobSpec, MisfirePolicy, OneShotMisfirePolicy, TriggerSchedule, TriggerSpec,
};
use crate::trigger::parse_cron_expression;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use cron::Schedule as CronSchedule;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Configuration for the in-memory engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often the run loop looks for due triggers (in milliseconds).
    pub tick_interval_ms: u64,
    /// How late a fire may be before it counts as a misfire (in seconds).
    pub misfire_threshold_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            misfire_threshold_seconds: 60,
        }
    }
}

enum EntryKind {
    Cron {
        schedule: Box<CronSchedule>,
        on_misfire: Option<MisfirePolicy>,
    },
    OneShot {
        on_misfire: OneShotMisfirePolicy,
    },
}

struct TriggerEntry {
    spec: TriggerSpec,
    kind: EntryKind,
    next_fire: DateTime<Utc>,
    previous_fire: Option<DateTime<Utc>>,
}

/// In-memory implementation of the engine boundary.
pub struct InMemoryEngine {
    config: EngineConfig,
    jobs: RwLock<HashMap<Key, JobSpec>>,
    triggers: RwLock<HashMap<Key, TriggerEntry>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl InMemoryEngine {
    pub fn new(config: EngineConfig) -> Self {
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

        Self {
            config,
            jobs: RwLock::new(HashMap::new()),
            triggers: RwLock::new(HashMap::new()),
            shutdown_tx,
        }
    }

    /// Run the firing loop until [`stop`](Self::stop) is called.
    #[instrument(skip(self))]
    pub async fn start(&self) {
        info!(
            tick_interval_ms = self.config.tick_interval_ms,
            misfire_threshold_seconds = self.config.misfire_threshold_seconds,
            "starting in-memory scheduling engine"
        );

        let mut tick = tokio::time::interval(Duration::from_millis(self.config.tick_interval_ms));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let fired = self.run_due(Utc::now()).await;
                    if fired > 0 {
                        debug!(fired, "fired due triggers");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received, stopping engine");
                    break;
                }
            }
        }

        info!("in-memory scheduling engine stopped");
    }

    /// Signal the run loop to stop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Fire every trigger due at `now` and advance its schedule.
    ///
    /// Returns the number of fires. Public so tests can drive time
    /// explicitly instead of waiting on the run loop.
    pub async fn run_due(&self, now: DateTime<Utc>) -> usize {
        let due: Vec<Key> = {
            let triggers = self.triggers.read().await;
            let mut due: Vec<(&Key, &TriggerEntry)> = triggers
                .iter()
                .filter(|(_, entry)| entry.next_fire <= now)
                .collect();
            // Competing fires are ordered by priority, ties by lateness.
            due.sort_by(|(_, a), (_, b)| {
                b.spec
                    .priority
                    .cmp(&a.spec.priority)
                    .then(a.next_fire.cmp(&b.next_fire))
            });
            due.into_iter().map(|(key, _)| key.clone()).collect()
        };

        let mut fired = 0;
        for key in due {
            fired += self.process_due_trigger(&key, now).await;
        }
        fired
    }

    /// Fire one due trigger, applying misfire policy, and reschedule or
    /// retire it.
    async fn process_due_trigger(&self, key: &Key, now: DateTime<Utc>) -> usize {
        let threshold = ChronoDuration::seconds(self.config.misfire_threshold_seconds as i64);

        let jobs = self.jobs.read().await;
        let mut triggers = self.triggers.write().await;

        let Some(entry) = triggers.get_mut(key) else {
            return 0;
        };
        if entry.next_fire > now {
            return 0;
        }

        let misfired = now - entry.next_fire > threshold;
        if misfired {
            metrics::counter!("scheduler_trigger_misfires_total").increment(1);
            warn!(
                trigger = %key,
                scheduled_for = %entry.next_fire,
                "trigger misfired"
            );
        }

        // Times this pass should fire at, and the next future occurrence
        // (None retires the trigger).
        let mut fire_times: Vec<DateTime<Utc>> = Vec::new();
        let next: Option<DateTime<Utc>>;

        match &entry.kind {
            EntryKind::Cron {
                schedule,
                on_misfire,
            } => {
                // Unset policy falls back to the engine default: fire once
                // now, then resume the schedule.
                let policy = on_misfire.unwrap_or(MisfirePolicy::FireAndProceed);
                if misfired {
                    match policy {
                        MisfirePolicy::DoNothing => {
                            next = schedule.after(&now).next();
                        }
                        MisfirePolicy::FireAndProceed => {
                            fire_times.push(entry.next_fire);
                            next = schedule.after(&now).next();
                        }
                        MisfirePolicy::IgnoreMisfires => {
                            let mut t = entry.next_fire;
                            while t <= now {
                                fire_times.push(t);
                                match schedule.after(&t).next() {
                                    Some(after) => t = after,
                                    None => break,
                                }
                            }
                            next = schedule.after(&now).next();
                        }
                    }
                } else {
                    let mut t = entry.next_fire;
                    let mut upcoming = None;
                    while t <= now {
                        fire_times.push(t);
                        match schedule.after(&t).next() {
                            Some(after) => {
                                upcoming = Some(after);
                                t = after;
                            }
                            None => {
                                upcoming = None;
                                break;
                            }
                        }
                    }
                    next = upcoming;
                }
            }
            EntryKind::OneShot { on_misfire } => {
                if misfired && *on_misfire == OneShotMisfirePolicy::SkipIfMissed {
                    info!(
                        trigger = %key,
                        scheduled_for = %entry.next_fire,
                        "one-shot trigger missed its window, dropping"
                    );
                } else {
                    fire_times.push(entry.next_fire);
                }
                next = None;
            }
        }

        let fired = fire_times.len();
        if fired > 0 {
            let Some(job) = jobs.get(&entry.spec.job_key) else {
                // Job vanished between submission and fire; nothing to run.
                warn!(
                    trigger = %key,
                    job = %entry.spec.job_key,
                    "trigger fired but its job is no longer registered"
                );
                triggers.remove(key);
                return 0;
            };

            let mut data = job.data.clone();
            data.extend(entry.spec.data.clone());

            for scheduled_for in &fire_times {
                let ctx = JobContext {
                    job_key: job.key.clone(),
                    trigger_key: key.clone(),
                    scheduled_for: *scheduled_for,
                    fired_at: now,
                    data: data.clone(),
                    retry_attempt: 0,
                };
                let handler = Arc::clone(&job.handler);
                let job_key = job.key.clone();

                metrics::counter!("scheduler_triggers_fired_total").increment(1);
                tokio::spawn(async move {
                    if let Err(e) = handler.execute(ctx).await {
                        error!(job = %job_key, error = %e, "job execution failed");
                    }
                });
            }

            entry.previous_fire = Some(now);
        }

        match next {
            Some(next_fire) => entry.next_fire = next_fire,
            None => {
                debug!(trigger = %key, "trigger exhausted, removing from store");
                triggers.remove(key);
            }
        }

        fired
    }
}

#[async_trait]
impl SchedulerEngine for InMemoryEngine {
    #[instrument(skip(self, job), fields(job_key = %job.key))]
    async fn add_or_replace_job(&self, job: JobSpec) -> Result<(), EngineError> {
        let mut jobs = self.jobs.write().await;
        let replaced = jobs.insert(job.key.clone(), job).is_some();
        debug!(replaced, "job registered");
        Ok(())
    }

    async fn trigger_exists(&self, key: &Key) -> Result<bool, EngineError> {
        Ok(self.triggers.read().await.contains_key(key))
    }

    #[instrument(skip(self, spec), fields(job_key = %spec.job_key))]
    async fn submit_trigger(&self, spec: TriggerSpec) -> Result<Key, EngineError> {
        let key = spec
            .key
            .clone()
            .unwrap_or_else(|| Key::with_default_group(format!("trigger-{}", Uuid::new_v4())));

        let jobs = self.jobs.read().await;
        if !jobs.contains_key(&spec.job_key) {
            return Err(EngineError::UnknownJob(spec.job_key));
        }
        drop(jobs);

        let mut triggers = self.triggers.write().await;
        if triggers.contains_key(&key) {
            return Err(EngineError::DuplicateTrigger(key));
        }

        let now = Utc::now();
        let (kind, next_fire) = match &spec.schedule {
            TriggerSchedule::Cron {
                expression,
                on_misfire,
            } => {
                let schedule = parse_cron_expression(expression)
                    .map_err(|e| EngineError::InvalidTrigger(e.to_string()))?;
                let next = schedule
                    .after(&now)
                    .next()
                    .ok_or_else(|| EngineError::NeverFires(key.clone()))?;
                (
                    EntryKind::Cron {
                        schedule: Box::new(schedule),
                        on_misfire: *on_misfire,
                    },
                    next,
                )
            }
            TriggerSchedule::OneShot { start_at, on_misfire } => (
                EntryKind::OneShot {
                    on_misfire: *on_misfire,
                },
                *start_at,
            ),
        };

        info!(trigger = %key, next_fire = %next_fire, "trigger scheduled");
        triggers.insert(
            key.clone(),
            TriggerEntry {
                spec,
                kind,
                next_fire,
                previous_fire: None,
            },
        );

        Ok(key)
    }

    async fn job_keys(&self) -> Result<Vec<Key>, EngineError> {
        Ok(self.jobs.read().await.keys().cloned().collect())
    }

    async fn trigger_keys(&self) -> Result<Vec<Key>, EngineError> {
        Ok(self.triggers.read().await.keys().cloned().collect())
    }

    async fn get_trigger(&self, key: &Key) -> Result<Option<TriggerView>, EngineError> {
        Ok(self.triggers.read().await.get(key).map(|entry| TriggerView {
            key: key.clone(),
            description: entry.spec.description.clone(),
            job_key: entry.spec.job_key.clone(),
            cron_expression: entry
                .spec
                .schedule
                .cron_expression()
                .map(|s| s.to_string()),
            priority: entry.spec.priority,
            previous_fire_time: entry.previous_fire,
            next_fire_time: Some(entry.next_fire),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::JobError;
    use crate::trigger::TriggerBuilder;
    use std::sync::Mutex;

    struct RecordingJob {
        fires: Arc<Mutex<Vec<JobContext>>>,
    }

    #[async_trait]
    impl JobHandler for RecordingJob {
        async fn execute(&self, ctx: JobContext) -> Result<(), JobError> {
            self.fires.lock().unwrap().push(ctx);
            Ok(())
        }
    }

    fn recording_job(key: Key) -> (JobSpec, Arc<Mutex<Vec<JobContext>>>) {
        let fires = Arc::new(Mutex::new(Vec::new()));
        let spec = JobSpec::new(
            key,
            "test job",
            Arc::new(RecordingJob {
                fires: Arc::clone(&fires),
            }),
        );
        (spec, fires)
    }

    fn engine() -> InMemoryEngine {
        InMemoryEngine::new(EngineConfig::default())
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_submit_and_introspect_trigger() {
        let engine = engine();
        let (job, _) = recording_job(Key::new("demoJob", "hello"));
        engine.add_or_replace_job(job).await.unwrap();

        let spec = TriggerBuilder::new()
            .for_job(Key::new("demoJob", "hello"))
            .with_identity(Key::new("demoTrigger", "hourly"))
            .with_description("hourly hello")
            .with_cron_schedule("0 0 * * * ?", None)
            .build()
            .unwrap();
        let key = engine.submit_trigger(spec).await.unwrap();
        assert_eq!(key, Key::new("demoTrigger", "hourly"));

        assert!(engine.trigger_exists(&key).await.unwrap());
        let view = engine.get_trigger(&key).await.unwrap().unwrap();
        assert_eq!(view.cron_expression.as_deref(), Some("0 0 * * * ?"));
        assert_eq!(view.previous_fire_time, None);
        assert!(view.next_fire_time.is_some());
    }

    #[tokio::test]
    async fn test_anonymous_trigger_gets_generated_identity() {
        let engine = engine();
        let (job, _) = recording_job(Key::new("demoJob", "hello"));
        engine.add_or_replace_job(job).await.unwrap();

        let build = || {
            TriggerBuilder::new()
                .for_job(Key::new("demoJob", "hello"))
                .with_cron_schedule("0 0 * * * ?", None)
                .build()
                .unwrap()
        };
        let first = engine.submit_trigger(build()).await.unwrap();
        let second = engine.submit_trigger(build()).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(engine.trigger_keys().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_identity_rejected() {
        let engine = engine();
        let (job, _) = recording_job(Key::new("demoJob", "hello"));
        engine.add_or_replace_job(job).await.unwrap();

        let build = || {
            TriggerBuilder::new()
                .for_job(Key::new("demoJob", "hello"))
                .with_identity(Key::new("t", "dup"))
                .with_cron_schedule("0 0 * * * ?", None)
                .build()
                .unwrap()
        };
        engine.submit_trigger(build()).await.unwrap();
        let result = engine.submit_trigger(build()).await;
        assert!(matches!(result, Err(EngineError::DuplicateTrigger(_))));
    }

    #[tokio::test]
    async fn test_unknown_job_rejected() {
        let engine = engine();
        let spec = TriggerBuilder::new()
            .for_job(Key::new("demoJob", "missing"))
            .with_cron_schedule("0 0 * * * ?", None)
            .build()
            .unwrap();
        let result = engine.submit_trigger(spec).await;
        assert!(matches!(result, Err(EngineError::UnknownJob(_))));
    }

    #[tokio::test]
    async fn test_cron_that_never_fires_again_rejected() {
        let engine = engine();
        let (job, _) = recording_job(Key::new("demoJob", "hello"));
        engine.add_or_replace_job(job).await.unwrap();

        let spec = TriggerBuilder::new()
            .for_job(Key::new("demoJob", "hello"))
            .with_cron_schedule("0 0 0 1 1 ? 2015", None)
            .build()
            .unwrap();
        let result = engine.submit_trigger(spec).await;
        assert!(matches!(result, Err(EngineError::NeverFires(_))));
    }

    #[tokio::test]
    async fn test_add_or_replace_refreshes_job_definition() {
        let engine = engine();
        let key = Key::new("demoJob", "hello");
        let (first, _) = recording_job(key.clone());
        let first = first.with_data("greeting", "old");
        engine.add_or_replace_job(first).await.unwrap();

        let (second, _) = recording_job(key.clone());
        let second = second.with_data("greeting", "new");
        engine.add_or_replace_job(second).await.unwrap();

        let jobs = engine.job_keys().await.unwrap();
        assert_eq!(jobs, vec![key.clone()]);
        let stored = engine.jobs.read().await;
        assert_eq!(
            stored.get(&key).unwrap().data.get("greeting"),
            Some(&"new".to_string())
        );
    }

    #[tokio::test]
    async fn test_due_one_shot_fires_and_retires() {
        let engine = engine();
        let key = Key::new("demoJob", "hello");
        let (job, fires) = recording_job(key.clone());
        engine.add_or_replace_job(job).await.unwrap();

        let now = Utc::now();
        let spec = TriggerBuilder::new()
            .for_job(key.clone())
            .with_one_shot(now - ChronoDuration::seconds(1), OneShotMisfirePolicy::FireOnceNow)
            .build()
            .unwrap();
        let trigger_key = engine.submit_trigger(spec).await.unwrap();

        assert_eq!(engine.run_due(now).await, 1);
        settle().await;

        let recorded = fires.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].job_key, key);
        assert!(!engine.trigger_exists(&trigger_key).await.unwrap());
    }

    #[tokio::test]
    async fn test_one_shot_skip_if_missed_drops_without_firing() {
        let engine = engine();
        let key = Key::new("demoJob", "hello");
        let (job, fires) = recording_job(key.clone());
        engine.add_or_replace_job(job).await.unwrap();

        let now = Utc::now();
        let spec = TriggerBuilder::new()
            .for_job(key)
            .with_one_shot(
                now - ChronoDuration::seconds(600),
                OneShotMisfirePolicy::SkipIfMissed,
            )
            .build()
            .unwrap();
        let trigger_key = engine.submit_trigger(spec).await.unwrap();

        assert_eq!(engine.run_due(now).await, 0);
        settle().await;

        assert!(fires.lock().unwrap().is_empty());
        assert!(!engine.trigger_exists(&trigger_key).await.unwrap());
    }

    #[tokio::test]
    async fn test_one_shot_fire_once_now_fires_however_late() {
        let engine = engine();
        let key = Key::new("demoJob", "hello");
        let (job, fires) = recording_job(key.clone());
        engine.add_or_replace_job(job).await.unwrap();

        let now = Utc::now();
        let spec = TriggerBuilder::new()
            .for_job(key)
            .with_one_shot(
                now - ChronoDuration::hours(6),
                OneShotMisfirePolicy::FireOnceNow,
            )
            .build()
            .unwrap();
        engine.submit_trigger(spec).await.unwrap();

        assert_eq!(engine.run_due(now).await, 1);
        settle().await;
        assert_eq!(fires.lock().unwrap().len(), 1);
    }

    async fn submit_hourly(
        engine: &InMemoryEngine,
        on_misfire: Option<MisfirePolicy>,
    ) -> (Key, DateTime<Utc>) {
        let spec = TriggerBuilder::new()
            .for_job(Key::new("demoJob", "hello"))
            .with_cron_schedule("0 0 * * * ?", on_misfire)
            .build()
            .unwrap();
        let key = engine.submit_trigger(spec).await.unwrap();
        let next = engine
            .get_trigger(&key)
            .await
            .unwrap()
            .unwrap()
            .next_fire_time
            .unwrap();
        (key, next)
    }

    #[tokio::test]
    async fn test_cron_misfire_do_nothing_waits_for_next_occurrence() {
        let engine = engine();
        let (job, fires) = recording_job(Key::new("demoJob", "hello"));
        engine.add_or_replace_job(job).await.unwrap();

        let (key, next) = submit_hourly(&engine, Some(MisfirePolicy::DoNothing)).await;
        // Well past the misfire threshold.
        let late_now = next + ChronoDuration::minutes(30);

        assert_eq!(engine.run_due(late_now).await, 0);
        settle().await;
        assert!(fires.lock().unwrap().is_empty());

        // Rescheduled strictly into the future.
        let view = engine.get_trigger(&key).await.unwrap().unwrap();
        assert!(view.next_fire_time.unwrap() > late_now);
        assert_eq!(view.previous_fire_time, None);
    }

    #[tokio::test]
    async fn test_cron_misfire_fire_and_proceed_fires_once() {
        let engine = engine();
        let (job, fires) = recording_job(Key::new("demoJob", "hello"));
        engine.add_or_replace_job(job).await.unwrap();

        let (key, next) = submit_hourly(&engine, Some(MisfirePolicy::FireAndProceed)).await;
        let late_now = next + ChronoDuration::minutes(30);

        assert_eq!(engine.run_due(late_now).await, 1);
        settle().await;

        let recorded = fires.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].scheduled_for, next);

        let view = engine.get_trigger(&key).await.unwrap().unwrap();
        assert!(view.next_fire_time.unwrap() > late_now);
    }

    #[tokio::test]
    async fn test_cron_misfire_default_behaves_like_fire_and_proceed() {
        let engine = engine();
        let (job, fires) = recording_job(Key::new("demoJob", "hello"));
        engine.add_or_replace_job(job).await.unwrap();

        let (_, next) = submit_hourly(&engine, None).await;
        let late_now = next + ChronoDuration::minutes(30);

        assert_eq!(engine.run_due(late_now).await, 1);
        settle().await;
        assert_eq!(fires.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cron_misfire_ignore_misfires_fires_every_missed_occurrence() {
        let engine = engine();
        let (job, fires) = recording_job(Key::new("demoJob", "hello"));
        engine.add_or_replace_job(job).await.unwrap();

        // Every minute, then pretend ten minutes elapsed.
        let spec = TriggerBuilder::new()
            .for_job(Key::new("demoJob", "hello"))
            .with_cron_schedule("0 * * * * ?", Some(MisfirePolicy::IgnoreMisfires))
            .build()
            .unwrap();
        let key = engine.submit_trigger(spec).await.unwrap();
        let next = engine
            .get_trigger(&key)
            .await
            .unwrap()
            .unwrap()
            .next_fire_time
            .unwrap();

        let late_now = next + ChronoDuration::minutes(10);
        let fired = engine.run_due(late_now).await;
        assert!(fired >= 10, "expected every missed occurrence, got {fired}");
        settle().await;
        assert_eq!(fires.lock().unwrap().len(), fired);
    }

    #[tokio::test]
    async fn test_trigger_data_overrides_job_data() {
        let engine = engine();
        let key = Key::new("demoJob", "hello");
        let (job, fires) = recording_job(key.clone());
        let job = job.with_data("greeting", "default").with_data("keep", "me");
        engine.add_or_replace_job(job).await.unwrap();

        let now = Utc::now();
        let spec = TriggerBuilder::new()
            .for_job(key)
            .with_one_shot(now, OneShotMisfirePolicy::FireOnceNow)
            .using_job_data(HashMap::from([(
                "greeting".to_string(),
                "override".to_string(),
            )]))
            .build()
            .unwrap();
        engine.submit_trigger(spec).await.unwrap();

        engine.run_due(now).await;
        settle().await;

        let recorded = fires.lock().unwrap();
        assert_eq!(recorded[0].data.get("greeting"), Some(&"override".to_string()));
        assert_eq!(recorded[0].data.get("keep"), Some(&"me".to_string()));
    }

    #[tokio::test]
    async fn test_fired_trigger_records_previous_fire_time() {
        let engine = engine();
        let (job, _) = recording_job(Key::new("demoJob", "hello"));
        engine.add_or_replace_job(job).await.unwrap();

        let (key, next) = submit_hourly(&engine, None).await;
        let now = next + ChronoDuration::seconds(1);
        assert_eq!(engine.run_due(now).await, 1);

        let view = engine.get_trigger(&key).await.unwrap().unwrap();
        assert_eq!(view.previous_fire_time, Some(now));
    }
}
