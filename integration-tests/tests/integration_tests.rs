// End-to-end tests: schedule file on disk, through compilation and
// reconciliation, to management operations and firing.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use common::engine::{
    EngineConfig, InMemoryEngine, JobContext, JobHandler, SchedulerEngine,
};
use common::errors::JobError;
use common::key::Key;
use common::management::SchedulerAdmin;
use common::models::JobSpec;
use common::reconcile::reconcile;
use common::schedule::load_schedule;
use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

struct CountingJob {
    fires: AtomicU32,
}

#[async_trait]
impl JobHandler for CountingJob {
    async fn execute(&self, _ctx: JobContext) -> Result<(), JobError> {
        self.fires.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn counting_job(key: Key) -> (JobSpec, Arc<CountingJob>) {
    let handler = Arc::new(CountingJob {
        fires: AtomicU32::new(0),
    });
    let spec = JobSpec::new(key, "counting job", Arc::clone(&handler) as Arc<dyn JobHandler>);
    (spec, handler)
}

fn schedule_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const SYSTEM_SCHEDULE: &str = r#"
// system schedule used by the integration tests
[
    {
        "trigger": "demoTrigger.hourlyHello",
        "cron": "0 0 * * * ?",
        "job": "demoJob.hello",
        "comment": "say hello every hour",
        "onMisfire": "IGNORE_MISFIRES"
    },
    {
        "cron": "0 30 * * * ?", /* anonymous trigger */
        "job": "printMemory",
        "priority": 3
    }
]
"#;

#[tokio::test]
async fn test_compile_reconcile_and_list() {
    let file = schedule_file(SYSTEM_SCHEDULE);
    let triggers = load_schedule(file.path()).unwrap().compile().unwrap();
    assert_eq!(triggers.len(), 2);

    let engine = Arc::new(InMemoryEngine::new(EngineConfig::default()));
    let (hello, _) = counting_job(Key::new("demoJob", "hello"));
    let (memory, _) = counting_job(Key::with_default_group("printMemory"));

    let report = reconcile(vec![hello, memory], triggers, engine.as_ref())
        .await
        .unwrap();
    assert_eq!(report.jobs_registered, 2);
    assert_eq!(report.triggers_added, 2);

    let admin = SchedulerAdmin::new(Arc::clone(&engine) as Arc<dyn SchedulerEngine>);

    let mut jobs = admin.list_jobs().await.unwrap();
    jobs.sort();
    assert_eq!(jobs, vec!["DEFAULT.printMemory", "demoJob.hello"]);

    let rows = admin.list_schedule().await.unwrap();
    assert_eq!(rows.len(), 2);
    let hourly = rows
        .iter()
        .find(|r| r.trigger == "demoTrigger.hourlyHello")
        .unwrap();
    assert_eq!(hourly.description, "say hello every hour");
    assert_eq!(hourly.job, "demoJob.hello");
    assert_eq!(hourly.cron.as_deref(), Some("0 0 * * * ?"));
    assert_eq!(hourly.last_fire, None);
}

#[tokio::test]
async fn test_restart_preserves_modified_trigger() {
    let file = schedule_file(SYSTEM_SCHEDULE);
    let compiler = load_schedule(file.path()).unwrap();

    let engine = Arc::new(InMemoryEngine::new(EngineConfig::default()));
    let (hello, _) = counting_job(Key::new("demoJob", "hello"));
    let (memory, _) = counting_job(Key::with_default_group("printMemory"));

    reconcile(
        vec![hello.clone(), memory.clone()],
        compiler.compile().unwrap(),
        engine.as_ref(),
    )
    .await
    .unwrap();

    // An operator edits the schedule file; the named trigger's declaration
    // changes, but its identity already lives in the store.
    let edited = schedule_file(
        r#"[
            {
                "trigger": "demoTrigger.hourlyHello",
                "cron": "0 0 12 * * ?",
                "job": "demoJob.hello",
                "comment": "now daily at noon"
            }
        ]"#,
    );
    let report = reconcile(
        vec![hello, memory],
        load_schedule(edited.path()).unwrap().compile().unwrap(),
        engine.as_ref(),
    )
    .await
    .unwrap();
    assert_eq!(report.triggers_preserved, 1);
    assert_eq!(report.triggers_added, 0);

    // The live trigger still carries the original declaration.
    let view = engine
        .get_trigger(&Key::new("demoTrigger", "hourlyHello"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view.cron_expression.as_deref(), Some("0 0 * * * ?"));
    assert_eq!(view.description, "say hello every hour");
}

#[tokio::test]
async fn test_run_after_delay_round_trip() {
    let engine = Arc::new(InMemoryEngine::new(EngineConfig::default()));
    let (job, _) = counting_job(Key::new("demoJob", "hello"));
    engine.add_or_replace_job(job).await.unwrap();

    let admin = SchedulerAdmin::new(Arc::clone(&engine) as Arc<dyn SchedulerEngine>);
    let trigger_key = admin
        .run_after_delay("demoJob.hello", 5, false)
        .await
        .unwrap();

    let rows = admin.list_schedule().await.unwrap();
    let row = rows
        .iter()
        .find(|r| r.trigger == trigger_key.to_string())
        .unwrap();
    assert_eq!(row.job, "demoJob.hello");
    assert_eq!(row.cron, None);
}

#[tokio::test]
async fn test_ad_hoc_fire_executes_the_job() {
    let engine = Arc::new(InMemoryEngine::new(EngineConfig::default()));
    let (job, handler) = counting_job(Key::new("demoJob", "hello"));
    engine.add_or_replace_job(job).await.unwrap();

    let admin = SchedulerAdmin::new(Arc::clone(&engine) as Arc<dyn SchedulerEngine>);
    admin.run_immediately("demoJob.hello").await.unwrap();

    let fired = engine.run_due(Utc::now() + ChronoDuration::seconds(1)).await;
    assert_eq!(fired, 1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handler.fires.load(Ordering::SeqCst), 1);

    // The one-shot is retired once fired.
    assert!(admin.list_schedule().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_schedule_installs_nothing() {
    let file = schedule_file(
        r#"[
            {"cron": "0 0 * * * ?", "job": "demoJob.hello"},
            {"cron": "not a cron expression", "job": "demoJob.hello"}
        ]"#,
    );
    let result = load_schedule(file.path()).unwrap().compile();
    assert!(result.is_err());

    // Nothing was handed to the engine.
    let engine = InMemoryEngine::new(EngineConfig::default());
    assert!(engine.trigger_keys().await.unwrap().is_empty());
}
