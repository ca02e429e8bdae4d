// Startup reconciliation of declared schedule state against the live engine

use crate::engine::SchedulerEngine;
use crate::errors::EngineError;
use crate::models::{JobSpec, TriggerSpec};
use tracing::{debug, info, instrument};

/// Outcome counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    pub jobs_registered: usize,
    pub triggers_added: usize,
    pub triggers_preserved: usize,
}

/// Register the known jobs and the compiled schedule with the engine.
///
/// Jobs are always registered with replace-if-exists semantics: job
/// definitions are refreshed from the current deployment on every startup.
///
/// Triggers follow "first writer wins per identity, per store lifetime": a
/// compiled trigger is submitted only when no trigger with the same
/// identity already exists in the engine's store, so a trigger created by
/// a prior run or a management operation is never overwritten by a
/// declaration change. Operators must clear persisted trigger state to
/// pick up a schedule edit. Anonymous triggers carry no identity and are
/// always submitted. With an ephemeral store every startup begins empty,
/// so every declared trigger is re-added.
#[instrument(skip_all, fields(jobs = jobs.len(), triggers = triggers.len()))]
pub async fn reconcile(
    jobs: Vec<JobSpec>,
    triggers: Vec<TriggerSpec>,
    engine: &dyn SchedulerEngine,
) -> Result<ReconcileReport, EngineError> {
    let mut report = ReconcileReport::default();

    for job in jobs {
        let key = job.key.clone();
        engine.add_or_replace_job(job).await?;
        debug!(job = %key, "job definition registered");
        report.jobs_registered += 1;
    }

    for trigger in triggers {
        if let Some(key) = &trigger.key {
            if engine.trigger_exists(key).await? {
                debug!(trigger = %key, "trigger identity already present, preserving");
                report.triggers_preserved += 1;
                continue;
            }
        }
        let key = engine.submit_trigger(trigger).await?;
        debug!(trigger = %key, "declared trigger scheduled");
        report.triggers_added += 1;
    }

    info!(
        jobs_registered = report.jobs_registered,
        triggers_added = report.triggers_added,
        triggers_preserved = report.triggers_preserved,
        "schedule reconciled"
    );

    Ok(report)
}
