// Error handling framework

use crate::key::{InvalidKeyError, Key};
use thiserror::Error;

/// Trigger assembly errors
#[derive(Error, Debug)]
pub enum TriggerBuildError {
    #[error("trigger has no target job")]
    MissingJob,

    #[error("trigger has no schedule")]
    MissingSchedule,

    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },
}

/// Schedule compilation errors
///
/// `Load` is the only variant raised before the source has been read; every
/// other variant means the source was found but is not a well-formed
/// sequence of declarations. Any failure aborts the whole compilation, so a
/// malformed schedule file never produces a partial schedule.
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("schedule file '{path}' could not be read: {source}")]
    Load {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("schedule file '{path}' is malformed: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("schedule entry {index}: missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("schedule entry {index}: {source}")]
    InvalidKey {
        index: usize,
        #[source]
        source: InvalidKeyError,
    },

    #[error("schedule entry {index}: {source}")]
    InvalidTrigger {
        index: usize,
        #[source]
        source: TriggerBuildError,
    },
}

/// Rejections from the live scheduling engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("job not found: {0}")]
    UnknownJob(Key),

    #[error("a trigger with identity '{0}' already exists")]
    DuplicateTrigger(Key),

    #[error("trigger '{0}' will never fire")]
    NeverFires(Key),

    #[error("invalid trigger: {0}")]
    InvalidTrigger(String),

    #[error("engine store failure: {0}")]
    Store(String),
}

/// Management operation errors
#[derive(Error, Debug)]
pub enum ManagementError {
    /// The key string was empty or malformed; no engine call was attempted.
    #[error(transparent)]
    InvalidKey(#[from] InvalidKeyError),

    /// The engine rejected a submitted trigger or job.
    #[error("scheduler rejected the submission: {0}")]
    Submission(#[source] EngineError),

    /// The engine could not answer a listing request.
    #[error("scheduler query failed: {0}")]
    Query(#[source] EngineError),

    #[error("failed to assemble trigger: {0}")]
    Build(#[from] TriggerBuildError),
}

/// Failure reported by a job body at fire time
#[derive(Error, Debug)]
#[error("{message}")]
pub struct JobError {
    pub message: String,
}

impl JobError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
