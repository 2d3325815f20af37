use thiserror::Error;

use crate::types::JobStatus;

/// Errors returned by the job orchestration API.
///
/// Worker-level failures (spawn errors, nonzero exits) are deliberately not
/// represented here: once a submission is accepted it never fails through the
/// API. Those failures are recorded on the job itself and surfaced through
/// subsequent status queries.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job already exists: {0}")]
    Duplicate(String),

    #[error("Job {id} is not completed (status: {status})")]
    NotCompleted { id: String, status: JobStatus },

    #[error("Job already finished: {0}")]
    AlreadyFinished(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for JobError {
    fn from(err: anyhow::Error) -> Self {
        JobError::Other(err.to_string())
    }
}
