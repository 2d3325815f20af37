use serde::{Deserialize, Serialize};

/// Job status lifecycle: Processing -> Completed/Failed/Cancelled.
///
/// There is no pending state: a job is `Processing` from the moment it is
/// admitted, even while it waits for a worker slot. `Completed`, `Failed`,
/// and `Cancelled` are terminal — no field of a job mutates after one of
/// them is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reconstruction-quality scores reported by the worker's `METRICS:` line.
///
/// Best-effort: a worker may complete successfully without ever emitting
/// them, in which case the job carries no metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnhancementMetrics {
    pub psnr: f64,
    pub mse: f64,
}

/// A tracked unit of enhancement work.
///
/// Created synchronously at submission time, mutated asynchronously by the
/// supervisor as worker output arrives, and frozen once a terminal status is
/// recorded. `input_ref`/`output_ref` are artifact locations resolvable by an
/// external static-file server — the core records and returns them, never
/// reads or writes the bytes behind them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Opaque unique identifier, immutable after creation.
    pub id: String,
    pub status: JobStatus,
    /// Percentage in [0, 100], monotonically non-decreasing while processing.
    pub progress: u8,
    /// Location of the source artifact.
    pub input_ref: String,
    /// Location of the (eventual) result artifact.
    pub output_ref: String,
    /// Requested enhancement level. Recorded for observability; the worker's
    /// tuning comes from [`WorkerConfig`](crate::WorkerConfig) instead.
    pub enhancement_level: u32,
    /// Diagnostic text, set only on `Failed`.
    pub error: Option<String>,
    /// Quality scores, set only when the worker reported them before a
    /// successful exit.
    pub metrics: Option<EnhancementMetrics>,
    /// ISO 8601 timestamp when the job was admitted.
    pub created_at: String,
    /// ISO 8601 timestamp when the job reached a terminal status.
    pub completed_at: Option<String>,
}

impl JobRecord {
    /// Create a fresh record in the `Processing` state.
    pub fn new(
        id: String,
        input_ref: String,
        output_ref: String,
        enhancement_level: u32,
    ) -> Self {
        Self {
            id,
            status: JobStatus::Processing,
            progress: 0,
            input_ref,
            output_ref,
            enhancement_level,
            error: None,
            metrics: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            completed_at: None,
        }
    }
}

/// Point-in-time view returned by status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub status: JobStatus,
    pub progress: u8,
    pub error: Option<String>,
}

impl From<&JobRecord> for StatusSnapshot {
    fn from(job: &JobRecord) -> Self {
        Self {
            status: job.status,
            progress: job.progress,
            error: job.error.clone(),
        }
    }
}

/// Final output of a completed job, returned by result queries.
///
/// Only ever produced for `Completed` jobs — there are no partial results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub output_ref: String,
    pub metrics: Option<EnhancementMetrics>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        let statuses = [
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ];
        for status in &statuses {
            assert_eq!(JobStatus::parse(status.as_str()), Some(*status));
        }
        assert_eq!(JobStatus::parse("unknown"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_new_record_starts_processing() {
        let job = JobRecord::new(
            "j1".into(),
            "uploads/a.png".into(),
            "processed/processed_a.png".into(),
            3,
        );
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.progress, 0);
        assert!(job.error.is_none());
        assert!(job.metrics.is_none());
        assert!(job.completed_at.is_none());
        assert!(!job.created_at.is_empty());
    }

    #[test]
    fn test_snapshot_serialization_is_camel_case() {
        let job = JobRecord::new("j1".into(), "in.png".into(), "out.png".into(), 1);
        let json = serde_json::to_string(&StatusSnapshot::from(&job)).unwrap();
        assert!(json.contains("\"status\":\"processing\""));
        assert!(json.contains("\"progress\":0"));
    }
}
