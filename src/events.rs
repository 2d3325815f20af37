use serde::{Deserialize, Serialize};

use crate::types::EnhancementMetrics;

/// Notifications pushed over the manager's broadcast channel.
///
/// Carries the same observable fields as the polling queries. The channel is
/// lossy by design: a lagging subscriber may miss intermediate progress, so
/// queries stay the source of truth for job state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum JobEvent {
    /// The worker process was spawned.
    Started { job_id: String },
    /// The worker reported a progress update.
    Progress { job_id: String, progress: u8 },
    /// The worker exited successfully.
    Completed {
        job_id: String,
        output_ref: String,
        metrics: Option<EnhancementMetrics>,
    },
    /// The worker could not be started or exited with a nonzero code.
    Failed { job_id: String, error: String },
    /// The job was cancelled and the worker killed.
    Cancelled { job_id: String },
}

impl JobEvent {
    /// The id of the job this event concerns.
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Started { job_id }
            | JobEvent::Progress { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Cancelled { job_id } => job_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let progress = JobEvent::Progress {
            job_id: "j1".into(),
            progress: 55,
        };
        let json = serde_json::to_string(&progress).unwrap();
        assert!(json.contains("\"jobId\":\"j1\""));
        assert!(json.contains("\"progress\":55"));

        let completed = JobEvent::Completed {
            job_id: "j1".into(),
            output_ref: "processed/processed_a.png".into(),
            metrics: Some(EnhancementMetrics {
                psnr: 30.2,
                mse: 12.5,
            }),
        };
        let json = serde_json::to_string(&completed).unwrap();
        assert!(json.contains("\"outputRef\""));
        assert!(json.contains("30.2"));

        let failed = JobEvent::Failed {
            job_id: "j1".into(),
            error: "something broke".into(),
        };
        let json = serde_json::to_string(&failed).unwrap();
        assert!(json.contains("something broke"));
    }

    #[test]
    fn test_job_id_accessor() {
        let event = JobEvent::Cancelled { job_id: "j9".into() };
        assert_eq!(event.job_id(), "j9");
    }
}
