use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::JobError;
use crate::types::JobRecord;

/// In-memory job store shared between the supervisor and queries.
///
/// All access goes through a single mutex; readers receive cloned snapshots,
/// so a query can never observe a half-applied update even while stdout,
/// stderr, and exit events for the same job interleave with it.
///
/// Records are retained until explicitly evicted with [`remove()`](Self::remove)
/// or [`prune_finished()`](Self::prune_finished).
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, JobRecord>>,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Generate a collision-resistant job id.
    pub fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Insert a new record. Fails if the id is already present.
    pub fn create(&self, record: JobRecord) -> Result<(), JobError> {
        let mut jobs = self.jobs.lock().map_err(|e| JobError::Other(e.to_string()))?;
        if jobs.contains_key(&record.id) {
            return Err(JobError::Duplicate(record.id));
        }
        jobs.insert(record.id.clone(), record);
        Ok(())
    }

    /// Get a cloned snapshot of a record. Never blocks on worker progress.
    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.jobs.lock().ok()?.get(id).cloned()
    }

    /// Atomically apply a mutation to a record, returning the updated
    /// snapshot.
    ///
    /// Returns `None` if the id is unknown or the record is already terminal —
    /// late-arriving worker events must never resurrect a finished job.
    /// Progress can only move forward: a mutation that would lower it is
    /// floored at the previous value.
    pub fn update(&self, id: &str, f: impl FnOnce(&mut JobRecord)) -> Option<JobRecord> {
        let mut jobs = self.jobs.lock().ok()?;
        let job = jobs.get_mut(id)?;
        if job.status.is_terminal() {
            return None;
        }
        let floor = job.progress;
        f(job);
        if job.progress < floor {
            job.progress = floor;
        }
        Some(job.clone())
    }

    /// Evict a record. Fails with `NotFound` if the id is unknown.
    pub fn remove(&self, id: &str) -> Result<(), JobError> {
        let mut jobs = self.jobs.lock().map_err(|e| JobError::Other(e.to_string()))?;
        jobs.remove(id)
            .map(|_| ())
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// Evict terminal records that finished more than `ttl` ago.
    /// Returns the ids of the evicted records.
    pub fn prune_finished(&self, ttl: Duration) -> Vec<String> {
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return Vec::new();
        };
        let cutoff = chrono::Utc::now() - ttl;

        let Ok(mut jobs) = self.jobs.lock() else {
            return Vec::new();
        };
        let expired: Vec<String> = jobs
            .values()
            .filter(|job| {
                job.status.is_terminal()
                    && job
                        .completed_at
                        .as_deref()
                        .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
                        .map(|t| t < cutoff)
                        .unwrap_or(false)
            })
            .map(|job| job.id.clone())
            .collect();
        for id in &expired {
            jobs.remove(id);
        }
        expired
    }

    /// Number of jobs whose status is still `Processing`.
    pub fn processing_count(&self) -> usize {
        self.jobs
            .lock()
            .map(|jobs| jobs.values().filter(|j| !j.status.is_terminal()).count())
            .unwrap_or(0)
    }

    /// Total number of tracked jobs.
    pub fn len(&self) -> usize {
        self.jobs.lock().map(|jobs| jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
