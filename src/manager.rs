use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, Notify};

use crate::config::WorkerConfig;
use crate::error::JobError;
use crate::events::JobEvent;
use crate::registry::JobRegistry;
use crate::supervisor::WorkerSupervisor;
use crate::types::{JobRecord, JobResult, JobStatus, StatusSnapshot};

/// High-level job manager providing the public API.
///
/// Create a `JobManager`, submit enhancement jobs to it, and poll
/// [`status()`](Self::status) / [`result()`](Self::result) from the transport
/// layer. Each submission spawns its own supervised worker process; queries
/// never block on worker progress.
///
/// # Example
///
/// ```no_run
/// use enhance_queue::{JobManager, WorkerConfig};
///
/// # async fn example() -> Result<(), enhance_queue::JobError> {
/// let config = WorkerConfig::builder()
///     .with_program("enhance_worker".into())
///     .build();
/// let manager = JobManager::new(config);
///
/// let job_id = manager.submit("uploads/photo.png", 3)?;
/// let snapshot = manager.status(&job_id)?;
/// println!("{}: {}%", snapshot.status, snapshot.progress);
/// # Ok(())
/// # }
/// ```
pub struct JobManager {
    registry: Arc<JobRegistry>,
    supervisor: Arc<WorkerSupervisor>,
    config: Arc<WorkerConfig>,
    events: broadcast::Sender<JobEvent>,
    cancels: Mutex<HashMap<String, Arc<Notify>>>,
}

impl JobManager {
    /// Create a new manager with the given worker configuration.
    pub fn new(config: WorkerConfig) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(JobRegistry::new());
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let supervisor = Arc::new(WorkerSupervisor::new(
            Arc::clone(&registry),
            Arc::clone(&config),
            events.clone(),
        ));

        Self {
            registry,
            supervisor,
            config,
            events,
            cancels: Mutex::new(HashMap::new()),
        }
    }

    /// Admit a new enhancement job. Returns the job id.
    ///
    /// The record is created before the worker is spawned, so the id is
    /// immediately queryable as `Processing`. Once accepted, a submission
    /// never fails retroactively — worker failures are recorded on the job
    /// and surfaced through [`status()`](Self::status).
    ///
    /// Must be called within a tokio runtime.
    pub fn submit(
        &self,
        input_ref: impl Into<String>,
        enhancement_level: u32,
    ) -> Result<String, JobError> {
        let input_ref = input_ref.into();
        let id = self.registry.next_id();
        let output_ref = derive_output_ref(&self.config.output_dir, &input_ref);

        self.registry
            .create(JobRecord::new(id.clone(), input_ref, output_ref, enhancement_level))?;

        let cancel = Arc::new(Notify::new());
        if let Ok(mut cancels) = self.cancels.lock() {
            cancels.insert(id.clone(), Arc::clone(&cancel));
        }

        self.supervisor.spawn(id.clone(), cancel);
        Ok(id)
    }

    /// Snapshot a job's `{status, progress, error}`. Non-blocking; callers
    /// poll this at their own interval and stop on any terminal status.
    pub fn status(&self, id: &str) -> Result<StatusSnapshot, JobError> {
        self.registry
            .get(id)
            .map(|job| StatusSnapshot::from(&job))
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// Fetch the output reference and metrics of a completed job.
    ///
    /// Fails with `NotFound` for unknown ids and `NotCompleted` while the
    /// job is still processing, failed, or cancelled — partial results are
    /// never returned.
    pub fn result(&self, id: &str) -> Result<JobResult, JobError> {
        let job = self
            .registry
            .get(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;

        if job.status != JobStatus::Completed {
            return Err(JobError::NotCompleted {
                id: id.to_string(),
                status: job.status,
            });
        }

        Ok(JobResult {
            output_ref: job.output_ref,
            metrics: job.metrics,
        })
    }

    /// Cancel a processing job: the worker is killed and the job transitions
    /// to the terminal `Cancelled` state.
    pub fn cancel(&self, id: &str) -> Result<(), JobError> {
        let job = self
            .registry
            .get(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        if job.status.is_terminal() {
            return Err(JobError::AlreadyFinished(id.to_string()));
        }

        let handle = self
            .cancels
            .lock()
            .ok()
            .and_then(|cancels| cancels.get(id).cloned());
        if let Some(handle) = handle {
            // notify_one stores a permit, so a cancel that races the spawn
            // is still observed.
            handle.notify_one();
        }
        Ok(())
    }

    /// Evict a finished job record. A job that is still processing must be
    /// cancelled first.
    pub fn remove(&self, id: &str) -> Result<(), JobError> {
        let job = self
            .registry
            .get(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        if !job.status.is_terminal() {
            return Err(JobError::NotCompleted {
                id: id.to_string(),
                status: job.status,
            });
        }

        self.registry.remove(id)?;
        if let Ok(mut cancels) = self.cancels.lock() {
            cancels.remove(id);
        }
        Ok(())
    }

    /// Evict terminal records that finished more than `ttl` ago, bounding
    /// the registry's memory. Returns the number of evicted records.
    pub fn prune_finished(&self, ttl: Duration) -> usize {
        let removed = self.registry.prune_finished(ttl);
        if let Ok(mut cancels) = self.cancels.lock() {
            for id in &removed {
                cancels.remove(id);
            }
        }
        removed.len()
    }

    /// Subscribe to push notifications for all jobs.
    ///
    /// Optional: the same state is always observable by polling. The channel
    /// drops the oldest events for lagging subscribers.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Number of jobs that have not reached a terminal status yet.
    pub fn running_count(&self) -> usize {
        self.registry.processing_count()
    }

    /// Total number of tracked jobs, finished ones included.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}

/// Derive the output artifact location from the input reference:
/// `<output_dir>/processed_<input file name>`.
fn derive_output_ref(output_dir: &Path, input_ref: &str) -> String {
    let name = Path::new(input_ref)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input_ref.to_string());
    output_dir
        .join(format!("processed_{name}"))
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_output_ref() {
        assert_eq!(
            derive_output_ref(Path::new("processed"), "uploads/1712.png"),
            "processed/processed_1712.png"
        );
        assert_eq!(
            derive_output_ref(Path::new("/srv/out"), "photo.jpg"),
            "/srv/out/processed_photo.jpg"
        );
    }

    #[test]
    fn test_queries_on_unknown_id() {
        let manager = JobManager::new(WorkerConfig::default());

        assert!(matches!(manager.status("nope"), Err(JobError::NotFound(_))));
        assert!(matches!(manager.result("nope"), Err(JobError::NotFound(_))));
        assert!(matches!(manager.cancel("nope"), Err(JobError::NotFound(_))));
        assert!(matches!(manager.remove("nope"), Err(JobError::NotFound(_))));
    }

    #[test]
    fn test_new_manager_is_empty() {
        let manager = JobManager::new(WorkerConfig::default());
        assert!(manager.is_empty());
        assert_eq!(manager.running_count(), 0);
    }
}
