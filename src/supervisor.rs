//! Worker process supervision.
//!
//! One supervisor task per job: it spawns the external worker, streams
//! stdout through [`ProtocolParser`], accumulates stderr verbatim, and
//! drives the job record to a terminal state on exit or cancellation.
//!
//! There is no retry and no timeout — a worker that never exits leaves its
//! job `Processing` until someone cancels it.

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::process::{ChildStderr, ChildStdout, Command};
use tokio::sync::{broadcast, Notify, Semaphore};

use crate::config::WorkerConfig;
use crate::events::JobEvent;
use crate::protocol::{ProtocolParser, WorkerMessage};
use crate::registry::JobRegistry;
use crate::types::JobStatus;

/// Spawns and supervises one external worker per job.
///
/// Admission is gated by a semaphore sized from
/// [`WorkerConfig::max_concurrent`]; a job waiting for a slot is already
/// visible as `Processing` at 0%.
pub struct WorkerSupervisor {
    registry: Arc<JobRegistry>,
    config: Arc<WorkerConfig>,
    slots: Semaphore,
    events: broadcast::Sender<JobEvent>,
}

impl WorkerSupervisor {
    pub fn new(
        registry: Arc<JobRegistry>,
        config: Arc<WorkerConfig>,
        events: broadcast::Sender<JobEvent>,
    ) -> Self {
        let permits = if config.max_concurrent == 0 {
            Semaphore::MAX_PERMITS
        } else {
            config.max_concurrent
        };
        Self {
            registry,
            config,
            slots: Semaphore::new(permits),
            events,
        }
    }

    /// Spawn the supervision task for a job as a background tokio task.
    ///
    /// `cancel` is notified by [`JobManager::cancel`](crate::JobManager::cancel)
    /// to kill the worker and finalize the job as `Cancelled`.
    pub fn spawn(self: &Arc<Self>, job_id: String, cancel: Arc<Notify>) {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            supervisor.run_job(job_id, cancel).await;
        });
    }

    async fn run_job(&self, job_id: String, cancel: Arc<Notify>) {
        // Wait for an admission slot. Cancellation must work here too, or a
        // queued job could never be released.
        let _permit = tokio::select! {
            permit = self.slots.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
            _ = cancel.notified() => {
                self.finalize_cancelled(&job_id);
                return;
            }
        };

        let Some(job) = self.registry.get(&job_id) else {
            return;
        };

        let mut cmd = Command::new(&self.config.program);
        cmd.arg(&job.input_ref)
            .arg(&job.output_ref)
            .arg(self.config.population_size.to_string())
            .arg(self.config.generations.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Worker spawn failed");
                self.finalize_failed(
                    &job_id,
                    format!(
                        "Failed to spawn worker {}: {}",
                        self.config.program.display(),
                        e
                    ),
                );
                return;
            }
        };

        tracing::info!(job_id = %job_id, program = %self.config.program.display(), "Worker started");
        self.emit(JobEvent::Started {
            job_id: job_id.clone(),
        });

        let cap = self.config.max_captured_bytes;
        let stdout_task = tokio::spawn(pump_stdout(
            Arc::clone(&self.registry),
            self.events.clone(),
            job_id.clone(),
            child.stdout.take(),
            cap,
        ));
        let stderr_task = tokio::spawn(pump_stderr(child.stderr.take(), cap));

        tokio::select! {
            status = child.wait() => {
                // The exit notification can race ahead of buffered stdout.
                // Drain both streams to EOF before recording a terminal
                // status so the final progress/metrics lines are not lost.
                let _ = stdout_task.await;
                let stderr_text = stderr_task.await.unwrap_or_default();

                match status {
                    Ok(status) if status.success() => self.finalize_completed(&job_id),
                    Ok(status) => {
                        let error = if stderr_text.trim().is_empty() {
                            format!("Worker exited with code {}", status.code().unwrap_or(-1))
                        } else {
                            stderr_text
                        };
                        self.finalize_failed(&job_id, error);
                    }
                    Err(e) => {
                        self.finalize_failed(&job_id, format!("Failed to reap worker: {e}"));
                    }
                }
            }
            _ = cancel.notified() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                // The reader tasks drain to EOF on their own; any late lines
                // are absorbed by the registry's terminal guard.
                self.finalize_cancelled(&job_id);
            }
        }
    }

    fn finalize_completed(&self, job_id: &str) {
        let updated = self.registry.update(job_id, |job| {
            job.status = JobStatus::Completed;
            job.progress = 100;
            job.completed_at = Some(chrono::Utc::now().to_rfc3339());
        });
        if let Some(job) = updated {
            tracing::info!(job_id = %job_id, "Worker completed");
            self.emit(JobEvent::Completed {
                job_id: job_id.to_string(),
                output_ref: job.output_ref,
                metrics: job.metrics,
            });
        }
    }

    fn finalize_failed(&self, job_id: &str, error: String) {
        let updated = self.registry.update(job_id, |job| {
            job.status = JobStatus::Failed;
            job.error = Some(error.clone());
            // Metrics only ever accompany a successful completion.
            job.metrics = None;
            job.completed_at = Some(chrono::Utc::now().to_rfc3339());
        });
        if updated.is_some() {
            tracing::warn!(job_id = %job_id, error = %error, "Worker failed");
            self.emit(JobEvent::Failed {
                job_id: job_id.to_string(),
                error,
            });
        }
    }

    fn finalize_cancelled(&self, job_id: &str) {
        let updated = self.registry.update(job_id, |job| {
            job.status = JobStatus::Cancelled;
            job.metrics = None;
            job.completed_at = Some(chrono::Utc::now().to_rfc3339());
        });
        if updated.is_some() {
            tracing::info!(job_id = %job_id, "Worker cancelled");
            self.emit(JobEvent::Cancelled {
                job_id: job_id.to_string(),
            });
        }
    }

    fn emit(&self, event: JobEvent) {
        // Send fails when nobody is subscribed; that is fine.
        let _ = self.events.send(event);
    }
}

/// Read stdout chunks, feed the protocol parser, and apply each classified
/// message to the job record. Flushes the parser's carry buffer at EOF.
///
/// Past `cap` bytes the stream is still drained (so the worker never blocks
/// on a full pipe) but no longer parsed.
async fn pump_stdout(
    registry: Arc<JobRegistry>,
    events: broadcast::Sender<JobEvent>,
    job_id: String,
    stdout: Option<ChildStdout>,
    cap: usize,
) {
    let Some(mut stdout) = stdout else { return };
    let mut parser = ProtocolParser::new();
    let mut buf = [0u8; 4096];
    let mut seen = 0usize;

    loop {
        match stdout.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if seen >= cap {
                    continue;
                }
                seen += n;
                for message in parser.push(&buf[..n]) {
                    apply_message(&registry, &events, &job_id, message);
                }
            }
        }
    }

    if let Some(message) = parser.finish() {
        apply_message(&registry, &events, &job_id, message);
    }
}

/// Accumulate stderr verbatim up to `cap` bytes, draining the rest.
async fn pump_stderr(stderr: Option<ChildStderr>, cap: usize) -> String {
    let Some(mut stderr) = stderr else {
        return String::new();
    };
    let mut captured = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        match stderr.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if captured.len() < cap {
                    let room = cap - captured.len();
                    captured.extend_from_slice(&buf[..n.min(room)]);
                }
            }
        }
    }

    String::from_utf8_lossy(&captured).into_owned()
}

fn apply_message(
    registry: &JobRegistry,
    events: &broadcast::Sender<JobEvent>,
    job_id: &str,
    message: WorkerMessage,
) {
    match message {
        WorkerMessage::Progress(value) => {
            // The registry floors regressions, so the event carries the
            // effective (monotonic) progress, not the raw payload.
            if let Some(job) = registry.update(job_id, |job| job.progress = value) {
                let _ = events.send(JobEvent::Progress {
                    job_id: job_id.to_string(),
                    progress: job.progress,
                });
            }
        }
        WorkerMessage::Metrics(metrics) => {
            let _ = registry.update(job_id, |job| job.metrics = Some(metrics));
        }
        WorkerMessage::Diagnostic(line) => {
            tracing::debug!(job_id = %job_id, line = %line, "Worker output");
        }
    }
}
