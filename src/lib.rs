//! # Enhance Queue
//!
//! Job orchestration core for external image-enhancement workers.
//!
//! The actual enhancement runs in a separate process (e.g. a Python script)
//! that reports status over a line-oriented stdout protocol. This crate owns
//! everything around that black box:
//!
//! - **Job tracking** — in-memory registry with consistent, race-free
//!   snapshots for concurrent pollers
//! - **Worker supervision** — one spawned process per job, stdout parsed
//!   incrementally, stderr captured as diagnostics, terminal status recorded
//!   on exit
//! - **Admission control** — a configurable cap on concurrent workers
//! - **Cancellation** — kill the worker, freeze the record as `Cancelled`
//! - **Push notifications** — optional broadcast channel mirroring the
//!   pollable state
//!
//! ## Quick Start
//!
//! 1. Build a [`WorkerConfig`] pointing at your worker executable
//! 2. Create a [`JobManager`]
//! 3. Call [`JobManager::submit()`] per upload, hand the returned id to the
//!    client
//! 4. Serve [`JobManager::status()`] / [`JobManager::result()`] from your
//!    transport layer
//!
//! The crate never touches artifact bytes: input and output references are
//! recorded and returned as-is for an external static-file server to
//! resolve.

pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod protocol;
pub mod registry;
pub mod supervisor;
pub mod types;

pub use config::{WorkerConfig, WorkerConfigBuilder};
pub use error::JobError;
pub use events::JobEvent;
pub use manager::JobManager;
pub use protocol::{ProtocolParser, WorkerMessage};
pub use registry::JobRegistry;
pub use supervisor::WorkerSupervisor;
pub use types::{EnhancementMetrics, JobRecord, JobResult, JobStatus, StatusSnapshot};
