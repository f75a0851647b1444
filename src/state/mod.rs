mod types;

pub use types::*;

use crate::report::{FailureRecord, MetricsRecord};
use autocompress_common::JobId;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Pipeline event broadcast to hosts and tests.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A file was accepted and queued.
    JobQueued { id: JobId, path: PathBuf },
    /// A job moved to a non-terminal state.
    JobStateChanged {
        id: JobId,
        path: PathBuf,
        state: JobState,
    },
    /// A job finished and its metrics were recorded.
    JobCompleted { id: JobId, record: MetricsRecord },
    /// A job failed; the source file was left in place.
    JobFailed { id: JobId, failure: FailureRecord },
}

impl PipelineEvent {
    /// Whether the event marks the end of a job.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineEvent::JobCompleted { .. } | PipelineEvent::JobFailed { .. }
        )
    }

    pub fn job_id(&self) -> JobId {
        match self {
            PipelineEvent::JobQueued { id, .. }
            | PipelineEvent::JobStateChanged { id, .. }
            | PipelineEvent::JobCompleted { id, .. }
            | PipelineEvent::JobFailed { id, .. } => *id,
        }
    }
}

/// Source paths that currently have a job between discovery and retirement.
///
/// Shared by the event thread (claim) and the worker (release).
#[derive(Debug, Default)]
pub struct ActivePaths {
    paths: Mutex<HashSet<PathBuf>>,
}

impl ActivePaths {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a path. Returns false if a job for it is already active.
    pub fn claim(&self, path: &Path) -> bool {
        self.paths.lock().insert(path.to_path_buf())
    }

    pub fn release(&self, path: &Path) {
        self.paths.lock().remove(path);
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.lock().contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.lock().is_empty()
    }
}
