use autocompress_common::paths::{base_name, file_name};
use autocompress_common::JobId;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle of a file job.
///
/// `Discovered -> Stabilizing -> Converting -> Finalizing -> Done`, with
/// `Failed` reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Discovered,
    Stabilizing,
    Converting,
    Finalizing,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }

    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Discovered, Stabilizing)
            | (Stabilizing, Converting)
            | (Converting, Finalizing)
            | (Finalizing, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobState::Discovered => "discovered",
            JobState::Stabilizing => "stabilizing",
            JobState::Converting => "converting",
            JobState::Finalizing => "finalizing",
            JobState::Done => "done",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One source file moving through the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct FileJob {
    pub id: JobId,
    pub source: PathBuf,
    /// File name including extension, as shown in reports.
    pub file_name: String,
    /// File name with the extension stripped.
    pub base_name: String,
    pub discovered_at: DateTime<Local>,
    pub last_size: Option<u64>,
    pub last_size_at: Option<DateTime<Local>>,
    pub state: JobState,
    /// Assigned once the source is stable.
    pub output: Option<PathBuf>,
}

impl FileJob {
    pub fn new(source: PathBuf) -> Self {
        Self {
            id: JobId::new(),
            file_name: file_name(&source),
            base_name: base_name(&source),
            source,
            discovered_at: Local::now(),
            last_size: None,
            last_size_at: None,
            state: JobState::Discovered,
            output: None,
        }
    }

    /// Move to `next`, returning false (and staying put) if the move is not
    /// part of the lifecycle.
    pub fn transition(&mut self, next: JobState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                "Job {} refused transition {} -> {}",
                self.id,
                self.state,
                next
            );
            return false;
        }
        self.state = next;
        true
    }

    /// Record a size observation that differs from the previous one.
    pub fn observe_size(&mut self, size: u64) {
        self.last_size = Some(size);
        self.last_size_at = Some(Local::now());
    }
}
