//! Stable-file ingestion pipeline.
//!
//! Creation notifications are filtered and queued by an [`IngestionHandle`];
//! a single [`IngestionCoordinator`] worker then takes each job through
//! stabilization, conversion and finalization, recording the outcome.

pub mod coordinator;
pub mod lifecycle;
pub mod stability;

pub use coordinator::{
    IngestionCoordinator, IngestionHandle, Submission, EVENT_CHANNEL_CAPACITY,
};
pub use lifecycle::{FileLifecycle, FinalizeError, Finalized};
pub use stability::{FsSizeProbe, SizeProbe, StabilityDetector, StabilityError};

use autocompress_common::paths::has_extension;
use std::path::{Path, PathBuf};

/// The watched folder and the files it accepts.
#[derive(Debug, Clone)]
pub struct WatchTarget {
    folder: PathBuf,
    extensions: Vec<String>,
    output_dir: PathBuf,
}

impl WatchTarget {
    pub fn new(folder: PathBuf, extensions: Vec<String>, output_dir: PathBuf) -> Self {
        Self {
            folder,
            extensions,
            output_dir,
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Whether `path` should become a job: a direct child of the folder
    /// with an accepted extension.
    pub fn accepts(&self, path: &Path) -> bool {
        path.parent() == Some(self.folder.as_path())
            && has_extension(path, &self.extensions)
            && !path.starts_with(&self.output_dir)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionKind {
    Created,
    Other,
}

/// A filesystem notification reduced to what the pipeline cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionEvent {
    pub path: PathBuf,
    pub kind: IngestionKind,
    pub is_dir: bool,
}

impl IngestionEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: IngestionKind::Created,
            is_dir: false,
        }
    }

    pub fn other(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: IngestionKind::Other,
            is_dir: false,
        }
    }
}
