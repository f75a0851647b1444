//! Write-completion detection by size polling.

use crate::state::FileJob;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Reads the current size of a file.
pub trait SizeProbe: Send + Sync {
    fn size(&self, path: &Path) -> io::Result<u64>;
}

/// Size probe backed by filesystem metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSizeProbe;

impl SizeProbe for FsSizeProbe {
    fn size(&self, path: &Path) -> io::Result<u64> {
        std::fs::metadata(path).map(|m| m.len())
    }
}

#[derive(Debug, Error)]
pub enum StabilityError {
    /// The file disappeared or could not be read. Worth retrying.
    #[error("cannot read size of {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("exceeded max stabilization attempts ({polls}) for {path:?}")]
    Exhausted { path: PathBuf, polls: u32 },

    #[error("{path:?} is still empty after {polls} polls")]
    Empty { path: PathBuf, polls: u32 },

    #[error("stabilization of {path:?} cancelled")]
    Cancelled { path: PathBuf },
}

/// Consecutive empty polls tolerated before a file is given up on.
pub const DEFAULT_ZERO_SIZE_POLLS: u32 = 60;

/// Decides when a file has stopped growing.
///
/// A file is stable once two consecutive polls report the same nonzero size.
/// A file that stays empty for `zero_size_polls` polls in a row fails with
/// [`StabilityError::Empty`].
#[derive(Clone)]
pub struct StabilityDetector {
    probe: Arc<dyn SizeProbe>,
    poll_interval: Duration,
    max_polls: Option<u32>,
    zero_size_polls: u32,
}

impl StabilityDetector {
    pub fn new(poll_interval: Duration, max_polls: Option<u32>) -> Self {
        Self::with_probe(Arc::new(FsSizeProbe), poll_interval, max_polls)
    }

    pub fn with_probe(
        probe: Arc<dyn SizeProbe>,
        poll_interval: Duration,
        max_polls: Option<u32>,
    ) -> Self {
        Self {
            probe,
            poll_interval,
            max_polls,
            zero_size_polls: DEFAULT_ZERO_SIZE_POLLS,
        }
    }

    /// Give up on a file after `polls` consecutive empty observations.
    pub fn with_zero_size_polls(mut self, polls: u32) -> Self {
        self.zero_size_polls = polls.max(1);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Poll the job's source until its size settles and return that size.
    ///
    /// Observations are written back to the job. Every call starts a fresh
    /// comparison, so a retry never inherits a size seen before an error.
    pub async fn await_stable(
        &self,
        job: &mut FileJob,
        cancel: &CancellationToken,
    ) -> Result<u64, StabilityError> {
        let path = job.source.clone();
        job.last_size = None;
        job.last_size_at = None;

        let mut polls: u32 = 0;
        let mut empty_polls: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(StabilityError::Cancelled { path });
            }

            let size = self
                .probe
                .size(&path)
                .map_err(|source| StabilityError::Io {
                    path: path.clone(),
                    source,
                })?;
            polls += 1;

            if size > 0 && job.last_size == Some(size) {
                tracing::debug!("{:?} stable at {} bytes after {} polls", path, size, polls);
                return Ok(size);
            }

            if job.last_size != Some(size) {
                job.observe_size(size);
            }
            tracing::debug!("{:?}: {} bytes (poll {})", path, size, polls);

            if size == 0 {
                empty_polls += 1;
                if empty_polls >= self.zero_size_polls {
                    return Err(StabilityError::Empty {
                        path,
                        polls: empty_polls,
                    });
                }
            } else {
                empty_polls = 0;
            }

            if let Some(max) = self.max_polls {
                if polls >= max {
                    return Err(StabilityError::Exhausted { path, polls });
                }
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    return Err(StabilityError::Cancelled { path });
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

impl std::fmt::Debug for StabilityDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StabilityDetector")
            .field("poll_interval", &self.poll_interval)
            .field("max_polls", &self.max_polls)
            .field("zero_size_polls", &self.zero_size_polls)
            .finish_non_exhaustive()
    }
}
