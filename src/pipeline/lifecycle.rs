//! Output placement and source cleanup.

use crate::state::{FileJob, JobState};
use autocompress_av::{ConversionResult, OUTPUT_EXTENSION};
use autocompress_common::paths::{sanitize_stem, unique_output_path};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("failed to create output directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("conversion failed: {message}")]
    ConversionFailed { message: String },

    #[error("output file {path:?} was not created")]
    OutputMissing { path: PathBuf },

    #[error("output file {path:?} is empty")]
    OutputEmpty { path: PathBuf },

    #[error("failed to delete source {path:?}: {source}")]
    DeleteSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no output path was assigned to {path:?}")]
    NotPrepared { path: PathBuf },
}

/// A confirmed, finished output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finalized {
    pub output: PathBuf,
    pub output_size: u64,
}

/// Owns the output directory and decides what happens to sources and
/// outputs once a conversion is over.
#[derive(Debug, Clone)]
pub struct FileLifecycle {
    output_dir: PathBuf,
    cleanup_partial_output: bool,
}

impl FileLifecycle {
    pub fn new(output_dir: PathBuf, cleanup_partial_output: bool) -> Self {
        Self {
            output_dir,
            cleanup_partial_output,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Create the output directory and assign the job a fresh output path.
    pub fn prepare(&self, job: &mut FileJob) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;

        let stem = sanitize_stem(&job.base_name);
        let output = unique_output_path(&self.output_dir, &stem, OUTPUT_EXTENSION);
        tracing::debug!("Job {} will write {:?}", job.id, output);

        job.output = Some(output.clone());
        Ok(output)
    }

    /// Confirm the output and delete the source.
    ///
    /// The source is only removed after the output is known to exist with a
    /// nonzero size. On error the source stays where it is and any output is
    /// left for inspection; a failed conversion result is handed to
    /// [`FileLifecycle::abandon`] first.
    pub fn finalize(
        &self,
        job: &mut FileJob,
        result: &ConversionResult,
    ) -> Result<Finalized, FinalizeError> {
        if !result.is_success() {
            self.abandon(job, result);
            return Err(FinalizeError::ConversionFailed {
                message: result.message().unwrap_or("unknown error").to_string(),
            });
        }

        let output = job.output.clone().ok_or_else(|| FinalizeError::NotPrepared {
            path: job.source.clone(),
        })?;

        if let Some(dir) = output.parent() {
            fs::create_dir_all(dir).map_err(|source| FinalizeError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let output_size = match fs::metadata(&output) {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return Err(FinalizeError::OutputMissing { path: output }),
        };
        if output_size == 0 {
            return Err(FinalizeError::OutputEmpty { path: output });
        }

        match fs::remove_file(&job.source) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!("Source {:?} was already gone", job.source);
            }
            Err(source) => {
                return Err(FinalizeError::DeleteSource {
                    path: job.source.clone(),
                    source,
                });
            }
        }

        job.transition(JobState::Done);
        tracing::info!(
            "Job {} finished: {:?} -> {:?}",
            job.id,
            job.source,
            output
        );

        Ok(Finalized {
            output,
            output_size,
        })
    }

    /// Mark a job failed after an unsuccessful conversion.
    ///
    /// The source is never touched. The partial output is removed when
    /// cleanup is enabled.
    pub fn abandon(&self, job: &mut FileJob, result: &ConversionResult) {
        if self.cleanup_partial_output && !result.is_success() {
            if let Some(output) = &job.output {
                match fs::remove_file(output) {
                    Ok(()) => tracing::debug!("Removed partial output {:?}", output),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => {
                        tracing::warn!("Failed to remove partial output {:?}: {}", output, e)
                    }
                }
            }
        }

        if !job.state.is_terminal() {
            job.transition(JobState::Failed);
        }
    }
}
