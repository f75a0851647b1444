use super::lifecycle::FileLifecycle;
use super::stability::{StabilityDetector, StabilityError};
use super::{IngestionEvent, IngestionKind, WatchTarget};
use crate::config::Config;
use crate::report::{FailureKind, MetricsRecord, ResultRecorder};
use crate::state::{ActivePaths, FileJob, JobState, PipelineEvent};
use autocompress_av::Transcoder;
use autocompress_common::JobId;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Capacity of the pipeline event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// What happened to a submitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// A new job was queued.
    Queued(JobId),
    /// A job for the path is already active.
    Duplicate,
    /// Not a creation of an accepted file.
    Filtered,
    /// The pipeline has shut down.
    Closed,
}

/// Cheap, cloneable entry point into the pipeline.
///
/// Submission never blocks, so it is safe to call from the watcher's
/// callback thread.
#[derive(Clone)]
pub struct IngestionHandle {
    target: Arc<WatchTarget>,
    active: Arc<ActivePaths>,
    queue: mpsc::UnboundedSender<FileJob>,
    events: broadcast::Sender<PipelineEvent>,
    /// Held across enqueue and the `JobQueued` broadcast.
    enqueue: Arc<Mutex<()>>,
    cancel: CancellationToken,
}

impl IngestionHandle {
    pub fn submit(&self, event: IngestionEvent) -> Submission {
        if event.kind != IngestionKind::Created || event.is_dir {
            return Submission::Filtered;
        }

        if !self.target.accepts(&event.path) {
            tracing::trace!("Ignoring {:?}", event.path);
            return Submission::Filtered;
        }

        if self.cancel.is_cancelled() || self.queue.is_closed() {
            return Submission::Closed;
        }

        if !self.active.claim(&event.path) {
            tracing::debug!("Already tracking {:?}", event.path);
            return Submission::Duplicate;
        }

        let job = FileJob::new(event.path);
        let id = job.id;
        let path = job.source.clone();

        {
            let _guard = self.enqueue.lock();
            if self.queue.send(job).is_err() {
                self.active.release(&path);
                return Submission::Closed;
            }
            let _ = self.events.send(PipelineEvent::JobQueued {
                id,
                path: path.clone(),
            });
        }

        tracing::info!("Queued job {} for {:?}", id, path);
        Submission::Queued(id)
    }

    /// Submit a creation event for `path`.
    pub fn submit_path(&self, path: impl Into<std::path::PathBuf>) -> Submission {
        self.submit(IngestionEvent::created(path))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    /// Whether a job for `path` is queued or running.
    pub fn is_active(&self, path: &Path) -> bool {
        self.active.contains(path)
    }

    pub fn active_jobs(&self) -> usize {
        self.active.len()
    }
}

impl std::fmt::Debug for IngestionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionHandle")
            .field("target", &self.target)
            .field("active", &self.active.len())
            .finish_non_exhaustive()
    }
}

struct JobFailure {
    kind: FailureKind,
    message: String,
}

impl JobFailure {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "cancelled by shutdown")
    }
}

/// Single worker that drives queued jobs through the pipeline in arrival
/// order, one at a time.
pub struct IngestionCoordinator {
    queue: mpsc::UnboundedReceiver<FileJob>,
    active: Arc<ActivePaths>,
    events: broadcast::Sender<PipelineEvent>,
    enqueue: Arc<Mutex<()>>,
    detector: StabilityDetector,
    lifecycle: FileLifecycle,
    transcoder: Arc<dyn Transcoder>,
    recorder: Arc<ResultRecorder>,
    io_retries: Option<u32>,
    cancel: CancellationToken,
}

impl IngestionCoordinator {
    pub fn new(
        config: &Config,
        transcoder: Arc<dyn Transcoder>,
        recorder: Arc<ResultRecorder>,
        cancel: CancellationToken,
    ) -> (Self, IngestionHandle) {
        let detector = StabilityDetector::new(
            config.stability.poll_interval(),
            config.stability.max_polls,
        )
        .with_zero_size_polls(config.stability.zero_size_polls);
        Self::with_detector(config, detector, transcoder, recorder, cancel)
    }

    /// Like [`IngestionCoordinator::new`] with a custom stability detector.
    pub fn with_detector(
        config: &Config,
        detector: StabilityDetector,
        transcoder: Arc<dyn Transcoder>,
        recorder: Arc<ResultRecorder>,
        cancel: CancellationToken,
    ) -> (Self, IngestionHandle) {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let active = Arc::new(ActivePaths::new());
        let enqueue = Arc::new(Mutex::new(()));

        let target = Arc::new(WatchTarget::new(
            config.watch.folder.clone(),
            config.watch.extensions.clone(),
            config.watch.output_dir(),
        ));

        let handle = IngestionHandle {
            target,
            active: active.clone(),
            queue: queue_tx,
            events: events.clone(),
            enqueue: enqueue.clone(),
            cancel: cancel.clone(),
        };

        let coordinator = Self {
            queue: queue_rx,
            active,
            events,
            enqueue,
            detector,
            lifecycle: FileLifecycle::new(
                config.watch.output_dir(),
                config.output.cleanup_partial_output,
            ),
            transcoder,
            recorder,
            io_retries: config.stability.io_retries,
            cancel,
        };

        (coordinator, handle)
    }

    /// Process jobs until cancelled, then fail whatever is still queued.
    pub async fn run(mut self) {
        tracing::info!("Ingestion worker started");

        loop {
            let job = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,
                job = self.queue.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            self.process(job).await;
        }

        self.drain_cancelled();
        tracing::info!("Ingestion worker stopped");
    }

    async fn process(&self, mut job: FileJob) {
        // Wait for the submitter to finish announcing the job.
        drop(self.enqueue.lock());
        tracing::info!("Processing job {}: {:?}", job.id, job.source);

        let outcome = if self.cancel.is_cancelled() {
            Err(JobFailure::cancelled())
        } else {
            self.drive(&mut job).await
        };

        match outcome {
            Ok(record) => {
                self.active.release(&job.source);
                let _ = self.events.send(PipelineEvent::JobCompleted {
                    id: job.id,
                    record,
                });
            }
            Err(failure) => self.fail(job, failure),
        }
    }

    async fn drive(&self, job: &mut FileJob) -> Result<MetricsRecord, JobFailure> {
        self.advance(job, JobState::Stabilizing);
        let original_size = self.stabilize(job).await?;

        let output = self.lifecycle.prepare(job).map_err(|e| {
            JobFailure::new(
                FailureKind::Finalization,
                format!(
                    "failed to prepare output in {:?}: {}",
                    self.lifecycle.output_dir(),
                    e
                ),
            )
        })?;

        self.advance(job, JobState::Converting);
        tracing::info!("Converting {:?} -> {:?}", job.source, output);
        let result = self
            .transcoder
            .convert(&job.source, &output, &self.cancel)
            .await;

        if !result.is_success() {
            self.lifecycle.abandon(job, &result);
            if result.is_cancelled() {
                return Err(JobFailure::cancelled());
            }
            let message = result.message().unwrap_or("conversion failed");
            return Err(JobFailure::new(FailureKind::Conversion, message));
        }

        self.advance(job, JobState::Finalizing);
        let finalized = self
            .lifecycle
            .finalize(job, &result)
            .map_err(|e| JobFailure::new(FailureKind::Finalization, e.to_string()))?;

        let record = self
            .recorder
            .record(job, &result, original_size, finalized.output_size);
        tracing::info!(
            "Compressed {} ({} -> {} bytes, ratio {:.2})",
            record.original_name,
            record.original_size,
            record.output_size,
            record.compression_ratio
        );

        Ok(record)
    }

    /// Wait for the source to stop growing, restarting after I/O errors
    /// until the retry budget runs out.
    async fn stabilize(&self, job: &mut FileJob) -> Result<u64, JobFailure> {
        let mut retries: u32 = 0;

        loop {
            match self.detector.await_stable(job, &self.cancel).await {
                Ok(size) => return Ok(size),
                Err(StabilityError::Cancelled { .. }) => return Err(JobFailure::cancelled()),
                Err(e @ (StabilityError::Exhausted { .. } | StabilityError::Empty { .. })) => {
                    return Err(JobFailure::new(FailureKind::Stabilization, e.to_string()));
                }
                Err(e @ StabilityError::Io { .. }) => {
                    if self.io_retries.is_some_and(|max| retries >= max) {
                        return Err(JobFailure::new(
                            FailureKind::Stabilization,
                            format!("{} (gave up after {} retries)", e, retries),
                        ));
                    }
                    retries += 1;
                    tracing::warn!("{}; retrying ({})", e, retries);

                    if !self.pause(self.detector.poll_interval()).await {
                        return Err(JobFailure::cancelled());
                    }
                }
            }
        }
    }

    /// Sleep unless cancelled. Returns false on cancellation.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    fn advance(&self, job: &mut FileJob, next: JobState) {
        let from = job.state;
        if job.transition(next) {
            tracing::debug!("Job {} {} -> {}", job.id, from, next);
            let _ = self.events.send(PipelineEvent::JobStateChanged {
                id: job.id,
                path: job.source.clone(),
                state: next,
            });
        }
    }

    fn fail(&self, mut job: FileJob, failure: JobFailure) {
        if !job.state.is_terminal() {
            job.transition(JobState::Failed);
        }

        let record = self
            .recorder
            .record_failure(&job, failure.kind, failure.message);
        match record.kind {
            FailureKind::Cancelled => {
                tracing::warn!("Job {} cancelled: {:?}", job.id, job.source)
            }
            _ => tracing::error!(
                "Job {} failed during {}: {}",
                job.id,
                record.kind,
                record.message
            ),
        }

        self.active.release(&job.source);
        let _ = self.events.send(PipelineEvent::JobFailed {
            id: job.id,
            failure: record,
        });
    }

    fn drain_cancelled(&mut self) {
        self.queue.close();
        while let Ok(job) = self.queue.try_recv() {
            drop(self.enqueue.lock());
            self.fail(job, JobFailure::cancelled());
        }
    }
}
