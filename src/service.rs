//! Host facade: wires the watcher, the worker and the recorder together.

use crate::config::Config;
use crate::pipeline::{IngestionCoordinator, IngestionHandle};
use crate::report::ResultRecorder;
use crate::state::PipelineEvent;
use crate::watch::{scan_existing, FolderWatcher};
use anyhow::{Context, Result};
use autocompress_av::Transcoder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A running compression pipeline.
///
/// Must be started from within a tokio runtime.
pub struct CompressService {
    folder: PathBuf,
    handle: IngestionHandle,
    recorder: Arc<ResultRecorder>,
    cancel: CancellationToken,
    worker: JoinHandle<()>,
    watcher: Option<FolderWatcher>,
}

impl CompressService {
    /// Start the worker and watch `config.watch.folder`, creating it if needed.
    pub fn start(config: &Config, transcoder: Arc<dyn Transcoder>) -> Result<Self> {
        let mut service = Self::launch(config, transcoder)?;

        let mut watcher = FolderWatcher::new(service.folder.clone(), service.handle.clone());
        watcher.start()?;
        service.watcher = Some(watcher);

        if config.watch.process_existing {
            service.enqueue_existing();
        }

        Ok(service)
    }

    /// Start the worker without a watcher. Files are fed through
    /// [`CompressService::handle`].
    pub fn start_unwatched(config: &Config, transcoder: Arc<dyn Transcoder>) -> Result<Self> {
        Self::launch(config, transcoder)
    }

    fn launch(config: &Config, transcoder: Arc<dyn Transcoder>) -> Result<Self> {
        let folder = config.watch.folder.clone();
        std::fs::create_dir_all(&folder)
            .with_context(|| format!("Failed to create watch folder: {:?}", folder))?;

        let recorder = Arc::new(ResultRecorder::new(config.watch.output_dir()));
        let cancel = CancellationToken::new();
        let (coordinator, handle) =
            IngestionCoordinator::new(config, transcoder, recorder.clone(), cancel.clone());
        let worker = tokio::spawn(coordinator.run());

        tracing::info!(
            "Compression service started for {:?} (extensions: {})",
            folder,
            config.watch.extensions.join(", ")
        );

        Ok(Self {
            folder,
            handle,
            recorder,
            cancel,
            worker,
            watcher: None,
        })
    }

    /// Queue accepted files that are already in the folder.
    pub fn enqueue_existing(&self) -> usize {
        scan_existing(&self.folder, &self.handle)
    }

    pub fn handle(&self) -> &IngestionHandle {
        &self.handle
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.handle.subscribe()
    }

    pub fn recorder(&self) -> Arc<ResultRecorder> {
        self.recorder.clone()
    }

    /// Cumulative report of everything processed so far.
    pub fn report(&self) -> String {
        self.recorder.render_report()
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn output_dir(&self) -> &Path {
        self.recorder.output_dir()
    }

    /// Stop watching, cancel the in-flight job and wait for the worker.
    ///
    /// Jobs that did not finish are recorded as cancelled. Returns the
    /// recorder so the final report can still be rendered.
    pub async fn shutdown(self) -> Result<Arc<ResultRecorder>> {
        let Self {
            mut watcher,
            cancel,
            worker,
            recorder,
            ..
        } = self;

        if let Some(watcher) = watcher.as_mut() {
            watcher.stop();
        }
        cancel.cancel();

        worker.await.context("Ingestion worker panicked")?;
        tracing::info!(
            "Compression service stopped ({} done, {} failed)",
            recorder.completed_count(),
            recorder.failed_count()
        );

        Ok(recorder)
    }
}
