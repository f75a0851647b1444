use crate::pipeline::{IngestionEvent, IngestionHandle, IngestionKind, Submission};
use anyhow::{Context, Result};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Watches a single folder and feeds creation events into the pipeline.
pub struct FolderWatcher {
    folder: PathBuf,
    handle: IngestionHandle,
    watcher: Option<RecommendedWatcher>,
}

impl FolderWatcher {
    pub fn new(folder: PathBuf, handle: IngestionHandle) -> Self {
        Self {
            folder,
            handle,
            watcher: None,
        }
    }

    /// Start watching. The folder must exist.
    pub fn start(&mut self) -> Result<()> {
        let handle = self.handle.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    for event in to_ingestion_events(&event) {
                        let path = event.path.clone();
                        if handle.submit(event) == Submission::Closed {
                            tracing::debug!("Pipeline closed, dropping event for {:?}", path);
                        }
                    }
                }
                Err(e) => tracing::warn!("Watch error: {}", e),
            },
            Config::default(),
        )
        .context("Failed to create file watcher")?;

        watcher
            .watch(&self.folder, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch path: {:?}", self.folder))?;
        tracing::info!("Watching directory: {:?}", self.folder);

        self.watcher = Some(watcher);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Stop watching. No further events reach the pipeline.
    pub fn stop(&mut self) {
        if self.watcher.take().is_some() {
            tracing::info!("File watcher stopped");
        }
    }
}

/// Translate a notify event into pipeline events, one per path.
///
/// Creations and renames into the folder count as new files; everything
/// else is passed through as `Other` so the pipeline can ignore it.
pub fn to_ingestion_events(event: &Event) -> Vec<IngestionEvent> {
    let (kind, dir_hint) = match event.kind {
        EventKind::Create(CreateKind::File) => (IngestionKind::Created, Some(false)),
        EventKind::Create(CreateKind::Folder) => (IngestionKind::Created, Some(true)),
        EventKind::Create(CreateKind::Any) => (IngestionKind::Created, None),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => (IngestionKind::Created, None),
        _ => (IngestionKind::Other, Some(false)),
    };

    event
        .paths
        .iter()
        .map(|path| IngestionEvent {
            path: path.clone(),
            kind,
            is_dir: dir_hint.unwrap_or_else(|| path.is_dir()),
        })
        .collect()
}

/// Queue accepted files already present in `folder`, in name order.
///
/// Returns how many new jobs were queued.
pub fn scan_existing(folder: &Path, handle: &IngestionHandle) -> usize {
    let mut queued = 0;

    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        if let Submission::Queued(_) = handle.submit(IngestionEvent::created(entry.path())) {
            queued += 1;
        }
    }

    if queued > 0 {
        tracing::info!("Queued {} existing files from {:?}", queued, folder);
    }
    queued
}
