//! Shared test harness for pipeline integration tests.
//!
//! [`TestHarness`] owns a temporary watch folder and a config tuned for fast
//! polling. [`FakeTranscoder`] stands in for ffmpeg with scripted outcomes.

#![allow(dead_code)]

use async_trait::async_trait;
use autocompress::config::Config;
use autocompress::service::CompressService;
use autocompress::state::{JobState, PipelineEvent};
use autocompress_av::{ConversionResult, ConversionTimer, Transcoder};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

pub const MIB: u64 = 1024 * 1024;

/// Upper bound for any single wait on the pipeline.
pub const WAIT: Duration = Duration::from_secs(10);

/// What the fake encoder does with one input.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    /// Write an output of the given size and exit 0.
    Succeed { bytes: u64 },
    /// Write a few partial bytes and exit with `code`.
    Fail { code: i32 },
    /// Exit 0 without writing anything.
    NoOutput,
    /// Write partial bytes, then hang until cancelled.
    Block,
}

/// One recorded call.
#[derive(Debug, Clone)]
pub struct Call {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Size of the input when the encoder started.
    pub input_size: u64,
}

/// Scripted stand-in for ffmpeg.
pub struct FakeTranscoder {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    delay: Duration,
    calls: Mutex<Vec<Call>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl FakeTranscoder {
    /// Every call produces `fallback`.
    pub fn new(fallback: Outcome) -> Arc<Self> {
        Self::scripted(Vec::new(), fallback)
    }

    /// Calls consume `script` in order, then fall back to `fallback`.
    pub fn scripted(script: Vec<Outcome>, fallback: Outcome) -> Arc<Self> {
        Self::build(script, fallback, Duration::ZERO)
    }

    /// Like [`FakeTranscoder::new`], holding each call for `delay`.
    pub fn slow(fallback: Outcome, delay: Duration) -> Arc<Self> {
        Self::build(Vec::new(), fallback, delay)
    }

    fn build(script: Vec<Outcome>, fallback: Outcome, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            delay,
            calls: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Highest number of conversions that were ever running at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Outcome {
        self.script.lock().pop_front().unwrap_or(self.fallback)
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> ConversionResult {
        let timer = ConversionTimer::start();
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        self.calls.lock().push(Call {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            input_size: fs::metadata(input).map(|m| m.len()).unwrap_or(0),
        });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let result = match self.next_outcome() {
            Outcome::Succeed { bytes } => {
                File::create(output).unwrap().set_len(bytes).unwrap();
                timer.succeeded()
            }
            Outcome::Fail { code } => {
                fs::write(output, b"partial").unwrap();
                timer.failed(Some(code), "fake encoder failed")
            }
            Outcome::NoOutput => timer.succeeded(),
            Outcome::Block => {
                fs::write(output, b"partial").unwrap();
                cancel.cancelled().await;
                timer.cancelled()
            }
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Temporary watch folder plus a fast-polling config.
pub struct TestHarness {
    pub dir: tempfile::TempDir,
    pub config: Config,
}

impl TestHarness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("to_compress_video");
        fs::create_dir_all(&folder).unwrap();

        let mut config = Config::default();
        config.watch.folder = folder;
        config.stability.poll_interval_ms = 10;

        Self { dir, config }
    }

    pub fn folder(&self) -> &Path {
        &self.config.watch.folder
    }

    pub fn output_dir(&self) -> PathBuf {
        self.config.watch.output_dir()
    }

    /// Create a source file of `bytes` length (sparse).
    pub fn write_source(&self, name: &str, bytes: u64) -> PathBuf {
        let path = self.folder().join(name);
        File::create(&path).unwrap().set_len(bytes).unwrap();
        path
    }

    /// Create a source file with exact contents.
    pub fn write_source_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.folder().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    /// Start a service without a filesystem watcher.
    pub fn start(&self, transcoder: Arc<FakeTranscoder>) -> CompressService {
        CompressService::start_unwatched(&self.config, transcoder).unwrap()
    }

    /// Start a service with the real filesystem watcher.
    pub fn start_watching(&self, transcoder: Arc<FakeTranscoder>) -> CompressService {
        CompressService::start(&self.config, transcoder).unwrap()
    }
}

/// Wait for the next job-ending event.
pub async fn next_terminal(events: &mut broadcast::Receiver<PipelineEvent>) -> PipelineEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if event.is_terminal() => return event,
                Ok(_) => continue,
                Err(e) => panic!("event channel error: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for a job to finish")
}

/// Wait for `count` job-ending events.
pub async fn collect_terminal(
    events: &mut broadcast::Receiver<PipelineEvent>,
    count: usize,
) -> Vec<PipelineEvent> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(next_terminal(events).await);
    }
    out
}

/// Wait until some job enters `state`, returning its source path.
pub async fn wait_for_state(
    events: &mut broadcast::Receiver<PipelineEvent>,
    state: JobState,
) -> PathBuf {
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(PipelineEvent::JobStateChanged { path, state: s, .. }) if s == state => {
                    return path
                }
                Ok(_) => continue,
                Err(e) => panic!("event channel error: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for state change")
}
