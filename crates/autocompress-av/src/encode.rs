//! Encoder invocation.
//!
//! The [`Transcoder`] trait is the seam between the pipeline and the external
//! encoder. [`FfmpegTranscoder`] runs ffmpeg as a child process with a fixed
//! argument template and reports a [`ConversionResult`]; it never retries.

use crate::tools::get_tool_path;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Container extension every output is written with.
pub const OUTPUT_EXTENSION: &str = "mp4";

/// Constant rate factor passed to libx264 (lower = higher quality).
pub const VIDEO_CRF: u32 = 24;

/// VBR quality passed to libmp3lame (lower = higher quality).
pub const AUDIO_QUALITY: u32 = 2;

/// Number of encoder stderr lines kept for failure messages.
const STDERR_TAIL_LINES: usize = 20;

/// Outcome of one encoder run.
///
/// Built through [`ConversionTimer`] and immutable afterwards.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    success: bool,
    cancelled: bool,
    exit_code: Option<i32>,
    started_at: DateTime<Local>,
    finished_at: DateTime<Local>,
    elapsed: Duration,
    message: Option<String>,
}

impl ConversionResult {
    /// Whether the encoder exited successfully.
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Whether the run was abandoned because of shutdown.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Exit code of the encoder. `None` if it never started or was killed.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Local> {
        self.finished_at
    }

    /// Wall time spent in the encoder.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Failure description, including the tail of the encoder's stderr.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Captures wall-clock start time around an encoder run.
///
/// ```
/// use autocompress_av::ConversionTimer;
///
/// let timer = ConversionTimer::start();
/// let result = timer.succeeded();
/// assert!(result.is_success());
/// assert_eq!(result.exit_code(), Some(0));
/// ```
#[derive(Debug)]
pub struct ConversionTimer {
    started_at: DateTime<Local>,
    started: Instant,
}

impl ConversionTimer {
    pub fn start() -> Self {
        Self {
            started_at: Local::now(),
            started: Instant::now(),
        }
    }

    pub fn succeeded(self) -> ConversionResult {
        self.finish(true, false, Some(0), None)
    }

    pub fn failed(self, exit_code: Option<i32>, message: impl Into<String>) -> ConversionResult {
        self.finish(false, false, exit_code, Some(message.into()))
    }

    pub fn cancelled(self) -> ConversionResult {
        self.finish(
            false,
            true,
            None,
            Some("conversion cancelled by shutdown".to_string()),
        )
    }

    fn finish(
        self,
        success: bool,
        cancelled: bool,
        exit_code: Option<i32>,
        message: Option<String>,
    ) -> ConversionResult {
        ConversionResult {
            success,
            cancelled,
            exit_code,
            started_at: self.started_at,
            finished_at: Local::now(),
            elapsed: self.started.elapsed(),
            message,
        }
    }
}

/// Something that turns an input file into a compressed output file.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Convert `input` into `output`, suspending until the encoder exits.
    ///
    /// Cancelling `cancel` must stop the encoder and yield a cancelled result.
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> ConversionResult;
}

/// Runs ffmpeg with the fixed compression template.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl FfmpegTranscoder {
    /// Use the given ffmpeg executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Find ffmpeg at the configured path or on `PATH`.
    pub fn locate(configured: Option<&Path>) -> Result<Self> {
        get_tool_path("ffmpeg", configured).map(Self::new)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Full argument list for one conversion.
    ///
    /// `-n` makes ffmpeg refuse to overwrite an existing output instead of
    /// prompting; callers pick a fresh output path.
    pub fn args(input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-n", "-i"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(input.as_os_str().to_os_string());
        args.extend(
            [
                "-c:v".to_string(),
                "libx264".to_string(),
                "-crf".to_string(),
                VIDEO_CRF.to_string(),
                "-c:a".to_string(),
                "libmp3lame".to_string(),
                "-q:a".to_string(),
                AUDIO_QUALITY.to_string(),
                "-fps_mode".to_string(),
                "vfr".to_string(),
            ]
            .into_iter()
            .map(OsString::from),
        );
        args.push(output.as_os_str().to_os_string());
        args
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> ConversionResult {
        let timer = ConversionTimer::start();
        let args = Self::args(input, output);

        #[cfg(feature = "tracing")]
        tracing::debug!("{} args: {:?}", self.program.display(), args);

        let mut child = match Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return timer.failed(
                    None,
                    format!("failed to spawn {}: {}", self.program.display(), e),
                );
            }
        };

        // ffmpeg is chatty on stderr; drain it so the pipe never fills up.
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                tail.into_iter().collect::<Vec<_>>().join("\n")
            })
        });

        let status = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };

        let Some(status) = status else {
            if let Err(_e) = child.kill().await {
                #[cfg(feature = "tracing")]
                tracing::warn!("Failed to kill {}: {}", self.program.display(), _e);
            }
            if let Some(task) = stderr_task {
                task.abort();
            }
            #[cfg(feature = "tracing")]
            tracing::info!("Encoder killed for {:?}", input);
            return timer.cancelled();
        };

        let stderr_tail = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        match status {
            Ok(status) if status.success() => timer.succeeded(),
            Ok(status) => {
                let mut message =
                    format!("{} exited with status: {}", self.program.display(), status);
                if !stderr_tail.is_empty() {
                    message.push('\n');
                    message.push_str(&stderr_tail);
                }
                timer.failed(status.code(), message)
            }
            Err(e) => timer.failed(
                None,
                format!("failed to wait for {}: {}", self.program.display(), e),
            ),
        }
    }
}
