use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub stability: StabilityConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchConfig {
    /// Folder new videos are dropped into. Relative paths are resolved
    /// against the config file's directory.
    #[serde(default = "default_folder")]
    pub folder: PathBuf,

    /// Accepted file extensions, without the leading dot.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Name of the subdirectory converted files are written to.
    #[serde(default = "default_output_dir_name")]
    pub output_dir_name: String,

    /// Queue matching files already in the folder at startup.
    #[serde(default)]
    pub process_existing: bool,
}

fn default_folder() -> PathBuf {
    PathBuf::from(DEFAULT_INPUT_DIR_NAME)
}

fn default_extensions() -> Vec<String> {
    vec!["webm".to_string()]
}

fn default_output_dir_name() -> String {
    "compressed_video_output".to_string()
}

/// Folder created next to the config file on first run.
pub const DEFAULT_INPUT_DIR_NAME: &str = "to_compress_video";

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            folder: default_folder(),
            extensions: default_extensions(),
            output_dir_name: default_output_dir_name(),
            process_existing: false,
        }
    }
}

impl WatchConfig {
    /// Directory converted files land in.
    pub fn output_dir(&self) -> PathBuf {
        self.folder.join(&self.output_dir_name)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StabilityConfig {
    /// Delay between two size polls (default: 1000).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Give up on a file that keeps changing after this many polls.
    /// Unset means wait forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_polls: Option<u32>,

    /// Fail a file that is still empty after this many consecutive polls
    /// (default: 60).
    #[serde(default = "default_zero_size_polls")]
    pub zero_size_polls: u32,

    /// How many times stabilization is restarted after an I/O error
    /// (file vanished, permission denied) before the job fails (default: 10).
    /// `None` retries forever.
    #[serde(
        default = "default_io_retries",
        skip_serializing_if = "Option::is_none"
    )]
    pub io_retries: Option<u32>,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_zero_size_polls() -> u32 {
    crate::pipeline::stability::DEFAULT_ZERO_SIZE_POLLS
}

fn default_io_retries() -> Option<u32> {
    Some(10)
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_polls: None,
            zero_size_polls: default_zero_size_polls(),
            io_retries: default_io_retries(),
        }
    }
}

impl StabilityConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Remove the partial output left behind by a failed or cancelled
    /// conversion (default: true).
    #[serde(default = "default_cleanup_partial_output")]
    pub cleanup_partial_output: bool,
}

fn default_cleanup_partial_output() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            cleanup_partial_output: default_cleanup_partial_output(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<PathBuf>,
}
