//! # autocompress-av
//!
//! External encoder plumbing for autocompress.
//!
//! This crate provides:
//! - Detection of the ffmpeg executable (configured path or `PATH`)
//! - The [`Transcoder`] seam and its ffmpeg implementation
//! - [`ConversionResult`], the immutable outcome of one encoder run
//!
//! ## Features
//!
//! - `tracing` - Enable tracing support
//!
//! ## Example
//!
//! ```no_run
//! use autocompress_av::{FfmpegTranscoder, Transcoder};
//! use std::path::Path;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> autocompress_av::Result<()> {
//! let ffmpeg = FfmpegTranscoder::locate(None)?;
//! let result = ffmpeg
//!     .convert(
//!         Path::new("/in/clip.webm"),
//!         Path::new("/in/compressed_video_output/clip.mp4"),
//!         &CancellationToken::new(),
//!     )
//!     .await;
//! println!("success: {} in {:?}", result.is_success(), result.elapsed());
//! # Ok(())
//! # }
//! ```

pub mod encode;
mod error;
pub mod tools;

// Re-exports
pub use encode::{
    ConversionResult, ConversionTimer, FfmpegTranscoder, Transcoder, OUTPUT_EXTENSION,
};
pub use error::{Error, Result};
pub use tools::{check_tool_with_arg, check_tools, get_tool_path, require_tool, ToolInfo};
