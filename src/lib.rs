//! Autocompress - watch a folder and compress finished videos with ffmpeg
//!
//! This library crate exposes the pipeline for the binary and for
//! integration testing.

pub mod config;
pub mod pipeline;
pub mod report;
pub mod service;
pub mod state;
pub mod watch;

pub use service::CompressService;
