//! Autocompress-Common: shared types and utilities.
//!
//! - **Typed IDs**: [`JobId`] for jobs moving through the pipeline
//! - **Path Utilities**: extension matching, filename sanitizing and
//!   collision-free output naming
//! - **Units**: human readable sizes, durations and compression ratios
//!
//! # Examples
//!
//! ```
//! use autocompress_common::paths::has_extension;
//! use autocompress_common::units::format_size;
//! use std::path::Path;
//!
//! let accepted = vec!["webm".to_string()];
//! assert!(has_extension(Path::new("clip.WEBM"), &accepted));
//! assert_eq!(format_size(1536), "1.50 KB");
//! ```

pub mod ids;
pub mod paths;
pub mod units;

pub use ids::JobId;
