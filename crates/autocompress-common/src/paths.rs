//! Path utilities for filtering inputs and naming outputs.
//!
//! Filenames are always taken apart with [`Path::file_stem`] and
//! [`Path::extension`], so these helpers behave the same on every platform's
//! separator convention.

use std::path::{Path, PathBuf};

/// Stem used when a source file has no usable name.
const FALLBACK_STEM: &str = "output";

/// Check if a path's extension is in the accepted set.
///
/// Comparison is case-insensitive and tolerates a leading dot in the
/// accepted entries (`".webm"` and `"webm"` are equivalent).
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use autocompress_common::paths::has_extension;
///
/// let accepted = vec!["webm".to_string(), ".mp4".to_string()];
/// assert!(has_extension(Path::new("/in/clip.webm"), &accepted));
/// assert!(has_extension(Path::new("/in/CLIP.MP4"), &accepted));
/// assert!(!has_extension(Path::new("/in/clip.webm.part"), &accepted));
/// ```
pub fn has_extension(path: &Path, accepted: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            accepted
                .iter()
                .any(|a| a.trim_start_matches('.').eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Base name of a file with its extension stripped.
pub fn base_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_STEM.to_string())
}

/// File name (with extension) of a path, lossily converted.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Make a file stem safe to use as an output name.
///
/// Letters and digits of any script are kept along with `-`, `_`, `.` and
/// spaces; everything else becomes `_`. Leading and trailing dots and
/// whitespace are dropped.
///
/// # Examples
///
/// ```
/// use autocompress_common::paths::sanitize_stem;
///
/// assert_eq!(sanitize_stem("my clip: take 2"), "my clip_ take 2");
/// assert_eq!(sanitize_stem("Видео*1"), "Видео_1");
/// assert_eq!(sanitize_stem("..."), "output");
/// ```
pub fn sanitize_stem(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Pick an output path in `dir` that does not exist yet.
///
/// Tries `<stem>.<ext>` first, then `<stem>_1.<ext>`, `<stem>_2.<ext>`, and
/// so on. The result only depends on what already exists in `dir`.
pub fn unique_output_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let first = dir.join(format!("{}.{}", stem, ext));
    if !first.exists() {
        return first;
    }

    let mut n: u32 = 1;
    loop {
        let candidate = dir.join(format!("{}_{}.{}", stem, n, ext));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}
