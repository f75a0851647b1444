pub mod persist;
mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};

/// Default file name used when bootstrapping a new config.
pub const DEFAULT_CONFIG_FILE: &str = "autocompress.toml";

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    resolve_paths(&mut config, path);

    Ok(config)
}

/// Default config locations, in lookup order.
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "./autocompress.toml",
    "~/.config/autocompress/config.toml",
];

/// Locate the config file to use: `custom_path` if given, otherwise the
/// first default location that exists.
pub fn find_config(custom_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = custom_path {
        return Some(path.to_path_buf());
    }

    DEFAULT_CONFIG_PATHS
        .iter()
        .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
        .find(|p| p.exists())
}

/// Load config from the given path or default locations, falling back to
/// built-in defaults when no file exists.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    match find_config(custom_path) {
        Some(path) => load_config(&path),
        None => Ok(Config::default()),
    }
}

/// Find an existing config file, or bootstrap a fresh one.
///
/// An explicit path is loaded if it exists and bootstrapped if it does not.
/// Without one, the default locations are searched and a new
/// `./autocompress.toml` is written when none of them exist.
///
/// Returns the config together with the file it came from.
pub fn load_or_bootstrap(custom_path: Option<&Path>) -> Result<(Config, PathBuf)> {
    let path = find_config(custom_path).unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    if path.exists() {
        return Ok((load_config(&path)?, path));
    }
    Ok((bootstrap(&path)?, path))
}

/// Write a default config at `path` and create its input folder.
///
/// The input folder is `to_compress_video` next to the config file.
pub fn bootstrap(path: &Path) -> Result<Config> {
    let base = config_dir(path);
    let folder = base.join(DEFAULT_INPUT_DIR_NAME);

    std::fs::create_dir_all(&folder)
        .with_context(|| format!("Failed to create input folder: {:?}", folder))?;

    // The file keeps the folder relative so the pair can be moved together.
    let mut config = Config::default();
    persist::save_config(path, &config)?;
    tracing::info!("Created default config at {:?}", path);

    config.watch.folder = folder;
    Ok(config)
}

fn config_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn resolve_paths(config: &mut Config, config_path: &Path) {
    let folder = shellexpand::tilde(&config.watch.folder.to_string_lossy()).into_owned();
    let folder = PathBuf::from(folder);
    config.watch.folder = if folder.is_relative() {
        config_dir(config_path).join(folder)
    } else {
        folder
    };
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.watch.extensions.is_empty() {
        anyhow::bail!("watch.extensions must list at least one extension");
    }

    if config
        .watch
        .extensions
        .iter()
        .any(|e| e.trim_start_matches('.').is_empty())
    {
        anyhow::bail!("watch.extensions contains an empty extension");
    }

    let mut components = Path::new(&config.watch.output_dir_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => anyhow::bail!(
            "watch.output_dir_name must be a single directory name, got {:?}",
            config.watch.output_dir_name
        ),
    }

    if config.stability.poll_interval_ms == 0 {
        anyhow::bail!("stability.poll_interval_ms cannot be 0");
    }

    if let Some(max) = config.stability.max_polls {
        if max < 2 {
            anyhow::bail!("stability.max_polls must be at least 2, got {}", max);
        }
    }

    if config.stability.zero_size_polls == 0 {
        anyhow::bail!("stability.zero_size_polls cannot be 0");
    }

    if let Some(ref ffmpeg) = config.tools.ffmpeg_path {
        if !ffmpeg.exists() {
            tracing::warn!("Configured ffmpeg path does not exist: {:?}", ffmpeg);
        }
    }

    Ok(())
}
