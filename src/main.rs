mod cli;

use autocompress::config;
use autocompress::pipeline::Submission;
use autocompress::report::ResultRecorder;
use autocompress::service::CompressService;
use autocompress::state::PipelineEvent;
use autocompress_av::FfmpegTranscoder;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "autocompress=debug,autocompress_av=debug".to_string()
        } else {
            "autocompress=info,autocompress_av=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Watch {
            folder,
            open,
            json_report,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(watch(
                cli.config.as_deref(),
                folder,
                open,
                json_report.as_deref(),
            ))
        }
        Commands::Run { input } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_file(&input, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("autocompress {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn locate_ffmpeg(config: &config::Config) -> Result<FfmpegTranscoder> {
    FfmpegTranscoder::locate(config.tools.ffmpeg_path.as_deref())
        .context("ffmpeg is required; run `autocompress check-tools`")
}

async fn watch(
    config_path: Option<&Path>,
    folder: Option<PathBuf>,
    open: bool,
    json_report: Option<&Path>,
) -> Result<()> {
    let (mut config, used_path) = config::load_or_bootstrap(config_path)?;
    if let Some(folder) = folder {
        config.watch.folder = folder;
    }

    let transcoder = locate_ffmpeg(&config)?;
    tracing::info!("Using encoder: {:?}", transcoder.program());

    let service = CompressService::start(&config, Arc::new(transcoder))?;

    println!("Config: {}", used_path.display());
    println!(
        "Watching {} for new .{} files",
        service.folder().display(),
        config.watch.extensions.join(", .")
    );
    println!("Compressed files go to {}", service.output_dir().display());
    println!("Press Ctrl-C to stop.\n");

    if open {
        open_folder(service.folder());
    }

    let mut events = service.subscribe();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                res.context("Failed to listen for Ctrl-C")?;
                println!("\nStopping...");
                break;
            }
            event = events.recv() => match event {
                Ok(event) if event.is_terminal() => println!("{}", service.report()),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Missed {} pipeline events", skipped);
                    println!("{}", service.report());
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    let recorder = service.shutdown().await?;
    println!("{}", recorder.render_report());

    if let Some(path) = json_report {
        write_json_report(&recorder, path)?;
    }

    Ok(())
}

async fn run_file(input: &Path, config_path: Option<&Path>) -> Result<()> {
    if !input.is_file() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }
    let input = std::fs::canonicalize(input)
        .with_context(|| format!("Failed to resolve input path: {:?}", input))?;

    let mut config = config::load_config_or_default(config_path)?;

    // The file is processed where it is, whatever its extension.
    let Some(ext) = input.extension().map(|e| e.to_string_lossy().into_owned()) else {
        anyhow::bail!("Input file has no extension: {:?}", input);
    };
    config.watch.folder = input
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    config.watch.extensions = vec![ext];

    let transcoder = locate_ffmpeg(&config)?;
    let service = CompressService::start_unwatched(&config, Arc::new(transcoder))?;
    let mut events = service.subscribe();

    let id = match service.handle().submit_path(&input) {
        Submission::Queued(id) => id,
        other => anyhow::bail!("Could not queue {:?}: {:?}", input, other),
    };

    println!("Compressing {}...", input.display());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                res.context("Failed to listen for Ctrl-C")?;
                break;
            }
            event = events.recv() => match event {
                Ok(event) if event.is_terminal() && event.job_id() == id => break,
                Err(RecvError::Lagged(_)) if !service.handle().is_active(&input) => break,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    let recorder = service.shutdown().await?;
    println!("{}", recorder.render_report());

    if let Some(failure) = recorder.failures().first() {
        anyhow::bail!(
            "Failed to compress {} during {}: {}",
            failure.original_name,
            failure.kind,
            failure.message
        );
    }

    Ok(())
}

fn write_json_report(recorder: &ResultRecorder, path: &Path) -> Result<()> {
    let json = recorder
        .to_json()
        .context("Failed to serialize report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write JSON report: {:?}", path))?;
    println!("JSON report written to {}", path.display());
    Ok(())
}

/// Open `path` in the platform file browser. Failures are only logged.
fn open_folder(path: &Path) {
    let program = if cfg!(target_os = "windows") {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };

    let spawned = tokio::process::Command::new(program)
        .arg(path)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn();

    if let Err(e) = spawned {
        tracing::warn!("Could not open {:?} with {}: {}", path, program, e);
    }
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let configured = config::load_config_or_default(config_path)
        .ok()
        .and_then(|c| c.tools.ffmpeg_path);
    let tools = autocompress_av::check_tools(configured.as_deref());
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("ffmpeg is missing. Install it or set tools.ffmpeg_path in the config.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let Some(path) = config::find_config(path) else {
        println!("No config file found, using defaults");
        let config = config::Config::default();
        print_summary(&config);
        return Ok(());
    };

    println!("Validating config: {:?}", path);
    let config = config::load_config(&path)?;
    println!("✓ Configuration is valid");
    print_summary(&config);

    Ok(())
}

fn print_summary(config: &config::Config) {
    println!("  Watch folder: {}", config.watch.folder.display());
    println!("  Extensions: {}", config.watch.extensions.join(", "));
    println!("  Output folder: {}", config.watch.output_dir().display());
    println!("  Process existing files: {}", config.watch.process_existing);
    println!("  Poll interval: {} ms", config.stability.poll_interval_ms);
    match config.stability.max_polls {
        Some(max) => println!("  Max polls: {}", max),
        None => println!("  Max polls: unlimited"),
    }
    println!("  Empty-file polls: {}", config.stability.zero_size_polls);
    match config.stability.io_retries {
        Some(retries) => println!("  I/O retries: {}", retries),
        None => println!("  I/O retries: unlimited"),
    }
    println!(
        "  Remove partial output: {}",
        config.output.cleanup_partial_output
    );
    if let Some(ref ffmpeg) = config.tools.ffmpeg_path {
        println!("  ffmpeg: {}", ffmpeg.display());
    }
}
