use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use clap::Parser;
use error::AppError;
use indicatif::MultiProgress;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use vodium_engine::{DownloadOutcome, DownloaderConfig, HlsVodBuilder};

mod cli;
mod error;
mod utils;

use cli::CliArgs;
use utils::progress::ProgressManager;
use utils::{format_bytes, parse_headers};

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    let args = CliArgs::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open("vodium.log")?;

    let multi_writer = MakeWriterExt::and(std::io::stdout, log_file);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(multi_writer)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    info!("Vodium HLS VOD downloader v{}", env!("CARGO_PKG_VERSION"));

    if args.url.trim().is_empty() {
        return Err(AppError::InvalidInput("playlist URL is empty".to_string()));
    }
    if args.threads == Some(0) {
        return Err(AppError::InvalidInput(
            "--threads must be at least 1".to_string(),
        ));
    }

    info!(
        "HTTP timeout configuration: overall={}s, connect={}s",
        args.timeout, args.connect_timeout
    );

    let mut base = DownloaderConfig::builder()
        .with_timeout(Duration::from_secs(args.timeout))
        .with_connect_timeout(Duration::from_secs(args.connect_timeout))
        .with_follow_redirects(!args.no_redirects)
        .with_headers(parse_headers(&args.headers));
    if let Some(user_agent) = &args.user_agent {
        base = base.with_user_agent(user_agent.clone());
    }
    if let Some(cookie) = &args.cookie {
        base = base.with_cookie(cookie.clone());
    }
    if let Some(referer) = &args.referer {
        base = base.with_referer(referer.clone());
    }

    let output_dir = match args.output_dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    let progress_manager = if args.show_progress {
        ProgressManager::new(MultiProgress::new())
    } else {
        ProgressManager::new_disabled()
    };

    // Fraction reached before the run ended, for the failure line.
    let last_progress = Arc::new(AtomicU64::new(0f64.to_bits()));
    let on_progress = {
        let last_progress = last_progress.clone();
        let progress_manager = progress_manager.clone();
        Arc::new(move |event: vodium_engine::DownloadEvent| {
            if !event.state.is_terminal() {
                last_progress.store(event.progress.to_bits(), Ordering::Relaxed);
            }
            progress_manager.handle_event(event);
        })
    };

    let mut builder = HlsVodBuilder::new()
        .with_base_config(base.build())
        .max_segment_attempts(args.retries)
        .output_dir(output_dir)
        .file_name(args.name.clone())
        .force(args.force)
        .on_progress(on_progress);
    if let Some(threads) = args.threads {
        builder = builder.download_concurrency(threads);
    }
    let downloader = builder.build()?;

    let token = CancellationToken::new();
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after in-flight segments");
            ctrl_c_token.cancel();
        }
    });

    let staging_dir = downloader.config().output_config.staging_dir();

    match downloader.download(&args.url, &token).await {
        Ok(DownloadOutcome::Completed { path, bytes }) => {
            println!("Done: {} ({})", path.display(), format_bytes(bytes));
            Ok(())
        }
        Ok(DownloadOutcome::Partial { completed, total }) => {
            let reason = format!("{completed}/{total} segments downloaded");
            let fraction = completed as f64 / total.max(1) as f64;
            println!("{}", failure_line(&reason, fraction, Some(&staging_dir)));
            Err(AppError::Incomplete { completed, total })
        }
        Err(e) => {
            let kept = tokio::fs::try_exists(&staging_dir).await.unwrap_or(false);
            let staging = kept.then_some(staging_dir.as_path());
            println!(
                "{}",
                failure_line(&e.to_string(), last_fraction(&last_progress), staging)
            );
            Err(e.into())
        }
    }
}

/// Terminal status line for a run that did not produce the output. The resume hint is
/// only given when staged segments are left on disk.
fn failure_line(reason: &str, fraction: f64, staging: Option<&Path>) -> String {
    let mut line = format!("Failed at {:.1}%: {reason}", fraction * 100.0);
    if let Some(dir) = staging {
        line.push_str(&format!(
            "; staged segments are kept in {}, run the same command again to resume",
            dir.display()
        ));
    }
    line
}

fn last_fraction(progress: &AtomicU64) -> f64 {
    f64::from_bits(progress.load(Ordering::Relaxed))
}
