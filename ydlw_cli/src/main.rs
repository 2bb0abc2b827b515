use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;

use ydlw_core::{
    DownloadError, DownloadSession, Downloader, InfoDict, LogEngineLogger, ParamOverrides,
    WrapperConfig,
};

mod terminal_observer;
use terminal_observer::TerminalProgressObserver;

#[derive(Parser)]
#[command(name = "ydlw", about = "Download media through yt-dlp with progress and cancellation")]
struct Args {
    /// Page or media URL to download
    #[arg(short, long, required_unless_present = "info", conflicts_with = "info")]
    url: Option<String>,

    /// Resolved info JSON (as written by `yt-dlp --write-info-json`)
    #[arg(short, long)]
    info: Option<PathBuf>,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Format selector passed to the engine
    #[arg(short, long)]
    format: Option<String>,

    /// Stop the download after this many seconds
    #[arg(short = 'd', long)]
    max_duration: Option<u64>,

    /// Send yt-dlp text output to the log instead of the terminal
    #[arg(long)]
    log_engine: bool,
}

fn load_descriptor(args: &Args) -> Result<InfoDict, DownloadError> {
    if let Some(path) = &args.info {
        let text = std::fs::read_to_string(path)?;
        return Ok(serde_json::from_str(&text)?);
    }
    let mut info = InfoDict::new();
    if let Some(url) = &args.url {
        info.insert("url".to_string(), serde_json::Value::String(url.clone()));
    }
    Ok(info)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match WrapperConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => WrapperConfig::from_env(),
    };

    let info = match load_descriptor(&args) {
        Ok(info) => info,
        Err(e) => {
            eprintln!("Failed to read descriptor: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let session = Arc::new(DownloadSession::new());
    session.set_duration_limit(args.max_duration.map(Duration::from_secs));

    let observer = TerminalProgressObserver::new();
    session.set_callback(Some(observer.callback()));

    // First Ctrl-C cancels at the next progress event, the second one aborts.
    let signal_session = Arc::clone(&session);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("[ydlw] cancel requested");
            signal_session.request_cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("[ydlw] abort requested");
            signal_session.abort_signal().cancel();
        }
    });

    let overrides = ParamOverrides {
        format: args.format.clone(),
        ..ParamOverrides::default()
    };

    let mut downloader = Downloader::ytdlp(config, Arc::clone(&session));
    if args.log_engine {
        // A construction failure resurfaces from the download call below.
        if let Ok(ytdl) = downloader.get_ytdl().await {
            ytdl.set_logger(Some(Arc::new(LogEngineLogger)));
        }
    }
    let start = Instant::now();

    match downloader.download_with_params(info, &overrides).await {
        Ok(result) => {
            let path = result
                .get("filepath")
                .and_then(|p| p.as_str())
                .unwrap_or("(unknown)");
            observer.finish(format!(
                "Done in {:.2}s: {}",
                start.elapsed().as_secs_f64(),
                path
            ));
            ExitCode::SUCCESS
        }
        Err(DownloadError::Canceled(reason)) => {
            observer.abandon(format!("Canceled ({})", reason));
            ExitCode::from(130)
        }
        Err(e) => {
            observer.abandon(format!("Failed: {}", e));
            ExitCode::FAILURE
        }
    }
}
