//! Headless uploader: publishes every video in a folder, one at a time.
//!
//! Meant to be called by other tools once a batch of videos is ready.
//! Progress goes to stdout, details to `auto_upload.log`.

use clap::Parser;
use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use upload_tui::{
    config::Config,
    credentials::{CookieFileProvider, default_cookie_candidates, find_cookie_file},
    delay::format_countdown,
    discovery,
    jobs::{JobId, JobQueue, JobStatus},
    logging,
    orchestrator::{Orchestrator, RunEvent, RunPlan},
    publisher::HttpPublisher,
    summary::RunSummary,
};

const LOG_FILE: &str = "auto_upload.log";

/// Upload all videos in a folder with the saved session cookies
#[derive(Parser, Debug)]
#[command(name = "auto_upload")]
#[command(version)]
#[command(about = "Upload every video in a folder, one at a time")]
struct Args {
    /// Folder containing the videos
    #[arg(value_name = "FOLDER")]
    folder: Option<PathBuf>,

    /// Config file providing endpoint and delay settings
    #[arg(long, value_name = "PATH", default_value = "config.toml")]
    config: PathBuf,
}

/// Everything validated before the first upload.
struct Prepared {
    cfg: Config,
    queue: JobQueue,
    cookies: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Logging is best effort for a headless run.
    let _log_guard = match logging::init_file_logging(LOG_FILE) {
        Ok(g) => Some(g),
        Err(e) => {
            eprintln!("Warning: {e}");
            None
        }
    };

    let prepared = match prepare(&args, &default_cookie_candidates()) {
        Ok(p) => p,
        Err(msg) => {
            tracing::error!("{msg}");
            eprintln!("Error: {msg}");
            return ExitCode::from(1);
        }
    };

    match upload(prepared).await {
        Ok(summary) => {
            report(&summary);
            ExitCode::SUCCESS
        }
        Err(msg) => {
            tracing::error!("{msg}");
            eprintln!("Error: {msg}");
            ExitCode::from(1)
        }
    }
}

/// Validate arguments and build the queue - separated for testability
fn prepare(args: &Args, cookie_candidates: &[PathBuf]) -> Result<Prepared, String> {
    let Some(folder) = &args.folder else {
        return Err("usage: auto_upload <FOLDER>".to_string());
    };
    if !folder.is_dir() {
        return Err(format!("folder not found: {}", folder.display()));
    }

    let files = discovery::discover_media(folder).map_err(|e| e.to_string())?;
    if files.is_empty() {
        return Err(format!("no video files in {}", folder.display()));
    }

    let cookies = find_cookie_file(cookie_candidates).ok_or_else(|| {
        "cookies.txt not found; place it in the working directory or its parent".to_string()
    })?;

    let cfg = load_config(&args.config)?;

    let mut queue = JobQueue::new();
    queue.extend_from(&files).map_err(|e| e.to_string())?;
    let ids: Vec<_> = queue.iter().map(|j| (j.id, hashtag(&j.path.file_stem()))).collect();
    for (id, tag) in ids {
        queue.set_description(id, tag).map_err(|e| e.to_string())?;
    }

    Ok(Prepared {
        cfg,
        queue,
        cookies,
    })
}

/// Existing config only; a headless run never writes one.
fn load_config(path: &Path) -> Result<Config, String> {
    if path.exists() {
        Config::load_or_default(path).map_err(|e| format!("invalid config {}: {e}", path.display()))
    } else {
        Ok(Config::default())
    }
}

/// `#stem` with spaces removed.
fn hashtag(stem: &str) -> String {
    format!("#{}", stem.replace(' ', ""))
}

async fn upload(prepared: Prepared) -> Result<RunSummary, String> {
    let Prepared {
        cfg,
        mut queue,
        cookies,
    } = prepared;
    println!("{} video(s) found. Uploading...", queue.len());

    let publisher = HttpPublisher::new(cfg.publisher.endpoint.clone(), cfg.publish_timeout())
        .map_err(|e| format!("publisher init failed: {e}"))?;
    let orchestrator = Orchestrator::new(Arc::new(publisher));

    queue.lock();
    let plan = RunPlan {
        jobs: queue.snapshot(),
        credentials: Some(Arc::new(CookieFileProvider::new(cookies))),
        delay: cfg.delay_policy(),
    };

    // Ctrl+C stops after the current upload.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Cancelling after the current upload...");
            on_signal.cancel();
        }
    });

    let (tx, mut rx) = mpsc::channel::<RunEvent>(256);
    let names: Vec<_> = queue.iter().map(|j| (j.id, j.file_name())).collect();
    let printer = tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            print_event(&ev, &names);
        }
    });

    let res = orchestrator.run(plan, &cancel, &tx).await;
    drop(tx);
    let _ = printer.await;
    res.map_err(|e| e.to_string())
}

fn print_event(ev: &RunEvent, names: &[(JobId, String)]) {
    let name = |id: JobId| {
        names
            .iter()
            .position(|(i, _)| *i == id)
            .map(|idx| (idx + 1, names[idx].1.as_str()))
            .unwrap_or((0, "?"))
    };
    match ev {
        RunEvent::JobStatusChanged {
            job_id,
            status: JobStatus::Uploading,
            ..
        } => {
            let (n, file) = name(*job_id);
            println!("[{n}/{}] uploading {file}", names.len());
        }
        RunEvent::JobStatusChanged {
            job_id,
            status: JobStatus::Failed,
            error,
        } => {
            let (n, file) = name(*job_id);
            println!(
                "[{n}/{}] failed {file}: {}",
                names.len(),
                error.as_deref().unwrap_or("unknown error")
            );
        }
        RunEvent::DelayStarted { seconds } => {
            println!("waiting {} before the next upload", format_countdown(*seconds));
        }
        RunEvent::RunAborted { cause } => println!("aborted: {cause}"),
        _ => {}
    }
}

fn report(summary: &RunSummary) {
    println!();
    if summary.failures.is_empty() {
        if summary.all_succeeded() {
            println!("All videos uploaded successfully!");
        } else {
            println!("Stopped early: {}", summary.headline());
        }
        return;
    }
    println!("{} video(s) could not be uploaded:", summary.failures.len());
    for (path, _) in &summary.failures {
        println!("  - {path}");
    }
}
