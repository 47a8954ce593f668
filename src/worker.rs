//! Background worker: media scans and upload runs off the UI thread.

use crate::{
    config::Config,
    credentials::{CookieFileProvider, CredentialProvider},
    delay::DelayPolicy,
    discovery,
    error::PreconditionError,
    jobs::UploadJob,
    orchestrator::{Orchestrator, RunEvent, RunPlan},
    publisher::HttpPublisher,
};
use anyhow::Result;
use std::{path::PathBuf, sync::Arc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Commands sent from the UI to the worker.
#[derive(Debug)]
pub enum WorkerCmd {
    /// List the videos inside a folder.
    ScanFolder(PathBuf),
    /// Upload a locked queue snapshot.
    StartRun {
        jobs: Vec<UploadJob>,
        delay: DelayPolicy,
    },
    /// Stop after the in-flight upload or during the current delay.
    CancelRun,
    /// Apply updated settings (publisher changes take effect on the next run).
    SaveSettings(Config),
}

/// Events emitted by the worker for UI updates.
#[derive(Clone, Debug)]
pub enum WorkerEvent {
    /// Result of a folder scan.
    MediaDiscovered { dir: PathBuf, files: Vec<PathBuf> },
    /// Progress of the active run.
    Run(RunEvent),
    /// The run never started; the UI unlocks its queue.
    RunRejected(PreconditionError),
    /// Informational log message.
    Log(String),
    /// User-visible error message.
    Error(String),
}

/// Main worker loop: build the orchestrator, then handle commands as they arrive.
pub async fn run(mut rx: mpsc::Receiver<WorkerCmd>, tx: mpsc::Sender<WorkerEvent>, mut cfg: Config) {
    tracing::info!("worker started");

    // The HTTP client is built once and reused by every run.
    let mut orchestrator = match build_orchestrator(&cfg) {
        Ok(o) => Arc::new(o),
        Err(e) => {
            tracing::error!("publisher init failed: {e}");
            let _ = tx
                .send(WorkerEvent::Error(format!("publisher init failed: {e}")))
                .await;
            return;
        }
    };
    let mut stale = false;
    let mut cancel = CancellationToken::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            WorkerCmd::SaveSettings(new_cfg) => {
                tracing::info!("settings updated");
                stale |= new_cfg.publisher != cfg.publisher;
                cfg = new_cfg;
                let _ = tx.send(WorkerEvent::Log("settings updated".into())).await;
            }

            WorkerCmd::ScanFolder(dir) => {
                tracing::info!("scan folder: {}", dir.display());
                let scan_dir = dir.clone();
                let res = tokio::task::spawn_blocking(move || discovery::discover_media(&scan_dir)).await;
                let ev = match res {
                    Ok(Ok(files)) => WorkerEvent::MediaDiscovered { dir, files },
                    Ok(Err(e)) => {
                        tracing::warn!("scan failed: {e}");
                        WorkerEvent::Error(e.to_string())
                    }
                    Err(e) => {
                        tracing::error!("scan task failed: {e}");
                        WorkerEvent::Error(format!("scan failed: {e}"))
                    }
                };
                let _ = tx.send(ev).await;
            }

            WorkerCmd::StartRun { jobs, delay } => {
                if orchestrator.is_active() {
                    tracing::warn!("start ignored: a run is already active");
                    let _ = tx
                        .send(WorkerEvent::RunRejected(PreconditionError::RunAlreadyActive))
                        .await;
                    continue;
                }
                // Rebuild only between runs so the active flag is never split.
                if stale {
                    match build_orchestrator(&cfg) {
                        Ok(o) => {
                            orchestrator = Arc::new(o);
                            stale = false;
                        }
                        Err(e) => {
                            tracing::error!("publisher rebuild failed: {e}");
                            let _ = tx
                                .send(WorkerEvent::Error(format!("publisher rebuild failed: {e}")))
                                .await;
                        }
                    }
                }

                cancel = CancellationToken::new();
                let plan = RunPlan {
                    jobs,
                    credentials: credential_provider(&cfg),
                    delay,
                };
                tokio::spawn(forward_run(
                    Arc::clone(&orchestrator),
                    plan,
                    cancel.clone(),
                    tx.clone(),
                ));
            }

            WorkerCmd::CancelRun => {
                if orchestrator.is_active() {
                    tracing::info!("cancel requested");
                    cancel.cancel();
                    let _ = tx
                        .send(WorkerEvent::Log(
                            "cancel requested, stopping after the current upload".into(),
                        ))
                        .await;
                } else {
                    let _ = tx.send(WorkerEvent::Log("no active run".into())).await;
                }
            }
        }
    }
    // The UI is gone; let an in-flight run stop at its next checkpoint.
    cancel.cancel();
    tracing::info!("worker stopped");
}

fn build_orchestrator(cfg: &Config) -> Result<Orchestrator> {
    let publisher = HttpPublisher::new(cfg.publisher.endpoint.clone(), cfg.publish_timeout())?;
    Ok(Orchestrator::new(Arc::new(publisher)))
}

/// No provider when the cookie path is blank; a missing file fails at load time.
pub fn credential_provider(cfg: &Config) -> Option<Arc<dyn CredentialProvider>> {
    if cfg.session.cookies_file.as_os_str().is_empty() {
        return None;
    }
    Some(Arc::new(CookieFileProvider::new(cfg.session.cookies_file.clone())))
}

/// Drive one run and relay its events to the UI channel.
async fn forward_run(
    orchestrator: Arc<Orchestrator>,
    plan: RunPlan,
    cancel: CancellationToken,
    tx: mpsc::Sender<WorkerEvent>,
) {
    let (run_tx, mut run_rx) = mpsc::channel::<RunEvent>(256);
    let relay_tx = tx.clone();
    let relay = tokio::spawn(async move {
        while let Some(ev) = run_rx.recv().await {
            if relay_tx.send(WorkerEvent::Run(ev)).await.is_err() {
                break;
            }
        }
    });

    let res = orchestrator.run(plan, &cancel, &run_tx).await;
    drop(run_tx);
    // Every run event reaches the UI before a rejection.
    let _ = relay.await;

    if let Err(e) = res {
        tracing::warn!("run not started: {e}");
        let _ = tx.send(WorkerEvent::RunRejected(e)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobQueue;

    #[test]
    fn blank_cookie_path_means_no_provider() {
        let mut cfg = Config::default();
        assert!(credential_provider(&cfg).is_some());
        cfg.session.cookies_file = PathBuf::new();
        assert!(credential_provider(&cfg).is_none());
    }

    #[tokio::test]
    async fn scan_reports_discovered_media() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.mp4"), b"x").expect("write");
        std::fs::write(dir.path().join("notes.txt"), b"x").expect("write");

        let (tx_cmd, rx_cmd) = mpsc::channel(8);
        let (tx_ev, mut rx_ev) = mpsc::channel(8);
        let handle = tokio::spawn(run(rx_cmd, tx_ev, Config::default()));

        tx_cmd
            .send(WorkerCmd::ScanFolder(dir.path().to_path_buf()))
            .await
            .expect("send");
        match rx_ev.recv().await.expect("event") {
            WorkerEvent::MediaDiscovered { files, .. } => {
                assert_eq!(files, vec![dir.path().join("a.mp4")]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        drop(tx_cmd);
        handle.await.expect("join");
    }

    #[tokio::test]
    async fn start_without_cookie_path_is_rejected() {
        let mut cfg = Config::default();
        cfg.session.cookies_file = PathBuf::new();
        let (tx_cmd, rx_cmd) = mpsc::channel(8);
        let (tx_ev, mut rx_ev) = mpsc::channel(8);
        let handle = tokio::spawn(run(rx_cmd, tx_ev, cfg));

        let mut q = JobQueue::new();
        q.add("/videos/a.mp4").expect("add");
        tx_cmd
            .send(WorkerCmd::StartRun {
                jobs: q.snapshot(),
                delay: DelayPolicy::disabled(),
            })
            .await
            .expect("send");

        match rx_ev.recv().await.expect("event") {
            WorkerEvent::RunRejected(e) => assert_eq!(e, PreconditionError::MissingCredential),
            other => panic!("unexpected event: {other:?}"),
        }
        drop(tx_cmd);
        handle.await.expect("join");
    }

    #[tokio::test]
    async fn missing_cookie_file_aborts_the_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = Config::default();
        cfg.session.cookies_file = dir.path().join("cookies.txt");
        let (tx_cmd, rx_cmd) = mpsc::channel(8);
        let (tx_ev, mut rx_ev) = mpsc::channel(32);
        let handle = tokio::spawn(run(rx_cmd, tx_ev, cfg));

        let mut q = JobQueue::new();
        q.add("/videos/a.mp4").expect("add");
        tx_cmd
            .send(WorkerCmd::StartRun {
                jobs: q.snapshot(),
                delay: DelayPolicy::disabled(),
            })
            .await
            .expect("send");

        let mut aborted = false;
        loop {
            match rx_ev.recv().await.expect("event") {
                WorkerEvent::Run(RunEvent::RunAborted { .. }) => aborted = true,
                WorkerEvent::Run(RunEvent::RunFinished(s)) => {
                    assert_eq!(s.completed(), 0);
                    assert!(s.aborted.is_some());
                    break;
                }
                _ => {}
            }
        }
        assert!(aborted);
        drop(tx_cmd);
        handle.await.expect("join");
    }
}
