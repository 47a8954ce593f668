//! Upload run orchestration.
//!
//! Drives a snapshot of the queue through the publisher:
//! - Credential: loaded once per run, shared read-only
//! - Jobs: strictly sequential, in queue order
//! - Pacing: randomized countdown between jobs, cancellable every second

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    credentials::CredentialProvider,
    delay::{DelayPolicy, WaitOutcome},
    error::{PreconditionError, PublishError},
    jobs::{JobId, JobStatus, UploadJob},
    publisher::{PublishRequest, Publisher},
    summary::RunSummary,
};

/// Progress emitted while a run executes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunEvent {
    RunStarted {
        total: usize,
    },
    JobStatusChanged {
        job_id: JobId,
        status: JobStatus,
        error: Option<String>,
    },
    /// A pause of `seconds` begins before the next job.
    DelayStarted {
        seconds: u64,
    },
    /// Remaining seconds of the current pause. Best effort, may be dropped.
    Countdown {
        remaining: u64,
    },
    RunAborted {
        cause: String,
    },
    RunFinished(RunSummary),
}

/// Input of one run.
pub struct RunPlan {
    /// Queue snapshot in execution order.
    pub jobs: Vec<UploadJob>,
    pub credentials: Option<Arc<dyn CredentialProvider>>,
    pub delay: DelayPolicy,
}

/// Executes one run at a time against a publisher.
pub struct Orchestrator {
    publisher: Arc<dyn Publisher>,
    active: Arc<AtomicBool>,
}

/// Clears the active flag on every exit path.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Orchestrator {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self {
            publisher,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Run every job of `plan` and return the summary.
    ///
    /// Precondition failures change nothing and emit no events. Once started,
    /// a summary is always produced, including for aborted and cancelled runs.
    pub async fn run(
        &self,
        plan: RunPlan,
        cancel: &CancellationToken,
        events: &mpsc::Sender<RunEvent>,
    ) -> Result<RunSummary, PreconditionError> {
        let RunPlan {
            mut jobs,
            credentials,
            delay,
        } = plan;

        if self.is_active() {
            return Err(PreconditionError::RunAlreadyActive);
        }
        if jobs.is_empty() {
            return Err(PreconditionError::EmptyQueue);
        }
        let Some(provider) = credentials else {
            return Err(PreconditionError::MissingCredential);
        };
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PreconditionError::RunAlreadyActive);
        }
        let guard = ActiveGuard(Arc::clone(&self.active));

        // Results of an earlier run never leak into this one.
        for job in &mut jobs {
            job.status = JobStatus::Pending;
            job.last_error = None;
        }

        let total = jobs.len();
        info!("upload run started: {total} job(s)");
        emit(events, RunEvent::RunStarted { total }).await;

        // Credential is loaded once, before any job is touched.
        let credential = match provider.load().await {
            Ok(c) => {
                info!(
                    "session loaded from {} ({} cookie(s))",
                    c.source().display(),
                    c.cookies().len()
                );
                Arc::new(c)
            }
            Err(e) => {
                let cause = format!("could not load session from {}: {e}", provider.describe());
                error!("{cause}");
                emit(events, RunEvent::RunAborted { cause: cause.clone() }).await;
                drop(guard);
                return Ok(finish(&jobs, false, Some(cause), events).await);
            }
        };

        let mut cancelled = false;
        let mut aborted = None;

        for idx in 0..total {
            if cancel.is_cancelled() {
                info!("run cancelled before job {}/{total}", idx + 1);
                cancelled = true;
                break;
            }

            let job = &mut jobs[idx];
            transition(job, JobStatus::Preparing, None, events).await;
            let req = PublishRequest {
                path: job.path.as_path().to_path_buf(),
                description: job.effective_description(),
                credential: Arc::clone(&credential),
            };

            info!("[{}/{total}] uploading {}", idx + 1, job.file_name());
            transition(job, JobStatus::Uploading, None, events).await;

            match self.publish_isolated(req).await {
                Ok(()) => {
                    info!("[{}/{total}] uploaded {}", idx + 1, job.file_name());
                    transition(job, JobStatus::Succeeded, None, events).await;
                }
                Err(PublishError::Rejected { message }) => {
                    warn!("[{}/{total}] {} failed: {message}", idx + 1, job.file_name());
                    transition(job, JobStatus::Failed, Some(message), events).await;
                }
                Err(PublishError::Fatal { message }) => {
                    error!("publisher unusable, aborting run: {message}");
                    transition(job, JobStatus::Failed, Some(message.clone()), events).await;
                    // The rest are never attempted.
                    for rest in jobs[idx + 1..].iter_mut() {
                        if rest.status == JobStatus::Pending {
                            transition(rest, JobStatus::Failed, Some(message.clone()), events).await;
                        }
                    }
                    emit(events, RunEvent::RunAborted { cause: message.clone() }).await;
                    aborted = Some(message);
                    break;
                }
            }

            if idx + 1 < total && delay.enabled() {
                let seconds = delay.sample();
                info!("waiting {seconds}s before the next upload");
                emit(events, RunEvent::DelayStarted { seconds }).await;
                let outcome = DelayPolicy::wait(
                    seconds,
                    |remaining| {
                        // Ticks are advisory; a full channel must not stall the countdown.
                        let _ = events.try_send(RunEvent::Countdown { remaining });
                    },
                    cancel,
                )
                .await;
                if outcome == WaitOutcome::CancelledDuringWait {
                    info!("run cancelled during delay");
                    cancelled = true;
                    break;
                }
            }
        }

        // The flag is clear by the time RunFinished is observed.
        drop(guard);
        Ok(finish(&jobs, cancelled, aborted, events).await)
    }

    /// Publish in a separate task so a panicking publisher surfaces as an error.
    async fn publish_isolated(&self, req: PublishRequest) -> Result<(), PublishError> {
        let publisher = Arc::clone(&self.publisher);
        match tokio::spawn(async move { publisher.publish(req).await }).await {
            Ok(r) => r,
            Err(e) => Err(PublishError::fatal(format!("publisher crashed: {e}"))),
        }
    }
}

async fn transition(
    job: &mut UploadJob,
    status: JobStatus,
    error: Option<String>,
    events: &mpsc::Sender<RunEvent>,
) {
    job.status = status;
    job.last_error = error.clone();
    emit(
        events,
        RunEvent::JobStatusChanged {
            job_id: job.id,
            status,
            error,
        },
    )
    .await;
}

async fn finish(
    jobs: &[UploadJob],
    cancelled: bool,
    aborted: Option<String>,
    events: &mpsc::Sender<RunEvent>,
) -> RunSummary {
    let summary = RunSummary::from_jobs(jobs, cancelled, aborted);
    info!("upload run finished: {}", summary.headline());
    emit(events, RunEvent::RunFinished(summary.clone())).await;
    summary
}

async fn emit(events: &mpsc::Sender<RunEvent>, ev: RunEvent) {
    // A closed receiver only means nobody is watching.
    let _ = events.send(ev).await;
}
