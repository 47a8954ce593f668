//! Terminal aggregate of one upload run.

use crate::{
    jobs::{JobStatus, UploadJob},
    path_key::PathKey,
};

/// Result of a completed, cancelled, or aborted run.
///
/// Only jobs that reached a terminal state are counted. Jobs left `Pending`
/// by a cancellation appear in neither count.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded_count: usize,
    pub failed_count: usize,
    /// Failed jobs in queue order with their error message.
    pub failures: Vec<(PathKey, String)>,
    /// The operator stopped the run before every job finished.
    pub cancelled: bool,
    /// Cause when the run was aborted (credential load or fatal publisher error).
    pub aborted: Option<String>,
}

impl RunSummary {
    pub fn from_jobs(jobs: &[UploadJob], cancelled: bool, aborted: Option<String>) -> Self {
        let mut summary = Self {
            cancelled,
            aborted,
            ..Self::default()
        };
        for job in jobs {
            match job.status {
                JobStatus::Succeeded => summary.succeeded_count += 1,
                JobStatus::Failed => {
                    summary.failed_count += 1;
                    let msg = job
                        .last_error
                        .clone()
                        .unwrap_or_else(|| "unknown error".to_string());
                    summary.failures.push((job.path.clone(), msg));
                }
                _ => {}
            }
        }
        summary
    }

    /// Jobs that reached a terminal state.
    pub fn completed(&self) -> usize {
        self.succeeded_count + self.failed_count
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed_count == 0 && self.aborted.is_none() && !self.cancelled
    }

    /// One-line result for the status bar and the CLI.
    pub fn headline(&self) -> String {
        let mut s = format!(
            "{} succeeded, {} failed",
            self.succeeded_count, self.failed_count
        );
        if self.cancelled {
            s.push_str(" (cancelled)");
        }
        if let Some(cause) = &self.aborted {
            s.push_str(&format!(" (aborted: {cause})"));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(path: &str, status: JobStatus, err: Option<&str>) -> UploadJob {
        let mut j = UploadJob::new(PathKey::new(path), 1);
        j.status = status;
        j.last_error = err.map(str::to_string);
        j
    }

    #[test]
    fn counts_only_terminal_jobs() {
        let jobs = vec![
            job("/v/a.mp4", JobStatus::Succeeded, None),
            job("/v/b.mp4", JobStatus::Failed, Some("rate limited")),
            job("/v/c.mp4", JobStatus::Pending, None),
            job("/v/d.mp4", JobStatus::Succeeded, None),
        ];
        let s = RunSummary::from_jobs(&jobs, true, None);
        assert_eq!(s.succeeded_count, 2);
        assert_eq!(s.failed_count, 1);
        assert_eq!(s.completed(), 3);
        assert_eq!(
            s.failures,
            vec![(PathKey::new("/v/b.mp4"), "rate limited".to_string())]
        );
        assert!(!s.all_succeeded());
        assert_eq!(s.headline(), "2 succeeded, 1 failed (cancelled)");
    }

    #[test]
    fn empty_run_after_abort() {
        let s = RunSummary::from_jobs(&[], false, Some("cookie file not found".into()));
        assert_eq!(s.completed(), 0);
        assert!(s.headline().contains("aborted: cookie file not found"));
    }
}
