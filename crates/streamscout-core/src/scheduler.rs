use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio_util::sync::CancellationToken;

use crate::config::ScannerConfig;
use crate::error::AppError;
use crate::job::{JobStatus, ScanJob};
use crate::store::JobStore;

/// Launches an isolated executor for a claimed job.
///
/// The fault boundary: the scheduler never blocks on or shares memory
/// with a launched executor, and has no channel to learn its outcome.
pub trait ExecutorLauncher: Send + Sync {
    fn launch(&self, job: &ScanJob) -> Result<(), AppError>;
}

/// Events emitted by the scheduler for monitoring/logging.
#[derive(Debug)]
pub enum SchedulerEvent<'a> {
    Started,
    Recovered { jobs: usize },
    Pass { due: usize },
    JobDispatched { job: &'a ScanJob },
    DispatchFailed { job_id: &'a str, error: &'a AppError },
    PassFailed { error: &'a AppError },
    Stopped,
}

/// Receives scheduler events (decoupled logging).
pub trait SchedulerReporter: Send + Sync {
    fn report(&self, event: SchedulerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSchedulerReporter;

impl SchedulerReporter for TracingSchedulerReporter {
    fn report(&self, event: SchedulerEvent<'_>) {
        match event {
            SchedulerEvent::Started => {
                tracing::info!("Scheduler started");
            }
            SchedulerEvent::Recovered { jobs } => {
                tracing::info!(%jobs, "Recovered orphaned running jobs");
            }
            SchedulerEvent::Pass { due } => {
                tracing::debug!(%due, "Polling pass");
            }
            SchedulerEvent::JobDispatched { job } => {
                tracing::info!(job_id = %job.job_id, sites = job.sites.len(), "Job dispatched");
            }
            SchedulerEvent::DispatchFailed { job_id, error } => {
                tracing::warn!(%job_id, %error, "Dispatch failed; job will not be retried this pass");
            }
            SchedulerEvent::PassFailed { error } => {
                tracing::error!(%error, "Scheduler pass failed; continuing at next interval");
            }
            SchedulerEvent::Stopped => {
                tracing::info!("Scheduler stopped");
            }
        }
    }
}

/// Single-instance poll loop over the pending directory.
///
/// Holds no per-job state: each pass enumerates due pending jobs,
/// claims them (pending → running) and hands them to the launcher. A job
/// once running is never revisited; completion is the executor's business.
pub struct SchedulerService<S, L>
where
    S: JobStore,
    L: ExecutorLauncher,
{
    store: S,
    launcher: L,
    poll_interval: Duration,
    recover_on_start: bool,
}

impl<S, L> SchedulerService<S, L>
where
    S: JobStore,
    L: ExecutorLauncher,
{
    pub fn new(store: S, launcher: L, config: &ScannerConfig) -> Self {
        Self {
            store,
            launcher,
            poll_interval: config.poll_interval,
            recover_on_start: config.recover_on_start,
        }
    }

    /// One polling pass at `now`. Returns the number of jobs dispatched.
    ///
    /// Every error is absorbed here: a failed claim or launch is reported
    /// and the pass moves on to the remaining due jobs.
    pub fn run_once<R: SchedulerReporter>(&self, now: NaiveDateTime, reporter: &R) -> usize {
        let due = match self.store.list_due(now) {
            Ok(due) => due,
            Err(e) => {
                reporter.report(SchedulerEvent::PassFailed { error: &e });
                return 0;
            }
        };
        reporter.report(SchedulerEvent::Pass { due: due.len() });

        let mut dispatched = 0;
        for job in &due {
            match self.dispatch(job) {
                Ok(()) => {
                    reporter.report(SchedulerEvent::JobDispatched { job });
                    dispatched += 1;
                }
                Err(e) => {
                    reporter.report(SchedulerEvent::DispatchFailed {
                        job_id: &job.job_id,
                        error: &e,
                    });
                }
            }
        }
        dispatched
    }

    fn dispatch(&self, job: &ScanJob) -> Result<(), AppError> {
        // Claim first: a Conflict here means the record moved under us and
        // this dispatch attempt is abandoned.
        self.store
            .transition(&job.job_id, JobStatus::Pending, JobStatus::Running)?;
        self.launcher.launch(job)
    }

    /// Run the poll loop until cancellation.
    pub async fn run<R: SchedulerReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &R,
    ) -> Result<(), AppError> {
        reporter.report(SchedulerEvent::Started);

        if self.recover_on_start {
            match self.store.recover_running() {
                Ok(jobs) => reporter.report(SchedulerEvent::Recovered { jobs }),
                Err(e) => reporter.report(SchedulerEvent::PassFailed { error: &e }),
            }
        }

        loop {
            if cancel_token.is_cancelled() {
                break;
            }
            self.run_once(Local::now().naive_local(), reporter);

            tokio::select! {
                () = tokio::time::sleep(self.poll_interval) => {}
                () = cancel_token.cancelled() => break,
            }
        }

        reporter.report(SchedulerEvent::Stopped);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FsJobStore;
    use crate::testutil::{MockLauncher, MockSchedulerReporter, future_job};
    use chrono::TimeDelta;

    fn scheduler_with(
        launcher: MockLauncher,
    ) -> (tempfile::TempDir, SchedulerService<FsJobStore, MockLauncher>) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsJobStore::open(dir.path().join("jobs")).unwrap();
        let config = ScannerConfig {
            poll_interval: Duration::from_millis(5),
            ..Default::default()
        };
        (dir, SchedulerService::new(store, launcher, &config))
    }

    #[test]
    fn test_dispatches_due_jobs_exactly_once() {
        let (_dir, scheduler) = scheduler_with(MockLauncher::new());
        let job = future_job("job_due");
        scheduler.store.put(&job).unwrap();

        let reporter = MockSchedulerReporter::new();

        // Not yet due: nothing happens.
        let before = job.run_at - TimeDelta::minutes(1);
        assert_eq!(scheduler.run_once(before, &reporter), 0);

        // Due: dispatched and moved to running.
        let after = job.run_at + TimeDelta::minutes(1);
        assert_eq!(scheduler.run_once(after, &reporter), 1);
        let (status, _) = scheduler.store.find("job_due").unwrap().unwrap();
        assert_eq!(status, JobStatus::Running);

        // Never revisited.
        assert_eq!(scheduler.run_once(after, &reporter), 0);
        assert_eq!(scheduler.launcher.launched(), vec!["job_due"]);
    }

    #[test]
    fn test_launch_failure_does_not_stop_the_pass() {
        let (_dir, scheduler) = scheduler_with(MockLauncher::failing());
        let a = future_job("job_a");
        let b = future_job("job_b");
        scheduler.store.put(&a).unwrap();
        scheduler.store.put(&b).unwrap();

        let reporter = MockSchedulerReporter::new();
        let now = a.run_at + TimeDelta::minutes(1);
        let dispatched = scheduler.run_once(now, &reporter);

        assert_eq!(dispatched, 0);
        // Both jobs were still attempted in the same pass.
        let mut attempts = scheduler.launcher.launched();
        attempts.sort();
        assert_eq!(attempts, vec!["job_a", "job_b"]);
        assert_eq!(reporter.count("DispatchFailed"), 2);
    }

    #[test]
    fn test_malformed_record_is_skipped_and_pass_continues() {
        let (_dir, scheduler) = scheduler_with(MockLauncher::new());
        let job = future_job("job_ok");
        scheduler.store.put(&job).unwrap();
        std::fs::write(
            scheduler
                .store
                .state_dir(JobStatus::Pending)
                .join("job_broken.json"),
            "not json at all",
        )
        .unwrap();

        let reporter = MockSchedulerReporter::new();
        let now = job.run_at + TimeDelta::minutes(1);
        assert_eq!(scheduler.run_once(now, &reporter), 1);
        // The malformed record is retried on the next pass.
        assert!(
            scheduler
                .store
                .state_dir(JobStatus::Pending)
                .join("job_broken.json")
                .exists()
        );
    }

    #[tokio::test]
    async fn test_loop_stops_on_cancellation() {
        let (_dir, scheduler) = scheduler_with(MockLauncher::new());
        let reporter = MockSchedulerReporter::new();
        let cancel = CancellationToken::new();

        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stopper.cancel();
        });

        scheduler.run(cancel, &reporter).await.unwrap();
        assert_eq!(reporter.count("Started"), 1);
        assert_eq!(reporter.count("Stopped"), 1);
    }

    #[tokio::test]
    async fn test_recovery_runs_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsJobStore::open(dir.path().join("jobs")).unwrap();
        let job = future_job("job_orphan");
        store.put(&job).unwrap();
        store
            .transition("job_orphan", JobStatus::Pending, JobStatus::Running)
            .unwrap();

        let config = ScannerConfig {
            poll_interval: Duration::from_millis(5),
            recover_on_start: true,
            ..Default::default()
        };
        let scheduler = SchedulerService::new(store.clone(), MockLauncher::new(), &config);
        let reporter = MockSchedulerReporter::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        scheduler.run(cancel, &reporter).await.unwrap();
        assert_eq!(reporter.count("Recovered"), 1);
        let (status, _) = store.find("job_orphan").unwrap().unwrap();
        assert_eq!(status, JobStatus::Pending);
    }
}
