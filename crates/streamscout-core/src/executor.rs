use async_trait::async_trait;

use crate::capture::JobCaptures;
use crate::error::AppError;
use crate::job::{JobStatus, ScanJob};
use crate::store::JobStore;

/// Runs the discovery scan for every site of a job, folding results into
/// the caller's accumulator. Per-visit faults never surface here; an
/// error from this trait is terminal for the job.
#[async_trait]
pub trait JobScanner: Send + Sync {
    async fn scan_job(&self, job: &ScanJob, captures: &mut JobCaptures) -> Result<(), AppError>;
}

/// Delivers the per-site capture mapping once per completed job.
pub trait Exporter: Send + Sync {
    fn export(&self, job: &ScanJob, captures: &JobCaptures) -> Result<(), AppError>;
}

/// Per-job execution wrapper: runs the scanner, delivers results, and
/// finalizes the record to done or failed.
///
/// One executor runs in its own isolated process; a crash here cannot
/// corrupt the scheduler or other jobs. The captures accumulator is owned
/// by the caller, so results gathered before a mid-job failure stay
/// intact for inspection even though the job ends failed.
pub struct ExecutorService<S: JobStore> {
    store: S,
}

impl<S: JobStore> ExecutorService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn run(
        &self,
        job: &ScanJob,
        scanner: &dyn JobScanner,
        exporter: &dyn Exporter,
        captures: &mut JobCaptures,
    ) -> Result<(), AppError> {
        tracing::info!(job_id = %job.job_id, sites = job.sites.len(), "Job started");

        let outcome = match scanner.scan_job(job, captures).await {
            Ok(()) => exporter.export(job, captures),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                self.store
                    .transition(&job.job_id, JobStatus::Running, JobStatus::Done)?;
                tracing::info!(
                    job_id = %job.job_id,
                    sites = captures.site_count(),
                    urls = captures.total_urls(),
                    "Job finished -> done"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(job_id = %job.job_id, error = %e, "Job failed");
                self.store
                    .transition(&job.job_id, JobStatus::Running, JobStatus::Failed)?;
                Err(e)
            }
        }
    }
}
