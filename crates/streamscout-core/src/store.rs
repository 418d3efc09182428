use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};

use crate::error::AppError;
use crate::job::{JobStatus, ScanJob};

/// Durable store for scan job records.
///
/// A record lives in exactly one state directory at a time; moving the
/// record between directories is the state transition. A single scheduler
/// instance is assumed, so no locking beyond the atomic rename is needed.
pub trait JobStore: Send + Sync + Clone {
    /// Persist a new record in `pending`. Fails with [`AppError::Validation`]
    /// if any field is missing, out of range, or `run_at` is not in the future.
    fn put(&self, job: &ScanJob) -> Result<PathBuf, AppError>;

    /// Pending jobs whose `run_at` has arrived. Malformed record files are
    /// logged and skipped (left in place for the next pass). Order is not
    /// guaranteed chronological.
    fn list_due(&self, now: NaiveDateTime) -> Result<Vec<ScanJob>, AppError>;

    /// Atomically move a record between state directories. Fails with
    /// [`AppError::Conflict`] if the record is absent at `from`.
    fn transition(&self, job_id: &str, from: JobStatus, to: JobStatus)
    -> Result<PathBuf, AppError>;

    /// Locate a record by id, returning its current status and contents.
    fn find(&self, job_id: &str) -> Result<Option<(JobStatus, ScanJob)>, AppError>;

    /// Move every `running` record back to `pending` (startup recovery).
    /// Returns the number of records moved.
    fn recover_running(&self) -> Result<usize, AppError>;
}

/// Filesystem-backed job store: `<root>/{pending,running,done,failed}/<job_id>.json`.
#[derive(Debug, Clone)]
pub struct FsJobStore {
    root: PathBuf,
}

impl FsJobStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, AppError> {
        let store = Self { root: root.into() };
        for status in JobStatus::ALL {
            fs::create_dir_all(store.state_dir(status))?;
        }
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self, status: JobStatus) -> PathBuf {
        self.root.join(status.dir_name())
    }

    pub fn record_path(&self, status: JobStatus, job_id: &str) -> PathBuf {
        self.state_dir(status).join(format!("{job_id}.json"))
    }

    /// Read and parse a record file.
    pub fn load(path: &Path) -> Result<ScanJob, AppError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn list_records(&self, status: JobStatus) -> Result<Vec<PathBuf>, AppError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(self.state_dir(status))? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

impl JobStore for FsJobStore {
    fn put(&self, job: &ScanJob) -> Result<PathBuf, AppError> {
        job.validate(Local::now().naive_local())?;
        let path = self.record_path(JobStatus::Pending, &job.job_id);
        let raw = serde_json::to_string_pretty(job)?;
        fs::write(&path, raw)?;
        Ok(path)
    }

    fn list_due(&self, now: NaiveDateTime) -> Result<Vec<ScanJob>, AppError> {
        let mut due = Vec::new();
        for path in self.list_records(JobStatus::Pending)? {
            match Self::load(&path) {
                Ok(job) if job.is_due(now) => due.push(job),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping malformed job record");
                }
            }
        }
        Ok(due)
    }

    fn transition(
        &self,
        job_id: &str,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<PathBuf, AppError> {
        let src = self.record_path(from, job_id);
        if !src.exists() {
            return Err(AppError::Conflict {
                job_id: job_id.to_string(),
                from: from.to_string(),
            });
        }
        let dst = self.record_path(to, job_id);
        fs::rename(&src, &dst)?;
        Ok(dst)
    }

    fn find(&self, job_id: &str) -> Result<Option<(JobStatus, ScanJob)>, AppError> {
        for status in JobStatus::ALL {
            let path = self.record_path(status, job_id);
            if path.exists() {
                return Ok(Some((status, Self::load(&path)?)));
            }
        }
        Ok(None)
    }

    fn recover_running(&self) -> Result<usize, AppError> {
        let mut moved = 0;
        for path in self.list_records(JobStatus::Running)? {
            let Some(name) = path.file_name() else {
                continue;
            };
            let dst = self.state_dir(JobStatus::Pending).join(name);
            fs::rename(&path, &dst)?;
            tracing::info!(record = %dst.display(), "Returned orphaned running job to pending");
            moved += 1;
        }
        Ok(moved)
    }
}
