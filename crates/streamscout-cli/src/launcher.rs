use std::fs::{self, File};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use chrono::Local;
use streamscout_core::error::AppError;
use streamscout_core::job::ScanJob;
use streamscout_core::scheduler::ExecutorLauncher;

/// Launches one executor process per claimed job.
///
/// The child runs this same binary's `execute` subcommand with its
/// stdout/stderr redirected to a per-job log file. The scheduler never
/// waits on the child: a crashed or hung executor affects only its own
/// job record.
pub struct SubprocessLauncher {
    program: PathBuf,
    logs_dir: PathBuf,
}

impl SubprocessLauncher {
    pub fn new(program: impl Into<PathBuf>, logs_dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let logs_dir = logs_dir.into();
        fs::create_dir_all(&logs_dir)?;
        Ok(Self {
            program: program.into(),
            logs_dir,
        })
    }

    /// Launcher that re-invokes the currently running binary.
    pub fn from_current_exe(logs_dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let program = std::env::current_exe()
            .map_err(|e| AppError::Config(format!("Cannot resolve own executable path: {e}")))?;
        Self::new(program, logs_dir)
    }
}

impl ExecutorLauncher for SubprocessLauncher {
    fn launch(&self, job: &ScanJob) -> Result<(), AppError> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let log_path = self.logs_dir.join(format!("{}_{stamp}.log", job.job_id));
        let stdout_log = File::create(&log_path)?;
        let stderr_log = stdout_log.try_clone()?;

        let child = Command::new(&self.program)
            .arg("execute")
            .arg("--job-id")
            .arg(&job.job_id)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_log))
            .stderr(Stdio::from(stderr_log))
            .spawn()
            .map_err(|e| {
                AppError::Generic(format!("Failed to spawn executor for {}: {e}", job.job_id))
            })?;

        tracing::info!(
            job_id = %job.job_id,
            pid = child.id(),
            log = %log_path.display(),
            "Executor launched"
        );
        Ok(())
    }
}
