pub mod capture;
pub mod config;
pub mod error;
pub mod executor;
pub mod job;
pub mod pool;
pub mod profile;
pub mod scan;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod task;
pub mod testutil;

pub use capture::{CaptureSet, JobCaptures, is_manifest_url, normalize_manifest_key};
pub use config::ScannerConfig;
pub use error::AppError;
pub use executor::{ExecutorService, Exporter, JobScanner};
pub use job::{JobStatus, ScanJob, SubmitJobRequest, to_local_naive};
pub use pool::{TaskReport, WorkerPool};
pub use profile::{PassiveProfile, ProfileRegistry, ScanMode, SiteProfile, StepResult};
pub use scan::ScanService;
pub use scheduler::{
    ExecutorLauncher, SchedulerEvent, SchedulerReporter, SchedulerService,
    TracingSchedulerReporter,
};
pub use session::{BrowserSession, SessionFactory};
pub use store::{FsJobStore, JobStore};
pub use task::ScanTask;
