//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! Mocks use `Arc<Mutex<_>>`/atomics for interior mutability, allowing
//! assertions on recorded calls.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, TimeDelta};

use crate::capture::{CaptureSet, JobCaptures};
use crate::config::ScannerConfig;
use crate::error::AppError;
use crate::executor::{Exporter, JobScanner};
use crate::job::ScanJob;
use crate::profile::{ScanMode, SiteProfile, StepResult};
use crate::scheduler::{ExecutorLauncher, SchedulerEvent, SchedulerReporter};
use crate::session::{BrowserSession, SessionFactory};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A valid job due five minutes from now.
pub fn future_job(id: &str) -> ScanJob {
    let now = Local::now().naive_local();
    ScanJob {
        job_id: id.to_string(),
        sites: vec!["https://plain-site.test".into()],
        visits_per_site: 3,
        max_workers: 2,
        run_at: now + TimeDelta::minutes(5),
        created_at: now,
    }
}

/// Config with all waits shrunk to keep async tests fast.
pub fn fast_config() -> ScannerConfig {
    ScannerConfig {
        capture_rounds: 1,
        capture_wait: Duration::from_millis(1),
        round_pause: Duration::from_millis(1),
        refresh_delay: Duration::from_millis(1),
        poll_interval: Duration::from_millis(5),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// MockSession / MockSessionFactory
// ---------------------------------------------------------------------------

/// Mock browser session replaying scripted network-event batches.
/// Each `events()` call pops the next batch.
pub struct MockSession {
    batches: VecDeque<Vec<String>>,
    fail_navigate: bool,
    fail_events: bool,
    closed: Arc<AtomicUsize>,
    cleared: Arc<AtomicUsize>,
    navigations: Arc<Mutex<Vec<String>>>,
    evaluated: Arc<Mutex<Vec<String>>>,
}

impl MockSession {
    pub fn scripted(batches: Vec<Vec<String>>) -> Self {
        Self {
            batches: batches.into(),
            fail_navigate: false,
            fail_events: false,
            closed: Arc::new(AtomicUsize::new(0)),
            cleared: Arc::new(AtomicUsize::new(0)),
            navigations: Arc::new(Mutex::new(Vec::new())),
            evaluated: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Scripts run through `evaluate`, in call order.
    pub fn evaluated(&self) -> Vec<String> {
        self.evaluated.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn navigate(&mut self, url: &str) -> Result<(), AppError> {
        self.navigations.lock().unwrap().push(url.to_string());
        if self.fail_navigate {
            return Err(AppError::Session("navigation refused".into()));
        }
        Ok(())
    }

    async fn events(&mut self) -> Result<Vec<String>, AppError> {
        if self.fail_events {
            return Err(AppError::Session("event stream lost".into()));
        }
        Ok(self.batches.pop_front().unwrap_or_default())
    }

    async fn clear_events(&mut self) -> Result<(), AppError> {
        self.cleared.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn evaluate(&mut self, js: &str) -> Result<(), AppError> {
        self.evaluated.lock().unwrap().push(js.to_string());
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), AppError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory producing [`MockSession`]s from a shared batch template, with
/// shared counters so tests can assert on sessions opened/closed across
/// a whole round.
pub struct MockSessionFactory {
    batches: Vec<Vec<String>>,
    fail_open: bool,
    fail_navigate: bool,
    fail_events: bool,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
    cleared: Arc<AtomicUsize>,
    navigations: Arc<Mutex<Vec<String>>>,
}

impl MockSessionFactory {
    /// Every opened session replays these event batches.
    pub fn scripted(batches: Vec<Vec<String>>) -> Self {
        Self {
            batches,
            fail_open: false,
            fail_navigate: false,
            fail_events: false,
            opened: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
            cleared: Arc::new(AtomicUsize::new(0)),
            navigations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::scripted(vec![])
        }
    }

    pub fn failing_navigate(mut self) -> Self {
        self.fail_navigate = true;
        self
    }

    pub fn failing_events(mut self) -> Self {
        self.fail_events = true;
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn cleared(&self) -> usize {
        self.cleared.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    async fn open(&self, _filter_pattern: &str) -> Result<Box<dyn BrowserSession>, AppError> {
        if self.fail_open {
            return Err(AppError::Session("browser unavailable".into()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            batches: self.batches.clone().into(),
            fail_navigate: self.fail_navigate,
            fail_events: self.fail_events,
            closed: Arc::clone(&self.closed),
            cleared: Arc::clone(&self.cleared),
            navigations: Arc::clone(&self.navigations),
            evaluated: Arc::new(Mutex::new(Vec::new())),
        }))
    }
}

// ---------------------------------------------------------------------------
// MockProfile
// ---------------------------------------------------------------------------

/// Mock site profile with configurable mode and step results; records
/// every step call into a shared log.
pub struct MockProfile {
    mode: ScanMode,
    step: StepResult,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockProfile {
    /// Fresh-visit profile whose steps all complete.
    pub fn fresh() -> Self {
        Self {
            mode: ScanMode::FreshVisits,
            step: StepResult::Completed,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Single-session (refresh-forcing) profile.
    pub fn single_session(refresh_rounds: u32) -> Self {
        Self {
            mode: ScanMode::SingleSession { refresh_rounds },
            step: StepResult::Completed,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Profile whose every activation step fails.
    pub fn failing_all(reason: &str) -> Self {
        Self {
            mode: ScanMode::FreshVisits,
            step: StepResult::failed(reason),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Shared handle to the call log, for asserting after the profile has
    /// been moved into an `Arc<dyn SiteProfile>`.
    pub fn call_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }

    fn record(&self, step: &str) -> StepResult {
        self.calls.lock().unwrap().push(step.to_string());
        self.step.clone()
    }
}

#[async_trait]
impl SiteProfile for MockProfile {
    fn name(&self) -> &str {
        "mock"
    }

    fn mode(&self) -> ScanMode {
        self.mode
    }

    async fn activate(&self, _session: &mut dyn BrowserSession) -> StepResult {
        self.record("activate")
    }

    async fn attempt_start(&self, _session: &mut dyn BrowserSession) -> StepResult {
        self.record("attempt_start")
    }

    async fn dismiss_ads(&self, _session: &mut dyn BrowserSession) -> StepResult {
        self.record("dismiss_ads")
    }

    async fn refresh(&self, _session: &mut dyn BrowserSession) -> StepResult {
        self.calls.lock().unwrap().push("refresh".to_string());
        StepResult::Completed
    }
}

// ---------------------------------------------------------------------------
// MockLauncher
// ---------------------------------------------------------------------------

/// Mock executor launcher recording launched job ids.
#[derive(Clone)]
pub struct MockLauncher {
    launched: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self {
            launched: Arc::new(Mutex::new(Vec::new())),
            fail: false,
        }
    }

    /// Launcher whose every launch attempt fails.
    pub fn failing() -> Self {
        Self {
            launched: Arc::new(Mutex::new(Vec::new())),
            fail: true,
        }
    }

    pub fn launched(&self) -> Vec<String> {
        self.launched.lock().unwrap().clone()
    }
}

impl Default for MockLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorLauncher for MockLauncher {
    fn launch(&self, job: &ScanJob) -> Result<(), AppError> {
        self.launched.lock().unwrap().push(job.job_id.clone());
        if self.fail {
            return Err(AppError::Generic("spawn failed".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockSchedulerReporter
// ---------------------------------------------------------------------------

/// Scheduler reporter that records event labels.
#[derive(Default)]
pub struct MockSchedulerReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockSchedulerReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, label: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.as_str() == label)
            .count()
    }
}

impl SchedulerReporter for MockSchedulerReporter {
    fn report(&self, event: SchedulerEvent<'_>) {
        let label = match &event {
            SchedulerEvent::Started => "Started",
            SchedulerEvent::Recovered { .. } => "Recovered",
            SchedulerEvent::Pass { .. } => "Pass",
            SchedulerEvent::JobDispatched { .. } => "JobDispatched",
            SchedulerEvent::DispatchFailed { .. } => "DispatchFailed",
            SchedulerEvent::PassFailed { .. } => "PassFailed",
            SchedulerEvent::Stopped => "Stopped",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// MockScanner / MockExporter
// ---------------------------------------------------------------------------

/// Mock job scanner: credits every site with one discovered URL, with an
/// optional hard failure at a given site index.
pub struct MockScanner {
    url: String,
    fail_at: Option<usize>,
    scanned: Arc<Mutex<Vec<String>>>,
}

impl MockScanner {
    pub fn discovering(url: &str) -> Self {
        Self {
            url: url.to_string(),
            fail_at: None,
            scanned: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fail while working on the site at `index` (0-based), after earlier
    /// sites have already been merged.
    pub fn failing_at_site(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn scanned(&self) -> Vec<String> {
        self.scanned.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobScanner for MockScanner {
    async fn scan_job(&self, job: &ScanJob, captures: &mut JobCaptures) -> Result<(), AppError> {
        for (index, site) in job.sites.iter().enumerate() {
            if self.fail_at == Some(index) {
                return Err(AppError::Session(format!("tab crashed scanning {site}")));
            }
            let mut discovered = CaptureSet::new();
            discovered.insert(self.url.clone());
            captures.merge_site(site, &discovered);
            self.scanned.lock().unwrap().push(site.clone());
        }
        Ok(())
    }
}

/// Mock exporter counting deliveries.
pub struct MockExporter {
    exported: AtomicUsize,
    fail: bool,
}

impl MockExporter {
    pub fn new() -> Self {
        Self {
            exported: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            exported: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn exported(&self) -> usize {
        self.exported.load(Ordering::SeqCst)
    }
}

impl Default for MockExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Exporter for MockExporter {
    fn export(&self, _job: &ScanJob, _captures: &JobCaptures) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::Export("results disk unwritable".into()));
        }
        self.exported.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
