use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

/// Runtime tuning for the scheduler and scan orchestrator.
///
/// Read from `STREAMSCOUT_*` environment variables with sensible defaults;
/// every knob the scan loop uses lives here rather than in module-level
/// constants.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Root for job records, per-job logs, and exported results.
    pub data_dir: PathBuf,
    /// Fixed sleep between scheduler passes.
    pub poll_interval: Duration,
    /// Visits per site when a submission does not specify one.
    pub default_visits: u32,
    /// Worker cap when a submission does not specify one.
    pub worker_cap: usize,
    /// Number of short capture polls after activation.
    pub capture_rounds: u32,
    /// Wait per capture poll.
    pub capture_wait: Duration,
    /// Pause between scan rounds of the same site.
    pub round_pause: Duration,
    /// In-session sub-rounds for single-session profiles.
    pub refresh_rounds: u32,
    /// Wait after a refresh action before recapturing.
    pub refresh_delay: Duration,
    /// Network filter handed to the session factory.
    pub filter_pattern: String,
    /// Move orphaned `running` records back to `pending` at startup.
    pub recover_on_start: bool,
    /// Run the browser headless.
    pub headless: bool,
    /// Optional selectors file for scripted site profiles.
    pub selectors_path: Option<PathBuf>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            poll_interval: Duration::from_secs(10),
            default_visits: 8,
            worker_cap: 5,
            capture_rounds: 10,
            capture_wait: Duration::from_millis(1200),
            round_pause: Duration::from_millis(1500),
            refresh_rounds: 6,
            refresh_delay: Duration::from_millis(3000),
            filter_pattern: ".m3u8".into(),
            recover_on_start: false,
            headless: true,
            selectors_path: None,
        }
    }
}

impl ScannerConfig {
    /// Read configuration from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();
        Ok(Self {
            data_dir: std::env::var("STREAMSCOUT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            poll_interval: env_duration_secs("STREAMSCOUT_POLL_INTERVAL", defaults.poll_interval)?,
            default_visits: env_number("STREAMSCOUT_DEFAULT_VISITS", defaults.default_visits)?,
            worker_cap: env_number("STREAMSCOUT_WORKER_CAP", defaults.worker_cap)?,
            capture_rounds: env_number("STREAMSCOUT_CAPTURE_ROUNDS", defaults.capture_rounds)?,
            capture_wait: env_duration_ms("STREAMSCOUT_CAPTURE_WAIT_MS", defaults.capture_wait)?,
            round_pause: env_duration_ms("STREAMSCOUT_ROUND_PAUSE_MS", defaults.round_pause)?,
            refresh_rounds: env_number("STREAMSCOUT_REFRESH_ROUNDS", defaults.refresh_rounds)?,
            refresh_delay: env_duration_ms("STREAMSCOUT_REFRESH_DELAY_MS", defaults.refresh_delay)?,
            filter_pattern: std::env::var("STREAMSCOUT_FILTER_PATTERN")
                .unwrap_or(defaults.filter_pattern),
            recover_on_start: env_bool("STREAMSCOUT_RECOVER_ON_START", defaults.recover_on_start)?,
            headless: env_bool("STREAMSCOUT_HEADLESS", defaults.headless)?,
            selectors_path: std::env::var("STREAMSCOUT_SELECTORS").ok().map(PathBuf::from),
        })
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.data_dir.join("jobs")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs").join("jobs")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.data_dir.join("results")
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, AppError> {
    raw.parse().map_err(|_| {
        AppError::Config(format!("Invalid {name} '{raw}': must be a positive integer"))
    })
}

fn env_number<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match std::env::var(name) {
        Ok(raw) => parse_number(name, &raw),
        Err(_) => Ok(default),
    }
}

fn env_duration_secs(name: &str, default: Duration) -> Result<Duration, AppError> {
    Ok(env_number(name, default.as_secs()).map(Duration::from_secs)?)
}

fn env_duration_ms(name: &str, default: Duration) -> Result<Duration, AppError> {
    Ok(env_number(name, default.as_millis() as u64).map(Duration::from_millis)?)
}

fn env_bool(name: &str, default: bool) -> Result<bool, AppError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(AppError::Config(format!(
                "Invalid {name} '{raw}': expected true/false"
            ))),
        },
    }
}
