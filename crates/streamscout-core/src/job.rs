use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Allowed range for `visits_per_site`.
pub const VISITS_RANGE: std::ops::RangeInclusive<u32> = 1..=20;
/// Allowed range for `max_workers`.
pub const WORKERS_RANGE: std::ops::RangeInclusive<usize> = 1..=10;

/// Status of a scan job, derived from which state directory holds its record.
///
/// The record file itself never carries a status field; moving the file
/// between directories *is* the state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    /// Directory name under the job store root holding records in this state.
    pub fn dir_name(&self) -> &'static str {
        self.as_str()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Done,
        JobStatus::Failed,
    ];
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// Minute-resolution timestamp format used in job records ("2025-12-30 14:25").
pub mod minute_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M";

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(D::Error::custom)
    }
}

/// Second-resolution timestamp format used for `created_at`.
pub mod second_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(D::Error::custom)
    }
}

/// A durable scan job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJob {
    pub job_id: String,
    /// Target sites, scanned in listed order.
    pub sites: Vec<String>,
    pub visits_per_site: u32,
    pub max_workers: usize,
    /// Scheduled start, local naive time at minute resolution.
    #[serde(with = "minute_format")]
    pub run_at: NaiveDateTime,
    #[serde(with = "second_format")]
    pub created_at: NaiveDateTime,
}

impl ScanJob {
    /// Check field constraints: at least one non-empty site, ranges, and a
    /// strictly future `run_at` relative to `now`.
    pub fn validate(&self, now: NaiveDateTime) -> Result<(), AppError> {
        if self.job_id.is_empty() {
            return Err(AppError::Validation("job_id must not be empty".into()));
        }
        if self.sites.is_empty() {
            return Err(AppError::Validation(
                "at least one site is required".into(),
            ));
        }
        if let Some(site) = self.sites.iter().find(|s| s.trim().is_empty()) {
            return Err(AppError::Validation(format!(
                "empty site entry: {site:?}"
            )));
        }
        if !VISITS_RANGE.contains(&self.visits_per_site) {
            return Err(AppError::Validation(format!(
                "visits_per_site must be in {}..={}, got {}",
                VISITS_RANGE.start(),
                VISITS_RANGE.end(),
                self.visits_per_site
            )));
        }
        if !WORKERS_RANGE.contains(&self.max_workers) {
            return Err(AppError::Validation(format!(
                "max_workers must be in {}..={}, got {}",
                WORKERS_RANGE.start(),
                WORKERS_RANGE.end(),
                self.max_workers
            )));
        }
        if self.run_at <= now {
            return Err(AppError::Validation(format!(
                "run_at must be in the future (run_at={}, now={})",
                self.run_at.format(minute_format::FORMAT),
                now.format(second_format::FORMAT)
            )));
        }
        Ok(())
    }

    /// True once the scheduled time has arrived.
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        self.run_at <= now
    }

    /// Record file name inside a state directory.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.job_id)
    }
}

/// A scan request as submitted by the intake surface.
#[derive(Debug, Clone)]
pub struct SubmitJobRequest {
    pub sites: Vec<String>,
    pub visits_per_site: u32,
    pub max_workers: usize,
    /// Already normalized to local naive time (see [`to_local_naive`]).
    pub run_at: NaiveDateTime,
}

impl SubmitJobRequest {
    pub fn new(sites: Vec<String>, run_at: NaiveDateTime) -> Self {
        Self {
            sites,
            visits_per_site: 1,
            max_workers: 1,
            run_at,
        }
    }

    pub fn with_visits(mut self, visits: u32) -> Self {
        self.visits_per_site = visits;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    /// Build the durable record: fresh id, minute-truncated `run_at`.
    pub fn into_job(self, now: NaiveDateTime) -> ScanJob {
        ScanJob {
            job_id: format!("job_{}", Uuid::new_v4().simple()),
            sites: self.sites,
            visits_per_site: self.visits_per_site,
            max_workers: self.max_workers,
            run_at: truncate_to_minute(self.run_at),
            created_at: now,
        }
    }
}

/// Normalize a timezone-qualified timestamp to local naive time.
pub fn to_local_naive(dt: DateTime<FixedOffset>) -> NaiveDateTime {
    dt.with_timezone(&Local).naive_local()
}

fn truncate_to_minute(dt: NaiveDateTime) -> NaiveDateTime {
    dt.with_second(0)
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn valid_job() -> ScanJob {
        ScanJob {
            job_id: "job_0123456789abcdef".into(),
            sites: vec!["https://plain-site.test".into()],
            visits_per_site: 3,
            max_workers: 2,
            run_at: at(12, 30),
            created_at: at(10, 0),
        }
    }

    #[test]
    fn test_status_roundtrip() {
        for status in JobStatus::ALL {
            let parsed: JobStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_validate_accepts_future_job() {
        assert!(valid_job().validate(at(10, 0)).is_ok());
    }

    #[test]
    fn test_validate_rejects_past_run_at() {
        let job = valid_job();
        let err = job.validate(at(12, 30)).unwrap_err();
        assert!(err.is_validation());
        assert!(job.validate(at(14, 0)).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_sites() {
        let mut job = valid_job();
        job.sites.clear();
        assert!(job.validate(at(10, 0)).unwrap_err().is_validation());
    }

    #[test]
    fn test_validate_rejects_out_of_range_fields() {
        let mut job = valid_job();
        job.visits_per_site = 0;
        assert!(job.validate(at(10, 0)).is_err());
        job.visits_per_site = 21;
        assert!(job.validate(at(10, 0)).is_err());

        let mut job = valid_job();
        job.max_workers = 0;
        assert!(job.validate(at(10, 0)).is_err());
        job.max_workers = 11;
        assert!(job.validate(at(10, 0)).is_err());
    }

    #[test]
    fn test_record_roundtrip_minute_resolution() {
        let job = valid_job();
        let raw = serde_json::to_string(&job).unwrap();
        assert!(raw.contains("\"2026-03-01 12:30\""));
        let back: ScanJob = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.run_at, job.run_at);
        assert_eq!(back.sites, job.sites);
    }

    #[test]
    fn test_submit_request_builds_record() {
        let req = SubmitJobRequest::new(vec!["https://a.test".into()], at(15, 45))
            .with_visits(5)
            .with_workers(3);
        let job = req.into_job(at(9, 0));
        assert!(job.job_id.starts_with("job_"));
        assert_eq!(job.job_id.len(), "job_".len() + 32);
        assert_eq!(job.visits_per_site, 5);
        assert_eq!(job.max_workers, 3);
        assert_eq!(job.run_at, at(15, 45));
        assert!(job.validate(at(9, 0)).is_ok());
    }

    #[test]
    fn test_due_check() {
        let job = valid_job();
        assert!(!job.is_due(at(12, 29)));
        assert!(job.is_due(at(12, 30)));
        assert!(job.is_due(at(13, 0)));
    }
}
