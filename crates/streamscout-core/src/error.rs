use thiserror::Error;

/// Application-wide error types for streamscout.
#[derive(Error, Debug)]
pub enum AppError {
    /// Job record is malformed or out of range.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A store transition found no record at the expected location.
    #[error("Conflict: job '{job_id}' is not {from}")]
    Conflict { job_id: String, from: String },

    /// Filesystem operation on the job store failed.
    #[error("Store error: {0}")]
    Store(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Browser session fault (launch, navigation, capture).
    #[error("Session error: {0}")]
    Session(String),

    /// Configuration value missing or invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// Operation timed out.
    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    /// Result delivery to the export boundary failed.
    #[error("Export error: {0}")]
    Export(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error means the record was claimed elsewhere.
    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::Conflict { .. })
    }

    /// Returns true for malformed-record errors the scheduler should skip
    /// and retry on a later pass.
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Store(e.to_string())
    }
}
