use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The BigQuery project id is empty.
    #[error("`project_id` cannot be empty")]
    ProjectIdEmpty,
    /// The job polling backoff cap must be at least one second.
    #[error("`job_poll_max_backoff_secs` cannot be zero")]
    JobPollMaxBackoffZero,
    /// A sample percentage is outside `1..=100` or the minimum exceeds the default.
    #[error("Invalid preview config: {0}")]
    PreviewConfig(String),
}
