use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::load::Config;
use crate::shared::ValidationError;

const fn default_job_poll_max_backoff_secs() -> u64 {
    DriverConfig::DEFAULT_JOB_POLL_MAX_BACKOFF_SECS
}

const fn default_large_table_threshold() -> u64 {
    PreviewConfig::DEFAULT_LARGE_TABLE_THRESHOLD
}

const fn default_sample_percent() -> u8 {
    PreviewConfig::DEFAULT_SAMPLE_PERCENT
}

const fn default_min_sample_percent() -> u8 {
    PreviewConfig::DEFAULT_MIN_SAMPLE_PERCENT
}

const fn default_max_cell_length() -> usize {
    PreviewConfig::DEFAULT_MAX_CELL_LENGTH
}

/// Configuration of the BigQuery storage driver.
///
/// This intentionally does not implement [`Serialize`] to avoid leaking the service account key.
/// Use [`DriverConfigWithoutSecrets`] when the configuration must be logged or returned.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DriverConfig {
    /// Google Cloud project that owns the datasets the driver works on.
    pub project_id: String,
    /// Processing location for query jobs, e.g. `US` or `europe-west1`.
    #[serde(default)]
    pub location: Option<String>,
    /// Service account key (JSON) used to authenticate with BigQuery.
    pub service_account_key: SecretString,
    /// Upper bound in seconds for the wait between two job completion polls.
    ///
    /// The wait grows as `min(2^attempt, job_poll_max_backoff_secs)`.
    #[serde(default = "default_job_poll_max_backoff_secs")]
    pub job_poll_max_backoff_secs: u64,
    /// Table preview settings.
    #[serde(default)]
    pub preview: PreviewConfig,
}

impl DriverConfig {
    /// Default cap for the job polling backoff.
    pub const DEFAULT_JOB_POLL_MAX_BACKOFF_SECS: u64 = 32;

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.project_id.trim().is_empty() {
            return Err(ValidationError::ProjectIdEmpty);
        }

        if self.job_poll_max_backoff_secs == 0 {
            return Err(ValidationError::JobPollMaxBackoffZero);
        }

        self.preview.validate()
    }
}

impl Config for DriverConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

/// Settings for previewing large tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PreviewConfig {
    /// Row count above which an unfiltered preview samples the table.
    #[serde(default = "default_large_table_threshold")]
    pub large_table_threshold: u64,
    /// Sample percentage used for large tables.
    #[serde(default = "default_sample_percent")]
    pub default_sample_percent: u8,
    /// Sample percentage used when the requested limit is a tiny fraction of the table.
    #[serde(default = "default_min_sample_percent")]
    pub min_sample_percent: u8,
    /// Maximum number of characters returned per preview cell.
    #[serde(default = "default_max_cell_length")]
    pub max_cell_length: usize,
}

impl PreviewConfig {
    pub const DEFAULT_LARGE_TABLE_THRESHOLD: u64 = 1_000_000;
    pub const DEFAULT_SAMPLE_PERCENT: u8 = 10;
    pub const DEFAULT_MIN_SAMPLE_PERCENT: u8 = 1;
    pub const DEFAULT_MAX_CELL_LENGTH: usize = 16_384;

    /// Validates sample percentages and cell length.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, value) in [
            ("default_sample_percent", self.default_sample_percent),
            ("min_sample_percent", self.min_sample_percent),
        ] {
            if !(1..=100).contains(&value) {
                return Err(ValidationError::PreviewConfig(format!(
                    "`{name}` must be between 1 and 100, got {value}"
                )));
            }
        }

        if self.min_sample_percent > self.default_sample_percent {
            return Err(ValidationError::PreviewConfig(
                "`min_sample_percent` cannot exceed `default_sample_percent`".to_string(),
            ));
        }

        if self.max_cell_length == 0 {
            return Err(ValidationError::PreviewConfig(
                "`max_cell_length` cannot be zero".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            large_table_threshold: Self::DEFAULT_LARGE_TABLE_THRESHOLD,
            default_sample_percent: Self::DEFAULT_SAMPLE_PERCENT,
            min_sample_percent: Self::DEFAULT_MIN_SAMPLE_PERCENT,
            max_cell_length: Self::DEFAULT_MAX_CELL_LENGTH,
        }
    }
}

/// Same as [`DriverConfig`] without the service account key, safe to serialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DriverConfigWithoutSecrets {
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub job_poll_max_backoff_secs: u64,
    pub preview: PreviewConfig,
}

impl From<DriverConfig> for DriverConfigWithoutSecrets {
    fn from(value: DriverConfig) -> Self {
        let DriverConfig {
            project_id,
            location,
            service_account_key: _,
            job_poll_max_backoff_secs,
            preview,
        } = value;

        Self {
            project_id,
            location,
            job_poll_max_backoff_secs,
            preview,
        }
    }
}
