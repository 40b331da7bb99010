use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Largest page size the listing API accepts
pub const MAX_PAGE_SIZE: u32 = 50;

/// Credentials for the podcast host
#[derive(Debug, Clone, Default)]
pub struct HostCredentials {
    pub api_key: String,
    pub podcast_id: String,
}

/// Every secret or destination a job needs
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Key for the video platform's listing API
    pub youtube_api_key: String,
    /// Destination bucket; also the host part of public audio URLs
    pub bucket: String,
    pub host: HostCredentials,
}

impl Credentials {
    /// Reject missing values before any network call is made
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("youtube_api_key", &self.youtube_api_key),
            ("bucket", &self.bucket),
            ("host.api_key", &self.host.api_key),
            ("host.podcast_id", &self.host.podcast_id),
        ];

        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(name));
            }
        }

        if self.bucket.contains('/') {
            return Err(ConfigError::Invalid {
                name: "bucket",
                reason: "must not contain '/'".to_string(),
            });
        }

        Ok(())
    }
}

/// Retry policy for transient publish rejections
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry, doubled for each further retry
    pub delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryConfig {
    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// How the publisher waits for the host to finish processing an episode
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    /// Maximum number of status checks; `None` polls until cancelled
    pub max_attempts: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: Some(360),
        }
    }
}

/// Resolved configuration for one conversion job
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    pub credentials: Credentials,
    /// Root for job-scoped download directories
    pub work_dir: PathBuf,
    /// Prefix for object keys in the bucket
    pub storage_key_prefix: String,
    pub youtube_api_base: String,
    pub host_api_base: String,
    pub page_size: u32,
    /// Maximum number of videos taken from the listing
    pub limit: Option<usize>,
    pub publish_retry: RetryConfig,
    pub poll: PollConfig,
    /// Make episodes live once the host has processed them
    pub publish_when_ready: bool,
    /// Remove the audio object from storage once the host has processed it
    pub delete_uploaded_audio: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            work_dir: PathBuf::from("downloaded"),
            storage_key_prefix: "podcast".to_string(),
            youtube_api_base: "https://www.googleapis.com/youtube/v3".to_string(),
            host_api_base: "https://www.buzzsprout.com".to_string(),
            page_size: MAX_PAGE_SIZE,
            limit: None,
            publish_retry: RetryConfig::default(),
            poll: PollConfig::default(),
            publish_when_ready: false,
            delete_uploaded_audio: false,
        }
    }
}

impl ConversionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.credentials.validate()?;

        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid {
                name: "page_size",
                reason: format!("must be between 1 and {MAX_PAGE_SIZE}"),
            });
        }
        if self.publish_retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "publish_retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}
