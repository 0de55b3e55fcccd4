use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::constants::{DEFAULT_POSTS_BATCH_SIZE, MAX_POSTS_BATCH_SIZE};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Discourse API
    pub api_key: String,
    pub api_username: String,
    pub api_base: Url,
    pub http_timeout: Duration,

    // Topic selection
    pub top_period: TopPeriod,
    pub max_topics: Option<usize>,

    // Pagination
    pub posts_batch_size: usize,
    pub rate_limit_max_retries: u32,

    // Mail output
    pub list_name: String,
    pub message_id_domain: String,
    pub mbox_path: PathBuf,

    // Failure policy
    pub attachment_failure: AttachmentFailure,
    pub continue_on_topic_error: bool,
}

/// Period of the "top topics" listing used to pick what gets archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopPeriod {
    All,
    Yearly,
    Quarterly,
    Monthly,
    Weekly,
    Daily,
}

impl TopPeriod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Yearly => "yearly",
            Self::Quarterly => "quarterly",
            Self::Monthly => "monthly",
            Self::Weekly => "weekly",
            Self::Daily => "daily",
        }
    }
}

/// What to do when a single attachment cannot be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentFailure {
    /// Log a warning and build the message without that attachment
    Skip,
    /// Fail the whole message
    Abort,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_base = parse_base_url(&required_env("API_BASE")?)?;
        let message_id_domain = optional_env("MESSAGE_ID_DOMAIN")
            .or_else(|| api_base.host_str().map(ToString::to_string))
            .unwrap_or_else(|| "localhost".to_string());

        Ok(Self {
            // Discourse API
            api_key: required_env("API_KEY")?,
            api_username: env_or_default("API_USERNAME", "system"),
            api_base,
            http_timeout: Duration::from_secs(parse_env_u64("HTTP_TIMEOUT_SECS", 30)?),

            // Topic selection
            top_period: parse_top_period(&env_or_default("TOP_PERIOD", "all"))?,
            max_topics: parse_env_optional_usize("MAX_TOPICS")?,

            // Pagination
            posts_batch_size: parse_env_usize("POSTS_BATCH_SIZE", DEFAULT_POSTS_BATCH_SIZE)?,
            rate_limit_max_retries: parse_env_u32("RATE_LIMIT_MAX_RETRIES", 10)?,

            // Mail output
            list_name: required_env("LIST_NAME")?,
            message_id_domain,
            mbox_path: PathBuf::from(env_or_default("MBOX_PATH", "archive.mbox")),

            // Failure policy
            attachment_failure: parse_attachment_failure(&env_or_default(
                "ATTACHMENT_FAILURE",
                "skip",
            ))?,
            continue_on_topic_error: parse_env_bool("CONTINUE_ON_TOPIC_ERROR", false)?,
        })
    }

    /// Configuration pointing at the given forum base URL, for tests.
    ///
    /// # Panics
    ///
    /// Panics if `api_base` is not a valid URL.
    #[must_use]
    pub fn for_testing(api_base: &str) -> Self {
        Self {
            api_key: "test-key".to_string(),
            api_username: "system".to_string(),
            api_base: parse_base_url(api_base).expect("test base URL must parse"),
            http_timeout: Duration::from_secs(10),
            top_period: TopPeriod::All,
            max_topics: None,
            posts_batch_size: DEFAULT_POSTS_BATCH_SIZE,
            rate_limit_max_retries: 10,
            list_name: "archive@lists.example.com".to_string(),
            message_id_domain: "forum.example.com".to_string(),
            mbox_path: PathBuf::from("archive.mbox"),
            attachment_failure: AttachmentFailure::Skip,
            continue_on_topic_error: false,
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "API_KEY".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if !self.api_key.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(ConfigError::InvalidValue {
                name: "API_KEY".to_string(),
                message: "must be printable ASCII without spaces".to_string(),
            });
        }
        if self.api_username.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "API_USERNAME".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.list_name.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "LIST_NAME".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.posts_batch_size == 0 || self.posts_batch_size > MAX_POSTS_BATCH_SIZE {
            return Err(ConfigError::InvalidValue {
                name: "POSTS_BATCH_SIZE".to_string(),
                message: format!("must be between 1 and {MAX_POSTS_BATCH_SIZE}"),
            });
        }
        if self.rate_limit_max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                name: "RATE_LIMIT_MAX_RETRIES".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.max_topics == Some(0) {
            return Err(ConfigError::InvalidValue {
                name: "MAX_TOPICS".to_string(),
                message: "must be at least 1 when set".to_string(),
            });
        }
        if self.http_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "HTTP_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Parse the forum base URL, making sure relative API paths join under it.
fn parse_base_url(value: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(value).map_err(|e| ConfigError::InvalidValue {
        name: "API_BASE".to_string(),
        message: format!("'{value}' is not a valid URL: {e}"),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            name: "API_BASE".to_string(),
            message: format!("must be an http(s) URL, got '{value}'"),
        });
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    Ok(parse_env_optional_usize(name)?.unwrap_or(default))
}

fn parse_env_optional_usize(name: &str) -> Result<Option<usize>, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => {
            val.parse()
                .map(Some)
                .map_err(|e| ConfigError::ParseInt {
                    name: name.to_string(),
                    source: e,
                })
        }
        _ => Ok(None),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}

fn parse_top_period(value: &str) -> Result<TopPeriod, ConfigError> {
    match value.to_lowercase().as_str() {
        "all" => Ok(TopPeriod::All),
        "yearly" => Ok(TopPeriod::Yearly),
        "quarterly" => Ok(TopPeriod::Quarterly),
        "monthly" => Ok(TopPeriod::Monthly),
        "weekly" => Ok(TopPeriod::Weekly),
        "daily" => Ok(TopPeriod::Daily),
        _ => Err(ConfigError::InvalidValue {
            name: "TOP_PERIOD".to_string(),
            message: format!(
                "must be one of all, yearly, quarterly, monthly, weekly, daily, got '{value}'"
            ),
        }),
    }
}

fn parse_attachment_failure(value: &str) -> Result<AttachmentFailure, ConfigError> {
    match value.to_lowercase().as_str() {
        "skip" => Ok(AttachmentFailure::Skip),
        "abort" => Ok(AttachmentFailure::Abort),
        _ => Err(ConfigError::InvalidValue {
            name: "ATTACHMENT_FAILURE".to_string(),
            message: format!("must be 'skip' or 'abort', got '{value}'"),
        }),
    }
}
