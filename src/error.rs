use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T, E = ArchiveError> = std::result::Result<T, E>;

/// Errors produced while fetching forum data and assembling the archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} returned status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("unexpected response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    #[error("still rate limited on {path} after {attempts} attempts")]
    RateLimitExceeded { path: String, attempts: u32 },

    #[error("user {0} is not in the active user directory")]
    UnknownUser(i64),

    #[error("failed to fetch attachment {url}: {reason}")]
    AttachmentFetch { url: String, reason: String },

    #[error("invalid mail address '{address}': {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    /// Whether this error must stop the whole run, even when topic failures
    /// are otherwise tolerated.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::UnknownUser(_) | Self::InvalidAddress { .. } | Self::Io(_)
        )
    }
}
