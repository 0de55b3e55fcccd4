//! Shared constants used across the application.

use std::time::Duration;

/// User agent string sent with API and attachment requests.
pub const USER_AGENT: &str = concat!("discourse-mbox-archiver/", env!("CARGO_PKG_VERSION"));

/// Header carrying the Discourse API key.
pub const API_KEY_HEADER: &str = "Api-Key";

/// Header naming the user the API key acts as.
pub const API_USERNAME_HEADER: &str = "Api-Username";

/// Number of post identifiers requested per post-stream page.
pub const DEFAULT_POSTS_BATCH_SIZE: usize = 20;

/// Upper bound on the batch size accepted in configuration.
pub const MAX_POSTS_BATCH_SIZE: usize = 100;

/// Added on top of the server's `wait_seconds` hint before retrying.
pub const RATE_LIMIT_MARGIN: Duration = Duration::from_secs(1);

/// Ceiling for exponential backoff when the server gives no wait hint.
pub const MAX_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(60);

/// Ceiling for a server-supplied wait hint.
pub const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(3600);

/// MIME type used when an attachment response carries no usable content type.
pub const FALLBACK_MIME: (&str, &str) = ("application", "octet-stream");

/// Filename used when neither the headers nor the URL yield one.
pub const FALLBACK_FILENAME: &str = "attachment";
