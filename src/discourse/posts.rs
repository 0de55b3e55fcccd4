//! Lazy, rate-limit aware retrieval of a topic's posts.
//!
//! A topic is read in two phases. The first request returns the topic's
//! full post stream (every post id, in order). The ids are then requested
//! back in fixed-size batches through the `post_stream` filter, and each
//! returned post is yielded as soon as its batch arrives.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_stream::try_stream;
use futures_util::Stream;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::client::{ApiClient, ApiResponse};
use super::models::{Post, TopicDetail};
use crate::config::Config;
use crate::constants::{
    DEFAULT_POSTS_BATCH_SIZE, MAX_RATE_LIMIT_BACKOFF, MAX_RATE_LIMIT_WAIT, RATE_LIMIT_MARGIN,
};
use crate::error::{ArchiveError, Result};

/// Single-pass sequence of a topic's posts, in stream order.
pub type PostStream<'a> = Pin<Box<dyn Stream<Item = Result<Post>> + Send + 'a>>;

/// How rate-limited requests are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Rate-limited responses tolerated per request before giving up.
    pub max_retries: u32,
    /// Added to the server's wait hint.
    pub margin: Duration,
    /// Ceiling for backoff when there is no hint.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            margin: RATE_LIMIT_MARGIN,
            max_backoff: MAX_RATE_LIMIT_BACKOFF,
        }
    }

    /// Delay before retry number `attempt` (starting at 1).
    ///
    /// Hints are capped at [`MAX_RATE_LIMIT_WAIT`].
    #[must_use]
    pub fn delay(&self, hint: Option<Duration>, attempt: u32) -> Duration {
        match hint {
            Some(wait) => wait.min(MAX_RATE_LIMIT_WAIT).saturating_add(self.margin),
            None => {
                let secs = 1_u64.checked_shl(attempt).unwrap_or(u64::MAX);
                Duration::from_secs(secs).min(self.max_backoff)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(10)
    }
}

/// Outcome of one topic-detail request.
#[derive(Debug)]
enum Reply {
    Ready(TopicDetail),
    RateLimited(Option<Duration>),
}

/// Produces lazy post streams for topics.
#[derive(Debug, Clone, Copy)]
pub struct PostPaginator<'a> {
    client: &'a ApiClient,
    batch_size: usize,
    retry: RetryPolicy,
}

impl<'a> PostPaginator<'a> {
    #[must_use]
    pub fn new(client: &'a ApiClient, batch_size: usize, retry: RetryPolicy) -> Self {
        Self {
            client,
            batch_size: if batch_size == 0 {
                DEFAULT_POSTS_BATCH_SIZE
            } else {
                batch_size
            },
            retry,
        }
    }

    #[must_use]
    pub fn from_config(client: &'a ApiClient, config: &Config) -> Self {
        Self::new(
            client,
            config.posts_batch_size,
            RetryPolicy::new(config.rate_limit_max_retries),
        )
    }

    /// Stream the posts of a topic.
    ///
    /// Nothing is requested until the stream is first polled. Once exhausted
    /// (or failed) the stream is done; call again to start over from the
    /// first page.
    #[must_use]
    pub fn posts(&self, topic_id: u64) -> PostStream<'a> {
        Box::pin(self.stream_posts(topic_id))
    }

    fn stream_posts(self, topic_id: u64) -> impl Stream<Item = Result<Post>> + Send + 'a {
        let paginator = self;
        try_stream! {
            let path = format!("t/{topic_id}.json");

            let first = paginator.fetch_detail(&path, &[]).await?;
            let mut pending: VecDeque<u64> = first.post_stream.stream.into();
            debug!(topic_id, posts = pending.len(), "Fetched topic post stream");

            while !pending.is_empty() {
                let take = pending.len().min(paginator.batch_size);
                let batch: Vec<u64> = pending.iter().take(take).copied().collect();

                let detail = paginator.fetch_detail(&path, &batch).await?;
                pending.drain(..take);

                let returned = detail.post_stream.posts.len();
                if returned < batch.len() {
                    debug!(
                        topic_id,
                        requested = batch.len(),
                        returned,
                        "Batch returned fewer posts than requested"
                    );
                }

                for raw in detail.post_stream.posts {
                    yield Post::from(raw);
                }
            }
        }
    }

    /// Request the topic detail, retrying while rate limited.
    async fn fetch_detail(&self, path: &str, ids: &[u64]) -> Result<TopicDetail> {
        let mut query = vec![("include_raw", "true".to_string())];
        query.extend(ids.iter().map(|id| ("post_stream", id.to_string())));

        let mut attempt = 0_u32;
        loop {
            let response = self.client.get(path, &query).await?;
            match classify(response)? {
                Reply::Ready(detail) => return Ok(detail),
                Reply::RateLimited(hint) => {
                    attempt += 1;
                    if attempt > self.retry.max_retries {
                        return Err(ArchiveError::RateLimitExceeded {
                            path: path.to_string(),
                            attempts: attempt,
                        });
                    }
                    let wait = self.retry.delay(hint, attempt);
                    warn!(
                        path,
                        attempt,
                        wait_secs = wait.as_secs_f64(),
                        "Rate limited by forum API, waiting before retry"
                    );
                    sleep(wait).await;
                }
            }
        }
    }
}

/// Decide whether a topic-detail response is usable or rate limited.
///
/// A 429 status is checked first. Otherwise a body without `post_stream` is
/// also treated as rate limited, which is how Discourse has been observed to
/// answer throttled requests.
fn classify(response: ApiResponse) -> Result<Reply> {
    if response.is_rate_limited_status() || response.body.get("post_stream").is_none() {
        return Ok(Reply::RateLimited(wait_hint(&response)));
    }

    serde_json::from_value(response.body)
        .map(Reply::Ready)
        .map_err(|e| ArchiveError::InvalidResponse {
            url: response.url,
            message: e.to_string(),
        })
}

fn wait_hint(response: &ApiResponse) -> Option<Duration> {
    response
        .body
        .pointer("/extras/wait_seconds")
        .and_then(Value::as_f64)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .or(response.retry_after)
}
