use std::fmt;

use tracing::info;

use super::client::ApiClient;
use super::models::TopListResponse;
use super::posts::{PostPaginator, PostStream};
use crate::config::{Config, TopPeriod};
use crate::error::Result;

/// A topic to archive, with its not-yet-started post stream.
pub struct Topic<'a> {
    pub id: u64,
    pub title: String,
    pub posts: PostStream<'a>,
}

impl fmt::Debug for Topic<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topic")
            .field("id", &self.id)
            .field("title", &self.title)
            .finish_non_exhaustive()
    }
}

/// Lists the topics to archive from the forum's top-topics ranking.
#[derive(Debug, Clone, Copy)]
pub struct TopicEnumerator<'a> {
    client: &'a ApiClient,
    paginator: PostPaginator<'a>,
    period: TopPeriod,
    max_topics: Option<usize>,
}

impl<'a> TopicEnumerator<'a> {
    #[must_use]
    pub fn new(
        client: &'a ApiClient,
        paginator: PostPaginator<'a>,
        period: TopPeriod,
        max_topics: Option<usize>,
    ) -> Self {
        Self {
            client,
            paginator,
            period,
            max_topics,
        }
    }

    #[must_use]
    pub fn from_config(client: &'a ApiClient, config: &Config) -> Self {
        Self::new(
            client,
            PostPaginator::from_config(client, config),
            config.top_period,
            config.max_topics,
        )
    }

    /// Fetch the top-topics listing once, in ranking order.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing cannot be fetched or parsed.
    pub async fn list_topics(&self) -> Result<Vec<Topic<'a>>> {
        let listing: TopListResponse = self
            .client
            .get_json("top.json", &[("period", self.period.as_str().to_string())])
            .await?;

        let limit = self.max_topics.unwrap_or(usize::MAX);
        let topics: Vec<Topic<'a>> = listing
            .topic_list
            .topics
            .into_iter()
            .take(limit)
            .map(|summary| Topic {
                id: summary.id,
                posts: self.paginator.posts(summary.id),
                title: summary.title,
            })
            .collect();

        info!(
            topics = topics.len(),
            period = self.period.as_str(),
            "Listed topics to archive"
        );
        Ok(topics)
    }
}
