use chrono::{DateTime, FixedOffset};
use serde::Deserialize;

/// Entry from `/admin/users/list/active.json?show_emails=true`.
#[derive(Debug, Clone, Deserialize)]
pub struct ActiveUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    /// Only present when emails are revealed to the acting user.
    #[serde(default)]
    pub email: Option<String>,
}

/// Response from `/top.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct TopListResponse {
    pub topic_list: TopicList,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicList {
    #[serde(default)]
    pub topics: Vec<TopicSummary>,
}

/// A topic entry in a topic listing.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicSummary {
    pub id: u64,
    pub title: String,
}

/// Response from `/t/{id}.json` when it is not rate limited.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicDetail {
    pub post_stream: PostStreamData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostStreamData {
    /// Every post identifier in the topic, in display order.
    #[serde(default)]
    pub stream: Vec<u64>,
    /// The posts included in this response.
    #[serde(default)]
    pub posts: Vec<RawPost>,
}

/// A post as returned in a topic's `post_stream.posts`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPost {
    #[serde(default)]
    pub id: Option<u64>,
    pub user_id: i64,
    #[serde(default)]
    pub raw: String,
    #[serde(default)]
    pub cooked: String,
    pub created_at: DateTime<FixedOffset>,
    #[serde(default)]
    pub link_counts: Vec<LinkCount>,
}

/// A link referenced from a post, with Discourse's own internal/external flag.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkCount {
    pub url: String,
    #[serde(default)]
    pub internal: bool,
}

/// A forum post ready to be turned into a mail message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub user_id: i64,
    /// Markdown source of the post.
    pub raw: String,
    /// Rendered HTML, kept alongside the source.
    pub cooked: String,
    pub created_at: DateTime<FixedOffset>,
    /// Internal link URLs in first-seen order, without duplicates.
    pub links: Vec<String>,
}

impl From<RawPost> for Post {
    fn from(raw: RawPost) -> Self {
        let mut links: Vec<String> = Vec::new();
        for link in raw.link_counts.into_iter().filter(|l| l.internal) {
            if !links.contains(&link.url) {
                links.push(link.url);
            }
        }

        Self {
            user_id: raw.user_id,
            raw: raw.raw,
            cooked: raw.cooked,
            created_at: raw.created_at,
            links,
        }
    }
}
