//! The archive run: topics, then posts, then messages, strictly in order.

use futures_util::StreamExt;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::discourse::{ApiClient, Topic, TopicEnumerator, UserDirectory};
use crate::error::Result;
use crate::mail::{AttachmentResolver, MailAssembler};
use crate::mbox::ArchiveSink;

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub topics: usize,
    pub messages: usize,
    pub attachments: usize,
    pub skipped_attachments: usize,
    pub failed_topics: usize,
}

/// Id of the last message written for the current topic.
///
/// Each new message replies to exactly this one, so a topic becomes a single
/// linear chain whatever the forum's own reply structure.
#[derive(Debug, Default)]
pub struct ReplyChain {
    last: Option<String>,
}

impl ReplyChain {
    #[must_use]
    pub fn previous(&self) -> Option<&str> {
        self.last.as_deref()
    }

    pub fn advance(&mut self, message_id: String) {
        self.last = Some(message_id);
    }
}

/// Drives a complete export from the forum into a sink.
#[derive(Debug)]
pub struct Archiver {
    config: Config,
    client: ApiClient,
    resolver: AttachmentResolver,
}

impl Archiver {
    /// # Errors
    ///
    /// Returns an error if the HTTP clients cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        let client = ApiClient::new(&config)?;
        let resolver = AttachmentResolver::new(&config)?;
        Ok(Self {
            config,
            client,
            resolver,
        })
    }

    /// Archive every listed topic into `sink`.
    ///
    /// # Errors
    ///
    /// Returns the first error that ends a topic, unless
    /// `continue_on_topic_error` is set and the error is not fatal, in which
    /// case the topic is counted as failed and the run moves on.
    pub async fn run<S: ArchiveSink + ?Sized>(&self, sink: &mut S) -> Result<ArchiveStats> {
        let directory = UserDirectory::load(&self.client).await?;
        let assembler = MailAssembler::new(&directory, &self.resolver, &self.config)?;
        let topics = TopicEnumerator::from_config(&self.client, &self.config)
            .list_topics()
            .await?;

        let mut stats = ArchiveStats::default();
        for topic in topics {
            let topic_id = topic.id;
            match archive_topic(&assembler, topic, sink, &mut stats).await {
                Ok(messages) => {
                    stats.topics += 1;
                    debug!(topic_id, messages, "Topic archived");
                }
                Err(e) if self.config.continue_on_topic_error && !e.is_fatal() => {
                    warn!(topic_id, error = %e, "Topic failed, continuing with next topic");
                    stats.failed_topics += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            topics = stats.topics,
            messages = stats.messages,
            attachments = stats.attachments,
            skipped_attachments = stats.skipped_attachments,
            failed_topics = stats.failed_topics,
            "Archive complete"
        );
        Ok(stats)
    }
}

/// Archive one topic, returning the number of messages written.
///
/// Messages already appended stay in the sink if a later post fails.
///
/// # Errors
///
/// Returns the first pagination, assembly or sink error.
pub async fn archive_topic<S: ArchiveSink + ?Sized>(
    assembler: &MailAssembler<'_>,
    topic: Topic<'_>,
    sink: &mut S,
    stats: &mut ArchiveStats,
) -> Result<usize> {
    let Topic {
        id,
        title,
        mut posts,
    } = topic;
    info!(topic_id = id, title = %title, "Archiving topic");

    let mut chain = ReplyChain::default();
    let mut written = 0;
    while let Some(post) = posts.next().await {
        let post = post?;
        let message = assembler.assemble(&title, &post, chain.previous()).await?;
        sink.append(&message).await?;

        stats.messages += 1;
        stats.attachments += message.attachments;
        stats.skipped_attachments += message.skipped_attachments;
        written += 1;
        chain.advance(message.message_id);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_chain_links_to_latest() {
        let mut chain = ReplyChain::default();
        assert_eq!(chain.previous(), None);

        chain.advance("<a@x>".to_string());
        assert_eq!(chain.previous(), Some("<a@x>"));

        chain.advance("<b@x>".to_string());
        assert_eq!(chain.previous(), Some("<b@x>"));
    }
}
