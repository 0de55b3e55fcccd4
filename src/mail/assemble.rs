use std::time::SystemTime;

use chrono::{DateTime, FixedOffset};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, Message, MultiPart, SinglePart};
use tracing::warn;

use super::attachment::{AttachmentResolver, ResolvedAttachment};
use super::sanitize::sanitize;
use crate::config::{AttachmentFailure, Config};
use crate::constants::FALLBACK_MIME;
use crate::discourse::{Post, UserDirectory};
use crate::error::{ArchiveError, Result};

/// One archived post, ready for the sink.
#[derive(Debug, Clone)]
pub struct AssembledMessage {
    pub message: Message,
    /// Message-Id of this message, angle brackets included.
    pub message_id: String,
    pub date: DateTime<FixedOffset>,
    pub attachments: usize,
    pub skipped_attachments: usize,
}

impl AssembledMessage {
    /// The message serialized as RFC 5322 bytes.
    #[must_use]
    pub fn formatted(&self) -> Vec<u8> {
        self.message.formatted()
    }
}

/// Builds one mail message per forum post.
#[derive(Debug)]
pub struct MailAssembler<'a> {
    directory: &'a UserDirectory,
    resolver: &'a AttachmentResolver,
    list: Mailbox,
    id_domain: String,
    attachment_failure: AttachmentFailure,
}

impl<'a> MailAssembler<'a> {
    /// # Errors
    ///
    /// Returns an error if the configured list address is not a valid mailbox.
    pub fn new(
        directory: &'a UserDirectory,
        resolver: &'a AttachmentResolver,
        config: &Config,
    ) -> Result<Self> {
        Ok(Self {
            directory,
            resolver,
            list: parse_mailbox(&config.list_name)?,
            id_domain: config.message_id_domain.clone(),
            attachment_failure: config.attachment_failure,
        })
    }

    /// Build the message for `post` in a topic titled `topic_title`.
    ///
    /// `previous_message_id` is the id of the message built for the previous
    /// post of the same topic, if any; it becomes `In-Reply-To`.
    ///
    /// # Errors
    ///
    /// Fails with [`ArchiveError::UnknownUser`] before fetching anything if
    /// the author is not in the directory. Attachment failures only fail the
    /// message under [`AttachmentFailure::Abort`].
    pub async fn assemble(
        &self,
        topic_title: &str,
        post: &Post,
        previous_message_id: Option<&str>,
    ) -> Result<AssembledMessage> {
        let sender = parse_mailbox(self.directory.resolve(post.user_id)?)?;
        let message_id = generate_message_id(&self.id_domain);

        let mut builder = Message::builder()
            .message_id(Some(message_id.clone()))
            .subject(topic_title)
            .from(sender)
            .to(self.list.clone())
            .date(SystemTime::from(post.created_at));

        if let Some(previous) = previous_message_id {
            builder = builder
                .in_reply_to(previous.to_string())
                .references(previous.to_string());
        }

        let mut body = MultiPart::mixed().singlepart(SinglePart::plain(sanitize(&post.raw)));

        let mut attachments = 0;
        let mut skipped_attachments = 0;
        for link in &post.links {
            match self.resolver.resolve(link).await.and_then(attachment_part) {
                Ok(part) => {
                    body = body.singlepart(part);
                    attachments += 1;
                }
                Err(e) if self.attachment_failure == AttachmentFailure::Skip => {
                    warn!(link = %link, error = %e, "Skipping attachment");
                    skipped_attachments += 1;
                }
                Err(e) => return Err(e),
            }
        }

        let message = builder.multipart(body)?;

        Ok(AssembledMessage {
            message,
            message_id,
            date: post.created_at,
            attachments,
            skipped_attachments,
        })
    }
}

fn attachment_part(resolved: ResolvedAttachment) -> Result<SinglePart> {
    let fallback = format!("{}/{}", FALLBACK_MIME.0, FALLBACK_MIME.1);
    let content_type = ContentType::parse(&resolved.mime_type())
        .or_else(|_| ContentType::parse(&fallback))
        .map_err(|e| ArchiveError::AttachmentFetch {
            url: resolved.url.clone(),
            reason: format!("unusable content type: {e}"),
        })?;
    Ok(Attachment::new(resolved.filename).body(resolved.bytes, content_type))
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse::<Mailbox>()
        .map_err(|e| ArchiveError::InvalidAddress {
            address: address.to_string(),
            source: e,
        })
}

/// Generate a new globally unique Message-Id such as `<9f3c...@forum.example.com>`.
#[must_use]
pub fn generate_message_id(domain: &str) -> String {
    let id: u128 = rand::random();
    format!("<{id:032x}@{domain}>")
}
