//! Turning forum posts into threaded mail messages.

pub mod assemble;
pub mod attachment;
pub mod sanitize;

pub use assemble::{generate_message_id, AssembledMessage, MailAssembler};
pub use attachment::{AttachmentResolver, ResolvedAttachment};
pub use sanitize::sanitize;
