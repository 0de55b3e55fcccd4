//! Discourse mbox archiver library.
//!
//! Exports a Discourse forum's top topics into a single mbox file, one mail
//! thread per topic and one message per post, with uploads attached.

pub mod archive;
pub mod config;
pub mod constants;
pub mod discourse;
pub mod error;
pub mod mail;
pub mod mbox;

pub use error::{ArchiveError, Result};
