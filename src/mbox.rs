//! Appending assembled messages to an mbox file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::Result;
use crate::mail::AssembledMessage;

/// Destination for finished messages.
#[async_trait]
pub trait ArchiveSink: Send {
    /// Persist one message. Messages are appended in call order.
    async fn append(&mut self, message: &AssembledMessage) -> Result<()>;
}

/// An mbox file (mboxrd quoting) opened for appending.
///
/// Every message is flushed as soon as it is written, so an interrupted run
/// leaves the messages written so far intact.
#[derive(Debug)]
pub struct MboxSink {
    path: PathBuf,
    file: File,
    appended: u64,
}

impl MboxSink {
    /// Open `path` for appending, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        debug!(path = %path.display(), "Opened mbox for appending");
        Ok(Self {
            path,
            file,
            appended: 0,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of messages appended through this sink.
    #[must_use]
    pub fn appended(&self) -> u64 {
        self.appended
    }
}

#[async_trait]
impl ArchiveSink for MboxSink {
    async fn append(&mut self, message: &AssembledMessage) -> Result<()> {
        let entry = mbox_entry(&message.formatted(), message.date.with_timezone(&Utc));
        self.file.write_all(&entry).await?;
        self.file.flush().await?;
        self.appended += 1;
        Ok(())
    }
}

/// Frame one RFC 5322 message as an mbox entry.
///
/// Writes the `From ` separator line, converts CRLF to LF, quotes body lines
/// that would read as separators (`From `, `>From `, ...) with one more `>`,
/// and ends with a blank line.
#[must_use]
pub fn mbox_entry(raw: &[u8], date: DateTime<Utc>) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() + 64);
    let separator = format!("From MAILER-DAEMON {}\n", date.format("%a %b %e %H:%M:%S %Y"));
    out.extend_from_slice(separator.as_bytes());

    let mut lines = raw.split(|&b| b == b'\n').peekable();
    while let Some(line) = lines.next() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        // A trailing newline leaves one empty piece behind; skip it.
        if line.is_empty() && lines.peek().is_none() {
            break;
        }
        let unquoted = line
            .iter()
            .position(|&b| b != b'>')
            .map_or(&line[line.len()..], |i| &line[i..]);
        if unquoted.starts_with(b"From ") {
            out.push(b'>');
        }
        out.extend_from_slice(line);
        out.push(b'\n');
    }

    out.push(b'\n');
    out
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 5, 9, 3, 7).unwrap()
    }

    #[test]
    fn test_separator_line() {
        let entry = mbox_entry(b"Subject: hi\r\n\r\nbody\r\n", date());
        let text = String::from_utf8(entry).unwrap();
        assert_eq!(
            text,
            "From MAILER-DAEMON Fri Jan  5 09:03:07 2024\nSubject: hi\n\nbody\n\n"
        );
    }

    #[test]
    fn test_quotes_from_lines() {
        let raw = b"Subject: x\r\n\r\nFrom here\r\n>From there\r\nNot From\r\nFromage\r\n";
        let text = String::from_utf8(mbox_entry(raw, date())).unwrap();
        let body: Vec<&str> = text.lines().skip(3).collect();
        assert_eq!(body, vec![">From here", ">>From there", "Not From", "Fromage", ""]);
    }

    #[test]
    fn test_without_trailing_newline() {
        let text = String::from_utf8(mbox_entry(b"Subject: x\r\n\r\nend", date())).unwrap();
        assert!(text.ends_with("\nend\n\n"));
    }
}
