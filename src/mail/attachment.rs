//! Fetching linked forum resources so they can be attached to messages.

use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::constants::{FALLBACK_FILENAME, FALLBACK_MIME, USER_AGENT};
use crate::error::{ArchiveError, Result};

/// A downloaded resource with the metadata needed to attach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttachment {
    pub url: String,
    pub bytes: Vec<u8>,
    pub mime_major: String,
    pub mime_minor: String,
    pub filename: String,
}

impl ResolvedAttachment {
    /// `major/minor` content type.
    #[must_use]
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.mime_major, self.mime_minor)
    }
}

/// Downloads internal links with plain, unauthenticated requests.
#[derive(Debug, Clone)]
pub struct AttachmentResolver {
    http: Client,
    base: Url,
}

impl AttachmentResolver {
    /// Build a resolver for links found on the configured forum.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.http_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ArchiveError::Transport {
                url: config.api_base.to_string(),
                source: e,
            })?;

        Ok(Self {
            http,
            base: config.api_base.clone(),
        })
    }

    /// Turn a link from a post into an absolute URL.
    ///
    /// Links starting with `/` are resolved against the forum's origin.
    ///
    /// # Errors
    ///
    /// Returns an error if the link is not a valid URL.
    pub fn absolute_url(&self, link: &str) -> Result<Url> {
        let parsed = if link.starts_with('/') {
            self.base.join(link)
        } else {
            Url::parse(link)
        };
        parsed.map_err(|e| ArchiveError::AttachmentFetch {
            url: link.to_string(),
            reason: format!("invalid URL: {e}"),
        })
    }

    /// Download a linked resource and work out its type and filename.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::AttachmentFetch`] on network failure or a
    /// non-success status.
    pub async fn resolve(&self, link: &str) -> Result<ResolvedAttachment> {
        let url = self.absolute_url(link)?;
        let fetch_error = |reason: String| ArchiveError::AttachmentFetch {
            url: url.to_string(),
            reason,
        };

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("status {status}")));
        }

        let content_type = header_string(&response, CONTENT_TYPE);
        let disposition = header_string(&response, CONTENT_DISPOSITION);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?
            .to_vec();

        let filename = disposition
            .as_deref()
            .and_then(filename_from_disposition)
            .or_else(|| filename_from_url(&url))
            .unwrap_or_else(|| FALLBACK_FILENAME.to_string());

        let (mime_major, mime_minor) = content_type
            .as_deref()
            .and_then(parse_mime)
            .unwrap_or_else(|| guess_mime(&filename));

        debug!(
            url = %url,
            filename = %filename,
            mime = %format!("{mime_major}/{mime_minor}"),
            size = bytes.len(),
            "Fetched attachment"
        );

        Ok(ResolvedAttachment {
            url: url.to_string(),
            bytes,
            mime_major,
            mime_minor,
            filename,
        })
    }
}

fn header_string(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

/// Split a Content-Type value into lowercase major and minor parts,
/// ignoring parameters.
fn parse_mime(value: &str) -> Option<(String, String)> {
    let essence = value.split(';').next()?.trim();
    let (major, minor) = essence.split_once('/')?;
    let valid = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "!#$&-^_.+".contains(c))
    };
    if valid(major) && valid(minor) {
        Some((major.to_ascii_lowercase(), minor.to_ascii_lowercase()))
    } else {
        None
    }
}

fn guess_mime(filename: &str) -> (String, String) {
    mime_guess::from_path(filename).first().map_or_else(
        || (FALLBACK_MIME.0.to_string(), FALLBACK_MIME.1.to_string()),
        |mime| (mime.type_().as_str().to_string(), mime.subtype().as_str().to_string()),
    )
}

/// Extract the filename from a Content-Disposition value.
///
/// An RFC 5987 `filename*` parameter wins over a plain `filename`.
#[must_use]
pub fn filename_from_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in split_params(value).iter().skip(1) {
        let Some((name, raw)) = param.split_once('=') else {
            continue;
        };
        match name.trim().to_ascii_lowercase().as_str() {
            "filename*" => extended = decode_extended_value(raw.trim()),
            "filename" => plain = Some(unquote(raw.trim())),
            _ => {}
        }
    }

    extended.or(plain).and_then(|name| clean_filename(&name))
}

/// Last non-empty path segment of a URL, percent-decoded.
fn filename_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.rev().find(|s| !s.is_empty())?;
    let decoded = urlencoding::decode(segment)
        .map_or_else(|_| segment.to_string(), |s| s.into_owned());
    clean_filename(&decoded)
}

/// Drop any directory components and reject empty or dot-only names.
fn clean_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    if base.is_empty() || base == "." || base == ".." {
        None
    } else {
        Some(base.to_string())
    }
}

/// Split a header value on `;`, keeping quoted strings intact.
fn split_params(value: &str) -> Vec<String> {
    let mut params = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in value.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                current.push(c);
                in_quotes = !in_quotes;
            }
            ';' if !in_quotes => params.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    params.push(current);
    params
}

fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Decode `charset'language'percent-encoded` (RFC 5987).
fn decode_extended_value(value: &str) -> Option<String> {
    let value = unquote(value);
    let mut parts = value.splitn(3, '\'');
    let charset = parts.next()?.to_ascii_lowercase();
    let _language = parts.next()?;
    let encoded = parts.next()?;

    let bytes = urlencoding::decode_binary(encoded.as_bytes());
    let decoded = if charset == "iso-8859-1" || charset == "latin1" {
        bytes.iter().map(|&b| char::from(b)).collect()
    } else {
        String::from_utf8_lossy(&bytes).into_owned()
    };
    Some(decoded)
}
