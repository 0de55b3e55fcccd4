//! Authenticated access to the Discourse JSON API.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;
use url::Url;

use crate::config::{Config, ConfigError};
use crate::constants::{API_KEY_HEADER, API_USERNAME_HEADER, USER_AGENT};
use crate::error::{ArchiveError, Result};

/// A parsed API response.
///
/// Rate-limited responses are returned rather than turned into errors, since
/// only the caller knows how to retry a given endpoint.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub url: String,
    pub status: StatusCode,
    /// Value of a `Retry-After` header given in seconds, if any.
    pub retry_after: Option<Duration>,
    pub body: Value,
}

impl ApiResponse {
    #[must_use]
    pub fn is_rate_limited_status(&self) -> bool {
        self.status == StatusCode::TOO_MANY_REQUESTS
    }
}

/// Client for the forum API carrying the fixed authentication headers.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: Url,
}

impl ApiClient {
    /// Build a client for the configured forum.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials cannot be sent as headers or the
    /// HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            API_KEY_HEADER,
            header_value("API_KEY", &config.api_key)?,
        );
        headers.insert(
            API_USERNAME_HEADER,
            header_value("API_USERNAME", &config.api_username)?,
        );

        let http = Client::builder()
            .timeout(config.http_timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
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

    /// The forum base URL all API paths are joined onto.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Resolve an API path such as `top.json` against the base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not form a valid URL.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| ArchiveError::InvalidResponse {
                url: path.to_string(),
                message: format!("cannot build endpoint URL: {e}"),
            })
    }

    /// Issue a GET request and parse the JSON body.
    ///
    /// Success and `429 Too Many Requests` responses are returned; any other
    /// status is an error. Repeated query keys are sent as repeated pairs.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, unexpected status, or a success
    /// body that is not JSON.
    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<ApiResponse> {
        let url = self.endpoint(path)?;
        let url_str = url.to_string();

        trace!(url = %url_str, params = query.len(), "API request");

        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| ArchiveError::Transport {
                url: url_str.clone(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::TOO_MANY_REQUESTS {
            return Err(ArchiveError::HttpStatus {
                url: url_str,
                status,
            });
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let bytes = response.bytes().await.map_err(|e| ArchiveError::Transport {
            url: url_str.clone(),
            source: e,
        })?;

        let body = match serde_json::from_slice::<Value>(&bytes) {
            Ok(body) => body,
            // Rate-limit pages are not always JSON; the status alone is enough.
            Err(_) if status == StatusCode::TOO_MANY_REQUESTS => Value::Null,
            Err(e) => {
                return Err(ArchiveError::InvalidResponse {
                    url: url_str,
                    message: format!("body is not JSON: {e}"),
                })
            }
        };

        Ok(ApiResponse {
            url: url_str,
            status,
            retry_after,
            body,
        })
    }

    /// Issue a GET request and deserialize a successful body into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, is rate limited, or the body
    /// does not have the expected shape.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self.get(path, query).await?;
        if response.is_rate_limited_status() {
            return Err(ArchiveError::HttpStatus {
                url: response.url,
                status: response.status,
            });
        }
        serde_json::from_value(response.body).map_err(|e| ArchiveError::InvalidResponse {
            url: response.url,
            message: e.to_string(),
        })
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| {
        ArchiveError::Config(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("cannot be sent as an HTTP header: {e}"),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_under_base_path() {
        let config = Config::for_testing("https://example.com/forum");
        let client = ApiClient::new(&config).unwrap();

        assert_eq!(
            client.endpoint("top.json").unwrap().as_str(),
            "https://example.com/forum/top.json"
        );
        assert_eq!(
            client.endpoint("/t/12.json").unwrap().as_str(),
            "https://example.com/forum/t/12.json"
        );
    }

    #[test]
    fn test_rejects_unsendable_credentials() {
        let mut config = Config::for_testing("https://example.com");
        config.api_key = "bad\nkey".to_string();
        assert!(matches!(
            ApiClient::new(&config),
            Err(ArchiveError::Config(_))
        ));
    }
}
