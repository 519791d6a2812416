//! HTTP delivery to the collector.

use crate::OutboxResult;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Header carrying the project API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Sender configuration.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Collector base URL. Endpoints are appended to it.
    pub api_url: String,
    /// Project API key.
    pub api_key: String,
    /// Time allowed to establish a connection.
    pub connect_timeout: Duration,
    /// Time allowed for the whole request.
    pub request_timeout: Duration,
}

impl SenderConfig {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Result of a single POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The collector answered 2xx.
    Delivered { status: u16 },
    /// The collector answered with any other status.
    Rejected { status: u16 },
    /// No response: timeout, DNS, refused connection, and so on.
    Failed(String),
}

impl SendOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// One network POST per call.
///
/// Implementations never return errors; every problem is folded into
/// [`SendOutcome`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, endpoint: &str, payload: &[u8]) -> SendOutcome;
}

/// [`Transport`] backed by `reqwest`.
pub struct HttpTransport {
    config: SenderConfig,
    client: Client,
}

impl HttpTransport {
    pub fn new(config: SenderConfig) -> OutboxResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, client })
    }

    /// Full URL for an endpoint path such as `/api/track/event`.
    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), endpoint)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, endpoint: &str, payload: &[u8]) -> SendOutcome {
        let url = self.url_for(endpoint);
        debug!(url = %url, bytes = payload.len(), "Sending payload");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header(API_KEY_HEADER, &self.config.api_key)
            .body(payload.to_vec())
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    SendOutcome::Delivered {
                        status: status.as_u16(),
                    }
                } else {
                    SendOutcome::Rejected {
                        status: status.as_u16(),
                    }
                }
            }
            Err(e) => SendOutcome::Failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_config_defaults() {
        let config = SenderConfig::new("https://collector.pulse.dev", "pk_test");
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.api_key, "pk_test");
    }

    #[test]
    fn test_url_for_joins_without_double_slash() {
        let transport =
            HttpTransport::new(SenderConfig::new("https://collector.pulse.dev/", "pk")).unwrap();
        assert_eq!(
            transport.url_for("/api/track/event"),
            "https://collector.pulse.dev/api/track/event"
        );
    }

    #[test]
    fn test_only_delivered_is_success() {
        assert!(SendOutcome::Delivered { status: 204 }.is_success());
        assert!(!SendOutcome::Rejected { status: 500 }.is_success());
        assert!(!SendOutcome::Failed("refused".into()).is_success());
    }
}
