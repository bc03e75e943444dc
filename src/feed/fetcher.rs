use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::client::Diagnostics;
use super::feed_diagnostic;
use crate::util::{validate_url, HostPolicy};

const MAX_RETRIES: u32 = 3;
const MAX_DOCUMENT_SIZE: usize = 10 * 1024 * 1024; // 10MB
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: usize = 3;

/// Errors that can occur while retrieving a document over HTTP.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL failed validation (bad scheme, private host, not absolute)
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded its timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Builds the shared `reqwest` client used for the OPML document and feeds.
///
/// Follows at most three redirects and refuses loops.
pub fn build_http_client(user_agent: &str) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .redirect(redirect_policy())
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
}

fn redirect_policy() -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );
        attempt.follow()
    })
}

/// Retrieves the raw bytes behind a URL.
///
/// The blogroll service only depends on this trait, so the subscription
/// document can come from anywhere that can hand back bytes.
pub trait DocumentFetcher: Send + Sync {
    fn fetch_bytes(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

impl<T: DocumentFetcher> DocumentFetcher for Arc<T> {
    fn fetch_bytes(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send {
        (**self).fetch_bytes(url)
    }
}

/// HTTP implementation of [`DocumentFetcher`] on top of `reqwest`.
///
/// # Behavior
///
/// - Each request attempt has its own timeout (30 seconds by default)
/// - Server errors (5xx) and truncated bodies are retried with exponential
///   backoff, up to 3 retries
/// - Other non-2xx statuses fail immediately
/// - Response bodies are limited to 10MB
/// - URLs are validated against the configured [`HostPolicy`] first
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    retry_base: Duration,
    host_policy: HostPolicy,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_TIMEOUT,
            retry_base: Duration::from_secs(1),
            host_policy: HostPolicy::PublicOnly,
        }
    }

    /// Per-attempt request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// First backoff delay; later retries double it (1s, 2s, 4s by default).
    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    pub fn with_host_policy(mut self, host_policy: HostPolicy) -> Self {
        self.host_policy = host_policy;
        self
    }

    /// Fetches `url`, reporting server-error retries at the severity picked
    /// by `diagnostics`.
    ///
    /// [`DocumentFetcher::fetch_bytes`] is this with [`Diagnostics::Verbose`].
    pub async fn fetch_with(
        &self,
        url: &str,
        diagnostics: Diagnostics,
    ) -> Result<Vec<u8>, FetchError> {
        let url = validate_url(url, self.host_policy)
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        let mut retry_count = 0;

        loop {
            let response = tokio::time::timeout(self.timeout, self.client.get(url.clone()).send())
                .await
                .map_err(|_| FetchError::Timeout)?
                .map_err(FetchError::Network)?;

            if response.status().is_server_error() {
                if retry_count >= MAX_RETRIES {
                    return Err(FetchError::HttpStatus(response.status().as_u16()));
                }

                let delay = self.backoff(retry_count);
                feed_diagnostic!(
                    diagnostics,
                    url = %url,
                    status = %response.status(),
                    retry = retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Server error, retrying after delay"
                );

                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            if !response.status().is_success() {
                return Err(FetchError::HttpStatus(response.status().as_u16()));
            }

            match read_limited_bytes(response, MAX_DOCUMENT_SIZE).await {
                Ok(bytes) => return Ok(bytes),
                Err(FetchError::IncompleteResponse { expected, received }) => {
                    if retry_count >= MAX_RETRIES {
                        return Err(FetchError::IncompleteResponse { expected, received });
                    }

                    let delay = self.backoff(retry_count);
                    tracing::debug!(
                        url = %url,
                        expected = expected,
                        received = received,
                        attempt = retry_count + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying incomplete download"
                    );

                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn backoff(&self, retry_count: u32) -> Duration {
        self.retry_base.saturating_mul(2u32.saturating_pow(retry_count))
    }
}

impl DocumentFetcher for HttpFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.fetch_with(url, Diagnostics::Verbose).await
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OPML: &str = r#"<opml version="2.0"><body>
<outline title="Example" htmlUrl="https://example.com"/>
</body></opml>"#;

    fn test_fetcher() -> HttpFetcher {
        HttpFetcher::new(reqwest::Client::new())
            .with_host_policy(HostPolicy::AllowPrivate)
            .with_retry_base(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blogroll.opml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(OPML))
            .mount(&mock_server)
            .await;

        let bytes = test_fetcher()
            .fetch_bytes(&format!("{}/blogroll.opml", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, OPML.as_bytes());
    }

    #[tokio::test]
    async fn test_fetch_404_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = test_fetcher()
            .fetch_bytes(&format!("{}/missing.opml", mock_server.uri()))
            .await;
        match result {
            Err(FetchError::HttpStatus(404)) => {}
            other => panic!("Expected HttpStatus(404), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_429_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = test_fetcher()
            .fetch_bytes(&format!("{}/list.opml", mock_server.uri()))
            .await;
        assert!(matches!(result, Err(FetchError::HttpStatus(429))));
    }

    #[tokio::test]
    async fn test_fetch_500_retries_then_fails() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(4) // Initial request + 3 retries
            .mount(&mock_server)
            .await;

        let result = test_fetcher()
            .fetch_bytes(&format!("{}/list.opml", mock_server.uri()))
            .await;
        assert!(matches!(result, Err(FetchError::HttpStatus(500))));
    }

    #[tokio::test]
    async fn test_fetch_503_retry_then_success() {
        use wiremock::matchers::any;

        let mock_server = MockServer::start().await;

        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;

        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(OPML))
            .mount(&mock_server)
            .await;

        let bytes = test_fetcher()
            .fetch_bytes(&format!("{}/list.opml", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, OPML.as_bytes());
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(OPML)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let result = test_fetcher()
            .with_timeout(Duration::from_millis(100))
            .fetch_bytes(&format!("{}/slow.opml", mock_server.uri()))
            .await;
        assert!(matches!(result, Err(FetchError::Timeout)));
    }

    #[tokio::test]
    async fn test_private_host_rejected_by_default() {
        let fetcher = HttpFetcher::new(reqwest::Client::new());
        let result = fetcher.fetch_bytes("http://127.0.0.1:9/list.opml").await;
        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'a'; MAX_DOCUMENT_SIZE + 1]))
            .mount(&mock_server)
            .await;

        let result = test_fetcher()
            .fetch_bytes(&format!("{}/huge.opml", mock_server.uri()))
            .await;
        assert!(matches!(result, Err(FetchError::ResponseTooLarge)));
    }

    #[tokio::test]
    async fn test_client_sends_user_agent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(wiremock::matchers::header("user-agent", "blogroll-test/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(OPML))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = build_http_client("blogroll-test/1.0").unwrap();
        HttpFetcher::new(client)
            .with_host_policy(HostPolicy::AllowPrivate)
            .fetch_bytes(&format!("{}/blogroll.opml", mock_server.uri()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_redirect_loop_is_network_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/loop", mock_server.uri()).as_str()),
            )
            .mount(&mock_server)
            .await;

        let client = build_http_client("blogroll-test/1.0").unwrap();
        let result = HttpFetcher::new(client)
            .with_host_policy(HostPolicy::AllowPrivate)
            .fetch_bytes(&format!("{}/loop", mock_server.uri()))
            .await;
        assert!(matches!(result, Err(FetchError::Network(_))));
    }
}
