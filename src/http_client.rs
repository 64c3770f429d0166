use crate::error::FetchError;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder, Response};
use serde::Serialize;
use std::time::Duration;
use tokio::time::sleep;

/// User agents to rotate through to avoid bot detection
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

/// Configuration for the HTTP client
#[derive(Clone, Debug)]
pub struct HttpClientConfig {
    /// Applied to every single fetch
    pub timeout: Duration,
    pub max_retries: usize,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub enable_cookies: bool,
    pub enable_gzip: bool,
    /// Sent with every request on top of the browser defaults
    pub default_headers: Vec<(String, String)>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 4,
            initial_retry_delay_ms: 500,
            max_retry_delay_ms: 8000,
            enable_cookies: true,
            enable_gzip: true,
            default_headers: Vec::new(),
        }
    }
}

impl HttpClientConfig {
    /// Same settings with an extra default header
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.default_headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// HTTP client that looks like a browser and retries transient failures.
///
/// Each provider adapter owns one, so cookie jars are never shared between
/// sites.
pub struct EnhancedHttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl EnhancedHttpClient {
    /// Create a new enhanced HTTP client with default configuration
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_config(HttpClientConfig::default())
    }

    /// Create a new enhanced HTTP client with custom configuration
    pub fn with_config(config: HttpClientConfig) -> Result<Self, reqwest::Error> {
        let builder = ClientBuilder::new()
            .timeout(config.timeout)
            .user_agent(Self::random_user_agent())
            .cookie_store(config.enable_cookies)
            .gzip(config.enable_gzip)
            .brotli(config.enable_gzip)
            .redirect(reqwest::redirect::Policy::limited(10))
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        // Add default headers that mimic a real browser
        let mut headers = HeaderMap::new();
        headers.insert(
            "Accept",
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8"),
        );
        headers.insert("Accept-Language", HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert("DNT", HeaderValue::from_static("1"));
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
        headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("document"));
        headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("navigate"));
        headers.insert("Sec-Fetch-Site", HeaderValue::from_static("none"));
        headers.insert("Cache-Control", HeaderValue::from_static("max-age=0"));

        for (name, value) in &config.default_headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(n), Ok(v)) => {
                    headers.insert(n, v);
                }
                _ => log::warn!("Skipping invalid default header {}: {}", name, value),
            }
        }

        let client = builder.default_headers(headers).build()?;

        Ok(Self { client, config })
    }

    /// Get a random user agent from the pool
    fn random_user_agent() -> &'static str {
        let mut rng = rand::thread_rng();
        let index = rng.gen_range(0..USER_AGENTS.len());
        USER_AGENTS[index]
    }

    /// Calculate retry delay with exponential backoff and jitter
    fn calculate_retry_delay(&self, attempt: usize) -> Duration {
        let base_delay = self.config.initial_retry_delay_ms;
        let max_delay = self.config.max_retry_delay_ms;

        let delay_ms = base_delay
            .saturating_mul(2u64.saturating_pow(attempt as u32))
            .min(max_delay);

        // +/-25% so parallel callers don't retry in lockstep
        let mut rng = rand::thread_rng();
        let jitter = rng.gen_range(0.75..=1.25);
        let final_delay_ms = (delay_ms as f64 * jitter) as u64;

        Duration::from_millis(final_delay_ms)
    }

    /// Check if a status code is retryable
    fn is_retryable_status(status: reqwest::StatusCode) -> bool {
        matches!(
            status.as_u16(),
            // Rate limiting
            429 |
            // Server errors
            500 | 502 | 503 | 504 |
            // Cloudflare errors
            520 | 521 | 522 | 523 | 524 | 525 | 526 | 527
        )
    }

    /// Send a request built by `build`, retrying transient failures.
    ///
    /// The final response is returned whatever its status; callers decide
    /// what a non-success status means.
    async fn send_with_retry<F>(&self, url: &str, build: F) -> Result<Response, FetchError>
    where
        F: Fn(&Client) -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let request = build(&self.client).header("User-Agent", Self::random_user_agent());

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if Self::is_retryable_status(status) && attempt < self.config.max_retries {
                        log::warn!(
                            "Received retryable status {} for {}, attempt {}/{}",
                            status,
                            url,
                            attempt + 1,
                            self.config.max_retries + 1
                        );
                        sleep(self.calculate_retry_delay(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) => {
                    let should_retry = e.is_timeout() || e.is_connect() || e.is_request();
                    if should_retry && attempt < self.config.max_retries {
                        log::warn!(
                            "Request failed for {}, attempt {}/{}: {}",
                            url,
                            attempt + 1,
                            self.config.max_retries + 1,
                            e
                        );
                        sleep(self.calculate_retry_delay(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(FetchError::Transport {
                        url: url.to_string(),
                        source: e,
                    });
                }
            }
        }
    }

    /// Fetch a URL with retry logic
    pub async fn get_with_retry(&self, url: &str) -> Result<Response, FetchError> {
        self.get_with_retry_and_headers(url, None).await
    }

    /// Fetch a URL with custom headers and retry logic
    pub async fn get_with_retry_and_headers(
        &self,
        url: &str,
        extra_headers: Option<HeaderMap>,
    ) -> Result<Response, FetchError> {
        self.send_with_retry(url, |client| {
            let request = client.get(url);
            match &extra_headers {
                Some(headers) => request.headers(headers.clone()),
                None => request,
            }
        })
        .await
    }

    /// Fetch a URL and return the body, failing on non-success statuses
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.get_with_retry(url).await?;
        Self::success_text(url, response).await
    }

    /// POST a url-encoded form and return the body
    pub async fn post_form<T: Serialize + ?Sized>(
        &self,
        url: &str,
        form: &T,
        headers: HeaderMap,
    ) -> Result<String, FetchError> {
        let response = self
            .send_with_retry(url, |client| client.post(url).headers(headers.clone()).form(form))
            .await?;
        Self::success_text(url, response).await
    }

    /// POST a JSON body and return the decoded response together with its
    /// status, which callers of GraphQL-style APIs need to inspect.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<(u16, serde_json::Value), FetchError> {
        let response = self
            .send_with_retry(url, |client| {
                client
                    .post(url)
                    .header("Content-Type", "application/json")
                    .header("Accept", "application/json")
                    .json(body)
            })
            .await?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            source: e,
        })?;
        let json = serde_json::from_str(&text).map_err(|e| FetchError::parse(url, e.to_string()))?;
        Ok((status, json))
    }

    async fn success_text(url: &str, response: Response) -> Result<String, FetchError> {
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            source: e,
        })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_creation() {
        let client = EnhancedHttpClient::new();
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_client_with_default_headers() {
        let config = HttpClientConfig::default().with_header("Referer", "https://mangapill.com/");
        let client = EnhancedHttpClient::with_config(config).unwrap();
        assert_eq!(client.config().default_headers.len(), 1);
    }

    #[test]
    fn test_random_user_agent() {
        let ua1 = EnhancedHttpClient::random_user_agent();
        let ua2 = EnhancedHttpClient::random_user_agent();
        assert!(USER_AGENTS.contains(&ua1));
        assert!(USER_AGENTS.contains(&ua2));
    }

    #[tokio::test]
    async fn test_retry_delay_calculation() {
        let config = HttpClientConfig {
            initial_retry_delay_ms: 100,
            max_retry_delay_ms: 1000,
            ..HttpClientConfig::default()
        };
        let client = EnhancedHttpClient::with_config(config).unwrap();

        let delay0 = client.calculate_retry_delay(0);
        let delay10 = client.calculate_retry_delay(10);

        assert!(delay0.as_millis() >= 75 && delay0.as_millis() <= 125);
        // capped by max_retry_delay_ms plus jitter
        assert!(delay10.as_millis() <= 1250);
    }

    #[test]
    fn test_retryable_status() {
        assert!(EnhancedHttpClient::is_retryable_status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(EnhancedHttpClient::is_retryable_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
        assert!(EnhancedHttpClient::is_retryable_status(reqwest::StatusCode::BAD_GATEWAY));
        assert!(EnhancedHttpClient::is_retryable_status(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        assert!(EnhancedHttpClient::is_retryable_status(reqwest::StatusCode::GATEWAY_TIMEOUT));
        assert!(!EnhancedHttpClient::is_retryable_status(reqwest::StatusCode::NOT_FOUND));
        assert!(!EnhancedHttpClient::is_retryable_status(reqwest::StatusCode::FORBIDDEN));
    }
}
