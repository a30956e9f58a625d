//! Blocking JSON client for the Confluence REST API: authentication, request delay, and
//! bounded retries for transient failures.

use crate::confluence::error::ApiError;
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

const DEFAULT_USER_AGENT: &str = concat!("confluence-export/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_REDIRECTS: usize = 10;

/// Default number of attempts per request. One attempt means no retry.
const DEFAULT_RETRY_COUNT: u32 = 1;
const DEFAULT_BACKOFF_SECS: [u64; 3] = [1, 2, 4];
/// Backoff for HTTP 429 (rate limit): wait longer so the server can recover.
const BACKOFF_429_SECS: [u64; 4] = [30, 60, 90, 120];

/// How requests authenticate. Cloud uses email + API token (basic auth); Server and
/// Data Center accept a personal access token as bearer.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { email: String, token: String },
    Bearer { token: String },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { email, .. } => f
                .debug_struct("Basic")
                .field("email", email)
                .field("token", &"***")
                .finish(),
            Credentials::Bearer { .. } => f.debug_struct("Bearer").field("token", &"***").finish(),
        }
    }
}

/// Blocking HTTP client that authenticates every request and spaces requests out.
#[derive(Debug)]
pub struct RestClient {
    inner: reqwest::blocking::Client,
    credentials: Credentials,
    delay: Duration,
    last_request: Option<Instant>,
    retry_count: u32,
    backoff_secs: Vec<u64>,
}

impl RestClient {
    pub fn builder(credentials: Credentials) -> RestClientBuilder {
        RestClientBuilder::new(credentials)
    }

    /// GET `url` with `query` and decode the body as JSON.
    ///
    /// Retries on timeouts, connection errors, HTTP 5xx and HTTP 429 up to the configured
    /// attempt count. Auth and not-found statuses are returned immediately.
    pub fn get_json(&mut self, url: &str, query: &[(&str, String)]) -> Result<Value, ApiError> {
        let max_attempts = self.retry_count.max(1);
        let mut attempt = 0;
        loop {
            self.wait_delay();
            debug!(url, attempt = attempt + 1, "GET");
            let sent = self
                .authorize(self.inner.get(url))
                .header(reqwest::header::ACCEPT, "application/json")
                .query(query)
                .send();
            self.last_request = Some(Instant::now());
            let last_attempt = attempt + 1 >= max_attempts;

            match sent {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<Value>().map_err(|e| {
                            if e.is_decode() {
                                ApiError::Malformed {
                                    url: url.to_string(),
                                    reason: e.to_string(),
                                }
                            } else {
                                ApiError::BodyRead {
                                    url: url.to_string(),
                                    source: e,
                                }
                            }
                        });
                    }
                    let err = ApiError::from_status(status.as_u16(), url);
                    if !err.is_transient() || last_attempt {
                        return Err(err);
                    }
                    let backoff = self.backoff_for(attempt, status.as_u16() == 429);
                    debug!(url, status = status.as_u16(), backoff_secs = backoff, "retrying");
                    std::thread::sleep(Duration::from_secs(backoff));
                }
                Err(e) => {
                    let retryable = e.is_timeout() || e.is_connect();
                    if !retryable || last_attempt {
                        return Err(ApiError::Network {
                            url: url.to_string(),
                            source: e,
                        });
                    }
                    let backoff = self.backoff_for(attempt, false);
                    debug!(url, error = %e, backoff_secs = backoff, "retrying");
                    std::thread::sleep(Duration::from_secs(backoff));
                }
            }
            attempt += 1;
        }
    }

    fn authorize(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match &self.credentials {
            Credentials::Basic { email, token } => request.basic_auth(email, Some(token)),
            Credentials::Bearer { token } => request.bearer_auth(token),
        }
    }

    fn backoff_for(&self, attempt: u32, rate_limited: bool) -> u64 {
        let idx = attempt as usize;
        if rate_limited {
            BACKOFF_429_SECS
                .get(idx)
                .or(BACKOFF_429_SECS.last())
                .copied()
                .unwrap_or(60)
        } else {
            self.backoff_secs
                .get(idx)
                .or(self.backoff_secs.last())
                .copied()
                .unwrap_or(1)
        }
    }

    fn wait_delay(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                std::thread::sleep(self.delay - elapsed);
            }
        }
    }
}

/// Builder for [RestClient] with optional User-Agent, delay, timeout, and retry settings.
#[derive(Debug)]
pub struct RestClientBuilder {
    credentials: Credentials,
    user_agent: Option<String>,
    delay_ms: u64,
    timeout_secs: u64,
    retry_count: u32,
    retry_backoff_secs: Vec<u64>,
}

impl RestClientBuilder {
    fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            user_agent: None,
            delay_ms: 0,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_backoff_secs: DEFAULT_BACKOFF_SECS.to_vec(),
        }
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Minimum delay between two requests in milliseconds. Default 0.
    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Fixed per-request timeout in seconds. Default 30.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Number of attempts for transient failures (default 1, i.e. no retry).
    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = n.max(1);
        self
    }

    /// Backoff delays in seconds before each retry. If shorter than retry_count - 1, the
    /// last value is reused.
    pub fn retry_backoff_secs(mut self, secs: Vec<u64>) -> Self {
        self.retry_backoff_secs = secs;
        self
    }

    pub fn build(self) -> Result<RestClient, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        let backoff_secs = if self.retry_backoff_secs.is_empty() {
            DEFAULT_BACKOFF_SECS.to_vec()
        } else {
            self.retry_backoff_secs
        };
        Ok(RestClient {
            inner,
            credentials: self.credentials,
            delay: Duration::from_millis(self.delay_ms),
            last_request: None,
            retry_count: self.retry_count,
            backoff_secs,
        })
    }
}
