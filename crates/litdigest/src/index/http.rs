//! HTTP client with bounded retry and exponential backoff.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Longest server-requested delay we are willing to honor.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Errors surfaced by [`RetryingHttpClient`].
#[derive(Debug, Error)]
pub enum HttpError {
    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    /// Every attempt failed with a transient error.
    #[error("{url} still failing after {attempts} attempts: {reason}")]
    Exhausted {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// The server answered with a status we do not retry.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The request failed in a way we do not retry.
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response arrived but could not be decoded.
    #[error("Failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Retry schedule for outbound calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_backoff: Duration,
    /// Factor applied to the delay after each further failure.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        self.initial_backoff
            .saturating_mul(self.multiplier.saturating_pow(exponent))
    }

    /// Statuses that indicate throttling or a transient server fault.
    pub fn is_retryable_status(status: StatusCode) -> bool {
        matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
    }
}

/// Sleeps between attempts. Swapped out in tests to observe backoff.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A single outbound call.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub query: Vec<(String, String)>,
    pub form: Option<Vec<(String, String)>>,
    pub timeout: Duration,
    /// Safe to send more than once. GET is always treated as idempotent.
    pub idempotent: bool,
}

impl HttpRequest {
    /// GET with query parameters.
    pub fn get(url: Url, query: Vec<(String, String)>, timeout: Duration) -> Self {
        Self {
            method: Method::GET,
            url,
            query,
            form: None,
            timeout,
            idempotent: true,
        }
    }

    /// POST with a form body. Not retried unless marked idempotent.
    pub fn post_form(url: Url, form: Vec<(String, String)>, timeout: Duration) -> Self {
        Self {
            method: Method::POST,
            url,
            query: Vec::new(),
            form: Some(form),
            timeout,
            idempotent: false,
        }
    }

    /// Declare the call safe to repeat (read-only POST endpoints).
    #[must_use]
    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    fn retryable(&self) -> bool {
        self.idempotent || self.method == Method::GET || self.method == Method::HEAD
    }
}

/// Outcome of one attempt, before the retry decision.
enum Attempt {
    Done(String),
    Transient { reason: String, retry_after: Option<Duration> },
    Fatal(HttpError),
}

/// HTTP client that retries transient failures with exponential backoff.
pub struct RetryingHttpClient {
    client: Client,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryingHttpClient {
    /// Create a client with the default policy and a real sleeper.
    pub fn new() -> Result<Self, HttpError> {
        Self::with_policy(RetryPolicy::default(), Arc::new(TokioSleeper))
    }

    /// Create a client with a custom policy and sleeper.
    pub fn with_policy(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Result<Self, HttpError> {
        let client = Client::builder()
            .user_agent(concat!("litdigest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(HttpError::Build)?;
        Ok(Self {
            client,
            policy,
            sleeper,
        })
    }

    /// Send a request, retrying transient failures, and return the body.
    pub async fn send(&self, request: &HttpRequest) -> Result<String, HttpError> {
        let url = request.url.to_string();
        let max_attempts = if request.retryable() {
            self.policy.max_attempts.max(1)
        } else {
            1
        };

        let mut attempt = 1;
        loop {
            let (reason, retry_after) = match self.attempt(request).await {
                Attempt::Done(body) => return Ok(body),
                Attempt::Fatal(e) => return Err(e),
                Attempt::Transient {
                    reason,
                    retry_after,
                } => (reason, retry_after),
            };

            if attempt >= max_attempts {
                tracing::error!(url = %url, attempts = attempt, reason = %reason, "Giving up on request");
                return Err(HttpError::Exhausted {
                    url,
                    attempts: attempt,
                    reason,
                });
            }

            let mut delay = self.policy.backoff(attempt);
            if let Some(server_delay) = retry_after {
                delay = delay.max(server_delay.min(MAX_RETRY_AFTER));
            }
            tracing::warn!(
                url = %url,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "Transient failure, retrying"
            );
            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(&self, request: &HttpRequest) -> Attempt {
        let url = request.url.to_string();
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .timeout(request.timeout);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(form) = &request.form {
            builder = builder.form(form);
        }

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) if is_transient(&e) => {
                return Attempt::Transient {
                    reason: e.to_string(),
                    retry_after: None,
                }
            }
            Err(source) => return Attempt::Fatal(HttpError::Request { url, source }),
        };

        let status = response.status();
        if status.is_success() {
            return match response.text().await {
                Ok(body) => Attempt::Done(body),
                Err(e) if is_transient(&e) => Attempt::Transient {
                    reason: e.to_string(),
                    retry_after: None,
                },
                Err(e) => Attempt::Fatal(HttpError::Decode {
                    url,
                    reason: e.to_string(),
                }),
            };
        }

        if RetryPolicy::is_retryable_status(status) {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Attempt::Transient {
                reason: format!("HTTP {status}"),
                retry_after,
            };
        }

        Attempt::Fatal(HttpError::Status {
            url,
            status: status.as_u16(),
        })
    }
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Records requested delays instead of sleeping.
    #[derive(Default)]
    pub(crate) struct RecordingSleeper {
        pub(crate) slept: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    fn client(sleeper: Arc<RecordingSleeper>) -> RetryingHttpClient {
        RetryingHttpClient::with_policy(RetryPolicy::default(), sleeper).unwrap()
    }

    fn url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{p}", server.uri())).unwrap()
    }

    #[test]
    fn test_backoff_doubles_from_half_second() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff(4), Duration::from_millis(4000));
    }

    #[test]
    fn test_retryable_statuses() {
        for code in [429, 500, 502, 503, 504] {
            assert!(RetryPolicy::is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
        for code in [400, 401, 403, 404, 501] {
            assert!(!RetryPolicy::is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
    }

    #[tokio::test]
    async fn test_recovers_after_503s() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let sleeper = Arc::new(RecordingSleeper::default());
        let http = client(sleeper.clone());
        let request = HttpRequest::get(url(&server, "/esearch.fcgi"), vec![], Duration::from_secs(5));

        let body = http.send(&request).await.unwrap();
        assert_eq!(body, "ok");

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3);

        let slept = sleeper.slept.lock().unwrap().clone();
        assert_eq!(slept, vec![Duration::from_millis(500), Duration::from_millis(1000)]);
        assert_eq!(slept.iter().sum::<Duration>(), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_gives_up_after_five_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let sleeper = Arc::new(RecordingSleeper::default());
        let http = client(sleeper.clone());
        let request = HttpRequest::get(url(&server, "/esummary.fcgi"), vec![], Duration::from_secs(5));

        let err = http.send(&request).await.unwrap_err();
        assert!(matches!(err, HttpError::Exhausted { attempts: 5, .. }));
        assert_eq!(server.received_requests().await.unwrap().len(), 5);
        assert_eq!(sleeper.slept.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let sleeper = Arc::new(RecordingSleeper::default());
        let http = client(sleeper.clone());
        let request = HttpRequest::get(url(&server, "/esearch.fcgi"), vec![], Duration::from_secs(5));

        let err = http.send(&request).await.unwrap_err();
        assert!(matches!(err, HttpError::Status { status: 400, .. }));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
        assert!(sleeper.slept.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_post_retried_only_when_declared_idempotent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let sleeper = Arc::new(RecordingSleeper::default());
        let http = client(sleeper.clone());
        let form = vec![("id".to_string(), "1".to_string())];

        let plain = HttpRequest::post_form(url(&server, "/efetch.fcgi"), form.clone(), Duration::from_secs(5));
        let err = http.send(&plain).await.unwrap_err();
        assert!(matches!(err, HttpError::Exhausted { attempts: 1, .. }));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);

        let declared = plain.clone().idempotent();
        let _ = http.send(&declared).await.unwrap_err();
        assert_eq!(server.received_requests().await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_retry_after_header_extends_delay() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let sleeper = Arc::new(RecordingSleeper::default());
        let http = client(sleeper.clone());
        let request = HttpRequest::get(url(&server, "/esearch.fcgi"), vec![], Duration::from_secs(5));

        http.send(&request).await.unwrap();
        assert_eq!(*sleeper.slept.lock().unwrap(), vec![Duration::from_secs(3)]);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let http = client(sleeper.clone());
        // Port 9 (discard) is not listening in test environments.
        let request = HttpRequest::get(
            Url::parse("http://127.0.0.1:9/esearch.fcgi").unwrap(),
            vec![],
            Duration::from_secs(2),
        );

        let err = http.send(&request).await.unwrap_err();
        assert!(matches!(err, HttpError::Exhausted { attempts: 5, .. }));
        assert_eq!(sleeper.slept.lock().unwrap().len(), 4);
    }
}
