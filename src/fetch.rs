use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::error::{FetchError, TransportError};
use crate::rate_limit::{RateLimitConfig, RateLimiter};

const MAX_JITTER: f64 = 0.20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Html,
    Csv,
    Json,
}

impl DocumentKind {
    /// Content type first, then a sniff of the body.
    pub fn detect(content_type: Option<&str>, body: &str) -> Self {
        if let Some(ct) = content_type.map(|c| c.to_ascii_lowercase()) {
            if ct.contains("json") {
                return DocumentKind::Json;
            }
            if ct.contains("csv") {
                return DocumentKind::Csv;
            }
            if ct.contains("html") {
                return DocumentKind::Html;
            }
        }
        let head = body.trim_start();
        if head.starts_with('{') || head.starts_with('[') {
            DocumentKind::Json
        } else if head.starts_with('<') {
            DocumentKind::Html
        } else {
            DocumentKind::Csv
        }
    }
}

/// One raw payload. Consumed by the extractors, never stored.
#[derive(Debug, Clone)]
pub struct Document {
    pub url: String,
    pub kind: DocumentKind,
    pub body: String,
}

impl Document {
    pub fn new(url: impl Into<String>, kind: DocumentKind, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind,
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub content_type: Option<String>,
    pub body: String,
}

/// The network seam. `http_client::ReqwestTransport` in production, scripted
/// fakes in tests.
pub trait Transport {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<RawResponse, TransportError>;
}

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub limits: RateLimitConfig,
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub request_delay: Duration,
}

impl FetchPolicy {
    pub fn polite(short_limit: u32, long_limit: u32) -> Self {
        Self {
            limits: RateLimitConfig::per_minute_and_hour(short_limit, long_limit),
            max_attempts: 4,
            base_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(120),
            request_delay: Duration::from_millis(3_000),
        }
    }
}

enum Attempt {
    Done(RawResponse),
    Permanent(FetchError),
    Retry {
        status: Option<u16>,
        reason: String,
        hint: Option<Duration>,
    },
}

/// Bounded-rate HTTP retrieval for one source.
pub struct FetchClient {
    source_name: String,
    transport: Box<dyn Transport>,
    sleeper: Box<dyn Sleeper>,
    limiter: RateLimiter,
    policy: FetchPolicy,
    headers: Vec<(String, String)>,
    rng: StdRng,
}

impl FetchClient {
    pub fn new(
        source_name: impl Into<String>,
        transport: Box<dyn Transport>,
        policy: FetchPolicy,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            transport,
            sleeper: Box::new(ThreadSleeper),
            limiter: RateLimiter::new(policy.limits),
            policy,
            headers: Vec::new(),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn fetch(&mut self, url: &str) -> Result<Document, FetchError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_status = None;
        let mut last_reason = String::new();

        for attempt in 1..=max_attempts {
            if let Err(rejection) = self.limiter.try_acquire() {
                warn!(
                    source = %self.source_name,
                    window = %rejection.window,
                    retry_in_secs = rejection.retry_in.as_secs(),
                    "local rate budget exhausted, refusing request"
                );
                return Err(FetchError::RateLimited {
                    source_name: self.source_name.clone(),
                    window: rejection.window,
                    retry_in: rejection.retry_in,
                });
            }

            debug!(source = %self.source_name, attempt, url, "fetching");
            match self.attempt(url) {
                Attempt::Done(resp) => {
                    let delay = self.jittered(self.policy.request_delay);
                    self.sleeper.sleep(delay);
                    let kind = DocumentKind::detect(resp.content_type.as_deref(), &resp.body);
                    info!(source = %self.source_name, url, bytes = resp.body.len(), "fetched");
                    return Ok(Document::new(url, kind, resp.body));
                }
                Attempt::Permanent(err) => return Err(err),
                Attempt::Retry {
                    status,
                    reason,
                    hint,
                } => {
                    last_status = status;
                    last_reason = reason;
                    if attempt == max_attempts {
                        break;
                    }
                    let wait = self.backoff_delay(attempt, hint);
                    warn!(
                        source = %self.source_name,
                        url,
                        attempt,
                        reason = %last_reason,
                        wait_ms = wait.as_millis() as u64,
                        "transient failure, backing off"
                    );
                    self.sleeper.sleep(wait);
                }
            }
        }

        Err(FetchError::TransientExhausted {
            url: url.to_string(),
            attempts: max_attempts,
            last_status,
            last: last_reason,
        })
    }

    fn attempt(&self, url: &str) -> Attempt {
        let resp = match self.transport.get(url, &self.headers) {
            Ok(resp) => resp,
            Err(err) => {
                return Attempt::Retry {
                    status: None,
                    reason: err.to_string(),
                    hint: None,
                };
            }
        };

        match resp.status {
            200..=299 => Attempt::Done(resp),
            404 | 410 => Attempt::Permanent(FetchError::NotFound {
                url: url.to_string(),
            }),
            401 | 403 => Attempt::Permanent(FetchError::AccessDenied {
                url: url.to_string(),
                status: resp.status,
                hint: denial_hint(&self.source_name, resp.status),
            }),
            408 | 425 | 429 | 500..=599 => Attempt::Retry {
                status: Some(resp.status),
                reason: format!("http {}", resp.status),
                hint: resp.retry_after,
            },
            status => Attempt::Permanent(FetchError::Rejected {
                url: url.to_string(),
                status,
            }),
        }
    }

    /// `base * 2^(attempt-1)`, jittered, capped, and never shorter than the
    /// server's retry-after hint.
    fn backoff_delay(&mut self, attempt: u32, hint: Option<Duration>) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let raw = self.policy.base_backoff.saturating_mul(1u32 << exp);
        let jittered = self.jittered(raw).min(self.policy.max_backoff);
        match hint {
            Some(server) => jittered.max(server),
            None => jittered,
        }
    }

    fn jittered(&mut self, base: Duration) -> Duration {
        if base.is_zero() {
            return base;
        }
        let factor = 1.0 + self.rng.gen_range(0.0..=MAX_JITTER);
        base.mul_f64(factor)
    }
}

fn denial_hint(source_name: &str, status: u16) -> String {
    if status == 401 {
        format!("{source_name} rejected the credentials; check the configured API key")
    } else {
        format!(
            "{source_name} is refusing requests; lower the per-minute budget and pause before retrying"
        )
    }
}
