use std::time::Duration;

use thiserror::Error;

use crate::rate_limit::Window;

/// Failures below HTTP: nothing came back from the server.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Other(String),
}

/// Outcome of a fetch that did not yield a document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// 404. Usually means "not published yet".
    #[error("not found: {url}")]
    NotFound { url: String },

    /// 401/403. Retrying makes it worse.
    #[error("access denied (http {status}) for {url}: {hint}")]
    AccessDenied {
        url: String,
        status: u16,
        hint: String,
    },

    /// Any other 4xx the server will keep answering the same way.
    #[error("request rejected (http {status}) for {url}")]
    Rejected { url: String, status: u16 },

    /// The local budget is spent; no request was sent.
    #[error("{source_name} {window} rate budget exhausted, wait {}s before resuming", retry_in.as_secs().max(1))]
    RateLimited {
        source_name: String,
        window: Window,
        retry_in: Duration,
    },

    #[error("gave up on {url} after {attempts} attempts: {last}")]
    TransientExhausted {
        url: String,
        attempts: u32,
        last_status: Option<u16>,
        last: String,
    },
}

impl FetchError {
    /// True when continuing a batch would compound a rate-limit violation.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            FetchError::RateLimited { .. } => true,
            FetchError::TransientExhausted { last_status, .. } => *last_status == Some(429),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }

    /// How long the caller should pause before the next batch.
    pub fn resume_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimited { retry_in, .. } => Some(*retry_in),
            FetchError::TransientExhausted {
                last_status: Some(429),
                ..
            } => Some(Duration::from_secs(60 * 60)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_429_exhaustion_counts_as_rate_limit() {
        let err = FetchError::TransientExhausted {
            url: "u".into(),
            attempts: 4,
            last_status: Some(429),
            last: "http 429".into(),
        };
        assert!(err.is_rate_limit());
        assert!(err.resume_after().is_some());

        let err = FetchError::TransientExhausted {
            url: "u".into(),
            attempts: 4,
            last_status: Some(503),
            last: "http 503".into(),
        };
        assert!(!err.is_rate_limit());
    }

    #[test]
    fn denial_message_carries_hint() {
        let err = FetchError::AccessDenied {
            url: "https://example.test/x".into(),
            status: 403,
            hint: "slow down".into(),
        };
        assert!(err.to_string().contains("slow down"));
        assert!(!err.is_rate_limit());
    }
}
