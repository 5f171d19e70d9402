//! Provider clients: one HTTP round trip to one external AI endpoint.
//!
//! Each client builds a multimodal request (prompt text + inlined base64
//! image), applies a hard timeout, and interprets the HTTP status into the
//! shared [`ProviderError`] taxonomy. Clients are stateless across calls and
//! never retry internally; retry/fallback is the orchestrator's job.

pub mod gemini;
pub mod openrouter;

pub use gemini::*;
pub use openrouter::*;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use super::preprocess::PreparedImage;
use crate::config::ProviderId;

/// Per-provider transport/response failures.
///
/// Every kind is recoverable at the orchestrator level via fallback to the
/// other provider, and fatal only when both providers fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,

    #[error("authentication rejected by provider")]
    Unauthorized,

    #[error("provider rate limit exceeded")]
    RateLimited,

    #[error("provider server error (status {0})")]
    ServerError(u16),

    #[error("provider error: {message}")]
    Api { message: String },

    #[error("unexpected provider status {0}")]
    Unknown(u16),

    #[error("connection failed: {0}")]
    Http(String),

    #[error("could not decode provider response: {0}")]
    ResponseDecode(String),
}

/// One external AI endpoint capable of accepting an image + text prompt and
/// returning a text completion. Single network round trip per call.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Submit the prepared image with the given prompt and return the raw
    /// completion text.
    async fn analyze(
        &self,
        image: &PreparedImage,
        prompt: &str,
    ) -> Result<String, ProviderError>;
}

// ──────────────────────────────────────────────
// Shared status / error-body interpretation
// ──────────────────────────────────────────────

/// Standard `{"error": {"message": ...}}` body both providers emit.
#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Map a non-200 response to a `ProviderError`.
///
/// 401/403 → Unauthorized; 429 → RateLimited; 5xx → ServerError; any other
/// status with a parseable `{error.message}` body → Api; otherwise Unknown.
pub fn interpret_error_status(status: u16, body: &str) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Unauthorized,
        429 => ProviderError::RateLimited,
        500..=599 => ProviderError::ServerError(status),
        _ => match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => ProviderError::Api {
                message: parsed.error.message,
            },
            Err(_) => ProviderError::Unknown(status),
        },
    }
}

/// Map a reqwest transport error (no HTTP status available).
pub(crate) fn map_transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Http(e.to_string())
    }
}

// ──────────────────────────────────────────────
// MockProviderClient (testing)
// ──────────────────────────────────────────────

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Mock provider for orchestrator tests: configurable outcome, optional
/// artificial latency, and a call counter for fallback-order assertions.
pub struct MockProviderClient {
    id: ProviderId,
    outcome: Result<String, ProviderError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockProviderClient {
    pub fn succeeding(id: ProviderId, response: &str) -> Self {
        Self {
            id,
            outcome: Ok(response.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(id: ProviderId, error: ProviderError) -> Self {
        Self {
            id,
            outcome: Err(error),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before resolving, to keep a call observably in flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderClient for MockProviderClient {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn analyze(
        &self,
        _image: &PreparedImage,
        _prompt: &str,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.clone()
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
