//! Error taxonomy for the reasoning gateway.
//!
//! Mirrors the kinds enumerated in the system specification: each layer of
//! the pipeline absorbs the errors it can tolerate, and only a handful of
//! kinds ever reach an HTTP client (see `status_code`).

use thiserror::Error;

/// Errors surfaced anywhere in the gateway.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// A single upstream model call exhausted its retries.
    #[error("upstream model call failed: {0}")]
    UpstreamUnavailable(String),

    /// A thinking thread could not produce any step.
    #[error("thread {thread_id} failed: {reason}")]
    ThreadFailed {
        /// Index of the failed thread.
        thread_id: usize,
        /// Human-readable failure reason.
        reason: String,
    },

    /// No thread reached `completed`.
    #[error("all reasoning threads failed")]
    AllThreadsFailed,

    /// Intelligent fusion failed (concat fallback also failed, which by
    /// design cannot happen, but the variant exists for completeness).
    #[error("fusion failed: {0}")]
    FusionFailed(String),

    /// The per-request wall-clock deadline elapsed with no completed thread.
    #[error("request deadline exceeded before any thread completed")]
    DeadlineExceeded,

    /// Malformed input or out-of-range extension fields.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Startup-only configuration error. Never reaches an HTTP client.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl GatewayError {
    /// The stable `type` string returned in OpenAI-compatible error bodies.
    pub fn type_str(&self) -> &'static str {
        match self {
            Self::UpstreamUnavailable(_) => "UpstreamUnavailable",
            Self::ThreadFailed { .. } => "ThreadFailed",
            Self::AllThreadsFailed => "AllThreadsFailed",
            Self::FusionFailed(_) => "FusionFailed",
            Self::DeadlineExceeded => "DeadlineExceeded",
            Self::BadRequest(_) => "BadRequest",
            Self::ConfigError(_) => "ConfigError",
        }
    }

    /// Whether this error is safe to hand to the caller as-is (vs. masking
    /// it behind a generic message). Matches the propagation policy: only
    /// `AllThreadsFailed`, `DeadlineExceeded`, and `BadRequest` are meant to
    /// reach a client; everything else is absorbed by an inner layer, but we
    /// still provide a safe message in case a bug lets one leak through.
    pub fn user_message(&self) -> String {
        match self {
            Self::BadRequest(msg) => msg.clone(),
            Self::AllThreadsFailed => "all reasoning threads failed".to_string(),
            Self::DeadlineExceeded => "request deadline exceeded".to_string(),
            _ => "internal error".to_string(),
        }
    }

    /// HTTP status code for the client-visible error kinds.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::AllThreadsFailed | Self::DeadlineExceeded => 502,
            _ => 500,
        }
    }

    /// Whether a retry of the same upstream call is likely to succeed.
    /// Used by the retry executor to decide whether to keep retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
